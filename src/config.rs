use crate::infrastructure::PoolConfig;
use std::time::Duration;

/// A pool to create at startup: `name=host:port`, or `host:port` for an
/// unnamed pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolTarget {
    pub name: String,
    pub addr: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Metrics endpoint
    pub listen_addr: String,

    // Pools to observe
    pub pools: Vec<PoolTarget>,

    // Pool settings, shared by every target
    pub max_connections: usize,
    pub min_idle: usize,
    pub checkout_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub cleanup_interval_secs: u64,

    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9464".to_string(),
            pools: Vec::new(),
            max_connections: 10,
            min_idle: 2,
            checkout_timeout_ms: 5000,
            connect_timeout_ms: 5000,
            cleanup_interval_secs: 30,
            debug: false,
        }
    }
}

impl Config {
    /// Pool configuration derived from these settings.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            min_idle: self.min_idle,
            checkout_timeout: Duration::from_millis(self.checkout_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            ..PoolConfig::default()
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid pool target '{0}', expected name=host:port")]
    InvalidPoolTarget(String),
    #[error("max_connections must be at least 1")]
    ZeroMaxConnections,
}

pub fn load_config() -> anyhow::Result<Config> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Build the configuration from an arbitrary variable lookup.
pub fn load_config_from<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let listen_addr = lookup("POOLMETRICS_LISTEN_ADDR").unwrap_or(defaults.listen_addr);

    let pools = match lookup("POOLMETRICS_POOLS") {
        Some(v) => parse_pool_targets(&v)?,
        None => Vec::new(),
    };

    let max_connections = lookup("POOLMETRICS_MAX_CONNECTIONS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.max_connections);

    let min_idle = lookup("POOLMETRICS_MIN_IDLE")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.min_idle);

    let checkout_timeout_ms = lookup("POOLMETRICS_CHECKOUT_TIMEOUT_MS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.checkout_timeout_ms);

    let connect_timeout_ms = lookup("POOLMETRICS_CONNECT_TIMEOUT_MS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.connect_timeout_ms);

    let cleanup_interval_secs = lookup("POOLMETRICS_CLEANUP_INTERVAL_SECS")
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(defaults.cleanup_interval_secs);

    let debug = lookup("POOLMETRICS_DEBUG").is_some();

    if max_connections == 0 {
        return Err(ConfigError::ZeroMaxConnections.into());
    }

    Ok(Config {
        listen_addr,
        pools,
        max_connections,
        min_idle,
        checkout_timeout_ms,
        connect_timeout_ms,
        cleanup_interval_secs,
        debug,
    })
}

/// Parse a comma-separated list of pool targets.
pub fn parse_pool_targets(value: &str) -> Result<Vec<PoolTarget>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|target| {
            let (name, addr) = match target.split_once('=') {
                Some((name, addr)) => (name.trim(), addr.trim()),
                None => ("", target),
            };
            if addr.is_empty() || !addr.contains(':') {
                return Err(ConfigError::InvalidPoolTarget(target.to_string()));
            }
            Ok(PoolTarget {
                name: name.to_string(),
                addr: addr.to_string(),
            })
        })
        .collect()
}
