//! Proxy service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Proxy service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Logical database name the pool serves
    pub database_name: String,

    /// Number of connection workers to spawn
    pub workers: usize,

    /// Liveness probe period in seconds
    pub liveness_interval_secs: u64,

    /// Service version
    pub version: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            database_name: "default".to_string(),
            workers: 4,
            liveness_interval_secs: 30,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ProxyConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("PROXY_DATABASE_NAME") {
            config.database_name = name;
        }

        if let Ok(workers) = std::env::var("PROXY_WORKERS") {
            if let Ok(n) = workers.parse() {
                config.workers = n;
            }
        }

        if let Ok(interval) = std::env::var("PROXY_LIVENESS_INTERVAL_SECS") {
            if let Ok(n) = interval.parse() {
                config.liveness_interval_secs = n;
            }
        }

        config
    }

    /// Get the liveness probe period as a Duration.
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }
}
