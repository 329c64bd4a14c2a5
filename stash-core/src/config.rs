//! Configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::key::Namespace;

/// Default store URL.
pub const DEFAULT_STORE_URL: &str = "redis://127.0.0.1:6379/";

/// Default maximum number of pooled store connections.
pub const DEFAULT_POOL_SIZE: u32 = 16;

/// Default time to wait for a pooled connection, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Connection settings for a networked store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store URL, e.g. `redis://127.0.0.1:6379/0`
    pub url: String,
    /// Maximum pool size
    pub pool_size: u32,
    /// How long to wait for a connection from the pool
    pub connection_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STORE_URL.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            connection_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl StoreConfig {
    /// Create a store configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `STASH_REDIS_URL`: Store URL (default: `redis://127.0.0.1:6379/`)
    /// - `STASH_POOL_SIZE`: Maximum pool size (default: 16)
    /// - `STASH_CONNECT_TIMEOUT_SECS`: Pool checkout timeout (default: 5)
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("STASH_REDIS_URL")
                .unwrap_or_else(|_| DEFAULT_STORE_URL.to_string()),
            pool_size: std::env::var("STASH_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_POOL_SIZE),
            connection_timeout: Duration::from_secs(
                std::env::var("STASH_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
        }
    }

    /// Check that the configuration can be used to build a pool.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "url".to_string(),
            });
        }
        if self.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pool_size".to_string(),
                value: self.pool_size.to_string(),
                reason: "pool must hold at least one connection".to_string(),
            });
        }
        if self.connection_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "connection_timeout".to_string(),
                value: format!("{:?}", self.connection_timeout),
                reason: "timeout must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-cache settings, typically loaded alongside the application config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Key namespace, longer than two characters
    pub namespace: String,
    /// Entry time-to-live in seconds; entries never expire when absent
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl CacheSettings {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ttl_secs: None,
        }
    }

    /// Set the entry TTL in seconds.
    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }

    /// Load settings from `{PREFIX}_NAMESPACE` and `{PREFIX}_TTL_SECS`.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let field = format!("{prefix}_NAMESPACE");
        let namespace =
            std::env::var(&field).map_err(|_| ConfigError::MissingRequired { field })?;
        let ttl_secs = std::env::var(format!("{prefix}_TTL_SECS"))
            .ok()
            .and_then(|s| s.parse().ok());

        let settings = Self {
            namespace,
            ttl_secs,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// The configured TTL, if any.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    /// Validate the namespace and TTL, returning the parsed namespace.
    pub fn validate(&self) -> Result<Namespace, ConfigError> {
        if self.ttl_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "ttl_secs".to_string(),
                value: "0".to_string(),
                reason: "omit the TTL instead of setting it to zero".to_string(),
            });
        }
        Namespace::new(&self.namespace).map_err(|e| ConfigError::InvalidValue {
            field: "namespace".to_string(),
            value: self.namespace.clone(),
            reason: e.to_string(),
        })
    }
}
