//! Cache tier configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_core::{ConfigError, ConfigResult, Configurable, Schema};

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL.
    #[config(required, url)]
    pub url: String,

    /// Connection pool size.
    #[config(min = 1, max = 1024)]
    pub pool_size: u32,

    /// Logical database index.
    #[config(max = 15)]
    #[config(no_merge)]
    pub db: u8,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 16,
            db: 0,
        }
    }
}

impl Configurable for RedisConfig {}

/// Cache module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct CacheConfig {
    /// `memory`, `redis` or `tiered`.
    #[config(one_of = "memory redis tiered")]
    pub backend: String,

    /// TTL applied when a write does not set one.
    #[serde(with = "strata_core::de::duration")]
    pub default_ttl: Duration,

    /// Entry limit of the in-process tier.
    #[config(min = 1)]
    pub max_entries: u64,

    /// Remote tier, required by `redis` and `tiered`.
    #[config(nested)]
    pub redis: Option<RedisConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            default_ttl: Duration::from_secs(300),
            max_entries: 10_000,
            redis: None,
        }
    }
}

impl Configurable for CacheConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.backend != "memory" && self.redis.is_none() {
            return Err(ConfigError::invalid_value(
                "redis",
                format!("required when backend is {}", self.backend),
            ));
        }
        Ok(())
    }
}
