//! Relational database configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_core::{ConfigError, ConfigResult, Configurable, Schema};

/// Database module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL.
    #[config(required, url)]
    pub url: String,

    /// Pool ceiling.
    #[config(min = 1, max = 1000)]
    pub max_connections: u32,

    /// Connections kept open while idle.
    pub min_connections: u32,

    /// Time allowed to establish a connection.
    #[serde(with = "strata_core::de::duration")]
    pub connect_timeout: Duration,

    /// Reject writes at the pool level.
    #[serde(with = "strata_core::de::boolish")]
    #[config(no_merge)]
    pub read_only: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/app".to_string(),
            max_connections: 20,
            min_connections: 2,
            connect_timeout: Duration::from_secs(5),
            read_only: false,
        }
    }
}

impl Configurable for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.min_connections > self.max_connections {
            return Err(ConfigError::invalid_value(
                "min_connections",
                format!("must not exceed max_connections ({})", self.max_connections),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{merge_defaults, validate};

    #[test]
    fn test_pool_bounds() {
        let db = DatabaseConfig {
            min_connections: 50,
            ..DatabaseConfig::default()
        };
        let err = validate(&db).unwrap_err();
        assert!(err.violations().unwrap().has_field("min_connections"));
    }

    #[test]
    fn test_zero_fields_take_defaults() {
        let partial = DatabaseConfig {
            url: "postgres://db:5432/orders".to_string(),
            max_connections: 0,
            min_connections: 0,
            connect_timeout: Duration::ZERO,
            read_only: true,
        };
        let merged = merge_defaults(partial, &DatabaseConfig::default());
        assert_eq!(merged.url, "postgres://db:5432/orders");
        assert_eq!(merged.max_connections, 20);
        assert_eq!(merged.connect_timeout, Duration::from_secs(5));
        assert!(merged.read_only);
    }
}
