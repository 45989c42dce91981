//! Module configuration schemas.
//!
//! Each module is a plain struct deriving [`Schema`](strata_core::Schema) and
//! implementing [`Configurable`]; [`AppConfig`] composes them into one root
//! document:
//!
//! ```yaml
//! name: orders
//! gateway:
//!   http_server:
//!     port: 8080
//!     read_timeout: 10s
//!   routes:
//!     users:
//!       path: /users
//!       upstream: http://users:8080
//! cache:
//!   backend: memory
//! observability:
//!   log_level: debug
//! ```

mod broker;
mod cache;
mod database;
mod gateway;
mod jobs;
mod observability;

pub use broker::{BrokerConfig, TopicConfig};
pub use cache::{CacheConfig, RedisConfig};
pub use database::DatabaseConfig;
pub use gateway::{GatewayConfig, GrpcServerConfig, HttpServerConfig, RouteConfig};
pub use jobs::{JobsConfig, ScheduleConfig};
pub use observability::{MetricsSection, ObservabilityConfig};

use serde::{Deserialize, Serialize};
use strata_core::{Configurable, Environment, Schema, SchemaRegistry};

/// Root configuration of a service.
///
/// # Example
///
/// ```
/// use strata_modules::AppConfig;
///
/// let config = AppConfig::default();
/// assert_eq!(config.gateway.http_server.port, 8080);
/// assert!(config.database.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct AppConfig {
    /// Service name.
    #[config(required)]
    pub name: String,

    /// Gateway module.
    #[config(nested)]
    pub gateway: GatewayConfig,

    /// Cache module.
    #[config(nested)]
    pub cache: CacheConfig,

    /// Database module, when the service has one.
    #[config(nested)]
    pub database: Option<DatabaseConfig>,

    /// Broker module, when the service has one.
    #[config(nested)]
    pub broker: Option<BrokerConfig>,

    /// Jobs module.
    #[config(nested)]
    pub jobs: JobsConfig,

    /// Observability module.
    #[config(nested)]
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "strata-service".to_string(),
            gateway: GatewayConfig::default(),
            cache: CacheConfig::default(),
            database: None,
            broker: None,
            jobs: JobsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Configurable for AppConfig {}

impl AppConfig {
    /// Local development preset: pretty debug logs, short timeouts.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.observability.log_level = "debug".to_string();
        config.observability.log_format = "pretty".to_string();
        config.gateway.http_server.host = "127.0.0.1".to_string();
        config.jobs.workers = 1;
        config
    }

    /// Production preset: JSON logs, sampled traces, larger pools.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.observability.log_level = "info".to_string();
        config.observability.log_format = "json".to_string();
        config.observability.sample_ratio = 0.1;
        config.jobs.workers = 16;
        config
    }

    /// Preset for an environment. Staging uses the production preset.
    #[must_use]
    pub fn for_environment(env: Environment) -> Self {
        if env.is_production() || env == Environment::Staging {
            Self::production()
        } else {
            Self::development()
        }
    }
}

/// Registers the default of every module under its document key.
pub fn register_defaults(registry: &SchemaRegistry) {
    registry.register_default("app", AppConfig::default);
    registry.register_default("gateway", GatewayConfig::default);
    registry.register_default("cache", CacheConfig::default);
    registry.register_default("database", DatabaseConfig::default);
    registry.register_default("broker", BrokerConfig::default);
    registry.register_default("jobs", JobsConfig::default);
    registry.register_default("observability", ObservabilityConfig::default);
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::validate;

    #[test]
    fn test_presets_are_valid() {
        for env in Environment::ALL {
            let config = AppConfig::for_environment(env);
            assert!(validate(&config).is_ok(), "{env} preset invalid");
        }
        assert_eq!(AppConfig::development().observability.log_format, "pretty");
        assert_eq!(AppConfig::production().jobs.workers, 16);
    }

    #[test]
    fn test_registered_defaults_validate() {
        let registry = SchemaRegistry::new();
        register_defaults(&registry);
        assert_eq!(registry.modules().len(), 7);
        assert!(registry.check_defaults().is_empty());
        let gateway: GatewayConfig = registry.default_for("gateway").unwrap();
        assert_eq!(gateway, GatewayConfig::default());
    }

    #[test]
    fn test_optional_modules_only_checked_when_present() {
        let mut config = AppConfig::default();
        assert!(validate(&config).is_ok());

        config.database = Some(DatabaseConfig {
            url: String::new(),
            ..DatabaseConfig::default()
        });
        let err = validate(&config).unwrap_err();
        assert!(err.violations().unwrap().has_field("database.url"));
    }

    #[test]
    fn test_decode_document() {
        let yaml = "
name: orders
gateway:
  http_server:
    port: 9000
    read_timeout: 10s
  routes:
    users:
      path: /users
      upstream: http://users:8080
database:
  url: postgres://db:5432/orders
";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.name, "orders");
        assert_eq!(config.gateway.http_server.port, 9000);
        assert_eq!(config.gateway.routes["users"].path, "/users");
        assert_eq!(config.database.as_ref().unwrap().max_connections, 20);
        assert!(validate(&config).is_ok());
    }
}
