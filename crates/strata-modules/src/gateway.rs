//! HTTP and gRPC gateway configuration.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strata_core::{ConfigError, ConfigResult, Configurable, Schema};

/// HTTP listener settings.
///
/// `endpoint` is derived from `host` and `port` after every load.
///
/// # Example
///
/// ```
/// use strata_core::after_load_tree;
/// use strata_modules::HttpServerConfig;
///
/// let mut server = HttpServerConfig {
///     port: 9000,
///     ..HttpServerConfig::default()
/// };
/// after_load_tree(&mut server).unwrap();
/// assert_eq!(server.endpoint, "0.0.0.0:9000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct HttpServerConfig {
    /// Bind host.
    #[config(required)]
    pub host: String,

    /// Bind port.
    #[config(min = 1, max = 65535)]
    pub port: i32,

    /// Time allowed to read a request.
    #[serde(with = "strata_core::de::duration")]
    pub read_timeout: Duration,

    /// Time allowed to write a response.
    #[serde(with = "strata_core::de::duration")]
    pub write_timeout: Duration,

    /// Keep-alive idle timeout.
    #[serde(with = "strata_core::de::duration")]
    pub idle_timeout: Duration,

    /// Largest accepted header block, in bytes.
    #[config(min = 1024)]
    pub max_header_bytes: u64,

    /// `host:port`, computed after load.
    #[serde(skip)]
    #[config(no_merge)]
    pub endpoint: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
            max_header_bytes: 1 << 20,
            endpoint: String::new(),
        }
    }
}

impl Configurable for HttpServerConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.idle_timeout < self.read_timeout {
            return Err(ConfigError::invalid_value(
                "idle_timeout",
                "must not be shorter than read_timeout",
            ));
        }
        Ok(())
    }

    fn after_load(&mut self) -> ConfigResult<()> {
        self.endpoint = format!("{}:{}", self.host, self.port);
        Ok(())
    }
}

/// gRPC listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct GrpcServerConfig {
    /// Whether the gRPC listener runs.
    #[serde(with = "strata_core::de::boolish")]
    #[config(no_merge)]
    pub enabled: bool,

    /// Bind port.
    #[config(min = 1, max = 65535)]
    pub port: i32,

    /// Largest accepted message, in bytes.
    #[config(min = 1024)]
    pub max_message_bytes: u64,

    /// Expose the reflection service.
    #[serde(with = "strata_core::de::boolish")]
    #[config(no_merge)]
    pub reflection: bool,
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
            max_message_bytes: 4 << 20,
            reflection: false,
        }
    }
}

impl Configurable for GrpcServerConfig {}

/// One proxied route.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct RouteConfig {
    /// Path prefix matched on incoming requests.
    #[config(required)]
    pub path: String,

    /// Upstream base URL.
    #[config(required, url)]
    pub upstream: String,

    /// Per-request timeout; zero inherits the server write timeout.
    #[serde(with = "strata_core::de::duration")]
    pub timeout: Duration,

    /// Retry attempts on connection failure.
    #[config(max = 10)]
    pub retries: u32,
}

impl Configurable for RouteConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !self.path.starts_with('/') {
            return Err(ConfigError::invalid_value("path", "must start with '/'"));
        }
        Ok(())
    }
}

/// Gateway module: listeners plus routing table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener.
    #[config(nested)]
    pub http_server: HttpServerConfig,

    /// gRPC listener.
    #[config(nested)]
    pub grpc_server: GrpcServerConfig,

    /// Routes by name, in document order.
    #[config(nested)]
    pub routes: IndexMap<String, RouteConfig>,

    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
}

impl Configurable for GatewayConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.grpc_server.enabled && self.grpc_server.port == self.http_server.port {
            return Err(ConfigError::invalid_value(
                "grpc_server.port",
                "must differ from http_server.port",
            ));
        }
        Ok(())
    }
}
