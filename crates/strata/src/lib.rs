//! # Strata
//!
//! **Configuration lifecycle engine**
//!
//! Strata finds a service's configuration file, loads it onto typed
//! defaults, validates it, and keeps it current while the process runs:
//!
//! - **Discovery** – best-fit file per environment (`prod_gateway.yaml`,
//!   `gateway.production.yaml`, `config.toml`, ...)
//! - **Validated loading** – YAML, JSON or TOML decoded onto defaults, with
//!   `#[derive(Schema)]` field rules and load hooks
//! - **Hot reload** – debounced file watching; an invalid file never replaces
//!   a valid value
//! - **Callbacks** – prioritized, typed, cancellable change notifications
//! - **Environments** – switch `development` to `production` at runtime and
//!   pick up the matching file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata::prelude::*;
//!
//! #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, Schema)]
//! #[serde(default)]
//! struct Gateway {
//!     #[config(min = 1, max = 65535)]
//!     port: i32,
//! }
//!
//! impl Configurable for Gateway {}
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ConfigError> {
//!     let manager = ConfigManager::<Gateway>::builder()
//!         .from_env()?
//!         .type_hint("gateway")
//!         .build()?;
//!
//!     manager.callbacks().register(
//!         CallbackOptions::new("port-watch")
//!             .on(EventKind::ConfigChanged)
//!             .priority(Priority::High),
//!         |_ctx, event| {
//!             println!("new port: {:?}", event.new_value.as_ref().map(|g| g.port));
//!             Ok(())
//!         },
//!     )?;
//!
//!     manager.start().await?;
//!     tokio::signal::ctrl_c().await.ok();
//!     manager.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! build: Discovery → Loader → Validate → current value
//! start: Loaded event → watch loop (debounce) ─┐
//!                                              ↓
//!        reload: load → checksum → swap → Reloaded + ConfigChanged
//!                    └─ failure → Error event, old value kept
//! stop:  close watcher → drain background callbacks (grace window)
//! ```

#![doc(html_root_url = "https://docs.rs/strata/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod builder;
mod environment;
mod manager;

#[cfg(feature = "global")]
pub mod global;

pub use builder::{ConfigSource, ManagerBuilder, CONFIG_PATH};
pub use environment::{EnvSwitch, EnvironmentManager};
pub use manager::ConfigManager;

// Re-export the component crates
pub use strata_callbacks as callbacks;
pub use strata_config as config;
pub use strata_core as core;
pub use strata_telemetry as telemetry;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{ConfigManager, ConfigSource, EnvSwitch, EnvironmentManager, ManagerBuilder};
    pub use strata_callbacks::{
        CallbackEvent, CallbackOptions, EventKind, EventMask, HandlerContext, HandlerError,
        Priority,
    };
    pub use strata_config::{ConfigFile, Format, LoadMetadata};
    pub use strata_core::{ConfigError, ConfigResult, Configurable, Environment, Schema};
}
