//! File-side machinery of the Strata configuration engine.
//!
//! This crate knows how to find, read and watch configuration files:
//!
//! - [`Discovery`] ranks candidate files in a directory for an environment
//! - [`Format`] decodes YAML, JSON and TOML documents into one tree model
//! - [`Loader`] turns a file into a validated, default-merged value with
//!   [`LoadMetadata`]
//! - [`FileWatcher`] and [`Debouncer`] drive hot-reload
//!
//! The lifecycle on top of these pieces (atomic publication, callbacks,
//! environment switching) lives in the `strata` crate.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use serde::{Deserialize, Serialize};
//! use strata_config::{Discovery, DiscoveryConfig, Loader};
//! use strata_core::{Configurable, Environment, Schema};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Schema)]
//! #[serde(default)]
//! struct Gateway {
//!     #[config(required)]
//!     host: String,
//!     #[config(min = 1, max = 65535)]
//!     port: i32,
//! }
//!
//! impl Configurable for Gateway {}
//!
//! # fn main() -> Result<(), strata_core::ConfigError> {
//! let env = Environment::Production;
//! let file = Discovery::new(DiscoveryConfig::default())
//!     .find_best(Path::new("conf"), env, Some("gateway"))?;
//! let loaded = Loader::new(|| Gateway {
//!     host: "0.0.0.0".into(),
//!     port: 8080,
//! })
//! .load(&file, env)?;
//! println!("{} from {}", loaded.value.port, loaded.metadata.path.display());
//! # Ok(())
//! # }
//! ```

mod discovery;
mod format;
mod loader;
mod overlay;
mod watcher;

pub use discovery::{
    ConfigFile, Discovery, DiscoveryConfig, PREFIX_BONUS, PRIORITY_DEFAULT, PRIORITY_DEFAULT_ENV,
    PRIORITY_HINT, PRIORITY_HINT_ENV,
};
pub use format::Format;
pub use loader::{checksum, read_document, LoadMetadata, Loaded, Loader, LoaderOptions};
pub use overlay::{env_overrides, overlay, parse_env_value};
pub use watcher::{
    Debouncer, FileChangeEvent, FileChangeKind, FileWatcher, FileWatcherBuilder, ReloadState,
    DEFAULT_DEBOUNCE,
};
