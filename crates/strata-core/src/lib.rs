//! # Strata Core
//!
//! Core types and traits for the Strata configuration engine.
//!
//! This crate provides the foundational types used throughout Strata:
//!
//! - [`Configurable`] - Capability set every configuration tree implements
//! - [`Schema`] - Declarative field rules, usually derived
//! - [`Merge`] - Zero-value aware default merging
//! - [`SchemaRegistry`] - Module default constructors
//! - [`ConfigError`] - Error taxonomy shared by every crate
//! - [`Environment`] - Deployment environment tag

#![doc(html_root_url = "https://docs.rs/strata-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod de;
mod environment;
mod error;
mod merge;
mod registry;
mod schema;
pub mod validate;

pub use environment::{Environment, APP_ENV};
pub use error::{ConfigError, ConfigResult, ErrorKind, HookStage};
pub use merge::{merge_defaults, Merge};
pub use registry::SchemaRegistry;
pub use schema::{
    after_load_tree, before_load_tree, validate, validate_tree, Configurable, Nested, Schema,
};
pub use validate::{ValidationErrors, Violation};

/// Derives [`Schema`], [`Merge`] and [`Nested`] for a configuration struct.
pub use strata_macros::Schema;
