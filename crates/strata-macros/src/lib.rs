//! Procedural macros for Strata configuration schemas.
//!
//! # Overview
//!
//! `#[derive(Schema)]` turns a plain struct into a configuration tree the
//! engine can validate, merge and walk. Field rules are declared with
//! `#[config(...)]`:
//!
//! | Rule | Meaning |
//! |------|---------|
//! | `required` | the field must be non-empty / non-zero / `Some` |
//! | `min = N`, `max = N` | numeric bounds, or length bounds for strings and collections |
//! | `url` | non-empty strings must parse as absolute URLs |
//! | `one_of = "a b c"` | non-empty strings must be one of the words |
//! | `nested` | the field is itself a configurable (also through `Option`, `Vec`, maps) |
//! | `no_merge` | skip the field when merging defaults |
//!
//! # Example
//!
//! ```rust,ignore
//! use strata::prelude::*;
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Schema)]
//! struct GatewayConfig {
//!     #[config(nested)]
//!     http_server: HttpServerConfig,
//!     #[config(one_of = "round_robin least_conn")]
//!     balancer: String,
//! }
//!
//! impl Configurable for GatewayConfig {}
//! ```
//!
//! # Generated Code
//!
//! The derive emits three impls:
//!
//! 1. `Schema`: rule checks for this level plus recursion into `nested` fields
//! 2. `Merge`: field-wise zero-value merge
//! 3. `Nested`: lets the struct appear as a `nested` field of another schema
//!
//! The struct must also implement `Configurable` (usually an empty impl).

mod parse;
mod schema;

use proc_macro::TokenStream;

/// Derives `Schema`, `Merge` and `Nested` for a configuration struct.
///
/// See the crate documentation for the accepted `#[config(...)]` rules.
#[proc_macro_derive(Schema, attributes(config))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    schema::expand_schema(input.into())
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
