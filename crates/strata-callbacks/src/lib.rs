//! # Strata Callbacks
//!
//! Ordered, typed and cancellable callbacks for configuration lifecycle
//! events.
//!
//! A [`CallbackRegistry`] holds two kinds of callbacks:
//!
//! - **Config callbacks** receive a [`CallbackEvent`] for the kinds in their
//!   [`EventMask`] (`ConfigChanged`, `Reloaded`, `Error`, `Loaded`,
//!   `EnvChanged`).
//! - **Environment callbacks** receive `(old, new)` when the deployment
//!   environment switches.
//!
//! ## Ordering
//!
//! Synchronous callbacks of one event run highest [`Priority`] first, in
//! registration order within a level. Dispatches never overlap: the
//! synchronous part of one event completes before the next begins.
//! Asynchronous callbacks run in the background with no ordering guarantee.
//!
//! ## Failures
//!
//! A failing callback never stops the others. Errors, panics and timeouts are
//! reported as [`HandlerError`] values, returned from the dispatch for
//! synchronous callbacks and kept in [`CallbackRegistry::recent_errors`] for
//! all of them.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use strata_callbacks::{CallbackEvent, CallbackOptions, CallbackRegistry, EventKind};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), strata_core::ConfigError> {
//!     let registry: CallbackRegistry<u64> = CallbackRegistry::new();
//!
//!     registry.register_async(
//!         CallbackOptions::new("warm-cache")
//!             .on(EventKind::Reloaded)
//!             .asynchronous()
//!             .timeout(Duration::from_secs(2)),
//!         |ctx, event| async move {
//!             tokio::select! {
//!                 () = ctx.cancelled() => {}
//!                 () = tokio::time::sleep(Duration::from_millis(50)) => {
//!                     println!("warmed for {:?}", event.new_value);
//!                 }
//!             }
//!             Ok(())
//!         },
//!     )?;
//!
//!     registry
//!         .dispatch(&CancellationToken::new(), CallbackEvent::new(EventKind::Reloaded, "app.yaml"))
//!         .await;
//!
//!     registry.stop(Duration::from_secs(5)).await;
//!     Ok(())
//! }
//! ```

mod error;
mod event;
mod options;
mod registry;
mod spawner;

pub use error::{aggregate, HandlerError, HandlerErrorKind};
pub use event::{CallbackEvent, EventKind, EventMask};
pub use options::{CallbackOptions, Priority};
pub use registry::{CallbackRegistry, DEFAULT_GRACE, ERROR_LOG_CAPACITY};
pub use spawner::HandlerContext;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        CallbackEvent, CallbackOptions, CallbackRegistry, EventKind, EventMask, HandlerContext,
        HandlerError, Priority,
    };
}
