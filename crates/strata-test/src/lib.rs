//! # Strata Test
//!
//! Test utilities for Strata configuration managers: temporary config
//! directories, recorders for callback events, and polling waits for the
//! asynchronous parts of the lifecycle (file watching, background
//! callbacks).
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use strata::prelude::*;
//! use strata_test::{ConfigDir, EventRecorder};
//!
//! #[tokio::test(flavor = "multi_thread")]
//! async fn test_hot_reload() {
//!     let dir = ConfigDir::with_files([("dev_gateway.yaml", "port: 8080\n")]).unwrap();
//!     let manager = ConfigManager::<Gateway>::builder()
//!         .dir(dir.path())
//!         .type_hint("gateway")
//!         .environment(Environment::Development)
//!         .build()
//!         .unwrap();
//!
//!     let recorder = EventRecorder::new();
//!     recorder.attach(manager.callbacks(), "recorder").unwrap();
//!     manager.start().await.unwrap();
//!
//!     dir.write("dev_gateway.yaml", "port: 9090\n").unwrap();
//!     assert!(recorder.wait_for(EventKind::ConfigChanged, 1, Duration::from_secs(2)).await);
//!     assert_eq!(manager.config().port, 9090);
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/strata-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod dir;
mod error;
mod recorder;

use std::time::Duration;

pub use dir::ConfigDir;
pub use error::TestError;
pub use recorder::{CallLog, EventRecorder};

/// Result type for the test helpers.
pub type TestResult<T> = Result<T, TestError>;

/// How often [`wait_for`] re-checks its condition.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls `condition` until it holds or `timeout` elapses.
///
/// Returns the final outcome, so a condition that turns true exactly at the
/// deadline still counts.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return condition();
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
