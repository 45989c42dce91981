//! Callback failure records.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_core::{ConfigError, ErrorKind};
use thiserror::Error;

use crate::event::EventKind;

/// How a callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerErrorKind {
    /// The handler returned an error.
    Handler,
    /// The handler outlived its timeout.
    Timeout,
    /// The handler panicked.
    Panic,
}

impl HandlerErrorKind {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handler => "handler",
            Self::Timeout => "timeout",
            Self::Panic => "panic",
        }
    }
}

impl fmt::Display for HandlerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HandlerErrorKind> for ErrorKind {
    fn from(kind: HandlerErrorKind) -> Self {
        match kind {
            HandlerErrorKind::Handler => Self::Handler,
            HandlerErrorKind::Timeout => Self::Timeout,
            HandlerErrorKind::Panic => Self::Panic,
        }
    }
}

/// One failed callback invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("callback {id} failed ({kind}) on {event}: {cause}")]
pub struct HandlerError {
    /// Callback ID.
    pub id: String,
    /// Failure kind.
    pub kind: HandlerErrorKind,
    /// Error message, timeout description or panic payload.
    pub cause: String,
    /// Event being handled.
    pub event: EventKind,
    /// Deadline that was exceeded, for timeouts.
    pub timeout: Option<Duration>,
    /// When the failure was recorded.
    pub at: DateTime<Utc>,
}

impl HandlerError {
    fn new(id: &str, kind: HandlerErrorKind, event: EventKind, cause: String) -> Self {
        Self {
            id: id.to_string(),
            kind,
            cause,
            event,
            timeout: None,
            at: Utc::now(),
        }
    }

    /// The handler returned an error.
    pub fn handler(id: &str, event: EventKind, cause: impl fmt::Display) -> Self {
        Self::new(id, HandlerErrorKind::Handler, event, cause.to_string())
    }

    /// The handler exceeded `after`.
    pub fn timed_out(id: &str, event: EventKind, after: Duration) -> Self {
        let mut err = Self::new(
            id,
            HandlerErrorKind::Timeout,
            event,
            format!("no result after {after:?}"),
        );
        err.timeout = Some(after);
        err
    }

    /// The handler panicked with `payload`.
    pub fn panicked(id: &str, event: EventKind, payload: impl Into<String>) -> Self {
        Self::new(id, HandlerErrorKind::Panic, event, payload.into())
    }

    /// Taxonomy kind.
    pub fn error_kind(&self) -> ErrorKind {
        self.kind.into()
    }
}

impl From<HandlerError> for ConfigError {
    fn from(err: HandlerError) -> Self {
        match err.kind {
            HandlerErrorKind::Handler => Self::Handler {
                id: err.id,
                message: err.cause,
            },
            HandlerErrorKind::Timeout => Self::Timeout {
                id: err.id,
                after: err.timeout.unwrap_or_default(),
            },
            HandlerErrorKind::Panic => Self::Panic {
                id: err.id,
                message: err.cause,
            },
        }
    }
}

/// Folds the errors of one dispatch into a single `Callbacks` error.
///
/// Returns `None` when nothing failed.
pub fn aggregate(errors: &[HandlerError]) -> Option<ConfigError> {
    if errors.is_empty() {
        return None;
    }
    Some(ConfigError::Callbacks(
        errors.iter().map(ToString::to_string).collect(),
    ))
}
