//! Configuration error types.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::validate::ValidationErrors;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Coarse classification of a [`ConfigError`].
///
/// Every error surfaced by the engine maps onto exactly one kind, which is
/// what callbacks and metrics key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Discovery found no candidate, or an explicit file is missing.
    NotFound,
    /// File bytes failed to parse in the chosen format.
    Decode,
    /// Structural or semantic validation failed.
    Validation,
    /// A `before_load`/`after_load` hook failed.
    Hook,
    /// Callback registration collided with an existing ID.
    DuplicateId,
    /// A synchronous callback returned an error.
    Handler,
    /// A callback exceeded its deadline.
    Timeout,
    /// A callback panicked.
    Panic,
    /// The watched file disappeared.
    FileGone,
    /// Reading or watching the filesystem failed.
    Io,
    /// Invariant violation.
    Internal,
}

impl ErrorKind {
    /// Returns the snake_case label used in logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Decode => "decode",
            Self::Validation => "validation",
            Self::Hook => "hook",
            Self::DuplicateId => "duplicate_id",
            Self::Handler => "handler",
            Self::Timeout => "timeout",
            Self::Panic => "panic",
            Self::FileGone => "file_gone",
            Self::Io => "io",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load hook stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    /// Ran before decoding.
    BeforeLoad,
    /// Ran after decoding and default merging.
    AfterLoad,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeLoad => f.write_str("before_load"),
            Self::AfterLoad => f.write_str("after_load"),
        }
    }
}

/// Errors that can occur while discovering, loading or reloading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No configuration file found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// File or directory that was searched.
        path: PathBuf,
    },

    /// Failed to read configuration file.
    #[error("failed to read configuration file: {path}")]
    Read {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The document could not be decoded.
    #[error("failed to decode {format} configuration {path}: {message}")]
    Decode {
        /// Path to the file (empty for in-memory documents).
        path: PathBuf,
        /// Decoder name (`yaml`, `json`, `toml`).
        format: String,
        /// Decoder message.
        message: String,
    },

    /// Validation failed.
    #[error("configuration validation failed: {0}")]
    Validation(ValidationErrors),

    /// Unknown environment tag.
    #[error("unknown environment: {value} (expected development, test, staging or production)")]
    InvalidEnvironment {
        /// The rejected value.
        value: String,
    },

    /// A load hook failed.
    #[error("{stage} hook failed: {message}")]
    Hook {
        /// Which hook failed.
        stage: HookStage,
        /// Hook message.
        message: String,
    },

    /// A callback with the same ID is already registered.
    #[error("callback already registered: {id}")]
    DuplicateId {
        /// The colliding ID.
        id: String,
    },

    /// A callback returned an error.
    #[error("callback {id} failed: {message}")]
    Handler {
        /// Callback ID.
        id: String,
        /// Failure message.
        message: String,
    },

    /// A callback exceeded its timeout.
    #[error("callback {id} timed out after {after:?}")]
    Timeout {
        /// Callback ID.
        id: String,
        /// Configured timeout.
        after: Duration,
    },

    /// A callback panicked.
    #[error("callback {id} panicked: {message}")]
    Panic {
        /// Callback ID.
        id: String,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// The watched file was removed.
    #[error("watched configuration file disappeared: {path}")]
    FileGone {
        /// Path of the removed file.
        path: PathBuf,
    },

    /// Filesystem watch failure.
    #[error("file watch error: {0}")]
    Watch(String),

    /// Several callback failures collected during one dispatch.
    #[error("{} callback(s) failed: {}", .0.len(), .0.join("; "))]
    Callbacks(Vec<String>),

    /// Invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConfigError {
    /// Returns the taxonomy kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            Self::Read { .. } | Self::Watch(_) => ErrorKind::Io,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Validation(_) | Self::InvalidEnvironment { .. } => ErrorKind::Validation,
            Self::Hook { .. } => ErrorKind::Hook,
            Self::DuplicateId { .. } => ErrorKind::DuplicateId,
            Self::Handler { .. } | Self::Callbacks(_) => ErrorKind::Handler,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Panic { .. } => ErrorKind::Panic,
            Self::FileGone { .. } => ErrorKind::FileGone,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Create a new not found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a new read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Create a new decode error.
    pub fn decode(
        path: impl Into<PathBuf>,
        format: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Self::Decode {
            path: path.into(),
            format: format.into(),
            message: message.to_string(),
        }
    }

    /// Create a validation error with a single violation.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.push(field, "custom", reason);
        Self::Validation(errors)
    }

    /// Create a new hook error.
    pub fn hook(stage: HookStage, message: impl fmt::Display) -> Self {
        Self::Hook {
            stage,
            message: message.to_string(),
        }
    }

    /// Create a new duplicate ID error.
    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId { id: id.into() }
    }

    /// Create a new file gone error.
    pub fn file_gone(path: impl Into<PathBuf>) -> Self {
        Self::FileGone { path: path.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the validation violations when this is a validation error.
    pub fn violations(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for ConfigError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

// `std::io::Error` is not `Clone`; a cloned `Read` keeps the io kind and message.
impl Clone for ConfigError {
    fn clone(&self) -> Self {
        match self {
            Self::NotFound { path } => Self::NotFound { path: path.clone() },
            Self::Read { path, source } => Self::Read {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::Decode {
                path,
                format,
                message,
            } => Self::Decode {
                path: path.clone(),
                format: format.clone(),
                message: message.clone(),
            },
            Self::Validation(errors) => Self::Validation(errors.clone()),
            Self::InvalidEnvironment { value } => Self::InvalidEnvironment {
                value: value.clone(),
            },
            Self::Hook { stage, message } => Self::Hook {
                stage: *stage,
                message: message.clone(),
            },
            Self::DuplicateId { id } => Self::DuplicateId { id: id.clone() },
            Self::Handler { id, message } => Self::Handler {
                id: id.clone(),
                message: message.clone(),
            },
            Self::Timeout { id, after } => Self::Timeout {
                id: id.clone(),
                after: *after,
            },
            Self::Panic { id, message } => Self::Panic {
                id: id.clone(),
                message: message.clone(),
            },
            Self::FileGone { path } => Self::FileGone { path: path.clone() },
            Self::Watch(message) => Self::Watch(message.clone()),
            Self::Callbacks(messages) => Self::Callbacks(messages.clone()),
            Self::Internal(message) => Self::Internal(message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_keeps_kind_and_message() {
        let err = ConfigError::read_error(
            "a.yaml",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let copy = err.clone();
        assert_eq!(copy.kind(), ErrorKind::Io);
        assert_eq!(copy.to_string(), err.to_string());
    }

    #[test]
    fn test_not_found_error() {
        let err = ConfigError::not_found("/path/to/config.yaml");
        assert!(err.to_string().contains("/path/to/config.yaml"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_read_error_kind_follows_io_kind() {
        let missing = ConfigError::read_error(
            "a.yaml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let denied = ConfigError::read_error(
            "a.yaml",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert_eq!(denied.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_decode_error() {
        let err = ConfigError::decode("gateway.yaml", "yaml", "expected mapping");
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().contains("yaml"));
        assert!(err.to_string().contains("expected mapping"));
    }

    #[test]
    fn test_invalid_value_error() {
        let err = ConfigError::invalid_value("http_server.port", "must be positive");
        assert_eq!(err.kind(), ErrorKind::Validation);
        let violations = err.violations().unwrap();
        assert_eq!(violations.len(), 1);
        assert!(err.to_string().contains("http_server.port"));
    }

    #[test]
    fn test_hook_error() {
        let err = ConfigError::hook(HookStage::AfterLoad, "endpoint unresolved");
        assert_eq!(err.kind(), ErrorKind::Hook);
        assert!(err.to_string().starts_with("after_load hook failed"));
    }

    #[test]
    fn test_callbacks_error_aggregates() {
        let err = ConfigError::Callbacks(vec!["a: boom".into(), "b: timeout".into()]);
        assert_eq!(err.kind(), ErrorKind::Handler);
        assert_eq!(err.to_string(), "2 callback(s) failed: a: boom; b: timeout");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ErrorKind::DuplicateId.as_str(), "duplicate_id");
        assert_eq!(ErrorKind::FileGone.to_string(), "file_gone");
    }
}
