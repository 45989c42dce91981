//! Test error types.

use std::fmt;
use std::path::PathBuf;

use strata_core::ConfigError;

/// Errors raised by the test helpers.
#[derive(Debug)]
pub enum TestError {
    /// Filesystem operation on the fixture directory failed
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// Callback registration failed
    Config(ConfigError),
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "I/O error on {}: {source}", path.display()),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
        }
    }
}

impl std::error::Error for TestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<ConfigError> for TestError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl TestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
