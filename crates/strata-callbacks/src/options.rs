//! Registration options.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strata_core::ConfigError;

use crate::event::{EventKind, EventMask};

/// Coarse ordering bucket. Higher priorities run first.
///
/// ```
/// use strata_callbacks::Priority;
///
/// assert!(Priority::Highest > Priority::Normal);
/// assert!(Priority::Low > Priority::Lowest);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Runs first.
    Highest,
    /// Runs before `Normal`.
    High,
    /// The default.
    #[default]
    Normal,
    /// Runs after `Normal`.
    Low,
    /// Runs last.
    Lowest,
}

impl Priority {
    /// Every level, highest first.
    pub const ALL: [Self; 5] = [
        Self::Highest,
        Self::High,
        Self::Normal,
        Self::Low,
        Self::Lowest,
    ];

    /// Numeric rank; larger runs earlier.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Highest => 4,
            Self::High => 3,
            Self::Normal => 2,
            Self::Low => 1,
            Self::Lowest => 0,
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Highest => "highest",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Lowest => "lowest",
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ConfigError::invalid_value("priority", format!("unknown priority: {s}"))
            })
    }
}

/// How a config callback is registered.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use strata_callbacks::{CallbackOptions, EventKind, Priority};
///
/// let options = CallbackOptions::new("cache-flush")
///     .on(EventKind::ConfigChanged)
///     .priority(Priority::High)
///     .timeout(Duration::from_millis(500))
///     .meta("owner", "cache-team");
///
/// assert!(options.types.admits(EventKind::ConfigChanged));
/// assert!(!options.types.admits(EventKind::Loaded));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackOptions {
    /// Unique ID within the registry.
    pub id: String,
    /// Kinds to receive; empty receives all.
    pub types: EventMask,
    /// Ordering bucket.
    pub priority: Priority,
    /// Run in the background instead of as part of the dispatch.
    pub is_async: bool,
    /// Deadline per invocation; zero disables it.
    pub timeout: Duration,
    /// Opaque user data for correlation.
    pub metadata: IndexMap<String, serde_json::Value>,
}

impl CallbackOptions {
    /// Options with the given ID and defaults for everything else.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Adds an event kind to listen to.
    pub fn on(mut self, kind: EventKind) -> Self {
        self.types = self.types.with(kind);
        self
    }

    /// Replaces the event mask.
    pub fn types(mut self, types: impl Into<EventMask>) -> Self {
        self.types = types.into();
        self
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Runs the callback in the background.
    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// Sets the per-invocation deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a metadata entry.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        let mut levels = vec![Priority::Low, Priority::Highest, Priority::Normal];
        levels.sort_by(|a, b| b.cmp(a));
        assert_eq!(
            levels,
            vec![Priority::Highest, Priority::Normal, Priority::Low]
        );
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" lowest ".parse::<Priority>().unwrap(), Priority::Lowest);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_options_defaults() {
        let options = CallbackOptions::new("a");
        assert_eq!(options.priority, Priority::Normal);
        assert!(!options.is_async);
        assert!(options.timeout.is_zero());
        assert_eq!(options.types, EventMask::ALL);
    }

    #[test]
    fn test_options_builder() {
        let options = CallbackOptions::new("b")
            .types([EventKind::Reloaded, EventKind::Error])
            .asynchronous()
            .meta("attempts", 3);
        assert!(options.is_async);
        assert!(options.types.admits(EventKind::Error));
        assert_eq!(options.metadata["attempts"], serde_json::json!(3));
    }
}
