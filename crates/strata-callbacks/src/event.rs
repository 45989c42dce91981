//! Event kinds, event masks and the event value handed to callbacks.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_core::{ConfigError, Environment};

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The published value changed.
    ConfigChanged,
    /// A reload produced a new value.
    Reloaded,
    /// A reload or watch step failed.
    Error,
    /// A value was loaded (initial load, or a reload with no change).
    Loaded,
    /// The environment changed.
    EnvChanged,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::ConfigChanged,
        Self::Reloaded,
        Self::Error,
        Self::Loaded,
        Self::EnvChanged,
    ];

    /// Snake-case name used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigChanged => "config_changed",
            Self::Reloaded => "reloaded",
            Self::Error => "error",
            Self::Loaded => "loaded",
            Self::EnvChanged => "env_changed",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::ConfigChanged => 1,
            Self::Reloaded => 1 << 1,
            Self::Error => 1 << 2,
            Self::Loaded => 1 << 3,
            Self::EnvChanged => 1 << 4,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of event kinds a callback listens to.
///
/// The empty mask admits every kind.
///
/// ```
/// use strata_callbacks::{EventKind, EventMask};
///
/// let mask = EventMask::from([EventKind::Reloaded, EventKind::Error]);
/// assert!(mask.admits(EventKind::Error));
/// assert!(!mask.admits(EventKind::Loaded));
/// assert!(EventMask::ALL.admits(EventKind::Loaded));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventMask(u8);

impl EventMask {
    /// Admits every kind.
    pub const ALL: Self = Self(0);

    /// A mask holding exactly one kind.
    pub const fn only(kind: EventKind) -> Self {
        Self(kind.bit())
    }

    /// Adds a kind.
    #[must_use]
    pub const fn with(self, kind: EventKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Whether a callback with this mask receives `kind`.
    pub const fn admits(self, kind: EventKind) -> bool {
        self.0 == 0 || self.0 & kind.bit() != 0
    }

    /// Kinds listed explicitly (empty for [`EventMask::ALL`]).
    pub fn kinds(self) -> impl Iterator<Item = EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(move |k| self.0 & k.bit() != 0)
    }
}

impl From<EventKind> for EventMask {
    fn from(kind: EventKind) -> Self {
        Self::only(kind)
    }
}

impl<const N: usize> From<[EventKind; N]> for EventMask {
    fn from(kinds: [EventKind; N]) -> Self {
        kinds.into_iter().collect()
    }
}

impl FromIterator<EventKind> for EventMask {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::ALL, Self::with)
    }
}

/// An event delivered to callbacks.
///
/// Values are shared with the publisher through `Arc`; handlers that need to
/// mutate a value clone it first.
#[derive(Debug)]
pub struct CallbackEvent<T> {
    /// What happened.
    pub kind: EventKind,
    /// File the event concerns (empty for environment events).
    pub source: PathBuf,
    /// Value before the change.
    pub old_value: Option<Arc<T>>,
    /// Value after the change.
    pub new_value: Option<Arc<T>>,
    /// Environment before the change.
    pub env_old: Option<Environment>,
    /// Environment after the change.
    pub env_new: Option<Environment>,
    /// Failure carried by `Error` events.
    pub error: Option<Arc<ConfigError>>,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl<T> Clone for CallbackEvent<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            source: self.source.clone(),
            old_value: self.old_value.clone(),
            new_value: self.new_value.clone(),
            env_old: self.env_old,
            env_new: self.env_new,
            error: self.error.clone(),
            timestamp: self.timestamp,
        }
    }
}

impl<T> CallbackEvent<T> {
    /// Creates an event with no payload.
    pub fn new(kind: EventKind, source: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            source: source.into(),
            old_value: None,
            new_value: None,
            env_old: None,
            env_new: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Attaches the old and new values.
    #[must_use]
    pub fn with_values(mut self, old: Option<Arc<T>>, new: Option<Arc<T>>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    /// Attaches the old and new environments.
    #[must_use]
    pub fn with_environments(mut self, old: Environment, new: Environment) -> Self {
        self.env_old = Some(old);
        self.env_new = Some(new);
        self
    }

    /// Attaches an error.
    #[must_use]
    pub fn with_error(mut self, error: ConfigError) -> Self {
        self.error = Some(Arc::new(error));
        self
    }

    /// An `Error` event for `source`.
    pub fn error(source: impl Into<PathBuf>, error: ConfigError) -> Self {
        Self::new(EventKind::Error, source).with_error(error)
    }

    /// An `EnvChanged` event.
    pub fn env_changed(old: Environment, new: Environment) -> Self {
        Self::new(EventKind::EnvChanged, PathBuf::new()).with_environments(old, new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mask_admits_all() {
        for kind in EventKind::ALL {
            assert!(EventMask::ALL.admits(kind));
            assert!(EventMask::default().admits(kind));
        }
        assert_eq!(EventMask::ALL.kinds().count(), 0);
    }

    #[test]
    fn test_mask_membership() {
        let mask: EventMask = [EventKind::ConfigChanged, EventKind::EnvChanged]
            .into_iter()
            .collect();
        assert!(mask.admits(EventKind::ConfigChanged));
        assert!(mask.admits(EventKind::EnvChanged));
        assert!(!mask.admits(EventKind::Reloaded));
        assert_eq!(
            mask.kinds().collect::<Vec<_>>(),
            vec![EventKind::ConfigChanged, EventKind::EnvChanged]
        );
    }

    #[test]
    fn test_event_builders() {
        let event: CallbackEvent<u32> = CallbackEvent::new(EventKind::Reloaded, "app.yaml")
            .with_values(Some(Arc::new(1)), Some(Arc::new(2)));
        assert_eq!(event.new_value.as_deref(), Some(&2));
        assert_eq!(event.source, PathBuf::from("app.yaml"));

        let env: CallbackEvent<u32> =
            CallbackEvent::env_changed(Environment::Development, Environment::Production);
        assert_eq!(env.kind, EventKind::EnvChanged);
        assert_eq!(env.env_new, Some(Environment::Production));

        let err: CallbackEvent<u32> =
            CallbackEvent::error("app.yaml", ConfigError::file_gone("app.yaml"));
        assert_eq!(err.kind, EventKind::Error);
        assert!(err.error.is_some());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(EventKind::ConfigChanged.to_string(), "config_changed");
        assert_eq!(
            serde_json::to_string(&EventKind::EnvChanged).unwrap(),
            "\"env_changed\""
        );
    }
}
