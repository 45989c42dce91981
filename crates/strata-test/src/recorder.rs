//! Callback event recording.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use strata_callbacks::{CallbackEvent, CallbackOptions, CallbackRegistry, EventKind, Priority};
use strata_core::{ConfigResult, Environment};

use crate::wait_for;

/// Records every event delivered to a registered callback.
///
/// ```no_run
/// # use strata_callbacks::{CallbackRegistry, EventKind};
/// # use strata_test::EventRecorder;
/// # fn demo(registry: &CallbackRegistry<u32>) -> strata_core::ConfigResult<()> {
/// let recorder = EventRecorder::new();
/// recorder.attach(registry, "recorder")?;
/// // ... trigger a reload ...
/// assert_eq!(recorder.count(EventKind::Reloaded), 1);
/// # Ok(())
/// # }
/// ```
pub struct EventRecorder<T> {
    events: Arc<Mutex<Vec<CallbackEvent<T>>>>,
}

impl<T> Clone for EventRecorder<T> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<T> std::fmt::Debug for EventRecorder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecorder")
            .field("events", &self.events.lock().len())
            .finish()
    }
}

impl<T> Default for EventRecorder<T> {
    fn default() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> EventRecorder<T>
where
    T: Send + Sync + 'static,
{
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a lowest-priority callback for every event kind.
    ///
    /// # Errors
    ///
    /// `DuplicateId` when `id` is taken.
    pub fn attach(&self, registry: &CallbackRegistry<T>, id: &str) -> ConfigResult<()> {
        self.attach_with(registry, CallbackOptions::new(id).priority(Priority::Lowest))
    }

    /// Registers with explicit options.
    ///
    /// # Errors
    ///
    /// `DuplicateId` when the ID is taken.
    pub fn attach_with(
        &self,
        registry: &CallbackRegistry<T>,
        options: CallbackOptions,
    ) -> ConfigResult<()> {
        let events = Arc::clone(&self.events);
        registry.register(options, move |_ctx, event| {
            events.lock().push(event.clone());
            Ok(())
        })
    }

    /// Everything recorded so far, oldest first.
    pub fn events(&self) -> Vec<CallbackEvent<T>> {
        self.events.lock().clone()
    }

    /// Kinds recorded so far, oldest first.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    /// Number of recorded events of `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    /// The most recent event of `kind`.
    pub fn last(&self, kind: EventKind) -> Option<CallbackEvent<T>> {
        self.events.lock().iter().rev().find(|e| e.kind == kind).cloned()
    }

    /// Forgets everything recorded.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Waits until at least `n` events of `kind` were recorded.
    pub async fn wait_for(&self, kind: EventKind, n: usize, timeout: Duration) -> bool {
        wait_for(timeout, || self.count(kind) >= n).await
    }
}

/// Shared append-only log for asserting call order and side effects.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Entries in append order.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing was logged.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// An environment callback that logs `id:old->new`.
    pub fn env_logger(
        &self,
        id: &'static str,
    ) -> impl Fn(Environment, Environment) -> anyhow::Result<()> + Send + Sync + 'static {
        let log = self.clone();
        move |old, new| {
            log.push(format!("{id}:{old}->{new}"));
            Ok(())
        }
    }
}
