//! The callback registry.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use strata_core::{ConfigError, ConfigResult, Environment};
use strata_telemetry::metrics::{record_callback_error, record_dispatch, InFlightGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::HandlerError;
use crate::event::{CallbackEvent, EventKind};
use crate::options::{CallbackOptions, Priority};
use crate::spawner::{supervise, HandlerContext};

/// Number of handler failures kept for [`CallbackRegistry::recent_errors`].
pub const ERROR_LOG_CAPACITY: usize = 256;

/// Default wait for background handlers in [`CallbackRegistry::stop`].
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

type BlockingFn<T> = dyn Fn(&HandlerContext, &CallbackEvent<T>) -> anyhow::Result<()> + Send + Sync;
type FutureFn<T> =
    dyn Fn(HandlerContext, Arc<CallbackEvent<T>>) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync;
type EnvFn = dyn Fn(Environment, Environment) -> anyhow::Result<()> + Send + Sync;

enum Handler<T> {
    Blocking(Arc<BlockingFn<T>>),
    Future(Arc<FutureFn<T>>),
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Blocking(f) => Self::Blocking(Arc::clone(f)),
            Self::Future(f) => Self::Future(Arc::clone(f)),
        }
    }
}

struct ConfigEntry<T> {
    options: Arc<CallbackOptions>,
    handler: Handler<T>,
}

impl<T> Clone for ConfigEntry<T> {
    fn clone(&self) -> Self {
        Self {
            options: Arc::clone(&self.options),
            handler: self.handler.clone(),
        }
    }
}

#[derive(Clone)]
struct EnvEntry {
    options: Arc<CallbackOptions>,
    handler: Arc<EnvFn>,
}

struct Inner<T> {
    config: RwLock<IndexMap<String, ConfigEntry<T>>>,
    env: RwLock<IndexMap<String, EnvEntry>>,
    dispatch_lock: tokio::sync::Mutex<()>,
    root: CancellationToken,
    tracker: TaskTracker,
    errors: Mutex<VecDeque<HandlerError>>,
    stopped: AtomicBool,
}

impl<T> Inner<T> {
    fn record(&self, err: HandlerError) {
        warn!(
            callback_id = %err.id,
            event = %err.event,
            kind = %err.kind,
            cause = %err.cause,
            "callback failed"
        );
        record_callback_error(err.kind.as_str());
        let mut log = self.errors.lock();
        if log.len() == ERROR_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(err);
    }
}

/// Ordered registry of configuration and environment callbacks.
///
/// The registry is cheap to clone; clones share the same callbacks.
///
/// Synchronous callbacks of one event run one after another, highest
/// [`Priority`] first and in registration order within a level. Dispatches
/// are serialized: the synchronous part of one event finishes before the next
/// event starts. Asynchronous callbacks are launched in the background and
/// tracked until [`stop`](Self::stop).
///
/// Registering or unregistering from inside a handler is allowed and takes
/// effect from the next dispatch. A handler must not dispatch on the same
/// registry it was called from.
///
/// # Example
///
/// ```
/// use strata_callbacks::{CallbackEvent, CallbackOptions, CallbackRegistry, EventKind, Priority};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), strata_core::ConfigError> {
/// let registry: CallbackRegistry<String> = CallbackRegistry::new();
///
/// registry.register(
///     CallbackOptions::new("log-change")
///         .on(EventKind::ConfigChanged)
///         .priority(Priority::High),
///     |_ctx, event| {
///         println!("new value: {:?}", event.new_value);
///         Ok(())
///     },
/// )?;
///
/// let errors = registry
///     .dispatch(
///         &CancellationToken::new(),
///         CallbackEvent::new(EventKind::ConfigChanged, "app.yaml"),
///     )
///     .await;
/// assert!(errors.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct CallbackRegistry<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CallbackRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for CallbackRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("config_callbacks", &self.inner.config.read().len())
            .field("env_callbacks", &self.inner.env.read().len())
            .field("in_flight", &self.inner.tracker.len())
            .field("stopped", &self.inner.stopped.load(Ordering::Acquire))
            .finish()
    }
}

impl<T> Default for CallbackRegistry<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CallbackRegistry<T>
where
    T: Send + Sync + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(IndexMap::new()),
                env: RwLock::new(IndexMap::new()),
                dispatch_lock: tokio::sync::Mutex::new(()),
                root: CancellationToken::new(),
                tracker: TaskTracker::new(),
                errors: Mutex::new(VecDeque::with_capacity(ERROR_LOG_CAPACITY)),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Registers a synchronous-style config callback.
    ///
    /// The closure runs on the blocking pool, so it may block briefly. With
    /// [`CallbackOptions::asynchronous`] it runs in the background instead of
    /// as part of the dispatch.
    ///
    /// # Errors
    ///
    /// `DuplicateId` if the ID is taken by any config or environment callback,
    /// `Validation` if the ID is empty.
    pub fn register<F>(&self, options: CallbackOptions, handler: F) -> ConfigResult<()>
    where
        F: Fn(&HandlerContext, &CallbackEvent<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.insert_config(options, Handler::Blocking(Arc::new(handler)))
    }

    /// Registers a config callback returning a future.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_async<F, Fut>(&self, options: CallbackOptions, handler: F) -> ConfigResult<()>
    where
        F: Fn(HandlerContext, Arc<CallbackEvent<T>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: Arc<FutureFn<T>> = Arc::new(move |ctx, event| Box::pin(handler(ctx, event)));
        self.insert_config(options, Handler::Future(handler))
    }

    /// Registers an environment callback invoked with `(old, new)`.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_env<F>(
        &self,
        id: impl Into<String>,
        priority: Priority,
        is_async: bool,
        handler: F,
    ) -> ConfigResult<()>
    where
        F: Fn(Environment, Environment) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut options = CallbackOptions::new(id)
            .on(EventKind::EnvChanged)
            .priority(priority);
        options.is_async = is_async;
        check_id(&options.id)?;

        let config = self.inner.config.read();
        let mut env = self.inner.env.write();
        if config.contains_key(&options.id) || env.contains_key(&options.id) {
            return Err(ConfigError::duplicate_id(options.id));
        }
        debug!(callback_id = %options.id, priority = %priority, "registered environment callback");
        env.insert(
            options.id.clone(),
            EnvEntry {
                options: Arc::new(options),
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }

    fn insert_config(&self, options: CallbackOptions, handler: Handler<T>) -> ConfigResult<()> {
        check_id(&options.id)?;

        let mut config = self.inner.config.write();
        let env = self.inner.env.read();
        if config.contains_key(&options.id) || env.contains_key(&options.id) {
            return Err(ConfigError::duplicate_id(options.id));
        }
        debug!(
            callback_id = %options.id,
            priority = %options.priority,
            is_async = options.is_async,
            "registered config callback"
        );
        config.insert(
            options.id.clone(),
            ConfigEntry {
                options: Arc::new(options),
                handler,
            },
        );
        Ok(())
    }

    /// Removes a callback of either kind. Returns whether it existed.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.inner.config.write().shift_remove(id).is_some()
            || self.inner.env.write().shift_remove(id).is_some();
        if removed {
            debug!(callback_id = %id, "unregistered callback");
        }
        removed
    }

    /// Whether a callback with this ID is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.config.read().contains_key(id) || self.inner.env.read().contains_key(id)
    }

    /// Number of registered callbacks of both kinds.
    pub fn len(&self) -> usize {
        self.inner.config.read().len() + self.inner.env.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Config callback IDs in the order they would run for `kind`.
    pub fn order_for(&self, kind: EventKind) -> Vec<String> {
        self.config_snapshot(kind)
            .into_iter()
            .map(|e| e.options.id.clone())
            .collect()
    }

    fn config_snapshot(&self, kind: EventKind) -> Vec<ConfigEntry<T>> {
        let mut entries: Vec<_> = self
            .inner
            .config
            .read()
            .values()
            .filter(|e| e.options.types.admits(kind))
            .cloned()
            .collect();
        // Stable sort keeps registration order within a level
        entries.sort_by(|a, b| b.options.priority.cmp(&a.options.priority));
        entries
    }

    fn env_snapshot(&self) -> Vec<EnvEntry> {
        let mut entries: Vec<_> = self.inner.env.read().values().cloned().collect();
        entries.sort_by(|a, b| b.options.priority.cmp(&a.options.priority));
        entries
    }

    /// Delivers `event` to every config callback whose mask admits its kind.
    ///
    /// Returns the failures of the synchronous callbacks. Background failures
    /// show up later in [`recent_errors`](Self::recent_errors). Once `ctx` is
    /// cancelled, synchronous callbacks that have not started are skipped.
    pub async fn dispatch(
        &self,
        ctx: &CancellationToken,
        event: CallbackEvent<T>,
    ) -> Vec<HandlerError> {
        if self.is_stopped() {
            debug!(event = %event.kind, "registry stopped, dropping event");
            return Vec::new();
        }

        let kind = event.kind;
        let event = Arc::new(event);
        let _serial = self.inner.dispatch_lock.lock().await;
        let started = Instant::now();

        let (background, inline): (Vec<_>, Vec<_>) = self
            .config_snapshot(kind)
            .into_iter()
            .partition(|e| e.options.is_async);

        let mut errors = Vec::new();
        for entry in inline {
            if ctx.is_cancelled() {
                debug!(callback_id = %entry.options.id, event = %kind, "dispatch cancelled, skipping");
                continue;
            }
            let token = ctx.child_token();
            let task = spawn_handler(&entry, &token, &event);
            if let Err(err) = supervise(&entry.options.id, kind, task, entry.options.timeout, &token).await {
                self.inner.record(err.clone());
                errors.push(err);
            }
        }

        for entry in background {
            self.spawn_background(entry, &event);
        }

        record_dispatch(kind.as_str(), started.elapsed());
        debug!(event = %kind, failures = errors.len(), "dispatch finished");
        errors
    }

    fn spawn_background(&self, entry: ConfigEntry<T>, event: &Arc<CallbackEvent<T>>) {
        let inner = Arc::clone(&self.inner);
        let token = inner.root.child_token();
        let event = Arc::clone(event);
        self.inner.tracker.spawn(async move {
            let _in_flight = InFlightGuard::new();
            let task = spawn_handler(&entry, &token, &event);
            if let Err(err) =
                supervise(&entry.options.id, event.kind, task, entry.options.timeout, &token).await
            {
                inner.record(err);
            }
        });
    }

    /// Invokes every environment callback with `(old, new)`, highest priority
    /// first.
    ///
    /// Serialized with [`dispatch`](Self::dispatch).
    pub async fn dispatch_env(
        &self,
        ctx: &CancellationToken,
        old: Environment,
        new: Environment,
    ) -> Vec<HandlerError> {
        if self.is_stopped() {
            return Vec::new();
        }

        let _serial = self.inner.dispatch_lock.lock().await;
        let started = Instant::now();
        let mut errors = Vec::new();

        for entry in self.env_snapshot() {
            let handler = Arc::clone(&entry.handler);
            let id = entry.options.id.clone();

            if entry.options.is_async {
                let inner = Arc::clone(&self.inner);
                let token = inner.root.child_token();
                self.inner.tracker.spawn(async move {
                    let _in_flight = InFlightGuard::new();
                    let task = tokio::task::spawn_blocking(move || handler(old, new));
                    if let Err(err) =
                        supervise(&id, EventKind::EnvChanged, task, Duration::ZERO, &token).await
                    {
                        inner.record(err);
                    }
                });
                continue;
            }

            if ctx.is_cancelled() {
                debug!(callback_id = %id, "environment dispatch cancelled, skipping");
                continue;
            }
            let task = tokio::task::spawn_blocking(move || handler(old, new));
            if let Err(err) =
                supervise(&id, EventKind::EnvChanged, task, Duration::ZERO, ctx).await
            {
                self.inner.record(err.clone());
                errors.push(err);
            }
        }

        record_dispatch(EventKind::EnvChanged.as_str(), started.elapsed());
        errors
    }

    /// The most recent handler failures, oldest first.
    pub fn recent_errors(&self) -> Vec<HandlerError> {
        self.inner.errors.lock().iter().cloned().collect()
    }

    /// Clears the failure log.
    pub fn clear_errors(&self) {
        self.inner.errors.lock().clear();
    }

    /// Background handlers still running.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Stops accepting dispatches, cancels background handlers and waits up
    /// to `grace` for them to finish.
    ///
    /// Returns `true` if everything drained in time.
    pub async fn stop(&self, grace: Duration) -> bool {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return self.inner.tracker.is_empty();
        }
        info!(in_flight = self.in_flight(), "stopping callback registry");
        self.inner.tracker.close();
        self.inner.root.cancel();

        let drained = tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_ok();
        if drained {
            info!("callback registry stopped");
        } else {
            warn!(
                remaining = self.in_flight(),
                grace_ms = grace.as_millis(),
                "grace window elapsed with callbacks still running"
            );
        }
        drained
    }
}

fn check_id(id: &str) -> ConfigResult<()> {
    if id.trim().is_empty() {
        return Err(ConfigError::invalid_value(
            "id",
            "callback id must not be empty",
        ));
    }
    Ok(())
}

fn spawn_handler<T>(
    entry: &ConfigEntry<T>,
    token: &CancellationToken,
    event: &Arc<CallbackEvent<T>>,
) -> JoinHandle<anyhow::Result<()>>
where
    T: Send + Sync + 'static,
{
    let ctx = HandlerContext::new(Arc::clone(&entry.options), token.clone());
    let event = Arc::clone(event);
    match &entry.handler {
        Handler::Blocking(f) => {
            let f = Arc::clone(f);
            tokio::task::spawn_blocking(move || f(&ctx, event.as_ref()))
        }
        Handler::Future(f) => tokio::spawn(f(ctx, event)),
    }
}
