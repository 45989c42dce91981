//! The integrated configuration manager.
//!
//! The current value lives behind an [`ArcSwap`], so readers never lock.
//! Reloads, whether triggered by the watcher, an environment switch or a
//! manual call, are serialized by one mutex and all go through the same
//! load, compare, swap and dispatch path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_callbacks::{aggregate, CallbackEvent, CallbackRegistry, EventKind};
use strata_config::{ConfigFile, Debouncer, Discovery, FileChangeEvent, FileWatcher, LoadMetadata, Loaded, Loader};
use strata_core::{ConfigError, ConfigResult, Configurable, Environment, ErrorKind, APP_ENV};
use strata_telemetry::metrics::record_reload;
use strata_telemetry::ReloadOutcome;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::builder::{ConfigSource, ManagerBuilder, Settings};
use crate::environment::{EnvSwitch, EnvVarWatch, EnvironmentManager};

/// Everything the builder resolved before the manager exists.
pub(crate) struct Assembly<T> {
    pub(crate) source: ConfigSource,
    pub(crate) type_hint: Option<String>,
    pub(crate) discovery: Discovery,
    pub(crate) loader: Loader<T>,
    pub(crate) settings: Settings,
    pub(crate) environment: Environment,
    pub(crate) file: ConfigFile,
    pub(crate) loaded: Loaded<T>,
}

/// Loads, watches and publishes one configuration tree.
///
/// Cloning is cheap and every clone drives the same manager.
///
/// # Example
///
/// ```no_run
/// use strata::prelude::*;
///
/// # #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, Schema)]
/// # struct Settings { port: i32 }
/// # impl Configurable for Settings {}
/// # async fn run() -> Result<(), ConfigError> {
/// let manager = ConfigManager::<Settings>::builder().dir("conf").build()?;
/// manager.callbacks().register(
///     CallbackOptions::new("log-port").on(EventKind::ConfigChanged),
///     |_ctx, event| {
///         if let Some(new) = &event.new_value {
///             println!("port is now {}", new.port);
///         }
///         Ok(())
///     },
/// )?;
/// manager.start().await?;
/// println!("serving on {}", manager.config().port);
/// manager.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct ConfigManager<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ConfigManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for ConfigManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("source", &self.inner.source)
            .field("file", &self.inner.file.load().path)
            .field("started", &self.inner.started.load(Ordering::Acquire))
            .field("stopped", &self.inner.stopped.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

struct Inner<T> {
    source: ConfigSource,
    type_hint: Option<String>,
    discovery: Discovery,
    loader: Loader<T>,
    settings: Settings,
    current: ArcSwap<T>,
    metadata: ArcSwap<LoadMetadata>,
    file: ArcSwap<ConfigFile>,
    reload_lock: tokio::sync::Mutex<()>,
    callbacks: CallbackRegistry<T>,
    environment: EnvironmentManager<T>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// What a filesystem event means for the loaded file.
#[derive(Debug, PartialEq, Eq)]
enum Triage {
    Ignore,
    Reload,
    Gone(PathBuf),
}

impl<T> ConfigManager<T>
where
    T: Configurable + Serialize + DeserializeOwned,
{
    /// Starts a builder using `T::default` as the default value.
    pub fn builder() -> ManagerBuilder<T> {
        ManagerBuilder::new()
    }

    pub(crate) fn assemble(parts: Assembly<T>) -> Self {
        let Assembly {
            source,
            type_hint,
            discovery,
            loader,
            settings,
            environment,
            file,
            loaded,
        } = parts;
        let callbacks = CallbackRegistry::new();

        Self {
            inner: Arc::new(Inner {
                source,
                type_hint,
                discovery,
                loader,
                settings,
                current: ArcSwap::from_pointee(loaded.value),
                metadata: ArcSwap::from_pointee(loaded.metadata),
                file: ArcSwap::from_pointee(file),
                reload_lock: tokio::sync::Mutex::new(()),
                environment: EnvironmentManager::new(environment, callbacks.clone()),
                callbacks,
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// The current configuration. Treat it as read-only; clone to modify.
    pub fn config(&self) -> Arc<T> {
        self.inner.current.load_full()
    }

    /// Metadata of the last successful load.
    pub fn metadata(&self) -> Arc<LoadMetadata> {
        self.inner.metadata.load_full()
    }

    /// Descriptor of the file currently loaded.
    pub fn config_file(&self) -> Arc<ConfigFile> {
        self.inner.file.load_full()
    }

    /// Where configuration is read from.
    pub fn source(&self) -> &ConfigSource {
        &self.inner.source
    }

    /// The current environment.
    pub fn environment(&self) -> Environment {
        self.inner.environment.current()
    }

    /// Config and environment callbacks.
    pub fn callbacks(&self) -> &CallbackRegistry<T> {
        &self.inner.callbacks
    }

    /// The environment manager sharing this manager's registry.
    pub fn environments(&self) -> &EnvironmentManager<T> {
        &self.inner.environment
    }

    /// Whether [`start`](Self::start) ran and [`stop`](Self::stop) has not.
    pub fn is_running(&self) -> bool {
        self.inner.started.load(Ordering::Acquire) && !self.inner.stopped.load(Ordering::Acquire)
    }

    /// Dispatches the initial `Loaded` event, then starts watching.
    ///
    /// Only callbacks registered before this call see the initial event.
    /// Starting twice is a no-op.
    ///
    /// # Errors
    ///
    /// `Internal` after [`stop`](Self::stop); `NotFound` or `Watch` when the
    /// watch cannot be set up.
    pub async fn start(&self) -> ConfigResult<()> {
        let inner = &self.inner;
        if inner.stopped.load(Ordering::Acquire) {
            return Err(ConfigError::internal("configuration manager already stopped"));
        }
        if inner.started.swap(true, Ordering::AcqRel) {
            debug!("configuration manager already started");
            return Ok(());
        }

        let watcher = match inner.build_watcher() {
            Ok(watcher) => watcher,
            Err(err) => {
                inner.started.store(false, Ordering::Release);
                return Err(err);
            }
        };

        let path = inner.file.load().path.clone();
        let value = self.config();
        inner
            .emit(CallbackEvent::new(EventKind::Loaded, path.clone()).with_values(None, Some(value)))
            .await;

        inner.tasks.spawn(watch_loop(
            Arc::downgrade(inner),
            inner.shutdown.clone(),
            watcher,
            inner.settings.debounce,
        ));
        if let Some(interval) = inner.settings.env_poll_interval {
            inner
                .tasks
                .spawn(poll_env(Arc::downgrade(inner), inner.shutdown.clone(), interval));
        }

        info!(
            path = %path.display(),
            environment = %self.environment(),
            "configuration manager started"
        );
        Ok(())
    }

    /// Reloads now, bypassing the debounce window.
    ///
    /// Returns whether the value changed. A failed load is dispatched as an
    /// `Error` event and returned; the previous value stays in effect.
    /// Callback failures are never returned here.
    ///
    /// # Errors
    ///
    /// Any `FileGone`, `Read`, `Decode`, `Hook` or `Validation` failure.
    pub async fn reload(&self) -> ConfigResult<bool> {
        self.inner.reload("manual").await
    }

    /// Switches environments.
    ///
    /// Environment callbacks run first, then config callbacks receive an
    /// `EnvChanged` event. With a directory source, discovery runs again and
    /// a different best-fit file is loaded.
    ///
    /// # Errors
    ///
    /// The failure of the follow-up reload, if one ran.
    pub async fn set_environment(&self, env: Environment) -> ConfigResult<Option<EnvSwitch>> {
        self.inner.set_environment(env).await
    }

    /// Stops watching and drains background callbacks within the grace
    /// window. Returns `true` if everything finished in time.
    pub async fn stop(&self) -> bool {
        let inner = &self.inner;
        if inner.stopped.swap(true, Ordering::AcqRel) {
            return inner.tasks.is_empty() && inner.callbacks.in_flight() == 0;
        }
        info!("stopping configuration manager");
        let deadline = Instant::now() + inner.settings.grace;

        inner.shutdown.cancel();
        inner.tasks.close();
        let loops_done = tokio::time::timeout(inner.settings.grace, inner.tasks.wait())
            .await
            .is_ok();
        let drained = inner
            .callbacks
            .stop(deadline.saturating_duration_since(Instant::now()))
            .await;

        info!(drained = loops_done && drained, "configuration manager stopped");
        loops_done && drained
    }
}

impl<T> Inner<T>
where
    T: Configurable + Serialize + DeserializeOwned,
{
    fn build_watcher(&self) -> ConfigResult<FileWatcher> {
        let builder = FileWatcher::builder();
        match &self.source {
            ConfigSource::Directory(dir) => builder.watch_dir(dir)?,
            ConfigSource::File(path) => builder.watch_file(path)?,
        }
        .build()
    }

    /// Dispatches `event`, then reports callback failures as one `Error`
    /// event when enabled.
    async fn emit(&self, event: CallbackEvent<T>) {
        let kind = event.kind;
        let source = event.source.clone();
        let errors = self.callbacks.dispatch(&self.shutdown, event).await;
        if kind == EventKind::Error || !self.settings.report_handler_errors {
            return;
        }
        if let Some(err) = aggregate(&errors) {
            self.callbacks
                .dispatch(&self.shutdown, CallbackEvent::error(source, err))
                .await;
        }
    }

    async fn reload(self: &Arc<Self>, trigger: &'static str) -> ConfigResult<bool> {
        let _reload = self.reload_lock.lock().await;
        let env = self.environment.current();

        match self.load_latest(env).await {
            Ok((file, loaded)) => Ok(self.publish(file, loaded).await),
            Err(err) => {
                record_reload(ReloadOutcome::Failed);
                warn!(
                    error = %err,
                    kind = %err.kind(),
                    trigger,
                    "reload rejected, keeping previous configuration"
                );
                let source = self.file.load().path.clone();
                self.emit(CallbackEvent::error(source, err.clone())).await;
                Err(err)
            }
        }
    }

    async fn load_latest(self: &Arc<Self>, env: Environment) -> ConfigResult<(ConfigFile, Loaded<T>)> {
        let inner = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let file = inner.resolve(env)?;
            let loaded = inner.loader.load(&file, env)?;
            Ok((file, loaded))
        })
        .await
        .map_err(|e| ConfigError::internal(format!("load task failed: {e}")))?
    }

    /// The file a reload should read: the best-fit candidate for a
    /// directory source, otherwise the current file while it exists.
    fn resolve(&self, env: Environment) -> ConfigResult<ConfigFile> {
        if let Some(best) = self.best_candidate(env)? {
            return Ok(best);
        }
        let current = self.file.load_full();
        if current.path.is_file() {
            Ok(ConfigFile {
                exists: true,
                ..(*current).clone()
            })
        } else {
            Err(ConfigError::file_gone(&current.path))
        }
    }

    fn best_candidate(&self, env: Environment) -> ConfigResult<Option<ConfigFile>> {
        let ConfigSource::Directory(dir) = &self.source else {
            return Ok(None);
        };
        match self.discovery.find_best(dir, env, self.type_hint.as_deref()) {
            Ok(best) if best.exists => Ok(Some(best)),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// A best-fit file other than the loaded one, if discovery finds one.
    fn rediscover(&self, env: Environment) -> Option<ConfigFile> {
        match self.best_candidate(env) {
            Ok(Some(best)) if best.path != self.file.load().path => Some(best),
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "rediscovery failed");
                None
            }
        }
    }

    async fn publish(&self, file: ConfigFile, loaded: Loaded<T>) -> bool {
        let Loaded { value, metadata } = loaded;
        let source = file.path.clone();
        let changed = self.metadata.load().checksum != metadata.checksum;
        let previous = self.file.load().path.clone();
        if previous != source {
            info!(
                from = %previous.display(),
                to = %source.display(),
                "configuration source switched"
            );
        }
        let checksum = metadata.checksum.clone();
        self.file.store(Arc::new(file));
        self.metadata.store(Arc::new(metadata));

        if !changed {
            record_reload(ReloadOutcome::Unchanged);
            debug!(path = %source.display(), checksum = %checksum, "configuration unchanged");
            let current = self.current.load_full();
            let mut kinds = vec![EventKind::Loaded];
            if self.settings.fire_on_unchanged {
                kinds.extend([EventKind::Reloaded, EventKind::ConfigChanged]);
            }
            for kind in kinds {
                let event = CallbackEvent::new(kind, source.clone())
                    .with_values(Some(Arc::clone(&current)), Some(Arc::clone(&current)));
                self.emit(event).await;
            }
            return false;
        }

        let new = Arc::new(value);
        let old = self.current.swap(Arc::clone(&new));
        record_reload(ReloadOutcome::Changed);
        info!(path = %source.display(), checksum = %checksum, "configuration reloaded");

        for kind in [EventKind::Reloaded, EventKind::ConfigChanged] {
            let event = CallbackEvent::new(kind, source.clone())
                .with_values(Some(Arc::clone(&old)), Some(Arc::clone(&new)));
            self.emit(event).await;
        }
        true
    }

    async fn set_environment(self: &Arc<Self>, env: Environment) -> ConfigResult<Option<EnvSwitch>> {
        let Some(switch) = self.environment.set_environment(&self.shutdown, env).await else {
            return Ok(None);
        };

        let mut event = CallbackEvent::env_changed(switch.old, switch.new);
        event.source = self.file.load().path.clone();
        self.emit(event).await;

        if let Some(best) = self.rediscover(env) {
            info!(
                path = %best.path.display(),
                environment = %env,
                "environment switch selects a different file"
            );
            self.reload("environment").await?;
        }
        Ok(Some(switch))
    }

    fn triage(&self, change: &FileChangeEvent) -> Triage {
        let current = self.file.load_full();
        let touches_current = same_file(&change.path, &current.path);
        if touches_current && current.path.is_file() {
            return Triage::Reload;
        }
        if self.rediscover(self.environment.current()).is_some() {
            return Triage::Reload;
        }
        if touches_current {
            Triage::Gone(current.path.clone())
        } else {
            Triage::Ignore
        }
    }

    async fn file_gone(&self, path: PathBuf) {
        let _reload = self.reload_lock.lock().await;
        warn!(path = %path.display(), "configuration file disappeared, keeping last value");
        self.emit(CallbackEvent::error(path.clone(), ConfigError::file_gone(path)))
            .await;
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    a.file_name() == b.file_name()
        && match (a.parent(), b.parent()) {
            (Some(pa), Some(pb)) => match (pa.canonicalize(), pb.canonicalize()) {
                (Ok(ca), Ok(cb)) => ca == cb,
                _ => false,
            },
            _ => false,
        }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

async fn watch_loop<T>(
    inner: Weak<Inner<T>>,
    shutdown: CancellationToken,
    mut watcher: FileWatcher,
    window: Duration,
) where
    T: Configurable + Serialize + DeserializeOwned,
{
    let mut debouncer = Debouncer::new(window);
    let mut gone = false;

    loop {
        let deadline = debouncer.deadline();
        tokio::select! {
            () = shutdown.cancelled() => break,
            change = watcher.next() => {
                let Some(change) = change else {
                    warn!("file watcher closed");
                    break;
                };
                let Some(inner) = inner.upgrade() else { break };
                match inner.triage(&change) {
                    Triage::Ignore => {
                        debug!(path = %change.path.display(), kind = ?change.kind, "ignoring change");
                    }
                    Triage::Reload => {
                        gone = false;
                        debouncer.on_change(Instant::now());
                    }
                    Triage::Gone(path) => {
                        debouncer.cancel();
                        if !std::mem::replace(&mut gone, true) {
                            inner.file_gone(path).await;
                        }
                    }
                }
            }
            () = sleep_until(deadline) => {
                if !debouncer.try_fire(Instant::now()) {
                    continue;
                }
                let Some(inner) = inner.upgrade() else { break };
                if let Err(err) = inner.reload("watch").await {
                    debug!(error = %err, "watched reload failed");
                }
                debouncer.finish();
            }
        }
    }
    debug!("watch loop exited");
}

async fn poll_env<T>(inner: Weak<Inner<T>>, shutdown: CancellationToken, interval: Duration)
where
    T: Configurable + Serialize + DeserializeOwned,
{
    let mut watch = EnvVarWatch::new(std::env::var(APP_ENV).ok());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(env) = watch.observe(std::env::var(APP_ENV).ok()) else { continue };
                let Some(inner) = inner.upgrade() else { break };
                if let Err(err) = inner.set_environment(env).await {
                    warn!(error = %err, environment = %env, "environment switch from APP_ENV failed");
                }
            }
        }
    }
    debug!("environment poller exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("app.yaml");
        let dotted = dir.path().join(".").join("app.yaml");
        assert!(same_file(&a, &a));
        assert!(same_file(&a, &dotted));
        assert!(!same_file(&a, &dir.path().join("other.yaml")));
    }

    #[tokio::test]
    async fn test_sleep_until_without_deadline_pends() {
        let res = tokio::time::timeout(Duration::from_millis(20), sleep_until(None)).await;
        assert!(res.is_err());
        sleep_until(Some(Instant::now())).await;
    }
}
