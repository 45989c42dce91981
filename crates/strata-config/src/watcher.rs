//! File watching for configuration hot-reload.
//!
//! This module provides the [`FileWatcher`], which reports changes to the
//! configuration file (or, in directory mode, to any recognised file), and the
//! [`Debouncer`] state machine that coalesces bursts of changes into a single
//! reload.
//!
//! # Architecture
//!
//! The watcher uses the `notify` crate for cross-platform file system events.
//! It always watches the *parent directory* non-recursively, so a deleted file
//! that is later recreated is noticed again.
//!
//! ```text
//! Idle --change--> Debouncing --change--> Debouncing (deadline moved)
//!                  Debouncing --deadline--> Loading --finish--> Idle
//! ```
//!
//! # Example
//!
//! ```no_run
//! use strata_config::FileWatcher;
//!
//! # async fn example() -> Result<(), strata_core::ConfigError> {
//! let mut watcher = FileWatcher::builder()
//!     .watch_file("conf/gateway.yaml")?
//!     .build()?;
//!
//! while let Some(event) = watcher.next().await {
//!     println!("{:?} {}", event.kind, event.path.display());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use strata_core::{ConfigError, ConfigResult};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::Format;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// A relevant filesystem change.
#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    /// Path to the changed file.
    pub path: PathBuf,
    /// Kind of change.
    pub kind: FileChangeKind,
    /// When the change was observed.
    pub timestamp: Instant,
}

/// Kind of file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    /// File was created.
    Created,
    /// File content or metadata changed.
    Modified,
    /// File was deleted.
    Deleted,
    /// File was renamed or replaced by a rename.
    Renamed,
}

impl FileChangeKind {
    fn from_event(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(ModifyKind::Name(_)) => Some(Self::Renamed),
            EventKind::Modify(_) | EventKind::Any | EventKind::Other => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Deleted),
            EventKind::Access(_) => None,
        }
    }
}

/// What the watcher reports.
#[derive(Debug, Clone, Default)]
enum Target {
    /// Only these file names inside the watched directories.
    #[default]
    Files,
    /// Any file with a recognised configuration extension.
    AnyConfig,
}

/// Builder for a [`FileWatcher`].
#[derive(Debug, Default)]
pub struct FileWatcherBuilder {
    dirs: Vec<PathBuf>,
    files: HashSet<PathBuf>,
    target: Target,
}

impl FileWatcherBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch a single configuration file.
    ///
    /// The parent directory is watched so the file may be deleted and
    /// recreated.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the parent directory does not exist.
    pub fn watch_file<P: AsRef<Path>>(mut self, path: P) -> ConfigResult<Self> {
        let path = absolute(path.as_ref());
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if !parent.is_dir() {
            return Err(ConfigError::not_found(parent));
        }
        if !self.dirs.contains(&parent) {
            self.dirs.push(parent);
        }
        self.files.insert(path);
        Ok(self)
    }

    /// Watch every recognised configuration file in `dir`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `dir` does not exist.
    pub fn watch_dir<P: AsRef<Path>>(mut self, dir: P) -> ConfigResult<Self> {
        let dir = absolute(dir.as_ref());
        if !dir.is_dir() {
            return Err(ConfigError::not_found(dir));
        }
        if !self.dirs.contains(&dir) {
            self.dirs.push(dir);
        }
        self.target = Target::AnyConfig;
        Ok(self)
    }

    /// Build the watcher and start receiving events.
    ///
    /// # Errors
    ///
    /// Returns `Watch` if nothing was configured or the platform watcher
    /// cannot be created.
    pub fn build(self) -> ConfigResult<FileWatcher> {
        if self.dirs.is_empty() {
            return Err(ConfigError::Watch(
                "no paths configured for file watcher".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    // Only send if channel is open
                    let _ = tx.blocking_send(event);
                }
                Err(e) => warn!(error = %e, "file watch error"),
            }
        })
        .map_err(|e| ConfigError::Watch(format!("failed to create file watcher: {e}")))?;

        for dir in &self.dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| {
                    ConfigError::Watch(format!("failed to watch {}: {e}", dir.display()))
                })?;
            debug!(dir = %dir.display(), "watching directory");
        }

        Ok(FileWatcher {
            _watcher: watcher,
            rx,
            files: self.files,
            target: self.target,
        })
    }
}

/// Filesystem watcher for configuration hot-reload.
///
/// Dropping the watcher releases the platform watch handle.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Event>,
    files: HashSet<PathBuf>,
    target: Target,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("files", &self.files)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Create a new file watcher builder.
    #[must_use]
    pub fn builder() -> FileWatcherBuilder {
        FileWatcherBuilder::new()
    }

    /// Wait for the next relevant change.
    ///
    /// Returns `None` once the platform watcher has shut down.
    pub async fn next(&mut self) -> Option<FileChangeEvent> {
        loop {
            let event = self.rx.recv().await?;
            if let Some(change) = self.process_event(&event) {
                return Some(change);
            }
        }
    }

    /// Return a pending relevant change without waiting.
    pub fn poll(&mut self) -> Option<FileChangeEvent> {
        while let Ok(event) = self.rx.try_recv() {
            if let Some(change) = self.process_event(&event) {
                return Some(change);
            }
        }
        None
    }

    fn process_event(&self, event: &Event) -> Option<FileChangeEvent> {
        let kind = FileChangeKind::from_event(&event.kind)?;
        let path = event.paths.iter().find(|p| self.is_relevant(p))?.clone();

        Some(FileChangeEvent {
            path,
            kind,
            timestamp: Instant::now(),
        })
    }

    fn is_relevant(&self, path: &Path) -> bool {
        match self.target {
            Target::AnyConfig => Format::from_path(path).is_some(),
            Target::Files => {
                let path = absolute(path);
                self.files.contains(&path)
                    || self
                        .files
                        .iter()
                        .any(|f| f.file_name() == path.file_name() && same_dir(f, &path))
            }
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.parent(), b.parent()) {
        (Some(pa), Some(pb)) => {
            pa == pb
                || matches!(
                    (pa.canonicalize(), pb.canonicalize()),
                    (Ok(ca), Ok(cb)) if ca == cb
                )
        }
        _ => false,
    }
}

/// Reload state of one watched source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    /// Waiting for changes.
    Idle,
    /// A change arrived; reload when the deadline passes.
    Debouncing {
        /// When the reload fires unless another change arrives first.
        deadline: Instant,
    },
    /// A reload is running.
    Loading,
}

/// Trailing-edge debounce state machine.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use strata_config::{Debouncer, ReloadState};
///
/// let mut debouncer = Debouncer::new(Duration::from_millis(200));
/// let t0 = Instant::now();
/// debouncer.on_change(t0);
/// debouncer.on_change(t0 + Duration::from_millis(150));
/// assert!(!debouncer.try_fire(t0 + Duration::from_millis(250)));
/// assert!(debouncer.try_fire(t0 + Duration::from_millis(350)));
/// assert_eq!(debouncer.state(), ReloadState::Loading);
/// debouncer.finish();
/// assert_eq!(debouncer.state(), ReloadState::Idle);
/// ```
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    state: ReloadState,
    pending: bool,
}

impl Debouncer {
    /// Create a debouncer with the given quiet window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: ReloadState::Idle,
            pending: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReloadState {
        self.state
    }

    /// The quiet window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records a change at `now`, starting or restarting the timer.
    ///
    /// A change during `Loading` is remembered and restarts debouncing once
    /// the load finishes.
    pub fn on_change(&mut self, now: Instant) {
        match self.state {
            ReloadState::Idle | ReloadState::Debouncing { .. } => {
                self.state = ReloadState::Debouncing {
                    deadline: now + self.window,
                };
            }
            ReloadState::Loading => self.pending = true,
        }
    }

    /// Deadline of the running timer, if any.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            ReloadState::Debouncing { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Moves to `Loading` if the deadline has passed. Returns true when the
    /// caller should reload now.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        match self.state {
            ReloadState::Debouncing { deadline } if now >= deadline => {
                self.state = ReloadState::Loading;
                true
            }
            _ => false,
        }
    }

    /// Drops any running timer and pending change.
    pub fn cancel(&mut self) {
        self.state = ReloadState::Idle;
        self.pending = false;
    }

    /// Marks the reload finished.
    pub fn finish(&mut self) {
        self.finish_at(Instant::now());
    }

    /// Marks the reload finished at `now`.
    pub fn finish_at(&mut self, now: Instant) {
        if std::mem::take(&mut self.pending) {
            self.state = ReloadState::Debouncing {
                deadline: now + self.window,
            };
        } else {
            self.state = ReloadState::Idle;
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::{sleep, timeout};

    #[test]
    fn test_file_change_kind_from_event_kind() {
        assert_eq!(
            FileChangeKind::from_event(&EventKind::Create(notify::event::CreateKind::File)),
            Some(FileChangeKind::Created)
        );
        assert_eq!(
            FileChangeKind::from_event(&EventKind::Modify(ModifyKind::Data(
                notify::event::DataChange::Any
            ))),
            Some(FileChangeKind::Modified)
        );
        assert_eq!(
            FileChangeKind::from_event(&EventKind::Modify(ModifyKind::Name(
                notify::event::RenameMode::To
            ))),
            Some(FileChangeKind::Renamed)
        );
        assert_eq!(
            FileChangeKind::from_event(&EventKind::Remove(notify::event::RemoveKind::File)),
            Some(FileChangeKind::Deleted)
        );
        assert_eq!(
            FileChangeKind::from_event(&EventKind::Access(notify::event::AccessKind::Any)),
            None
        );
    }

    #[test]
    fn test_debouncer_coalesces_changes() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(200));
        assert_eq!(d.state(), ReloadState::Idle);
        assert!(!d.try_fire(t0));

        d.on_change(t0);
        d.on_change(t0 + Duration::from_millis(100));
        assert_eq!(d.deadline(), Some(t0 + Duration::from_millis(300)));
        assert!(!d.try_fire(t0 + Duration::from_millis(250)));
        assert!(d.try_fire(t0 + Duration::from_millis(300)));
        assert!(!d.try_fire(t0 + Duration::from_millis(301)));

        d.finish();
        assert_eq!(d.state(), ReloadState::Idle);
    }

    #[test]
    fn test_debouncer_change_during_loading() {
        let t0 = Instant::now();
        let mut d = Debouncer::default();
        d.on_change(t0);
        assert!(d.try_fire(t0 + DEFAULT_DEBOUNCE));

        d.on_change(t0 + Duration::from_millis(250));
        assert_eq!(d.state(), ReloadState::Loading);

        let done = t0 + Duration::from_millis(300);
        d.finish_at(done);
        assert_eq!(d.deadline(), Some(done + DEFAULT_DEBOUNCE));
    }

    #[test]
    fn test_debouncer_cancel_drops_pending() {
        let t0 = Instant::now();
        let mut d = Debouncer::default();
        d.on_change(t0);
        assert!(d.try_fire(t0 + DEFAULT_DEBOUNCE));
        d.on_change(t0 + Duration::from_millis(210));
        d.cancel();
        assert_eq!(d.state(), ReloadState::Idle);
        d.finish();
        assert_eq!(d.deadline(), None);
    }

    #[test]
    fn test_build_no_paths() {
        let err = FileWatcherBuilder::new().build().unwrap_err();
        assert!(err.to_string().contains("no paths configured"));
    }

    #[test]
    fn test_watch_missing_dir() {
        let err = FileWatcherBuilder::new()
            .watch_dir("/nonexistent/path")
            .unwrap_err();
        assert_eq!(err.kind(), strata_core::ErrorKind::NotFound);
        assert!(FileWatcherBuilder::new()
            .watch_file("/nonexistent/dir/app.yaml")
            .is_err());
    }

    #[test]
    fn test_watch_file_may_not_exist_yet() {
        let temp_dir = TempDir::new().unwrap();
        let result = FileWatcher::builder()
            .watch_file(temp_dir.path().join("later.yaml"))
            .unwrap()
            .build();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_file_change_detection() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("gateway.yaml");
        fs::write(&config_path, "port: 1").unwrap();

        let mut watcher = FileWatcher::builder()
            .watch_file(&config_path)
            .unwrap()
            .build()
            .unwrap();

        // Give the watcher time to start
        sleep(Duration::from_millis(100)).await;

        fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();
        fs::write(&config_path, "port: 2").unwrap();

        match timeout(Duration::from_secs(2), watcher.next()).await {
            Ok(Some(event)) => {
                assert_eq!(event.path.file_name(), config_path.file_name());
            }
            // File system events can be unreliable in CI
            Ok(None) | Err(_) => {}
        }
    }

    #[tokio::test]
    async fn test_dir_mode_filters_extensions() {
        let temp_dir = TempDir::new().unwrap();
        let mut watcher = FileWatcher::builder()
            .watch_dir(temp_dir.path())
            .unwrap()
            .build()
            .unwrap();

        sleep(Duration::from_millis(100)).await;
        fs::write(temp_dir.path().join("readme.txt"), "readme").unwrap();
        sleep(Duration::from_millis(100)).await;

        if let Some(e) = watcher.poll() {
            assert_ne!(e.path.extension().and_then(|s| s.to_str()), Some("txt"));
        }
    }
}
