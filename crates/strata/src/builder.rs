//! Manager construction.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_callbacks::DEFAULT_GRACE;
use strata_config::{
    ConfigFile, Discovery, DiscoveryConfig, Format, Loader, LoaderOptions, DEFAULT_DEBOUNCE,
};
use strata_core::{ConfigError, ConfigResult, Configurable, Environment, ErrorKind};
use tracing::{debug, info, warn};

use crate::manager::{Assembly, ConfigManager};

/// Variable naming an explicit configuration file or directory.
pub const CONFIG_PATH: &str = "CONFIG_PATH";

/// Where the manager reads its configuration from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Pick the best-fit file in a directory; re-resolved on environment
    /// switches and renames.
    Directory(PathBuf),
    /// One explicit file.
    File(PathBuf),
}

impl ConfigSource {
    /// Directory if `path` is one or has no recognised extension, file
    /// otherwise.
    pub fn infer(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.is_dir() && Format::from_path(&path).is_some() {
            Self::File(path)
        } else {
            Self::Directory(path)
        }
    }

    fn absolute(self) -> Self {
        match self {
            Self::Directory(dir) => Self::Directory(absolute(&dir)),
            Self::File(file) => Self::File(absolute(&file)),
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Runtime knobs of a built manager.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) debounce: Duration,
    pub(crate) grace: Duration,
    pub(crate) fire_on_unchanged: bool,
    pub(crate) report_handler_errors: bool,
    pub(crate) env_poll_interval: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            grace: DEFAULT_GRACE,
            fire_on_unchanged: false,
            report_handler_errors: true,
            env_poll_interval: None,
        }
    }
}

type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Builder for [`ConfigManager`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use strata::prelude::*;
///
/// # #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, Schema)]
/// # struct Settings { name: String }
/// # impl Configurable for Settings {}
/// # fn main() -> Result<(), ConfigError> {
/// let manager = ConfigManager::<Settings>::builder()
///     .dir("conf")
///     .type_hint("gateway")
///     .environment(Environment::Production)
///     .debounce(Duration::from_millis(100))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ManagerBuilder<T> {
    source: Option<ConfigSource>,
    type_hint: Option<String>,
    environment: Option<Environment>,
    factory: Option<Factory<T>>,
    discovery: DiscoveryConfig,
    loader: LoaderOptions,
    settings: Settings,
    create_missing: Option<Format>,
}

impl<T> std::fmt::Debug for ManagerBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerBuilder")
            .field("source", &self.source)
            .field("type_hint", &self.type_hint)
            .field("environment", &self.environment)
            .field("settings", &self.settings)
            .field("create_missing", &self.create_missing)
            .finish_non_exhaustive()
    }
}

impl<T> Default for ManagerBuilder<T>
where
    T: Configurable + Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ManagerBuilder<T>
where
    T: Configurable + Serialize + DeserializeOwned,
{
    /// Creates a builder with default settings and `T::default` as factory.
    pub fn new() -> Self {
        Self {
            source: None,
            type_hint: None,
            environment: None,
            factory: None,
            discovery: DiscoveryConfig::default(),
            loader: LoaderOptions::default(),
            settings: Settings::default(),
            create_missing: None,
        }
    }

    /// Discover the configuration file in `dir`.
    #[must_use]
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source = Some(ConfigSource::Directory(dir.into()));
        self
    }

    /// Load exactly `path`.
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(ConfigSource::File(path.into()));
        self
    }

    /// Set the source directly.
    #[must_use]
    pub fn source(mut self, source: ConfigSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Extra base name accepted by discovery.
    #[must_use]
    pub fn type_hint(mut self, hint: impl Into<String>) -> Self {
        self.type_hint = Some(hint.into());
        self
    }

    /// Initial environment. Defaults to `APP_ENV`.
    #[must_use]
    pub fn environment(mut self, env: Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Constructor for the default value files are decoded onto.
    #[must_use]
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Discovery naming rules.
    #[must_use]
    pub fn discovery(mut self, config: DiscoveryConfig) -> Self {
        self.discovery = config;
        self
    }

    /// Loader options.
    #[must_use]
    pub fn loader_options(mut self, options: LoaderOptions) -> Self {
        self.loader = options;
        self
    }

    /// Apply `PREFIX__SECTION__FIELD` variable overrides on every load.
    #[must_use]
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.loader.env_prefix = Some(prefix.into());
        self
    }

    /// Quiet window before a watched change reloads.
    #[must_use]
    pub fn debounce(mut self, window: Duration) -> Self {
        self.settings.debounce = window;
        self
    }

    /// How long [`ConfigManager::stop`] waits for background callbacks.
    #[must_use]
    pub fn grace(mut self, grace: Duration) -> Self {
        self.settings.grace = grace;
        self
    }

    /// Also dispatch `Reloaded` and `ConfigChanged` when a reload produced
    /// an identical value.
    #[must_use]
    pub fn fire_on_unchanged(mut self, enabled: bool) -> Self {
        self.settings.fire_on_unchanged = enabled;
        self
    }

    /// Dispatch an `Error` event aggregating callback failures.
    #[must_use]
    pub fn report_handler_errors(mut self, enabled: bool) -> Self {
        self.settings.report_handler_errors = enabled;
        self
    }

    /// Poll `APP_ENV` at `interval` and switch environments when it changes.
    #[must_use]
    pub fn env_poll_interval(mut self, interval: Duration) -> Self {
        self.settings.env_poll_interval = Some(interval).filter(|i| !i.is_zero());
        self
    }

    /// Write the factory value as a new file when nothing is found.
    #[must_use]
    pub fn create_missing(mut self, format: Format) -> Self {
        self.create_missing = Some(format);
        self
    }

    /// Reads `.env`, then `APP_ENV` and `CONFIG_PATH`.
    ///
    /// Without `CONFIG_PATH` and no source set yet, the working directory is
    /// searched.
    ///
    /// # Errors
    ///
    /// `InvalidEnvironment` when `APP_ENV` holds an unknown value.
    pub fn from_env(self) -> ConfigResult<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env file"),
            Err(err) if err.not_found() => {}
            Err(err) => warn!(error = %err, "ignoring unreadable .env file"),
        }
        self.from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup and no
    /// `.env` file.
    ///
    /// # Errors
    ///
    /// `InvalidEnvironment` when `APP_ENV` holds an unknown value.
    pub fn from_lookup<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.environment = Some(Environment::from_lookup(&lookup)?);
        match lookup(CONFIG_PATH).filter(|path| !path.trim().is_empty()) {
            Some(path) => self.source = Some(ConfigSource::infer(path)),
            None if self.source.is_none() => self.source = Some(ConfigSource::Directory(".".into())),
            None => {}
        }
        Ok(self)
    }

    /// Resolves and loads the initial configuration.
    ///
    /// # Errors
    ///
    /// `NotFound` when no file exists and `create_missing` is off, otherwise
    /// any `Decode`, `Hook` or `Validation` failure of the first load.
    pub fn build(self) -> ConfigResult<ConfigManager<T>> {
        let source = self
            .source
            .ok_or_else(|| ConfigError::internal("no configuration source; call dir() or file()"))?
            .absolute();
        let environment = match self.environment {
            Some(env) => env,
            None => Environment::from_env()?,
        };
        let loader = match self.factory {
            Some(factory) => Loader::new(move || factory()),
            None => Loader::new(T::default),
        }
        .with_options(self.loader);
        let discovery = Discovery::new(self.discovery);

        let file = initial_file(
            &discovery,
            &source,
            self.type_hint.as_deref(),
            environment,
            self.create_missing,
            &loader,
        )?;
        let loaded = loader.load(&file, environment)?;

        Ok(ConfigManager::assemble(Assembly {
            source,
            type_hint: self.type_hint,
            discovery,
            loader,
            settings: self.settings,
            environment,
            file,
            loaded,
        }))
    }
}

fn initial_file<T>(
    discovery: &Discovery,
    source: &ConfigSource,
    type_hint: Option<&str>,
    env: Environment,
    create: Option<Format>,
    loader: &Loader<T>,
) -> ConfigResult<ConfigFile>
where
    T: Configurable + Serialize + DeserializeOwned,
{
    match source {
        ConfigSource::Directory(dir) => {
            let missing = match discovery.find_best(dir, env, type_hint) {
                Ok(file) if file.exists => return Ok(file),
                Ok(_) => ConfigError::not_found(dir),
                Err(err) if err.kind() == ErrorKind::NotFound => err,
                Err(err) => return Err(err),
            };
            let Some(format) = create else {
                return Err(missing);
            };
            let name = default_name(discovery, type_hint);
            discovery.create_default(dir, &name, format, &loader.default_value())
        }
        ConfigSource::File(path) => {
            let file = ConfigFile::from_path(path)?;
            if file.exists {
                return Ok(file);
            }
            if create.is_none() {
                return Err(ConfigError::not_found(path));
            }
            let format = file
                .format()
                .ok_or_else(|| ConfigError::internal("descriptor without a format"))?;
            let text = format.encode(&loader.default_value())?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| ConfigError::read_error(parent, e))?;
            }
            fs::write(path, text).map_err(|e| ConfigError::read_error(path, e))?;
            info!(path = %path.display(), "created default configuration file");
            ConfigFile::from_path(path)
        }
    }
}

fn default_name(discovery: &Discovery, type_hint: Option<&str>) -> String {
    type_hint
        .map(str::to_string)
        .or_else(|| discovery.config().default_names.first().cloned())
        .unwrap_or_else(|| "config".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_infer_source() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            ConfigSource::infer(dir.path()),
            ConfigSource::Directory(dir.path().to_path_buf())
        );
        assert_eq!(
            ConfigSource::infer("conf/app.toml"),
            ConfigSource::File("conf/app.toml".into())
        );
        assert_eq!(
            ConfigSource::infer("conf"),
            ConfigSource::Directory("conf".into())
        );
    }

    #[test]
    fn test_from_lookup_reads_env_and_path() {
        let vars: HashMap<&str, &str> =
            [("APP_ENV", "staging"), ("CONFIG_PATH", "/etc/svc/app.yaml")].into();
        let builder = ManagerBuilder::<strata_modules::AppConfig>::new()
            .from_lookup(|key| vars.get(key).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(builder.environment, Some(Environment::Staging));
        assert_eq!(
            builder.source,
            Some(ConfigSource::File("/etc/svc/app.yaml".into()))
        );
    }

    #[test]
    fn test_from_lookup_defaults_to_working_dir() {
        let builder = ManagerBuilder::<strata_modules::AppConfig>::new()
            .from_lookup(|_| None)
            .unwrap();
        assert_eq!(builder.environment, Some(Environment::Development));
        assert_eq!(builder.source, Some(ConfigSource::Directory(".".into())));

        let kept = ManagerBuilder::<strata_modules::AppConfig>::new()
            .dir("conf")
            .from_lookup(|_| None)
            .unwrap();
        assert_eq!(kept.source, Some(ConfigSource::Directory("conf".into())));
    }

    #[test]
    fn test_from_lookup_rejects_unknown_env() {
        let err = ManagerBuilder::<strata_modules::AppConfig>::new()
            .from_lookup(|key| (key == "APP_ENV").then(|| "qa".to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_zero_poll_interval_disables_poller() {
        let builder =
            ManagerBuilder::<strata_modules::AppConfig>::new().env_poll_interval(Duration::ZERO);
        assert_eq!(builder.settings.env_poll_interval, None);
    }

    #[test]
    fn test_build_without_source() {
        let err = ManagerBuilder::<strata_modules::AppConfig>::new()
            .environment(Environment::Test)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
