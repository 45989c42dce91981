//! Configuration loader.
//!
//! This module provides the [`Loader`], which turns a [`ConfigFile`] into a
//! validated configuration value:
//!
//! 1. Build a fresh default from the factory and run `before_load` hooks
//! 2. Decode the document with the extension's decoder
//! 3. Lay the document (and any `PREFIX__A__B` environment overrides) over
//!    the serialized default, then deserialize
//! 4. Merge defaults into zero-valued fields
//! 5. Run `after_load` hooks post-order
//! 6. Validate
//! 7. Record [`LoadMetadata`]

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};
use strata_core::{
    after_load_tree, before_load_tree, validate, ConfigError, ConfigResult, Configurable,
    Environment,
};
use tracing::{debug, info};

use crate::overlay::{env_overrides, overlay};
use crate::{ConfigFile, Format};

/// Loader behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Match document keys to field names ignoring ASCII case.
    pub case_insensitive_keys: bool,
    /// Apply `PREFIX__SECTION__KEY` environment variables after the file.
    pub env_prefix: Option<String>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            case_insensitive_keys: true,
            env_prefix: None,
        }
    }
}

/// Facts about the last successful load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadMetadata {
    /// File the value came from (empty for in-memory documents).
    pub path: PathBuf,
    /// When the load finished.
    pub loaded_at: DateTime<Utc>,
    /// Environment active during the load.
    pub environment: Environment,
    /// Decoder used.
    pub format: Format,
    /// Size of the source document in bytes.
    pub file_size: u64,
    /// Hex SHA-1 of the canonical JSON form of the final value.
    pub checksum: String,
}

/// A validated value plus its metadata.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    /// The configuration value.
    pub value: T,
    /// Load facts.
    pub metadata: LoadMetadata,
}

/// Loads configuration files into values of `T`.
///
/// # Example
///
/// ```no_run
/// use strata_config::{ConfigFile, Loader};
/// use strata_core::Environment;
/// # use strata_core::{Configurable, Schema};
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Debug, Clone, Default, Serialize, Deserialize, Schema)]
/// # struct AppConfig { name: String }
/// # impl Configurable for AppConfig {}
///
/// # fn main() -> Result<(), strata_core::ConfigError> {
/// let loader = Loader::new(AppConfig::default);
/// let loaded = loader.load(&ConfigFile::from_path("app.yaml")?, Environment::Development)?;
/// println!("checksum {}", loaded.metadata.checksum);
/// # Ok(())
/// # }
/// ```
pub struct Loader<T> {
    factory: Arc<dyn Fn() -> T + Send + Sync>,
    options: LoaderOptions,
}

impl<T> Clone for Loader<T> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            options: self.options.clone(),
        }
    }
}

impl<T> fmt::Debug for Loader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<T> Loader<T>
where
    T: Configurable + Serialize + DeserializeOwned,
{
    /// Creates a loader whose defaults come from `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            options: LoaderOptions::default(),
        }
    }

    /// Replaces the loader options.
    #[must_use]
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// The options in use.
    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Builds a fresh default value.
    pub fn default_value(&self) -> T {
        (self.factory)()
    }

    /// Loads and validates `file`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the file is missing, `Read` when it cannot be read,
    /// `Decode`, `Hook` or `Validation` from the pipeline stages.
    pub fn load(&self, file: &ConfigFile, env: Environment) -> ConfigResult<Loaded<T>> {
        let format = file.format().ok_or_else(|| {
            ConfigError::decode(&file.path, &file.extension, "unsupported extension")
        })?;
        let text = fs::read_to_string(&file.path)
            .map_err(|e| ConfigError::read_error(&file.path, e))?;
        let loaded = self.load_str(&text, format, &file.path, env)?;
        info!(
            path = %file.path.display(),
            checksum = %loaded.metadata.checksum,
            environment = %env,
            "configuration loaded"
        );
        Ok(loaded)
    }

    /// Runs the pipeline on an in-memory document.
    ///
    /// `path` only labels errors and metadata.
    pub fn load_str(
        &self,
        text: &str,
        format: Format,
        path: &Path,
        env: Environment,
    ) -> ConfigResult<Loaded<T>> {
        let mut target = self.default_value();
        before_load_tree(&mut target)?;

        let doc = format.decode(text, path)?;
        let mut tree = serde_json::to_value(&target)
            .map_err(|e| ConfigError::internal(format!("failed to serialize defaults: {e}")))?;
        overlay(&mut tree, doc, self.options.case_insensitive_keys);

        if let Some(prefix) = &self.options.env_prefix {
            let overrides = env_overrides(prefix, process_vars());
            if overrides.as_object().is_some_and(|m| !m.is_empty()) {
                debug!(prefix = %prefix, "applying environment overrides");
                overlay(&mut tree, overrides, true);
            }
        }

        let mut value: T = serde_json::from_value(tree)
            .map_err(|e| ConfigError::decode(path, format.as_str(), e))?;

        value.merge_from(&self.default_value());
        after_load_tree(&mut value)?;
        validate(&value)?;

        let checksum = checksum(&value)?;
        Ok(Loaded {
            value,
            metadata: LoadMetadata {
                path: path.to_path_buf(),
                loaded_at: Utc::now(),
                environment: env,
                format,
                file_size: text.len() as u64,
                checksum,
            },
        })
    }
}

/// Hex SHA-1 over the canonical (key-sorted) JSON form of `value`.
///
/// Two values with equal serialized content always share a checksum, which is
/// what the reload path uses to detect unchanged documents.
pub fn checksum<T: Serialize>(value: &T) -> ConfigResult<String> {
    let canonical = serde_json::to_value(value)
        .and_then(|tree| serde_json::to_vec(&tree))
        .map_err(|e| ConfigError::internal(format!("failed to serialize value: {e}")))?;
    Ok(format!("{:x}", Sha1::digest(&canonical)))
}

/// Process environment as UTF-8 pairs; other variables are skipped.
fn process_vars() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os().filter_map(|(key, value)| {
        match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                let name = key.unwrap_or_else(|raw| raw.to_string_lossy().into_owned());
                debug!(variable = %name, "skipping non-UTF-8 environment variable");
                None
            }
        }
    })
}

/// Decodes a file into a raw JSON tree without any schema.
pub fn read_document(path: &Path) -> ConfigResult<Value> {
    let format = Format::from_path(path).ok_or_else(|| {
        ConfigError::decode(path, "unknown", "unsupported configuration file extension")
    })?;
    let text = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
    format.decode(&text, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use strata_core::{ErrorKind, Schema};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
    #[serde(default)]
    struct Server {
        #[config(required)]
        host: String,
        #[config(min = 1, max = 65535)]
        port: i32,
        #[serde(with = "strata_core::de::duration")]
        read_timeout: Duration,
        #[serde(skip)]
        endpoint: String,
        labels: Vec<String>,
    }

    impl Default for Server {
        fn default() -> Self {
            Self {
                host: "0.0.0.0".into(),
                port: 8080,
                read_timeout: Duration::from_secs(30),
                endpoint: String::new(),
                labels: Vec::new(),
            }
        }
    }

    impl Configurable for Server {
        fn before_load(&mut self) -> ConfigResult<()> {
            self.labels.push("prepared".into());
            Ok(())
        }

        fn after_load(&mut self) -> ConfigResult<()> {
            if self.host == "fail" {
                return Err(ConfigError::internal("cannot derive endpoint"));
            }
            self.endpoint = format!("{}:{}", self.host, self.port);
            Ok(())
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Schema)]
    #[serde(default)]
    struct Root {
        #[config(nested)]
        http_server: Server,
        name: String,
    }

    impl Configurable for Root {}

    fn loader() -> Loader<Root> {
        Loader::new(|| Root {
            name: "gateway".into(),
            ..Root::default()
        })
    }

    fn load(text: &str) -> ConfigResult<Loaded<Root>> {
        loader().load_str(text, Format::Yaml, Path::new("mem.yaml"), Environment::Development)
    }

    #[test]
    fn test_sparse_document_keeps_defaults() {
        let loaded = load("http_server:\n  port: 9090\n").unwrap();
        let server = &loaded.value.http_server;
        assert_eq!(server.port, 9090);
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.read_timeout, Duration::from_secs(30));
        assert_eq!(loaded.value.name, "gateway");
    }

    #[test]
    fn test_hooks_run() {
        let loaded = load("http_server:\n  host: api.local\n").unwrap();
        assert_eq!(loaded.value.http_server.labels, vec!["prepared".to_string()]);
        assert_eq!(loaded.value.http_server.endpoint, "api.local:8080");
    }

    #[test]
    fn test_explicit_zero_takes_default() {
        let loaded = load("name: \"\"\n").unwrap();
        assert_eq!(loaded.value.name, "gateway");
    }

    #[test]
    fn test_case_insensitive_keys() {
        let loaded = load("HTTP_Server:\n  Port: 7070\n  READ_TIMEOUT: 1m\n").unwrap();
        assert_eq!(loaded.value.http_server.port, 7070);
        assert_eq!(loaded.value.http_server.read_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_section_keeps_defaults() {
        let loaded = load("http_server:\nname:\n").unwrap();
        assert_eq!(loaded.value.http_server.port, 8080);
        assert_eq!(loaded.value.http_server.host, "0.0.0.0");
        assert_eq!(loaded.value.name, "gateway");

        let loaded = load("http_server:\n  host:\n  port: 9090\n").unwrap();
        assert_eq!(loaded.value.http_server.host, "0.0.0.0");
        assert_eq!(loaded.value.http_server.port, 9090);
    }

    #[cfg(unix)]
    #[test]
    fn test_env_overrides_skip_non_utf8_variables() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        std::env::set_var("STRATA_LOADER_RAW_BYTES", OsStr::from_bytes(b"\xff\xfe"));
        std::env::set_var("STRATALOADER__HTTP_SERVER__PORT", "6060");
        let loaded = Loader::new(Root::default)
            .with_options(LoaderOptions {
                env_prefix: Some("STRATALOADER".into()),
                ..LoaderOptions::default()
            })
            .load_str("http_server:\n  host: x\n", Format::Yaml, Path::new("a.yaml"), Environment::Development);
        std::env::remove_var("STRATA_LOADER_RAW_BYTES");
        std::env::remove_var("STRATALOADER__HTTP_SERVER__PORT");

        let loaded = loaded.unwrap();
        assert_eq!(loaded.value.http_server.host, "x");
        assert_eq!(loaded.value.http_server.port, 6060);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        assert!(load("surprise: true\nhttp_server:\n  extra: 1\n").is_ok());
    }

    #[test]
    fn test_validation_failure() {
        let err = load("http_server:\n  port: -1\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.violations().unwrap().has_field("http_server.port"));
    }

    #[test]
    fn test_hook_failure() {
        let err = load("http_server:\n  host: fail\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Hook);
    }

    #[test]
    fn test_decode_failure() {
        let err = load("http_server: [unclosed\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);

        let err = load("http_server:\n  port: eighty\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_checksum_tracks_content() {
        let a = load("http_server:\n  port: 9090\n").unwrap();
        let b = load("# comment\nhttp_server:\n  port: 9090\n").unwrap();
        let c = load("http_server:\n  port: 9091\n").unwrap();
        assert_eq!(a.metadata.checksum, b.metadata.checksum);
        assert_ne!(a.metadata.checksum, c.metadata.checksum);
        assert_eq!(a.metadata.checksum.len(), 40);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gateway.toml");
        fs::write(&path, "[http_server]\nport = 8443\n").unwrap();

        let file = ConfigFile::from_path(&path).unwrap();
        let loaded = loader().load(&file, Environment::Staging).unwrap();
        assert_eq!(loaded.value.http_server.port, 8443);
        assert_eq!(loaded.metadata.format, Format::Toml);
        assert_eq!(loaded.metadata.environment, Environment::Staging);
        assert_eq!(loaded.metadata.path, path);
        assert!(loaded.metadata.file_size > 0);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let file = ConfigFile::from_path("/nonexistent/gateway.yaml").unwrap();
        let err = loader().load(&file, Environment::Development).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_read_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw.json");
        fs::write(&path, r#"{"a": {"b": 1}}"#).unwrap();
        assert_eq!(read_document(&path).unwrap(), serde_json::json!({"a": {"b": 1}}));
    }
}
