//! Environment-aware configuration file discovery.
//!
//! Discovery scans one directory (non-recursively) and ranks every file with a
//! recognised extension:
//!
//! | Pattern | Priority |
//! |---------|----------|
//! | `<hint>.<env>.<ext>` | 100 |
//! | `<name>.<env>.<ext>` | 80 |
//! | `<hint>.<ext>` | 60 |
//! | `<name>.<ext>` | 40 |
//! | starts with the environment prefix (`dev_`, `prod_`, ...) | +10 |
//!
//! `<name>` is one of the configured default names, `<hint>` the caller's type
//! hint. Files tagged for a different environment never match. Ties go to the
//! extension listed first in [`DiscoveryConfig::extensions`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_core::{ConfigError, ConfigResult, Environment};
use tracing::{debug, info};

use crate::Format;

/// Priority of `<hint>.<env>.<ext>`.
pub const PRIORITY_HINT_ENV: i32 = 100;
/// Priority of `<name>.<env>.<ext>`.
pub const PRIORITY_DEFAULT_ENV: i32 = 80;
/// Priority of `<hint>.<ext>`.
pub const PRIORITY_HINT: i32 = 60;
/// Priority of `<name>.<ext>`.
pub const PRIORITY_DEFAULT: i32 = 40;
/// Bonus for a filename carrying the environment prefix.
pub const PREFIX_BONUS: i32 = 10;

/// Naming rules for discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Base names tried in every directory.
    pub default_names: Vec<String>,
    /// Filename prefix per environment.
    pub env_prefixes: HashMap<Environment, String>,
    /// Recognised extensions, in tie-break order.
    pub extensions: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            default_names: vec!["config".into(), "app".into(), "application".into()],
            env_prefixes: Environment::ALL
                .into_iter()
                .map(|env| (env, env.default_prefix().to_string()))
                .collect(),
            extensions: vec!["yaml".into(), "yml".into(), "json".into(), "toml".into()],
        }
    }
}

/// A candidate configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Full path.
    pub path: PathBuf,
    /// Base name with any environment prefix or suffix removed.
    pub name: String,
    /// Lowercase extension without the dot.
    pub extension: String,
    /// Environment the file is tagged for, if any.
    pub environment: Option<Environment>,
    /// Discovery rank; higher wins.
    pub priority: i32,
    /// False when discovery found nothing and this describes where a file
    /// would be created.
    pub exists: bool,
}

impl ConfigFile {
    /// Describes an explicitly chosen file.
    ///
    /// # Errors
    ///
    /// Returns `Decode` when the extension is not a supported format.
    pub fn from_path(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if Format::from_extension(&extension).is_none() {
            return Err(ConfigError::decode(
                &path,
                extension,
                "unsupported configuration file extension",
            ));
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let exists = path.is_file();
        Ok(Self {
            path,
            name,
            extension,
            environment: None,
            priority: 0,
            exists,
        })
    }

    /// Decoder for this file.
    pub fn format(&self) -> Option<Format> {
        Format::from_extension(&self.extension)
    }
}

/// Locates the best-fit configuration file in a directory.
///
/// # Example
///
/// ```no_run
/// use strata_config::Discovery;
/// use strata_core::Environment;
///
/// # fn main() -> Result<(), strata_core::ConfigError> {
/// let file = Discovery::default().find_best("conf".as_ref(), Environment::Production, Some("gateway"))?;
/// if file.exists {
///     println!("loading {}", file.path.display());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    config: DiscoveryConfig,
}

impl Discovery {
    /// Creates a discovery with the given naming rules.
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// The naming rules in use.
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Returns the highest-priority candidate.
    ///
    /// When recognised files exist but none match, returns a descriptor with
    /// `exists == false` pointing at `<hint or first name>.<first ext>`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the directory is missing or holds no file with a
    /// recognised extension; `Read` when it cannot be listed.
    pub fn find_best(
        &self,
        dir: &Path,
        env: Environment,
        type_hint: Option<&str>,
    ) -> ConfigResult<ConfigFile> {
        let (recognised, mut candidates) = self.collect(dir, env, type_hint)?;
        if recognised == 0 {
            return Err(ConfigError::not_found(dir));
        }

        if candidates.is_empty() {
            let missing = self.placeholder(dir, type_hint);
            debug!(dir = %dir.display(), environment = %env, "no matching configuration file");
            return Ok(missing);
        }

        let best = candidates.remove(0);
        info!(
            path = %best.path.display(),
            priority = best.priority,
            environment = %env,
            "discovered configuration file"
        );
        Ok(best)
    }

    /// Returns every matching candidate, best first.
    pub fn scan(
        &self,
        dir: &Path,
        env: Environment,
        type_hint: Option<&str>,
    ) -> ConfigResult<Vec<ConfigFile>> {
        self.collect(dir, env, type_hint).map(|(_, files)| files)
    }

    /// Ranks one filename. Returns `None` when it does not match.
    pub fn classify(
        &self,
        dir: &Path,
        file_name: &str,
        env: Environment,
        type_hint: Option<&str>,
    ) -> Option<ConfigFile> {
        let (stem, ext) = file_name.rsplit_once('.')?;
        let extension = ext.to_ascii_lowercase();
        if self.extension_rank(&extension).is_none() {
            return None;
        }

        let (stem, prefixed) = match self.config.env_prefixes.get(&env) {
            Some(prefix) if !prefix.is_empty() && stem.len() > prefix.len() => {
                match strip_prefix_ignore_case(stem, prefix) {
                    Some(rest) => (rest, true),
                    None => (stem, false),
                }
            }
            _ => (stem, false),
        };

        let (name, env_suffix) = match stem.rsplit_once('.') {
            Some((name, suffix)) => match suffix.parse::<Environment>() {
                Ok(tagged) if tagged == env => (name, true),
                Ok(_) => return None,
                Err(_) => (stem, false),
            },
            None => (stem, false),
        };

        let is_hint = type_hint.is_some_and(|hint| name.eq_ignore_ascii_case(hint));
        let is_default = self
            .config
            .default_names
            .iter()
            .any(|default| name.eq_ignore_ascii_case(default));

        let base = match (env_suffix, is_hint, is_default) {
            (true, true, _) => PRIORITY_HINT_ENV,
            (true, false, true) => PRIORITY_DEFAULT_ENV,
            (false, true, _) => PRIORITY_HINT,
            (false, false, true) => PRIORITY_DEFAULT,
            (_, false, false) => return None,
        };

        Some(ConfigFile {
            path: dir.join(file_name),
            name: name.to_string(),
            extension,
            environment: (env_suffix || prefixed).then_some(env),
            priority: base + if prefixed { PREFIX_BONUS } else { 0 },
            exists: true,
        })
    }

    /// Writes `value` as a new default file in `dir` and describes it.
    ///
    /// # Errors
    ///
    /// `Read` when the directory or file cannot be written, `Internal` when the
    /// value cannot be encoded.
    pub fn create_default<T: Serialize>(
        &self,
        dir: &Path,
        name: &str,
        format: Format,
        value: &T,
    ) -> ConfigResult<ConfigFile> {
        let text = format.encode(value)?;
        fs::create_dir_all(dir).map_err(|e| ConfigError::read_error(dir, e))?;
        let path = dir.join(format!("{name}.{}", format.extension()));
        fs::write(&path, text).map_err(|e| ConfigError::read_error(&path, e))?;
        info!(path = %path.display(), "created default configuration file");

        Ok(ConfigFile {
            priority: if self.config.default_names.iter().any(|n| n == name) {
                PRIORITY_DEFAULT
            } else {
                PRIORITY_HINT
            },
            ..ConfigFile::from_path(path)?
        })
    }

    fn collect(
        &self,
        dir: &Path,
        env: Environment,
        type_hint: Option<&str>,
    ) -> ConfigResult<(usize, Vec<ConfigFile>)> {
        let entries = fs::read_dir(dir).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::not_found(dir)
            } else {
                ConfigError::read_error(dir, e)
            }
        })?;

        let mut recognised = 0;
        let mut candidates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ConfigError::read_error(dir, e))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let known = file_name
                .rsplit_once('.')
                .is_some_and(|(_, ext)| self.extension_rank(&ext.to_ascii_lowercase()).is_some());
            if !known {
                continue;
            }
            recognised += 1;
            if let Some(file) = self.classify(dir, file_name, env, type_hint) {
                candidates.push(file);
            }
        }

        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| self.extension_rank(&a.extension).cmp(&self.extension_rank(&b.extension)))
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok((recognised, candidates))
    }

    fn extension_rank(&self, ext: &str) -> Option<usize> {
        self.config
            .extensions
            .iter()
            .position(|known| known.eq_ignore_ascii_case(ext))
    }

    fn placeholder(&self, dir: &Path, type_hint: Option<&str>) -> ConfigFile {
        let name = type_hint
            .map(str::to_string)
            .or_else(|| self.config.default_names.first().cloned())
            .unwrap_or_else(|| "config".to_string());
        let extension = self
            .config
            .extensions
            .first()
            .cloned()
            .unwrap_or_else(|| "yaml".to_string());
        ConfigFile {
            path: dir.join(format!("{name}.{extension}")),
            name,
            extension,
            environment: None,
            priority: 0,
            exists: false,
        }
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::ErrorKind;
    use tempfile::TempDir;

    fn dir_with(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in files {
            fs::write(dir.path().join(file), "{}").unwrap();
        }
        dir
    }

    fn best(dir: &TempDir, env: Environment, hint: Option<&str>) -> ConfigFile {
        Discovery::default().find_best(dir.path(), env, hint).unwrap()
    }

    #[test]
    fn test_priority_table() {
        let d = Discovery::default();
        let dir = Path::new("/etc/app");
        let env = Environment::Production;
        let rank = |name: &str| d.classify(dir, name, env, Some("gateway")).map(|f| f.priority);

        assert_eq!(rank("gateway.production.yaml"), Some(100));
        assert_eq!(rank("config.production.yaml"), Some(80));
        assert_eq!(rank("gateway.yaml"), Some(60));
        assert_eq!(rank("config.yaml"), Some(40));
        assert_eq!(rank("prod_gateway.yaml"), Some(70));
        assert_eq!(rank("prod_config.toml"), Some(50));
        assert_eq!(rank("prod_gateway.production.json"), Some(110));
        assert_eq!(rank("other.yaml"), None);
        assert_eq!(rank("gateway.txt"), None);
    }

    #[test]
    fn test_other_environment_excluded() {
        let d = Discovery::default();
        let dir = Path::new(".");
        let env = Environment::Development;
        assert!(d.classify(dir, "config.production.yaml", env, None).is_none());
        assert!(d.classify(dir, "prod_gateway.yaml", env, Some("gateway")).is_none());
        assert!(d.classify(dir, "dev_gateway.yaml", env, Some("gateway")).is_some());
    }

    #[test]
    fn test_find_best_picks_highest_priority() {
        let dir = dir_with(&["config.yaml", "gateway.yaml", "dev_gateway.yaml", "notes.txt"]);
        let file = best(&dir, Environment::Development, Some("gateway"));
        assert_eq!(file.name, "gateway");
        assert!(file.path.ends_with("dev_gateway.yaml"));
        assert_eq!(file.environment, Some(Environment::Development));
        assert!(file.exists);
    }

    #[test]
    fn test_tie_broken_by_extension_order() {
        let dir = dir_with(&["config.toml", "config.json", "config.yml"]);
        let file = best(&dir, Environment::Development, None);
        assert_eq!(file.extension, "yml");

        let custom = Discovery::new(DiscoveryConfig {
            extensions: vec!["toml".into(), "json".into()],
            ..DiscoveryConfig::default()
        });
        let file = custom
            .find_best(dir.path(), Environment::Development, None)
            .unwrap();
        assert_eq!(file.extension, "toml");
    }

    #[test]
    fn test_extension_case_insensitive() {
        let dir = dir_with(&["APP.YAML"]);
        let file = best(&dir, Environment::Test, None);
        assert_eq!(file.extension, "yaml");
        assert_eq!(file.format(), Some(Format::Yaml));
    }

    #[test]
    fn test_no_recognised_files_is_not_found() {
        let dir = dir_with(&["notes.txt"]);
        let err = Discovery::default()
            .find_best(dir.path(), Environment::Development, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = Discovery::default()
            .find_best(Path::new("/definitely/not/here"), Environment::Development, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_unmatched_recognised_files_give_placeholder() {
        let dir = dir_with(&["prod_gateway.yaml"]);
        let file = best(&dir, Environment::Development, Some("gateway"));
        assert!(!file.exists);
        assert!(file.path.ends_with("gateway.yaml"));
    }

    #[test]
    fn test_scan_orders_candidates() {
        let dir = dir_with(&["config.yaml", "gateway.development.json", "gateway.toml"]);
        let files = Discovery::default()
            .scan(dir.path(), Environment::Development, Some("gateway"))
            .unwrap();
        let priorities: Vec<_> = files.iter().map(|f| f.priority).collect();
        assert_eq!(priorities, vec![100, 60, 40]);
    }

    #[test]
    fn test_create_default_writes_file() {
        let dir = TempDir::new().unwrap();
        let value = serde_json::json!({"http_server": {"port": 8080}});
        let d = Discovery::default();
        let file = d
            .create_default(dir.path(), "gateway", Format::Yaml, &value)
            .unwrap();
        assert!(file.exists);
        assert_eq!(file.priority, PRIORITY_HINT);

        let found = d
            .find_best(dir.path(), Environment::Development, Some("gateway"))
            .unwrap();
        assert_eq!(found.path, file.path);
    }

    #[test]
    fn test_from_path_rejects_unknown_extension() {
        assert!(ConfigFile::from_path("config.ini").is_err());
        let file = ConfigFile::from_path("/tmp/none/app.toml").unwrap();
        assert!(!file.exists);
        assert_eq!(file.format(), Some(Format::Toml));
    }
}
