//! Deployment environment tags.

use std::env::VarError;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::ConfigError;

/// Environment variable holding the initial environment tag.
pub const APP_ENV: &str = "APP_ENV";

/// Deployment profile controlling discovery.
///
/// # Example
///
/// ```
/// use strata_core::Environment;
///
/// let env: Environment = "production".parse().unwrap();
/// assert_eq!(env, Environment::Production);
/// assert!("qa".parse::<Environment>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Automated tests.
    Test,
    /// Pre-production.
    Staging,
    /// Production.
    Production,
}

impl Environment {
    /// All environments, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Development,
        Self::Test,
        Self::Staging,
        Self::Production,
    ];

    /// Canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Default filename prefix (`dev_`, `test_`, `staging_`, `prod_`).
    pub const fn default_prefix(self) -> &'static str {
        match self {
            Self::Development => "dev_",
            Self::Test => "test_",
            Self::Staging => "staging_",
            Self::Production => "prod_",
        }
    }

    /// Returns true for [`Environment::Production`].
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns true for [`Environment::Development`].
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Reads the environment from `APP_ENV`, defaulting to development.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvironment` if `APP_ENV` is set to an
    /// unknown value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(read_var)
    }

    /// Same as [`Environment::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(APP_ENV) {
            Some(value) if !value.trim().is_empty() => value.parse(),
            _ => Ok(Self::default()),
        }
    }
}

fn read_var(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) => Some(value),
        Err(VarError::NotPresent) => None,
        Err(VarError::NotUnicode(raw)) => {
            warn!(variable = key, value = ?raw, "ignoring non-unicode environment variable");
            None
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|env| env.as_str() == normalized)
            .ok_or_else(|| ConfigError::InvalidEnvironment {
                value: s.to_string(),
            })
    }
}

impl Serialize for Environment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
