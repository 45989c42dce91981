//! Opt-in process-wide manager for single-manager applications.
//!
//! Libraries should take a [`ConfigManager`] handle instead.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_core::{ConfigError, ConfigResult, Configurable};

use crate::ConfigManager;

static GLOBAL: OnceLock<Box<dyn Any + Send + Sync>> = OnceLock::new();

/// Installs `manager` as the process-wide manager.
///
/// # Errors
///
/// `Internal` when a manager is already installed.
pub fn install<T>(manager: ConfigManager<T>) -> ConfigResult<()>
where
    T: Configurable + Serialize + DeserializeOwned,
{
    GLOBAL
        .set(Box::new(manager))
        .map_err(|_| ConfigError::internal("global configuration manager already installed"))
}

/// The installed manager, if it manages `T`.
pub fn manager<T>() -> Option<ConfigManager<T>>
where
    T: Configurable + Serialize + DeserializeOwned,
{
    GLOBAL.get()?.downcast_ref::<ConfigManager<T>>().cloned()
}

/// The current value of the installed manager.
pub fn config<T>() -> Option<Arc<T>>
where
    T: Configurable + Serialize + DeserializeOwned,
{
    manager::<T>().map(|m| m.config())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_modules::AppConfig;

    #[test]
    fn test_install_once_and_downcast() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.yaml"), "name: global-svc\n").unwrap();
        let manager = ConfigManager::<AppConfig>::builder()
            .dir(dir.path())
            .environment(strata_core::Environment::Development)
            .build()
            .unwrap();

        install(manager.clone()).unwrap();
        assert!(install(manager).is_err());
        assert_eq!(config::<AppConfig>().unwrap().name, "global-svc");
        assert!(super::manager::<strata_modules::GatewayConfig>().is_none());
    }
}
