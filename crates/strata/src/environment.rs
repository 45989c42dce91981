//! Environment tag tracking.
//!
//! Every environment change, whether it comes from an explicit call or from
//! the `APP_ENV` poller, goes through [`EnvironmentManager::set_environment`]
//! so environment callbacks observe switches in a single order.

use parking_lot::RwLock;
use strata_callbacks::{CallbackRegistry, HandlerError, Priority};
use strata_core::{ConfigResult, Environment};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of an environment switch.
#[derive(Debug, Clone)]
pub struct EnvSwitch {
    /// Environment before the switch.
    pub old: Environment,
    /// Environment after the switch.
    pub new: Environment,
    /// Failures of the synchronous environment callbacks.
    pub errors: Vec<HandlerError>,
}

/// Holds the current environment and runs environment callbacks on change.
pub struct EnvironmentManager<T> {
    current: RwLock<Environment>,
    switch_lock: tokio::sync::Mutex<()>,
    callbacks: CallbackRegistry<T>,
}

impl<T> std::fmt::Debug for EnvironmentManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentManager")
            .field("current", &*self.current.read())
            .finish_non_exhaustive()
    }
}

impl<T> EnvironmentManager<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a manager starting at `initial` that dispatches through
    /// `callbacks`.
    pub fn new(initial: Environment, callbacks: CallbackRegistry<T>) -> Self {
        Self {
            current: RwLock::new(initial),
            switch_lock: tokio::sync::Mutex::new(()),
            callbacks,
        }
    }

    /// The current environment.
    pub fn current(&self) -> Environment {
        *self.current.read()
    }

    /// Registers a synchronous environment callback.
    ///
    /// # Errors
    ///
    /// `DuplicateId` when the ID is already taken.
    pub fn on_change<F>(&self, id: impl Into<String>, priority: Priority, handler: F) -> ConfigResult<()>
    where
        F: Fn(Environment, Environment) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.register_env(id, priority, false, handler)
    }

    /// Switches to `new`.
    ///
    /// Returns `None` when `new` is already current. Otherwise every
    /// environment callback runs with `(old, new)` in priority order before
    /// the tag changes. Concurrent switches are serialized.
    pub async fn set_environment(
        &self,
        ctx: &CancellationToken,
        new: Environment,
    ) -> Option<EnvSwitch> {
        let _switch = self.switch_lock.lock().await;
        let old = self.current();
        if old == new {
            debug!(environment = %new, "environment unchanged");
            return None;
        }

        info!(from = %old, to = %new, "switching environment");
        let errors = self.callbacks.dispatch_env(ctx, old, new).await;
        *self.current.write() = new;
        Some(EnvSwitch { old, new, errors })
    }
}

/// Edge detector for the `APP_ENV` poller.
///
/// Only a change of the raw variable counts, so an explicit
/// `set_environment` is not undone while the variable stays put.
#[derive(Debug, Default)]
pub(crate) struct EnvVarWatch {
    last: Option<String>,
}

impl EnvVarWatch {
    pub(crate) fn new(initial: Option<String>) -> Self {
        Self { last: initial }
    }

    /// Feeds the latest raw value; returns the environment to switch to.
    pub(crate) fn observe(&mut self, raw: Option<String>) -> Option<Environment> {
        let raw = raw.filter(|value| !value.trim().is_empty());
        if raw == self.last {
            return None;
        }
        self.last.clone_from(&raw);
        let value = raw?;
        match value.parse() {
            Ok(env) => Some(env),
            Err(err) => {
                warn!(error = %err, "ignoring invalid APP_ENV value");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_environment_runs_callbacks_then_updates() {
        let registry: CallbackRegistry<()> = CallbackRegistry::new();
        let manager = Arc::new(EnvironmentManager::new(
            Environment::Development,
            registry.clone(),
        ));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        manager
            .on_change("low", Priority::Low, move |old, new| {
                log.lock().push(("low", old, new));
                Ok(())
            })
            .unwrap();
        let log = Arc::clone(&seen);
        manager
            .on_change("high", Priority::High, move |old, new| {
                log.lock().push(("high", old, new));
                Ok(())
            })
            .unwrap();

        let switch = manager
            .set_environment(&CancellationToken::new(), Environment::Production)
            .await
            .unwrap();
        assert_eq!(switch.old, Environment::Development);
        assert_eq!(switch.new, Environment::Production);
        assert!(switch.errors.is_empty());
        assert_eq!(manager.current(), Environment::Production);
        assert_eq!(
            *seen.lock(),
            vec![
                ("high", Environment::Development, Environment::Production),
                ("low", Environment::Development, Environment::Production),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_same_environment_is_noop() {
        let registry: CallbackRegistry<()> = CallbackRegistry::new();
        let manager = EnvironmentManager::new(Environment::Test, registry);
        manager
            .on_change("never", Priority::Normal, |_, _| anyhow::bail!("should not run"))
            .unwrap();
        assert!(manager
            .set_environment(&CancellationToken::new(), Environment::Test)
            .await
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failing_callback_does_not_block_switch() {
        let registry: CallbackRegistry<()> = CallbackRegistry::new();
        let manager = EnvironmentManager::new(Environment::Development, registry);
        manager
            .on_change("broken", Priority::Normal, |_, _| anyhow::bail!("nope"))
            .unwrap();
        let switch = manager
            .set_environment(&CancellationToken::new(), Environment::Staging)
            .await
            .unwrap();
        assert_eq!(switch.errors.len(), 1);
        assert_eq!(switch.errors[0].id, "broken");
        assert_eq!(manager.current(), Environment::Staging);
    }

    #[test]
    fn test_env_var_watch_is_edge_triggered() {
        let mut watch = EnvVarWatch::new(Some("development".into()));
        assert_eq!(watch.observe(Some("development".into())), None);
        assert_eq!(
            watch.observe(Some("PRODUCTION".into())),
            Some(Environment::Production)
        );
        assert_eq!(watch.observe(Some("PRODUCTION".into())), None);
        assert_eq!(watch.observe(Some("bogus".into())), None);
        assert_eq!(watch.observe(None), None);
        assert_eq!(watch.observe(Some("test".into())), Some(Environment::Test));
    }
}
