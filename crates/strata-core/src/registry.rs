//! Registry of module default constructors.

use std::any::{type_name, Any};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{validate, Configurable};

type Factory = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;
type DefaultCheck = Arc<dyn Fn() -> ConfigResult<()> + Send + Sync>;

#[derive(Clone)]
struct Entry {
    type_name: &'static str,
    factory: Factory,
    check: DefaultCheck,
}

/// Default constructors keyed by module name.
///
/// Modules register once at startup; the loader and tests then ask for fresh
/// defaults by name without knowing where the type is defined.
///
/// # Example
///
/// ```
/// use strata_core::{Configurable, Schema, SchemaRegistry};
///
/// #[derive(Debug, Clone, Default, Schema)]
/// struct RetryConfig {
///     #[config(min = 1)]
///     attempts: u32,
/// }
///
/// impl Configurable for RetryConfig {}
///
/// let registry = SchemaRegistry::new();
/// registry.register_default("retry", || RetryConfig { attempts: 3 });
/// let retry: RetryConfig = registry.default_for("retry").unwrap();
/// assert_eq!(retry.attempts, 3);
/// ```
#[derive(Default)]
pub struct SchemaRegistry {
    entries: RwLock<IndexMap<String, Entry>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the default constructor for `module`, replacing any earlier one.
    pub fn register_default<T, F>(&self, module: impl Into<String>, factory: F)
    where
        T: Configurable,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let module = module.into();
        let factory = Arc::new(factory);
        let make = Arc::clone(&factory);
        let entry = Entry {
            type_name: type_name::<T>(),
            factory: Arc::new(move || Box::new(make()) as Box<dyn Any + Send>),
            check: Arc::new(move || validate(&factory())),
        };
        debug!(module = %module, schema = entry.type_name, "registered module default");
        self.entries.write().insert(module, entry);
    }

    /// Builds a fresh default for `module`.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when nothing is registered under that name or the
    /// registered type is not `T`.
    pub fn default_for<T: Configurable>(&self, module: &str) -> ConfigResult<T> {
        let factory = {
            let entries = self.entries.read();
            let entry = entries
                .get(module)
                .ok_or_else(|| ConfigError::internal(format!("no default registered for module {module}")))?;
            Arc::clone(&entry.factory)
        };
        factory().downcast::<T>().map(|boxed| *boxed).map_err(|_| {
            ConfigError::internal(format!(
                "module {module} is not a {}",
                type_name::<T>()
            ))
        })
    }

    /// Returns true if `module` has a registered default.
    pub fn contains(&self, module: &str) -> bool {
        self.entries.read().contains_key(module)
    }

    /// Registered module names, in registration order.
    pub fn modules(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Rust type name registered for `module`.
    pub fn schema_name(&self, module: &str) -> Option<&'static str> {
        self.entries.read().get(module).map(|e| e.type_name)
    }

    /// Deep copy. Owned configuration trees never share mutable state.
    pub fn clone_value<T: Configurable>(&self, value: &T) -> T {
        value.clone()
    }

    /// Runs the full validation walk on `value`.
    pub fn validate<T: Configurable>(&self, value: &T) -> ConfigResult<()> {
        validate(value)
    }

    /// Fills zero-valued fields of `partial` from `defaults`.
    pub fn merge_defaults<T: Configurable>(&self, mut partial: T, defaults: &T) -> T {
        partial.merge_from(defaults);
        partial
    }

    /// Validates every registered default, returning the failures by module.
    pub fn check_defaults(&self) -> Vec<(String, ConfigError)> {
        let checks: Vec<(String, DefaultCheck)> = self
            .entries
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.check)))
            .collect();

        checks
            .into_iter()
            .filter_map(|(name, check)| check().err().map(|err| (name, err)))
            .collect()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read();
        f.debug_map()
            .entries(entries.iter().map(|(k, v)| (k, v.type_name)))
            .finish()
    }
}
