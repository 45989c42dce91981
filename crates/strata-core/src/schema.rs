//! Configuration schema traits and tree walks.
//!
//! A configuration type derives [`Schema`] (declarative field rules and the
//! nested-field plumbing) and implements [`Configurable`] for its optional
//! hooks:
//!
//! ```
//! use strata_core::{Configurable, ConfigError, Schema};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Schema)]
//! struct ServerConfig {
//!     #[config(required)]
//!     host: String,
//!     #[config(min = 1, max = 65535)]
//!     port: i32,
//! }
//!
//! impl Configurable for ServerConfig {
//!     fn validate(&self) -> Result<(), ConfigError> {
//!         if self.host == "0.0.0.0" && self.port == 80 {
//!             return Err(ConfigError::invalid_value("port", "refusing to bind :80 on all interfaces"));
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let config = ServerConfig { host: String::new(), port: 0 };
//! let err = strata_core::validate(&config).unwrap_err();
//! assert_eq!(err.violations().unwrap().len(), 2);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::hash::BuildHasher;

use indexmap::IndexMap;

use crate::error::{ConfigError, ConfigResult, HookStage};
use crate::merge::Merge;
use crate::validate::{join_path, ValidationErrors};

/// Field-level structure of a configuration type.
///
/// Implemented by `#[derive(Schema)]`; hand-written impls are possible but
/// rarely needed.
pub trait Schema {
    /// Applies the declarative field rules of this level only.
    fn check_fields(&self, path: &str, errors: &mut ValidationErrors);

    /// Validates every nested configurable field.
    fn validate_children(&self, path: &str, errors: &mut ValidationErrors);

    /// Runs the before-load walk on every nested configurable field.
    fn before_load_children(&mut self) -> ConfigResult<()>;

    /// Runs the after-load walk on every nested configurable field.
    fn after_load_children(&mut self) -> ConfigResult<()>;
}

/// A configuration value managed by the engine.
///
/// All three hooks default to no-ops, so `impl Configurable for MyConfig {}`
/// is enough when the declarative rules cover everything.
pub trait Configurable: Schema + Merge + Clone + Default + Send + Sync + 'static {
    /// Imperative validation, run after the declarative rules of this level.
    ///
    /// `ConfigError::Validation` field paths are relative to this value.
    fn validate(&self) -> ConfigResult<()> {
        Ok(())
    }

    /// Called on the fresh default instance before the file is decoded onto it.
    fn before_load(&mut self) -> ConfigResult<()> {
        Ok(())
    }

    /// Called after decoding and default merging, before validation.
    fn after_load(&mut self) -> ConfigResult<()> {
        Ok(())
    }
}

/// A field the tree walks descend into.
///
/// `#[derive(Schema)]` implements this for the deriving struct; the container
/// impls below let `#[config(nested)]` work through `Option`, `Vec` and maps.
pub trait Nested {
    /// Validates the value found at `path`.
    fn validate_nested(&self, path: &str, errors: &mut ValidationErrors);

    /// Runs before-load hooks below and at this value.
    fn before_load_nested(&mut self) -> ConfigResult<()>;

    /// Runs after-load hooks below and at this value.
    fn after_load_nested(&mut self) -> ConfigResult<()>;
}

impl<T: Nested> Nested for Option<T> {
    fn validate_nested(&self, path: &str, errors: &mut ValidationErrors) {
        if let Some(inner) = self {
            inner.validate_nested(path, errors);
        }
    }

    fn before_load_nested(&mut self) -> ConfigResult<()> {
        self.as_mut().map_or(Ok(()), Nested::before_load_nested)
    }

    fn after_load_nested(&mut self) -> ConfigResult<()> {
        self.as_mut().map_or(Ok(()), Nested::after_load_nested)
    }
}

impl<T: Nested> Nested for Vec<T> {
    fn validate_nested(&self, path: &str, errors: &mut ValidationErrors) {
        for (i, item) in self.iter().enumerate() {
            item.validate_nested(&format!("{path}[{i}]"), errors);
        }
    }

    fn before_load_nested(&mut self) -> ConfigResult<()> {
        self.iter_mut().try_for_each(Nested::before_load_nested)
    }

    fn after_load_nested(&mut self) -> ConfigResult<()> {
        self.iter_mut().try_for_each(Nested::after_load_nested)
    }
}

macro_rules! impl_nested_map {
    ($($map:ident < K, T $(, $hasher:ident)? >),*) => {
        $(
            impl<K: Display, T: Nested $(, $hasher: BuildHasher)?> Nested for $map<K, T $(, $hasher)?> {
                fn validate_nested(&self, path: &str, errors: &mut ValidationErrors) {
                    for (key, item) in self {
                        item.validate_nested(&join_path(path, &key.to_string()), errors);
                    }
                }

                fn before_load_nested(&mut self) -> ConfigResult<()> {
                    self.values_mut().try_for_each(Nested::before_load_nested)
                }

                fn after_load_nested(&mut self) -> ConfigResult<()> {
                    self.values_mut().try_for_each(Nested::after_load_nested)
                }
            }
        )*
    };
}

impl_nested_map!(BTreeMap<K, T>, HashMap<K, T, S>, IndexMap<K, T, S>);

/// Validates `value` at `path`, collecting violations into `errors`.
///
/// Order per level: declarative rules, then [`Configurable::validate`], then
/// nested fields. A failing imperative check stops descent into that branch.
pub fn validate_tree<T: Configurable>(value: &T, path: &str, errors: &mut ValidationErrors) {
    value.check_fields(path, errors);

    if let Err(err) = value.validate() {
        match err {
            ConfigError::Validation(inner) => {
                for violation in inner.iter() {
                    let field = if violation.field.is_empty() {
                        path.to_string()
                    } else {
                        join_path(path, &violation.field)
                    };
                    errors.push(field, violation.rule.clone(), violation.message.clone());
                }
            }
            other => errors.push(path, "custom", other.to_string()),
        }
        return;
    }

    value.validate_children(path, errors);
}

/// Validates a whole tree.
///
/// # Errors
///
/// Returns `ConfigError::Validation` carrying every violation found.
pub fn validate<T: Configurable>(value: &T) -> ConfigResult<()> {
    let mut errors = ValidationErrors::new();
    validate_tree(value, "", &mut errors);
    errors.into_result().map_err(ConfigError::Validation)
}

/// Runs `before_load` hooks post-order: children first, then `value`.
pub fn before_load_tree<T: Configurable>(value: &mut T) -> ConfigResult<()> {
    value.before_load_children()?;
    value
        .before_load()
        .map_err(|e| as_hook_error(HookStage::BeforeLoad, e))
}

/// Runs `after_load` hooks post-order: children first, then `value`.
pub fn after_load_tree<T: Configurable>(value: &mut T) -> ConfigResult<()> {
    value.after_load_children()?;
    value
        .after_load()
        .map_err(|e| as_hook_error(HookStage::AfterLoad, e))
}

fn as_hook_error(stage: HookStage, err: ConfigError) -> ConfigError {
    match err {
        ConfigError::Hook { .. } => err,
        other => ConfigError::hook(stage, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::rules;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Leaf {
        port: i32,
        trace: Vec<&'static str>,
    }

    impl Merge for Leaf {
        fn merge_from(&mut self, defaults: &Self) {
            self.port.merge_from(&defaults.port);
        }
    }

    impl Schema for Leaf {
        fn check_fields(&self, path: &str, errors: &mut ValidationErrors) {
            rules::min(&self.port, 1.0, &join_path(path, "port"), errors);
        }

        fn validate_children(&self, _path: &str, _errors: &mut ValidationErrors) {}

        fn before_load_children(&mut self) -> ConfigResult<()> {
            Ok(())
        }

        fn after_load_children(&mut self) -> ConfigResult<()> {
            Ok(())
        }
    }

    impl Configurable for Leaf {
        fn validate(&self) -> ConfigResult<()> {
            if self.port == 13 {
                return Err(ConfigError::invalid_value("port", "unlucky"));
            }
            Ok(())
        }

        fn after_load(&mut self) -> ConfigResult<()> {
            self.trace.push("leaf");
            Ok(())
        }
    }

    impl Nested for Leaf {
        fn validate_nested(&self, path: &str, errors: &mut ValidationErrors) {
            validate_tree(self, path, errors);
        }

        fn before_load_nested(&mut self) -> ConfigResult<()> {
            before_load_tree(self)
        }

        fn after_load_nested(&mut self) -> ConfigResult<()> {
            after_load_tree(self)
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Root {
        name: String,
        leaf: Leaf,
        extra: Vec<Leaf>,
        fail_after: bool,
        order: Vec<&'static str>,
    }

    impl Merge for Root {
        fn merge_from(&mut self, defaults: &Self) {
            self.name.merge_from(&defaults.name);
            self.leaf.merge_from(&defaults.leaf);
        }
    }

    impl Schema for Root {
        fn check_fields(&self, path: &str, errors: &mut ValidationErrors) {
            rules::required(&self.name, &join_path(path, "name"), errors);
        }

        fn validate_children(&self, path: &str, errors: &mut ValidationErrors) {
            self.leaf.validate_nested(&join_path(path, "leaf"), errors);
            self.extra.validate_nested(&join_path(path, "extra"), errors);
        }

        fn before_load_children(&mut self) -> ConfigResult<()> {
            self.leaf.before_load_nested()?;
            self.extra.before_load_nested()
        }

        fn after_load_children(&mut self) -> ConfigResult<()> {
            self.leaf.after_load_nested()?;
            self.extra.after_load_nested()
        }
    }

    impl Configurable for Root {
        fn after_load(&mut self) -> ConfigResult<()> {
            self.order.extend(self.leaf.trace.iter().copied());
            self.order.push("root");
            if self.fail_after {
                return Err(ConfigError::internal("derived field missing"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_validate_collects_nested_paths() {
        let root = Root {
            leaf: Leaf {
                port: 0,
                ..Leaf::default()
            },
            extra: vec![
                Leaf {
                    port: 5,
                    ..Leaf::default()
                },
                Leaf::default(),
            ],
            ..Root::default()
        };

        let err = validate(&root).unwrap_err();
        let violations = err.violations().unwrap();
        assert!(violations.has_field("name"));
        assert!(violations.has_field("leaf.port"));
        assert!(violations.has_field("extra[1].port"));
        assert_eq!(violations.len(), 3);
    }

    #[test]
    fn test_imperative_errors_are_prefixed() {
        let root = Root {
            name: "svc".into(),
            leaf: Leaf {
                port: 13,
                ..Leaf::default()
            },
            ..Root::default()
        };
        let err = validate(&root).unwrap_err();
        let violation = err.violations().unwrap().iter().next().unwrap().clone();
        assert_eq!(violation.field, "leaf.port");
        assert_eq!(violation.message, "unlucky");
    }

    #[test]
    fn test_after_load_is_post_order() {
        let mut root = Root {
            name: "svc".into(),
            ..Root::default()
        };
        after_load_tree(&mut root).unwrap();
        assert_eq!(root.order, vec!["leaf", "root"]);
    }

    #[test]
    fn test_hook_failure_is_wrapped() {
        let mut root = Root {
            fail_after: true,
            ..Root::default()
        };
        let err = after_load_tree(&mut root).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Hook);
        assert!(err.to_string().contains("derived field missing"));
    }

    #[test]
    fn test_optional_nested_skipped_when_none() {
        let mut errors = ValidationErrors::new();
        Option::<Leaf>::None.validate_nested("cache", &mut errors);
        assert!(errors.is_empty());
    }
}
