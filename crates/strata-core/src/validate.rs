//! Declarative validation rules and violation aggregation.
//!
//! The rule functions in [`rules`] back the field attributes understood by
//! `#[derive(Schema)]`:
//!
//! | Attribute | Rule |
//! |-----------|------|
//! | `required` | value is present (non-empty string/collection, `Some`, non-zero number) |
//! | `min = N` / `max = N` | numeric bound, or length bound for strings and collections |
//! | `url` | non-empty strings parse as an absolute URL |
//! | `one_of = "a b c"` | non-empty strings are one of the listed words |

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use indexmap::IndexMap;

/// Joins a parent field path and a field name with a dot.
pub fn join_path(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{parent}.{field}")
    }
}

/// A single failed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted field path (`http_server.port`), empty for the root.
    pub field: String,
    /// Rule name (`required`, `min`, `custom`, ...).
    pub rule: String,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Accumulated validation failures for one value tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    violations: Vec<Violation>,
}

impl ValidationErrors {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a violation.
    pub fn push(
        &mut self,
        field: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.violations.push(Violation {
            field: field.into(),
            rule: rule.into(),
            message: message.into(),
        });
    }

    /// Appends all violations from another collection.
    pub fn extend(&mut self, other: Self) {
        self.violations.extend(other.violations);
    }

    /// Returns true if nothing failed.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of violations.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Iterates over the violations in the order they were found.
    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }

    /// Returns true if some violation targets `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Values that can satisfy the `required` rule.
pub trait Presence {
    /// Returns true if the value counts as set.
    fn is_present(&self) -> bool;
}

/// What a bound rule compares against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measured {
    /// Numeric magnitude.
    Number(f64),
    /// Length of a string or collection.
    Length(usize),
}

/// Values that `min`/`max` can bound.
pub trait Measure {
    /// Returns the measured quantity, or `None` to skip the rule.
    fn measure(&self) -> Option<Measured>;
}

/// Values that text rules (`url`, `one_of`) inspect.
pub trait AsText {
    /// Returns the text, or `None` to skip the rule.
    fn as_text(&self) -> Option<&str>;
}

macro_rules! impl_numeric {
    ($($ty:ty),*) => {
        $(
            impl Presence for $ty {
                #[allow(clippy::float_cmp)]
                fn is_present(&self) -> bool {
                    *self != (0 as $ty)
                }
            }

            impl Measure for $ty {
                #[allow(clippy::cast_lossless, clippy::cast_precision_loss)]
                fn measure(&self) -> Option<Measured> {
                    Some(Measured::Number(*self as f64))
                }
            }
        )*
    };
}

impl_numeric!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl Presence for bool {
    fn is_present(&self) -> bool {
        *self
    }
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl Measure for String {
    fn measure(&self) -> Option<Measured> {
        Some(Measured::Length(self.chars().count()))
    }
}

impl AsText for String {
    fn as_text(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl Presence for PathBuf {
    fn is_present(&self) -> bool {
        !self.as_os_str().is_empty()
    }
}

impl Presence for Duration {
    fn is_present(&self) -> bool {
        !self.is_zero()
    }
}

impl Measure for Duration {
    fn measure(&self) -> Option<Measured> {
        Some(Measured::Number(self.as_secs_f64()))
    }
}

impl<T> Presence for Option<T> {
    fn is_present(&self) -> bool {
        self.is_some()
    }
}

impl<T: Measure> Measure for Option<T> {
    fn measure(&self) -> Option<Measured> {
        self.as_ref().and_then(Measure::measure)
    }
}

impl AsText for Option<String> {
    fn as_text(&self) -> Option<&str> {
        self.as_deref()
    }
}

macro_rules! impl_collection {
    ($($ty:ident < $($param:ident),+ >),*) => {
        $(
            impl<$($param),+> Presence for $ty<$($param),+> {
                fn is_present(&self) -> bool {
                    !self.is_empty()
                }
            }

            impl<$($param),+> Measure for $ty<$($param),+> {
                fn measure(&self) -> Option<Measured> {
                    Some(Measured::Length(self.len()))
                }
            }
        )*
    };
}

impl_collection!(Vec<T>, HashMap<K, V>, BTreeMap<K, V>, IndexMap<K, V>);

/// Rule implementations called by generated `Schema::check_fields` code.
pub mod rules {
    use super::{AsText, Measure, Measured, Presence, ValidationErrors};

    /// `required`: the value must be present.
    pub fn required<V: Presence + ?Sized>(value: &V, field: &str, errors: &mut ValidationErrors) {
        if !value.is_present() {
            errors.push(field, "required", "is required");
        }
    }

    /// `min = bound`.
    pub fn min<V: Measure + ?Sized>(
        value: &V,
        bound: f64,
        field: &str,
        errors: &mut ValidationErrors,
    ) {
        match value.measure() {
            Some(Measured::Number(n)) if n < bound => {
                errors.push(field, "min", format!("must be at least {bound}, got {n}"));
            }
            Some(Measured::Length(len)) if (len as f64) < bound => {
                errors.push(field, "min", format!("length must be at least {bound}, got {len}"));
            }
            _ => {}
        }
    }

    /// `max = bound`.
    pub fn max<V: Measure + ?Sized>(
        value: &V,
        bound: f64,
        field: &str,
        errors: &mut ValidationErrors,
    ) {
        match value.measure() {
            Some(Measured::Number(n)) if n > bound => {
                errors.push(field, "max", format!("must be at most {bound}, got {n}"));
            }
            Some(Measured::Length(len)) if (len as f64) > bound => {
                errors.push(field, "max", format!("length must be at most {bound}, got {len}"));
            }
            _ => {}
        }
    }

    /// `url`: non-empty text must parse as an absolute URL.
    pub fn url<V: AsText + ?Sized>(value: &V, field: &str, errors: &mut ValidationErrors) {
        let Some(text) = value.as_text().filter(|t| !t.is_empty()) else {
            return;
        };
        match url::Url::parse(text) {
            Ok(parsed) if parsed.has_host() || parsed.scheme() == "file" => {}
            Ok(_) => errors.push(field, "url", format!("{text} has no host")),
            Err(e) => errors.push(field, "url", format!("{text} is not a valid URL: {e}")),
        }
    }

    /// `one_of = "a b c"`: non-empty text must be one of `allowed`.
    pub fn one_of<V: AsText + ?Sized>(
        value: &V,
        allowed: &[&str],
        field: &str,
        errors: &mut ValidationErrors,
    ) {
        let Some(text) = value.as_text().filter(|t| !t.is_empty()) else {
            return;
        };
        if !allowed.contains(&text) {
            errors.push(
                field,
                "one_of",
                format!("{text} is not one of [{}]", allowed.join(", ")),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::rules;
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "port"), "port");
        assert_eq!(join_path("http_server", "port"), "http_server.port");
    }

    #[test]
    fn test_required() {
        let mut errors = ValidationErrors::new();
        rules::required(&String::new(), "name", &mut errors);
        rules::required(&"svc".to_string(), "ok", &mut errors);
        rules::required(&Option::<u16>::None, "opt", &mut errors);
        rules::required(&0_u32, "count", &mut errors);
        rules::required(&Vec::<String>::new(), "hosts", &mut errors);

        let fields: Vec<_> = errors.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, ["name", "opt", "count", "hosts"]);
    }

    #[test]
    fn test_min_max_numbers() {
        let mut errors = ValidationErrors::new();
        rules::min(&-1_i32, 1.0, "port", &mut errors);
        rules::max(&70_000_i32, 65535.0, "port", &mut errors);
        rules::min(&8080_i32, 1.0, "ok", &mut errors);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|v| v.field == "port"));
        assert_eq!(errors.iter().next().unwrap().rule, "min");
    }

    #[test]
    fn test_min_max_lengths() {
        let mut errors = ValidationErrors::new();
        rules::min(&"ab".to_string(), 3.0, "name", &mut errors);
        rules::max(&vec![1, 2, 3], 2.0, "items", &mut errors);
        assert_eq!(errors.len(), 2);
        assert!(errors.to_string().contains("length must be at least 3"));
    }

    #[test]
    fn test_option_skips_bounds_when_none() {
        let mut errors = ValidationErrors::new();
        rules::min(&Option::<i32>::None, 1.0, "opt", &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_url() {
        let mut errors = ValidationErrors::new();
        rules::url(&"http://localhost:6379".to_string(), "ok", &mut errors);
        rules::url(&String::new(), "empty", &mut errors);
        rules::url(&"not a url".to_string(), "bad", &mut errors);
        rules::url(&Some("redis://cache:6379/0".to_string()), "opt", &mut errors);
        assert_eq!(errors.len(), 1);
        assert!(errors.has_field("bad"));
    }

    #[test]
    fn test_one_of() {
        let mut errors = ValidationErrors::new();
        rules::one_of(&"json".to_string(), &["json", "text"], "format", &mut errors);
        rules::one_of(&"xml".to_string(), &["json", "text"], "format", &mut errors);
        assert_eq!(errors.len(), 1);
        assert!(errors.to_string().contains("xml is not one of [json, text]"));
    }

    #[test]
    fn test_display_joins_violations() {
        let mut errors = ValidationErrors::new();
        errors.push("a", "required", "is required");
        errors.push("", "custom", "root broken");
        assert_eq!(errors.to_string(), "a: is required; root broken");
        assert!(errors.into_result().is_err());
    }
}
