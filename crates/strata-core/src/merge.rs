//! Field-wise default merging.
//!
//! `merge_from` fills a value from a defaults tree wherever the value still
//! holds its zero value: `0`, `false`, an empty string, an empty collection or
//! `None`. Collections are adopted whole, never merged element-wise. Nested
//! configurables recurse through the impls generated by `#[derive(Schema)]`.

use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};
use std::path::PathBuf;
use std::time::Duration;

use indexmap::IndexMap;

use crate::Environment;

/// Zero-value aware merge.
pub trait Merge {
    /// Adopts `defaults` for every part of `self` that is zero-valued.
    fn merge_from(&mut self, defaults: &Self);
}

/// Merges `defaults` into `partial` and returns the result.
///
/// # Example
///
/// ```
/// use strata_core::merge_defaults;
///
/// let merged = merge_defaults(String::new(), &"fallback".to_string());
/// assert_eq!(merged, "fallback");
/// ```
pub fn merge_defaults<T: Merge>(mut partial: T, defaults: &T) -> T {
    partial.merge_from(defaults);
    partial
}

macro_rules! impl_merge_zero {
    ($($ty:ty),*) => {
        $(
            impl Merge for $ty {
                #[allow(clippy::float_cmp)]
                fn merge_from(&mut self, defaults: &Self) {
                    if *self == (0 as $ty) {
                        *self = *defaults;
                    }
                }
            }
        )*
    };
}

impl_merge_zero!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl Merge for bool {
    fn merge_from(&mut self, defaults: &Self) {
        if !*self {
            *self = *defaults;
        }
    }
}

impl Merge for String {
    fn merge_from(&mut self, defaults: &Self) {
        if self.is_empty() {
            self.clone_from(defaults);
        }
    }
}

impl Merge for PathBuf {
    fn merge_from(&mut self, defaults: &Self) {
        if self.as_os_str().is_empty() {
            self.clone_from(defaults);
        }
    }
}

impl Merge for Duration {
    fn merge_from(&mut self, defaults: &Self) {
        if self.is_zero() {
            *self = *defaults;
        }
    }
}

impl Merge for serde_json::Value {
    fn merge_from(&mut self, defaults: &Self) {
        if self.is_null() {
            self.clone_from(defaults);
        }
    }
}

impl<T: Merge + Clone> Merge for Option<T> {
    fn merge_from(&mut self, defaults: &Self) {
        match (self.as_mut(), defaults) {
            (None, _) => self.clone_from(defaults),
            (Some(value), Some(default)) => value.merge_from(default),
            (Some(_), None) => {}
        }
    }
}

impl<T: Clone> Merge for Vec<T> {
    fn merge_from(&mut self, defaults: &Self) {
        if self.is_empty() {
            self.clone_from(defaults);
        }
    }
}

impl<K: Clone + Eq + Hash, V: Clone, S: BuildHasher + Clone> Merge for HashMap<K, V, S> {
    fn merge_from(&mut self, defaults: &Self) {
        if self.is_empty() {
            self.clone_from(defaults);
        }
    }
}

impl<K: Clone + Ord, V: Clone> Merge for BTreeMap<K, V> {
    fn merge_from(&mut self, defaults: &Self) {
        if self.is_empty() {
            self.clone_from(defaults);
        }
    }
}

impl<K: Clone + Eq + Hash, V: Clone, S: BuildHasher + Clone> Merge for IndexMap<K, V, S> {
    fn merge_from(&mut self, defaults: &Self) {
        if self.is_empty() {
            self.clone_from(defaults);
        }
    }
}

/// Implements [`Merge`] for enum-like types whose `Default` is their zero value.
///
/// ```
/// use strata_core::{merge_as_default, Merge};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Default)]
/// enum Mode { #[default] Unset, Fast }
/// merge_as_default!(Mode);
///
/// let mut mode = Mode::Unset;
/// mode.merge_from(&Mode::Fast);
/// assert_eq!(mode, Mode::Fast);
/// ```
#[macro_export]
macro_rules! merge_as_default {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Merge for $ty {
                fn merge_from(&mut self, defaults: &Self) {
                    if *self == <$ty as ::core::default::Default>::default() {
                        self.clone_from(defaults);
                    }
                }
            }
        )+
    };
}

/// Implements [`Merge`] as a no-op for types that have no zero value.
#[macro_export]
macro_rules! merge_never {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Merge for $ty {
                fn merge_from(&mut self, _defaults: &Self) {}
            }
        )+
    };
}

merge_never!(Environment);
