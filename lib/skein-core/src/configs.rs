//! Immutable, type-keyed configuration store.
//!
//! Every tunable of a call (encoders, validators, middleware, mocks, ...) lives
//! in a [`Configs`] value. Each slot is identified by a zero-sized key type
//! implementing [`ConfigKey`]; the key fixes the value type and its default, so
//! a read can only ever yield a value of the type it was written with.
//!
//! # Example
//!
//! ```
//! use skein_core::{ConfigKey, Configs};
//!
//! struct PageSize;
//!
//! impl ConfigKey for PageSize {
//!     type Value = u32;
//!
//!     fn default_value() -> u32 {
//!         20
//!     }
//! }
//!
//! let configs = Configs::new();
//! let updated = configs.with::<PageSize>(50);
//!
//! assert_eq!(configs.get::<PageSize>(), 20);
//! assert_eq!(updated.get::<PageSize>(), 50);
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A typed configuration slot.
///
/// Implement this on a zero-sized marker type. The marker's [`TypeId`] is the
/// slot identifier, [`ConfigKey::Value`] is the stored type and
/// [`ConfigKey::default_value`] is what unset slots resolve to.
pub trait ConfigKey: Send + Sync + 'static {
    /// The value stored under this key.
    type Value: Clone + Send + Sync + 'static;

    /// Value returned when the slot was never written.
    fn default_value() -> Self::Value;
}

#[derive(Clone)]
struct Slot {
    name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

/// Copy-on-write bag of configuration values.
///
/// Cloning is cheap (one `Arc` bump). Writing through [`Configs::with`] or
/// [`Configs::set`] never affects other handles sharing the same storage.
#[derive(Clone, Default)]
pub struct Configs {
    slots: Arc<HashMap<TypeId, Slot>>,
}

impl Configs {
    /// Creates an empty store where every slot resolves to its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the value of `K`, or its default when unset.
    #[must_use]
    pub fn get<K: ConfigKey>(&self) -> K::Value {
        self.slots
            .get(&TypeId::of::<K>())
            .and_then(|slot| slot.value.downcast_ref::<K::Value>())
            .cloned()
            .unwrap_or_else(K::default_value)
    }

    /// Returns `true` if `K` was explicitly written.
    #[must_use]
    pub fn contains<K: ConfigKey>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<K>())
    }

    /// Returns a new store with `K` set to `value`.
    #[must_use]
    pub fn with<K: ConfigKey>(&self, value: K::Value) -> Self {
        let mut next = self.clone();
        next.set::<K>(value);
        next
    }

    /// Returns a new store with `K` replaced by `f(current)`.
    #[must_use]
    pub fn update<K: ConfigKey>(&self, f: impl FnOnce(K::Value) -> K::Value) -> Self {
        self.with::<K>(f(self.get::<K>()))
    }

    /// Writes `K` in place.
    ///
    /// The underlying map is cloned first if it is shared, so other clones of
    /// this store keep their previous value.
    pub fn set<K: ConfigKey>(&mut self, value: K::Value) {
        Arc::make_mut(&mut self.slots).insert(
            TypeId::of::<K>(),
            Slot {
                name: std::any::type_name::<K>(),
                value: Arc::new(value),
            },
        );
    }

    /// Number of explicitly written slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no slot was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Configs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.slots.values().map(|slot| slot.name).collect();
        names.sort_unstable();
        f.debug_struct("Configs").field("slots", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;

    struct Retries;

    impl ConfigKey for Retries {
        type Value = u32;

        fn default_value() -> u32 {
            3
        }
    }

    struct Label;

    impl ConfigKey for Label {
        type Value = String;

        fn default_value() -> String {
            "default".to_string()
        }
    }

    // Same value type as `Retries`, different slot.
    struct Attempts;

    impl ConfigKey for Attempts {
        type Value = u32;

        fn default_value() -> u32 {
            1
        }
    }

    #[test]
    fn unset_slot_resolves_default() {
        let configs = Configs::new();
        check!(configs.get::<Retries>() == 3);
        check!(configs.get::<Label>() == "default");
        check!(!configs.contains::<Retries>());
        check!(configs.is_empty());
    }

    #[test]
    fn with_never_mutates_original() {
        let original = Configs::new().with::<Retries>(5);
        let updated = original.with::<Retries>(7);

        check!(original.get::<Retries>() == 5);
        check!(updated.get::<Retries>() == 7);
    }

    #[test]
    fn set_on_shared_store_copies() {
        let shared = Configs::new().with::<Label>("a".to_string());
        let mut local = shared.clone();
        local.set::<Label>("b".to_string());

        check!(shared.get::<Label>() == "a");
        check!(local.get::<Label>() == "b");
    }

    #[test]
    fn slots_with_same_value_type_are_distinct() {
        let configs = Configs::new().with::<Retries>(9);
        check!(configs.get::<Retries>() == 9);
        check!(configs.get::<Attempts>() == 1);
    }

    #[test]
    fn update_reads_current_value() {
        let configs = Configs::new()
            .update::<Retries>(|n| n + 1)
            .update::<Retries>(|n| n * 10);
        check!(configs.get::<Retries>() == 40);
        check!(configs.len() == 1);
    }

    #[test]
    fn debug_lists_written_slot_names() {
        let configs = Configs::new().with::<Retries>(1);
        let debug = format!("{configs:?}");
        check!(debug.contains("Retries"));
        check!(!debug.contains("Label"));
    }
}
