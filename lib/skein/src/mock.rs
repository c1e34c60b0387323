//! Mock values short-circuiting calls.
//!
//! A mock is registered per decoded type. When the call's [`MockPolicy`]
//! allows it and a mock of the serializer's output type exists, the call
//! returns the mock without touching the middleware chain or the transport.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use skein_core::ConfigKey;

/// When registered mocks are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockPolicy {
    /// Never use mocks; always perform the request.
    Ignore,
    /// Use a mock when one is registered for the output type.
    #[default]
    IfSpecified,
    /// A mock must exist; calls without one fail with
    /// [`skein_core::Error::MockMissing`].
    Require,
}

type Factory = dyn Fn() -> Box<dyn Any + Send> + Send + Sync;

#[derive(Clone)]
struct MockEntry {
    name: &'static str,
    make: Arc<Factory>,
}

/// Registry of mock values keyed by type.
///
/// # Example
///
/// ```
/// use skein::Mocks;
///
/// let mocks = Mocks::new().with(42_u32);
/// assert_eq!(mocks.get::<u32>(), Some(42));
/// assert_eq!(mocks.get::<String>(), None);
/// ```
#[derive(Clone, Default)]
pub struct Mocks {
    entries: Arc<HashMap<TypeId, MockEntry>>,
}

impl Mocks {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a registry with `value` as the mock for `T`.
    #[must_use]
    pub fn with<T: Clone + Send + Sync + 'static>(&self, value: T) -> Self {
        self.with_factory(move || value.clone())
    }

    /// Returns a registry producing the mock for `T` with `make`, for types
    /// that are not `Clone`.
    #[must_use]
    pub fn with_factory<T: Send + 'static>(
        &self,
        make: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.entries).insert(
            TypeId::of::<T>(),
            MockEntry {
                name: std::any::type_name::<T>(),
                make: Arc::new(move || -> Box<dyn Any + Send> { Box::new(make()) }),
            },
        );
        next
    }

    /// The mock registered for `T`.
    #[must_use]
    pub fn get<T: 'static>(&self) -> Option<T> {
        let entry = self.entries.get(&TypeId::of::<T>())?;
        (entry.make)().downcast::<T>().ok().map(|value| *value)
    }

    /// Returns `true` if a mock for `T` is registered.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered mocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Mocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.values().map(|entry| entry.name).collect();
        names.sort_unstable();
        f.debug_list().entries(names).finish()
    }
}

/// Slot holding the mock policy of a call.
pub struct MockPolicyKey;

impl ConfigKey for MockPolicyKey {
    type Value = MockPolicy;

    fn default_value() -> MockPolicy {
        MockPolicy::IfSpecified
    }
}

/// Slot holding the registered mocks.
pub struct MocksKey;

impl ConfigKey for MocksKey {
    type Value = Mocks;

    fn default_value() -> Mocks {
        Mocks::new()
    }
}
