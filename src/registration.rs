//! Service registry holding all descriptors.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptors::ServiceDescriptor;
use crate::key::Key;

// Type-erased Arc for storage
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

/// Identity → descriptor table.
///
/// Mutated only through [`Container::register`](crate::Container::register)
/// and [`Container::clear`](crate::Container::clear). Iteration order is
/// unspecified.
#[derive(Default)]
pub struct ServiceRegistry {
    entries: HashMap<Key, ServiceDescriptor>,
}

impl ServiceRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, descriptor: ServiceDescriptor) {
        self.entries.insert(*descriptor.identity(), descriptor);
    }

    pub(crate) fn remove(&mut self, identity: &Key) -> Option<ServiceDescriptor> {
        self.entries.remove(identity)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Descriptor registered for `identity`.
    #[inline(always)]
    pub fn get(&self, identity: &Key) -> Option<&ServiceDescriptor> {
        self.entries.get(identity)
    }

    /// Checks if an identity is registered
    #[inline(always)]
    pub fn contains(&self, identity: &Key) -> bool {
        self.entries.contains_key(identity)
    }

    /// Descriptor whose implementation is `implementation`, whatever its identity.
    pub fn find_implementation(&self, implementation: &Key) -> Option<&ServiceDescriptor> {
        self.entries
            .values()
            .find(|d| d.implementation() == implementation)
    }

    /// Iterator over all descriptors
    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.entries.values()
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
