//! Service key types for the container.

use std::any::TypeId;
use std::hash::{Hash, Hasher};

/// Key for service storage and lookup.
///
/// A key identifies one Rust type: the `TypeId` drives equality and
/// hashing, the type name is carried along for diagnostics. Identity
/// keys are trait objects (`dyn Logger`); implementation keys are the
/// concrete component types bound to them.
///
/// # Examples
///
/// ```rust
/// use ferrous_services::{key_of, Key};
///
/// trait Logger: Send + Sync {}
/// struct ConsoleLogger;
///
/// let identity: Key = key_of::<dyn Logger>();
/// let implementation: Key = key_of::<ConsoleLogger>();
///
/// assert!(identity.is_interface());
/// assert!(!implementation.is_interface());
/// assert!(identity.display_name().contains("Logger"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Key {
    id: TypeId,
    name: &'static str,
    interface: bool,
}

impl Key {
    /// Get the type name for display
    pub fn display_name(&self) -> &'static str {
        self.name
    }

    /// Underlying `TypeId`.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Returns `true` when the keyed type is a trait object.
    ///
    /// Only trait objects may serve as service identities or as the
    /// declared type of an injection point.
    pub fn is_interface(&self) -> bool {
        self.interface
    }
}

// TypeId-only comparison; the name is diagnostic
impl PartialEq for Key {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Key {}

impl Hash for Key {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Creates the key for `T`.
#[inline(always)]
pub fn key_of<T: ?Sized + 'static>() -> Key {
    Key {
        id: TypeId::of::<T>(),
        name: std::any::type_name::<T>(),
        interface: is_trait_object::<T>(),
    }
}

/// A trait object is unsized behind a fat pointer and named `dyn ...`.
///
/// Slices and `str` are also unsized, so the pointer width alone is not
/// enough to tell them apart from trait objects.
fn is_trait_object<T: ?Sized + 'static>() -> bool {
    std::mem::size_of::<*const T>() != std::mem::size_of::<*const ()>()
        && std::any::type_name::<T>().starts_with("dyn ")
}
