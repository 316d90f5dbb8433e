//! Service descriptors: per-registration metadata and the singleton slot.

use std::any::Any;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::DiResult;
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::registration::AnyArc;

pub(crate) type AssignFn =
    Arc<dyn Fn(&(dyn Any + Send + Sync), AnyArc) -> DiResult<()> + Send + Sync>;

pub(crate) type ActivateFn = Arc<dyn Fn() -> DiResult<Activation> + Send + Sync>;

/// Freshly constructed instance, before injection.
pub(crate) struct Activation {
    /// The concrete component, as `Arc<T>`.
    pub(crate) target: AnyArc,
    /// The same instance seen through the identity, as `Arc<Arc<dyn I>>`.
    pub(crate) exposed: AnyArc,
}

/// One declared injection point of an implementation.
#[derive(Clone)]
pub struct InjectionPoint {
    identity: Key,
    name: &'static str,
    pub(crate) assign: Option<AssignFn>,
}

impl InjectionPoint {
    pub(crate) fn new(identity: Key, name: &'static str) -> Self {
        Self {
            identity,
            name,
            assign: None,
        }
    }

    /// Identity resolved for this point.
    pub fn identity(&self) -> &Key {
        &self.identity
    }

    /// Name given to the point when it was marked.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn assign(&self, target: &(dyn Any + Send + Sync), dependency: AnyArc) -> DiResult<()> {
        match &self.assign {
            Some(assign) => assign(target, dependency),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for InjectionPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionPoint")
            .field("identity", &self.identity.display_name())
            .field("name", &self.name)
            .finish()
    }
}

/// Service descriptor
///
/// Holds everything the container knows about one registration: the
/// identity callers resolve by, the implementation bound to it, the
/// lifetime, the ordered injection points, and for singletons the
/// cached instance.
///
/// # Examples
///
/// ```rust
/// use ferrous_services::{Capabilities, Component, Container, Lifetime, Resolver};
///
/// trait Clock: Send + Sync {}
/// struct SystemClock;
/// impl Clock for SystemClock {}
/// impl Component for SystemClock {
///     fn construct() -> Self { SystemClock }
///     fn capabilities(caps: &mut Capabilities<Self>) {
///         caps.provide::<dyn Clock>(|this| this);
///     }
/// }
///
/// let mut container = Container::new();
/// container.register::<dyn Clock, SystemClock>(Lifetime::Singleton).unwrap();
///
/// let descriptor = container.descriptors().next().unwrap();
/// assert!(descriptor.identity().display_name().contains("Clock"));
/// assert_eq!(descriptor.lifetime(), Lifetime::Singleton);
/// assert!(!descriptor.has_instance());
///
/// container.resolve::<dyn Clock>().unwrap();
/// assert!(container.descriptors().next().unwrap().has_instance());
/// ```
pub struct ServiceDescriptor {
    identity: Key,
    implementation: Key,
    lifetime: Lifetime,
    dependencies: Vec<InjectionPoint>,
    activate: ActivateFn,
    instance: RwLock<Option<AnyArc>>,
}

impl ServiceDescriptor {
    pub(crate) fn new(
        identity: Key,
        implementation: Key,
        lifetime: Lifetime,
        dependencies: Vec<InjectionPoint>,
        activate: ActivateFn,
    ) -> Self {
        Self {
            identity,
            implementation,
            lifetime,
            dependencies,
            activate,
            instance: RwLock::new(None),
        }
    }

    /// Identity callers resolve by.
    pub fn identity(&self) -> &Key {
        &self.identity
    }

    /// Concrete type bound to the identity.
    pub fn implementation(&self) -> &Key {
        &self.implementation
    }

    /// Service lifetime
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Injection points, in injection order.
    pub fn dependencies(&self) -> &[InjectionPoint] {
        &self.dependencies
    }

    /// Returns `true` for a singleton whose instance is cached.
    pub fn has_instance(&self) -> bool {
        self.instance.read().is_some()
    }

    pub(crate) fn activate(&self) -> DiResult<Activation> {
        (self.activate)()
    }

    pub(crate) fn cached(&self) -> Option<AnyArc> {
        self.instance.read().clone()
    }

    /// Caches `exposed` unless another caller got there first; returns
    /// whichever instance ended up in the slot.
    pub(crate) fn cache(&self, exposed: AnyArc) -> AnyArc {
        let mut slot = self.instance.write();
        match slot.as_ref() {
            Some(existing) => existing.clone(),
            None => {
                *slot = Some(exposed.clone());
                exposed
            }
        }
    }

    pub(crate) fn evict(&self) {
        self.instance.write().take();
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("identity", &self.identity.display_name())
            .field("implementation", &self.implementation.display_name())
            .field("lifetime", &self.lifetime)
            .field("dependencies", &self.dependencies)
            .field("has_instance", &self.has_instance())
            .finish()
    }
}
