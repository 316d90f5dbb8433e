//! The service container: registration, validation and resolution.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use crate::component::{Capabilities, Component, InjectionPoints};
use crate::config::ContainerConfig;
use crate::descriptors::{ActivateFn, Activation, InjectionPoint, ServiceDescriptor};
use crate::error::{DiError, DiResult};
use crate::key::{key_of, Key};
use crate::lifetime::Lifetime;
use crate::registration::{AnyArc, ServiceRegistry};
use crate::traits::ResolverCore;

mod chain;
mod discovery;

pub use chain::{DependencyChain, MAX_DEPTH};
pub use discovery::{Discovery, ServiceDefinition};

/// Registry of services keyed by identity, with lifetime-aware resolution.
///
/// Registration validates the binding eagerly: the identity must be a trait
/// object, the implementation must declare it among its capabilities, each
/// identity and each implementation may be bound once, every injection point
/// must be assignable and typed with a trait object, and the new entry must
/// not close a dependency cycle. A failed registration leaves the registry
/// exactly as it was.
///
/// Resolution goes through [`Resolver`](crate::Resolver).
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use ferrous_services::{Capabilities, Component, Container, DiError, Lifetime, Resolver};
///
/// trait Counter: Send + Sync {}
/// struct AtomicCounter;
/// impl Counter for AtomicCounter {}
/// impl Component for AtomicCounter {
///     fn construct() -> Self { AtomicCounter }
///     fn capabilities(caps: &mut Capabilities<Self>) {
///         caps.provide::<dyn Counter>(|this| this);
///     }
/// }
///
/// let mut container = Container::new();
/// container.register::<dyn Counter, AtomicCounter>(Lifetime::Singleton).unwrap();
///
/// let a = container.resolve::<dyn Counter>().unwrap();
/// let b = container.resolve::<dyn Counter>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// assert!(matches!(
///     container.register::<dyn Counter, AtomicCounter>(Lifetime::Singleton),
///     Err(DiError::DuplicateIdentity(_))
/// ));
/// ```
pub struct Container {
    registry: ServiceRegistry,
    config: ContainerConfig,
}

impl Container {
    /// Creates an empty container with default settings.
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// Creates an empty container with the given settings.
    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            registry: ServiceRegistry::new(),
            config,
        }
    }

    /// Active settings.
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Binds implementation `T` to identity `I` with the given lifetime.
    ///
    /// Nothing is constructed here. On error the registry is unchanged.
    pub fn register<I, T>(&mut self, lifetime: Lifetime) -> DiResult<()>
    where
        I: ?Sized + Send + Sync + 'static,
        T: Component,
    {
        let identity = key_of::<I>();
        let implementation = key_of::<T>();

        if !identity.is_interface() {
            return Err(DiError::InvalidIdentity {
                identity: identity.display_name(),
                implementation: implementation.display_name(),
            });
        }

        let capabilities = Capabilities::<T>::collect();
        let upcast = match capabilities.find(&identity) {
            Some(capability) => Arc::clone(&capability.upcast),
            None => {
                return Err(DiError::InvalidImplementation {
                    identity: identity.display_name(),
                    implementation: implementation.display_name(),
                })
            }
        };

        if self.registry.contains(&identity) {
            return Err(DiError::DuplicateIdentity(identity.display_name()));
        }
        if self.registry.find_implementation(&implementation).is_some() {
            return Err(DiError::DuplicateImplementation {
                identity: identity.display_name(),
                implementation: implementation.display_name(),
            });
        }

        let points = InjectionPoints::<T>::collect().into_vec();
        validate_points(&implementation, &points)?;

        let activate: ActivateFn = Arc::new(move || -> DiResult<Activation> {
            let target: AnyArc = Arc::new(T::construct());
            let exposed = upcast(Arc::clone(&target))
                .ok_or(DiError::TypeMismatch(std::any::type_name::<T>()))?;
            Ok(Activation { target, exposed })
        });

        self.registry.insert(ServiceDescriptor::new(
            identity,
            implementation,
            lifetime,
            points,
            activate,
        ));

        if let Err(err) = self.check_cycles(&identity) {
            self.registry.remove(&identity);
            tracing::warn!(
                identity = %identity,
                implementation = %implementation,
                error = %err,
                "Registration rolled back"
            );
            return Err(err);
        }

        tracing::debug!(
            identity = %identity,
            implementation = %implementation,
            lifetime = %lifetime,
            "Registered service"
        );
        Ok(())
    }

    /// Removes every registration and cached singleton.
    pub fn clear(&mut self) {
        tracing::debug!(count = self.registry.len(), "Clearing container");
        self.registry.clear();
    }

    /// Fills the injection points of an object the container did not build.
    ///
    /// Points are assigned in declaration order; the first failure stops the
    /// walk and earlier assignments stay in place.
    pub fn inject_into<T: Component>(&self, target: &T) -> DiResult<()> {
        let implementation = key_of::<T>();
        let points = InjectionPoints::<T>::collect().into_vec();
        validate_points(&implementation, &points)?;

        let target: &(dyn Any + Send + Sync) = target;
        for point in &points {
            let mut chain = DependencyChain::new(self.config.max_depth);
            let dependency = self.resolve_key(point.identity(), &mut chain)?;
            point.assign(target, dependency)?;
        }

        tracing::trace!(implementation = %implementation, points = points.len(), "Injected external object");
        Ok(())
    }

    /// Instantiates every registered singleton that has no instance yet.
    ///
    /// Returns how many singletons were created by this call.
    pub fn prewarm(&self) -> DiResult<usize> {
        let pending: Vec<Key> = self
            .registry
            .iter()
            .filter(|d| d.lifetime() == Lifetime::Singleton && !d.has_instance())
            .map(|d| *d.identity())
            .collect();

        let mut created = 0;
        for identity in &pending {
            // An earlier entry may have pulled this one in as a dependency
            if self.registry.get(identity).map_or(false, ServiceDescriptor::has_instance) {
                continue;
            }
            let mut chain = DependencyChain::new(self.config.max_depth);
            self.resolve_key(identity, &mut chain)?;
            created += 1;
        }

        tracing::debug!(created, "Prewarmed singletons");
        Ok(created)
    }

    /// Registers everything `source` yields, in order.
    ///
    /// Stops at the first failing definition; definitions registered before
    /// it stay registered. With [`ContainerConfig::eager_singletons`] set,
    /// all singletons are instantiated afterwards. Returns the number of
    /// definitions registered.
    pub fn discover<D: Discovery + ?Sized>(&mut self, source: &D) -> DiResult<usize> {
        let definitions = source.definitions();
        for definition in &definitions {
            definition.register(self)?;
        }

        if self.config.eager_singletons {
            self.prewarm()?;
        }

        tracing::debug!(count = definitions.len(), "Discovered services");
        Ok(definitions.len())
    }

    /// All descriptors, in unspecified order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.registry.iter()
    }

    /// The underlying registry.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    fn resolve_key(&self, identity: &Key, chain: &mut DependencyChain) -> DiResult<AnyArc> {
        let descriptor = self
            .registry
            .get(identity)
            .ok_or(DiError::NotFound(identity.display_name()))?;

        if let Some(instance) = descriptor.cached() {
            return Ok(instance);
        }

        chain.enter(identity)?;
        let result = self.instantiate(descriptor, chain);
        chain.exit(identity);
        result
    }

    fn instantiate(&self, descriptor: &ServiceDescriptor, chain: &mut DependencyChain) -> DiResult<AnyArc> {
        let Activation { target, exposed } = descriptor.activate()?;
        let singleton = descriptor.lifetime() == Lifetime::Singleton;

        // Cache before injecting so dependents reached below see this instance
        if singleton {
            let winner = descriptor.cache(Arc::clone(&exposed));
            if !Arc::ptr_eq(&winner, &exposed) {
                return Ok(winner);
            }
        }

        for point in descriptor.dependencies() {
            let injected = self
                .resolve_key(point.identity(), chain)
                .and_then(|dependency| point.assign(&*target, dependency));

            if let Err(err) = injected {
                if singleton {
                    descriptor.evict();
                }
                tracing::warn!(
                    identity = %descriptor.identity(),
                    point = point.name(),
                    error = %err,
                    "Injection failed"
                );
                return Err(err);
            }
        }

        tracing::trace!(
            identity = %descriptor.identity(),
            lifetime = %descriptor.lifetime(),
            depth = chain.depth(),
            "Constructed service"
        );
        Ok(exposed)
    }

    fn check_cycles(&self, root: &Key) -> DiResult<()> {
        let mut chain = DependencyChain::new(self.config.max_depth);
        let mut verified = HashSet::new();
        self.walk(root, &mut chain, &mut verified)
    }

    // Unregistered dependencies are left for resolve to report
    fn walk(&self, identity: &Key, chain: &mut DependencyChain, verified: &mut HashSet<Key>) -> DiResult<()> {
        if verified.contains(identity) {
            return Ok(());
        }
        let descriptor = match self.registry.get(identity) {
            Some(descriptor) => descriptor,
            None => return Ok(()),
        };
        if descriptor.has_instance() {
            return Ok(());
        }

        chain.enter(identity)?;
        for point in descriptor.dependencies() {
            self.walk(point.identity(), chain, verified)?;
        }
        chain.exit(identity);

        verified.insert(*identity);
        Ok(())
    }
}

fn validate_points(implementation: &Key, points: &[InjectionPoint]) -> DiResult<()> {
    for point in points {
        if point.assign.is_none() {
            return Err(DiError::MissingSetter {
                implementation: implementation.display_name(),
                point: point.name(),
            });
        }
        if !point.identity().is_interface() {
            return Err(DiError::InvalidDependencyType {
                implementation: implementation.display_name(),
                point: point.name(),
                dependency: point.identity().display_name(),
            });
        }
    }
    Ok(())
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverCore for Container {
    fn resolve_any(&self, identity: &Key) -> DiResult<AnyArc> {
        let mut chain = DependencyChain::new(self.config.max_depth);
        self.resolve_key(identity, &mut chain)
    }

    fn contains(&self, identity: &Key) -> bool {
        self.registry.contains(identity)
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("registrations", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}
