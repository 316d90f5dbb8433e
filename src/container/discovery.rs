//! Discovery collaborators feeding the container's registration API.
//!
//! How definitions are found (attributes, inventories, hand-written
//! lists) is not the container's concern; it only consumes the
//! `(identity, implementation, lifetime)` triples a [`Discovery`] yields.

use crate::component::Component;
use crate::container::Container;
use crate::error::DiResult;
use crate::key::{key_of, Key};
use crate::lifetime::Lifetime;

type Registrar = fn(&mut Container, Lifetime) -> DiResult<()>;

/// One discovered `(identity, implementation, lifetime)` triple.
#[derive(Clone, Copy)]
pub struct ServiceDefinition {
    identity: Key,
    implementation: Key,
    lifetime: Lifetime,
    registrar: Registrar,
}

impl ServiceDefinition {
    /// Definition binding `T` to `I`.
    pub fn of<I, T>(lifetime: Lifetime) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        T: Component,
    {
        Self {
            identity: key_of::<I>(),
            implementation: key_of::<T>(),
            lifetime,
            registrar: Container::register::<I, T>,
        }
    }

    /// The interface the definition registers under.
    pub fn identity(&self) -> &Key {
        &self.identity
    }

    /// The concrete component type.
    pub fn implementation(&self) -> &Key {
        &self.implementation
    }

    /// Lifetime used when registering.
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub(crate) fn register(&self, container: &mut Container) -> DiResult<()> {
        (self.registrar)(container, self.lifetime)
    }
}

impl std::fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("identity", &self.identity.display_name())
            .field("implementation", &self.implementation.display_name())
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// A source of service definitions.
///
/// # Example
///
/// ```rust
/// use ferrous_services::{Capabilities, Component, Container, Discovery, Lifetime, Resolver, ServiceDefinition};
///
/// trait Greeter: Send + Sync {}
/// struct EnglishGreeter;
/// impl Greeter for EnglishGreeter {}
/// impl Component for EnglishGreeter {
///     fn construct() -> Self { EnglishGreeter }
///     fn capabilities(caps: &mut Capabilities<Self>) {
///         caps.provide::<dyn Greeter>(|this| this);
///     }
/// }
///
/// struct GreetingModule;
/// impl Discovery for GreetingModule {
///     fn definitions(&self) -> Vec<ServiceDefinition> {
///         vec![ServiceDefinition::of::<dyn Greeter, EnglishGreeter>(Lifetime::Singleton)]
///     }
/// }
///
/// let mut container = Container::new();
/// assert_eq!(container.discover(&GreetingModule).unwrap(), 1);
/// assert!(container.has_registration::<dyn Greeter>());
/// ```
pub trait Discovery {
    /// Definitions to register, in registration order.
    fn definitions(&self) -> Vec<ServiceDefinition>;
}

impl Discovery for [ServiceDefinition] {
    fn definitions(&self) -> Vec<ServiceDefinition> {
        self.to_vec()
    }
}

impl Discovery for Vec<ServiceDefinition> {
    fn definitions(&self) -> Vec<ServiceDefinition> {
        self.clone()
    }
}
