//! Resolver traits for service resolution.

use std::any::Any;
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::key::{key_of, Key};

/// Core resolver trait for object-safe service resolution.
///
/// Works on type-erased [`Key`]s so it can be used behind `&dyn ResolverCore`.
/// Most callers use [`Resolver`] instead, which adds the generic methods.
pub trait ResolverCore: Send + Sync {
    /// Resolves the instance registered for `identity`.
    ///
    /// The returned value is the trait object wrapped once more in an `Arc`
    /// (`Arc<Arc<dyn I>>` erased to `Arc<dyn Any>`).
    fn resolve_any(&self, identity: &Key) -> DiResult<Arc<dyn Any + Send + Sync>>;

    /// Returns `true` when `identity` has a registration.
    fn contains(&self, identity: &Key) -> bool;
}

/// High-level resolver interface with generic methods.
///
/// Implemented for every [`ResolverCore`], including trait objects, so code
/// holding a `&dyn ResolverCore` still gets typed resolution.
///
/// # Examples
///
/// ```
/// use ferrous_services::{Capabilities, Component, Container, Lifetime, Resolver, ResolverCore};
///
/// trait Database: Send + Sync {
///     fn url(&self) -> &str;
/// }
///
/// struct PostgresDb;
/// impl Database for PostgresDb {
///     fn url(&self) -> &str { "postgres://..." }
/// }
/// impl Component for PostgresDb {
///     fn construct() -> Self { PostgresDb }
///     fn capabilities(caps: &mut Capabilities<Self>) {
///         caps.provide::<dyn Database>(|this| this);
///     }
/// }
///
/// let mut container = Container::new();
/// container.register::<dyn Database, PostgresDb>(Lifetime::Singleton).unwrap();
///
/// let resolver: &dyn ResolverCore = &container;
/// let db = resolver.resolve::<dyn Database>().unwrap();
/// assert_eq!(db.url(), "postgres://...");
/// assert!(resolver.has_registration::<dyn Database>());
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves the instance registered for identity `I`.
    fn resolve<I>(&self) -> DiResult<Arc<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let any = self.resolve_any(&key_of::<I>())?;
        downcast_identity::<I>(any)
    }

    /// Returns `true` when `I` has a registration.
    fn has_registration<I>(&self) -> bool
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.contains(&key_of::<I>())
    }

    /// Resolves `I`, panicking on failure.
    ///
    /// For composition roots that treat a missing service as fatal.
    fn resolve_required<I>(&self) -> Arc<I>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.resolve::<I>()
            .unwrap_or_else(|e| panic!("Failed to resolve {}: {}", std::any::type_name::<I>(), e))
    }
}

impl<R: ResolverCore + ?Sized> Resolver for R {}

// Handle Arc<Arc<dyn I>> storage pattern
pub(crate) fn downcast_identity<I>(any: Arc<dyn Any + Send + Sync>) -> DiResult<Arc<I>>
where
    I: ?Sized + Send + Sync + 'static,
{
    any.downcast::<Arc<I>>()
        .map(|boxed| (*boxed).clone())
        .map_err(|_| DiError::TypeMismatch(std::any::type_name::<I>()))
}
