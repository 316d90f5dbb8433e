//! Component declarations: construction, capabilities and injection points.
//!
//! A component is a concrete implementation type. It tells the container
//! three things about itself, all checked by the compiler where Rust
//! allows it:
//!
//! - how to build a bare instance ([`Component::construct`]),
//! - which identities it satisfies, through upcast functions
//!   ([`Component::capabilities`]),
//! - which [`Inject`] fields must be filled after construction
//!   ([`Component::injection_points`]).

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::descriptors::{AssignFn, InjectionPoint};
use crate::error::{DiError, DiResult};
use crate::key::{key_of, Key};
use crate::registration::AnyArc;

/// Concrete implementation type managed by the container.
///
/// # Examples
///
/// ```rust
/// use ferrous_services::{Capabilities, Component, Container, Inject, InjectionPoints, Lifetime, Resolver};
///
/// trait Store: Send + Sync {
///     fn name(&self) -> &str;
/// }
///
/// trait Reporter: Send + Sync {
///     fn report(&self) -> String;
/// }
///
/// struct MemoryStore;
/// impl Store for MemoryStore {
///     fn name(&self) -> &str { "memory" }
/// }
/// impl Component for MemoryStore {
///     fn construct() -> Self { MemoryStore }
///     fn capabilities(caps: &mut Capabilities<Self>) {
///         caps.provide::<dyn Store>(|this| this);
///     }
/// }
///
/// #[derive(Default)]
/// struct StoreReporter {
///     store: Inject<dyn Store>,
/// }
/// impl Reporter for StoreReporter {
///     fn report(&self) -> String {
///         self.store.get().map(|s| s.name().to_string()).unwrap_or_default()
///     }
/// }
/// impl Component for StoreReporter {
///     fn construct() -> Self { Self::default() }
///     fn capabilities(caps: &mut Capabilities<Self>) {
///         caps.provide::<dyn Reporter>(|this| this);
///     }
///     fn injection_points(points: &mut InjectionPoints<Self>) {
///         points.mark::<dyn Store>("store").assign_with(|this| &this.store);
///     }
/// }
///
/// let mut container = Container::new();
/// container.register::<dyn Store, MemoryStore>(Lifetime::Singleton).unwrap();
/// container.register::<dyn Reporter, StoreReporter>(Lifetime::Transient).unwrap();
///
/// let reporter = container.resolve::<dyn Reporter>().unwrap();
/// assert_eq!(reporter.report(), "memory");
/// ```
pub trait Component: Send + Sync + Sized + 'static {
    /// Builds an instance whose injection points are still empty.
    fn construct() -> Self;

    /// Declares the identities this type satisfies.
    fn capabilities(caps: &mut Capabilities<Self>);

    /// Declares the fields the container fills after construction.
    fn injection_points(_points: &mut InjectionPoints<Self>) {}
}

pub(crate) type UpcastFn = Arc<dyn Fn(AnyArc) -> Option<AnyArc> + Send + Sync>;

pub(crate) struct Capability {
    pub(crate) identity: Key,
    pub(crate) upcast: UpcastFn,
}

/// Identities a component satisfies.
pub struct Capabilities<T> {
    entries: Vec<Capability>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> Capabilities<T> {
    pub(crate) fn collect() -> Self {
        let mut caps = Self {
            entries: Vec::new(),
            _marker: PhantomData,
        };
        T::capabilities(&mut caps);
        caps
    }

    /// Declares that `T` satisfies `I`.
    ///
    /// The upcast is normally the identity closure `|this| this`, which the
    /// compiler only accepts when `T: I`.
    pub fn provide<I>(&mut self, upcast: fn(Arc<T>) -> Arc<I>) -> &mut Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let erased = move |target: AnyArc| -> Option<AnyArc> {
            let concrete = target.downcast::<T>().ok()?;
            // Stored as Arc<Arc<dyn I>> so the trait object survives type erasure
            Some(Arc::new(upcast(concrete)) as AnyArc)
        };
        self.entries.push(Capability {
            identity: key_of::<I>(),
            upcast: Arc::new(erased),
        });
        self
    }

    pub(crate) fn find(&self, identity: &Key) -> Option<&Capability> {
        self.entries.iter().find(|c| &c.identity == identity)
    }
}

/// Injection points declared by a component, in injection order.
pub struct InjectionPoints<T> {
    points: Vec<InjectionPoint>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Component> InjectionPoints<T> {
    pub(crate) fn collect() -> Self {
        let mut points = Self {
            points: Vec::new(),
            _marker: PhantomData,
        };
        T::injection_points(&mut points);
        points
    }

    /// Marks an injection point of type `D` named `name`.
    ///
    /// The point is only usable once [`PointBuilder::assign_with`] has been
    /// called on the returned builder; otherwise registration fails with
    /// [`DiError::MissingSetter`].
    pub fn mark<D>(&mut self, name: &'static str) -> PointBuilder<'_, T, D>
    where
        D: ?Sized + Send + Sync + 'static,
    {
        self.points.push(InjectionPoint::new(key_of::<D>(), name));
        let index = self.points.len() - 1;
        PointBuilder {
            points: self,
            index,
            _marker: PhantomData,
        }
    }

    pub(crate) fn into_vec(self) -> Vec<InjectionPoint> {
        self.points
    }
}

/// Builder returned by [`InjectionPoints::mark`].
pub struct PointBuilder<'a, T, D: ?Sized> {
    points: &'a mut InjectionPoints<T>,
    index: usize,
    _marker: PhantomData<fn(&D)>,
}

impl<'a, T, D> PointBuilder<'a, T, D>
where
    T: Component,
    D: ?Sized + Send + Sync + 'static,
{
    /// Binds the point to the [`Inject`] field returned by `slot`.
    pub fn assign_with(self, slot: fn(&T) -> &Inject<D>) {
        let assign: AssignFn = Arc::new(move |target: &(dyn Any + Send + Sync), dependency: AnyArc| -> DiResult<()> {
            let target = target
                .downcast_ref::<T>()
                .ok_or(DiError::TypeMismatch(std::any::type_name::<T>()))?;
            let dependency = dependency
                .downcast::<Arc<D>>()
                .map_err(|_| DiError::TypeMismatch(std::any::type_name::<D>()))?;
            slot(target).set(Arc::clone(&*dependency));
            Ok(())
        });
        self.points.points[self.index].assign = Some(assign);
    }
}

/// A field filled by the container after construction.
///
/// Empty until the owning component has been resolved (or passed to
/// [`Container::inject_into`](crate::Container::inject_into)).
pub struct Inject<I: ?Sized> {
    slot: RwLock<Option<Arc<I>>>,
}

impl<I: ?Sized> Inject<I> {
    /// Creates an empty slot.
    pub fn empty() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// The injected dependency, if any.
    pub fn get(&self) -> Option<Arc<I>> {
        self.slot.read().clone()
    }

    /// Returns `true` once a dependency has been injected.
    pub fn is_injected(&self) -> bool {
        self.slot.read().is_some()
    }

    pub(crate) fn set(&self, value: Arc<I>) {
        *self.slot.write() = Some(value);
    }
}

impl<I: ?Sized> Default for Inject<I> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<I: ?Sized> std::fmt::Debug for Inject<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inject")
            .field("type", &std::any::type_name::<I>())
            .field("injected", &self.is_injected())
            .finish()
    }
}
