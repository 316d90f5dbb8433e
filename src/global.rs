//! Process-wide container for the outermost composition point.
//!
//! Library code should take a `&Container` (or `&dyn ResolverCore`)
//! instead of reaching for this; it exists so `main` has one place to
//! register built-ins and hand out references.

use once_cell::sync::Lazy;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::container::Container;
use crate::error::DiResult;

static GLOBAL: Lazy<RwLock<Container>> = Lazy::new(|| RwLock::new(Container::new()));

/// Shared access for resolution.
///
/// # Examples
///
/// ```rust
/// use ferrous_services::{global, BuiltinServices, AsyncOperationService, Resolver};
///
/// global::configure(|container| container.discover(&BuiltinServices).map(|_| ())).unwrap();
/// let service = global::container().resolve::<dyn AsyncOperationService>().unwrap();
/// assert_eq!(service.live_count(), 0);
/// # global::reset();
/// ```
pub fn container() -> RwLockReadGuard<'static, Container> {
    GLOBAL.read()
}

/// Exclusive access for registration.
pub fn container_mut() -> RwLockWriteGuard<'static, Container> {
    GLOBAL.write()
}

/// Runs `f` with exclusive access, typically to register services.
pub fn configure<F>(f: F) -> DiResult<()>
where
    F: FnOnce(&mut Container) -> DiResult<()>,
{
    f(&mut GLOBAL.write())
}

/// Drops every registration and cached instance.
pub fn reset() {
    GLOBAL.write().clear();
}
