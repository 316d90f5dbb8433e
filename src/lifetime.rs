//! Service lifetime definitions.

/// Service lifetimes controlling instance caching behavior
///
/// # Examples
///
/// ```rust
/// use ferrous_services::{Component, Capabilities, Container, Lifetime, Resolver};
/// use std::sync::Arc;
///
/// trait Clock: Send + Sync {}
///
/// struct SystemClock;
/// impl Clock for SystemClock {}
///
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
/// let a = container.resolve::<dyn Clock>().unwrap();
/// let b = container.resolve::<dyn Clock>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
pub enum Lifetime {
    /// New instance per resolution, never cached
    ///
    /// Two resolutions of the same transient identity always yield
    /// distinct objects, and each one gets its own freshly resolved
    /// dependencies.
    Transient,
    /// Single instance per container, created on first request
    ///
    /// The instance is cached on its descriptor before its dependencies
    /// are injected and shared by every later resolution.
    Singleton,
}

impl std::fmt::Display for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifetime::Transient => f.write_str("transient"),
            Lifetime::Singleton => f.write_str("singleton"),
        }
    }
}
