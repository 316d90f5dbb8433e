//! # ferrous-services
//!
//! A service container for loosely-coupled components, plus a framework for
//! cancellable async operations built on top of it.
//!
//! ## Features
//!
//! - **Trait-object identities**: services are resolved by `dyn Trait`, bound to
//!   concrete [`Component`] types
//! - **Two lifetimes**: Singleton (one shared instance) and Transient (fresh per resolve)
//! - **Eager validation**: bad identities, duplicate bindings, unassignable injection
//!   points and dependency cycles are rejected at registration
//! - **Property injection**: [`Inject`] fields are filled after construction, in
//!   declaration order
//! - **Async operations**: [`AsyncOperationHandle`] with a `Pending → Running →
//!   Completed | Canceled | Faulted` state machine and owner-locked [`Signal`]s
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use ferrous_services::{Capabilities, Component, Container, Inject, InjectionPoints, Lifetime, Resolver};
//!
//! trait Database: Send + Sync {
//!     fn url(&self) -> &str;
//! }
//!
//! trait Users: Send + Sync {
//!     fn backend(&self) -> String;
//! }
//!
//! struct Postgres;
//! impl Database for Postgres {
//!     fn url(&self) -> &str { "postgres://localhost" }
//! }
//! impl Component for Postgres {
//!     fn construct() -> Self { Postgres }
//!     fn capabilities(caps: &mut Capabilities<Self>) {
//!         caps.provide::<dyn Database>(|this| this);
//!     }
//! }
//!
//! #[derive(Default)]
//! struct UserService {
//!     db: Inject<dyn Database>,
//! }
//! impl Users for UserService {
//!     fn backend(&self) -> String {
//!         self.db.get().map(|db| db.url().to_string()).unwrap_or_default()
//!     }
//! }
//! impl Component for UserService {
//!     fn construct() -> Self { Self::default() }
//!     fn capabilities(caps: &mut Capabilities<Self>) {
//!         caps.provide::<dyn Users>(|this| this);
//!     }
//!     fn injection_points(points: &mut InjectionPoints<Self>) {
//!         points.mark::<dyn Database>("db").assign_with(|this| &this.db);
//!     }
//! }
//!
//! let mut container = Container::new();
//! container.register::<dyn Database, Postgres>(Lifetime::Singleton).unwrap();
//! container.register::<dyn Users, UserService>(Lifetime::Transient).unwrap();
//!
//! let users = container.resolve::<dyn Users>().unwrap();
//! assert_eq!(users.backend(), "postgres://localhost");
//!
//! let again = container.resolve::<dyn Users>().unwrap();
//! assert!(!Arc::ptr_eq(&users, &again));
//! ```
//!
//! ## Async Operations
//!
//! ```rust
//! use ferrous_services::{AsyncOperationService, BuiltinServices, Container, OperationError, Phase, Resolver, RunAsync};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut container = Container::new();
//! container.discover(&BuiltinServices)?;
//! let operations = container.resolve::<dyn AsyncOperationService>()?;
//!
//! let handle = operations.run_async(|token| async move {
//!     token.cancelled().await;
//!     Err::<(), _>(OperationError::Canceled)
//! }, true)?;
//! handle.canceled().subscribe(|_| println!("stopped"));
//!
//! operations.dispose().await?;
//! assert_eq!(handle.phase(), Phase::Canceled);
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod cancellation;
pub mod component;
pub mod config;
pub mod container;
pub mod descriptors;
pub mod error;
pub mod global;
pub mod key;
pub mod lifetime;
pub mod operation;
pub mod signal;
pub mod traits;

// Internal modules
mod registration;

// Re-exports
pub use cancellation::{CancellationError, CancellationToken};
pub use component::{Capabilities, Component, Inject, InjectionPoints, PointBuilder};
pub use config::ContainerConfig;
pub use container::{Container, DependencyChain, Discovery, ServiceDefinition};
pub use descriptors::{InjectionPoint, ServiceDescriptor};
pub use error::{AsyncOpError, DiError, DiResult, OperationError, SignalError, UnobservedFaults};
pub use key::{key_of, Key};
pub use lifetime::Lifetime;
pub use operation::{
    AsyncOperationHandle, AsyncOperationManager, AsyncOperationService, BuiltinServices,
    OperationId, Phase, RunAsync, TrackedOperation,
};
pub use registration::ServiceRegistry;
pub use signal::{Callback, Signal, SignalKey};
pub use traits::{Resolver, ResolverCore};
