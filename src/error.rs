//! Error types for the container and the async operation framework.

use std::sync::Arc;

use crate::operation::{OperationId, Phase};

/// Container configuration errors
///
/// Every variant is a programming error surfaced synchronously by
/// [`Container::register`](crate::Container::register) or
/// [`Resolver::resolve`](crate::Resolver::resolve). They are never
/// retried, and the failing registration leaves the registry untouched.
///
/// # Examples
///
/// ```rust
/// use ferrous_services::{Container, DiError, Resolver};
///
/// trait Missing: Send + Sync {}
///
/// let container = Container::new();
/// match container.resolve::<dyn Missing>() {
///     Err(DiError::NotFound(name)) => assert!(name.contains("Missing")),
///     _ => unreachable!(),
/// }
///
/// let circular = DiError::CircularDependency(vec!["dyn A", "dyn B", "dyn A"]);
/// assert_eq!(circular.to_string(), "Circular dependency: dyn A -> dyn B -> dyn A");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiError {
    /// Identity is not a trait object type
    #[error("Service identity {identity} for {implementation} must be a trait object type")]
    InvalidIdentity {
        identity: &'static str,
        implementation: &'static str,
    },
    /// Implementation does not declare the identity among its capabilities
    #[error("Service implementation {implementation} does not provide {identity}")]
    InvalidImplementation {
        identity: &'static str,
        implementation: &'static str,
    },
    /// Identity already registered
    #[error("Duplicate service identity: {0}")]
    DuplicateIdentity(&'static str),
    /// Implementation already bound to another identity
    #[error("Service implementation {implementation} is already bound, cannot bind it to {identity}")]
    DuplicateImplementation {
        identity: &'static str,
        implementation: &'static str,
    },
    /// Injection point declared without an assignment
    #[error("Injection point {implementation}.{point} has no assignment")]
    MissingSetter {
        implementation: &'static str,
        point: &'static str,
    },
    /// Injection point typed with something other than a trait object
    #[error("Injection point {implementation}.{point} must be a trait object type, found {dependency}")]
    InvalidDependencyType {
        implementation: &'static str,
        point: &'static str,
        dependency: &'static str,
    },
    /// Circular dependency detected (includes path)
    #[error("Circular dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<&'static str>),
    /// Service not registered
    #[error("Service not found: {0}")]
    NotFound(&'static str),
    /// Type downcast failed
    #[error("Type mismatch for: {0}")]
    TypeMismatch(&'static str),
    /// Maximum recursion depth exceeded
    #[error("Max depth {0} exceeded")]
    DepthExceeded(usize),
}

/// Result type for container operations
pub type DiResult<T> = Result<T, DiError>;

/// Signal emission errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    /// The key passed to `emit` is not the one the signal was built with.
    #[error("Signal emission is locked to another owner")]
    LockViolation,
}

/// Error produced by a wrapped async operation.
///
/// Cloneable so one failure can be handed to every `faulted` subscriber.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OperationError {
    /// The operation observed a cancellation request and unwound.
    #[error("Operation was canceled")]
    Canceled,
    /// The operation returned an error.
    #[error("Operation failed: {0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync>),
    /// The operation panicked.
    #[error("Operation panicked: {0}")]
    Panicked(String),
}

impl OperationError {
    /// Wraps any error as [`OperationError::Failed`].
    pub fn failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        OperationError::Failed(Arc::from(error.into()))
    }

    /// Returns `true` for [`OperationError::Canceled`].
    pub fn is_canceled(&self) -> bool {
        matches!(self, OperationError::Canceled)
    }
}

impl From<crate::cancellation::CancellationError> for OperationError {
    fn from(_: crate::cancellation::CancellationError) -> Self {
        OperationError::Canceled
    }
}

/// Errors raised by operation handles and the operation service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AsyncOpError {
    /// The requested transition is not legal from the current phase.
    #[error("Operation {id} cannot {action} while {phase}")]
    InvalidState {
        id: OperationId,
        phase: Phase,
        action: &'static str,
    },
    /// `start` or `cancel_after` was called outside a tokio runtime.
    #[error("Operation {0} cannot run outside a tokio runtime")]
    NoRuntime(OperationId),
    /// A terminal signal rejected the emission.
    #[error(transparent)]
    Signal(#[from] SignalError),
    /// The operation faulted and nobody subscribed to `faulted`.
    #[error("Operation {id} faulted with no observer: {source}")]
    UnobservedFault {
        id: OperationId,
        source: OperationError,
    },
}

/// Faults escalated while finishing a batch of operations.
///
/// Returned by [`AsyncOperationService::update`](crate::AsyncOperationService::update)
/// and [`AsyncOperationService::dispose`](crate::AsyncOperationService::dispose)
/// after every finished handle has been processed, so one escalation never
/// stops siblings from completing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{} operation(s) faulted with no observer", .faults.len())]
pub struct UnobservedFaults {
    /// One entry per escalated handle.
    pub faults: Vec<AsyncOpError>,
}
