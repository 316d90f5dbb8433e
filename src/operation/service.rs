//! The async operation service: live-handle bookkeeping and bulk lifecycle.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AsyncOperationHandle, OperationId, Phase, TrackedOperation};
use crate::cancellation::CancellationToken;
use crate::component::{Capabilities, Component};
use crate::container::{Discovery, ServiceDefinition};
use crate::error::{AsyncOpError, OperationError, UnobservedFaults};
use crate::lifetime::Lifetime;

/// Owns the live handles, advances them and shuts them down.
///
/// Resolve it from the container as `dyn AsyncOperationService` after
/// registering [`BuiltinServices`]; start work through [`RunAsync`].
#[async_trait]
pub trait AsyncOperationService: Send + Sync {
    /// Adds a handle to the live set.
    fn track(&self, operation: Arc<dyn TrackedOperation>);

    /// Removes a handle from the live set without resolving it; returns
    /// whether it was tracked.
    fn untrack(&self, id: OperationId) -> bool;

    /// Resolves every handle whose work has finished and drops it from the
    /// live set. Never blocks on running work.
    ///
    /// Returns how many handles were retired. Faults nobody subscribed to
    /// are collected and returned together once every finished handle has
    /// been processed.
    fn update(&self) -> Result<usize, UnobservedFaults>;

    /// Cancels every live handle, waits for running work to stop, resolves
    /// everything and empties the live set.
    ///
    /// Handles that were never started end up `Canceled`. No handle is left
    /// in a non-terminal phase.
    async fn dispose(&self) -> Result<(), UnobservedFaults>;

    /// Number of handles in the live set.
    fn live_count(&self) -> usize;

    /// Requests cancellation of every running handle; returns how many requests were issued.
    fn cancel_all(&self) -> usize;
}

/// Generic entry point for starting work on an [`AsyncOperationService`].
///
/// # Examples
///
/// ```rust
/// use ferrous_services::{AsyncOperationService, BuiltinServices, Container, OperationError, Phase, Resolver, RunAsync};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut container = Container::new();
/// container.discover(&BuiltinServices)?;
///
/// let service = container.resolve::<dyn AsyncOperationService>()?;
/// let handle = service.run_async(|_token| async { Ok::<_, OperationError>("done") }, true)?;
///
/// handle.wait().await;
/// assert_eq!(service.update()?, 1);
/// assert_eq!(handle.phase(), Phase::Completed);
/// assert_eq!(service.live_count(), 0);
/// # Ok(())
/// # }
/// ```
pub trait RunAsync {
    /// Wraps `operation` in a new handle, tracks it and, when
    /// `start_immediately` is set, starts it.
    ///
    /// The handle is tracked before it starts, so a concurrent
    /// [`dispose`](AsyncOperationService::dispose) either sees it or the
    /// start fails. A failed start untracks it again.
    fn run_async<T, F, Fut>(
        &self,
        operation: F,
        start_immediately: bool,
    ) -> Result<AsyncOperationHandle<T>, AsyncOpError>
    where
        T: Send + Sync + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static;
}

impl<S: AsyncOperationService + ?Sized> RunAsync for S {
    fn run_async<T, F, Fut>(
        &self,
        operation: F,
        start_immediately: bool,
    ) -> Result<AsyncOperationHandle<T>, AsyncOpError>
    where
        T: Send + Sync + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
    {
        let handle = AsyncOperationHandle::new(operation);
        self.track(Arc::new(handle.clone()));
        if start_immediately {
            if let Err(err) = handle.start() {
                self.untrack(handle.id());
                return Err(err);
            }
        }
        Ok(handle)
    }
}

/// Default [`AsyncOperationService`] implementation.
#[derive(Default)]
pub struct AsyncOperationManager {
    live: Mutex<HashMap<OperationId, Arc<dyn TrackedOperation>>>,
}

impl AsyncOperationManager {
    /// Creates a manager with an empty live set.
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Vec<Arc<dyn TrackedOperation>> {
        self.live.lock().values().cloned().collect()
    }
}

#[async_trait]
impl AsyncOperationService for AsyncOperationManager {
    fn track(&self, operation: Arc<dyn TrackedOperation>) {
        tracing::trace!(operation = %operation.id(), phase = %operation.phase(), "Tracking operation");
        self.live.lock().insert(operation.id(), operation);
    }

    fn untrack(&self, id: OperationId) -> bool {
        self.live.lock().remove(&id).is_some()
    }

    fn update(&self) -> Result<usize, UnobservedFaults> {
        let finished: Vec<Arc<dyn TrackedOperation>> = self
            .snapshot()
            .into_iter()
            .filter(|op| op.is_finished() || op.phase().is_terminal())
            .collect();

        let mut faults = Vec::new();
        for op in &finished {
            if let Err(fault) = op.finish() {
                faults.push(fault);
            }
            self.live.lock().remove(&op.id());
        }

        if !finished.is_empty() {
            tracing::debug!(retired = finished.len(), faults = faults.len(), "Operations updated");
        }

        if faults.is_empty() {
            Ok(finished.len())
        } else {
            Err(UnobservedFaults { faults })
        }
    }

    async fn dispose(&self) -> Result<(), UnobservedFaults> {
        let drained: Vec<Arc<dyn TrackedOperation>> =
            self.live.lock().drain().map(|(_, op)| op).collect();

        // Nothing is awaited until every pending handle is aborted
        for op in &drained {
            if !op.abort_pending() {
                op.cancel();
            }
        }
        for op in &drained {
            if op.phase() == Phase::Running {
                op.wait().await;
            }
        }

        let mut faults = Vec::new();
        for op in &drained {
            if let Err(fault) = op.finish() {
                faults.push(fault);
            }
        }

        tracing::debug!(disposed = drained.len(), faults = faults.len(), "Operation service disposed");

        if faults.is_empty() {
            Ok(())
        } else {
            Err(UnobservedFaults { faults })
        }
    }

    fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    fn cancel_all(&self) -> usize {
        self.snapshot().iter().filter(|op| op.cancel()).count()
    }
}

impl Component for AsyncOperationManager {
    fn construct() -> Self {
        Self::new()
    }

    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.provide::<dyn AsyncOperationService>(|this| this);
    }
}

/// Discovery source for the services this crate ships.
///
/// Registers [`AsyncOperationManager`] as the singleton
/// `dyn AsyncOperationService`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinServices;

impl Discovery for BuiltinServices {
    fn definitions(&self) -> Vec<ServiceDefinition> {
        vec![ServiceDefinition::of::<dyn AsyncOperationService, AsyncOperationManager>(
            Lifetime::Singleton,
        )]
    }
}

impl std::fmt::Debug for AsyncOperationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncOperationManager")
            .field("live", &self.live_count())
            .finish()
    }
}
