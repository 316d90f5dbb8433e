//! Cancellable async operations behind a phase-tracked handle.
//!
//! An [`AsyncOperationHandle`] wraps one unit of async work. It moves
//! through `Pending → Running → {Completed | Canceled | Faulted}` and fires
//! exactly one of its three terminal signals when completion resolution
//! runs. Resolution is driven either by the owning
//! [`AsyncOperationService`] on `update`/`dispose`, or directly by
//! [`AsyncOperationHandle::completion`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::error::{AsyncOpError, OperationError};
use crate::signal::{Signal, SignalKey};

mod service;

pub use service::{AsyncOperationManager, AsyncOperationService, BuiltinServices, RunAsync};

/// Position of a handle in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Created, not started.
    Pending,
    /// Started; the wrapped work may still be executing.
    Running,
    /// The work returned a value.
    Completed,
    /// The work observed a cancellation request.
    Canceled,
    /// The work failed or panicked.
    Faulted,
}

impl Phase {
    /// Returns `true` for `Completed`, `Canceled` and `Faulted`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Canceled | Phase::Faulted)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Pending => "Pending",
            Phase::Running => "Running",
            Phase::Completed => "Completed",
            Phase::Canceled => "Canceled",
            Phase::Faulted => "Faulted",
        };
        f.write_str(name)
    }
}

/// Unique handle identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(Uuid);

impl OperationId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying v4 UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, OperationError>> + Send>>;
type BoxOperation<T> = Box<dyn FnOnce(CancellationToken) -> BoxFuture<T> + Send>;

// What the worker observed; consumed by completion resolution
enum Outcome<T> {
    Completed(T),
    Canceled,
    Faulted(OperationError),
}

struct HandleState<T> {
    phase: Phase,
    operation: Option<BoxOperation<T>>,
    outcome: Option<Outcome<T>>,
    result: Option<Arc<T>>,
}

struct HandleInner<T> {
    id: OperationId,
    key: SignalKey,
    token: CancellationToken,
    state: Mutex<HandleState<T>>,
    finished: watch::Sender<bool>,
    completed: Signal<T>,
    canceled: Signal,
    faulted: Signal<OperationError>,
}

/// Clears the terminal signals when dropped, also while unwinding from a
/// panicking subscriber.
struct ClearSignals<'a, T>(&'a HandleInner<T>);

impl<T> Drop for ClearSignals<'_, T> {
    fn drop(&mut self) {
        self.0.completed.clear();
        self.0.canceled.clear();
        self.0.faulted.clear();
    }
}

enum Resolution<T> {
    Completed(Arc<T>),
    Canceled,
    Faulted(OperationError),
}

/// Handle over one cancellable async operation.
///
/// `T` is the result type; `AsyncOperationHandle` (with `T = ()`) is the
/// untyped variant. Clones share the same operation.
///
/// # Examples
///
/// ```rust
/// use ferrous_services::{AsyncOperationHandle, OperationError, Phase};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let handle = AsyncOperationHandle::new(|token| async move {
///     token.check()?;
///     Ok::<_, OperationError>(21 * 2)
/// });
/// assert_eq!(handle.phase(), Phase::Pending);
///
/// handle.completed().subscribe(|value| println!("done: {value}"));
/// handle.start()?;
///
/// assert_eq!(handle.completion().await?, Phase::Completed);
/// assert_eq!(handle.result().as_deref(), Some(&42));
/// # Ok(())
/// # }
/// ```
pub struct AsyncOperationHandle<T = ()> {
    inner: Arc<HandleInner<T>>,
}

impl<T> Clone for AsyncOperationHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> AsyncOperationHandle<T> {
    /// Wraps `operation` in a Pending handle. Nothing runs until [`start`](Self::start).
    ///
    /// The operation receives the handle's cancellation token and should
    /// return [`OperationError::Canceled`] (for instance via
    /// `token.check()?`) when it gives up because of it.
    pub fn new<F, Fut>(operation: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
    {
        let operation: BoxOperation<T> = Box::new(move |token| Box::pin(operation(token)));
        let key = SignalKey::new();
        let completed = Signal::new(&key);
        let canceled = Signal::new(&key);
        let faulted = Signal::new(&key);
        let (finished, _) = watch::channel(false);

        Self {
            inner: Arc::new(HandleInner {
                id: OperationId::new(),
                key,
                token: CancellationToken::new(),
                state: Mutex::new(HandleState {
                    phase: Phase::Pending,
                    operation: Some(operation),
                    outcome: None,
                    result: None,
                }),
                finished,
                completed,
                canceled,
                faulted,
            }),
        }
    }

    /// Identifier assigned at construction; shared by all clones.
    pub fn id(&self) -> OperationId {
        self.inner.id
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// Returns `true` once the wrapped work has stopped executing, whether or
    /// not completion resolution has run yet.
    pub fn is_finished(&self) -> bool {
        *self.inner.finished.borrow()
    }

    /// The value produced by the operation; `Some` only when `Completed`.
    pub fn result(&self) -> Option<Arc<T>> {
        self.inner.state.lock().result.clone()
    }

    /// Fires with the result when the handle completes.
    pub fn completed(&self) -> &Signal<T> {
        &self.inner.completed
    }

    /// Fires when the handle is canceled.
    pub fn canceled(&self) -> &Signal {
        &self.inner.canceled
    }

    /// Fires with the error when the handle faults.
    ///
    /// A fault with no subscriber here is escalated as
    /// [`AsyncOpError::UnobservedFault`].
    pub fn faulted(&self) -> &Signal<OperationError> {
        &self.inner.faulted
    }

    /// Moves `Pending → Running` and spawns the work on the current tokio runtime.
    pub fn start(&self) -> Result<(), AsyncOpError> {
        let id = self.inner.id;
        let runtime = Handle::try_current().map_err(|_| AsyncOpError::NoRuntime(id))?;

        let operation = {
            let mut state = self.inner.state.lock();
            let operation = match (state.phase, state.operation.take()) {
                (Phase::Pending, Some(operation)) => operation,
                (phase, _) => {
                    return Err(AsyncOpError::InvalidState {
                        id,
                        phase,
                        action: "start",
                    })
                }
            };
            state.phase = Phase::Running;
            operation
        };

        tracing::debug!(operation = %id, "Operation started");

        let work = operation(self.inner.token.clone());
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            let outcome = match tokio::spawn(work).await {
                Ok(Ok(_)) if inner.token.is_cancelled() => Outcome::Canceled,
                Ok(Ok(value)) => Outcome::Completed(value),
                Ok(Err(err)) if err.is_canceled() => Outcome::Canceled,
                Ok(Err(err)) => Outcome::Faulted(err),
                Err(join) if join.is_panic() => {
                    Outcome::Faulted(OperationError::Panicked(panic_message(join.into_panic())))
                }
                Err(_) => Outcome::Canceled,
            };
            inner.state.lock().outcome = Some(outcome);
            inner.finished.send_replace(true);
            tracing::trace!(operation = %inner.id, "Operation finished executing");
        });

        Ok(())
    }

    /// Requests cooperative cancellation.
    ///
    /// Only acts while `Running`; returns whether a request was issued. The
    /// phase changes later, when the work observes the request and unwinds.
    pub fn cancel(&self) -> bool {
        if self.inner.state.lock().phase != Phase::Running || self.inner.token.is_cancelled() {
            return false;
        }
        self.inner.token.cancel();
        tracing::debug!(operation = %self.inner.id, "Cancellation requested");
        true
    }

    /// Requests cancellation once `delay` has elapsed.
    ///
    /// The timer follows the rules of [`cancel`](Self::cancel) when it
    /// fires, so it does nothing unless the handle is still `Running`. It
    /// does not keep the handle alive.
    pub fn cancel_after(&self, delay: Duration) -> Result<(), AsyncOpError> {
        let runtime =
            Handle::try_current().map_err(|_| AsyncOpError::NoRuntime(self.inner.id))?;
        let inner = Arc::downgrade(&self.inner);

        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                AsyncOperationHandle { inner }.cancel();
            }
        });
        Ok(())
    }

    /// Suspends until the wrapped work has stopped executing.
    ///
    /// On a handle that is never started this waits until it is aborted.
    pub async fn wait(&self) {
        let mut finished = self.inner.finished.subscribe();
        // The sender lives in `inner`, so the channel cannot close under us
        let _ = finished.wait_for(|done| *done).await;
    }

    /// Waits for the work, runs completion resolution, and returns the terminal phase.
    pub async fn completion(&self) -> Result<Phase, AsyncOpError> {
        let phase = self.phase();
        if phase == Phase::Pending {
            return Err(AsyncOpError::InvalidState {
                id: self.inner.id,
                phase,
                action: "await",
            });
        }

        self.wait().await;
        self.finish()?;
        Ok(self.phase())
    }

    /// Runs completion resolution if the work has finished and nobody has
    /// resolved it yet.
    ///
    /// Sets the terminal phase, emits the matching signal, then clears all
    /// three signals. Returns the phase entered, or `None` when there was
    /// nothing to resolve. An unobserved fault is returned as
    /// [`AsyncOpError::UnobservedFault`] after the handle is already Faulted.
    pub fn finish(&self) -> Result<Option<Phase>, AsyncOpError> {
        let resolution = {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Running {
                return Ok(None);
            }
            let outcome = match state.outcome.take() {
                Some(outcome) => outcome,
                None => return Ok(None),
            };
            match outcome {
                Outcome::Completed(value) => {
                    let value = Arc::new(value);
                    state.result = Some(Arc::clone(&value));
                    state.phase = Phase::Completed;
                    Resolution::Completed(value)
                }
                Outcome::Canceled => {
                    state.phase = Phase::Canceled;
                    Resolution::Canceled
                }
                Outcome::Faulted(err) => {
                    state.phase = Phase::Faulted;
                    Resolution::Faulted(err)
                }
            }
        };

        let id = self.inner.id;
        let key = &self.inner.key;
        let cleared = ClearSignals(&self.inner);
        let (phase, emitted) = match resolution {
            Resolution::Completed(value) => {
                (Phase::Completed, self.inner.completed.emit(key, &*value).map_err(AsyncOpError::from))
            }
            Resolution::Canceled => {
                (Phase::Canceled, self.inner.canceled.emit(key, &()).map_err(AsyncOpError::from))
            }
            Resolution::Faulted(err) if self.inner.faulted.has_subscribers() => {
                (Phase::Faulted, self.inner.faulted.emit(key, &err).map_err(AsyncOpError::from))
            }
            Resolution::Faulted(err) => {
                tracing::error!(operation = %id, error = %err, "Operation faulted with no observer");
                (Phase::Faulted, Err(AsyncOpError::UnobservedFault { id, source: err }))
            }
        };

        drop(cleared);
        tracing::debug!(operation = %id, phase = %phase, "Operation resolved");
        emitted.map(|_| Some(phase))
    }

    /// Moves a never-started handle straight to `Canceled`.
    ///
    /// Returns `false` (and does nothing) unless the handle is `Pending`.
    pub fn abort_pending(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Pending {
                return false;
            }
            state.operation = None;
            state.phase = Phase::Canceled;
        }

        self.inner.token.cancel();
        self.inner.finished.send_replace(true);
        let cleared = ClearSignals(&self.inner);
        if let Err(err) = self.inner.canceled.emit(&self.inner.key, &()) {
            tracing::warn!(operation = %self.inner.id, error = %err, "Cancel signal rejected");
        }
        drop(cleared);
        tracing::debug!(operation = %self.inner.id, "Pending operation aborted");
        true
    }
}

impl<T> std::fmt::Debug for AsyncOperationHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncOperationHandle")
            .field("id", &self.inner.id)
            .field("phase", &self.inner.state.lock().phase)
            .field("finished", &*self.inner.finished.borrow())
            .finish()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Type-erased view of a handle, as held by the operation service.
#[async_trait]
pub trait TrackedOperation: Send + Sync {
    /// See [`AsyncOperationHandle::id`].
    fn id(&self) -> OperationId;

    /// See [`AsyncOperationHandle::phase`].
    fn phase(&self) -> Phase;

    /// See [`AsyncOperationHandle::is_finished`].
    fn is_finished(&self) -> bool;

    /// See [`AsyncOperationHandle::finish`].
    fn finish(&self) -> Result<Option<Phase>, AsyncOpError>;

    /// See [`AsyncOperationHandle::cancel`].
    fn cancel(&self) -> bool;

    /// See [`AsyncOperationHandle::abort_pending`].
    fn abort_pending(&self) -> bool;

    /// See [`AsyncOperationHandle::wait`].
    async fn wait(&self);
}

#[async_trait]
impl<T: Send + Sync + 'static> TrackedOperation for AsyncOperationHandle<T> {
    fn id(&self) -> OperationId {
        AsyncOperationHandle::id(self)
    }

    fn phase(&self) -> Phase {
        AsyncOperationHandle::phase(self)
    }

    fn is_finished(&self) -> bool {
        AsyncOperationHandle::is_finished(self)
    }

    fn finish(&self) -> Result<Option<Phase>, AsyncOpError> {
        AsyncOperationHandle::finish(self)
    }

    fn cancel(&self) -> bool {
        AsyncOperationHandle::cancel(self)
    }

    fn abort_pending(&self) -> bool {
        AsyncOperationHandle::abort_pending(self)
    }

    async fn wait(&self) {
        AsyncOperationHandle::wait(self).await
    }
}
