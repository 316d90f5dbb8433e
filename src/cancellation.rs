//! Cooperative cancellation for wrapped async operations.
//!
//! Every [`AsyncOperationHandle`](crate::AsyncOperationHandle) owns one
//! token and passes a clone to the operation body. Cancelling the handle
//! cancels the token; the body decides when to look.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// A token that can be used to signal cancellation across async operations.
///
/// Cloning shares the underlying flag.
///
/// # Examples
///
/// ```
/// use ferrous_services::{CancellationToken, OperationError};
///
/// # async fn example() -> Result<(), OperationError> {
/// let token = CancellationToken::new();
///
/// tokio::select! {
///     _ = some_long_operation() => {}
///     _ = token.cancelled() => return Err(OperationError::Canceled),
/// }
///
/// // Or poll between steps
/// token.check()?;
/// # Ok(())
/// # }
/// # async fn some_long_operation() {}
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationTokenInner>,
}

struct CancellationTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationTokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Requests cancellation and wakes every task awaiting [`cancelled`](Self::cancelled).
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns true if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Fails with [`CancellationError`] once cancellation has been requested.
    ///
    /// Converts into [`OperationError::Canceled`](crate::OperationError::Canceled)
    /// with `?`.
    pub fn check(&self) -> Result<(), CancellationError> {
        if self.is_cancelled() {
            Err(CancellationError::new("Operation was cancelled"))
        } else {
            Ok(())
        }
    }

    /// Completes when cancellation is requested.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel is not missed
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Error type for cancellation operations.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Cancellation error: {message}")]
pub struct CancellationError {
    message: String,
}

impl CancellationError {
    /// Creates a new cancellation error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
