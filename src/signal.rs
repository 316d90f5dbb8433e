//! Owner-locked event signals.
//!
//! A [`Signal`] is bound at construction to a [`SignalKey`]. Anyone holding
//! a reference to the signal can subscribe or unsubscribe, but only the
//! holder of the key can emit. Operation handles keep their keys private,
//! so their completion signals cannot be spoofed from outside.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::SignalError;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Emission capability for the signals built with it.
///
/// Deliberately neither `Clone` nor `Copy`: whoever owns the key owns
/// emission.
#[derive(Debug)]
pub struct SignalKey {
    id: u64,
}

impl SignalKey {
    /// Mints a key distinct from every other key in the process.
    pub fn new() -> Self {
        Self {
            id: NEXT_KEY.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for SignalKey {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber callback. Identity is the `Arc` allocation.
pub type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// An event with ordered, de-duplicated subscribers.
///
/// Subscribers run in connection order; reconnecting moves a callback last.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use ferrous_services::{Signal, SignalError, SignalKey};
///
/// let owner = SignalKey::new();
/// let signal: Signal<usize> = Signal::new(&owner);
///
/// let total = Arc::new(AtomicUsize::new(0));
/// let sink = total.clone();
/// signal.subscribe(move |n| { sink.fetch_add(*n, Ordering::SeqCst); });
///
/// signal.emit(&owner, &5).unwrap();
/// assert_eq!(total.load(Ordering::SeqCst), 5);
///
/// let intruder = SignalKey::new();
/// assert_eq!(signal.emit(&intruder, &1), Err(SignalError::LockViolation));
/// ```
pub struct Signal<A = ()> {
    lock: u64,
    subscribers: Mutex<Vec<Callback<A>>>,
}

impl<A> Signal<A> {
    /// Creates a signal only `key` can emit.
    pub fn new(key: &SignalKey) -> Self {
        Self {
            lock: key.id,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Appends `callback`. A callback that is already subscribed is moved
    /// to the end instead of being added twice.
    ///
    /// Returns the callback so it can be passed to [`disconnect`](Self::disconnect).
    pub fn connect(&self, callback: Callback<A>) -> Callback<A> {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|existing| !same_callback(existing, &callback));
        subscribers.push(Arc::clone(&callback));
        callback
    }

    /// Wraps `f` in a new callback and connects it.
    pub fn subscribe<F>(&self, f: F) -> Callback<A>
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.connect(Arc::new(f))
    }

    /// Removes `callback`; returns whether it was subscribed.
    pub fn disconnect(&self, callback: &Callback<A>) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|existing| !same_callback(existing, callback));
        subscribers.len() != before
    }

    /// Removes every subscriber.
    pub fn clear(&self) {
        self.subscribers.lock().clear();
    }

    /// Returns `true` when at least one callback is subscribed.
    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.lock().is_empty()
    }

    /// Number of subscribed callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Invokes every subscriber with `arg`, in subscription order.
    ///
    /// Fails with [`SignalError::LockViolation`] unless `key` is the key the
    /// signal was built with. With no subscribers this is a no-op.
    /// Subscribers run outside the internal lock and may (un)subscribe.
    pub fn emit(&self, key: &SignalKey, arg: &A) -> Result<(), SignalError> {
        if key.id != self.lock {
            return Err(SignalError::LockViolation);
        }

        let snapshot: Vec<Callback<A>> = self.subscribers.lock().clone();
        for callback in &snapshot {
            callback(arg);
        }
        Ok(())
    }
}

impl<A> std::fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// Compare data pointers only; vtable pointers may differ across codegen units
fn same_callback<A>(a: &Callback<A>, b: &Callback<A>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
