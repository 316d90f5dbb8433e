use ferrous_services::{AsyncOpError, AsyncOperationHandle, OperationError, Phase};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const LIMIT: Duration = Duration::from_secs(5);

/// Counts emissions of each terminal signal.
#[derive(Default)]
struct Tally {
    completed: AtomicUsize,
    canceled: AtomicUsize,
    faulted: AtomicUsize,
}

impl Tally {
    fn attach<T: Send + Sync + 'static>(handle: &AsyncOperationHandle<T>) -> Arc<Self> {
        let tally = Arc::new(Self::default());

        let t = tally.clone();
        handle.completed().subscribe(move |_| {
            t.completed.fetch_add(1, Ordering::SeqCst);
        });
        let t = tally.clone();
        handle.canceled().subscribe(move |_| {
            t.canceled.fetch_add(1, Ordering::SeqCst);
        });
        let t = tally.clone();
        handle.faulted().subscribe(move |_| {
            t.faulted.fetch_add(1, Ordering::SeqCst);
        });

        tally
    }

    fn counts(&self) -> (usize, usize, usize) {
        (
            self.completed.load(Ordering::SeqCst),
            self.canceled.load(Ordering::SeqCst),
            self.faulted.load(Ordering::SeqCst),
        )
    }
}

async fn settle<T: Send + Sync + 'static>(handle: &AsyncOperationHandle<T>) -> Phase {
    tokio::time::timeout(LIMIT, handle.completion())
        .await
        .expect("operation should finish")
        .expect("completion should resolve")
}

#[tokio::test]
async fn test_normal_completion() {
    let handle = AsyncOperationHandle::new(|_| async { Ok::<_, OperationError>("payload") });
    let tally = Tally::attach(&handle);

    assert_eq!(handle.phase(), Phase::Pending);
    handle.start().unwrap();
    assert_eq!(handle.phase(), Phase::Running);

    assert_eq!(settle(&handle).await, Phase::Completed);
    assert_eq!(tally.counts(), (1, 0, 0));
    assert_eq!(handle.result().as_deref(), Some(&"payload"));
}

#[tokio::test]
async fn test_completed_signal_carries_result() {
    let handle = AsyncOperationHandle::new(|_| async { Ok::<_, OperationError>(vec![1, 2, 3]) });
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    handle.completed().subscribe(move |values: &Vec<i32>| {
        *sink.lock().unwrap() = Some(values.iter().sum::<i32>());
    });

    handle.start().unwrap();
    settle(&handle).await;
    assert_eq!(*seen.lock().unwrap(), Some(6));
}

#[tokio::test]
async fn test_cancel_while_running() {
    let handle = AsyncOperationHandle::new(|token| async move {
        token.cancelled().await;
        token.check()?;
        Ok::<u64, OperationError>(99)
    });
    let tally = Tally::attach(&handle);

    handle.start().unwrap();
    assert!(handle.cancel());
    // The phase only moves once the work unwinds
    assert!(!handle.cancel());

    assert_eq!(settle(&handle).await, Phase::Canceled);
    assert_eq!(tally.counts(), (0, 1, 0));
    assert!(handle.result().is_none());
}

#[tokio::test]
async fn test_success_after_cancel_request_is_canceled() {
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = AsyncOperationHandle::new(|_token| async move {
        // Ignores the token entirely
        let _ = release_rx.await;
        Ok::<_, OperationError>(1)
    });
    let tally = Tally::attach(&handle);

    handle.start().unwrap();
    handle.cancel();
    release_tx.send(()).unwrap();

    assert_eq!(settle(&handle).await, Phase::Canceled);
    assert_eq!(tally.counts(), (0, 1, 0));
    assert!(handle.result().is_none());
}

#[tokio::test]
async fn test_cancel_is_noop_when_not_running() {
    let handle = AsyncOperationHandle::new(|_| async { Ok::<_, OperationError>(()) });
    assert!(!handle.cancel());
    assert_eq!(handle.phase(), Phase::Pending);

    handle.start().unwrap();
    settle(&handle).await;
    assert!(!handle.cancel());
    assert_eq!(handle.phase(), Phase::Completed);
}

#[tokio::test]
async fn test_fault_is_delivered_to_subscriber() {
    let handle = AsyncOperationHandle::new(|_| async {
        Err::<(), _>(OperationError::failed("connection reset"))
    });
    let tally = Tally::attach(&handle);
    let message = Arc::new(Mutex::new(String::new()));
    let sink = message.clone();
    handle.faulted().subscribe(move |err: &OperationError| {
        *sink.lock().unwrap() = err.to_string();
    });

    handle.start().unwrap();
    assert_eq!(settle(&handle).await, Phase::Faulted);
    assert_eq!(tally.counts(), (0, 0, 1));
    assert_eq!(*message.lock().unwrap(), "Operation failed: connection reset");
}

#[tokio::test]
async fn test_unobserved_fault_is_escalated() {
    let handle = AsyncOperationHandle::new(|_| async {
        Err::<(), _>(OperationError::failed("nobody listens"))
    });
    handle.start().unwrap();

    let outcome = tokio::time::timeout(LIMIT, handle.completion()).await.unwrap();
    match outcome {
        Err(AsyncOpError::UnobservedFault { id, source }) => {
            assert_eq!(id, handle.id());
            assert_eq!(source.to_string(), "Operation failed: nobody listens");
        }
        other => panic!("Expected UnobservedFault, got {:?}", other),
    }
    assert_eq!(handle.phase(), Phase::Faulted);
}

#[tokio::test]
async fn test_panic_faults_only_that_handle() {
    let panicking = AsyncOperationHandle::new(|_| async {
        if true {
            panic!("worker exploded");
        }
        Ok::<(), OperationError>(())
    });
    let sibling = AsyncOperationHandle::new(|_| async { Ok::<_, OperationError>(7) });

    let error = Arc::new(Mutex::new(None));
    let sink = error.clone();
    panicking.faulted().subscribe(move |err: &OperationError| {
        *sink.lock().unwrap() = Some(err.clone());
    });

    panicking.start().unwrap();
    sibling.start().unwrap();

    assert_eq!(settle(&panicking).await, Phase::Faulted);
    assert_eq!(settle(&sibling).await, Phase::Completed);
    assert!(matches!(
        error.lock().unwrap().as_ref(),
        Some(OperationError::Panicked(msg)) if msg == "worker exploded"
    ));
}

#[tokio::test]
async fn test_start_twice_is_invalid() {
    let handle = AsyncOperationHandle::new(|_| async { Ok::<_, OperationError>(()) });
    handle.start().unwrap();

    match handle.start() {
        Err(AsyncOpError::InvalidState { phase, action, .. }) => {
            assert!(phase == Phase::Running || phase.is_terminal());
            assert_eq!(action, "start");
        }
        other => panic!("Expected InvalidState, got {:?}", other),
    }

    settle(&handle).await;
    assert!(matches!(handle.start(), Err(AsyncOpError::InvalidState { phase: Phase::Completed, .. })));
}

#[tokio::test]
async fn test_completion_requires_start() {
    let handle = AsyncOperationHandle::new(|_| async { Ok::<_, OperationError>(()) });
    assert!(matches!(
        handle.completion().await,
        Err(AsyncOpError::InvalidState { phase: Phase::Pending, .. })
    ));
}

#[tokio::test]
async fn test_signals_cleared_after_terminal() {
    let handle = AsyncOperationHandle::new(|_| async { Ok::<_, OperationError>(()) });
    let tally = Tally::attach(&handle);

    handle.start().unwrap();
    settle(&handle).await;

    assert!(!handle.completed().has_subscribers());
    assert!(!handle.canceled().has_subscribers());
    assert!(!handle.faulted().has_subscribers());

    // Resolution runs at most once
    assert_eq!(handle.finish().unwrap(), None);
    assert_eq!(handle.completion().await.unwrap(), Phase::Completed);
    assert_eq!(tally.counts(), (1, 0, 0));
}

#[tokio::test]
async fn test_wait_does_not_resolve() {
    let handle = AsyncOperationHandle::new(|_| async { Ok::<_, OperationError>(()) });
    let tally = Tally::attach(&handle);
    handle.start().unwrap();

    tokio::time::timeout(LIMIT, handle.wait()).await.unwrap();
    assert!(handle.is_finished());
    assert_eq!(handle.phase(), Phase::Running);
    assert_eq!(tally.counts(), (0, 0, 0));

    assert_eq!(handle.finish().unwrap(), Some(Phase::Completed));
    assert_eq!(tally.counts(), (1, 0, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_racing_completion_yields_one_terminal_signal() {
    for _ in 0..50 {
        let handle = AsyncOperationHandle::new(|token| async move {
            tokio::task::yield_now().await;
            token.check()?;
            Ok::<_, OperationError>(())
        });
        let tally = Tally::attach(&handle);
        handle.start().unwrap();

        let canceller = handle.clone();
        let cancel = tokio::spawn(async move { canceller.cancel() });
        let phase = settle(&handle).await;
        cancel.await.unwrap();

        let (completed, canceled, faulted) = tally.counts();
        assert_eq!(completed + canceled + faulted, 1);
        assert_eq!(faulted, 0);
        assert!(phase == Phase::Completed || phase == Phase::Canceled);
    }
}

// ===== Panicking subscribers =====

fn assert_no_subscribers<T: Send + Sync + 'static>(handle: &AsyncOperationHandle<T>) {
    assert!(!handle.completed().has_subscribers());
    assert!(!handle.canceled().has_subscribers());
    assert!(!handle.faulted().has_subscribers());
}

#[tokio::test]
async fn test_panicking_subscriber_still_clears_signals_on_finish() {
    let handle = AsyncOperationHandle::new(|_| async { Ok::<_, OperationError>(7u32) });
    handle.completed().subscribe(|_: &u32| panic!("subscriber failed"));
    handle.faulted().subscribe(|_: &OperationError| {});

    handle.start().unwrap();
    handle.wait().await;

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handle.finish()));
    assert!(outcome.is_err());

    assert_eq!(handle.phase(), Phase::Completed);
    assert_eq!(handle.result().as_deref(), Some(&7));
    assert_no_subscribers(&handle);
    assert_eq!(handle.finish().unwrap(), None);
}

#[test]
fn test_panicking_subscriber_still_clears_signals_on_abort() {
    let handle = AsyncOperationHandle::new(|_| async { Ok::<_, OperationError>(()) });
    handle.canceled().subscribe(|_: &()| panic!("subscriber failed"));
    handle.completed().subscribe(|_: &()| {});

    let outcome =
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handle.abort_pending()));
    assert!(outcome.is_err());

    assert_eq!(handle.phase(), Phase::Canceled);
    assert!(handle.is_finished());
    assert_no_subscribers(&handle);
    assert!(!handle.abort_pending());
}

// ===== Timed cancellation =====

#[tokio::test]
async fn test_cancel_after_cancels_running_work() {
    let handle = AsyncOperationHandle::new(|token| async move {
        token.cancelled().await;
        token.check()?;
        Ok::<_, OperationError>(())
    });
    let tally = Tally::attach(&handle);

    handle.start().unwrap();
    handle.cancel_after(Duration::from_millis(10)).unwrap();

    assert_eq!(settle(&handle).await, Phase::Canceled);
    assert_eq!(tally.counts(), (0, 1, 0));
}

#[tokio::test]
async fn test_cancel_after_is_noop_once_completed() {
    let handle = AsyncOperationHandle::new(|_| async { Ok::<_, OperationError>(1u8) });
    handle.start().unwrap();
    handle.cancel_after(Duration::from_millis(5)).unwrap();

    assert_eq!(settle(&handle).await, Phase::Completed);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.phase(), Phase::Completed);
}

#[test]
fn test_cancel_after_requires_runtime() {
    let handle = AsyncOperationHandle::new(|_| async { Ok::<_, OperationError>(()) });
    assert!(matches!(
        handle.cancel_after(Duration::from_millis(1)),
        Err(AsyncOpError::NoRuntime(_))
    ));
}
