use ferrous_services::{
    AsyncOpError, AsyncOperationManager, AsyncOperationService, BuiltinServices, Container,
    Lifetime, OperationError, Phase, Resolver, RunAsync,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const LIMIT: Duration = Duration::from_secs(5);

fn blocking_op(
    service: &dyn AsyncOperationService,
) -> ferrous_services::AsyncOperationHandle<()> {
    service
        .run_async(
            |token| async move {
                token.cancelled().await;
                token.check()?;
                Ok::<_, OperationError>(())
            },
            true,
        )
        .unwrap()
}

#[tokio::test]
async fn test_service_resolves_from_container() {
    let mut container = Container::new();
    assert_eq!(container.discover(&BuiltinServices).unwrap(), 1);

    let first = container.resolve::<dyn AsyncOperationService>().unwrap();
    let second = container.resolve::<dyn AsyncOperationService>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let descriptor = container.descriptors().next().unwrap();
    assert_eq!(descriptor.lifetime(), Lifetime::Singleton);
}

#[tokio::test]
async fn test_update_retires_finished_handles() {
    let service = AsyncOperationManager::new();
    let quick = service
        .run_async(|_| async { Ok::<_, OperationError>(5u32) }, true)
        .unwrap();
    let slow = blocking_op(&service);
    assert_eq!(service.live_count(), 2);

    tokio::time::timeout(LIMIT, quick.wait()).await.unwrap();
    assert_eq!(service.update().unwrap(), 1);
    assert_eq!(quick.phase(), Phase::Completed);
    assert_eq!(quick.result().as_deref(), Some(&5));
    assert_eq!(slow.phase(), Phase::Running);
    assert_eq!(service.live_count(), 1);

    slow.cancel();
    tokio::time::timeout(LIMIT, slow.wait()).await.unwrap();
    assert_eq!(service.update().unwrap(), 1);
    assert_eq!(slow.phase(), Phase::Canceled);
    assert_eq!(service.live_count(), 0);
}

#[tokio::test]
async fn test_update_drops_handles_resolved_elsewhere() {
    let service = AsyncOperationManager::new();
    let handle = service
        .run_async(|_| async { Ok::<_, OperationError>(()) }, true)
        .unwrap();

    assert_eq!(tokio::time::timeout(LIMIT, handle.completion()).await.unwrap().unwrap(), Phase::Completed);
    assert_eq!(service.live_count(), 1);
    assert_eq!(service.update().unwrap(), 1);
    assert_eq!(service.live_count(), 0);
}

#[tokio::test]
async fn test_dispose_leaves_nothing_live() {
    let service = AsyncOperationManager::new();
    let pending = service
        .run_async(|_| async { Ok::<_, OperationError>(()) }, false)
        .unwrap();
    let running = blocking_op(&service);
    let done = service
        .run_async(|_| async { Ok::<_, OperationError>(()) }, true)
        .unwrap();

    let canceled = Arc::new(AtomicUsize::new(0));
    for handle in [&pending, &running] {
        let canceled = canceled.clone();
        handle.canceled().subscribe(move |_| {
            canceled.fetch_add(1, Ordering::SeqCst);
        });
    }

    tokio::time::timeout(LIMIT, service.dispose()).await.unwrap().unwrap();

    assert_eq!(service.live_count(), 0);
    assert_eq!(pending.phase(), Phase::Canceled);
    assert_eq!(running.phase(), Phase::Canceled);
    assert!(done.phase().is_terminal());
    assert_eq!(canceled.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dispose_on_empty_service() {
    let service = AsyncOperationManager::new();
    assert!(service.dispose().await.is_ok());
    assert_eq!(service.live_count(), 0);
}

#[tokio::test]
async fn test_fault_isolation() {
    let service = AsyncOperationManager::new();
    let observed = Arc::new(AtomicUsize::new(0));

    let watched = service
        .run_async(|_| async { Err::<(), _>(OperationError::failed("watched")) }, true)
        .unwrap();
    let sink = observed.clone();
    watched.faulted().subscribe(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    let ignored = service
        .run_async(|_| async { Err::<(), _>(OperationError::failed("ignored")) }, true)
        .unwrap();
    let healthy = service
        .run_async(|_| async { Ok::<_, OperationError>("fine") }, true)
        .unwrap();

    for handle in [&watched, &ignored] {
        tokio::time::timeout(LIMIT, handle.wait()).await.unwrap();
    }
    tokio::time::timeout(LIMIT, healthy.wait()).await.unwrap();

    let faults = service.update().unwrap_err();
    assert_eq!(faults.faults.len(), 1);
    match &faults.faults[0] {
        AsyncOpError::UnobservedFault { id, source } => {
            assert_eq!(*id, ignored.id());
            assert_eq!(source.to_string(), "Operation failed: ignored");
        }
        other => panic!("Expected UnobservedFault, got {:?}", other),
    }

    // Every finished handle was still processed
    assert_eq!(observed.load(Ordering::SeqCst), 1);
    assert_eq!(watched.phase(), Phase::Faulted);
    assert_eq!(ignored.phase(), Phase::Faulted);
    assert_eq!(healthy.phase(), Phase::Completed);
    assert_eq!(service.live_count(), 0);
}

#[tokio::test]
async fn test_cancel_all_only_counts_running() {
    let service = AsyncOperationManager::new();
    let _pending = service
        .run_async(|_| async { Ok::<_, OperationError>(()) }, false)
        .unwrap();
    let a = blocking_op(&service);
    let b = blocking_op(&service);

    assert_eq!(service.cancel_all(), 2);
    assert_eq!(service.cancel_all(), 0);

    for handle in [&a, &b] {
        assert_eq!(tokio::time::timeout(LIMIT, handle.completion()).await.unwrap().unwrap(), Phase::Canceled);
    }
    service.dispose().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_operations_through_resolved_service() {
    let mut container = Container::new();
    container.discover(&BuiltinServices).unwrap();
    let service = container.resolve::<dyn AsyncOperationService>().unwrap();

    let handles: Vec<_> = (0..32u64)
        .map(|n| {
            service
                .run_async(
                    move |_| async move {
                        tokio::time::sleep(Duration::from_millis(n % 4)).await;
                        Ok::<_, OperationError>(n * n)
                    },
                    true,
                )
                .unwrap()
        })
        .collect();
    assert_eq!(service.live_count(), 32);

    for handle in &handles {
        tokio::time::timeout(LIMIT, handle.wait()).await.unwrap();
    }
    assert_eq!(service.update().unwrap(), 32);

    let total: u64 = handles.iter().filter_map(|h| h.result()).map(|v| *v).sum();
    assert_eq!(total, (0..32u64).map(|n| n * n).sum::<u64>());
}

#[tokio::test]
async fn test_dispose_aborts_pending_before_waiting() {
    let service = AsyncOperationManager::new();
    let pending = service
        .run_async(|_| async { Ok::<_, OperationError>(()) }, false)
        .unwrap();

    // Tries to start the pending handle while dispose is waiting on this one
    let late = pending.clone();
    let late_start = Arc::new(Mutex::new(None));
    let sink = late_start.clone();
    let running = service
        .run_async(
            move |token| async move {
                token.cancelled().await;
                *sink.lock().unwrap() = Some(late.start());
                Err::<(), _>(OperationError::Canceled)
            },
            true,
        )
        .unwrap();

    tokio::time::timeout(LIMIT, service.dispose()).await.unwrap().unwrap();

    assert!(matches!(
        late_start.lock().unwrap().take(),
        Some(Err(AsyncOpError::InvalidState { phase: Phase::Canceled, .. }))
    ));
    assert_eq!(pending.phase(), Phase::Canceled);
    assert_eq!(running.phase(), Phase::Canceled);
    assert_eq!(service.live_count(), 0);
}

#[test]
fn test_failed_start_is_not_tracked() {
    let service = AsyncOperationManager::new();

    // No runtime here, so the start fails
    let result = service.run_async(|_| async { Ok::<_, OperationError>(()) }, true);
    assert!(matches!(result, Err(AsyncOpError::NoRuntime(_))));
    assert_eq!(service.live_count(), 0);
}

#[test]
fn test_untrack() {
    let service = AsyncOperationManager::new();
    let handle = service
        .run_async(|_| async { Ok::<_, OperationError>(()) }, false)
        .unwrap();

    assert!(service.untrack(handle.id()));
    assert!(!service.untrack(handle.id()));
    assert_eq!(service.live_count(), 0);
    assert_eq!(handle.phase(), Phase::Pending);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_run_async_and_update() {
    let mut container = Container::new();
    container.discover(&BuiltinServices).unwrap();
    let service = container.resolve::<dyn AsyncOperationService>().unwrap();

    let producers: Vec<_> = (0..8u64)
        .map(|task| {
            let service = service.clone();
            tokio::spawn(async move {
                let mut handles = Vec::new();
                for n in 0..16u64 {
                    let handle = service
                        .run_async(
                            move |_| async move {
                                tokio::task::yield_now().await;
                                Ok::<_, OperationError>(task * 16 + n)
                            },
                            true,
                        )
                        .unwrap();
                    handles.push(handle);
                    if n % 4 == 0 {
                        service.update().unwrap();
                    }
                    tokio::task::yield_now().await;
                }
                handles
            })
        })
        .collect();

    for _ in 0..16 {
        service.update().unwrap();
        tokio::task::yield_now().await;
    }

    let mut handles = Vec::new();
    for producer in producers {
        handles.extend(producer.await.unwrap());
    }
    assert_eq!(handles.len(), 128);

    for handle in &handles {
        tokio::time::timeout(LIMIT, handle.wait()).await.unwrap();
    }
    service.update().unwrap();

    assert_eq!(service.live_count(), 0);
    assert!(handles.iter().all(|h| h.phase() == Phase::Completed));
    let mut values: Vec<u64> = handles.iter().filter_map(|h| h.result()).map(|v| *v).collect();
    values.sort_unstable();
    assert_eq!(values, (0..128u64).collect::<Vec<_>>());
}
