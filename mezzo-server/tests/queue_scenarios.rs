//! Queue controller scenarios
//!
//! End-to-end behavior of the per-source task queue: budget
//! enforcement under load, FIFO draining across refills, failure
//! propagation and source independence. Timing assertions use wide
//! margins so scheduler jitter cannot flake them.

use mezzo_common::events::{EventBus, MezzoEvent};
use mezzo_server::queue::{QueueController, QueueError, Source};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, PartialEq, Eq)]
enum TaskError {
    Queue(QueueError),
    Provider(String),
}

impl From<QueueError> for TaskError {
    fn from(e: QueueError) -> Self {
        TaskError::Queue(e)
    }
}

fn budgets(entries: &[(&str, u32)]) -> HashMap<String, u32> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn controller(entries: &[(&str, u32)]) -> QueueController {
    QueueController::new(&budgets(entries), EventBus::new(64)).unwrap()
}

/// Budget 2, three 100 ms tasks: two run immediately, the third only
/// after a slot frees, and every future resolves with its own value.
#[tokio::test]
async fn saturated_source_staggers_third_task() {
    let queue = controller(&[("spotify", 2), ("deezer", 1), ("lastfm", 1), ("palette", 1)]);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();

    let mut handles = Vec::new();
    for value in [1u32, 2, 3] {
        let queue = queue.clone();
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            let result: Result<(u32, Duration), TaskError> = queue
                .submit(Source::Spotify, move || async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok((value, started.elapsed()))
                })
                .await;
            result.unwrap()
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    // All three resolved with their own values.
    let mut values: Vec<u32> = results.iter().map(|(value, _)| *value).collect();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2, 3]);

    // Never more than two in flight.
    assert!(peak.load(Ordering::SeqCst) <= 2);

    // The third task could only finish after a first-wave task freed
    // its slot: total wall clock spans two waves.
    let slowest = results.iter().map(|(_, elapsed)| *elapsed).max().unwrap();
    assert!(
        slowest >= Duration::from_millis(180),
        "third task finished too early: {:?}",
        slowest
    );

    assert_eq!(queue.running(Source::Spotify), 0);
    assert_eq!(queue.pending(Source::Spotify), 0);
}

/// A failing runnable rejects the caller's future with the same error
/// and leaves the running set empty.
#[tokio::test]
async fn failure_propagates_and_clears_running_set() {
    let queue = controller(&[("spotify", 1), ("deezer", 1), ("lastfm", 1), ("palette", 1)]);

    let result: Result<u32, TaskError> = queue
        .submit(Source::Deezer, || async {
            Err(TaskError::Provider("quota exceeded".to_string()))
        })
        .await;

    assert_eq!(
        result.unwrap_err(),
        TaskError::Provider("quota exceeded".to_string())
    );
    assert_eq!(queue.running(Source::Deezer), 0);
}

/// Two tasks submitted back-to-back to a budget-1 source run in
/// submission order.
#[tokio::test]
async fn submission_order_is_admission_order() {
    let queue = controller(&[("spotify", 1), ("deezer", 1), ("lastfm", 1), ("palette", 1)]);
    let invocations = Arc::new(Mutex::new(Vec::new()));

    let first = {
        let queue = queue.clone();
        let invocations = Arc::clone(&invocations);
        tokio::spawn(async move {
            let result: Result<(), TaskError> = queue
                .submit(Source::LastFM, move || async move {
                    invocations.lock().unwrap().push("x");
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(())
                })
                .await;
            result.unwrap();
        })
    };
    // Make sure the first submit lands before the second.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = {
        let queue = queue.clone();
        let invocations = Arc::clone(&invocations);
        tokio::spawn(async move {
            let result: Result<(), TaskError> = queue
                .submit(Source::LastFM, move || async move {
                    invocations.lock().unwrap().push("y");
                    Ok(())
                })
                .await;
            result.unwrap();
        })
    };

    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(*invocations.lock().unwrap(), vec!["x", "y"]);
}

/// FIFO order survives multiple refill waves: five tasks through a
/// budget-2 source complete in submission order because each runs for
/// the same duration.
#[tokio::test]
async fn fifo_order_across_refills() {
    let queue = controller(&[("spotify", 2), ("deezer", 1), ("lastfm", 1), ("palette", 1)]);
    let invocations = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..5u32 {
        let queue = queue.clone();
        let invocations = Arc::clone(&invocations);
        handles.push(tokio::spawn(async move {
            let result: Result<(), TaskError> = queue
                .submit(Source::Spotify, move || async move {
                    invocations.lock().unwrap().push(i);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(())
                })
                .await;
            result.unwrap();
        }));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*invocations.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

/// A slot-hogging task on one source must not delay another source.
#[tokio::test]
async fn sources_are_independent() {
    let queue = controller(&[("spotify", 1), ("deezer", 1), ("lastfm", 1), ("palette", 1)]);

    // Occupy spotify's only slot for a long time.
    let slow = {
        let queue = queue.clone();
        tokio::spawn(async move {
            let _: Result<(), TaskError> = queue
                .submit(Source::Spotify, || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
                .await;
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    let fast: Result<u32, TaskError> = queue
        .submit(Source::Deezer, || async { Ok(99) })
        .await;

    assert_eq!(fast.unwrap(), 99);
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "deezer task waited on the saturated spotify source"
    );

    slow.abort();
}

/// Settlement events carry the source tag and a sane duration for
/// both outcomes.
#[tokio::test]
async fn settlement_events_are_emitted() {
    let events = EventBus::new(64);
    let mut rx = events.subscribe();
    let queue = QueueController::new(
        &budgets(&[("spotify", 2), ("deezer", 2), ("lastfm", 2), ("palette", 2)]),
        events,
    )
    .unwrap();

    let ok: Result<(), TaskError> = queue
        .submit(Source::Palette, || async {
            tokio::time::sleep(Duration::from_millis(25)).await;
            Ok(())
        })
        .await;
    ok.unwrap();

    let failed: Result<(), TaskError> = queue
        .submit(Source::LastFM, || async {
            Err(TaskError::Provider("no".to_string()))
        })
        .await;
    assert!(failed.is_err());

    let first = rx.recv().await.unwrap();
    match first {
        MezzoEvent::TaskSettled {
            source,
            duration_ms,
            ok,
            ..
        } => {
            assert_eq!(source, "palette");
            assert!(ok);
            assert!(duration_ms >= 20);
        }
    }

    let second = rx.recv().await.unwrap();
    match second {
        MezzoEvent::TaskSettled { source, ok, .. } => {
            assert_eq!(source, "lastfm");
            assert!(!ok);
        }
    }
}

/// The interval tick alone also drains a queue: with `start()` running
/// and no eager path left (tasks enqueued while the budget was full),
/// pending work still completes.
#[tokio::test]
async fn interval_tick_drains_backlog() {
    let queue = controller(&[("spotify", 1), ("deezer", 1), ("lastfm", 1), ("palette", 1)]);
    queue.start();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let result: Result<(), TaskError> = queue
                .submit(Source::Palette, || async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(())
                })
                .await;
            result.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(queue.pending(Source::Palette), 0);
    assert_eq!(queue.running(Source::Palette), 0);
}
