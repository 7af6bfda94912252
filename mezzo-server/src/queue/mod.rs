//! Per-source rate-limited task queue
//!
//! Every outbound provider call goes through the [`QueueController`].
//! Work is submitted tagged with a [`Source`], waits in that source's
//! FIFO queue, and is admitted once the source has a free slot within
//! its configured budget. Admission happens on a one-second interval
//! tick, eagerly when new work arrives, and eagerly when a running
//! task settles and frees a slot.
//!
//! The caller gets a future that resolves with the task's own outcome
//! exactly once. The controller never retries, reorders or times out
//! tasks; a runnable that never settles holds its slot forever.

mod source;

pub use source::Source;

use futures::future::BoxFuture;
use futures::FutureExt;
use mezzo_common::events::{EventBus, MezzoEvent};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Wall-clock period of the periodic admission tick.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Errors introduced by the queue itself. Runnable failures are not
/// wrapped; they propagate verbatim through the caller's error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The task was dropped before it could settle (its runnable
    /// panicked, or the controller went away mid-flight).
    #[error("queued task was dropped before settling")]
    TaskDropped,
}

/// A unit of work waiting for admission. The closure owns the
/// caller's settlement channel; invoking it consumes the task.
struct Task {
    id: Uuid,
    run: Box<dyn FnOnce() -> BoxFuture<'static, bool> + Send>,
}

/// Pending and running work for one source.
struct SourceQueue {
    budget: u32,
    pending: VecDeque<Task>,
    running: HashSet<Uuid>,
}

impl SourceQueue {
    fn new(budget: u32) -> Self {
        Self {
            budget,
            pending: VecDeque::new(),
            running: HashSet::new(),
        }
    }

    /// How many more tasks may run right now.
    fn admittable(&self) -> usize {
        (self.budget as usize).saturating_sub(self.running.len())
    }
}

/// Per-source queue depth snapshot, served by the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct QueueDepth {
    pub source: Source,
    pub budget: u32,
    pub pending: usize,
    pub running: usize,
}

struct Inner {
    queues: HashMap<Source, Mutex<SourceQueue>>,
    events: EventBus,
}

impl Inner {
    fn queue(&self, source: Source) -> MutexGuard<'_, SourceQueue> {
        // Every Source variant is registered at construction, and a
        // poisoned lock cannot leave the two-collection state torn:
        // each mutation is a single push/insert/remove.
        self.queues[&source]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit as many pending tasks for `source` as the budget allows,
    /// in FIFO order, and start them.
    fn tick_source(inner: &Arc<Inner>, source: Source) {
        let admitted = {
            let mut queue = inner.queue(source);
            let admittable = queue.admittable();
            let mut admitted = Vec::new();
            for _ in 0..admittable {
                match queue.pending.pop_front() {
                    Some(task) => {
                        queue.running.insert(task.id);
                        admitted.push(task);
                    }
                    None => break,
                }
            }
            if !queue.pending.is_empty() {
                tracing::debug!(
                    source = %source,
                    running = queue.running.len(),
                    pending = queue.pending.len(),
                    "Queue backlog"
                );
            }
            admitted
        };

        for task in admitted {
            Inner::run(inner, source, task);
        }
    }

    /// Start an admitted task. The slot is released when the task
    /// settles, whatever the outcome.
    fn run(inner: &Arc<Inner>, source: Source, task: Task) {
        tracing::debug!(source = %source, id = %task.id, "Running task");

        let fut = (task.run)();
        let mut slot = RunningSlot {
            inner: Arc::clone(inner),
            source,
            id: task.id,
            started: Instant::now(),
            ok: false,
        };

        tokio::spawn(async move {
            // Slot release lives in RunningSlot::drop so it happens
            // even if the runnable panics.
            slot.ok = fut.await;
        });
    }
}

/// Releases a running slot when dropped, emits the settlement event,
/// and re-ticks the source so a freed slot is refilled without
/// waiting for the next interval.
struct RunningSlot {
    inner: Arc<Inner>,
    source: Source,
    id: Uuid,
    started: Instant,
    ok: bool,
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        {
            let mut queue = self.inner.queue(self.source);
            queue.running.remove(&self.id);
        }

        self.inner.events.emit_lossy(MezzoEvent::TaskSettled {
            source: self.source.to_string(),
            duration_ms: self.started.elapsed().as_millis() as u64,
            ok: self.ok,
            timestamp: chrono::Utc::now(),
        });

        Inner::tick_source(&self.inner, self.source);
    }
}

/// Admission control and dispatch of tagged asynchronous work under
/// independent per-source budgets.
#[derive(Clone)]
pub struct QueueController {
    inner: Arc<Inner>,
}

impl QueueController {
    /// Build a controller from per-source budgets keyed by source
    /// name. Unknown names are ignored with a warning; every known
    /// source must have a budget or construction fails. An explicit
    /// budget of 0 is accepted and permanently stalls that source.
    pub fn new(
        budgets: &HashMap<String, u32>,
        events: EventBus,
    ) -> mezzo_common::Result<Self> {
        for key in budgets.keys() {
            if !Source::ALL.iter().any(|s| s.as_str() == key) {
                tracing::warn!(source = %key, "Ignoring budget for unknown queue source");
            }
        }

        let mut queues = HashMap::new();
        for source in Source::ALL {
            let budget = *budgets.get(source.as_str()).ok_or_else(|| {
                mezzo_common::Error::Config(format!(
                    "Missing queue budget for source '{}'",
                    source
                ))
            })?;
            tracing::info!(source = %source, budget, "Queue source registered");
            queues.insert(source, Mutex::new(SourceQueue::new(budget)));
        }

        Ok(Self {
            inner: Arc::new(Inner { queues, events }),
        })
    }

    /// Spawn the periodic admission tick. Eager ticking on submit and
    /// on slot release does the heavy lifting; the interval is the
    /// safety net that keeps a source draining even if every eager
    /// path raced.
    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                for source in Source::ALL {
                    Inner::tick_source(&inner, source);
                }
            }
        });
    }

    /// Submit work for `source` and await its outcome.
    ///
    /// Returns immediately-pending work to the back of the source's
    /// FIFO queue and resolves exactly once with the runnable's own
    /// result. Queue-level failures surface as [`QueueError`]
    /// converted into the caller's error type. The pending queue is
    /// unbounded: a burst against a low-budget source accumulates
    /// latency, never rejections.
    pub async fn submit<T, E, F, Fut>(&self, source: Source, runnable: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<QueueError> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T, E>>();

        let run: Box<dyn FnOnce() -> BoxFuture<'static, bool> + Send> = Box::new(move || {
            async move {
                let result = runnable().await;
                let ok = result.is_ok();
                // The caller may have stopped waiting; the outcome is
                // then discarded, not retried.
                let _ = tx.send(result);
                ok
            }
            .boxed()
        });

        let task = Task {
            id: Uuid::new_v4(),
            run,
        };

        self.inner.queue(source).pending.push_back(task);
        // Eager admission: when the source has a free slot the task
        // starts without waiting for the interval tick.
        Inner::tick_source(&self.inner, source);

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(QueueError::TaskDropped.into()),
        }
    }

    /// Snapshot of all queue depths.
    pub fn depths(&self) -> Vec<QueueDepth> {
        Source::ALL
            .iter()
            .map(|&source| {
                let queue = self.inner.queue(source);
                QueueDepth {
                    source,
                    budget: queue.budget,
                    pending: queue.pending.len(),
                    running: queue.running.len(),
                }
            })
            .collect()
    }

    /// Number of currently running tasks for a source.
    pub fn running(&self, source: Source) -> usize {
        self.inner.queue(source).running.len()
    }

    /// Number of tasks waiting for admission for a source.
    pub fn pending(&self, source: Source) -> usize {
        self.inner.queue(source).pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq, Eq)]
    enum TestError {
        Queue(QueueError),
        Boom(&'static str),
    }

    impl From<QueueError> for TestError {
        fn from(e: QueueError) -> Self {
            TestError::Queue(e)
        }
    }

    fn budgets(entries: &[(&str, u32)]) -> HashMap<String, u32> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    fn all_budgets(n: u32) -> HashMap<String, u32> {
        budgets(&[("spotify", n), ("deezer", n), ("lastfm", n), ("palette", n)])
    }

    fn controller(budgets: HashMap<String, u32>) -> QueueController {
        QueueController::new(&budgets, EventBus::new(64)).unwrap()
    }

    #[test]
    fn missing_budget_fails_construction() {
        let result = QueueController::new(
            &budgets(&[("spotify", 5), ("deezer", 5), ("lastfm", 5)]),
            EventBus::new(8),
        );
        match result {
            Err(mezzo_common::Error::Config(msg)) => assert!(msg.contains("palette")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn unknown_budget_key_is_ignored() {
        let mut map = all_budgets(1);
        map.insert("genius".to_string(), 99);
        assert!(QueueController::new(&map, EventBus::new(8)).is_ok());
    }

    #[test]
    fn admittable_never_underflows() {
        let mut queue = SourceQueue::new(2);
        queue.running.insert(Uuid::new_v4());
        queue.running.insert(Uuid::new_v4());
        queue.running.insert(Uuid::new_v4());
        // Budget lowered below the running count must not panic.
        assert_eq!(queue.admittable(), 0);
    }

    #[tokio::test]
    async fn task_result_propagates() {
        let queue = controller(all_budgets(2));
        let value: Result<u32, TestError> = queue
            .submit(Source::Spotify, || async { Ok(41 + 1) })
            .await;
        assert_eq!(value.unwrap(), 42);
    }

    #[tokio::test]
    async fn task_error_propagates_verbatim() {
        let queue = controller(all_budgets(2));
        let value: Result<u32, TestError> = queue
            .submit(Source::Deezer, || async { Err(TestError::Boom("nope")) })
            .await;
        assert_eq!(value.unwrap_err(), TestError::Boom("nope"));
        assert_eq!(queue.running(Source::Deezer), 0);
    }

    #[tokio::test]
    async fn failed_task_frees_its_slot() {
        let queue = controller(all_budgets(1));

        let failed: Result<u32, TestError> = queue
            .submit(Source::LastFM, || async { Err(TestError::Boom("first")) })
            .await;
        assert!(failed.is_err());

        // The freed slot must admit the next task without an interval
        // tick ever running.
        let ok: Result<u32, TestError> = queue
            .submit(Source::LastFM, || async { Ok(7) })
            .await;
        assert_eq!(ok.unwrap(), 7);
    }

    #[tokio::test]
    async fn panicking_task_settles_caller_and_frees_slot() {
        let queue = controller(all_budgets(1));

        let result: Result<u32, TestError> = queue
            .submit(Source::Palette, || async { panic!("boom") })
            .await;
        assert_eq!(result.unwrap_err(), TestError::Queue(QueueError::TaskDropped));
        assert_eq!(queue.running(Source::Palette), 0);

        let ok: Result<u32, TestError> = queue
            .submit(Source::Palette, || async { Ok(1) })
            .await;
        assert_eq!(ok.unwrap(), 1);
    }

    #[tokio::test]
    async fn budget_caps_concurrency() {
        let queue = controller(all_budgets(2));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let result: Result<(), TestError> = queue
                    .submit(Source::Spotify, move || async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await;
                result.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(
            peak.load(Ordering::SeqCst) <= 2,
            "budget exceeded: peak {}",
            peak.load(Ordering::SeqCst)
        );
        assert_eq!(queue.running(Source::Spotify), 0);
        assert_eq!(queue.pending(Source::Spotify), 0);
    }

    #[tokio::test]
    async fn fifo_admission_within_a_source() {
        // Budget 1 serializes execution, so completion order equals
        // admission order.
        let queue = controller(all_budgets(1));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4u32 {
            let queue = queue.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let result: Result<(), TestError> = queue
                    .submit(Source::Deezer, move || async move {
                        order.lock().unwrap().push(i);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok(())
                    })
                    .await;
                result.unwrap();
            }));
            // Force distinct submission order.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn zero_budget_source_never_admits() {
        let mut map = all_budgets(1);
        map.insert("palette".to_string(), 0);
        let queue = controller(map);

        let submitted = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let _: Result<(), TestError> = queue
                    .submit(Source::Palette, || async { Ok(()) })
                    .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.pending(Source::Palette), 1);
        assert_eq!(queue.running(Source::Palette), 0);

        submitted.abort();
    }

    #[tokio::test]
    async fn depths_reflect_backlog() {
        let queue = controller(all_budgets(1));

        let blocked: tokio::task::JoinHandle<()> = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let _: Result<(), TestError> = queue
                    .submit(Source::Spotify, || async {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok(())
                    })
                    .await;
            })
        };
        let queued: tokio::task::JoinHandle<()> = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let _: Result<(), TestError> = queue
                    .submit(Source::Spotify, || async { Ok(()) })
                    .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;

        let depths = queue.depths();
        let spotify = depths
            .iter()
            .find(|d| d.source == Source::Spotify)
            .unwrap();
        assert_eq!(spotify.running, 1);
        assert_eq!(spotify.pending, 1);

        blocked.await.unwrap();
        queued.await.unwrap();
    }
}
