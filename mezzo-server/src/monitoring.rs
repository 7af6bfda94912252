//! Runtime metrics aggregation
//!
//! Consumes queue settlement events off the event bus and counts
//! finder/resource activity, serving it all as a JSON snapshot on the
//! metrics endpoint. Purely observational: nothing here feeds back
//! into scheduling.

use mezzo_common::events::{EventBus, MezzoEvent};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;

/// Which tier ultimately satisfied a finder lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceTier {
    /// Fast cache hit
    Cache,
    /// Durable store hit
    Database,
    /// Resolved through upstream providers
    Upstream,
    /// Lookup failed or found nothing
    Miss,
}

impl ResourceTier {
    fn as_str(&self) -> &'static str {
        match self {
            ResourceTier::Cache => "cache",
            ResourceTier::Database => "database",
            ResourceTier::Upstream => "upstream",
            ResourceTier::Miss => "miss",
        }
    }
}

/// Aggregated stats for one queue source.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStats {
    pub count: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    pub max_duration_ms: u64,
}

#[derive(Default)]
struct Counters {
    tasks: HashMap<String, TaskStats>,
    /// Find requests per entity kind
    finders: HashMap<String, u64>,
    /// Lookups per (entity kind, tier)
    resources: HashMap<String, u64>,
}

/// Metrics collector handle.
#[derive(Clone, Default)]
pub struct Monitoring {
    counters: Arc<Mutex<Counters>>,
}

/// JSON document served by the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub tasks: HashMap<String, TaskStats>,
    pub finders: HashMap<String, u64>,
    pub resources: HashMap<String, u64>,
}

impl Monitoring {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume settlement events from the bus until it closes.
    pub fn start(&self, bus: &EventBus) {
        let counters = Arc::clone(&self.counters);
        let mut rx = bus.subscribe();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(MezzoEvent::TaskSettled {
                        source,
                        duration_ms,
                        ok,
                        ..
                    }) => {
                        let mut counters =
                            counters.lock().unwrap_or_else(PoisonError::into_inner);
                        let stats = counters.tasks.entry(source).or_default();
                        stats.count += 1;
                        if !ok {
                            stats.failures += 1;
                        }
                        stats.total_duration_ms += duration_ms;
                        stats.max_duration_ms = stats.max_duration_ms.max(duration_ms);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Metrics receiver lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// Count a find request for an entity kind.
    pub fn record_finder(&self, entity: &str, count: u64) {
        *self.lock().finders.entry(entity.to_string()).or_default() += count;
    }

    /// Count which tier satisfied one lookup.
    pub fn record_resource(&self, entity: &str, tier: ResourceTier) {
        *self
            .lock()
            .resources
            .entry(format!("{}:{}", entity, tier.as_str()))
            .or_default() += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.lock();
        MetricsSnapshot {
            tasks: counters.tasks.clone(),
            finders: counters.finders.clone(),
            resources: counters.resources.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settlement_events_aggregate() {
        let bus = EventBus::new(16);
        let monitoring = Monitoring::new();
        monitoring.start(&bus);

        for (duration, ok) in [(10, true), (30, false), (20, true)] {
            bus.emit_lossy(MezzoEvent::TaskSettled {
                source: "spotify".to_string(),
                duration_ms: duration,
                ok,
                timestamp: chrono::Utc::now(),
            });
        }

        // Let the collector task drain the bus.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let snapshot = monitoring.snapshot();
        let stats = &snapshot.tasks["spotify"];
        assert_eq!(stats.count, 3);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.total_duration_ms, 60);
        assert_eq!(stats.max_duration_ms, 30);
    }

    #[test]
    fn finder_and_resource_counters() {
        let monitoring = Monitoring::new();
        monitoring.record_finder("artists", 3);
        monitoring.record_finder("artists", 2);
        monitoring.record_resource("artists", ResourceTier::Cache);
        monitoring.record_resource("artists", ResourceTier::Upstream);
        monitoring.record_resource("artists", ResourceTier::Cache);

        let snapshot = monitoring.snapshot();
        assert_eq!(snapshot.finders["artists"], 5);
        assert_eq!(snapshot.resources["artists:cache"], 2);
        assert_eq!(snapshot.resources["artists:upstream"], 1);
    }
}
