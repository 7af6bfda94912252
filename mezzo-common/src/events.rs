//! Event types for the mezzo event system
//!
//! Provides the shared event enum and the EventBus used to fan events
//! out to whatever is listening (metrics aggregation, tests). Emission
//! is fire-and-forget: producers never depend on a subscriber being
//! present.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// mezzo event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MezzoEvent {
    /// A queued task finished running (successfully or not).
    ///
    /// Duration is measured from admission to settlement, not from
    /// submission - time spent waiting in the pending queue is not
    /// included.
    TaskSettled {
        /// Queue source the task was tagged with
        source: String,
        /// Admission-to-settlement duration in milliseconds
        duration_ms: u64,
        /// Whether the task's runnable returned Ok
        ok: bool,
        /// When the task settled
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast bus for [`MezzoEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MezzoEvent>,
}

impl EventBus {
    /// Create a new bus buffering up to `capacity` events per receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<MezzoEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the case where nobody is listening.
    pub fn emit_lossy(&self, event: MezzoEvent) {
        let _ = self.tx.send(event);
    }
}
