//! Event types and EventBus for DataMap progress streaming
//!
//! Extraction/load and transmission runs execute in background tasks and
//! report progress through the bus; the SSE endpoints subscribe and forward
//! events for one repository at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// DataMap progress events
///
/// Per-batch progress events carry cumulative counters; completion and
/// failure events terminate the stream for their run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DataMapEvent {
    /// A load run inserted another batch into the canonical table
    LoadProgress {
        repository: String,
        count_inserted: usize,
        timestamp: DateTime<Utc>,
    },

    /// A load run finished; the canonical table has been swapped in
    LoadCompleted {
        repository: String,
        total_rows: usize,
        timestamp: DateTime<Utc>,
    },

    /// A load run aborted; the previous canonical table is untouched
    LoadFailed {
        repository: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A transmission run posted another batch to the staging aggregator
    SendProgress {
        repository: String,
        manifest_id: Uuid,
        batch_no: usize,
        total_batches: usize,
        progress_percent: u8,
        timestamp: DateTime<Utc>,
    },

    /// A transmission run sent every batch of its manifest
    SendCompleted {
        repository: String,
        manifest_id: Uuid,
        total_batches: usize,
        timestamp: DateTime<Utc>,
    },

    /// A transmission run aborted mid-manifest; no batch retry occurs
    SendFailed {
        repository: String,
        manifest_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DataMapEvent {
    /// Event type name used as the SSE event field
    pub fn event_type(&self) -> &'static str {
        match self {
            DataMapEvent::LoadProgress { .. } => "LoadProgress",
            DataMapEvent::LoadCompleted { .. } => "LoadCompleted",
            DataMapEvent::LoadFailed { .. } => "LoadFailed",
            DataMapEvent::SendProgress { .. } => "SendProgress",
            DataMapEvent::SendCompleted { .. } => "SendCompleted",
            DataMapEvent::SendFailed { .. } => "SendFailed",
        }
    }

    /// Repository (canonical table) this event belongs to
    pub fn repository(&self) -> &str {
        match self {
            DataMapEvent::LoadProgress { repository, .. }
            | DataMapEvent::LoadCompleted { repository, .. }
            | DataMapEvent::LoadFailed { repository, .. }
            | DataMapEvent::SendProgress { repository, .. }
            | DataMapEvent::SendCompleted { repository, .. }
            | DataMapEvent::SendFailed { repository, .. } => repository,
        }
    }

    /// True for events that close a run's progress stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DataMapEvent::LoadCompleted { .. }
                | DataMapEvent::LoadFailed { .. }
                | DataMapEvent::SendCompleted { .. }
                | DataMapEvent::SendFailed { .. }
        )
    }
}

/// Central event distribution bus
///
/// Wraps tokio::broadcast, providing non-blocking publish, multiple
/// concurrent subscribers, and automatic cleanup when subscribers drop.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DataMapEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DataMapEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the subscriber count, or `Err` when nobody is listening —
    /// which is fine for progress events and logged at debug level by
    /// callers.
    pub fn emit(
        &self,
        event: DataMapEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<DataMapEvent>> {
        self.tx.send(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_reaches_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(DataMapEvent::LoadProgress {
            repository: "lab".to_string(),
            count_inserted: 300,
            timestamp: Utc::now(),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "LoadProgress");
        assert_eq!(event.repository(), "lab");
        assert!(!event.is_terminal());
    }

    #[test]
    fn terminal_classification() {
        let now = Utc::now();
        let done = DataMapEvent::SendCompleted {
            repository: "lab".to_string(),
            manifest_id: Uuid::new_v4(),
            total_batches: 3,
            timestamp: now,
        };
        assert!(done.is_terminal());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = DataMapEvent::SendProgress {
            repository: "enrolments".to_string(),
            manifest_id: Uuid::new_v4(),
            batch_no: 1,
            total_batches: 3,
            progress_percent: 67,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SendProgress");
        assert_eq!(json["progress_percent"], 67);
    }
}
