//! Event types for the Pulsar event system
//!
//! Provides the UI-facing project snapshot and the EventBus that pushes it,
//! together with task and software registry notifications.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use uuid::Uuid;

/// One entry of a file's comment history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileComment {
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// File currently selected at the deepest level
///
/// Every field is omitted when no file is selected, so the unset state
/// serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectedFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<FileComment>>,
}

impl SelectedFile {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
    }
}

/// Flattened state of the active resolver, pushed to the UI after every
/// state-changing operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    /// Project name
    pub project: String,
    /// Active classification (`asset` or `shot`)
    pub classification: String,
    /// Active subtype (`scene`, `render`, `cache` or `texture`)
    pub subtype: String,
    /// Dimension of the active resolver (`2d` or `3d`)
    pub dimension: String,
    /// Level name -> selected value (`null` when unset)
    pub groups: BTreeMap<String, Option<String>>,
    /// Level name -> child listing, for every level that has one
    pub directories: BTreeMap<String, Vec<String>>,
    /// Level names in display order
    pub directories_order: Vec<String>,
    /// Selected file, `{}` when the file level is unset
    pub file: SelectedFile,
}

/// Connected authoring-software instance as seen by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftwareInfo {
    pub id: String,
    pub software: String,
    pub scene: Option<String>,
    pub saved: Option<bool>,
}

/// Pulsar event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PulsarEvent {
    /// Visible project state changed
    ///
    /// Triggers:
    /// - SSE: Re-render the navigation columns
    ProjectUpdated {
        snapshot: ProjectSnapshot,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Task request handed to the software bridge
    TaskDispatched {
        task_id: Uuid,
        /// Instance id, or `new` for a freshly launched instance
        target: String,
        software_type: String,
        command: String,
        file: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Task outcome reported by the bridge
    TaskFinished {
        task_id: Uuid,
        success: bool,
        message: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Connected software instances changed
    SoftwaresChanged {
        softwares: Vec<SoftwareInfo>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Settings were merged and rewritten
    SettingsChanged {
        keys: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PulsarEvent {
    /// Wrap a snapshot into a `ProjectUpdated` event stamped now
    pub fn project_updated(snapshot: ProjectSnapshot) -> Self {
        PulsarEvent::ProjectUpdated {
            snapshot,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Event type string, used as the SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            PulsarEvent::ProjectUpdated { .. } => "ProjectUpdated",
            PulsarEvent::TaskDispatched { .. } => "TaskDispatched",
            PulsarEvent::TaskFinished { .. } => "TaskFinished",
            PulsarEvent::SoftwaresChanged { .. } => "SoftwaresChanged",
            PulsarEvent::SettingsChanged { .. } => "SettingsChanged",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// The core only publishes; how a subscriber renders the snapshot is its own
/// business.
///
/// # Examples
///
/// ```
/// use pulsar_common::events::{EventBus, PulsarEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PulsarEvent::SettingsChanged {
///     keys: vec!["softwares".to_string()],
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PulsarEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PulsarEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PulsarEvent,
    ) -> Result<usize, broadcast::error::SendError<PulsarEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PulsarEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty_snapshot() -> ProjectSnapshot {
        ProjectSnapshot {
            project: "demo".to_string(),
            classification: "asset".to_string(),
            subtype: "scene".to_string(),
            dimension: "3d".to_string(),
            groups: BTreeMap::from([("asset".to_string(), None)]),
            directories: BTreeMap::from([("asset".to_string(), vec![])]),
            directories_order: vec!["asset".to_string()],
            file: SelectedFile::default(),
        }
    }

    #[test]
    fn test_unset_file_serializes_as_empty_object() {
        let value = serde_json::to_value(empty_snapshot()).unwrap();

        assert_eq!(value["file"], json!({}));
        assert_eq!(value["groups"]["asset"], json!(null));
        assert_eq!(value["directoriesOrder"], json!(["asset"]));
        assert_eq!(value["directories"]["asset"], json!([]));
    }

    #[test]
    fn test_event_tag_matches_event_type() {
        let event = PulsarEvent::project_updated(empty_snapshot());
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], event.event_type());
    }

    #[tokio::test]
    async fn test_event_bus_delivers_to_every_subscriber() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let delivered = bus.emit(PulsarEvent::project_updated(empty_snapshot())).unwrap();
        assert_eq!(delivered, 2);

        assert!(matches!(first.recv().await.unwrap(), PulsarEvent::ProjectUpdated { .. }));
        assert!(matches!(second.recv().await.unwrap(), PulsarEvent::ProjectUpdated { .. }));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        assert!(bus.emit(PulsarEvent::project_updated(empty_snapshot())).is_err());
        // lossy variant never fails
        bus.emit_lossy(PulsarEvent::project_updated(empty_snapshot()));
        assert_eq!(bus.capacity(), 4);
    }
}
