//! Lifecycle notifications carried by the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type tags emitted by the engine.
pub mod event_types {
    pub const WIZARD_INITIALIZED: &str = "wizard:initialized";
    pub const WIZARD_LOADED: &str = "wizard:loaded";
    pub const WIZARD_MIGRATED: &str = "wizard:migrated";
    pub const WIZARD_SAVED: &str = "wizard:saved";
    pub const WIZARD_STEP: &str = "wizard:step";
    pub const WIZARD_COMPLETED: &str = "wizard:completed";
    pub const TASK_QUEUED: &str = "task:queued";
    pub const TASK_UPDATED: &str = "task:updated";
    pub const TASK_DONE: &str = "task:done";
    pub const TASK_FAILED: &str = "task:failed";
}

/// A transient lifecycle notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier
    pub id: Uuid,
    /// Event type (e.g., "wizard:saved", "task:done")
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload
    pub payload: serde_json::Value,
    /// Timestamp when the event occurred
    pub ts: DateTime<Utc>,
}

impl Event {
    /// Create a new event with the given type and payload.
    pub fn new<T: Serialize>(event_type: impl Into<String>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
            ts: Utc::now(),
        }
    }

    /// Check if the event matches a subscription pattern.
    ///
    /// `*` matches everything, `prefix:*` matches a namespace.
    pub fn matches(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix(":*") {
            return self
                .event_type
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with(':'));
        }
        self.event_type == pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = Event::new(event_types::WIZARD_SAVED, serde_json::json!({"key": "value"}));

        assert!(!event.id.is_nil());
        assert_eq!(event.event_type, "wizard:saved");
        assert!(event.payload.get("key").is_some());
    }

    #[test]
    fn test_event_matches() {
        let event = Event::new("wizard:step", serde_json::json!({}));

        assert!(event.matches("*"));
        assert!(event.matches("wizard:step"));
        assert!(event.matches("wizard:*"));
        assert!(!event.matches("task:*"));
        assert!(!event.matches("wiz:*"));
        assert!(!event.matches("wizard:saved"));
    }

    #[test]
    fn test_event_serializes_type_tag() {
        let event = Event::new("task:done", serde_json::json!({"id": "t1"}));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "task:done");
        assert_eq!(value["payload"]["id"], "t1");
    }
}
