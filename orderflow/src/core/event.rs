//! Workflow event type emitted on every state change.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Event type names.
pub mod kinds {
    /// An order and its stage instances were created.
    pub const ORDER_CREATED: &str = "order.created";
    /// An order was deleted together with its instances and artifacts.
    pub const ORDER_DELETED: &str = "order.deleted";
    /// A file was attached to a stage.
    pub const ARTIFACT_ATTACHED: &str = "artifact.attached";
    /// A leaf stage was completed by its assignee.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A fan-out parent stage was completed by propagation.
    pub const STAGE_PROPAGATED: &str = "stage.propagated";
    /// The gate stage approved the order.
    pub const GATE_APPROVED: &str = "gate.approved";
    /// The gate stage rejected the order and rolled it back.
    pub const GATE_REJECTED: &str = "gate.rejected";
    /// A task was claimed by its first assignee.
    pub const TASK_CLAIMED: &str = "task.claimed";
    /// A task changed status.
    pub const TASK_STATUS_CHANGED: &str = "task.status_changed";
    /// A task became available for work.
    pub const TASK_UNLOCKED: &str = "task.unlocked";
    /// A component finished its whole task chain.
    pub const COMPONENT_DEVELOPED: &str = "component.developed";
    /// A component tree was created for an order.
    pub const COMPONENTS_CREATED: &str = "components.created";
}

/// An event describing a committed state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// The event type (e.g., "stage.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl WorkflowEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            data: HashMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns the payload as a JSON object.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> =
            self.data.clone().into_iter().collect();
        serde_json::Value::Object(map)
    }
}
