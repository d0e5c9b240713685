//! Static stage definitions.

use crate::core::StageId;
use serde::{Deserialize, Serialize};

/// Definition of a single stage in the stage graph.
///
/// The id is the stage's ordinal: stages are ordered by id, and a child
/// stage always has a higher id than its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDef {
    /// The ordinal id.
    pub id: StageId,
    /// The unique stage name.
    pub name: String,
    /// The fan-out parent this stage gates, if any.
    #[serde(default)]
    pub parent: Option<StageId>,
    /// The role whose member is responsible for the stage.
    #[serde(default)]
    pub role: Option<String>,
    /// Whether the stage may exist without an assignee.
    #[serde(default)]
    pub optional: bool,
    /// Whether this is the gate stage that can reject the order.
    #[serde(default)]
    pub gate: bool,
}

impl StageDef {
    /// Creates a new stage definition.
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id: StageId(id),
            name: name.into(),
            parent: None,
            role: None,
            optional: false,
            gate: false,
        }
    }

    /// Sets the fan-out parent.
    #[must_use]
    pub fn with_parent(mut self, parent: u32) -> Self {
        self.parent = Some(StageId(parent));
        self
    }

    /// Sets the responsible role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Marks the stage as not requiring an assignee.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Marks the stage as the gate.
    #[must_use]
    pub fn gate(mut self) -> Self {
        self.gate = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_def_builder() {
        let def = StageDef::new(4, "SpecDev").with_parent(3).with_role("designer");

        assert_eq!(def.id, StageId(4));
        assert_eq!(def.parent, Some(StageId(3)));
        assert_eq!(def.role.as_deref(), Some("designer"));
        assert!(!def.optional);
        assert!(!def.gate);
    }

    #[test]
    fn test_stage_def_deserialize_defaults() {
        let def: StageDef = serde_json::from_str(r#"{"id": 7, "name": "Approval", "gate": true}"#).unwrap();

        assert_eq!(def.id, StageId(7));
        assert!(def.gate);
        assert!(def.parent.is_none());
        assert!(def.role.is_none());
    }
}
