//! Order and stage instance records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{OrderId, StageId, StageState, UserId, UserRef};

/// An order, identified externally by its KKS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Store-assigned id.
    pub id: OrderId,
    /// The external business key.
    pub kks: String,
    /// When the order was created.
    pub created_at: DateTime<Utc>,
}

/// The per-order record of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageInstance {
    /// The owning order.
    pub order_id: OrderId,
    /// The stage this instance tracks.
    pub stage_id: StageId,
    /// Completion flag.
    pub completed: bool,
    /// The user responsible for the stage.
    pub assignee: Option<UserRef>,
    /// Free-text comment left by the last actor.
    pub comment: Option<String>,
    /// The parent stage, copied from the graph.
    pub parent: Option<StageId>,
}

impl StageInstance {
    /// Creates a pending instance.
    #[must_use]
    pub fn new(order_id: OrderId, stage_id: StageId) -> Self {
        Self {
            order_id,
            stage_id,
            completed: false,
            assignee: None,
            comment: None,
            parent: None,
        }
    }

    /// Returns the stage state.
    #[must_use]
    pub fn state(&self) -> StageState {
        StageState::from_completed(self.completed)
    }

    /// Returns true if `user` is the assignee.
    #[must_use]
    pub fn is_assigned_to(&self, user: &UserId) -> bool {
        self.assignee.as_ref().is_some_and(|a| &a.id == user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_defaults_to_pending() {
        let instance = StageInstance::new(OrderId(1), StageId(2));
        assert_eq!(instance.state(), StageState::Pending);
        assert!(!instance.is_assigned_to(&UserId::new("anyone")));
    }

    #[test]
    fn test_is_assigned_to() {
        let mut instance = StageInstance::new(OrderId(1), StageId(2));
        instance.assignee = Some(UserRef::new("tech", "Tina Tech"));

        assert!(instance.is_assigned_to(&UserId::new("tech")));
        assert!(!instance.is_assigned_to(&UserId::new("other")));
    }
}
