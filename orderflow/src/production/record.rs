//! Component and production task records.

use serde::{Deserialize, Serialize};

use crate::core::{AreaId, ComponentId, OrderId, TaskId, TaskStatus, UserId};

/// A node of an order's component tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Store-assigned id.
    pub id: ComponentId,
    /// The order that created the component.
    pub order_id: OrderId,
    /// Drawing designation.
    pub designation: String,
    /// Units required per parent assembly.
    pub count: u32,
    /// Total units to produce.
    pub amount: u32,
    /// Set once the component's whole task chain is done.
    pub developed: bool,
    /// The assembly this component belongs to.
    pub parent: Option<ComponentId>,
}

/// One step of a component's production chain, bound to a shop-floor area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionTask {
    /// Store-assigned id.
    pub id: TaskId,
    /// The component this task produces.
    pub component_id: ComponentId,
    /// The area where the work happens.
    pub area_id: AreaId,
    /// Current status.
    pub status: TaskStatus,
    /// Who claimed the task.
    pub assignee: Option<UserId>,
    /// Whether the task can be worked on.
    pub available: bool,
    /// The previous task in the chain.
    pub parent_task: Option<TaskId>,
    /// The next task in the chain.
    pub child_task: Option<TaskId>,
}

impl ProductionTask {
    /// Returns true if the chain starts at this task.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_task.is_none()
    }
}
