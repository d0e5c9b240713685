//! Read-only progress projection of an order.

use serde::{Deserialize, Serialize};

use super::Order;
use crate::core::{Artifact, OrderId, StageId, StageState, UserRef};
use crate::graph::StageGraph;
use crate::store::Transaction;

/// One stage of an order with its nested children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    /// The stage id.
    pub stage_id: StageId,
    /// The stage name.
    pub name: String,
    /// Pending or completed.
    pub state: StageState,
    /// The responsible user.
    pub assignee: Option<UserRef>,
    /// Last comment.
    pub comment: Option<String>,
    /// Files attached at this stage.
    pub artifacts: Vec<Artifact>,
    /// Fan-out children.
    pub children: Vec<StageProgress>,
}

impl StageProgress {
    /// Finds a stage in this subtree.
    #[must_use]
    pub fn find(&self, id: StageId) -> Option<&StageProgress> {
        if self.stage_id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

/// Snapshot of an order's stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProgress {
    /// The order id.
    pub order_id: OrderId,
    /// The order's KKS.
    pub kks: String,
    /// True once every stage is complete.
    pub completed: bool,
    /// The first top-level stage that is still pending.
    pub current_stage: Option<StageId>,
    /// Top-level stages in ordinal order.
    pub stages: Vec<StageProgress>,
}

impl OrderProgress {
    /// Builds the projection from the records in `tx`.
    #[must_use]
    pub fn build(graph: &StageGraph, tx: &Transaction, order: &Order) -> Self {
        let stages: Vec<StageProgress> = graph
            .roots()
            .filter_map(|def| stage_progress(graph, tx, order.id, def.id))
            .collect();

        Self {
            order_id: order.id,
            kks: order.kks.clone(),
            completed: tx.instances_of(order.id).all(|i| i.completed),
            current_stage: current_stage(graph, tx, order.id),
            stages,
        }
    }

    /// Finds a stage at any depth.
    #[must_use]
    pub fn stage(&self, id: StageId) -> Option<&StageProgress> {
        self.stages.iter().find_map(|s| s.find(id))
    }
}

/// Returns the first top-level stage of `order` that is not complete.
pub(crate) fn current_stage(graph: &StageGraph, tx: &Transaction, order: OrderId) -> Option<StageId> {
    graph
        .roots()
        .map(|def| def.id)
        .find(|id| tx.instance(order, *id).is_some_and(|i| !i.completed))
}

fn stage_progress(
    graph: &StageGraph,
    tx: &Transaction,
    order: OrderId,
    stage: StageId,
) -> Option<StageProgress> {
    let instance = tx.instance(order, stage)?;

    Some(StageProgress {
        stage_id: stage,
        name: graph.name_of(stage),
        state: instance.state(),
        assignee: instance.assignee.clone(),
        comment: instance.comment.clone(),
        artifacts: tx.artifacts_at(order, stage).cloned().collect(),
        children: graph
            .children(stage)
            .iter()
            .filter_map(|child| stage_progress(graph, tx, order, *child))
            .collect(),
    })
}
