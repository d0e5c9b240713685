//! Stage instances of one order seen as a gated forest.

use crate::core::{OrderId, StageId};
use crate::forest::GatedForest;
use crate::store::Transaction;

/// Completing every child of a stage completes the stage.
pub(crate) struct StageForest<'a> {
    tx: &'a mut Transaction,
    order: OrderId,
}

impl<'a> StageForest<'a> {
    pub(crate) fn new(tx: &'a mut Transaction, order: OrderId) -> Self {
        Self { tx, order }
    }
}

impl GatedForest for StageForest<'_> {
    type Node = StageId;

    fn parent(&self, node: StageId) -> Option<StageId> {
        self.tx.instance(self.order, node).and_then(|i| i.parent)
    }

    fn children(&self, node: StageId) -> Vec<StageId> {
        self.tx
            .instances_of(self.order)
            .filter(|i| i.parent == Some(node))
            .map(|i| i.stage_id)
            .collect()
    }

    fn is_complete(&self, node: StageId) -> bool {
        self.tx
            .instance(self.order, node)
            .is_some_and(|i| i.completed)
    }

    fn unlock(&mut self, node: StageId) -> bool {
        if self.is_complete(node) {
            return false;
        }
        match self.tx.instance_mut(self.order, node) {
            Some(instance) => {
                instance.completed = true;
                true
            }
            None => false,
        }
    }
}
