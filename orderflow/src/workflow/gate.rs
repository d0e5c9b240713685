//! The review gate: approve the order or roll it back.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{OrderWorkflow, StageCompletion};
use crate::core::{event_kinds, ArtifactId, StageId, WorkflowEvent};
use crate::errors::WorkflowError;
use crate::identity::Actor;

/// Outcome of a gate decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    /// The gate stage was completed.
    Approved(StageCompletion),
    /// The order was sent back for rework.
    Rejected {
        /// Stages that were completed before and are pending again.
        reset: Vec<StageId>,
        /// Artifacts now flagged for rework.
        flagged: Vec<ArtifactId>,
    },
}

impl GateDecision {
    /// Returns true for an approval.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved(_))
    }
}

impl OrderWorkflow<'_> {
    /// Approves or rejects the order at the gate stage.
    ///
    /// Approval completes the gate like any other stage. Rejection reopens
    /// every stage up to and including the gate and flags every artifact
    /// attached before the gate for rework.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidTransition`] if the graph has no gate
    /// - [`WorkflowError::NotFound`] if the order has no gate instance
    /// - [`WorkflowError::Forbidden`] if the actor is not the gate's assignee
    pub fn decide(
        &mut self,
        actor: &Actor,
        approved: bool,
        comment: Option<String>,
    ) -> Result<GateDecision, WorkflowError> {
        let gate = self
            .graph
            .gate()
            .ok_or_else(|| WorkflowError::invalid_transition("stage graph has no gate stage"))?;

        if approved {
            let completion = self.finish(gate, actor, comment)?;
            self.tx.record_event(
                WorkflowEvent::new(event_kinds::GATE_APPROVED)
                    .add_data("kks", serde_json::json!(self.order.kks))
                    .add_data("user", serde_json::json!(actor.user)),
            );
            return Ok(GateDecision::Approved(completion));
        }

        self.authorize(gate, actor)?;

        let mut reset = Vec::new();
        for instance in self.tx.instances_of_mut(self.order.id) {
            if instance.stage_id > gate {
                continue;
            }
            if instance.completed {
                reset.push(instance.stage_id);
            }
            instance.completed = false;
            if instance.stage_id == gate && comment.is_some() {
                instance.comment.clone_from(&comment);
            }
        }

        let mut flagged = Vec::new();
        for artifact in self.tx.artifacts_of_mut(self.order.id) {
            if artifact.stage_id < gate {
                artifact.needs_rework = true;
                flagged.push(artifact.id);
            }
        }

        info!(
            kks = %self.order.kks,
            reset = reset.len(),
            flagged = flagged.len(),
            "Order rejected at gate"
        );
        self.tx.record_event(
            WorkflowEvent::new(event_kinds::GATE_REJECTED)
                .add_data("kks", serde_json::json!(self.order.kks))
                .add_data("user", serde_json::json!(actor.user))
                .add_data("reset", serde_json::json!(reset))
                .add_data("flagged", serde_json::json!(flagged)),
        );

        Ok(GateDecision::Rejected { reset, flagged })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactRef, StageState};
    use crate::graph::{StageDef, StageGraph};
    use crate::store::{Records, Transaction};
    use crate::testing::fixtures;
    use crate::workflow::NewOrder;
    use pretty_assertions::assert_eq;

    fn three_stage_graph() -> StageGraph {
        StageGraph::builder()
            .stage(StageDef::new(1, "Entry").with_role("manager"))
            .stage(StageDef::new(2, "TIDev").with_role("technologist"))
            .stage(StageDef::new(3, "Approval").with_role("chief_engineer").gate())
            .build()
            .unwrap()
    }

    fn prepared(graph: &StageGraph) -> Transaction {
        let mut tx = Transaction::new(Records::default(), 0);
        let directory = fixtures::standard_directory();
        let mut workflow = OrderWorkflow::create(
            graph,
            &mut tx,
            &directory,
            NewOrder {
                kks: "PUMP-01".to_string(),
                description: "Feed pump".to_string(),
                artifacts: vec![ArtifactRef::new("a.pdf", "PUMP-01/Entry/a.pdf")],
            },
        )
        .unwrap();
        workflow
            .attach_artifact(
                StageId(2),
                &Actor::new(fixtures::TECHNOLOGIST),
                ArtifactRef::new("ti.pdf", "PUMP-01/TIDev/ti.pdf"),
            )
            .unwrap();
        workflow
            .complete_stage(StageId(2), &Actor::new(fixtures::TECHNOLOGIST), None)
            .unwrap();
        tx
    }

    #[test]
    fn test_reject_rolls_back_before_gate() {
        let graph = three_stage_graph();
        let mut tx = prepared(&graph);
        let mut workflow = OrderWorkflow::open(&graph, &mut tx, "PUMP-01").unwrap();

        let decision = workflow
            .decide(&Actor::new(fixtures::CHIEF), false, Some("redo".to_string()))
            .unwrap();

        let GateDecision::Rejected { reset, flagged } = decision else {
            panic!("expected rejection");
        };
        assert_eq!(reset, vec![StageId(1), StageId(2)]);
        assert_eq!(flagged.len(), 2);

        let progress = workflow.progress();
        for stage in [1, 2, 3] {
            assert_eq!(progress.stage(StageId(stage)).unwrap().state, StageState::Pending);
        }
        assert_eq!(progress.stage(StageId(3)).unwrap().comment.as_deref(), Some("redo"));
        assert!(progress
            .stages
            .iter()
            .flat_map(|s| s.artifacts.iter())
            .all(|a| a.needs_rework));
    }

    #[test]
    fn test_approve_completes_gate() {
        let graph = three_stage_graph();
        let mut tx = prepared(&graph);
        let mut workflow = OrderWorkflow::open(&graph, &mut tx, "PUMP-01").unwrap();

        let decision = workflow
            .decide(&Actor::new(fixtures::CHIEF), true, None)
            .unwrap();

        assert!(decision.is_approved());
        assert!(workflow.progress().completed);
    }

    #[test]
    fn test_decide_requires_gate_assignee() {
        let graph = three_stage_graph();
        let mut tx = prepared(&graph);
        let mut workflow = OrderWorkflow::open(&graph, &mut tx, "PUMP-01").unwrap();

        for approved in [true, false] {
            let err = workflow
                .decide(&Actor::new(fixtures::TECHNOLOGIST), approved, None)
                .unwrap_err();
            assert!(matches!(err, WorkflowError::Forbidden(_)));
        }
        assert_eq!(
            workflow.progress().stage(StageId(2)).unwrap().state,
            StageState::Completed
        );
    }

    #[test]
    fn test_decide_without_gate() {
        let graph = StageGraph::builder()
            .stage(StageDef::new(1, "Entry").with_role("manager"))
            .build()
            .unwrap();
        let mut tx = Transaction::new(Records::default(), 0);
        let directory = fixtures::standard_directory();
        let mut workflow = OrderWorkflow::create(
            &graph,
            &mut tx,
            &directory,
            NewOrder {
                kks: "K".to_string(),
                description: String::new(),
                artifacts: vec![ArtifactRef::new("a", "K/Entry/a")],
            },
        )
        .unwrap();

        let err = workflow
            .decide(&Actor::admin(fixtures::ADMIN), false, None)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition(_)));
    }

    #[test]
    fn test_reattach_after_rejection_clears_flags_for_that_stage_only() {
        let graph = three_stage_graph();
        let mut tx = prepared(&graph);
        let mut workflow = OrderWorkflow::open(&graph, &mut tx, "PUMP-01").unwrap();
        workflow
            .decide(&Actor::new(fixtures::CHIEF), false, None)
            .unwrap();

        workflow
            .attach_artifact(
                StageId(2),
                &Actor::new(fixtures::TECHNOLOGIST),
                ArtifactRef::new("ti2.pdf", "PUMP-01/TIDev/ti2.pdf"),
            )
            .unwrap();

        let progress = workflow.progress();
        assert!(progress
            .stage(StageId(2))
            .unwrap()
            .artifacts
            .iter()
            .all(|a| !a.needs_rework));
        assert!(progress
            .stage(StageId(1))
            .unwrap()
            .artifacts
            .iter()
            .all(|a| a.needs_rework));
    }
}
