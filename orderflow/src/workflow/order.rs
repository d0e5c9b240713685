//! Order creation and stage completion.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::propagation::StageForest;
use super::{Order, OrderProgress, StageInstance};
use crate::core::{
    event_kinds, Artifact, ArtifactId, ArtifactRef, StageId, UserRef, WorkflowEvent,
};
use crate::errors::{RecordKind, WorkflowError};
use crate::forest;
use crate::graph::StageGraph;
use crate::identity::{Actor, IdentityProvider};
use crate::store::Transaction;

/// Input for creating an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    /// The external business key. Must be unique and non-blank.
    pub kks: String,
    /// Free-text description, kept as the entry stage's comment.
    pub description: String,
    /// Files already written to the artifact store, attached to the entry stage.
    pub artifacts: Vec<ArtifactRef>,
}

/// Result of completing a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCompletion {
    /// The stage that was completed directly.
    pub stage_id: StageId,
    /// Parent stages completed by propagation, nearest first.
    pub propagated: Vec<StageId>,
}

/// One order's workflow inside a transaction.
#[derive(Debug)]
pub struct OrderWorkflow<'a> {
    pub(super) graph: &'a StageGraph,
    pub(super) tx: &'a mut Transaction,
    pub(super) order: Order,
}

impl<'a> OrderWorkflow<'a> {
    /// Creates an order with one stage instance per stage.
    ///
    /// The entry stage starts completed and carries the description and the
    /// initial artifacts. Every other stage starts pending with the assignee
    /// resolved from its role.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidArgument`] for a blank KKS or no artifacts
    /// - [`WorkflowError::AlreadyExists`] if the KKS is taken
    /// - [`WorkflowError::ResponsibilityMissing`] if a required stage has no
    ///   resolvable assignee
    pub fn create(
        graph: &'a StageGraph,
        tx: &'a mut Transaction,
        identity: &dyn IdentityProvider,
        request: NewOrder,
    ) -> Result<Self, WorkflowError> {
        let kks = request.kks.trim();
        if kks.is_empty() {
            return Err(WorkflowError::invalid_argument("KKS must not be blank"));
        }
        if request.artifacts.is_empty() {
            return Err(WorkflowError::invalid_argument(
                "an order needs at least one initial artifact",
            ));
        }
        if tx.order_by_kks(kks).is_some() {
            return Err(WorkflowError::AlreadyExists(format!("order '{kks}'")));
        }
        let entry = graph
            .entry()
            .ok_or_else(|| WorkflowError::invalid_transition("stage graph has no entry stage"))?
            .id;

        let mut assignees: Vec<(StageId, Option<UserRef>)> = Vec::with_capacity(graph.len());
        for def in graph.stages() {
            let assignee = identity.responsible_for(def);
            if assignee.is_none() && !def.optional {
                return Err(WorkflowError::ResponsibilityMissing {
                    stage: def.name.clone(),
                });
            }
            assignees.push((def.id, assignee));
        }

        let order_id = tx.insert_order(kks);
        for (stage, assignee) in assignees {
            let mut instance = StageInstance::new(order_id, stage);
            instance.parent = graph.parent(stage);
            instance.assignee = assignee;
            if stage == entry {
                instance.completed = true;
                instance.comment = Some(request.description.clone());
            }
            tx.insert_instance(instance);
        }

        let file_count = request.artifacts.len();
        for artifact in request.artifacts {
            tx.insert_artifact(order_id, entry, artifact);
        }

        tx.record_event(
            WorkflowEvent::new(event_kinds::ORDER_CREATED)
                .add_data("kks", serde_json::json!(kks))
                .add_data("order_id", serde_json::json!(order_id))
                .add_data("files", serde_json::json!(file_count)),
        );
        debug!(kks, order_id = %order_id, "Order created");

        let order = tx
            .order(order_id)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found(RecordKind::Order, order_id))?;
        Ok(Self { graph, tx, order })
    }

    /// Opens an existing order by KKS.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] for an unknown KKS.
    pub fn open(
        graph: &'a StageGraph,
        tx: &'a mut Transaction,
        kks: &str,
    ) -> Result<Self, WorkflowError> {
        let order = tx.require_order(kks)?.clone();
        Ok(Self { graph, tx, order })
    }

    /// Returns the order record.
    #[must_use]
    pub fn order(&self) -> &Order {
        &self.order
    }

    /// Returns the instance of `stage`, checking that `actor` may act on it.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`] for a stage the order does not have
    /// - [`WorkflowError::Forbidden`] if the actor is not the assignee
    pub fn authorize(&self, stage: StageId, actor: &Actor) -> Result<&StageInstance, WorkflowError> {
        let instance = self
            .tx
            .instance(self.order.id, stage)
            .ok_or_else(|| WorkflowError::not_found(RecordKind::Stage, stage))?;

        if !actor.may_act_as(instance.assignee.as_ref()) {
            return Err(WorkflowError::forbidden(format!(
                "'{}' is not responsible for stage '{}' of order '{}'",
                actor.user,
                self.graph.name_of(stage),
                self.order.kks
            )));
        }
        Ok(instance)
    }

    /// Attaches a file to a stage and clears the rework flag on the stage's
    /// earlier files.
    ///
    /// # Errors
    ///
    /// Same as [`OrderWorkflow::authorize`].
    pub fn attach_artifact(
        &mut self,
        stage: StageId,
        actor: &Actor,
        artifact: ArtifactRef,
    ) -> Result<ArtifactId, WorkflowError> {
        self.authorize(stage, actor)?;

        for prior in self
            .tx
            .artifacts_of_mut(self.order.id)
            .filter(|a| a.stage_id == stage)
        {
            prior.needs_rework = false;
        }

        let path = artifact.path.clone();
        let id = self.tx.insert_artifact(self.order.id, stage, artifact);
        self.tx.record_event(
            WorkflowEvent::new(event_kinds::ARTIFACT_ATTACHED)
                .add_data("kks", serde_json::json!(self.order.kks))
                .add_data("stage", serde_json::json!(self.graph.name_of(stage)))
                .add_data("path", serde_json::json!(path)),
        );
        Ok(id)
    }

    /// Completes a leaf stage and propagates completion to its ancestors.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`] for a stage the order does not have
    /// - [`WorkflowError::InvalidTransition`] for fan-out parents and the gate
    /// - [`WorkflowError::Forbidden`] if the actor is not the assignee
    pub fn complete_stage(
        &mut self,
        stage: StageId,
        actor: &Actor,
        comment: Option<String>,
    ) -> Result<StageCompletion, WorkflowError> {
        if self.tx.instance(self.order.id, stage).is_none() {
            return Err(WorkflowError::not_found(RecordKind::Stage, stage));
        }
        if self.graph.is_fan_out(stage) {
            return Err(WorkflowError::invalid_transition(format!(
                "stage '{}' completes when all of its children do",
                self.graph.name_of(stage)
            )));
        }
        if self.graph.is_gate(stage) {
            return Err(WorkflowError::invalid_transition(format!(
                "gate stage '{}' is completed by a decision",
                self.graph.name_of(stage)
            )));
        }

        self.finish(stage, actor, comment)
    }

    /// Marks an owned stage completed and drives propagation upward.
    pub(super) fn finish(
        &mut self,
        stage: StageId,
        actor: &Actor,
        comment: Option<String>,
    ) -> Result<StageCompletion, WorkflowError> {
        self.authorize(stage, actor)?;

        if let Some(instance) = self.tx.instance_mut(self.order.id, stage) {
            instance.completed = true;
            if comment.is_some() {
                instance.comment = comment;
            }
        }
        self.tx.record_event(
            WorkflowEvent::new(event_kinds::STAGE_COMPLETED)
                .add_data("kks", serde_json::json!(self.order.kks))
                .add_data("stage", serde_json::json!(self.graph.name_of(stage)))
                .add_data("user", serde_json::json!(actor.user)),
        );

        let propagated = forest::propagate(&mut StageForest::new(self.tx, self.order.id), stage)?;
        for parent in &propagated {
            debug!(kks = %self.order.kks, stage = %parent, "Stage completed by propagation");
            self.tx.record_event(
                WorkflowEvent::new(event_kinds::STAGE_PROPAGATED)
                    .add_data("kks", serde_json::json!(self.order.kks))
                    .add_data("stage", serde_json::json!(self.graph.name_of(*parent))),
            );
        }

        Ok(StageCompletion {
            stage_id: stage,
            propagated,
        })
    }

    /// Returns the progress projection.
    #[must_use]
    pub fn progress(&self) -> OrderProgress {
        OrderProgress::build(self.graph, &*self.tx, &self.order)
    }

    /// Deletes the order with its instances, artifacts and components.
    ///
    /// Returns the removed artifacts so their objects can be purged.
    pub fn delete(self) -> Vec<Artifact> {
        let removed = self.tx.remove_order(self.order.id);
        self.tx.record_event(
            WorkflowEvent::new(event_kinds::ORDER_DELETED)
                .add_data("kks", serde_json::json!(self.order.kks))
                .add_data("files", serde_json::json!(removed.len())),
        );
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OrderId, StageState, UserId};
    use crate::graph::{standard, StageDef};
    use crate::identity::MockIdentityProvider;
    use crate::store::Records;
    use crate::testing::fixtures;

    fn tx() -> Transaction {
        Transaction::new(Records::default(), 0)
    }

    fn request(kks: &str) -> NewOrder {
        NewOrder {
            kks: kks.to_string(),
            description: "Feed pump".to_string(),
            artifacts: vec![ArtifactRef::new("spec.pdf", format!("{kks}/Entry/spec.pdf"))],
        }
    }

    fn created(tx: &mut Transaction, graph: &StageGraph) -> OrderId {
        let directory = fixtures::standard_directory();
        OrderWorkflow::create(graph, tx, &directory, request("PUMP-01"))
            .unwrap()
            .order()
            .id
    }

    #[test]
    fn test_create_initialises_every_stage() {
        let graph = StageGraph::standard();
        let mut tx = tx();
        let order = created(&mut tx, &graph);

        assert_eq!(tx.instances_of(order).count(), 9);
        let entry = tx.instance(order, StageId(1)).unwrap();
        assert!(entry.completed);
        assert_eq!(entry.comment.as_deref(), Some("Feed pump"));
        assert!(tx.instances_of(order).skip(1).all(|i| !i.completed));
        assert!(tx.instance(order, StageId(3)).unwrap().assignee.is_none());
        assert_eq!(tx.instance(order, StageId(4)).unwrap().parent, Some(StageId(3)));
        assert_eq!(tx.artifacts_at(order, StageId(1)).count(), 1);
        assert_eq!(tx.events()[0].event_type, event_kinds::ORDER_CREATED);
    }

    #[test]
    fn test_create_requires_responsible_users() {
        let graph = StageGraph::standard();
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_responsible_for()
            .returning(|def| (def.name != standard::SUPPLY).then(|| UserRef::new("u", "U")));

        let mut tx = tx();
        let err = OrderWorkflow::create(&graph, &mut tx, &identity, request("PUMP-01")).unwrap_err();

        assert!(
            matches!(err, WorkflowError::ResponsibilityMissing { ref stage } if stage == "Supply")
        );
        assert!(!tx.is_dirty());
    }

    #[test]
    fn test_create_rejects_duplicate_and_blank_kks() {
        let graph = StageGraph::standard();
        let directory = fixtures::standard_directory();
        let mut tx = tx();
        created(&mut tx, &graph);

        let dup = OrderWorkflow::create(&graph, &mut tx, &directory, request("PUMP-01"));
        assert!(matches!(dup, Err(WorkflowError::AlreadyExists(_))));

        let blank = OrderWorkflow::create(&graph, &mut tx, &directory, request("  "));
        assert!(matches!(blank, Err(WorkflowError::InvalidArgument(_))));

        let mut no_files = request("PUMP-02");
        no_files.artifacts.clear();
        let empty = OrderWorkflow::create(&graph, &mut tx, &directory, no_files);
        assert!(matches!(empty, Err(WorkflowError::InvalidArgument(_))));
    }

    #[test]
    fn test_complete_stage_checks_ownership() {
        let graph = StageGraph::standard();
        let mut tx = tx();
        created(&mut tx, &graph);
        let mut workflow = OrderWorkflow::open(&graph, &mut tx, "PUMP-01").unwrap();

        let err = workflow
            .complete_stage(StageId(2), &Actor::new(fixtures::DESIGNER), None)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden(_)));
        assert_eq!(workflow.progress().stage(StageId(2)).unwrap().state, StageState::Pending);

        let done = workflow
            .complete_stage(StageId(2), &Actor::new(fixtures::TECHNOLOGIST), Some("ok".into()))
            .unwrap();
        assert!(done.propagated.is_empty());
        assert_eq!(
            workflow.progress().stage(StageId(2)).unwrap().comment.as_deref(),
            Some("ok")
        );
    }

    #[test]
    fn test_admin_may_complete_any_stage() {
        let graph = StageGraph::standard();
        let mut tx = tx();
        created(&mut tx, &graph);
        let mut workflow = OrderWorkflow::open(&graph, &mut tx, "PUMP-01").unwrap();

        assert!(workflow
            .complete_stage(StageId(6), &Actor::admin(fixtures::ADMIN), None)
            .is_ok());
    }

    #[test]
    fn test_complete_stage_rejects_parents_gate_and_unknown() {
        let graph = StageGraph::standard();
        let mut tx = tx();
        created(&mut tx, &graph);
        let mut workflow = OrderWorkflow::open(&graph, &mut tx, "PUMP-01").unwrap();
        let admin = Actor::admin(fixtures::ADMIN);

        assert!(matches!(
            workflow.complete_stage(StageId(3), &admin, None),
            Err(WorkflowError::InvalidTransition(_))
        ));
        assert!(matches!(
            workflow.complete_stage(StageId(7), &admin, None),
            Err(WorkflowError::InvalidTransition(_))
        ));
        assert!(matches!(
            workflow.complete_stage(StageId(42), &admin, None),
            Err(WorkflowError::NotFound {
                kind: RecordKind::Stage,
                ..
            })
        ));
    }

    #[test]
    fn test_sibling_completion_propagates_to_parent() {
        let graph = StageGraph::standard();
        let mut tx = tx();
        created(&mut tx, &graph);
        let mut workflow = OrderWorkflow::open(&graph, &mut tx, "PUMP-01").unwrap();

        let first = workflow
            .complete_stage(StageId(5), &Actor::new(fixtures::SCHEMATIC), None)
            .unwrap();
        assert!(first.propagated.is_empty());
        assert_eq!(workflow.progress().stage(StageId(3)).unwrap().state, StageState::Pending);

        let second = workflow
            .complete_stage(StageId(4), &Actor::new(fixtures::DESIGNER), None)
            .unwrap();
        assert_eq!(second.propagated, vec![StageId(3)]);
        assert_eq!(workflow.progress().stage(StageId(3)).unwrap().state, StageState::Completed);
    }

    #[test]
    fn test_attach_artifact_clears_rework() {
        let graph = StageGraph::standard();
        let mut tx = tx();
        let order = created(&mut tx, &graph);
        for artifact in tx.artifacts_of_mut(order) {
            artifact.needs_rework = true;
        }

        let mut workflow = OrderWorkflow::open(&graph, &mut tx, "PUMP-01").unwrap();
        workflow
            .attach_artifact(
                StageId(1),
                &Actor::new(fixtures::MANAGER),
                ArtifactRef::new("v2.pdf", "PUMP-01/Entry/v2.pdf"),
            )
            .unwrap();

        let entry = workflow.progress();
        let files = &entry.stage(StageId(1)).unwrap().artifacts;
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|a| !a.needs_rework));
    }

    #[test]
    fn test_attach_artifact_requires_assignee() {
        let graph = StageGraph::standard();
        let mut tx = tx();
        created(&mut tx, &graph);
        let mut workflow = OrderWorkflow::open(&graph, &mut tx, "PUMP-01").unwrap();

        let err = workflow
            .attach_artifact(
                StageId(2),
                &Actor::new(UserId::new("stranger")),
                ArtifactRef::new("x.pdf", "PUMP-01/TIDev/x.pdf"),
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden(_)));
    }

    #[test]
    fn test_optional_stage_without_role() {
        let graph = StageGraph::builder()
            .stage(StageDef::new(1, "Entry").with_role("manager"))
            .stage(StageDef::new(2, "Parent").optional())
            .stage(StageDef::new(3, "Leaf").with_parent(2).with_role("technologist"))
            .build()
            .unwrap();
        let mut tx = tx();
        created(&mut tx, &graph);
        let mut workflow = OrderWorkflow::open(&graph, &mut tx, "PUMP-01").unwrap();

        let done = workflow
            .complete_stage(StageId(3), &Actor::new(fixtures::TECHNOLOGIST), None)
            .unwrap();
        assert_eq!(done.propagated, vec![StageId(2)]);
        assert!(workflow.progress().completed);
    }

    #[test]
    fn test_delete_returns_artifacts() {
        let graph = StageGraph::standard();
        let mut tx = tx();
        created(&mut tx, &graph);

        let removed = OrderWorkflow::open(&graph, &mut tx, "PUMP-01").unwrap().delete();

        assert_eq!(removed.len(), 1);
        assert!(tx.order_by_kks("PUMP-01").is_none());
        assert!(OrderWorkflow::open(&graph, &mut tx, "PUMP-01").is_err());
    }
}
