//! Record arena and the unit of work that mutates it.

use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use crate::core::{
    Artifact, ArtifactId, ArtifactRef, ComponentId, OrderId, StageId, TaskId, WorkflowEvent,
};
use crate::errors::{RecordKind, WorkflowError};
use crate::production::{Component, ProductionTask};
use crate::workflow::{Order, StageInstance};

/// Every persisted record, keyed by id.
///
/// Records refer to each other by id only, so a snapshot is a plain clone.
#[derive(Debug, Clone, Default)]
pub struct Records {
    orders: BTreeMap<OrderId, Order>,
    instances: BTreeMap<(OrderId, StageId), StageInstance>,
    artifacts: BTreeMap<ArtifactId, Artifact>,
    components: BTreeMap<ComponentId, Component>,
    tasks: BTreeMap<TaskId, ProductionTask>,
    next_order: u64,
    next_artifact: u64,
    next_component: u64,
    next_task: u64,
}

/// A private working set of the store, committed as a whole.
///
/// Operations read and write the transaction; nothing is visible to other
/// callers until [`WorkflowStore::commit`](super::WorkflowStore::commit)
/// succeeds. Dropping a transaction discards it.
#[derive(Debug)]
pub struct Transaction {
    id: Uuid,
    base_version: u64,
    records: Records,
    dirty: bool,
    events: Vec<WorkflowEvent>,
}

impl Transaction {
    /// Starts a transaction over a snapshot taken at `base_version`.
    #[must_use]
    pub fn new(records: Records, base_version: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            base_version,
            records,
            dirty: false,
            events: Vec::new(),
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the store version the snapshot was taken at.
    #[must_use]
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// Returns true if any record was written.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Queues an event to be emitted after a successful commit.
    pub fn record_event(&mut self, event: WorkflowEvent) {
        self.events.push(event);
    }

    /// Returns the queued events.
    #[must_use]
    pub fn events(&self) -> &[WorkflowEvent] {
        &self.events
    }

    /// Takes the queued events, leaving none behind.
    pub fn take_events(&mut self) -> Vec<WorkflowEvent> {
        std::mem::take(&mut self.events)
    }

    /// Consumes the transaction, returning its working set.
    #[must_use]
    pub fn into_records(self) -> Records {
        self.records
    }

    // ---- orders ----

    /// Looks an order up by id.
    #[must_use]
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.records.orders.get(&id)
    }

    /// Looks an order up by KKS.
    #[must_use]
    pub fn order_by_kks(&self, kks: &str) -> Option<&Order> {
        self.records.orders.values().find(|o| o.kks == kks)
    }

    /// Looks an order up by KKS, failing with `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] for an unknown KKS.
    pub fn require_order(&self, kks: &str) -> Result<&Order, WorkflowError> {
        self.order_by_kks(kks)
            .ok_or_else(|| WorkflowError::not_found(RecordKind::Order, kks))
    }

    /// Returns every order in id order.
    pub fn orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.records.orders.values()
    }

    /// Inserts a new order and returns its id.
    pub fn insert_order(&mut self, kks: impl Into<String>) -> OrderId {
        self.records.next_order += 1;
        let id = OrderId(self.records.next_order);
        self.records.orders.insert(
            id,
            Order {
                id,
                kks: kks.into(),
                created_at: Utc::now(),
            },
        );
        self.dirty = true;
        id
    }

    /// Removes an order with its stage instances, artifacts, components and
    /// tasks. Returns the removed artifacts.
    pub fn remove_order(&mut self, id: OrderId) -> Vec<Artifact> {
        if self.records.orders.remove(&id).is_none() {
            return Vec::new();
        }
        self.dirty = true;

        self.records.instances.retain(|(order, _), _| *order != id);

        let (removed, kept): (BTreeMap<_, _>, BTreeMap<_, _>) =
            std::mem::take(&mut self.records.artifacts)
                .into_iter()
                .partition(|(_, a)| a.order_id == id);
        self.records.artifacts = kept;

        let components: Vec<ComponentId> = self
            .records
            .components
            .values()
            .filter(|c| c.order_id == id)
            .map(|c| c.id)
            .collect();
        self.records.components.retain(|_, c| c.order_id != id);
        self.records
            .tasks
            .retain(|_, t| !components.contains(&t.component_id));

        removed.into_values().collect()
    }

    // ---- stage instances ----

    /// Looks a stage instance up.
    #[must_use]
    pub fn instance(&self, order: OrderId, stage: StageId) -> Option<&StageInstance> {
        self.records.instances.get(&(order, stage))
    }

    /// Looks a stage instance up for writing.
    pub fn instance_mut(&mut self, order: OrderId, stage: StageId) -> Option<&mut StageInstance> {
        let instance = self.records.instances.get_mut(&(order, stage));
        if instance.is_some() {
            self.dirty = true;
        }
        instance
    }

    /// Returns the instances of an order in stage order.
    pub fn instances_of(&self, order: OrderId) -> impl Iterator<Item = &StageInstance> + '_ {
        self.records
            .instances
            .range((order, StageId(0))..=(order, StageId(u32::MAX)))
            .map(|(_, i)| i)
    }

    /// Returns the instances of an order for writing.
    pub fn instances_of_mut(
        &mut self,
        order: OrderId,
    ) -> impl Iterator<Item = &mut StageInstance> + '_ {
        self.dirty = true;
        self.records
            .instances
            .range_mut((order, StageId(0))..=(order, StageId(u32::MAX)))
            .map(|(_, i)| i)
    }

    /// Inserts or replaces a stage instance.
    pub fn insert_instance(&mut self, instance: StageInstance) {
        self.records
            .instances
            .insert((instance.order_id, instance.stage_id), instance);
        self.dirty = true;
    }

    // ---- artifacts ----

    /// Returns the artifacts of an order in attach order.
    pub fn artifacts_of(&self, order: OrderId) -> impl Iterator<Item = &Artifact> + '_ {
        self.records.artifacts.values().filter(move |a| a.order_id == order)
    }

    /// Returns the artifacts attached at one stage of an order.
    pub fn artifacts_at(
        &self,
        order: OrderId,
        stage: StageId,
    ) -> impl Iterator<Item = &Artifact> + '_ {
        self.artifacts_of(order).filter(move |a| a.stage_id == stage)
    }

    /// Returns the artifacts of an order for writing.
    pub fn artifacts_of_mut(&mut self, order: OrderId) -> impl Iterator<Item = &mut Artifact> + '_ {
        self.dirty = true;
        self.records
            .artifacts
            .values_mut()
            .filter(move |a| a.order_id == order)
    }

    /// Records an artifact and returns its id.
    pub fn insert_artifact(
        &mut self,
        order: OrderId,
        stage: StageId,
        artifact: ArtifactRef,
    ) -> ArtifactId {
        self.records.next_artifact += 1;
        let id = ArtifactId(self.records.next_artifact);
        self.records.artifacts.insert(
            id,
            Artifact {
                id,
                order_id: order,
                stage_id: stage,
                file_name: artifact.file_name,
                path: artifact.path,
                uploaded_at: Utc::now(),
                needs_rework: false,
            },
        );
        self.dirty = true;
        id
    }

    // ---- components ----

    /// Looks a component up by id.
    #[must_use]
    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.records.components.get(&id)
    }

    /// Looks a component up for writing.
    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        let component = self.records.components.get_mut(&id);
        if component.is_some() {
            self.dirty = true;
        }
        component
    }

    /// Returns the components created by an order.
    pub fn components_of(&self, order: OrderId) -> impl Iterator<Item = &Component> + '_ {
        self.records.components.values().filter(move |c| c.order_id == order)
    }

    /// Returns the direct sub-components of a component.
    pub fn sub_components(&self, id: ComponentId) -> impl Iterator<Item = &Component> + '_ {
        self.records
            .components
            .values()
            .filter(move |c| c.parent == Some(id))
    }

    /// Inserts a component built by `build` from its freshly assigned id.
    pub fn insert_component(&mut self, build: impl FnOnce(ComponentId) -> Component) -> ComponentId {
        self.records.next_component += 1;
        let id = ComponentId(self.records.next_component);
        self.records.components.insert(id, build(id));
        self.dirty = true;
        id
    }

    // ---- tasks ----

    /// Looks a task up by id.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&ProductionTask> {
        self.records.tasks.get(&id)
    }

    /// Looks a task up for writing.
    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut ProductionTask> {
        let task = self.records.tasks.get_mut(&id);
        if task.is_some() {
            self.dirty = true;
        }
        task
    }

    /// Returns every task in id order.
    pub fn tasks(&self) -> impl Iterator<Item = &ProductionTask> + Clone + '_ {
        self.records.tasks.values()
    }

    /// Returns the first task of a component's chain.
    #[must_use]
    pub fn root_task(&self, component: ComponentId) -> Option<&ProductionTask> {
        self.records
            .tasks
            .values()
            .find(|t| t.component_id == component && t.is_root())
    }

    /// Reserves a task id without inserting a task.
    pub fn allocate_task_id(&mut self) -> TaskId {
        self.records.next_task += 1;
        TaskId(self.records.next_task)
    }

    /// Inserts or replaces a task.
    pub fn insert_task(&mut self, task: ProductionTask) {
        self.records.tasks.insert(task.id, task);
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AreaId, TaskStatus};

    fn tx() -> Transaction {
        Transaction::new(Records::default(), 0)
    }

    #[test]
    fn test_new_transaction_is_clean() {
        let tx = tx();
        assert!(!tx.is_dirty());
        assert_eq!(tx.base_version(), 0);
        assert!(tx.events().is_empty());
    }

    #[test]
    fn test_reads_do_not_dirty() {
        let mut tx = tx();
        assert!(tx.instance_mut(OrderId(1), StageId(1)).is_none());
        assert!(tx.order_by_kks("missing").is_none());
        assert!(!tx.is_dirty());
    }

    #[test]
    fn test_order_lookup_by_kks() {
        let mut tx = tx();
        let id = tx.insert_order("PUMP-01");

        assert!(tx.is_dirty());
        assert_eq!(tx.require_order("PUMP-01").unwrap().id, id);
        assert!(matches!(
            tx.require_order("PUMP-02"),
            Err(WorkflowError::NotFound {
                kind: RecordKind::Order,
                ..
            })
        ));
    }

    #[test]
    fn test_instances_are_scoped_to_order() {
        let mut tx = tx();
        let a = tx.insert_order("A");
        let b = tx.insert_order("B");
        for stage in [3, 1, 2] {
            tx.insert_instance(StageInstance::new(a, StageId(stage)));
        }
        tx.insert_instance(StageInstance::new(b, StageId(1)));

        let stages: Vec<u32> = tx.instances_of(a).map(|i| i.stage_id.get()).collect();
        assert_eq!(stages, vec![1, 2, 3]);
        assert_eq!(tx.instances_of(b).count(), 1);
    }

    #[test]
    fn test_remove_order_cascades() {
        let mut tx = tx();
        let keep = tx.insert_order("KEEP");
        let gone = tx.insert_order("GONE");
        tx.insert_instance(StageInstance::new(gone, StageId(1)));
        tx.insert_instance(StageInstance::new(keep, StageId(1)));
        tx.insert_artifact(gone, StageId(1), ArtifactRef::new("a.pdf", "GONE/Entry/a.pdf"));
        tx.insert_artifact(keep, StageId(1), ArtifactRef::new("b.pdf", "KEEP/Entry/b.pdf"));
        let component = tx.insert_component(|id| Component {
            id,
            order_id: gone,
            designation: "X".to_string(),
            count: 1,
            amount: 1,
            developed: false,
            parent: None,
        });
        let task_id = tx.allocate_task_id();
        tx.insert_task(ProductionTask {
            id: task_id,
            component_id: component,
            area_id: AreaId(1),
            status: TaskStatus::New,
            assignee: None,
            available: true,
            parent_task: None,
            child_task: None,
        });

        let removed = tx.remove_order(gone);

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].path, "GONE/Entry/a.pdf");
        assert!(tx.order(gone).is_none());
        assert_eq!(tx.instances_of(gone).count(), 0);
        assert!(tx.component(component).is_none());
        assert!(tx.task(task_id).is_none());
        assert_eq!(tx.artifacts_of(keep).count(), 1);
        assert_eq!(tx.instances_of(keep).count(), 1);
    }

    #[test]
    fn test_events_are_taken_once() {
        let mut tx = tx();
        tx.record_event(WorkflowEvent::new("order.created"));

        assert_eq!(tx.take_events().len(), 1);
        assert!(tx.take_events().is_empty());
    }
}
