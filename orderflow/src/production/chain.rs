//! Task chains and the component tree they unlock.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Component, ProductionTask, TechProcess};
use crate::core::{
    event_kinds, AreaId, ComponentId, OrderId, TaskId, TaskStatus, UserId, WorkflowEvent,
};
use crate::errors::{RecordKind, WorkflowError};
use crate::forest::{self, GatedForest};
use crate::store::Transaction;

/// Nested description of a component tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Drawing designation.
    pub designation: String,
    /// Units required per parent assembly.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Total units to produce.
    #[serde(default = "default_count")]
    pub amount: u32,
    /// Areas the component passes through.
    #[serde(default)]
    pub process: TechProcess,
    /// Sub-components.
    #[serde(default)]
    pub children: Vec<ComponentSpec>,
}

fn default_count() -> u32 {
    1
}

impl ComponentSpec {
    /// Creates a leaf specification.
    pub fn new(designation: impl Into<String>, process: TechProcess) -> Self {
        Self {
            designation: designation.into(),
            count: 1,
            amount: 1,
            process,
            children: Vec::new(),
        }
    }

    /// Adds a sub-component.
    #[must_use]
    pub fn with_child(mut self, child: ComponentSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Sets count and amount.
    #[must_use]
    pub fn with_quantity(mut self, count: u32, amount: u32) -> Self {
        self.count = count;
        self.amount = amount;
        self
    }
}

/// Result of advancing a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAdvance {
    /// The task that was advanced.
    pub task_id: TaskId,
    /// Its new status.
    pub status: TaskStatus,
    /// True if this call claimed the task.
    pub claimed: bool,
    /// Tasks made available, in unlock order.
    pub unlocked: Vec<TaskId>,
    /// Components marked developed, in order.
    pub developed: Vec<ComponentId>,
}

/// Components seen as a gated forest: a parent's chain opens once every
/// sub-component is developed.
struct ComponentForest<'a> {
    tx: &'a mut Transaction,
}

impl GatedForest for ComponentForest<'_> {
    type Node = ComponentId;

    fn parent(&self, node: ComponentId) -> Option<ComponentId> {
        self.tx.component(node).and_then(|c| c.parent)
    }

    fn children(&self, node: ComponentId) -> Vec<ComponentId> {
        self.tx.sub_components(node).map(|c| c.id).collect()
    }

    fn is_complete(&self, node: ComponentId) -> bool {
        self.tx.component(node).is_some_and(|c| c.developed)
    }

    fn unlock(&mut self, node: ComponentId) -> bool {
        if let Some((id, available)) = self.tx.root_task(node).map(|t| (t.id, t.available)) {
            if available {
                return false;
            }
            if let Some(task) = self.tx.task_mut(id) {
                task.available = true;
            }
            return true;
        }

        match self.tx.component_mut(node) {
            Some(component) if !component.developed => {
                component.developed = true;
                true
            }
            _ => false,
        }
    }
}

/// Production operations inside a transaction.
#[derive(Debug)]
pub struct ProductionLine<'a> {
    tx: &'a mut Transaction,
}

impl<'a> ProductionLine<'a> {
    /// Wraps a transaction.
    pub fn new(tx: &'a mut Transaction) -> Self {
        Self { tx }
    }

    /// Creates a component tree for `order`.
    ///
    /// Returns the ids of the top-level components.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidArgument`] for an empty tree or a
    /// blank designation.
    pub fn create_components(
        &mut self,
        order: OrderId,
        specs: &[ComponentSpec],
    ) -> Result<Vec<ComponentId>, WorkflowError> {
        if specs.is_empty() {
            return Err(WorkflowError::invalid_argument("component tree is empty"));
        }

        let mut created: Vec<(ComponentId, &ComponentSpec)> = Vec::new();
        let mut roots = Vec::with_capacity(specs.len());
        for spec in specs {
            roots.push(self.insert_tree(order, None, spec, &mut created)?);
        }

        for (id, spec) in &created {
            self.build_chain(*id, spec.process.areas(), spec.children.is_empty());
        }

        let mut outcome = TaskAdvance::default();
        for (id, spec) in &created {
            if spec.children.is_empty() && spec.process.is_empty() {
                self.develop(*id, &mut outcome)?;
            }
        }

        self.tx.record_event(
            WorkflowEvent::new(event_kinds::COMPONENTS_CREATED)
                .add_data("order_id", serde_json::json!(order))
                .add_data("components", serde_json::json!(created.len())),
        );
        Ok(roots)
    }

    fn insert_tree<'s>(
        &mut self,
        order: OrderId,
        parent: Option<ComponentId>,
        spec: &'s ComponentSpec,
        created: &mut Vec<(ComponentId, &'s ComponentSpec)>,
    ) -> Result<ComponentId, WorkflowError> {
        if spec.designation.trim().is_empty() {
            return Err(WorkflowError::invalid_argument("component designation must not be blank"));
        }

        let id = self.tx.insert_component(|id| Component {
            id,
            order_id: order,
            designation: spec.designation.clone(),
            count: spec.count,
            amount: spec.amount,
            developed: false,
            parent,
        });
        created.push((id, spec));

        for child in &spec.children {
            self.insert_tree(order, Some(id), child, created)?;
        }
        Ok(id)
    }

    /// Creates the task chain of an existing component.
    ///
    /// The first task starts available once every sub-component is
    /// developed, which holds at once for a component without any. A
    /// component that was developed for lack of a process goes back to
    /// undeveloped until its new chain is done. An empty chain on a
    /// component whose sub-components are all developed develops the
    /// component at once.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`] for an unknown component
    /// - [`WorkflowError::InvalidTransition`] if the component already has a
    ///   chain, or if its parent assembly already started
    pub fn create_chain(
        &mut self,
        component: ComponentId,
        areas: &[AreaId],
    ) -> Result<Vec<TaskId>, WorkflowError> {
        let record = self
            .tx
            .component(component)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found(RecordKind::Component, component))?;
        if self.tx.root_task(component).is_some() {
            return Err(WorkflowError::invalid_transition(format!(
                "component {component} already has a task chain"
            )));
        }
        if record.developed && areas.is_empty() {
            return Ok(Vec::new());
        }
        if record.developed && record.parent.is_some_and(|parent| self.started(parent)) {
            return Err(WorkflowError::invalid_transition(format!(
                "the assembly holding component {component} has already started"
            )));
        }

        if let Some(record) = self.tx.component_mut(component) {
            record.developed = false;
        }
        let ready = self.tx.sub_components(component).all(|c| c.developed);
        let tasks = self.build_chain(component, areas, ready);

        if tasks.is_empty() && ready {
            self.develop(component, &mut TaskAdvance::default())?;
        }
        Ok(tasks)
    }

    /// True once an assembly's own chain is open or done.
    fn started(&self, component: ComponentId) -> bool {
        self.tx.component(component).is_some_and(|c| c.developed)
            || self.tx.root_task(component).is_some_and(|t| t.available)
    }

    fn build_chain(&mut self, component: ComponentId, areas: &[AreaId], leaf: bool) -> Vec<TaskId> {
        let ids: Vec<TaskId> = areas.iter().map(|_| self.tx.allocate_task_id()).collect();

        for (i, (id, area)) in ids.iter().zip(areas).enumerate() {
            self.tx.insert_task(ProductionTask {
                id: *id,
                component_id: component,
                area_id: *area,
                status: TaskStatus::New,
                assignee: None,
                available: i == 0 && leaf,
                parent_task: i.checked_sub(1).map(|p| ids[p]),
                child_task: ids.get(i + 1).copied(),
            });
        }
        ids
    }

    /// Moves a task to the status with id `status_id` on behalf of `user`.
    ///
    /// The first user to touch an unclaimed task claims it. Finishing a task
    /// opens the next one in the chain; finishing the last one develops the
    /// component and, once all of its siblings are developed too, opens the
    /// parent assembly's chain.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidStatus`] for an unknown status id
    /// - [`WorkflowError::NotFound`] for an unknown task
    /// - [`WorkflowError::Forbidden`] if another user claimed the task
    /// - [`WorkflowError::InvalidTransition`] for an unavailable task or a
    ///   change out of `Done`
    pub fn advance_task(
        &mut self,
        task_id: TaskId,
        status_id: u32,
        user: &UserId,
    ) -> Result<TaskAdvance, WorkflowError> {
        let status = TaskStatus::from_id(status_id).ok_or(WorkflowError::InvalidStatus(status_id))?;
        let task = self
            .tx
            .task(task_id)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found(RecordKind::Task, task_id))?;

        if task.assignee.as_ref().is_some_and(|owner| owner != user) {
            return Err(WorkflowError::forbidden(format!(
                "task {task_id} is claimed by another user"
            )));
        }
        if !task.available {
            return Err(WorkflowError::invalid_transition(format!(
                "task {task_id} is not available yet"
            )));
        }

        let mut outcome = TaskAdvance {
            task_id,
            status,
            ..TaskAdvance::default()
        };
        if task.status.is_terminal() {
            if status.is_terminal() {
                return Ok(outcome);
            }
            return Err(WorkflowError::invalid_transition(format!(
                "task {task_id} is already done"
            )));
        }

        outcome.claimed = task.assignee.is_none();
        if let Some(record) = self.tx.task_mut(task_id) {
            record.status = status;
            if outcome.claimed {
                record.assignee = Some(user.clone());
            }
        }
        if outcome.claimed {
            self.tx.record_event(
                WorkflowEvent::new(event_kinds::TASK_CLAIMED)
                    .add_data("task_id", serde_json::json!(task_id))
                    .add_data("user", serde_json::json!(user)),
            );
        }
        self.tx.record_event(
            WorkflowEvent::new(event_kinds::TASK_STATUS_CHANGED)
                .add_data("task_id", serde_json::json!(task_id))
                .add_data("from", serde_json::json!(task.status))
                .add_data("to", serde_json::json!(status)),
        );

        if !status.is_terminal() {
            return Ok(outcome);
        }

        match task.child_task {
            Some(next) => {
                if let Some(next_task) = self.tx.task_mut(next) {
                    next_task.available = true;
                }
                self.unlocked(next, &mut outcome);
            }
            None => self.develop(task.component_id, &mut outcome)?,
        }
        Ok(outcome)
    }

    /// Marks a component developed and propagates up the tree.
    fn develop(&mut self, component: ComponentId, outcome: &mut TaskAdvance) -> Result<(), WorkflowError> {
        if let Some(record) = self.tx.component_mut(component) {
            record.developed = true;
        }
        self.developed(component, outcome);

        let fired = forest::propagate(&mut ComponentForest { tx: &mut *self.tx }, component)?;
        for parent in fired {
            match self.tx.root_task(parent).map(|t| t.id) {
                Some(task) => self.unlocked(task, outcome),
                None => self.developed(parent, outcome),
            }
        }
        Ok(())
    }

    fn unlocked(&mut self, task: TaskId, outcome: &mut TaskAdvance) {
        debug!(task = %task, "Task unlocked");
        outcome.unlocked.push(task);
        self.tx.record_event(
            WorkflowEvent::new(event_kinds::TASK_UNLOCKED).add_data("task_id", serde_json::json!(task)),
        );
    }

    fn developed(&mut self, component: ComponentId, outcome: &mut TaskAdvance) {
        debug!(component = %component, "Component developed");
        outcome.developed.push(component);
        self.tx.record_event(
            WorkflowEvent::new(event_kinds::COMPONENT_DEVELOPED)
                .add_data("component_id", serde_json::json!(component)),
        );
    }
}

/// Returns the available tasks in `area`.
///
/// The iterator borrows the transaction and can be cloned to restart it.
pub fn visible_tasks(
    tx: &Transaction,
    area: AreaId,
) -> impl Iterator<Item = &ProductionTask> + Clone + '_ {
    tx.tasks().filter(move |t| t.area_id == area && t.available)
}
