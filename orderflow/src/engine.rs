//! The workflow engine: every operation as one retried transaction.
//!
//! [`WorkflowEngine`] owns the stage graph and talks to the store, the
//! identity provider, the artifact store and the event sink. Each write
//! operation begins a transaction, applies the domain operation to it and
//! commits. A commit that loses a race fails with
//! [`WorkflowError::ConflictRetry`] and the whole operation is re-run from a
//! fresh transaction under the configured [`RetryConfig`](crate::retry::RetryConfig).
//! Events are emitted only once the commit has succeeded.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info_span, warn, Instrument};

use crate::artifacts::{ArtifactStore, ArtifactUpload};
use crate::config::EngineConfig;
use crate::core::{
    AreaId, ArtifactId, ArtifactRef, ComponentId, OrderId, StageId, TaskId, TaskStatus, UserId,
};
use crate::errors::{RecordKind, WorkflowError};
use crate::events::{EventSink, NoOpEventSink};
use crate::graph::StageGraph;
use crate::identity::{Actor, IdentityProvider};
use crate::observability::OperationTimer;
use crate::production::{
    visible_tasks, Component, ComponentSpec, ProductionLine, ProductionTask, TaskAdvance, TechProcess,
};
use crate::retry::with_retry;
use crate::store::{Transaction, WorkflowStore};
use crate::workflow::{
    report, GateDecision, NewOrder, OrderArtifacts, OrderProgress, OrderStatistics, OrderWorkflow,
    StageCompletion,
};

/// Request to create an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    /// The external business key.
    pub kks: String,
    /// Free-text description.
    pub description: String,
    /// Initial files for the entry stage.
    pub files: Vec<ArtifactUpload>,
}

impl CreateOrder {
    /// Creates a request.
    pub fn new(kks: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kks: kks.into(),
            description: description.into(),
            files: Vec::new(),
        }
    }

    /// Adds an initial file.
    #[must_use]
    pub fn with_file(mut self, file: ArtifactUpload) -> Self {
        self.files.push(file);
        self
    }
}

/// Dependency-gated workflow engine.
pub struct WorkflowEngine {
    graph: Arc<StageGraph>,
    store: Arc<dyn WorkflowStore>,
    identity: Arc<dyn IdentityProvider>,
    artifacts: Arc<dyn ArtifactStore>,
    events: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("stages", &self.graph.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Creates an engine over the standard stage graph with default settings.
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        identity: Arc<dyn IdentityProvider>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            graph: Arc::new(StageGraph::standard()),
            store,
            identity,
            artifacts,
            events: Arc::new(NoOpEventSink),
            config: EngineConfig::default(),
        }
    }

    /// Creates an engine from a configuration, building its stage graph.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Config`] or [`WorkflowError::GraphValidation`]
    /// for an invalid configuration.
    pub fn from_config(
        config: EngineConfig,
        store: Arc<dyn WorkflowStore>,
        identity: Arc<dyn IdentityProvider>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Result<Self, WorkflowError> {
        config.validate()?;
        let graph = config.stage_graph()?;
        Ok(Self {
            graph: Arc::new(graph),
            config,
            ..Self::new(store, identity, artifacts)
        })
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Sets the configuration. The stage graph is left unchanged.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the stage graph.
    #[must_use]
    pub fn with_graph(mut self, graph: StageGraph) -> Self {
        self.graph = Arc::new(graph);
        self
    }

    /// Returns the stage graph.
    #[must_use]
    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn actor(&self, user: &UserId) -> Actor {
        Actor::resolve(self.identity.as_ref(), user.clone())
    }

    async fn read<T>(&self, f: impl FnOnce(&Transaction) -> Result<T, WorkflowError>) -> Result<T, WorkflowError> {
        let tx = self.store.begin().await?;
        f(&tx)
    }

    /// Runs `op` in a transaction, committing and emitting its events, and
    /// retries the whole attempt on retryable failures.
    async fn transact<T, F>(&self, name: &'static str, op: F) -> Result<T, WorkflowError>
    where
        F: Fn(&mut Transaction) -> Result<T, WorkflowError> + Sync,
        T: Send,
    {
        let op = &op;
        let attempt = move || async move {
            let mut tx = self.store.begin().await?;
            let value = op(&mut tx)?;
            let events = tx.take_events();
            self.store.commit(tx).await?;

            for event in &events {
                self.events.emit(event).await;
            }
            Ok::<T, WorkflowError>(value)
        };
        with_retry(&self.config.retry, name, WorkflowError::is_retryable, attempt).await
    }

    // ---- orders ----

    /// Creates an order, storing its initial files under the entry stage.
    ///
    /// # Errors
    ///
    /// See [`OrderWorkflow::create`]; storage failures are passed through.
    pub async fn create_order(&self, request: CreateOrder) -> Result<OrderId, WorkflowError> {
        let timer = OperationTimer::start("create_order");
        let span = info_span!("create_order", kks = %request.kks, files = request.files.len());
        let result = self.create_order_inner(request).instrument(span).await;
        timer.finish(result)
    }

    async fn create_order_inner(&self, request: CreateOrder) -> Result<OrderId, WorkflowError> {
        let kks = request.kks.trim().to_string();
        if kks.is_empty() {
            return Err(WorkflowError::invalid_argument("KKS must not be blank"));
        }
        if request.files.is_empty() {
            return Err(WorkflowError::invalid_argument(
                "an order needs at least one initial artifact",
            ));
        }
        self.read(|tx| match tx.order_by_kks(&kks) {
            Some(_) => Err(WorkflowError::AlreadyExists(format!("order '{kks}'"))),
            None => Ok(()),
        })
        .await?;

        let entry = self
            .graph
            .entry()
            .ok_or_else(|| WorkflowError::invalid_transition("stage graph has no entry stage"))?
            .name
            .clone();

        let mut stored = Vec::with_capacity(request.files.len());
        for file in request.files {
            match self.artifacts.put(&kks, &entry, &file.file_name, file.bytes).await {
                Ok(path) => stored.push(ArtifactRef::new(file.file_name, path)),
                Err(err) => {
                    self.purge(&stored).await;
                    return Err(err);
                }
            }
        }

        let new_order = NewOrder {
            kks: kks.clone(),
            description: request.description,
            artifacts: stored.clone(),
        };
        let result = self
            .transact("create_order", |tx| {
                OrderWorkflow::create(&self.graph, tx, self.identity.as_ref(), new_order.clone())
                    .map(|workflow| workflow.order().id)
            })
            .await;

        if result.is_err() {
            self.purge(&stored).await;
        }
        result
    }

    async fn purge(&self, stored: &[ArtifactRef]) {
        if stored.is_empty() {
            return;
        }
        let paths: Vec<String> = stored.iter().map(|a| a.path.clone()).collect();
        if let Err(err) = self.artifacts.remove(&paths).await {
            warn!(error = %err, files = paths.len(), "Failed to purge stored artifacts");
        }
    }

    /// Attaches a file to a stage of an order.
    ///
    /// # Errors
    ///
    /// See [`OrderWorkflow::attach_artifact`].
    pub async fn attach_artifact(
        &self,
        kks: &str,
        stage: StageId,
        user: &UserId,
        file: ArtifactUpload,
    ) -> Result<ArtifactId, WorkflowError> {
        let timer = OperationTimer::start("attach_artifact");
        let span = info_span!("attach_artifact", kks, stage = %stage, user = %user);
        let result = async {
            let actor = self.actor(user);
            let mut tx = self.store.begin().await?;
            OrderWorkflow::open(&self.graph, &mut tx, kks)?.authorize(stage, &actor)?;
            drop(tx);

            let stage_name = self.graph.name_of(stage);
            let path = self
                .artifacts
                .put(kks, &stage_name, &file.file_name, file.bytes)
                .await?;
            let artifact = ArtifactRef::new(file.file_name, path);

            let result = self
                .transact("attach_artifact", |tx| {
                    OrderWorkflow::open(&self.graph, tx, kks)?.attach_artifact(stage, &actor, artifact.clone())
                })
                .await;
            if result.is_err() {
                self.purge(std::slice::from_ref(&artifact)).await;
            }
            result
        }
        .instrument(span)
        .await;
        timer.finish(result)
    }

    /// Completes a leaf stage.
    ///
    /// # Errors
    ///
    /// See [`OrderWorkflow::complete_stage`].
    pub async fn complete_stage(
        &self,
        kks: &str,
        stage: StageId,
        user: &UserId,
        comment: Option<String>,
    ) -> Result<StageCompletion, WorkflowError> {
        let timer = OperationTimer::start("complete_stage");
        let actor = self.actor(user);
        let result = self
            .transact("complete_stage", |tx| {
                OrderWorkflow::open(&self.graph, tx, kks)?.complete_stage(stage, &actor, comment.clone())
            })
            .instrument(info_span!("complete_stage", kks, stage = %stage, user = %user))
            .await;
        timer.finish(result)
    }

    /// Approves or rejects an order at the gate.
    ///
    /// # Errors
    ///
    /// See [`OrderWorkflow::decide`].
    pub async fn decide(
        &self,
        kks: &str,
        user: &UserId,
        approved: bool,
        comment: Option<String>,
    ) -> Result<GateDecision, WorkflowError> {
        let timer = OperationTimer::start("decide");
        let actor = self.actor(user);
        let result = self
            .transact("decide", |tx| {
                OrderWorkflow::open(&self.graph, tx, kks)?.decide(&actor, approved, comment.clone())
            })
            .instrument(info_span!("decide", kks, approved, user = %user))
            .await;
        timer.finish(result)
    }

    /// Deletes an order and purges its files. Returns the purged paths.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] for an unknown KKS.
    pub async fn delete_order(&self, kks: &str) -> Result<Vec<String>, WorkflowError> {
        let timer = OperationTimer::start("delete_order");
        let result = async {
            let paths: Vec<String> = self
                .transact("delete_order", |tx| {
                    Ok(OrderWorkflow::open(&self.graph, tx, kks)?
                        .delete()
                        .into_iter()
                        .map(|a| a.path)
                        .collect())
                })
                .await?;
            self.artifacts.remove(&paths).await?;
            Ok(paths)
        }
        .instrument(info_span!("delete_order", kks))
        .await;
        timer.finish(result)
    }

    /// Returns the progress view of an order.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] for an unknown KKS.
    pub async fn progress(&self, kks: &str) -> Result<OrderProgress, WorkflowError> {
        self.read(|tx| {
            let order = tx.require_order(kks)?;
            Ok(OrderProgress::build(&self.graph, tx, order))
        })
        .await
    }

    /// Returns an id to name map of the stages.
    #[must_use]
    pub fn list_stages(&self) -> BTreeMap<StageId, String> {
        self.graph.names().into_iter().collect()
    }

    /// Returns an id to KKS map of every order.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Unavailable`] if the store cannot be read.
    pub async fn list_orders(&self) -> Result<BTreeMap<OrderId, String>, WorkflowError> {
        self.read(|tx| Ok(report::list_orders(tx))).await
    }

    /// Returns one page of the orders visible to `user`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidArgument`] for page 0.
    pub async fn orders_page(&self, user: &UserId, page: usize) -> Result<Vec<OrderProgress>, WorkflowError> {
        let actor = self.actor(user);
        self.read(|tx| report::orders_page(&self.graph, tx, &actor, page, self.config.page_size))
            .await
    }

    /// Returns the number of order pages for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Unavailable`] if the store cannot be read.
    pub async fn page_count(&self, user: &UserId) -> Result<usize, WorkflowError> {
        let actor = self.actor(user);
        self.read(|tx| Ok(report::page_count(tx, &actor, self.config.page_size)))
            .await
    }

    /// Returns the artifacts of the listed orders with review statuses.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Unavailable`] if the store cannot be read.
    pub async fn artifact_report(&self, kks_list: &[String]) -> Result<Vec<OrderArtifacts>, WorkflowError> {
        self.read(|tx| Ok(report::artifact_report(&self.graph, tx, kks_list)))
            .await
    }

    /// Returns order statistics.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Unavailable`] if the store cannot be read.
    pub async fn statistics(&self) -> Result<OrderStatistics, WorkflowError> {
        self.read(|tx| Ok(report::statistics(&self.graph, tx))).await
    }

    // ---- production ----

    /// Creates a component tree for an order and builds every task chain.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] for an unknown KKS and
    /// [`WorkflowError::InvalidArgument`] for an empty or malformed tree.
    pub async fn create_components(
        &self,
        kks: &str,
        tree: &[ComponentSpec],
    ) -> Result<Vec<ComponentId>, WorkflowError> {
        let timer = OperationTimer::start("create_components");
        let result = self
            .transact("create_components", |tx| {
                let order = tx.require_order(kks)?.id;
                ProductionLine::new(tx).create_components(order, tree)
            })
            .instrument(info_span!("create_components", kks, roots = tree.len()))
            .await;
        timer.finish(result)
    }

    /// Creates the task chain of an existing component.
    ///
    /// # Errors
    ///
    /// See [`ProductionLine::create_chain`].
    pub async fn create_chain(
        &self,
        component: ComponentId,
        process: &TechProcess,
    ) -> Result<Vec<TaskId>, WorkflowError> {
        let timer = OperationTimer::start("create_chain");
        let result = self
            .transact("create_chain", |tx| {
                ProductionLine::new(tx).create_chain(component, process.areas())
            })
            .instrument(info_span!("create_chain", component = %component, process = %process))
            .await;
        timer.finish(result)
    }

    /// Moves a task to another status on behalf of `user`.
    ///
    /// # Errors
    ///
    /// See [`ProductionLine::advance_task`].
    pub async fn advance_task(
        &self,
        task: TaskId,
        status_id: u32,
        user: &UserId,
    ) -> Result<TaskAdvance, WorkflowError> {
        let timer = OperationTimer::start("advance_task");
        let result = self
            .transact("advance_task", |tx| {
                ProductionLine::new(tx).advance_task(task, status_id, user)
            })
            .instrument(info_span!("advance_task", task = %task, status_id, user = %user))
            .await;
        timer.finish(result)
    }

    /// Returns the available tasks in an area.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Unavailable`] if the store cannot be read.
    pub async fn visible_tasks(&self, area: AreaId) -> Result<Vec<ProductionTask>, WorkflowError> {
        self.read(|tx| Ok(visible_tasks(tx, area).cloned().collect()))
            .await
    }

    /// Returns the available tasks in the area `user` works in.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Forbidden`] if the user has no area.
    pub async fn tasks_for_user(&self, user: &UserId) -> Result<Vec<ProductionTask>, WorkflowError> {
        let area = self
            .identity
            .area_of(user)
            .ok_or_else(|| WorkflowError::forbidden(format!("'{user}' has no shop-floor area")))?;
        self.visible_tasks(area).await
    }

    /// Returns the components of an order in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] for an unknown KKS.
    pub async fn components(&self, kks: &str) -> Result<Vec<Component>, WorkflowError> {
        self.read(|tx| {
            let order = tx.require_order(kks)?.id;
            Ok(tx.components_of(order).cloned().collect())
        })
        .await
    }

    /// Returns a task by id.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] for an unknown task.
    pub async fn task(&self, task: TaskId) -> Result<ProductionTask, WorkflowError> {
        self.read(|tx| {
            tx.task(task)
                .cloned()
                .ok_or_else(|| WorkflowError::not_found(RecordKind::Task, task))
        })
        .await
    }

    /// Returns the task chain of a component, first task first.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] for an unknown component.
    pub async fn chain_of(&self, component: ComponentId) -> Result<Vec<ProductionTask>, WorkflowError> {
        self.read(|tx| {
            if tx.component(component).is_none() {
                return Err(WorkflowError::not_found(RecordKind::Component, component));
            }
            let mut chain = Vec::new();
            let mut next = tx.root_task(component).map(|t| t.id);
            while let Some(id) = next {
                let Some(task) = tx.task(id) else { break };
                next = task.child_task;
                chain.push(task.clone());
            }
            Ok(chain)
        })
        .await
    }

    /// Returns an id to name map of task statuses.
    #[must_use]
    pub fn list_statuses(&self) -> BTreeMap<u32, &'static str> {
        TaskStatus::ALL.iter().map(|s| (s.id(), s.name())).collect()
    }
}
