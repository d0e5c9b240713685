//! # Orderflow
//!
//! A dependency-gated workflow engine for staged orders and shop-floor
//! production tasks.
//!
//! Orders move through a fixed graph of stages. A stage with children is
//! completed automatically once all of its children are, and one stage acts
//! as an approval gate that can send the order back for rework. Orders are
//! then broken down into a component tree; every component gets a chain of
//! tasks, one per shop-floor area, and a component's chain starts only once
//! all of its sub-components are developed.
//!
//! - **Stage graph**: validated stage definitions with fan-out and a gate
//! - **Transactions**: every operation commits atomically or not at all
//! - **Ownership**: stages are assigned to users; only they or an admin act
//! - **Observability**: tracing spans per operation and post-commit events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use orderflow::prelude::*;
//!
//! let engine = WorkflowEngine::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(directory),
//!     Arc::new(InMemoryArtifactStore::new()),
//! );
//!
//! let request = CreateOrder::new("PUMP-01", "Feed pump")
//!     .with_file(ArtifactUpload::new("request.pdf", bytes));
//! engine.create_order(request).await?;
//! engine.complete_stage("PUMP-01", StageId(2), &UserId::from("technologist"), None).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifacts;
pub mod config;
pub mod core;
pub mod engine;
pub mod errors;
pub mod events;
pub mod forest;
pub mod graph;
pub mod identity;
pub mod observability;
pub mod production;
pub mod retry;
pub mod store;
pub mod testing;
pub mod workflow;


/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifacts::{ArtifactStore, ArtifactUpload, InMemoryArtifactStore};
    pub use crate::config::EngineConfig;
    pub use crate::core::{
        AreaId, Artifact, ArtifactId, ArtifactRef, ComponentId, OrderId, StageId, StageState,
        TaskId, TaskStatus, UserId, UserRef, WorkflowEvent,
    };
    pub use crate::engine::{CreateOrder, WorkflowEngine};
    pub use crate::errors::{RecordKind, WorkflowError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::graph::{StageDef, StageGraph};
    pub use crate::identity::{Actor, Directory, DirectoryUser, IdentityProvider};
    pub use crate::observability::{init_tracing, TracingConfig};
    pub use crate::production::{ComponentSpec, ProductionTask, TaskAdvance, TechProcess};
    pub use crate::retry::RetryConfig;
    pub use crate::store::{InMemoryStore, WorkflowStore};
    pub use crate::workflow::{GateDecision, OrderProgress, StageCompletion, StageProgress};
}

/// Version of the orderflow library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
