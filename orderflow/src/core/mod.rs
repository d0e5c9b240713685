//! Core domain model types for orderflow.
//!
//! This module contains the record types shared by every engine:
//! - Typed ids for orders, stages, artifacts, components, tasks and users
//! - Stage state and task status enums
//! - Artifacts and workflow events

mod artifact;
mod event;
mod ids;
mod status;

pub use artifact::{Artifact, ArtifactRef};
pub use event::{kinds as event_kinds, WorkflowEvent};
pub use ids::{AreaId, ArtifactId, ComponentId, OrderId, StageId, TaskId, UserId, UserRef};
pub use status::{StageState, TaskStatus};
