//! Shop-floor production: component trees and their task chains.
//!
//! Each component owns a linear chain of tasks, one per area of its
//! technological process. A chain opens once every sub-component of its
//! component is developed; finishing the last task develops the component.

mod chain;
mod process;
mod record;

pub use chain::{visible_tasks, ComponentSpec, ProductionLine, TaskAdvance};
pub use process::TechProcess;
pub use record::{Component, ProductionTask};
