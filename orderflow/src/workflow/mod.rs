//! Order workflows over the stage graph.
//!
//! An order gets one [`StageInstance`] per stage of the graph. Leaf stages are
//! completed by their assignees; fan-out parents complete through
//! propagation; the gate stage either approves the order or rolls it back.
//! All operations here run inside a [`Transaction`](crate::store::Transaction)
//! and queue their events on it.

mod gate;
mod order;
mod progress;
mod propagation;
mod record;
pub mod report;

pub use gate::GateDecision;
pub use order::{NewOrder, OrderWorkflow, StageCompletion};
pub use progress::{OrderProgress, StageProgress};
pub use record::{Order, StageInstance};
pub use report::{ArtifactStatus, OrderArtifacts, OrderStatistics, StageCount};

pub(crate) use progress::current_stage;
