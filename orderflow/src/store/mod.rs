//! Persistence for orders, stage instances, artifacts, components and tasks.
//!
//! Every state-changing operation runs against a [`Transaction`]: a private
//! working set taken from the store by [`WorkflowStore::begin`] and written
//! back as a whole by [`WorkflowStore::commit`]. Commit is optimistic and
//! fails with [`WorkflowError::ConflictRetry`] when another transaction
//! committed in between.

mod memory;
mod transaction;

pub use memory::InMemoryStore;
pub use transaction::{Records, Transaction};

use async_trait::async_trait;

use crate::errors::WorkflowError;

/// Storage backend for workflow records.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Starts a transaction over the current state.
    async fn begin(&self) -> Result<Transaction, WorkflowError>;

    /// Atomically publishes a transaction's working set.
    ///
    /// A transaction that wrote nothing commits trivially.
    async fn commit(&self, tx: Transaction) -> Result<(), WorkflowError>;

    /// Returns the number of successful writing commits so far.
    async fn version(&self) -> Result<u64, WorkflowError>;
}
