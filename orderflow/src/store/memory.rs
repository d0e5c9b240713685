//! In-memory record store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use super::{Records, Transaction, WorkflowStore};
use crate::errors::WorkflowError;

#[derive(Debug, Default)]
struct State {
    records: Records,
    version: u64,
}

/// In-memory store with optimistic, whole-store versioning.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the committed records.
    #[must_use]
    pub fn snapshot(&self) -> Records {
        self.state.read().records.clone()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn begin(&self) -> Result<Transaction, WorkflowError> {
        let state = self.state.read();
        Ok(Transaction::new(state.records.clone(), state.version))
    }

    async fn commit(&self, tx: Transaction) -> Result<(), WorkflowError> {
        if !tx.is_dirty() {
            return Ok(());
        }

        let mut state = self.state.write();
        if state.version != tx.base_version() {
            debug!(
                tx = %tx.id(),
                base = tx.base_version(),
                current = state.version,
                "Commit rejected: store changed"
            );
            return Err(WorkflowError::ConflictRetry(format!(
                "store moved from version {} to {}",
                tx.base_version(),
                state.version
            )));
        }

        state.records = tx.into_records();
        state.version += 1;
        Ok(())
    }

    async fn version(&self) -> Result<u64, WorkflowError> {
        Ok(self.state.read().version)
    }
}
