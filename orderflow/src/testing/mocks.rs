//! Store doubles that fail on demand.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::WorkflowError;
use crate::store::{InMemoryStore, Transaction, WorkflowStore};

/// A store that is always down.
#[derive(Debug, Default)]
pub struct UnavailableStore {
    attempts: AtomicUsize,
}

impl UnavailableStore {
    /// Creates the store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many transactions were requested.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowStore for UnavailableStore {
    async fn begin(&self) -> Result<Transaction, WorkflowError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(WorkflowError::Unavailable("store is down".to_string()))
    }

    async fn commit(&self, _tx: Transaction) -> Result<(), WorkflowError> {
        Err(WorkflowError::Unavailable("store is down".to_string()))
    }

    async fn version(&self) -> Result<u64, WorkflowError> {
        Err(WorkflowError::Unavailable("store is down".to_string()))
    }
}

/// Wraps an [`InMemoryStore`] and rejects the first `n` commits as
/// conflicting.
#[derive(Debug)]
pub struct ConflictingStore {
    inner: Arc<InMemoryStore>,
    remaining: AtomicUsize,
    commits: AtomicUsize,
}

impl ConflictingStore {
    /// Rejects the first `conflicts` commits to `inner`.
    #[must_use]
    pub fn new(inner: Arc<InMemoryStore>, conflicts: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(conflicts),
            commits: AtomicUsize::new(0),
        }
    }

    /// Returns how many commits were attempted.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowStore for ConflictingStore {
    async fn begin(&self) -> Result<Transaction, WorkflowError> {
        self.inner.begin().await
    }

    async fn commit(&self, tx: Transaction) -> Result<(), WorkflowError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let conflict = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict {
            return Err(WorkflowError::ConflictRetry(format!(
                "injected conflict on transaction {}",
                tx.id()
            )));
        }
        self.inner.commit(tx).await
    }

    async fn version(&self) -> Result<u64, WorkflowError> {
        self.inner.version().await
    }
}
