//! Storage for the bytes behind artifacts.
//!
//! The engine only records paths. An [`ArtifactStore`] owns the bytes and
//! decides where they live; the default layout is `{kks}/{stage}/{file}`.

mod memory;

pub use memory::{InMemoryArtifactStore, StoredObject};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;

/// A file handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactUpload {
    /// Original file name.
    pub file_name: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl ArtifactUpload {
    /// Creates an upload.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Returns the default storage path of a file.
#[must_use]
pub fn artifact_path(kks: &str, stage: &str, file_name: &str) -> String {
    format!("{kks}/{stage}/{file_name}")
}

/// Byte storage for artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores a file and returns its path.
    ///
    /// An existing object is never replaced: when the default path is
    /// taken the file goes under a fresh unique name instead.
    async fn put(
        &self,
        kks: &str,
        stage: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, WorkflowError>;

    /// Removes stored files. Unknown paths are ignored.
    async fn remove(&self, paths: &[String]) -> Result<(), WorkflowError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path_layout() {
        assert_eq!(artifact_path("PUMP-01", "TIDev", "ti.pdf"), "PUMP-01/TIDev/ti.pdf");
    }

    #[test]
    fn test_store_through_trait_object() {
        let memory = InMemoryArtifactStore::new();
        let store: &dyn ArtifactStore = &memory;

        let path = tokio_test::block_on(store.put("PUMP-01", "SpecDev", "spec.xlsx", vec![0; 4]))
            .unwrap();
        assert!(memory.contains(&path));

        tokio_test::block_on(store.remove(&[path.clone()])).unwrap();
        assert!(!memory.contains(&path));
    }
}
