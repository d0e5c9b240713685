//! In-memory artifact store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use super::{artifact_path, ArtifactStore};
use crate::errors::WorkflowError;

/// A stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// File contents.
    pub bytes: Vec<u8>,
    /// Hex-encoded SHA-256 of the contents.
    pub digest: String,
    /// When the object was written.
    pub stored_at: DateTime<Utc>,
}

/// Artifact store backed by a concurrent map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryArtifactStore {
    objects: Arc<DashMap<String, StoredObject>>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a stored object.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<StoredObject> {
        self.objects.get(path).map(|o| o.clone())
    }

    /// Returns true if `path` is stored.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.objects.contains_key(path)
    }

    /// Returns the number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(
        &self,
        kks: &str,
        stage: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, WorkflowError> {
        if file_name.is_empty() || file_name.contains('/') {
            return Err(WorkflowError::invalid_argument(format!(
                "invalid file name '{file_name}'"
            )));
        }

        let digest = hex::encode(Sha256::digest(&bytes));
        let size = bytes.len();
        let object = StoredObject {
            bytes,
            digest,
            stored_at: Utc::now(),
        };

        let mut path = artifact_path(kks, stage, file_name);
        loop {
            match self.objects.entry(path) {
                Entry::Vacant(slot) => {
                    let path = slot.key().clone();
                    tracing::trace!(path = %path, digest = %object.digest, size, "Stored artifact");
                    slot.insert(object);
                    return Ok(path);
                }
                Entry::Occupied(_) => {
                    let unique = format!("{}-{file_name}", Uuid::now_v7().simple());
                    path = artifact_path(kks, stage, &unique);
                }
            }
        }
    }

    async fn remove(&self, paths: &[String]) -> Result<(), WorkflowError> {
        for path in paths {
            self.objects.remove(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_records_digest() {
        let store = InMemoryArtifactStore::new();
        let path = store
            .put("PUMP-01", "Entry", "spec.txt", b"hello".to_vec())
            .await
            .unwrap();

        assert_eq!(path, "PUMP-01/Entry/spec.txt");
        let object = store.get(&path).unwrap();
        assert_eq!(
            object.digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(object.bytes, b"hello");
    }

    #[tokio::test]
    async fn test_put_rejects_bad_names() {
        let store = InMemoryArtifactStore::new();
        for name in ["", "../etc/passwd"] {
            assert!(store.put("K", "Entry", name, Vec::new()).await.is_err());
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_put_never_overwrites() {
        let store = InMemoryArtifactStore::new();
        let first = store.put("K", "Entry", "ti.pdf", b"v1".to_vec()).await.unwrap();
        let second = store.put("K", "Entry", "ti.pdf", b"v2".to_vec()).await.unwrap();

        assert_eq!(first, "K/Entry/ti.pdf");
        assert_ne!(first, second);
        assert!(second.starts_with("K/Entry/") && second.ends_with("-ti.pdf"));
        assert_eq!(store.get(&first).unwrap().bytes, b"v1");
        assert_eq!(store.get(&second).unwrap().bytes, b"v2");
    }

    #[tokio::test]
    async fn test_remove_ignores_unknown_paths() {
        let store = InMemoryArtifactStore::new();
        let path = store.put("K", "Entry", "a", vec![1]).await.unwrap();

        store
            .remove(&[path.clone(), "K/Entry/missing".to_string()])
            .await
            .unwrap();

        assert!(!store.contains(&path));
        assert_eq!(store.len(), 0);
    }
}
