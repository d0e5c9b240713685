//! Artifact records attached to order stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{ArtifactId, OrderId, StageId};

/// A file attached to a stage of an order.
///
/// Only the storage path and metadata are kept; the bytes live in the
/// artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Store-assigned id.
    pub id: ArtifactId,
    /// The owning order.
    pub order_id: OrderId,
    /// The stage the file was attached at.
    pub stage_id: StageId,
    /// Original file name.
    pub file_name: String,
    /// Path returned by the artifact store.
    pub path: String,
    /// When the file was attached.
    pub uploaded_at: DateTime<Utc>,
    /// Set when the gate rejected the order and this file must be redone.
    pub needs_rework: bool,
}

impl Artifact {
    /// Converts the artifact to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("filename".to_string(), serde_json::json!(self.file_name));
        map.insert("path".to_string(), serde_json::json!(self.path));
        map.insert("upload_date".to_string(), serde_json::json!(self.uploaded_at.to_rfc3339()));
        map.insert("is_needed_to_change".to_string(), serde_json::json!(self.needs_rework));
        map
    }
}

/// A file that has already been written to the artifact store and is about
/// to be recorded against a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Original file name.
    pub file_name: String,
    /// Path returned by the artifact store.
    pub path: String,
}

impl ArtifactRef {
    /// Creates a new artifact reference.
    pub fn new(file_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            path: path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_to_dict() {
        let artifact = Artifact {
            id: ArtifactId(1),
            order_id: OrderId(1),
            stage_id: StageId(2),
            file_name: "ti.pdf".to_string(),
            path: "PUMP-01/TIDev/ti.pdf".to_string(),
            uploaded_at: Utc::now(),
            needs_rework: true,
        };

        let dict = artifact.to_dict();
        assert_eq!(dict.get("filename").unwrap(), "ti.pdf");
        assert_eq!(dict.get("path").unwrap(), "PUMP-01/TIDev/ti.pdf");
        assert_eq!(dict.get("is_needed_to_change").unwrap(), true);
    }
}
