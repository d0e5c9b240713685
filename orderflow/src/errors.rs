//! Error types for the orderflow engine.
//!
//! Every engine operation returns [`WorkflowError`]. Failures are local to the
//! operation that produced them: a failed transaction is never committed, so the
//! caller always observes either the full effect of an operation or none of it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The kind of record an id refers to, used in [`WorkflowError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// An order (looked up by id or KKS).
    Order,
    /// A stage definition or per-order stage instance.
    Stage,
    /// A production task.
    Task,
    /// A component of an order's component tree.
    Component,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Order => write!(f, "order"),
            Self::Stage => write!(f, "stage"),
            Self::Task => write!(f, "task"),
            Self::Component => write!(f, "component"),
        }
    }
}

/// The main error type for orderflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// An order, stage, task or component id is unknown.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up.
        kind: RecordKind,
        /// The id (or business key) that was not found.
        id: String,
    },

    /// The acting user does not own the target instance or task.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested state change is not allowed from the current state.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// No assignee could be resolved for a stage that requires one.
    #[error("No responsible user for stage '{stage}'")]
    ResponsibilityMissing {
        /// The stage name.
        stage: String,
    },

    /// A task status id that does not exist.
    #[error("Invalid task status id: {0}")]
    InvalidStatus(u32),

    /// A record with the same business key already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A malformed argument (blank key, bad page number, bad process string).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A concurrent transaction changed the data this one depends on.
    #[error("Conflict, retry the operation: {0}")]
    ConflictRetry(String),

    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The stage graph definition is invalid.
    #[error("{0}")]
    GraphValidation(#[from] GraphValidationError),

    /// The configuration could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkflowError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(kind: RecordKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Creates a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Creates an invalid transition error.
    #[must_use]
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition(message.into())
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns the stable label for this error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::Forbidden(_) => "Forbidden",
            Self::InvalidTransition(_) => "InvalidTransition",
            Self::ResponsibilityMissing { .. } => "ResponsibilityMissing",
            Self::InvalidStatus(_) => "InvalidStatus",
            Self::AlreadyExists(_) => "AlreadyExists",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::ConflictRetry(_) => "ConflictRetry",
            Self::Unavailable(_) => "Unavailable",
            Self::GraphValidation(_) => "GraphValidation",
            Self::Config(_) => "Config",
        }
    }

    /// Returns true if repeating the operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConflictRetry(_) | Self::Unavailable(_))
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));

        match self {
            Self::NotFound { kind, id } => {
                map.insert("record".to_string(), serde_json::json!(kind.to_string()));
                map.insert("id".to_string(), serde_json::json!(id));
            }
            Self::ResponsibilityMissing { stage } => {
                map.insert("stage".to_string(), serde_json::json!(stage));
            }
            Self::GraphValidation(err) => {
                let inner: serde_json::Map<String, serde_json::Value> =
                    err.to_dict().into_iter().collect();
                map.insert("details".to_string(), serde_json::Value::Object(inner));
            }
            _ => {}
        }

        map
    }
}

/// Metadata about a graph validation error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphErrorInfo {
    /// Error code (e.g., "GRAPH-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl GraphErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::Value::String(self.code.clone()));
        map.insert("summary".to_string(), serde_json::Value::String(self.summary.clone()));

        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::Value::String(hint.clone()));
        }
        if !self.context.is_empty() {
            let context_map: serde_json::Map<String, serde_json::Value> = self
                .context
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            map.insert("context".to_string(), serde_json::Value::Object(context_map));
        }

        map
    }
}

/// Error raised when a stage graph definition is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GraphValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional structured error info.
    pub error_info: Option<GraphErrorInfo>,
}

impl GraphValidationError {
    /// Creates a new graph validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the error info.
    #[must_use]
    pub fn with_error_info(mut self, info: GraphErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::Value::String(self.message.clone()));
        map.insert(
            "stages".to_string(),
            serde_json::Value::Array(
                self.stages
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
        );
        if let Some(ref info) = self.error_info {
            let info_map: serde_json::Map<String, serde_json::Value> =
                info.to_dict().into_iter().collect();
            map.insert("error_info".to_string(), serde_json::Value::Object(info_map));
        }
        map
    }
}

/// Error raised when a parent chain loops back on itself.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in forest: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of nodes forming the cycle.
    pub cycle_path: Vec<String>,
    /// Structured error info.
    pub error_info: GraphErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = GraphErrorInfo::new(
            "GRAPH-004-CYCLE",
            format!("Parent chain contains a cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("A node may have at most one parent and must not be its own ancestor.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for GraphValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            stages: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

impl From<CycleDetectedError> for WorkflowError {
    fn from(err: CycleDetectedError) -> Self {
        Self::GraphValidation(err.into())
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(WorkflowError::not_found(RecordKind::Order, "PUMP-01").kind(), "NotFound");
        assert_eq!(WorkflowError::forbidden("x").kind(), "Forbidden");
        assert_eq!(WorkflowError::invalid_transition("x").kind(), "InvalidTransition");
        assert_eq!(
            WorkflowError::ResponsibilityMissing { stage: "TIDev".into() }.kind(),
            "ResponsibilityMissing"
        );
        assert_eq!(WorkflowError::ConflictRetry("x".into()).kind(), "ConflictRetry");
        assert_eq!(WorkflowError::Unavailable("x".into()).kind(), "Unavailable");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(WorkflowError::ConflictRetry("stale".into()).is_retryable());
        assert!(WorkflowError::Unavailable("down".into()).is_retryable());
        assert!(!WorkflowError::forbidden("nope").is_retryable());
        assert!(!WorkflowError::InvalidStatus(9).is_retryable());
    }

    #[test]
    fn test_not_found_to_dict() {
        let err = WorkflowError::not_found(RecordKind::Task, 42);
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "NotFound");
        assert_eq!(dict.get("record").unwrap(), "task");
        assert_eq!(dict.get("id").unwrap(), "42");
        assert_eq!(dict.get("retryable").unwrap(), false);
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> a"));
        assert_eq!(err.error_info.code, "GRAPH-004-CYCLE");

        let validation: GraphValidationError = err.into();
        assert_eq!(validation.code(), Some("GRAPH-004-CYCLE"));
        assert_eq!(validation.stages.len(), 3);
    }

    #[test]
    fn test_graph_validation_error_to_dict() {
        let err = GraphValidationError::new("bad graph")
            .with_stages(vec!["DDDev".to_string()])
            .with_error_info(GraphErrorInfo::new("GRAPH-005-ORDER", "order").with_fix_hint("fix"));

        let dict = WorkflowError::from(err).to_dict();
        assert_eq!(dict.get("type").unwrap(), "GraphValidation");
        assert!(dict.get("details").unwrap().get("error_info").is_some());
    }
}
