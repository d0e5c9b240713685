//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::WorkflowError;
use crate::graph::{StageDef, StageGraph};
use crate::retry::RetryConfig;

/// Configuration for a [`WorkflowEngine`](crate::engine::WorkflowEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Orders per page in order listings.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Retry policy for conflicting transactions.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Custom stage graph. The standard pipeline is used when absent.
    #[serde(default)]
    pub stages: Option<Vec<StageDef>>,
}

fn default_page_size() -> usize {
    8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            retry: RetryConfig::default(),
            stages: None,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets a custom stage graph definition.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<StageDef>) -> Self {
        self.stages = Some(stages);
        self
    }

    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Config`] for malformed JSON or a zero page size.
    pub fn from_json_str(json: &str) -> Result<Self, WorkflowError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Config`] if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| WorkflowError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Config`] for a zero page size or zero attempts.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.page_size == 0 {
            return Err(WorkflowError::Config("page_size must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(WorkflowError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the configured stage graph.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::GraphValidation`] for an invalid definition.
    pub fn stage_graph(&self) -> Result<StageGraph, WorkflowError> {
        match &self.stages {
            Some(stages) => Ok(StageGraph::new(stages.clone())?),
            None => Ok(StageGraph::standard()),
        }
    }
}
