//! Tracing setup and operation timing.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::WorkflowError;

fn default_level() -> String {
    "info".to_string()
}

/// Subscriber configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl TracingConfig {
    /// Sets the default filter.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Switches to JSON output.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Errors
///
/// Returns [`WorkflowError::Config`] for an invalid filter or if a global
/// subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), WorkflowError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| WorkflowError::Config(format!("invalid log filter: {e}")))?,
    };

    let builder = fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| WorkflowError::Config(format!("tracing already initialised: {e}")))
}

/// Measures one engine operation.
#[derive(Debug)]
pub struct OperationTimer {
    start: Instant,
    operation: &'static str,
}

impl OperationTimer {
    /// Starts timing `operation`.
    #[must_use]
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Logs the outcome of the operation and returns it unchanged.
    pub fn finish<T>(self, result: Result<T, WorkflowError>) -> Result<T, WorkflowError> {
        let duration_ms = self.elapsed_ms();
        match &result {
            Ok(_) => tracing::debug!(operation = self.operation, duration_ms, "Operation succeeded"),
            Err(err) if err.is_retryable() => {
                tracing::warn!(operation = self.operation, duration_ms, error = %err, "Operation failed");
            }
            Err(err) => {
                tracing::info!(
                    operation = self.operation,
                    duration_ms,
                    kind = err.kind(),
                    error = %err,
                    "Operation rejected"
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_passes_result_through() {
        let timer = OperationTimer::start("complete_stage");
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(timer.elapsed_ms() >= 2.0);

        let ok: Result<u8, WorkflowError> = timer.finish(Ok(1));
        assert_eq!(ok.unwrap(), 1);

        let err = OperationTimer::start("advance_task")
            .finish::<()>(Err(WorkflowError::InvalidStatus(9)))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidStatus");
    }

    #[test]
    fn test_tracing_config_from_json() {
        let config: TracingConfig = serde_json::from_str(r#"{"json": true}"#).unwrap();
        assert_eq!(config.level, "info");
        assert!(config.json);
        assert_eq!(TracingConfig::default().with_level("debug").json(), TracingConfig {
            level: "debug".to_string(),
            json: true,
        });
    }

    #[test]
    fn test_init_rejects_bad_filter_or_second_install() {
        let first = init_tracing(&TracingConfig::default().with_level("warn"));
        let second = init_tracing(&TracingConfig::default());
        assert!(first.is_ok() || second.is_err());
        assert!(second.is_err());
    }
}
