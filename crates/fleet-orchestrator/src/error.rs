//! Error types for the fleet orchestrator.
//!
//! Failures are categorized by where they surface: worker HTTP calls,
//! worker process management, lobby scheduling, configuration, or the
//! orchestrator's own plumbing. None of these crash the orchestrator;
//! callers log and continue, or report a gateway failure to the client.

use thiserror::Error;

/// Errors that can occur during orchestrator operation.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Network-level failures: listener setup, upstream connections,
    /// or failed/timed-out HTTP calls to a worker.
    #[error("Network error: {0}")]
    Network(String),

    /// Worker process lifecycle failures (spawn, control channel).
    #[error("Worker error: {0}")]
    Worker(String),

    /// A create-lobby call was rejected or errored. The scheduling loop
    /// continues on the next tick.
    #[error("Scheduling failed: {0}")]
    Scheduling(String),

    /// Invalid or inconsistent configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal orchestrator errors that don't fit the other categories.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for FleetError {
    fn from(err: std::io::Error) -> Self {
        FleetError::Network(err.to_string())
    }
}

impl From<reqwest::Error> for FleetError {
    fn from(err: reqwest::Error) -> Self {
        FleetError::Network(err.to_string())
    }
}
