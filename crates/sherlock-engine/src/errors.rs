//! Error types for job validation and container engine failures.

use std::time::Duration;
use thiserror::Error;

/// Rejections raised while turning form input into a runnable job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("username is empty after trimming")]
    EmptyUsername,
}

// Faults raised by a container engine while running a job
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("image not found: {image}")]
    ImageNotFound { image: String },
    #[error("Docker API error ({status_code}): {explanation}")]
    Api { status_code: u16, explanation: String },
    #[error("container exited with code {exit_code}: {stderr}")]
    ContainerFailed { exit_code: i64, stderr: String },
    #[error("container run timed out after {0:?}")]
    Timeout(Duration),
    #[error("Bollard (Docker client) error: {0}")]
    Client(#[from] bollard::errors::Error),
    #[error("container wait stream ended unexpectedly")]
    WaitStreamEnded,
}

impl EngineError {
    /// Build an API fault from an engine status code and message.
    pub fn api(status_code: u16, explanation: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            explanation: explanation.into(),
        }
    }

    /// Engine-provided explanation for API faults.
    pub fn explanation(&self) -> Option<&str> {
        match self {
            EngineError::Api { explanation, .. } => Some(explanation),
            _ => None,
        }
    }
}
