//! Container engine abstraction.
//!
//! The web layer only ever talks to a `ContainerEngine`; the Docker-backed
//! implementation lives in [`crate::docker`] and tests substitute their own.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::errors::EngineError;

/// A host directory bound into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBind {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

impl VolumeBind {
    pub fn read_write(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: false,
        }
    }

    /// Docker bind syntax: `<host>:<container>:rw|ro`.
    pub fn to_bind_string(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host_path.display(),
            self.container_path,
            if self.read_only { "ro" } else { "rw" }
        )
    }
}

/// Everything needed to run one container to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    /// Passed as the container command, one argv element each.
    pub args: Vec<String>,
    pub volumes: Vec<VolumeBind>,
    /// Remove the container once its output has been collected.
    pub remove: bool,
    pub tty: bool,
    pub stdin_open: bool,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check that the engine answers.
    async fn ping(&self) -> Result<(), EngineError>;

    /// Run a container until it exits and return its stdout.
    ///
    /// A non-zero exit is an error carrying the container's stderr.
    async fn run(&self, spec: &ContainerSpec) -> Result<Vec<u8>, EngineError>;

    /// Short label used in startup logs.
    fn describe(&self) -> String {
        "container engine".to_string()
    }
}
