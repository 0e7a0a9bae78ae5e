//! Container execution core for sherlock lookups.
//!
//! Turns a username and export format into a validated [`SherlockJob`], renders
//! it as a [`ContainerSpec`] whose command is an argument vector, and runs it
//! through a [`ContainerEngine`]. [`DockerEngine`] talks to the Docker Engine
//! API; anything else implementing the trait can stand in for it.

pub mod docker;
pub mod engine;
pub mod errors;
pub mod job;

pub use docker::DockerEngine;
pub use engine::{ContainerEngine, ContainerSpec, VolumeBind};
pub use errors::{EngineError, JobError};
pub use job::{sanitize_username, ExportFormat, SherlockJob, CONTAINER_DATA_DIR};
