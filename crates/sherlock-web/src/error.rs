//! Error types for the web layer.
//!
//! The `Display` text of each variant is the plain-text body sent to the
//! client, so the wording here is user-facing.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sherlock_engine::{EngineError, JobError};
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Username empty after trimming
    #[error("Username vide.")]
    EmptyUsername,

    /// Configured image is neither present nor pullable
    #[error("Image introuvable: {image}. Faites `docker pull {image}` ou définissez SHERLOCK_IMAGE sur votre image buildée.")]
    ImageNotFound { image: String },

    /// Docker answered with an error status
    #[error("Erreur Docker API: {explanation}")]
    EngineApi { explanation: String },

    /// Any other engine failure
    #[error("Erreur: {0}")]
    Engine(EngineError),

    /// IO error
    #[error("Erreur: {0}")]
    Io(#[from] std::io::Error),

    /// Server configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServerError {
    /// Create a new configuration error.
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::EmptyUsername => 400,
            ServerError::ImageNotFound { .. }
            | ServerError::EngineApi { .. }
            | ServerError::Engine(_)
            | ServerError::Io(_)
            | ServerError::Config(_) => 500,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::EmptyUsername => "empty_username",
            ServerError::ImageNotFound { .. } => "image_not_found",
            ServerError::EngineApi { .. } => "engine_api_error",
            ServerError::Engine(_) => "engine_error",
            ServerError::Io(_) => "io_error",
            ServerError::Config(_) => "config_error",
        }
    }
}

impl From<JobError> for ServerError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::EmptyUsername => ServerError::EmptyUsername,
        }
    }
}

impl From<EngineError> for ServerError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ImageNotFound { image } => ServerError::ImageNotFound { image },
            EngineError::Api { explanation, .. } => ServerError::EngineApi { explanation },
            other => ServerError::Engine(other),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.to_string()).into_response()
    }
}
