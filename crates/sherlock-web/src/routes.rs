//! HTTP route handlers.

use axum::extract::State;
use axum::response::{Html, Json};
use axum::Form;
use serde::{Deserialize, Serialize};
use sherlock_engine::{ExportFormat, SherlockJob};

use crate::error::{Result, ServerError};
use crate::AppState;

const INDEX_HTML: &str = include_str!("../templates/index.html");

/// Health check payload: `{"status":"ok","image":..}` or `{"status":"error","detail":..}`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthResponse {
    Ok { image: String },
    Error { detail: String },
}

/// Form fields posted to `/run`.
#[derive(Deserialize, Debug)]
pub struct RunForm {
    pub username: String,
    #[serde(default)]
    pub format: Option<String>,
}

/// GET /
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /health
///
/// Always 200; an unreachable engine is reported in the payload.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    match state.engine.ping().await {
        Ok(()) => Json(HealthResponse::Ok {
            image: state.settings.image.clone(),
        }),
        Err(e) => {
            log::warn!("Container engine health check failed: {}", e);
            Json(HealthResponse::Error {
                detail: e.to_string(),
            })
        }
    }
}

/// POST /run
pub async fn run(State(state): State<AppState>, Form(form): Form<RunForm>) -> Result<String> {
    let format = ExportFormat::from_form(form.format.as_deref());
    let job = SherlockJob::new(&form.username, format).map_err(|e| {
        log::warn!("Rejected run request: {}", e);
        ServerError::from(e)
    })?;

    let spec = job.container_spec(&state.settings.image, &state.settings.data_dir);
    log::info!(
        "Running {} with arguments: {}",
        state.settings.image,
        job.command_line()
    );

    match state.engine.run(&spec).await {
        Ok(output) => {
            log::info!(
                "Run for {} finished, {} bytes of output",
                job.username(),
                output.len()
            );
            Ok(decode_output(&output))
        }
        Err(e) => {
            log::error!("Run for {} failed: {}", job.username(), e);
            Err(e.into())
        }
    }
}

/// Decode container output as UTF-8, dropping bytes that are not valid.
fn decode_output(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}
