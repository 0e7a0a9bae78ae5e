//! Web front for running sherlock in a container.
//!
//! Three routes: the form at `/`, an engine check at `/health`, and `/run`,
//! which validates the form, runs the configured image through a
//! [`ContainerEngine`] and answers with the container's output as plain text.

pub mod error;
pub mod routes;

pub use error::{Result, ServerError};
pub use routes::{HealthResponse, RunForm};

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use sherlock_engine::ContainerEngine;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Default image reference when `SHERLOCK_IMAGE` is unset.
pub const DEFAULT_IMAGE: &str = "sherlock/sherlock:latest";

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Enable request logging
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            max_body_size: 16 * 1024,
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e)))?;
        Ok(self)
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

/// What every run uses: the image and the host directory mounted at `/data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub image: String,
    /// Absolute host path, bound read-write into each container.
    pub data_dir: PathBuf,
}

impl RunSettings {
    pub fn new(image: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Create the data directory if needed and resolve it to an absolute path,
    /// which Docker requires for bind mounts.
    pub async fn prepare(image: impl Into<String>, data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let data_dir = tokio::fs::canonicalize(data_dir).await?;
        Ok(Self::new(image, data_dir))
    }
}

/// Shared application state. Built once at startup and never mutated.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn ContainerEngine>,
    pub settings: Arc<RunSettings>,
}

/// The sherlock web server.
pub struct SherlockServer {
    state: AppState,
    config: ServerConfig,
}

impl SherlockServer {
    /// Create a new server with the given engine and default configuration.
    pub fn new(engine: Arc<dyn ContainerEngine>, settings: RunSettings) -> Self {
        Self::with_config(engine, settings, ServerConfig::default())
    }

    pub fn with_config(
        engine: Arc<dyn ContainerEngine>,
        settings: RunSettings,
        config: ServerConfig,
    ) -> Self {
        Self {
            state: AppState {
                engine,
                settings: Arc::new(settings),
            },
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn settings(&self) -> &RunSettings {
        &self.state.settings
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/", get(routes::index))
            .route("/health", get(routes::health))
            .route("/run", post(routes::run))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(self.state.clone());

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(log_requests));
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Start the server and shut down when `shutdown_signal` resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!("sherlock-web listening on http://{}", self.config.bind_addr);
        log::info!("Health check: http://{}/health", self.config.bind_addr);
        log::info!(
            "Image: {}, data directory: {}",
            self.state.settings.image,
            self.state.settings.data_dir.display()
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        log::info!("sherlock-web shut down gracefully");
        Ok(())
    }
}

async fn log_requests(
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    // Health checks are frequent; keep them out of the info stream
    let quiet = uri.path() == "/health";

    if quiet {
        log::debug!("Request {} {} {}", request_id, method, uri);
    } else {
        log::info!("Request {} {} {}", request_id, method, uri);
    }

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed();

    if quiet {
        log::debug!(
            "Response {} {} completed in {:?}",
            request_id,
            response.status(),
            duration
        );
    } else {
        log::info!(
            "Response {} {} completed in {:?}",
            request_id,
            response.status(),
            duration
        );
    }

    response
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
