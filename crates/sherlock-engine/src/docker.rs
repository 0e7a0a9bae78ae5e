//! Docker Engine implementation of [`ContainerEngine`] using bollard.

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    CreateImageOptions as BollardCreateImageOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    StopContainerOptions as BollardStopContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::time::Duration;
use uuid::Uuid;

use crate::engine::{ContainerEngine, ContainerSpec};
use crate::errors::EngineError;

/// Runs sherlock containers against a Docker daemon.
pub struct DockerEngine {
    docker: Docker,
    run_timeout: Option<Duration>,
    pull_missing: bool,
}

impl DockerEngine {
    /// Connect the way the docker CLI does: `DOCKER_HOST` (`unix://`, `tcp://`,
    /// `http://`) or the default unix socket.
    ///
    /// Only the client is built here; the daemon is first contacted on `ping`
    /// or `run`.
    pub fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_defaults()?;
        Ok(Self::from_client(docker))
    }

    /// Wrap an already configured client.
    pub fn from_client(docker: Docker) -> Self {
        Self {
            docker,
            run_timeout: None,
            pull_missing: true,
        }
    }

    /// Bound every run by `timeout`. `None` waits for as long as the container runs.
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Pull the image when the daemon reports it missing, then retry the create once.
    pub fn with_pull_missing(mut self, pull_missing: bool) -> Self {
        self.pull_missing = pull_missing;
        self
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout
    }

    pub fn pull_missing(&self) -> bool {
        self.pull_missing
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        match self.try_create(spec).await {
            Err(err) if is_missing_image(&err) => {
                if !self.pull_missing {
                    return Err(EngineError::ImageNotFound {
                        image: spec.image.clone(),
                    });
                }
                log::info!("Image {} not present locally, pulling", spec.image);
                self.pull_image(&spec.image).await?;
                self.try_create(spec).await.map_err(|err| {
                    if is_missing_image(&err) {
                        EngineError::ImageNotFound {
                            image: spec.image.clone(),
                        }
                    } else {
                        classify(err)
                    }
                })
            }
            Err(err) => Err(classify(err)),
            Ok(id) => Ok(id),
        }
    }

    async fn try_create(&self, spec: &ContainerSpec) -> Result<String, BollardError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(format!("sherlock-{}", Uuid::new_v4())),
            ..Default::default()
        });

        let binds: Vec<String> = spec.volumes.iter().map(|v| v.to_bind_string()).collect();
        let config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.args.clone()),
            tty: Some(spec.tty),
            open_stdin: Some(spec.stdin_open),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(HostConfig {
                binds: if binds.is_empty() { None } else { Some(binds) },
                ..Default::default()
            }),
            ..Default::default()
        };

        let container = self.docker.create_container(options, config).await?;
        Ok(container.id)
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        let (from_image, tag) = split_image_reference(image);
        let options = Some(BollardCreateImageOptionsQuery {
            from_image: Some(from_image),
            tag,
            ..Default::default()
        });

        let mut pull_stream = self.docker.create_image(options, None, None);
        while let Some(progress) = pull_stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        log::debug!("Pull {}: {}", image, status);
                    }
                }
                Err(err) => {
                    log::warn!("Failed to pull image {}: {}", image, err);
                    return Err(classify_pull_error(err, image));
                }
            }
        }

        log::info!("Pulled image {}", image);
        Ok(())
    }

    async fn wait_for_exit(&self, container_id: &str) -> Result<i64, EngineError> {
        let mut wait_stream = self
            .docker
            .wait_container(container_id, None::<BollardWaitContainerOptionsQuery>);

        match wait_stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(err)) => Err(classify(err)),
            None => Err(EngineError::WaitStreamEnded),
        }
    }

    async fn collect_logs(
        &self,
        container_id: &str,
        stdout: bool,
        stderr: bool,
    ) -> Result<Vec<u8>, EngineError> {
        let mut output_stream = self.docker.logs(
            container_id,
            Some(BollardLogsOptionsQuery {
                stdout,
                stderr,
                ..Default::default()
            }),
        );

        let mut output = Vec::new();
        while let Some(log_result) = output_stream.next().await {
            match log_result.map_err(classify)? {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message } => output.extend_from_slice(&message),
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok(output)
    }

    async fn run_created(&self, container_id: &str) -> Result<Vec<u8>, EngineError> {
        self.docker
            .start_container(container_id, None::<BollardStartContainerOptionsQuery>)
            .await
            .map_err(classify)?;

        let deadline = async {
            match self.run_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let exit_code = tokio::select! {
            res = self.wait_for_exit(container_id) => res?,
            _ = deadline => {
                log::warn!("Execution timed out for container {}", container_id);
                if let Err(e) = self
                    .docker
                    .stop_container(container_id, None::<BollardStopContainerOptionsQuery>)
                    .await
                {
                    log::warn!("Failed to stop container {}: {}", container_id, e);
                }
                // run_timeout is always set when the deadline fires
                return Err(EngineError::Timeout(self.run_timeout.unwrap_or_default()));
            }
        };

        if exit_code != 0 {
            let stderr = self.collect_logs(container_id, false, true).await?;
            return Err(EngineError::ContainerFailed {
                exit_code,
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }

        self.collect_logs(container_id, true, false).await
    }
}

async fn remove_container(docker: &Docker, container_id: &str) {
    let options = Some(BollardRemoveContainerOptionsQuery {
        force: true,
        ..Default::default()
    });
    match docker.remove_container(container_id, options).await {
        Ok(()) => log::debug!("Removed container {}", container_id),
        Err(e) => log::warn!("Failed to remove container {}: {}", container_id, e),
    }
}

/// Force-removes the container if the run is dropped before it finishes,
/// e.g. when the HTTP client disconnects mid-run.
struct RemoveOnDrop {
    docker: Docker,
    container_id: Option<String>,
}

impl RemoveOnDrop {
    fn new(docker: &Docker, container_id: &str) -> Self {
        Self {
            docker: docker.clone(),
            container_id: Some(container_id.to_string()),
        }
    }

    /// Remove now, then disarm. Still armed while the removal is in flight.
    async fn remove(mut self) {
        if let Some(container_id) = self.container_id.clone() {
            remove_container(&self.docker, &container_id).await;
        }
        self.container_id = None;
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        let Some(container_id) = self.container_id.take() else {
            return;
        };
        log::warn!("Run for container {} was cancelled, removing it", container_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let docker = self.docker.clone();
                handle.spawn(async move {
                    remove_container(&docker, &container_id).await;
                });
            }
            Err(_) => log::warn!(
                "No runtime available to remove container {}",
                container_id
            ),
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<Vec<u8>, EngineError> {
        let container_id = self.create(spec).await?;
        log::debug!("Created container {} from {}", container_id, spec.image);

        let guard = spec
            .remove
            .then(|| RemoveOnDrop::new(&self.docker, &container_id));

        let result = self.run_created(&container_id).await;

        if let Some(guard) = guard {
            guard.remove().await;
        }

        result
    }

    fn describe(&self) -> String {
        match self.run_timeout {
            Some(limit) => format!("Docker Engine (run timeout {:?})", limit),
            None => "Docker Engine (no run timeout)".to_string(),
        }
    }
}

/// Split an image reference into the `fromImage` and `tag` pull parameters.
///
/// A reference without a tag pulls `latest`; digest references are passed through whole.
fn split_image_reference(image: &str) -> (String, Option<String>) {
    if image.contains('@') {
        return (image.to_string(), None);
    }

    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(offset) => {
            let split = name_start + offset;
            (
                image[..split].to_string(),
                Some(image[split + 1..].to_string()),
            )
        }
        None => (image.to_string(), Some("latest".to_string())),
    }
}

fn is_missing_image(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn classify(err: BollardError) -> EngineError {
    match err {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => EngineError::api(status_code, message),
        other => EngineError::Client(other),
    }
}

fn classify_pull_error(err: BollardError, image: &str) -> EngineError {
    let missing = match &err {
        BollardError::DockerResponseServerError { status_code, .. } => *status_code == 404,
        BollardError::DockerStreamError { error } => {
            let error = error.to_lowercase();
            ["not found", "does not exist", "manifest unknown", "pull access denied"]
                .iter()
                .any(|needle| error.contains(needle))
        }
        _ => false,
    };

    if missing {
        EngineError::ImageNotFound {
            image: image.to_string(),
        }
    } else {
        classify(err)
    }
}
