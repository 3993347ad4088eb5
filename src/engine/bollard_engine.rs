//! [`ContainerEngine`] backed by a real Docker-compatible daemon via
//! [`bollard`].

use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::HostConfig;
use bollard::volume::CreateVolumeOptions;
use futures::StreamExt;

use super::{ContainerEngine, ContainerSpec, Mount, WaitOutcome};
use crate::error::{SandboxError, SandboxResult};

pub struct BollardEngine {
    docker: Docker,
}

impl BollardEngine {
    /// Connect using the platform default (Unix socket on Linux/macOS,
    /// named pipe on Windows), matching `docker.from_env()` in the
    /// original implementation.
    pub fn connect() -> SandboxResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::StorageUnavailable(format!("docker connect: {e}")))?;
        Ok(Self { docker })
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(err, BollardError::DockerResponseServerError { status_code, .. } if *status_code == 404)
}

#[async_trait]
impl ContainerEngine for BollardEngine {
    async fn ping(&self) -> SandboxResult<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| SandboxError::StorageUnavailable(format!("ping failed: {e}")))
    }

    async fn volume_exists(&self, name: &str) -> SandboxResult<bool> {
        match self.docker.inspect_volume(name).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(SandboxError::StorageUnavailable(format!(
                "inspect_volume({name}): {e}"
            ))),
        }
    }

    async fn create_volume(&self, name: &str) -> SandboxResult<()> {
        let options = CreateVolumeOptions {
            name: name.to_string(),
            driver: "local".to_string(),
            ..Default::default()
        };
        self.docker
            .create_volume(options)
            .await
            .map(|_| ())
            .map_err(|e| SandboxError::StorageUnavailable(format!("create_volume({name}): {e}")))
    }

    async fn run(&self, spec: &ContainerSpec) -> SandboxResult<()> {
        let binds: Vec<String> = spec
            .mounts
            .iter()
            .map(|mount| match mount {
                Mount::Volume {
                    name,
                    target,
                    read_only,
                } => format!("{name}:{target}:{}", mode(*read_only)),
                Mount::Bind {
                    host_path,
                    target,
                    read_only,
                } => format!("{host_path}:{target}:{}", mode(*read_only)),
            })
            .collect();

        let host_config = HostConfig {
            binds: if binds.is_empty() { None } else { Some(binds) },
            network_mode: Some(spec.network_mode.clone()),
            memory: Some(spec.memory_limit_bytes),
            ..Default::default()
        };

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(spec.working_dir.clone()),
            env: Some(env),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        self.docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|e| map_run_error(&spec.image, &spec.name, e))?;

        self.docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_run_error(&spec.image, &spec.name, e))?;

        Ok(())
    }

    async fn wait(&self, name: &str, timeout: Duration) -> SandboxResult<WaitOutcome> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(name, Some(options));

        match tokio::time::timeout(timeout, stream.next()).await {
            Ok(Some(Ok(response))) => Ok(WaitOutcome::Exited(response.status_code)),
            Ok(Some(Err(e))) => Err(SandboxError::Engine(format!(
                "wait_container({name}): {e}"
            ))),
            Ok(None) => Ok(WaitOutcome::Exited(-1)),
            Err(_elapsed) => Ok(WaitOutcome::TimedOut),
        }
    }

    async fn logs(&self, name: &str) -> SandboxResult<(String, String)> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        let mut stream = self.docker.logs(name, Some(options));

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) => stdout.extend_from_slice(&message),
                Ok(LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                Ok(_) => {}
                Err(e) => {
                    return Err(SandboxError::Engine(format!("logs({name}): {e}")));
                }
            }
        }

        Ok((
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        ))
    }

    async fn remove(&self, name: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(name, Some(options)).await {
            tracing::error!(container = name, error = %e, "failed to remove container");
        }
    }
}

fn mode(read_only: bool) -> &'static str {
    if read_only { "ro" } else { "rw" }
}

fn map_run_error(image: &str, name: &str, err: BollardError) -> SandboxError {
    if is_not_found(&err) {
        SandboxError::Engine(format!("sandbox image '{image}' not found"))
    } else {
        SandboxError::Engine(format!("run({name}): {err}"))
    }
}
