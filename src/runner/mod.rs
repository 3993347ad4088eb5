//! Ephemeral one-shot container execution (spec §4.3): configure, launch,
//! wait with a hard timeout, collect output, and always tear down.
//!
//! Teardown is driven explicitly on every return path. [`CleanupGuard`]
//! is a belt-and-braces fallback for the panic case: true async `Drop`
//! doesn't exist in Rust, so a guard that's still armed when dropped
//! schedules a detached best-effort removal instead of silently leaking
//! the container, mirroring the "something must run on drop even without
//! an explicit stop" shape of the teacher's box lifecycle guard.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::engine::{ContainerEngine, ContainerSpec, Mount, WaitOutcome};
use crate::error::{SandboxError, SandboxResult};
use crate::volumes::VolumeRegistry;

/// A caller-provided one-shot host-path mount, e.g. the chart flavor's
/// temporary script directory.
#[derive(Debug, Clone)]
pub struct TempMount {
    pub host_path: String,
    pub bind: String,
    pub read_only: bool,
}

/// Everything needed to launch and wait for one ephemeral container
/// (spec §4.3 "Inputs").
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub argv: Vec<String>,
    pub image: String,
    pub working_dir: String,
    pub session_id: Option<String>,
    pub temp_mounts: Vec<TempMount>,
    pub environment: HashMap<String, String>,
    pub timeout: Duration,
    pub network: String,
    pub memory_limit: String,
}

impl RunSpec {
    /// A `RunSpec` with the spec's stated defaults: no session, no temp
    /// mounts, no extra environment, 60s timeout, network `none`, memory
    /// `256m`. Callers override only what their flavor needs.
    pub fn new(argv: Vec<String>, image: impl Into<String>, working_dir: impl Into<String>) -> Self {
        Self {
            argv,
            image: image.into(),
            working_dir: working_dir.into(),
            session_id: None,
            temp_mounts: Vec::new(),
            environment: HashMap::new(),
            timeout: Duration::from_secs(60),
            network: "none".to_string(),
            memory_limit: "256m".to_string(),
        }
    }
}

/// `(exit_code, stdout, stderr)` triple (spec §3). `exit_code == -1`
/// means "unknown": the wait failed or timed out but the container may
/// have produced partial output.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

/// Best-effort removal guard. Call [`Self::teardown`] on every normal
/// return path; if the guard is dropped still armed (panic unwind), it
/// spawns a detached task to remove the container instead of leaking it.
struct CleanupGuard {
    engine: Arc<dyn ContainerEngine>,
    name: String,
    armed: bool,
}

impl CleanupGuard {
    fn new(engine: Arc<dyn ContainerEngine>, name: String) -> Self {
        Self {
            engine,
            name,
            armed: true,
        }
    }

    async fn teardown(mut self) {
        self.armed = false;
        self.engine.remove(&self.name).await;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let engine = self.engine.clone();
        let name = self.name.clone();
        tracing::warn!(container = %name, "cleanup guard dropped while still armed, scheduling detached removal");
        tokio::spawn(async move {
            engine.remove(&name).await;
        });
    }
}

/// Executes single one-shot commands in ephemeral containers.
pub struct ContainerRunner {
    engine: Arc<dyn ContainerEngine>,
    volumes: Arc<VolumeRegistry>,
}

impl ContainerRunner {
    pub fn new(engine: Arc<dyn ContainerEngine>, volumes: Arc<VolumeRegistry>) -> Self {
        Self { engine, volumes }
    }

    /// Run `spec` to completion: configure, launch, wait, collect,
    /// teardown. Teardown always runs, even when an earlier step fails.
    pub async fn run(&self, spec: RunSpec) -> SandboxResult<ExecutionResult> {
        // --- Configuring ---
        for mount in &spec.temp_mounts {
            if mount.bind == spec.working_dir && spec.session_id.is_some() {
                return Err(SandboxError::BadConfig(
                    "temp mount collides with session working directory".into(),
                ));
            }
        }

        let mut mounts = Vec::with_capacity(spec.temp_mounts.len() + 1);
        if let Some(session_id) = &spec.session_id {
            let handle = self.volumes.ensure(session_id).await?;
            mounts.push(Mount::Volume {
                name: handle.name().to_string(),
                target: spec.working_dir.clone(),
                read_only: false,
            });
        }
        for mount in &spec.temp_mounts {
            mounts.push(Mount::Bind {
                host_path: mount.host_path.clone(),
                target: mount.bind.clone(),
                read_only: mount.read_only,
            });
        }

        let env = merged_environment(&spec);
        let memory_limit_bytes = crate::engine::parse_memory_limit(&spec.memory_limit)?;
        let container_name = format!("sandbox-helper-{}", Uuid::new_v4());

        let container_spec = ContainerSpec {
            name: container_name.clone(),
            image: spec.image.clone(),
            command: spec.argv.clone(),
            working_dir: spec.working_dir.clone(),
            mounts,
            env,
            network_mode: spec.network.clone(),
            memory_limit_bytes,
        };

        // --- Launched ---
        let guard = CleanupGuard::new(self.engine.clone(), container_name.clone());
        if let Err(e) = self.engine.run(&container_spec).await {
            guard.teardown().await;
            return Err(e);
        }

        // --- Waiting ---
        let wait_outcome = match self.engine.wait(&container_name, spec.timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                guard.teardown().await;
                return Err(e);
            }
        };

        // --- Collecting ---
        let (stdout, stderr) = match self.engine.logs(&container_name).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(container = %container_name, error = %e, "failed to collect logs");
                (String::new(), String::new())
            }
        };

        // --- Teardown ---
        guard.teardown().await;

        match wait_outcome {
            WaitOutcome::Exited(exit_code) => Ok(ExecutionResult {
                exit_code,
                stdout,
                stderr,
            }),
            WaitOutcome::TimedOut => {
                tracing::warn!(
                    container = %container_name,
                    timeout_secs = spec.timeout.as_secs(),
                    "container did not exit within timeout"
                );
                Err(SandboxError::Timeout {
                    timeout_secs: spec.timeout.as_secs(),
                })
            }
        }
    }
}

/// Merge the default environment into the caller-supplied one. When a
/// session is in play, inject `PYTHONUSERBASE`/`PATH` so that
/// `pip install --user` packages persist with the volume across
/// invocations. Caller-supplied keys always win.
fn merged_environment(spec: &RunSpec) -> Vec<(String, String)> {
    let mut env: HashMap<String, String> = HashMap::new();

    if spec.session_id.is_some() {
        let user_base = format!("{}/.local", spec.working_dir);
        let bin_dir = format!("{user_base}/bin");
        env.insert("PYTHONUSERBASE".to_string(), user_base);
        env.insert("PATH".to_string(), format!("{bin_dir}:/usr/local/bin:/usr/bin:/bin"));
    }

    for (k, v) in &spec.environment {
        env.insert(k.clone(), v.clone());
    }

    env.into_iter().collect()
}
