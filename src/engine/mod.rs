//! The container-engine capabilities this crate consumes (spec §6.1).
//!
//! `ContainerEngine` is the trait boundary between the control plane and
//! whatever daemon actually runs containers. The only production
//! implementation talks to a real Docker-compatible engine over
//! [`bollard`]; tests run against [`fake::FakeEngine`], the same
//! "trait-object backend, swappable for tests" shape the teacher crate
//! uses for `BindMountImpl`/`VmmHandler`.

mod bollard_engine;

#[cfg(test)]
pub(crate) mod fake;

pub use bollard_engine::BollardEngine;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::SandboxResult;

/// A single mount attached to an ephemeral container.
#[derive(Debug, Clone)]
pub enum Mount {
    /// An engine-managed named volume, e.g. a session's durable workspace.
    Volume {
        name: String,
        target: String,
        read_only: bool,
    },
    /// A host-path bind mount, used for the stateless chart flavor's
    /// temporary script/output directory.
    Bind {
        host_path: String,
        target: String,
        read_only: bool,
    },
}

impl Mount {
    pub fn target(&self) -> &str {
        match self {
            Mount::Volume { target, .. } => target,
            Mount::Bind { target, .. } => target,
        }
    }
}

/// Everything needed to launch one ephemeral, one-shot container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub working_dir: String,
    pub mounts: Vec<Mount>,
    pub env: Vec<(String, String)>,
    pub network_mode: String,
    pub memory_limit_bytes: i64,
}

/// Outcome of waiting for a container to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(i64),
    TimedOut,
}

/// Required operations from the engine client (spec §6.1). Every method
/// that can fail in a way the caller must react to returns
/// `SandboxResult`; `remove` is best-effort and never propagates an error
/// (spec §4.3 "Teardown").
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Liveness probe, surfaced by `/health`.
    async fn ping(&self) -> SandboxResult<()>;

    /// Does a volume with this name already exist?
    async fn volume_exists(&self, name: &str) -> SandboxResult<bool>;

    /// Create a volume with the `local` driver.
    async fn create_volume(&self, name: &str) -> SandboxResult<()>;

    /// Create and start a detached container from `spec`.
    async fn run(&self, spec: &ContainerSpec) -> SandboxResult<()>;

    /// Block up to `timeout` for the named container to exit.
    async fn wait(&self, name: &str, timeout: Duration) -> SandboxResult<WaitOutcome>;

    /// Fetch `(stdout, stderr)`, UTF-8-replacement-decoded.
    async fn logs(&self, name: &str) -> SandboxResult<(String, String)>;

    /// Force-remove the named container. Errors are logged internally and
    /// never returned: teardown must never fail the calling operation.
    async fn remove(&self, name: &str);
}

/// Parse a Docker-style memory limit string (`"256m"`, `"1g"`, a bare byte
/// count) into bytes.
pub fn parse_memory_limit(limit: &str) -> SandboxResult<i64> {
    use crate::error::SandboxError;

    let limit = limit.trim();
    if limit.is_empty() {
        return Err(SandboxError::BadConfig("empty memory limit".into()));
    }

    let (digits, multiplier) = match limit.chars().last().unwrap() {
        'b' | 'B' => (&limit[..limit.len() - 1], 1),
        'k' | 'K' => (&limit[..limit.len() - 1], 1024),
        'm' | 'M' => (&limit[..limit.len() - 1], 1024 * 1024),
        'g' | 'G' => (&limit[..limit.len() - 1], 1024 * 1024 * 1024),
        _ => (limit, 1),
    };

    digits
        .trim()
        .parse::<i64>()
        .map(|n| n * multiplier)
        .map_err(|e| SandboxError::BadConfig(format!("invalid memory limit '{limit}': {e}")))
}
