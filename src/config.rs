//! Service configuration, loaded once at process start from the
//! environment (spec §6.4).

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;

use crate::error::{SandboxError, SandboxResult};

const RECOGNIZED_VARS: &[&str] = &[
    "SANDBOX_IMAGE_NAME",
    "CONTAINER_RUN_TIMEOUT",
    "SCRIPT_RUN_TIMEOUT",
    "WORKSPACE_DIR_INSIDE_CONTAINER",
    "DEFAULT_MEM_LIMIT",
    "DEFAULT_NETWORK_MODE",
    "BIND_ADDR",
];

/// Process-wide configuration. Constructed once in `main` and shared via
/// `Arc` with the runner and facades.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Default sandbox image reference.
    pub image_name: String,
    /// Wall-clock timeout (seconds) for shell/chart container waits.
    pub container_run_timeout: u64,
    /// Wall-clock timeout (seconds) for the script flavor's execute phase,
    /// which is intentionally longer than the shell default to
    /// accommodate interpreter startup and, per spec §5, browser
    /// automation workloads.
    pub script_run_timeout: u64,
    /// Absolute path inside every container where the session volume is
    /// bind-mounted.
    pub workspace_dir: String,
    /// Default per-container memory limit, e.g. `"256m"`.
    pub default_mem_limit: String,
    /// Default network mode: `"none"` or `"bridge"`.
    pub default_network_mode: String,
    /// Address the HTTP transport adapter listens on.
    pub bind_addr: SocketAddr,
    /// Operator-configured environment variables forwarded to every
    /// session container (e.g. a pre-provisioned API key). Never logged
    /// at info level.
    pub passthrough_env: HashMap<String, String>,
}

impl ServiceConfig {
    /// Load configuration from the process environment. Any recognized
    /// variable that fails to parse fails startup immediately rather than
    /// silently falling back, since this only runs once at boot.
    pub fn from_env() -> SandboxResult<Self> {
        let image_name = env_or("SANDBOX_IMAGE_NAME", "python-chart-sandbox:latest");
        let container_run_timeout = parse_env("CONTAINER_RUN_TIMEOUT", 60)?;
        let script_run_timeout = parse_env("SCRIPT_RUN_TIMEOUT", 180)?;
        let workspace_dir = env_or("WORKSPACE_DIR_INSIDE_CONTAINER", "/workspace");
        let default_mem_limit = env_or("DEFAULT_MEM_LIMIT", "256m");
        let default_network_mode = env_or("DEFAULT_NETWORK_MODE", "none");
        let bind_addr_str = env_or("BIND_ADDR", "0.0.0.0:8000");
        let bind_addr = bind_addr_str.parse().map_err(|e| {
            SandboxError::BadConfig(format!("invalid BIND_ADDR '{bind_addr_str}': {e}"))
        })?;

        if default_network_mode != "none" && default_network_mode != "bridge" {
            return Err(SandboxError::BadConfig(format!(
                "DEFAULT_NETWORK_MODE must be 'none' or 'bridge', got '{default_network_mode}'"
            )));
        }

        let passthrough_env = env::vars()
            .filter(|(k, _)| !RECOGNIZED_VARS.contains(&k.as_str()))
            .filter(|(k, _)| is_forwardable(k))
            .collect();

        Ok(Self {
            image_name,
            container_run_timeout,
            script_run_timeout,
            workspace_dir,
            default_mem_limit,
            default_network_mode,
            bind_addr,
            passthrough_env,
        })
    }
}

/// Excludes common shell/process noise from the passthrough set so we
/// don't forward the control plane's own `PATH`, `HOME`, etc. into every
/// session container by accident.
fn is_forwardable(key: &str) -> bool {
    !matches!(
        key,
        "PATH" | "HOME" | "PWD" | "SHELL" | "USER" | "LANG" | "TERM" | "RUST_LOG"
    )
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env(key: &str, default: u64) -> SandboxResult<u64> {
    match env::var(key) {
        Ok(val) => val
            .parse()
            .map_err(|e| SandboxError::BadConfig(format!("invalid {key}='{val}': {e}"))),
        Err(_) => Ok(default),
    }
}
