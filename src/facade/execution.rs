//! The three code-execution flavors (spec §4.5): stateless chart
//! rendering, session-scoped shell commands, and session-scoped
//! two-phase script execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::config::ServiceConfig;
use crate::error::{SandboxError, SandboxResult};
use crate::runner::{ContainerRunner, RunSpec, TempMount};
use crate::script::build_chart_script;

const CHART_WORKDIR: &str = "/chart_temp";
const OUTPUT_FILENAME: &str = "output.png";
const SCRIPT_FILENAME: &str = "script.py";
const STDERR_TAIL_LINES: usize = 10;
/// Conservative bound on code embedded via shell-quoting in the script
/// flavor's write phase (spec §4.6 "Write safety", reused here since
/// phase 1 of `/execute/python/script` embeds code the same way).
const MAX_SCRIPT_CODE_BYTES: usize = 512 * 1024;

/// Bytes of a rendered PNG, ready to stream back as the response body.
pub struct ChartOutcome {
    pub png_bytes: Vec<u8>,
}

/// `(stdout, stderr, exit_code)` as returned verbatim by the shell and
/// script flavors. A nonzero `exit_code` is NOT an error at this layer
/// (spec §7): it's returned to the caller as part of a normal response.
#[derive(Debug, Clone)]
pub struct ShellOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

pub struct ExecutionFacade {
    runner: Arc<ContainerRunner>,
    config: Arc<ServiceConfig>,
}

impl ExecutionFacade {
    pub fn new(runner: Arc<ContainerRunner>, config: Arc<ServiceConfig>) -> Self {
        Self { runner, config }
    }

    /// Merge the operator's passthrough environment (spec §6.4) with the
    /// caller-supplied environment for a session container; caller keys
    /// win on collision.
    fn session_environment(
        &self,
        environment: Option<HashMap<String, String>>,
    ) -> HashMap<String, String> {
        let mut env = self.config.passthrough_env.clone();
        env.extend(environment.unwrap_or_default());
        env
    }

    /// Stateless chart rendering. Writes the wrapped user code into a
    /// host temp directory, bind-mounts it at `/chart_temp`, runs the
    /// interpreter against it with no session volume and no network, and
    /// reads the resulting PNG back into memory before the temp
    /// directory is removed. The directory is dropped (and so removed)
    /// on every exit path, including the early error returns below,
    /// because it's held as a local [`TempDir`] for the scope of this
    /// call rather than scheduled for later cleanup.
    pub async fn chart(&self, user_code: &str) -> SandboxResult<ChartOutcome> {
        let temp_dir = TempDir::new()
            .map_err(|e| SandboxError::Engine(format!("failed to create temp directory: {e}")))?;

        let full_source = build_chart_script(user_code, OUTPUT_FILENAME);
        let script_path = temp_dir.path().join(SCRIPT_FILENAME);
        std::fs::write(&script_path, full_source)
            .map_err(|e| SandboxError::Engine(format!("failed to write script file: {e}")))?;

        let temp_dir_host = temp_dir
            .path()
            .to_str()
            .ok_or_else(|| SandboxError::Engine("temp dir path is not valid UTF-8".into()))?
            .to_string();

        let mut spec = RunSpec::new(
            vec!["python".into(), format!("{CHART_WORKDIR}/{SCRIPT_FILENAME}")],
            self.config.image_name.clone(),
            CHART_WORKDIR.to_string(),
        );
        spec.network = "none".to_string();
        spec.timeout = Duration::from_secs(self.config.container_run_timeout);
        spec.temp_mounts.push(TempMount {
            host_path: temp_dir_host,
            bind: CHART_WORKDIR.to_string(),
            read_only: false,
        });

        let result = self.runner.run(spec).await?;

        if result.exit_code != 0 {
            let tail = SandboxError::tail_lines(&result.stderr, STDERR_TAIL_LINES);
            return Err(SandboxError::UserExecution {
                exit_code: result.exit_code,
                stderr_tail: tail,
            });
        }

        let output_path = temp_dir.path().join(OUTPUT_FILENAME);
        if !output_path.is_file() {
            let stdout_tail = SandboxError::tail_lines(&result.stdout, STDERR_TAIL_LINES);
            let stderr_tail = SandboxError::tail_lines(&result.stderr, STDERR_TAIL_LINES);
            return Err(SandboxError::Engine(format!(
                "script exited 0 but did not produce '{OUTPUT_FILENAME}'. stdout tail:\n{stdout_tail}\nstderr tail:\n{stderr_tail}"
            )));
        }

        let png_bytes = std::fs::read(&output_path)
            .map_err(|e| SandboxError::Engine(format!("failed to read rendered output: {e}")))?;

        Ok(ChartOutcome { png_bytes })
    }

    /// Session-scoped shell command. Runs under `bash -c 'set -e; set -o
    /// pipefail; <command>'` with network `bridge`.
    pub async fn shell(
        &self,
        session_id: &str,
        command: &str,
        environment: Option<HashMap<String, String>>,
    ) -> SandboxResult<ShellOutcome> {
        let mut spec = RunSpec::new(
            vec![
                "bash".into(),
                "-c".into(),
                format!("set -e; set -o pipefail; {command}"),
            ],
            self.config.image_name.clone(),
            self.config.workspace_dir.clone(),
        );
        spec.session_id = Some(session_id.to_string());
        spec.network = "bridge".to_string();
        spec.timeout = Duration::from_secs(self.config.container_run_timeout);
        spec.environment = self.session_environment(environment);

        let result = self.runner.run(spec).await?;
        Ok(ShellOutcome {
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
        })
    }

    /// Session-scoped, two-phase script execution. Phase 1 writes the
    /// code into `<workspace>/script.py` with network `none`; phase 2
    /// runs the interpreter against it with network `bridge` and the
    /// caller's environment.
    pub async fn script(
        &self,
        session_id: &str,
        code: &str,
        environment: Option<HashMap<String, String>>,
    ) -> SandboxResult<ShellOutcome> {
        if code.len() > MAX_SCRIPT_CODE_BYTES {
            return Err(SandboxError::PayloadTooLarge(format!(
                "script code is {} bytes, exceeds the {MAX_SCRIPT_CODE_BYTES}-byte limit",
                code.len()
            )));
        }
        let quoted = shlex::try_quote(code)
            .map_err(|_| SandboxError::Validation("script code contains a NUL byte".into()))?;
        let write_command = format!("printf '%s' {quoted} > {SCRIPT_FILENAME}");

        let mut write_spec = RunSpec::new(
            vec!["bash".into(), "-c".into(), format!("set -e; {write_command}")],
            self.config.image_name.clone(),
            self.config.workspace_dir.clone(),
        );
        write_spec.session_id = Some(session_id.to_string());
        write_spec.network = "none".to_string();
        write_spec.timeout = Duration::from_secs(self.config.script_run_timeout);

        let write_result = self.runner.run(write_spec).await?;
        if write_result.exit_code != 0 {
            return Err(SandboxError::Engine(format!(
                "failed to write script to workspace (exit code {}): {}",
                write_result.exit_code, write_result.stderr
            )));
        }

        let mut exec_spec = RunSpec::new(
            vec!["python".into(), SCRIPT_FILENAME.into()],
            self.config.image_name.clone(),
            self.config.workspace_dir.clone(),
        );
        exec_spec.session_id = Some(session_id.to_string());
        exec_spec.network = "bridge".to_string();
        exec_spec.timeout = Duration::from_secs(self.config.script_run_timeout);
        exec_spec.environment = self.session_environment(environment);

        let exec_result = self.runner.run(exec_spec).await?;
        Ok(ShellOutcome {
            stdout: exec_result.stdout,
            stderr: exec_result.stderr,
            exit_code: exec_result.exit_code,
        })
    }
}
