//! In-memory [`ContainerEngine`] double used by unit tests elsewhere in
//! the crate. Deterministic, configurable to simulate the failure modes
//! the real engine can surface (timeouts, missing images, unreachable
//! daemon) without a Docker socket.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ContainerEngine, ContainerSpec, WaitOutcome};
use crate::error::{SandboxError, SandboxResult};

/// What a fake `run` + `wait` + `logs` cycle should produce for a given
/// container name.
#[derive(Debug, Clone)]
pub struct ScriptedOutcome {
    pub wait: WaitOutcome,
    pub stdout: String,
    pub stderr: String,
}

impl Default for ScriptedOutcome {
    fn default() -> Self {
        Self {
            wait: WaitOutcome::Exited(0),
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

#[derive(Default)]
struct State {
    volumes: HashSet<String>,
    outcomes: std::collections::HashMap<String, ScriptedOutcome>,
    /// Applied to any container name with no entry in `outcomes`. Lets
    /// tests script "whatever name gets generated" without knowing the
    /// runner's internal uuid ahead of time.
    default_outcome: Option<ScriptedOutcome>,
    removed: Vec<String>,
    ping_fails: bool,
    run_error: Option<String>,
    last_run_env: Vec<(String, String)>,
}

/// A deterministic [`ContainerEngine`] double, backed by an in-process
/// mutex rather than a real daemon.
pub struct FakeEngine {
    state: Mutex<State>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_volume(self, name: impl Into<String>) -> Self {
        self.state.lock().unwrap().volumes.insert(name.into());
        self
    }

    /// Script the result `run`/`wait`/`logs` should produce for `name`.
    pub fn script(&self, name: impl Into<String>, outcome: ScriptedOutcome) {
        self.state
            .lock()
            .unwrap()
            .outcomes
            .insert(name.into(), outcome);
    }

    /// Script the outcome for whichever container name `run` happens to
    /// generate next (the runner mints a fresh uuid per call, so tests
    /// that don't control naming use this instead of [`Self::script`]).
    pub fn script_default(&self, outcome: ScriptedOutcome) {
        self.state.lock().unwrap().default_outcome = Some(outcome);
    }

    pub fn fail_ping(&self) {
        self.state.lock().unwrap().ping_fails = true;
    }

    pub fn fail_run(&self, message: impl Into<String>) {
        self.state.lock().unwrap().run_error = Some(message.into());
    }

    pub fn removed_containers(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    pub fn volumes(&self) -> HashSet<String> {
        self.state.lock().unwrap().volumes.clone()
    }

    /// The `env` of the most recent `run` call, for asserting on what the
    /// runner merged together.
    pub fn last_run_env(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().last_run_env.clone()
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn ping(&self) -> SandboxResult<()> {
        if self.state.lock().unwrap().ping_fails {
            return Err(SandboxError::StorageUnavailable("fake ping failure".into()));
        }
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> SandboxResult<bool> {
        Ok(self.state.lock().unwrap().volumes.contains(name))
    }

    async fn create_volume(&self, name: &str) -> SandboxResult<()> {
        self.state.lock().unwrap().volumes.insert(name.to_string());
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec) -> SandboxResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.run_error {
            return Err(SandboxError::Engine(message.clone()));
        }
        state.last_run_env = spec.env.clone();
        Ok(())
    }

    async fn wait(&self, name: &str, _timeout: Duration) -> SandboxResult<WaitOutcome> {
        let state = self.state.lock().unwrap();
        Ok(state
            .outcomes
            .get(name)
            .or(state.default_outcome.as_ref())
            .map(|o| o.wait)
            .unwrap_or(WaitOutcome::Exited(0)))
    }

    async fn logs(&self, name: &str) -> SandboxResult<(String, String)> {
        let state = self.state.lock().unwrap();
        Ok(state
            .outcomes
            .get(name)
            .or(state.default_outcome.as_ref())
            .map(|o| (o.stdout.clone(), o.stderr.clone()))
            .unwrap_or_default())
    }

    async fn remove(&self, name: &str) {
        self.state.lock().unwrap().removed.push(name.to_string());
    }
}
