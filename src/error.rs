//! Crate-wide error taxonomy.
//!
//! One variant per failure class in the specification's error taxonomy.
//! The HTTP transport adapter (`crate::http`) is the only place these are
//! mapped to status codes; every other layer propagates `SandboxError`
//! with `?`.

use thiserror::Error;

/// Errors produced by the path guard, volume registry, container runner,
/// and the facades built on top of them.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// A user-supplied path resolved outside the workspace root, or was
    /// otherwise malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A required field was missing or empty.
    #[error("validation error: {0}")]
    Validation(String),

    /// A request is well-formed but semantically malformed for the
    /// operation (e.g. `read`/`write` against a directory, deleting the
    /// workspace root).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The requested path does not exist inside the session workspace.
    #[error("not found: {0}")]
    NotFound(String),

    /// The container reported a permission error for the requested
    /// operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// `mkdir` collided with an existing non-directory entry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The container did not exit within the configured wall-clock
    /// timeout.
    #[error("timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The engine (or a volume operation against it) is unreachable or
    /// failed unexpectedly.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Any other unexpected failure talking to the container engine.
    #[error("engine error: {0}")]
    Engine(String),

    /// Invalid runner configuration (e.g. a mount conflict) detected
    /// before launch.
    #[error("bad config: {0}")]
    BadConfig(String),

    /// Chart-flavor execution only: the user's code exited non-zero.
    #[error("user code exited with status {exit_code}")]
    UserExecution { exit_code: i64, stderr_tail: String },

    /// A write/script payload would exceed the engine's argv/env length
    /// bound once shell-quoted (spec §4.6 "Write safety").
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
}

pub type SandboxResult<T> = Result<T, SandboxError>;

impl SandboxError {
    /// Last `n` lines of `text`, joined back with newlines. Used to bound
    /// error payloads to a readable tail instead of dumping full logs.
    pub fn tail_lines(text: &str, n: usize) -> String {
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }
}
