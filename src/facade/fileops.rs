//! List/read/write/delete/mkdir via shell probes against a session's
//! volume (spec §4.6). Every operation resolves the user path through
//! [`PathGuard`] first, then shells out inside the ephemeral container;
//! stderr substrings are pattern-matched into the crate's error
//! taxonomy because the sandbox image exposes no structured error
//! channel beyond exit code and stderr text.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::error::{SandboxError, SandboxResult};
use crate::path_guard::PathGuard;
use crate::runner::{ContainerRunner, RunSpec};

/// One entry returned by [`FileOpsFacade::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Link,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::Link => "link",
        }
    }
}

/// Conservative bound on shell-quoted write content, comfortably under
/// typical engine argv/env limits (Linux `ARG_MAX` is usually a few MiB)
/// even after single-quote escaping roughly doubles worst-case size (spec
/// §4.6 "Write safety").
const MAX_WRITE_CONTENT_BYTES: usize = 512 * 1024;

pub struct FileOpsFacade {
    runner: Arc<ContainerRunner>,
    config: Arc<ServiceConfig>,
}

impl FileOpsFacade {
    pub fn new(runner: Arc<ContainerRunner>, config: Arc<ServiceConfig>) -> Self {
        Self { runner, config }
    }

    fn guard(&self) -> PathGuard {
        PathGuard::new(self.config.workspace_dir.clone())
    }

    fn spec(&self, command: String, session_id: &str) -> RunSpec {
        let mut spec = RunSpec::new(
            vec!["bash".into(), "-c".into(), command],
            self.config.image_name.clone(),
            self.config.workspace_dir.clone(),
        );
        spec.session_id = Some(session_id.to_string());
        spec.network = "none".to_string();
        spec.timeout = Duration::from_secs(self.config.container_run_timeout);
        spec
    }

    /// `cd <abs> && ls -AF`, parsed per spec §4.6's listing rule.
    /// Returns the path relative to the workspace root alongside the
    /// parsed entries.
    pub async fn list(
        &self,
        session_id: &str,
        user_path: &str,
    ) -> SandboxResult<(String, Vec<FileEntry>)> {
        let resolved = self.guard().resolve(user_path)?;
        let quoted = shlex::try_quote(resolved.as_str())
            .map_err(|_| SandboxError::InvalidPath("path contains a NUL byte".into()))?;
        let command = format!("set -e; set -o pipefail; cd {quoted} && ls -AF");

        let result = self.runner.run(self.spec(command, session_id)).await?;
        if result.exit_code != 0 {
            return Err(classify_stderr(&result.stderr, "list directory"));
        }

        let entries = parse_ls_af(&result.stdout);
        let relative = resolved.relative_to(self.guard().root());
        Ok((relative.to_string_lossy().into_owned(), entries))
    }

    /// `cat -- <abs>`.
    pub async fn read(&self, session_id: &str, user_path: &str) -> SandboxResult<(String, String)> {
        let resolved = self.guard().resolve(user_path)?;
        let quoted = shlex::try_quote(resolved.as_str())
            .map_err(|_| SandboxError::InvalidPath("path contains a NUL byte".into()))?;
        let command = format!("set -e; set -o pipefail; cat -- {quoted}");

        let result = self.runner.run(self.spec(command, session_id)).await?;
        if result.exit_code != 0 {
            return Err(classify_stderr(&result.stderr, "read file"));
        }

        let relative = resolved.relative_to(self.guard().root());
        Ok((relative.to_string_lossy().into_owned(), result.stdout))
    }

    /// `mkdir -p <parent>` then `printf '%s' <quoted content> > <abs>`.
    pub async fn write(&self, session_id: &str, user_path: &str, content: &str) -> SandboxResult<()> {
        if content.len() > MAX_WRITE_CONTENT_BYTES {
            return Err(SandboxError::PayloadTooLarge(format!(
                "write content is {} bytes, exceeds the {MAX_WRITE_CONTENT_BYTES}-byte limit",
                content.len()
            )));
        }
        let resolved = self.guard().resolve(user_path)?;
        let parent = resolved
            .as_path()
            .parent()
            .unwrap_or(self.guard().root())
            .to_string_lossy()
            .into_owned();

        let quoted_parent = shlex::try_quote(&parent)
            .map_err(|_| SandboxError::InvalidPath("path contains a NUL byte".into()))?;
        let mkdir_command = format!("set -e; mkdir -p {quoted_parent}");
        let mkdir_result = self
            .runner
            .run(self.spec(mkdir_command, session_id))
            .await?;
        if mkdir_result.exit_code != 0 {
            return Err(SandboxError::Engine(format!(
                "failed to create parent directory: {}",
                mkdir_result.stderr
            )));
        }

        let quoted_content = shlex::try_quote(content)
            .map_err(|_| SandboxError::Validation("content contains a NUL byte".into()))?;
        let quoted_path = shlex::try_quote(resolved.as_str())
            .map_err(|_| SandboxError::InvalidPath("path contains a NUL byte".into()))?;
        let write_command = format!("set -e; printf '%s' {quoted_content} > {quoted_path}");
        let write_result = self
            .runner
            .run(self.spec(write_command, session_id))
            .await?;
        if write_result.exit_code != 0 {
            return Err(classify_stderr(&write_result.stderr, "write file"));
        }

        Ok(())
    }

    /// `rm -rf -- <abs>`, refusing to touch the workspace root.
    pub async fn delete(&self, session_id: &str, user_path: &str) -> SandboxResult<()> {
        let resolved = self.guard().resolve(user_path)?;
        if resolved.as_path() == self.guard().root() {
            return Err(SandboxError::BadRequest(
                "cannot delete workspace root".into(),
            ));
        }

        let quoted = shlex::try_quote(resolved.as_str())
            .map_err(|_| SandboxError::InvalidPath("path contains a NUL byte".into()))?;
        let command = format!("set -e; rm -rf -- {quoted}");
        let result = self.runner.run(self.spec(command, session_id)).await?;

        if result.exit_code != 0 {
            if result.stderr.contains("Permission denied") {
                return Err(SandboxError::Forbidden(format!(
                    "permission denied deleting path: '{user_path}'"
                )));
            }
            // Any other nonzero exit is logged and treated as success:
            // the caller's goal (absence of the path) is already met.
            tracing::warn!(
                path = user_path,
                exit_code = result.exit_code,
                stderr = %result.stderr,
                "delete exited non-zero; treating as success"
            );
        }

        Ok(())
    }

    /// `mkdir -p -- <abs>`.
    pub async fn mkdir(&self, session_id: &str, user_path: &str) -> SandboxResult<String> {
        let resolved = self.guard().resolve(user_path)?;
        let quoted = shlex::try_quote(resolved.as_str())
            .map_err(|_| SandboxError::InvalidPath("path contains a NUL byte".into()))?;
        let command = format!("set -e; mkdir -p -- {quoted}");

        let result = self.runner.run(self.spec(command, session_id)).await?;
        if result.exit_code != 0 {
            if result.stderr.contains("Permission denied") {
                return Err(SandboxError::Forbidden(format!(
                    "permission denied creating directory: '{user_path}'"
                )));
            }
            if result.stderr.contains("File exists") {
                return Err(SandboxError::Conflict(format!(
                    "path already exists and is not a directory: '{user_path}'"
                )));
            }
            return Err(SandboxError::Engine(format!(
                "failed to create directory (exit {}): {}",
                result.exit_code, result.stderr
            )));
        }

        let relative = resolved.relative_to(self.guard().root());
        Ok(relative.to_string_lossy().into_owned())
    }
}

/// Shared stderr → error-kind mapping for list/read/write (spec §4.6).
fn classify_stderr(stderr: &str, operation: &str) -> SandboxError {
    if stderr.contains("No such file or directory") {
        SandboxError::NotFound(format!("path not found during {operation}"))
    } else if stderr.contains("Is a directory") {
        SandboxError::BadRequest(format!("path is a directory during {operation}"))
    } else if stderr.contains("Permission denied") {
        SandboxError::Forbidden(format!("permission denied during {operation}"))
    } else {
        SandboxError::Engine(format!("failed to {operation}: {stderr}"))
    }
}

/// Parse `ls -AF` output per spec §4.6: a trailing `/` marks a
/// directory, `@` a symlink, `*` an executable (still a plain file).
/// `.`/`..` are dropped defensively even though `-A` already excludes
/// them.
fn parse_ls_af(stdout: &str) -> Vec<FileEntry> {
    stdout
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (name, kind) = if let Some(stripped) = line.strip_suffix('/') {
                (stripped, EntryKind::Directory)
            } else if let Some(stripped) = line.strip_suffix('@') {
                (stripped, EntryKind::Link)
            } else if let Some(stripped) = line.strip_suffix('*') {
                (stripped, EntryKind::File)
            } else {
                (line, EntryKind::File)
            };

            if name == "." || name == ".." {
                None
            } else {
                Some(FileEntry {
                    name: name.to_string(),
                    kind,
                })
            }
        })
        .collect()
}
