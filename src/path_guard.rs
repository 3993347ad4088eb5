//! Lexical path resolution against a workspace root (spec §4.1).
//!
//! Resolution is purely lexical — no `stat`, no symlink following — so it
//! runs entirely in the control plane and can never race the container's
//! own filesystem (spec's TOCTOU rationale).
//!
//! A leading `/` in the user-supplied path is NOT reanchored under the
//! workspace root; it is treated as an absolute path in its own right (the
//! same behavior `pathlib`'s `/` operator has when the right-hand side is
//! already absolute, which is what the original implementation relied on).
//! Combined with the ancestor check below, this is what makes
//! `"/etc/passwd"` a rejection rather than a silent reanchor to
//! `/workspace/etc/passwd`.

use std::path::{Component, Path, PathBuf};

use crate::error::{SandboxError, SandboxResult};

/// An absolute, lexically-normalized path known to be the workspace root
/// or a descendant of it. Cannot be constructed except through
/// [`PathGuard::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    /// The path as it would appear inside the container, e.g.
    /// `/workspace/d/f1.txt`.
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.to_str().expect("resolved path is valid UTF-8")
    }

    /// This path relative to `root`, e.g. `d/f1.txt` for root `/workspace`.
    /// Returns `.` when the path is the root itself.
    pub fn relative_to(&self, root: &Path) -> PathBuf {
        self.0
            .strip_prefix(root)
            .map(|p| {
                if p.as_os_str().is_empty() {
                    PathBuf::from(".")
                } else {
                    p.to_path_buf()
                }
            })
            .unwrap_or_else(|_| self.0.clone())
    }
}

/// Validates and canonicalizes user-supplied paths against a workspace
/// root, rejecting anything that would escape it.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `user_path` relative to the workspace root.
    ///
    /// Algorithm (spec §4.1):
    /// 1. Empty input is treated as `.`.
    /// 2. A relative `user_path` is joined onto the root; an absolute
    ///    `user_path` stands on its own (not reanchored).
    /// 3. `.`/`..` segments are collapsed purely lexically.
    /// 4. The result must equal the root or have the root as an ancestor,
    ///    otherwise `InvalidPath`.
    pub fn resolve(&self, user_path: &str) -> SandboxResult<ResolvedPath> {
        let user_path = if user_path.is_empty() { "." } else { user_path };
        let input = Path::new(user_path);

        let joined = if input.is_absolute() {
            input.to_path_buf()
        } else {
            self.root.join(input)
        };

        let normalized = normalize_lexically(&joined);

        if normalized != self.root && !normalized.starts_with(&self.root) {
            return Err(SandboxError::InvalidPath(
                "Access denied outside workspace".into(),
            ));
        }

        Ok(ResolvedPath(normalized))
    }
}

/// Collapse `.` and `..` segments without touching the filesystem. A `..`
/// at the POSIX root is a no-op, matching standard lexical normalization
/// (and Python's `os.path.normpath`).
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    // Already at root; ".." is absorbed, not an error.
                }
            }
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> PathGuard {
        PathGuard::new("/workspace")
    }

    #[test]
    fn empty_and_dot_resolve_to_root() {
        assert_eq!(guard().resolve("").unwrap().as_path(), Path::new("/workspace"));
        assert_eq!(guard().resolve(".").unwrap().as_path(), Path::new("/workspace"));
    }

    #[test]
    fn plain_relative_path_joins_root() {
        let resolved = guard().resolve("d/f1.txt").unwrap();
        assert_eq!(resolved.as_path(), Path::new("/workspace/d/f1.txt"));
    }

    #[test]
    fn absolute_path_inside_workspace_is_accepted_as_is() {
        let resolved = guard().resolve("/workspace/sub/dir").unwrap();
        assert_eq!(resolved.as_path(), Path::new("/workspace/sub/dir"));
    }

    #[test]
    fn absolute_path_outside_workspace_is_rejected() {
        assert!(guard().resolve("/etc/passwd").is_err());
    }

    #[test]
    fn dot_dot_at_root_is_rejected() {
        assert!(guard().resolve("..").is_err());
        assert!(guard().resolve("../x").is_err());
    }

    #[test]
    fn dot_dot_after_descending_stays_inside() {
        let resolved = guard().resolve("d/../e").unwrap();
        assert_eq!(resolved.as_path(), Path::new("/workspace/e"));
    }

    #[test]
    fn dot_dot_past_root_via_absolute_escape_is_rejected() {
        assert!(guard().resolve("/workspace/../etc/x").is_err());
    }

    #[test]
    fn dot_dot_past_root_via_relative_escape_is_rejected() {
        assert!(guard().resolve("d/../../etc/x").is_err());
    }

    #[test]
    fn relative_to_root_strips_prefix() {
        let resolved = guard().resolve("d/f1.txt").unwrap();
        assert_eq!(
            resolved.relative_to(Path::new("/workspace")),
            PathBuf::from("d/f1.txt")
        );
        let root = guard().resolve(".").unwrap();
        assert_eq!(root.relative_to(Path::new("/workspace")), PathBuf::from("."));
    }
}
