//! Session-to-volume naming and lazy provisioning (spec §4.2).

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::ContainerEngine;
use crate::error::SandboxResult;

const MAX_VOLUME_NAME_LEN: usize = 50;

/// Replace every character outside `[A-Za-z0-9_.-]` with `_` and truncate
/// to 50 characters (spec §3). Distinct session IDs MAY collide after
/// sanitization; callers SHOULD constrain session IDs to the safe
/// alphabet to avoid this.
pub fn sanitize_for_volume_name(session_id: &str) -> String {
    let sanitized: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    sanitized.chars().take(MAX_VOLUME_NAME_LEN).collect()
}

/// The engine-side volume name for a session, e.g.
/// `sandbox_session_abc123`.
pub fn session_volume_name(session_id: &str) -> String {
    format!("sandbox_session_{}", sanitize_for_volume_name(session_id))
}

/// A handle to a session's durable volume. Opaque beyond its name: the
/// runner only needs the name to build a [`crate::engine::Mount`].
#[derive(Debug, Clone)]
pub struct VolumeHandle {
    name: String,
}

impl VolumeHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Looks up or lazily creates a session's durable volume. Round-trips the
/// engine on every call except for names already confirmed present in the
/// positive-only cache (spec §4.2: "no local cache is required... a small
/// positive-only cache is permitted").
pub struct VolumeRegistry {
    engine: Arc<dyn ContainerEngine>,
    known: Mutex<HashSet<String>>,
}

impl VolumeRegistry {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            known: Mutex::new(HashSet::new()),
        }
    }

    /// Get-or-create the volume backing `session_id`. Idempotent;
    /// concurrent callers for the same session converge on the same
    /// underlying volume because the engine's create is itself idempotent
    /// on a name collision.
    pub async fn ensure(&self, session_id: &str) -> SandboxResult<VolumeHandle> {
        let name = session_volume_name(session_id);

        if self.known.lock().contains(&name) {
            return Ok(VolumeHandle { name });
        }

        if self.engine.volume_exists(&name).await? {
            self.known.lock().insert(name.clone());
            return Ok(VolumeHandle { name });
        }

        match self.engine.create_volume(&name).await {
            Ok(()) => {
                self.known.lock().insert(name.clone());
                Ok(VolumeHandle { name })
            }
            Err(create_err) => {
                // The create may have lost a race with a concurrent
                // caller; retry the lookup once before surfacing the
                // error (spec §4.2 "retry the lookup once").
                if self.engine.volume_exists(&name).await.unwrap_or(false) {
                    self.known.lock().insert(name.clone());
                    Ok(VolumeHandle { name })
                } else {
                    self.known.lock().remove(&name);
                    Err(create_err)
                }
            }
        }
    }
}
