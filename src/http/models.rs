//! Request/response DTOs for the HTTP surface (spec §6.2).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::facade::fileops::{EntryKind, FileEntry};

#[derive(Debug, Deserialize)]
pub struct PythonCodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ShellCommandRequest {
    pub session_id: String,
    pub command: String,
    pub environment: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct PythonScriptRequest {
    pub session_id: String,
    pub code: String,
    pub environment: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
pub struct ShellResultResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub engine_status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FileEntryResponse {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl From<FileEntry> for FileEntryResponse {
    fn from(entry: FileEntry) -> Self {
        Self {
            name: entry.name,
            kind: entry.kind.as_str(),
        }
    }
}

impl From<EntryKind> for &'static str {
    fn from(kind: EntryKind) -> Self {
        kind.as_str()
    }
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub path: String,
    pub entries: Vec<FileEntryResponse>,
}

#[derive(Debug, Serialize)]
pub struct FileContentResponse {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct FileWriteRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct DirectoryCreatedResponse {
    pub message: &'static str,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}
