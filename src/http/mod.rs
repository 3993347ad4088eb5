//! The thin HTTP transport adapter (spec §6.2): routes requests to the
//! facades and is the only place a [`SandboxError`] is mapped to a
//! status code (spec §7 "Propagation").

pub mod models;

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::engine::ContainerEngine;
use crate::error::SandboxError;
use crate::facade::{ExecutionFacade, FileOpsFacade};
use models::{
    DirectoryCreatedResponse, ErrorResponse, FileContentResponse, FileListResponse,
    FileWriteRequest, HealthResponse, PathQuery, PythonCodeRequest, PythonScriptRequest,
    ShellCommandRequest, ShellResultResponse,
};

const STDERR_TAIL_LINES: usize = 10;

/// Shared application state handed to every handler.
pub struct AppState {
    pub execution: ExecutionFacade,
    pub fileops: FileOpsFacade,
    pub engine: Arc<dyn ContainerEngine>,
}

/// Build the full axum router, wired with a request tracing layer
/// (spec's ambient logging concern carried through the transport layer).
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/execute/python/chart", post(execute_chart))
        .route("/execute/shell", post(execute_shell))
        .route("/execute/python/script", post(execute_script))
        .route(
            "/sessions/{sid}/files",
            get(list_files).delete(delete_path),
        )
        .route(
            "/sessions/{sid}/files/content",
            get(read_file).put(write_file),
        )
        .route("/sessions/{sid}/files/directories", post(create_directory))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wraps [`SandboxError`] so it can implement [`IntoResponse`] (spec §7's
/// error taxonomy → status code table).
struct ApiError(SandboxError);

impl From<SandboxError> for ApiError {
    fn from(err: SandboxError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self.0 {
            SandboxError::InvalidPath(msg) => {
                (StatusCode::BAD_REQUEST, format!("Invalid path: {msg}"))
            }
            SandboxError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            SandboxError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            SandboxError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            SandboxError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            SandboxError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            SandboxError::Timeout { timeout_secs } => (
                StatusCode::REQUEST_TIMEOUT,
                format!("Request timed out after {timeout_secs}s"),
            ),
            SandboxError::StorageUnavailable(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            SandboxError::Engine(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            SandboxError::BadConfig(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            SandboxError::UserExecution {
                exit_code,
                stderr_tail,
            } => (
                StatusCode::BAD_REQUEST,
                format!(
                    "Python script execution failed (Exit Code: {exit_code}).\nStderr (Last {STDERR_TAIL_LINES} lines):\n{stderr_tail}"
                ),
            ),
            SandboxError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
        };

        tracing::warn!(status = %status, detail = %detail, "request failed");
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let engine_status = match state.engine.ping().await {
        Ok(()) => "available",
        Err(_) => "error connecting",
    };
    Json(HealthResponse {
        status: "ok",
        engine_status,
    })
}

async fn execute_chart(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PythonCodeRequest>,
) -> Result<Response, ApiError> {
    let outcome = state.execution.chart(&payload.code).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], outcome.png_bytes).into_response())
}

async fn execute_shell(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ShellCommandRequest>,
) -> Result<Json<ShellResultResponse>, ApiError> {
    if payload.command.trim().is_empty() {
        return Err(SandboxError::Validation("Shell command cannot be empty.".into()).into());
    }
    if payload.session_id.trim().is_empty() {
        return Err(SandboxError::Validation("session_id cannot be empty.".into()).into());
    }

    let outcome = state
        .execution
        .shell(&payload.session_id, &payload.command, payload.environment)
        .await?;

    Ok(Json(ShellResultResponse {
        stdout: outcome.stdout,
        stderr: outcome.stderr,
        exit_code: outcome.exit_code,
    }))
}

async fn execute_script(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PythonScriptRequest>,
) -> Result<Json<ShellResultResponse>, ApiError> {
    if payload.code.trim().is_empty() {
        return Err(SandboxError::Validation("Python code cannot be empty.".into()).into());
    }
    if payload.session_id.trim().is_empty() {
        return Err(SandboxError::Validation("session_id cannot be empty.".into()).into());
    }

    let outcome = state
        .execution
        .script(&payload.session_id, &payload.code, payload.environment)
        .await?;

    Ok(Json(ShellResultResponse {
        stdout: outcome.stdout,
        stderr: outcome.stderr,
        exit_code: outcome.exit_code,
    }))
}

async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<Json<FileListResponse>, ApiError> {
    let (path, entries) = state.fileops.list(&sid, &query.path).await?;
    Ok(Json(FileListResponse {
        path,
        entries: entries.into_iter().map(Into::into).collect(),
    }))
}

async fn read_file(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<Json<FileContentResponse>, ApiError> {
    let (path, content) = state.fileops.read(&sid, &query.path).await?;
    Ok(Json(FileContentResponse { path, content }))
}

async fn write_file(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
    Query(query): Query<PathQuery>,
    Json(payload): Json<FileWriteRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .fileops
        .write(&sid, &query.path, &payload.content)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_path(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<StatusCode, ApiError> {
    state.fileops.delete(&sid, &query.path).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_directory(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<(StatusCode, Json<DirectoryCreatedResponse>), ApiError> {
    let path = state.fileops.mkdir(&sid, &query.path).await?;
    Ok((
        StatusCode::CREATED,
        Json(DirectoryCreatedResponse {
            message: "Directory created successfully",
            path,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::engine::fake::{FakeEngine, ScriptedOutcome};
    use crate::engine::WaitOutcome;
    use crate::runner::ContainerRunner;
    use crate::volumes::VolumeRegistry;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn test_config() -> Arc<ServiceConfig> {
        Arc::new(ServiceConfig {
            image_name: "python-chart-sandbox:latest".into(),
            container_run_timeout: 60,
            script_run_timeout: 180,
            workspace_dir: "/workspace".into(),
            default_mem_limit: "256m".into(),
            default_network_mode: "none".into(),
            bind_addr: "0.0.0.0:8000".parse().unwrap(),
            passthrough_env: HashMap::new(),
        })
    }

    fn app(engine: Arc<FakeEngine>) -> Router {
        let config = test_config();
        let volumes = Arc::new(VolumeRegistry::new(engine.clone()));
        let runner = Arc::new(ContainerRunner::new(engine.clone(), volumes));
        let state = Arc::new(AppState {
            execution: ExecutionFacade::new(runner.clone(), config.clone()),
            fileops: FileOpsFacade::new(runner, config),
            engine,
        });
        router(state)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok_when_engine_pings() {
        let app = app(Arc::new(FakeEngine::new()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["engine_status"], "available");
    }

    #[tokio::test]
    async fn health_reports_error_connecting_when_engine_unreachable() {
        let engine = Arc::new(FakeEngine::new());
        engine.fail_ping();
        let app = app(engine);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["engine_status"], "error connecting");
    }

    #[tokio::test]
    async fn chart_user_error_is_400_with_exit_code_and_message() {
        let engine = Arc::new(FakeEngine::new());
        engine.script_default(ScriptedOutcome {
            wait: WaitOutcome::Exited(1),
            stdout: String::new(),
            stderr: "ZeroDivisionError: division by zero".into(),
        });
        let app = app(engine);

        let response = app
            .oneshot(
                Request::post("/execute/python/chart")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"code": "x = 1/0"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.contains("Exit Code: 1"));
        assert!(detail.contains("division by zero"));
    }

    #[tokio::test]
    async fn shell_requires_nonempty_command_and_session() {
        let app = app(Arc::new(FakeEngine::new()));
        let response = app
            .oneshot(
                Request::post("/execute/shell")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"session_id": "S1", "command": ""}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn path_escape_is_400_with_invalid_path_detail() {
        let app = app(Arc::new(FakeEngine::new()));
        let response = app
            .oneshot(
                Request::get("/sessions/X/files?path=../outside")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["detail"].as_str().unwrap().contains("Invalid path"));
    }

    #[tokio::test]
    async fn list_parses_ls_af_entries() {
        let engine = Arc::new(FakeEngine::new());
        engine.script_default(ScriptedOutcome {
            wait: WaitOutcome::Exited(0),
            stdout: "f1.txt\nf2.log\nsub/\n".into(),
            stderr: String::new(),
        });
        let app = app(engine);

        let response = app
            .oneshot(
                Request::get("/sessions/X/files?path=d")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let entries = body["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2]["name"], "sub");
        assert_eq!(entries[2]["type"], "directory");
    }

    #[tokio::test]
    async fn shell_timeout_is_408() {
        let engine = Arc::new(FakeEngine::new());
        engine.script_default(ScriptedOutcome {
            wait: WaitOutcome::TimedOut,
            stdout: String::new(),
            stderr: String::new(),
        });
        let app = app(engine);

        let response = app
            .oneshot(
                Request::post("/execute/shell")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"session_id": "S1", "command": "sleep 999"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn mkdir_conflict_is_409() {
        let engine = Arc::new(FakeEngine::new());
        engine.script_default(ScriptedOutcome {
            wait: WaitOutcome::Exited(1),
            stdout: String::new(),
            stderr: "mkdir: cannot create directory 'x': File exists".into(),
        });
        let app = app(engine);

        let response = app
            .oneshot(
                Request::post("/sessions/X/files/directories?path=x")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn delete_and_write_return_no_content() {
        let engine = Arc::new(FakeEngine::new());
        engine.script_default(ScriptedOutcome {
            wait: WaitOutcome::Exited(0),
            stdout: String::new(),
            stderr: String::new(),
        });
        let app = app(engine.clone());

        let delete_response = app
            .clone()
            .oneshot(
                Request::delete("/sessions/X/files?path=a.txt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(delete_response.status(), StatusCode::NO_CONTENT);

        let write_response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/sessions/X/files/content?path=a.txt")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"content": "hello"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(write_response.status(), StatusCode::NO_CONTENT);
    }
}
