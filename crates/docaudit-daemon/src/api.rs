use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use docaudit_core::{resolve_framework, Case, CaseId, Finding, Rule, Run, RunDebug, RunId, RunStatus};
use docaudit_runner::{CaseCreated, CaseRequest, RunStatusView, Runner, ServiceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Runner>,
}

impl AppState {
    pub fn new(runner: Arc<Runner>) -> Self {
        Self { runner }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/cases", post(create_case).get(list_cases))
        .route("/v1/cases/{case_id}/start", post(start_run))
        .route("/v1/runs/{run_id}", get(run_status))
        .route("/v1/runs/{run_id}/findings", get(run_findings))
        .route("/v1/runs/{run_id}/debug", get(run_debug))
        .route("/v1/runs/{run_id}/reset", post(reset_run))
        .route("/v1/frameworks/{key}/rules", get(framework_rules))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(m) => ApiError::BadRequest(m),
            ServiceError::NotFound(m) => ApiError::NotFound(m),
            ServiceError::Conflict(m) => ApiError::Conflict(m),
            ServiceError::Store(e) => ApiError::Internal(format!("{e:#}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(m) => {
                error!(error = %m, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (code, body).into_response()
    }
}

/// Run a synchronous runner call on the blocking pool; store calls hold a
/// database lock and must not stall the async workers.
async fn blocking<T, F>(st: &AppState, call: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Runner) -> Result<T, ServiceError> + Send + 'static,
{
    let runner = st.runner.clone();
    tokio::task::spawn_blocking(move || call(&runner))
        .await
        .map_err(|e| ApiError::Internal(format!("runner task failed: {e}")))?
        .map_err(ApiError::from)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn create_case(
    State(st): State<AppState>,
    Json(req): Json<CaseRequest>,
) -> Result<(StatusCode, Json<CaseCreated>), ApiError> {
    let created = blocking(&st, move |r| r.create_case(req)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_cases(State(st): State<AppState>) -> Result<Json<Vec<Case>>, ApiError> {
    Ok(Json(blocking(&st, |r| r.list_cases()).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub run_id: RunId,
    pub status: RunStatus,
}

/// Claims the run and hands it to a background task; the client polls
/// `/v1/runs/{run_id}` afterwards.
async fn start_run(
    State(st): State<AppState>,
    Path(case_id): Path<CaseId>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let run_id = blocking(&st, move |r| r.start_run(case_id)).await?;
    let runner = st.runner.clone();
    tokio::spawn(async move {
        if let Err(e) = runner.process_run(run_id).await {
            error!(run_id = %run_id, error = %format!("{e:#}"), "process_run failed");
        }
    });
    info!(case_id = %case_id, run_id = %run_id, "run scheduled");
    Ok((
        StatusCode::ACCEPTED,
        Json(StartResponse {
            run_id,
            status: RunStatus::Running,
        }),
    ))
}

async fn run_status(State(st): State<AppState>, Path(run_id): Path<RunId>) -> Result<Json<RunStatusView>, ApiError> {
    Ok(Json(blocking(&st, move |r| r.run_status(run_id)).await?))
}

async fn run_findings(State(st): State<AppState>, Path(run_id): Path<RunId>) -> Result<Json<Vec<Finding>>, ApiError> {
    Ok(Json(blocking(&st, move |r| r.findings(run_id)).await?))
}

async fn run_debug(State(st): State<AppState>, Path(run_id): Path<RunId>) -> Result<Json<RunDebug>, ApiError> {
    blocking(&st, move |r| r.run_debug(run_id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no debug payload for run {run_id}")))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetParams {
    #[serde(default)]
    pub force: bool,
}

async fn reset_run(
    State(st): State<AppState>,
    Path(run_id): Path<RunId>,
    Query(params): Query<ResetParams>,
) -> Result<Json<Run>, ApiError> {
    Ok(Json(blocking(&st, move |r| r.reset_run(run_id, params.force)).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FrameworkRules {
    pub key: String,
    pub name: String,
    pub version: String,
    pub rules: Vec<Rule>,
}

async fn framework_rules(Path(key): Path<String>) -> Json<FrameworkRules> {
    let framework = resolve_framework(&key);
    Json(FrameworkRules {
        key: framework.key.to_string(),
        name: framework.name.to_string(),
        version: framework.version.to_string(),
        rules: framework.rules(),
    })
}
