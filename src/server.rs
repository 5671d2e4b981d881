//! JSON HTTP API over the analysis pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/analyze` | Start an analysis, returns `repo_id` immediately |
//! | `GET`  | `/api/status/{repo_id}` | Current session status |
//! | `GET`  | `/api/analysis/{repo_id}` | Full analysis (completed repos only) |
//! | `POST` | `/api/ask` | Grounded question about a completed analysis |
//! | `POST` | `/api/compare` | Compare stored analyses across 2-5 repositories |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses carry a machine-readable code:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "repository not found: ..." } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `still_processing` (409),
//! `analysis_failed` (409), `timeout` (408), `upstream` (502), `internal` (500).
//! Status codes derive from the error variant, never from message text.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::compare::{ComparisonKind, ComparisonReport};
use crate::error::LensError;
use crate::models::{QaRecord, StatusReport};
use crate::orchestrate::{AnalysisTicket, Orchestrator};
use crate::schema::RepositoryAnalysis;

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

/// Binds to `[server].bind` and serves until the process is terminated.
pub async fn run_server(orchestrator: Arc<Orchestrator>, bind_addr: &str) -> anyhow::Result<()> {
    let state = AppState { orchestrator };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/analyze", post(handle_analyze))
        .route("/api/status/{repo_id}", get(handle_status))
        .route("/api/analysis/{repo_id}", get(handle_analysis))
        .route("/api/ask", post(handle_ask))
        .route("/api/compare", post(handle_compare))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Maps domain errors to HTTP responses by variant.
impl From<LensError> for AppError {
    fn from(err: LensError) -> Self {
        let (status, code) = match &err {
            LensError::InvalidUrl(_) | LensError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            LensError::NotFound(_) | LensError::HostNotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            LensError::Processing(_) => (StatusCode::CONFLICT, "still_processing"),
            LensError::Failed(_) => (StatusCode::CONFLICT, "analysis_failed"),
            LensError::Timeout(_) => (StatusCode::REQUEST_TIMEOUT, "timeout"),
            LensError::HostRateLimited | LensError::Network(_) => {
                (StatusCode::BAD_GATEWAY, "upstream")
            }
            LensError::BadModelResponse(_)
            | LensError::Storage(_)
            | LensError::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/analyze ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    repo_url: String,
}

async fn handle_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisTicket>, AppError> {
    if request.repo_url.trim().is_empty() {
        return Err(AppError {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: "repo_url must not be empty".to_string(),
        });
    }
    let ticket = state.orchestrator.start_analysis(&request.repo_url).await?;
    Ok(Json(ticket))
}

// ============ GET /api/status/{repo_id} ============

async fn handle_status(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
) -> Result<Json<StatusReport>, AppError> {
    let report = state.orchestrator.get_status(&repo_id).await?;
    Ok(Json(report))
}

// ============ GET /api/analysis/{repo_id} ============

async fn handle_analysis(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
) -> Result<Json<RepositoryAnalysis>, AppError> {
    let analysis = state.orchestrator.get_analysis(&repo_id).await?;
    Ok(Json(analysis))
}

// ============ POST /api/ask ============

#[derive(Deserialize)]
struct AskRequest {
    repo_id: String,
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<QaRecord>, AppError> {
    if request.question.trim().is_empty() {
        return Err(AppError {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: "question must not be empty".to_string(),
        });
    }
    let record = state
        .orchestrator
        .ask(&request.repo_id, &request.question)
        .await?;
    Ok(Json(record))
}

// ============ POST /api/compare ============

fn default_comparison_type() -> String {
    "tech_stack".to_string()
}

#[derive(Deserialize)]
struct CompareRequest {
    repo_ids: Vec<String>,
    #[serde(default = "default_comparison_type")]
    comparison_type: String,
}

async fn handle_compare(
    State(state): State<AppState>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<ComparisonReport>, AppError> {
    let kind = ComparisonKind::parse(&request.comparison_type)?;
    let report = state.orchestrator.compare(&request.repo_ids, kind).await?;
    Ok(Json(report))
}
