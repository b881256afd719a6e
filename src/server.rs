//! HTTP routing layer over the QA engine.
//!
//! Thin by design: handlers validate input, call the engine, and map
//! typed engine errors onto HTTP statuses. All answer-pipeline behavior
//! lives in [`crate::engine`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Answer a question (`use_cached_data` query param) |
//! | `GET`  | `/members` | List roster members |
//! | `GET`  | `/stats` | Corpus and cache statistics |
//! | `POST` | `/refresh` | Reload the corpus (`force` query param) |
//! | `GET`  | `/health` | Health check |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "data_unavailable", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `timeout` (408), `generation_failed`
//! (502), `embedding_failed` (502), `data_unavailable` (503).

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::engine::{EngineError, QaEngine};
use crate::generate::GenerationError;
use crate::models::AnswerResult;

#[derive(Clone)]
struct AppState {
    engine: Arc<QaEngine>,
}

/// Start the HTTP server on the configured bind address.
pub async fn run_server(config: &Config, engine: Arc<QaEngine>) -> anyhow::Result<()> {
    let state = AppState { engine };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ask", post(handle_ask))
        .route("/members", get(handle_members))
        .route("/stats", get(handle_stats))
        .route("/refresh", post(handle_refresh))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!(bind = %config.server.bind, "member QA server listening");

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::DataUnavailable(_) => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "data_unavailable",
                message: err.to_string(),
            },
            EngineError::Embedding(_) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "embedding_failed",
                message: err.to_string(),
            },
            EngineError::Generation(GenerationError::Timeout(_)) => AppError {
                status: StatusCode::REQUEST_TIMEOUT,
                code: "timeout",
                message: err.to_string(),
            },
            EngineError::Generation(_) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "generation_failed",
                message: err.to_string(),
            },
        }
    }
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Deserialize)]
struct AskParams {
    /// When false, force a refresh from the remote API before answering.
    #[serde(default = "default_use_cached")]
    use_cached_data: bool,
}

fn default_use_cached() -> bool {
    true
}

async fn handle_ask(
    State(state): State<AppState>,
    Query(params): Query<AskParams>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AnswerResult>, AppError> {
    if request.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let result = state
        .engine
        .answer(&request.question, params.use_cached_data)
        .await?;
    Ok(Json(result))
}

// ============ GET /members ============

#[derive(Serialize)]
struct MembersResponse {
    total_members: usize,
    members: Vec<String>,
}

async fn handle_members(State(state): State<AppState>) -> Json<MembersResponse> {
    let members: Vec<String> = state
        .engine
        .list_members()
        .iter()
        .map(|m| m.name.clone())
        .collect();
    Json(MembersResponse {
        total_members: members.len(),
        members,
    })
}

// ============ GET /stats ============

async fn handle_stats(
    State(state): State<AppState>,
) -> Result<Json<crate::engine::Stats>, AppError> {
    let stats = state.engine.stats().await?;
    Ok(Json(stats))
}

// ============ POST /refresh ============

#[derive(Deserialize)]
struct RefreshParams {
    #[serde(default)]
    force: bool,
}

#[derive(Serialize)]
struct RefreshResponse {
    status: String,
    source: String,
    note: String,
}

async fn handle_refresh(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<RefreshResponse>, AppError> {
    let source = state.engine.refresh(params.force).await?;
    Ok(Json(RefreshResponse {
        status: "ok".to_string(),
        source: source.as_str().to_string(),
        note: "In-memory cache updated; the local snapshot file is never modified.".to_string(),
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    message_count: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let message_count = match state.engine.stats().await {
        Ok(stats) => stats.total_messages,
        Err(_) => 0,
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        message_count,
    })
}
