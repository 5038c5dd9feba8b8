//! REST API server.
//!
//! All API routes live under `server.api_prefix` (default `/api/v1`).
//! Callers are identified by headers set by the upstream auth layer.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/manifestation/generate` | Generate, store and index a passage |
//! | `POST` | `/search` | Semantic search over the caller's passages |
//! | `POST` | `/voice/generate` | Synthesize a stored passage |
//! | `GET`  | `/history` | Caller's passages, newest first (`skip`, `limit`) |
//! | `GET`  | `/history/{id}` | One of the caller's passages |
//! | `GET`  | `/usage/summary` | Caller's usage totals |
//! | `GET`  | `/health` | Health check, outside the prefix |
//! | `GET`  | `/static/*` | Generated audio files |
//!
//! # Identity
//!
//! - `X-User-Id`: required on every API route; `401` when absent.
//! - `X-User-Name`: optional; names generated audio files.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "manifestation 7 not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embeddings_disabled` (400),
//! `unauthorized` (401), `not_found` (404), `configuration` (500),
//! `internal` (500), `upstream_error` (502).

use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::app::AppContext;
use crate::config::Config;
use crate::error::ServiceError;
use crate::generate::{generate_passage, GenerationResponse};
use crate::history::{self, HistoryItem, DEFAULT_PAGE_SIZE};
use crate::models::UserProfile;
use crate::search::{search_passages, SearchResultItem};
use crate::tts::{Accent, STATIC_URL_PREFIX};
use crate::usage::{self, UsageSummary};
use crate::voice::{generate_voice, VoiceResponse};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Starts the HTTP server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> Result<()> {
    let bind_addr = config.server.bind.clone();
    let ctx = AppContext::from_config(config.clone()).await?;
    let app = build_router(ctx)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    println!("envision listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the full router: API routes, health, static files and layers.
pub fn build_router(ctx: AppContext) -> Result<Router> {
    let static_dir = ctx.config.server.static_dir.clone();
    std::fs::create_dir_all(static_dir.join("audio"))
        .with_context(|| format!("failed to create {}", static_dir.display()))?;

    let cors = cors_layer(&ctx.config.server.cors_origins)?;
    let prefix = ctx.config.server.api_prefix.trim_end_matches('/').to_string();
    anyhow::ensure!(
        prefix.is_empty() || prefix.starts_with('/'),
        "server.api_prefix must be empty or start with '/'"
    );

    let api = Router::new()
        .route("/manifestation/generate", post(handle_generate))
        .route("/search", post(handle_search))
        .route("/voice/generate", post(handle_voice))
        .route("/history", get(handle_history))
        .route("/history/{id}", get(handle_history_item))
        .route("/usage/summary", get(handle_usage_summary));

    let router = if prefix.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(&prefix, api)
    };

    Ok(router
        .route("/health", get(handle_health))
        .nest_service(STATIC_URL_PREFIX, ServeDir::new(static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx))
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }

    let values = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin: {}", o))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(values)))
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

pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
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

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let (status, code) = match &err {
            ServiceError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration"),
            ServiceError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ServiceError::EmbeddingsDisabled => (StatusCode::BAD_REQUEST, "embeddings_disabled"),
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServiceError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            ServiceError::Database(_) | ServiceError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };

        if status.is_server_error() {
            tracing::error!(code, error = %err, "request failed");
        }
        AppError::new(status, code, err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

// ============ Caller identity ============

/// The authenticated caller, taken from `X-User-Id` / `X-User-Name`.
pub struct Caller {
    pub id: String,
    pub name: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let id = header(USER_ID_HEADER).ok_or_else(|| {
            AppError::new(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "missing X-User-Id header",
            )
        })?;

        Ok(Caller {
            id,
            name: header(USER_NAME_HEADER),
        })
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

// ============ POST /manifestation/generate ============

async fn handle_generate(
    State(ctx): State<AppContext>,
    caller: Caller,
    body: Result<Json<UserProfile>, JsonRejection>,
) -> Result<Json<GenerationResponse>, AppError> {
    let Json(profile) = body?;
    let response = generate_passage(&ctx, &caller.id, &profile).await?;
    Ok(Json(response))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

async fn handle_search(
    State(ctx): State<AppContext>,
    caller: Caller,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<Vec<SearchResultItem>>, AppError> {
    let Json(req) = body?;
    let results = search_passages(&ctx, &caller.id, &req.query, req.limit).await?;
    Ok(Json(results))
}

// ============ POST /voice/generate ============

#[derive(Deserialize)]
struct VoiceRequest {
    manifestation_id: i64,
    #[serde(default)]
    accent: Accent,
}

async fn handle_voice(
    State(ctx): State<AppContext>,
    caller: Caller,
    body: Result<Json<VoiceRequest>, JsonRejection>,
) -> Result<Json<VoiceResponse>, AppError> {
    let Json(req) = body?;
    let response = generate_voice(
        &ctx,
        &caller.id,
        caller.name.as_deref(),
        req.manifestation_id,
        req.accent,
    )
    .await?;
    Ok(Json(response))
}

// ============ GET /history ============

#[derive(Deserialize)]
struct HistoryParams {
    #[serde(default)]
    skip: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

async fn handle_history(
    State(ctx): State<AppContext>,
    caller: Caller,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<HistoryItem>>, AppError> {
    let Query(params) = params?;
    let passages = history::list(
        &ctx.pool,
        &caller.id,
        params.skip.unwrap_or(0),
        params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    )
    .await?;

    let preview_chars = ctx.config.retrieval.preview_chars;
    Ok(Json(
        passages
            .iter()
            .map(|p| HistoryItem::from_passage(p, preview_chars))
            .collect(),
    ))
}

async fn handle_history_item(
    State(ctx): State<AppContext>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<HistoryItem>, AppError> {
    let Path(id) = id?;
    let passage = history::get_owned(&ctx.pool, &caller.id, id).await?;
    Ok(Json(HistoryItem::from_passage(
        &passage,
        ctx.config.retrieval.preview_chars,
    )))
}

// ============ GET /usage/summary ============

async fn handle_usage_summary(
    State(ctx): State<AppContext>,
    caller: Caller,
) -> Result<Json<UsageSummary>, AppError> {
    Ok(Json(usage::summary(&ctx.pool, &caller.id).await?))
}
