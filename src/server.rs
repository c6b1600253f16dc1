//! HTTP API server.
//!
//! Exposes the generation, export, status, and auth endpoints consumed by
//! the web frontend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/generate` | Stream generated documentation for a text/code block |
//! | `POST` | `/api/pdf` | Export a finished text blob as a PDF download |
//! | `GET`  | `/api/status` | Outbound connectivity indicator |
//! | `POST` | `/api/auth/register` | Create a user |
//! | `POST` | `/api/auth/login` | Verify credentials, issue a session token |
//! | `GET`  | `/api/auth/profile` | Resolve a bearer token to its user |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Streaming contract
//!
//! `/api/generate` always completes at the transport level; upstream
//! failures appear as a single in-band diagnostic line. Streamed responses
//! carry `Cache-Control: no-cache` and `X-Accel-Buffering: no` so proxies
//! neither cache nor buffer them, plus `X-Generation-Mode` naming the prompt
//! strategy that produced the answer.
//!
//! # Error Contract
//!
//! Non-streaming error responses follow one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "code must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `conflict` (409),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support the browser
//! frontend during local development.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::auth;
use crate::config::Config;
use crate::db;
use crate::export;
use crate::migrate;
use crate::probe;
use crate::prompt::{self, PromptSelector};
use crate::relay;

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub selector: Arc<dyn PromptSelector>,
    pub pool: SqlitePool,
}

impl AppState {
    /// Build state from config: connects the database, runs migrations, and
    /// instantiates the configured prompt selector.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::run_migrations(&pool).await?;
        let selector = Arc::from(prompt::create_selector(&config));
        Ok(Self {
            config: Arc::new(config),
            selector,
            pool,
        })
    }
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and serves until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::from_config(config.clone()).await?;
    let app = build_router(state);

    tracing::info!("listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Assemble the router. Split out of [`run_server`] so tests can drive the
/// app on an ephemeral port.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/generate", post(handle_generate))
        .route("/api/pdf", post(handle_pdf))
        .route("/api/status", get(handle_status))
        .route("/api/auth/register", post(handle_register))
        .route("/api/auth/login", post(handle_login))
        .route("/api/auth/profile", get(handle_profile))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

fn conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "conflict".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map auth-layer failures to HTTP statuses without a custom error type in
/// the auth module.
fn classify_auth_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();

    if msg.contains("already taken") {
        conflict(msg)
    } else if msg.contains("invalid credentials")
        || msg.contains("invalid token")
        || msg.contains("token expired")
    {
        unauthorized(msg)
    } else if msg.contains("must") {
        bad_request(msg)
    } else {
        internal(msg)
    }
}

// ============ POST /api/generate ============

#[derive(Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    code: String,
}

/// Handler for `POST /api/generate`.
///
/// Builds a prompt via the configured selector and relays the upstream
/// generation stream to the client. Empty input is rejected before any
/// upstream connection is opened.
async fn handle_generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Response, AppError> {
    let input = request.code.trim().to_string();
    if input.is_empty() {
        return Err(bad_request("code must not be empty"));
    }

    let plan = state.selector.select(&input).await;
    tracing::debug!(strategy = plan.strategy.tag(), "prompt selected");

    let stream = relay::stream_generation(state.config.inference.clone(), plan.prompt);

    Response::builder()
        .header(header::CONTENT_TYPE, "text/markdown; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Accel-Buffering", "no")
        .header("X-Generation-Mode", plan.strategy.tag())
        .body(Body::from_stream(stream))
        .map_err(|e| internal(e.to_string()))
}

// ============ POST /api/pdf ============

#[derive(Deserialize)]
struct PdfRequest {
    #[serde(default)]
    docs: String,
}

/// Handler for `POST /api/pdf`.
///
/// Writes the text as a PDF and returns it as a binary attachment. Empty
/// input yields a JSON error object and never reaches the exporter.
async fn handle_pdf(
    State(state): State<AppState>,
    Json(request): Json<PdfRequest>,
) -> Result<Response, AppError> {
    if request.docs.trim().is_empty() {
        return Err(bad_request("no documentation provided"));
    }

    let path = export::write_pdf(&state.config.export, &request.docs)
        .map_err(|e| internal(e.to_string()))?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| internal(e.to_string()))?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("documentation.pdf")
        .to_string();

    Response::builder()
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(bytes))
        .map_err(|e| internal(e.to_string()))
}

// ============ GET /api/status ============

#[derive(Serialize)]
struct StatusResponse {
    online: bool,
}

/// Handler for `GET /api/status`.
///
/// Reports whether the outbound reachability probe succeeded. Used by the
/// frontend's online/offline badge.
async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let grounding = &state.config.grounding;
    let online = probe::is_online(
        &grounding.probe_addr,
        Duration::from_secs(grounding.probe_timeout_secs),
    )
    .await;
    Json(StatusResponse { online })
}

// ============ Auth endpoints ============

#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Handler for `POST /api/auth/register`.
async fn handle_register(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse, AppError> {
    let record = auth::register(&state.pool, &credentials.username, &credentials.password)
        .await
        .map_err(classify_auth_error)?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Handler for `POST /api/auth/login`.
async fn handle_login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse, AppError> {
    let session = auth::login(
        &state.pool,
        &state.config.auth,
        &credentials.username,
        &credentials.password,
    )
    .await
    .map_err(classify_auth_error)?;
    Ok(Json(session))
}

/// Handler for `GET /api/auth/profile`.
///
/// Expects an `Authorization: Bearer <token>` header.
async fn handle_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| unauthorized("missing bearer token"))?;

    let record = auth::authenticate(&state.pool, &state.config.auth, token)
        .await
        .map_err(classify_auth_error)?;
    Ok(Json(record))
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
