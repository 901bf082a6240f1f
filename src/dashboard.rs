//! Staff dashboard API
//!
//! JSON routes over the moderation service. Everything under `/api` except
//! `check-auth` requires one of the configured bearer tokens.

use crate::moderation::{
    MAX_TIMEOUT_MINUTES, MemberSummary, ModerationError, ModerationService, PlatformError,
};
use crate::stats::StatsReport;
use crate::store::Entry;
use axum::{
    Json, Router,
    extract::{Path, Request, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// State shared by every dashboard handler
#[derive(Clone)]
pub struct AppState {
    pub moderation: Arc<ModerationService>,
    tokens: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(moderation: Arc<ModerationService>, tokens: Vec<String>) -> Self {
        if tokens.is_empty() {
            warn!("No dashboard tokens configured; every protected route will answer 401");
        }
        Self {
            moderation,
            tokens: Arc::new(tokens),
        }
    }

    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        bearer_token(headers).is_some_and(|token| self.tokens.iter().any(|t| t == token))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Failures a dashboard handler can answer with
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Platform request failed: {0}")]
    Upstream(#[from] PlatformError),
}

impl From<ModerationError> for ApiError {
    fn from(error: ModerationError) -> Self {
        match error {
            ModerationError::SubjectNotFound(query) if query.is_empty() => {
                Self::BadRequest("No query provided".to_string())
            }
            ModerationError::SubjectNotFound(_) => Self::NotFound("User not found".to_string()),
            ModerationError::Platform(e) => Self::Upstream(e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Body of the action routes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub user_id: String,
    pub reason: Option<String>,
    /// Only read by `/api/timeout`
    pub minutes: Option<u64>,
}

impl ActionRequest {
    fn subject(&self) -> Result<&str, ApiError> {
        let subject = self.user_id.trim();
        if subject.is_empty() {
            return Err(ApiError::BadRequest("No userId provided".to_string()));
        }
        Ok(subject)
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn message(text: String) -> Json<MessageResponse> {
    Json(MessageResponse { message: text })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningsResponse {
    pub user_id: String,
    pub warnings: Vec<Entry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrikesResponse {
    pub user_id: String,
    pub strikes: Vec<Entry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrikeResponse {
    pub message: String,
    pub total_count: usize,
}

/// Build the dashboard router
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/check-auth", get(check_auth));

    let protected_routes = Router::new()
        .route("/api/warn", post(warn_user))
        .route("/api/unwarn", post(unwarn_user))
        .route("/api/warnings/:id", get(list_warnings))
        .route("/api/strike", post(strike_user))
        .route("/api/strikes/:id", get(list_strikes))
        .route("/api/stats", get(stats))
        .route("/api/ban", post(ban_user))
        .route("/api/unban", post(unban_user))
        .route("/api/kick", post(kick_user))
        .route("/api/timeout", post(timeout_user))
        .route("/api/untimeout", post(untimeout_user))
        .route("/api/resolve-user", post(resolve_user))
        .layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Bind `bind` and serve the dashboard until the process exits
///
/// # Errors
/// Fails if the address cannot be bound or the server stops with an I/O error.
pub async fn serve(bind: &str, state: AppState) -> Result<(), crate::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Dashboard listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.is_authorized(request.headers()) {
        Ok(next.run(request).await)
    } else {
        warn!("Unauthorized request to {}", request.uri().path());
        Err(ApiError::Unauthorized)
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn check_auth(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.is_authorized(&headers) {
        Json(json!({ "loggedIn": true })).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "loggedIn": false }))).into_response()
    }
}

async fn warn_user(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(request) = payload?;
    let subject = request.subject()?;
    state.moderation.warn(subject, request.reason.as_deref()).await;
    Ok(message(format!("Warned {subject}")))
}

async fn unwarn_user(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(request) = payload?;
    let subject = request.subject()?;
    state.moderation.clear_warnings(subject).await;
    Ok(message(format!("Cleared warnings for {subject}")))
}

async fn list_warnings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<WarningsResponse> {
    Json(WarningsResponse {
        warnings: state.moderation.list_warnings(&id),
        user_id: id,
    })
}

async fn strike_user(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> ApiResult<StrikeResponse> {
    let Json(request) = payload?;
    let subject = request.subject()?;
    let outcome = state.moderation.strike(subject, request.reason.as_deref()).await;
    Ok(Json(StrikeResponse {
        message: format!("Strike {} for {subject}", outcome.total_count),
        total_count: outcome.total_count,
    }))
}

async fn list_strikes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<StrikesResponse> {
    Json(StrikesResponse {
        strikes: state.moderation.list_strikes(&id),
        user_id: id,
    })
}

async fn stats(State(state): State<AppState>) -> Json<StatsReport> {
    Json(state.moderation.stats_report())
}

async fn ban_user(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(request) = payload?;
    let subject = request.subject()?;
    state.moderation.ban(subject, request.reason.as_deref()).await?;
    Ok(message(format!("Banned {subject}")))
}

async fn unban_user(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(request) = payload?;
    let subject = request.subject()?;
    state.moderation.unban(subject).await?;
    Ok(message(format!("Unbanned {subject}")))
}

async fn kick_user(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(request) = payload?;
    let subject = request.subject()?;
    state.moderation.kick(subject, request.reason.as_deref()).await?;
    Ok(message(format!("Kicked {subject}")))
}

async fn timeout_user(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(request) = payload?;
    let subject = request.subject()?;
    let duration = request.minutes.map(timeout_length).transpose()?;
    let applied = state
        .moderation
        .timeout(subject, request.reason.as_deref(), duration)
        .await?;
    Ok(message(format!(
        "Timed out {subject} for {} minutes",
        applied.as_secs() / 60
    )))
}

/// Minutes from a request as a timeout length, within Discord's cap
fn timeout_length(minutes: u64) -> Result<Duration, ApiError> {
    if minutes == 0 || minutes > MAX_TIMEOUT_MINUTES {
        return Err(ApiError::BadRequest(format!(
            "minutes must be between 1 and {MAX_TIMEOUT_MINUTES}"
        )));
    }
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ApiError::BadRequest("minutes is too large".to_string()))
}

async fn untimeout_user(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(request) = payload?;
    let subject = request.subject()?;
    state.moderation.untimeout(subject).await?;
    Ok(message(format!("Removed timeout {subject}")))
}

async fn resolve_user(
    State(state): State<AppState>,
    payload: Result<Json<ResolveRequest>, JsonRejection>,
) -> ApiResult<MemberSummary> {
    let Json(request) = payload?;
    let member = state.moderation.resolve_subject(&request.query).await?;
    Ok(Json(member))
}
