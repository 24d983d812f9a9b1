//! HTTP Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use dispatch_core::{
    DispatchError, Message, Model, Session, SessionConfig, SessionId, SessionStore,
    registry::EngineStatus, summary,
};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub engines: Vec<EngineStatus>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub app_id: Option<u64>,
    #[serde(default)]
    pub config: SessionConfig,
    #[serde(default)]
    pub ephemeral: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DispatchRequest {
    /// Overrides the session's model for this turn
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub session_id: SessionId,
    pub message: Message,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(e: &DispatchError) -> ApiError {
    let status = match e {
        DispatchError::MissingEngine(_) | DispatchError::UnknownEngine(_) => StatusCode::BAD_REQUEST,
        DispatchError::MissingApp(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DispatchError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        DispatchError::Provider { .. } | DispatchError::Decode { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(code = e.code(), "{e}");
    }
    (
        status,
        Json(ErrorResponse {
            error: e.user_message(),
            code: e.code().into(),
        }),
    )
}

async fn load_session(state: &AppState, id: &SessionId) -> Result<Session, ApiError> {
    state
        .store
        .session(id)
        .await
        .map_err(|e| api_error(&e))?
        .ok_or_else(|| api_error(&DispatchError::SessionNotFound(id.clone())))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check with per-engine connectivity
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let engines = state.registry().await.status().await;

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        engines,
    })
}

/// Every model of every engine
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<Model>> {
    Json(state.registry().await.models())
}

/// Re-enumerate models and swap in the new registry
pub async fn refresh_engines(State(state): State<AppState>) -> Json<Vec<Model>> {
    let refreshed = state.registry().await.refresh().await;
    let registry = state.replace_registry(refreshed).await;
    tracing::info!(engines = registry.len(), models = registry.models().len(), "engines refreshed");
    Json(registry.models())
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> ApiResult<Session> {
    let mut session = Session::new(payload.app_id, payload.config);
    if payload.ephemeral {
        session = session.ephemeral();
    }
    let session = state.store.create(session).await.map_err(|e| api_error(&e))?;
    tracing::info!(session = %session.id, model = %session.config.model, "session created");
    Ok(Json(session))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Message>> {
    let id = SessionId::from_string(id);
    let messages = state.store.messages(&id).await.map_err(|e| api_error(&e))?;
    Ok(Json(messages))
}

/// Run one user turn, tool calls included
pub async fn dispatch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<DispatchRequest>,
) -> ApiResult<DispatchResponse> {
    let id = SessionId::from_string(id);
    let lock = state.session_lock(&id).await;
    let result = {
        let _guard = lock.lock().await;
        dispatch_locked(&state, id.clone(), payload).await
    };
    drop(lock);
    state.release_session_lock(&id).await;
    result
}

async fn dispatch_locked(
    state: &AppState,
    id: SessionId,
    payload: DispatchRequest,
) -> ApiResult<DispatchResponse> {
    let session = load_session(state, &id).await?;
    let model = payload
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| session.config.model.clone());

    let prompt = payload.prompt.as_deref().filter(|p| !p.trim().is_empty());
    let message = state
        .dispatcher()
        .await
        .dispatch(&session, &model, prompt)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(DispatchResponse {
        session_id: id,
        message,
    }))
}

pub async fn summarize(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SummaryResponse> {
    let id = SessionId::from_string(id);
    let session = load_session(&state, &id).await?;
    let registry = state.registry().await;

    let summary = summary::summarize(&registry, state.store.as_ref(), &session)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(SummaryResponse { summary }))
}
