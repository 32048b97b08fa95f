//! HTTP request handlers

use super::types::{
    CredentialRequest, CredentialResponse, ErrorResponse, SessionCountResponse, SessionResponse,
    TriggerRequest, TriggerResponse,
};
use super::AppState;
use crate::db::DbError;
use crate::geo::ElementRef;
use crate::session::{Event, TransitionError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use base64::Engine;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session triggers
        .route("/api/sessions", get(count_sessions))
        .route("/api/sessions/:user_id/triggers", post(send_trigger))
        .route("/api/sessions/:user_id", get(get_session))
        // Linked credentials
        .route(
            "/api/credentials/:user_id",
            put(upsert_credentials)
                .post(create_credentials)
                .patch(update_credentials)
                .delete(delete_credentials),
        )
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Sessions
// ============================================================

async fn send_trigger(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<TriggerRequest>,
) -> Result<Response, AppError> {
    let event = into_event(request)?;
    let reply = state
        .sessions
        .send_trigger(&user_id, event)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let status = match &reply.error {
        None => StatusCode::OK,
        Some(TransitionError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
        Some(
            TransitionError::InvalidState { .. }
            | TransitionError::Busy
            | TransitionError::StaleResult { .. },
        ) => StatusCode::CONFLICT,
    };
    let body = TriggerResponse {
        state: reply.state,
        messages: reply.messages,
        error: reply.error.map(|e| e.to_string()),
    };
    Ok((status, Json(body)).into_response())
}

fn into_event(request: TriggerRequest) -> Result<Event, AppError> {
    Ok(match request {
        TriggerRequest::StartSearch(query) => Event::StartSearch(query),
        TriggerRequest::PageNext => Event::PageNext,
        TriggerRequest::PagePrev => Event::PagePrev,
        TriggerRequest::SelectItem { index } => Event::SelectItem { index },
        TriggerRequest::EditElement { element_type, id } => {
            Event::EditElement(ElementRef::new(element_type, id))
        }
        TriggerRequest::StartUpload {
            payload_base64,
            filename,
        } => {
            let payload = base64::engine::general_purpose::STANDARD
                .decode(payload_base64.trim())
                .map_err(|e| AppError::BadRequest(format!("payload_base64: {e}")))?;
            Event::StartUpload { payload, filename }
        }
        TriggerRequest::TextReply { text } => Event::TextReply(text),
        TriggerRequest::ToggleVisibility => Event::ToggleVisibility,
        TriggerRequest::ConfirmSubmit => Event::ConfirmSubmit,
        TriggerRequest::OpenSettings => Event::OpenSettings,
        TriggerRequest::Cancel => Event::Cancel,
    })
}

async fn get_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session_state = state
        .sessions
        .state(&user_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No session for user: {user_id}")))?;
    Ok(Json(SessionResponse {
        user_id,
        state: session_state,
    }))
}

async fn count_sessions(State(state): State<AppState>) -> Json<SessionCountResponse> {
    Json(SessionCountResponse {
        active: state.sessions.active_count().await,
    })
}

// ============================================================
// Credentials
// ============================================================

fn check_key(request: &CredentialRequest) -> Result<(), AppError> {
    if request.key.trim().is_empty() {
        return Err(AppError::BadRequest("key is empty".to_string()));
    }
    Ok(())
}

/// Insert or replace
async fn upsert_credentials(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<CredentialRequest>,
) -> Result<Response, AppError> {
    check_key(&request)?;
    let created = state
        .db
        .upsert_credential(&user_id, request.key.trim(), request.secret.trim())
        .map_err(AppError::from)?;
    tracing::info!(user_id = %user_id, created, "Credentials stored");

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(CredentialResponse { created })).into_response())
}

/// Insert only; 409 when the user already linked an account
async fn create_credentials(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<CredentialRequest>,
) -> Result<Response, AppError> {
    check_key(&request)?;
    state
        .db
        .put_credential(&user_id, request.key.trim(), request.secret.trim())?;
    tracing::info!(user_id = %user_id, created = true, "Credentials stored");
    Ok((StatusCode::CREATED, Json(CredentialResponse { created: true })).into_response())
}

/// Replace only; 404 when there is nothing to replace
async fn update_credentials(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<CredentialRequest>,
) -> Result<Json<CredentialResponse>, AppError> {
    check_key(&request)?;
    state
        .db
        .update_credential(&user_id, request.key.trim(), request.secret.trim())?;
    tracing::info!(user_id = %user_id, created = false, "Credentials stored");
    Ok(Json(CredentialResponse { created: false }))
}

async fn delete_credentials(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.db.delete_credential(&user_id).map_err(AppError::from)?;
    tracing::info!(user_id = %user_id, "Credentials removed");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("osmate ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NoSuchRecord(_) => AppError::NotFound(e.to_string()),
            DbError::AlreadyExists(_) => AppError::Conflict(e.to_string()),
            DbError::Sqlite(_) | DbError::LockPoisoned => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
