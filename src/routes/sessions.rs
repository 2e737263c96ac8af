use super::require_app;
use crate::{
    error::AppError,
    message::CreateSessionRequest,
    services::session_manager::Session,
    state::SharedState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};

fn parse_create_body(body: &[u8]) -> Result<CreateSessionRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CreateSessionRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("invalid session body: {e}")))
}

pub async fn create_session(
    State(state): State<SharedState>,
    Path((app_name, user_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Session>, AppError> {
    require_app(&state, &app_name)?;
    let req = parse_create_body(&body)?;
    let session = state
        .sessions
        .create_session(
            &app_name,
            &user_id,
            req.session_id.as_deref().filter(|s| !s.is_empty()),
            req.state.unwrap_or_default(),
        )
        .await;
    Ok(Json(session))
}

pub async fn create_session_with_id(
    State(state): State<SharedState>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<Json<Session>, AppError> {
    require_app(&state, &app_name)?;
    let req = parse_create_body(&body)?;
    let session = state
        .sessions
        .create_session(&app_name, &user_id, Some(&session_id), req.state.unwrap_or_default())
        .await;
    Ok(Json(session))
}

pub async fn list_sessions(
    State(state): State<SharedState>,
    Path((app_name, user_id)): Path<(String, String)>,
) -> Result<Json<Vec<Session>>, AppError> {
    require_app(&state, &app_name)?;
    Ok(Json(state.sessions.list_sessions(&app_name, &user_id).await))
}

pub async fn get_session(
    State(state): State<SharedState>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
) -> Result<Json<Session>, AppError> {
    state
        .sessions
        .get_session(&app_name, &user_id, &session_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("session '{session_id}' not found")))
}

pub async fn delete_session(
    State(state): State<SharedState>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
) -> Result<StatusCode, AppError> {
    if state.sessions.delete_session(&app_name, &user_id, &session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("session '{session_id}' not found")))
    }
}
