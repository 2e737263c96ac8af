//! ADK-style run endpoints: `/run` returns every event at once, `/run_sse`
//! streams them as they are produced.

use crate::{
    agents::{Agent, Event},
    error::AppError,
    message::RunRequest,
    state::SharedState,
};
use axum::{
    Json,
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use serde_json::json;
use std::{convert::Infallible, sync::Arc};

async fn prepare(state: &SharedState, req: &RunRequest) -> Result<(Arc<dyn Agent>, String), AppError> {
    let agent = state
        .agents
        .get(&req.app_name)
        .ok_or_else(|| AppError::NotFound(format!("app '{}' not found", req.app_name)))?;

    if state
        .sessions
        .get_session(&req.app_name, &req.user_id, &req.session_id)
        .await
        .is_none()
    {
        return Err(AppError::NotFound(format!("session '{}' not found", req.session_id)));
    }

    let text = req.new_message.text();
    if text.trim().is_empty() {
        return Err(AppError::BadRequest("newMessage has no text".to_string()));
    }
    Ok((agent, text))
}

pub async fn run(
    State(state): State<SharedState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<Vec<Event>>, AppError> {
    let (agent, text) = prepare(&state, &req).await?;
    let mut events = state
        .runner
        .run(agent, &req.app_name, &req.user_id, &req.session_id, &text, false)
        .await?;

    let mut out = Vec::new();
    while let Some(event) = events.next().await {
        out.push(event?);
    }
    Ok(Json(out))
}

pub async fn run_sse(
    State(state): State<SharedState>,
    Json(req): Json<RunRequest>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, AppError> {
    let (agent, text) = prepare(&state, &req).await?;
    let events = state
        .runner
        .run(agent, &req.app_name, &req.user_id, &req.session_id, &text, req.streaming)
        .await?;

    let s = events.map(|item| {
        let event = match item {
            Ok(event) => match SseEvent::default().json_data(&event) {
                Ok(sse) => sse,
                Err(e) => error_event(&e.to_string()),
            },
            Err(e) => error_event(&e.to_string()),
        };
        Ok::<_, Infallible>(event)
    });

    Ok(Sse::new(s).keep_alive(KeepAlive::default()))
}

fn error_event(message: &str) -> SseEvent {
    SseEvent::default()
        .event("error")
        .data(json!({ "error": message }).to_string())
}
