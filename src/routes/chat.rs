use super::CHAT_USER;
use crate::{
    agents::answering_agent,
    error::AppError,
    message::{ChatRequest, ChatResponse, StreamQuery},
    state::SharedState,
};
use async_stream::stream;
use axum::{
    Json,
    extract::{Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use serde_json::{Map, Value, json};
use std::convert::Infallible;
use tracing::info;

pub async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let input = payload.input.trim();
    if input.is_empty() {
        return Err(AppError::BadRequest("input cannot be empty".to_string()));
    }

    let app = state.agents.default_app().to_string();
    let session_id = match payload.session_id.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => {
            state.sessions.ensure_session(&app, CHAT_USER, s).await;
            s.to_string()
        }
        _ => {
            state
                .sessions
                .create_session(&app, CHAT_USER, None, Map::new())
                .await
                .id
        }
    };

    if let Some(metadata) = payload.metadata {
        let mut delta = Map::new();
        delta.insert("metadata".to_string(), Value::Object(metadata));
        state
            .sessions
            .update_state(&app, CHAT_USER, &session_id, delta)
            .await;
    }

    let outcome = state
        .runner
        .run_to_completion(state.agents.default_agent(), &app, CHAT_USER, &session_id, input)
        .await?;
    info!(session_id = %session_id, events = outcome.events.len(), "chat answered");

    Ok(Json(ChatResponse {
        output: outcome.output,
        raw: json!({ "events": outcome.events, "state": outcome.state }),
        session_id: Some(session_id),
    }))
}

/// Token stream over SSE: one `data:` event per text delta of the answering
/// agent, then `end`. Intermediate agents' deltas are not forwarded.
pub async fn stream_handler(
    State(state): State<SharedState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, AppError> {
    let q = query.q.trim().to_string();
    if q.is_empty() {
        return Err(AppError::BadRequest("q cannot be empty".to_string()));
    }

    let app = state.agents.default_app().to_string();
    let session = state
        .sessions
        .create_session(&app, CHAT_USER, None, Map::new())
        .await;
    let agent = state.agents.default_agent();
    let answer_author = answering_agent(agent.as_ref()).name().to_string();
    let mut events = state
        .runner
        .run(agent, &app, CHAT_USER, &session.id, &q, true)
        .await?;

    let s = stream! {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) if event.partial && event.author == answer_author => {
                    yield Ok::<_, Infallible>(SseEvent::default().data(event.text.replace('\r', "")));
                }
                Ok(_) => {}
                Err(e) => {
                    yield Ok::<_, Infallible>(SseEvent::default().event("error").data(e.to_string().replace('\r', "")));
                    break;
                }
            }
        }
        yield Ok::<_, Infallible>(SseEvent::default().event("end").data(""));
    };

    Ok(Sse::new(s).keep_alive(KeepAlive::default()))
}
