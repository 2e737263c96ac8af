//! Replays the typical front-end call sequence against this service:
//! create session, list eval sets and results, list sessions, then `/run_sse`.

use super::{CHAT_USER, upload::field_text};
use crate::{
    error::AppError,
    http::RawResponse,
    message::{NewMessage, SimulatePayload, SimulateQuery},
    state::SharedState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Query, Request, State},
    http::header::CONTENT_TYPE,
};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_SESSION_ID: &str = "default-session";
pub const DEFAULT_MESSAGE: &str = "Hello from simulate_flow";

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Resolved inputs for one simulated flow.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowParams {
    pub app_name: String,
    pub user_id: String,
    pub new_message: Option<NewMessage>,
    pub streaming: bool,
}

pub async fn simulate_flow(
    State(state): State<SharedState>,
    Query(query): Query<SimulateQuery>,
    request: Request,
) -> Result<Json<Value>, AppError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let default_app = query
        .app_name
        .clone()
        .unwrap_or_else(|| state.agents.default_app().to_string());
    let default_user = query.user_id.clone().unwrap_or_else(|| CHAT_USER.to_string());

    let params = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        from_multipart(multipart, default_app, default_user).await?
    } else {
        let body = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        from_json_body(&body, default_app, default_user)?
    };

    let base_url = format!("http://127.0.0.1:{}", state.config.port);
    Ok(Json(Value::Object(run_flow(&state, &base_url, params).await)))
}

fn from_json_body(body: &Bytes, app_name: String, user_id: String) -> Result<FlowParams, AppError> {
    let payload: SimulatePayload = if body.iter().all(u8::is_ascii_whitespace) {
        SimulatePayload::default()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("invalid simulate payload: {e}")))?
    };
    Ok(FlowParams {
        app_name: payload.app_name.unwrap_or(app_name),
        user_id: payload.user_id.unwrap_or(user_id),
        new_message: payload.new_message,
        streaming: payload.streaming.unwrap_or(false),
    })
}

async fn from_multipart(
    mut multipart: Multipart,
    app_name: String,
    user_id: String,
) -> Result<FlowParams, AppError> {
    let mut file: Option<Bytes> = None;
    let mut form_app_name = None;
    let mut form_user_id = None;
    let mut form_payload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                file = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?,
                )
            }
            Some("form_app_name") => form_app_name = Some(field_text(field).await?),
            Some("form_user_id") => form_user_id = Some(field_text(field).await?),
            Some("form_payload") => form_payload = Some(field_text(field).await?),
            _ => {}
        }
    }

    Ok(resolve_form(
        file.as_deref(),
        form_app_name.filter(|s| !s.is_empty()),
        form_user_id.filter(|s| !s.is_empty()),
        form_payload.filter(|s| !s.is_empty()),
        app_name,
        user_id,
    ))
}

/// A JSON object in `form_payload` (or in the uploaded file) wins over the
/// plain form fields, which win over the query string.
pub fn resolve_form(
    file: Option<&[u8]>,
    form_app_name: Option<String>,
    form_user_id: Option<String>,
    form_payload: Option<String>,
    app_name: String,
    user_id: String,
) -> FlowParams {
    let app_name = form_app_name.unwrap_or(app_name);
    let user_id = form_user_id.unwrap_or(user_id);

    let parsed = match (file, form_payload) {
        (Some(_), Some(raw)) => Some(match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            _ => {
                let mut map = Map::new();
                map.insert("raw".to_string(), Value::String(raw));
                map
            }
        }),
        (Some(bytes), None) => match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        (None, _) => None,
    };

    match parsed.filter(|m| !m.is_empty()) {
        Some(map) => FlowParams {
            app_name: str_field(&map, "app_name").unwrap_or(app_name),
            user_id: str_field(&map, "user_id").unwrap_or(user_id),
            new_message: map
                .get("new_message")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            streaming: map.get("streaming").and_then(Value::as_bool).unwrap_or(false),
        },
        None => FlowParams {
            app_name,
            user_id,
            new_message: None,
            streaming: false,
        },
    }
}

fn str_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Body as JSON, or `{"text": body}` when it isn't.
pub fn safe_json(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| json!({ "text": body }))
}

/// Session id from the common create-session response shapes.
pub fn extract_session_id(created: &Value) -> String {
    ["session_id", "sessionId", "id"]
        .iter()
        .find_map(|k| created.get(*k).and_then(Value::as_str))
        .or_else(|| created.get("session")?.get("id")?.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION_ID)
        .to_string()
}

fn log_call(method: &str, path: &str, result: &crate::error::Result<RawResponse>) {
    match result {
        Ok(resp) => info!(target: "simulate_flow", "\"{method} {path} HTTP/1.1\" {}", resp.status),
        Err(e) => error!(target: "simulate_flow", "failed {method} {path} -> {e}"),
    }
}

async fn step(
    state: &SharedState,
    results: &mut Map<String, Value>,
    key: &str,
    method: &str,
    url: &str,
    path: &str,
    body: Option<&Value>,
) -> bool {
    let result = match body {
        Some(body) => state.loopback.post_json_unchecked(url, body).await,
        None => state.loopback.get_unchecked(url).await,
    };
    log_call(method, path, &result);
    match result {
        Ok(resp) => {
            results.insert(key.to_string(), safe_json(&resp.body));
            true
        }
        Err(e) => {
            results.insert(format!("{key}_error"), Value::String(e.to_string()));
            false
        }
    }
}

pub async fn run_flow(state: &SharedState, base_url: &str, params: FlowParams) -> Map<String, Value> {
    let FlowParams {
        app_name,
        user_id,
        new_message,
        streaming,
    } = params;
    let sessions_path = format!("/apps/{app_name}/users/{user_id}/sessions");
    let mut results = Map::new();

    let created = step(
        state,
        &mut results,
        "create_session",
        "POST",
        &format!("{base_url}{sessions_path}"),
        &sessions_path,
        Some(&json!({})),
    )
    .await;
    if !created {
        results.insert("status".to_string(), json!("partial_failure"));
        return results;
    }
    let session_id = results
        .get("create_session")
        .map(extract_session_id)
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());

    let gets = [
        ("eval_sets", format!("/apps/{app_name}/eval_sets"), 100),
        ("eval_results", format!("/apps/{app_name}/eval_results"), 80),
        ("list_sessions", sessions_path.clone(), 80),
    ];
    for (key, path, pause_ms) in gets {
        tokio::time::sleep(Duration::from_millis(pause_ms)).await;
        step(state, &mut results, key, "GET", &format!("{base_url}{path}"), &path, None).await;
    }
    tokio::time::sleep(Duration::from_millis(80)).await;

    let run_payload = json!({
        "appName": app_name,
        "userId": user_id,
        "sessionId": session_id,
        "newMessage": new_message.unwrap_or_else(|| NewMessage::user_text(DEFAULT_MESSAGE)),
        "streaming": streaming,
    });
    step(
        state,
        &mut results,
        "run_sse",
        "POST",
        &format!("{base_url}/run_sse"),
        "/run_sse",
        Some(&run_payload),
    )
    .await;

    results.insert("status".to_string(), json!("ok"));
    results
}
