use super::CHAT_USER;
use crate::{error::AppError, message::UploadResponse, state::SharedState};
use axum::{
    Json,
    extract::{Multipart, State},
};
use serde_json::{Value, json};
use tracing::info;

/// JSON payload from a form field; anything unparsable is kept under `raw`.
pub fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| json!({ "raw": raw }))
}

pub async fn upload_handler(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<(Option<String>, usize)> = None;
    let mut app_name = state.agents.default_app().to_string();
    let mut user_id = CHAT_USER.to_string();
    let mut payload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                file = Some((filename, bytes.len()));
            }
            Some("app_name") => app_name = field_text(field).await?,
            Some("user_id") => user_id = field_text(field).await?,
            Some("payload") => payload = Some(parse_payload(&field_text(field).await?)),
            _ => {}
        }
    }

    let (filename, size) =
        file.ok_or_else(|| AppError::BadRequest("missing 'file' field".to_string()))?;
    info!(filename = ?filename, size, app = %app_name, "file uploaded");

    Ok(Json(UploadResponse {
        filename,
        size,
        app_name,
        user_id,
        payload,
    }))
}

pub(crate) async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_falls_back_to_raw() {
        assert_eq!(parse_payload(r#"{"a": 1}"#), json!({"a": 1}));
        assert_eq!(parse_payload("not json"), json!({"raw": "not json"}));
    }
}
