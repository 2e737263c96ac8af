// src/message.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize, Serialize)]
pub struct ChatRequest {
    pub input: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChatResponse {
    pub output: String,
    pub raw: Value,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UploadResponse {
    pub filename: Option<String>,
    pub size: usize,
    pub app_name: String,
    pub user_id: String,
    pub payload: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub state: Option<Map<String, Value>>,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct MessagePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// ADK wire form of a message: `{role, parts: [{text}]}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NewMessage {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

fn default_role() -> String {
    "user".into()
}

impl NewMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: default_role(),
            parts: vec![MessagePart {
                text: Some(text.into()),
            }],
        }
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub new_message: NewMessage,
    #[serde(default)]
    pub streaming: bool,
}

/// Body accepted by `/simulate-flow`; every field overrides a default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulatePayload {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub new_message: Option<NewMessage>,
    #[serde(default)]
    pub streaming: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SimulateQuery {
    pub app_name: Option<String>,
    pub user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_optional_fields_default() {
        let req: ChatRequest = serde_json::from_str(r#"{"input": "hello"}"#).unwrap();
        assert_eq!(req.input, "hello");
        assert!(req.session_id.is_none());
        assert!(req.metadata.is_none());
    }

    #[test]
    fn run_request_uses_camel_case() {
        let req: RunRequest = serde_json::from_str(
            r#"{"appName": "a", "userId": "u", "sessionId": "s",
                "newMessage": {"role": "user", "parts": [{"text": "hi"}, {"text": "there"}]}}"#,
        )
        .unwrap();
        assert_eq!(req.session_id, "s");
        assert!(!req.streaming);
        assert_eq!(req.new_message.text(), "hi\nthere");
    }
}
