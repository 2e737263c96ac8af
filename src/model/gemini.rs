use super::{
    Content, FunctionCall, FunctionDeclaration, LanguageModel, LlmRequest, LlmResponse, Part,
    TextStream,
};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Gemini `generateContent` client.
pub struct GeminiModel {
    model: String,
    api_key: String,
    base_url: String,
    http: HttpClient,
}

// -- wire format --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool<'a> {
    function_declarations: &'a [FunctionDeclaration],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Serialize, Deserialize, Default)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    thought: bool,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<WireContent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl From<&Content> for WireContent {
    fn from(content: &Content) -> Self {
        let parts = content
            .parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => WirePart {
                    text: Some(text.clone()),
                    ..Default::default()
                },
                Part::FunctionCall(call) => WirePart {
                    function_call: Some(call.clone()),
                    ..Default::default()
                },
                Part::FunctionResponse { name, response } => WirePart {
                    function_response: Some(WireFunctionResponse {
                        name: name.clone(),
                        response: response.clone(),
                    }),
                    ..Default::default()
                },
            })
            .collect();
        Self {
            role: Some(content.role.clone()),
            parts,
        }
    }
}

impl GenerateResponse {
    fn into_llm_response(self) -> Result<LlmResponse> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".into());
            return Err(Error::parse(format!("empty response from Gemini: {reason}")));
        };

        let mut response = LlmResponse::default();
        for part in candidate.content.unwrap_or_default().parts {
            if part.thought {
                continue;
            }
            if let Some(text) = part.text {
                response.text.push_str(&text);
            }
            if let Some(call) = part.function_call {
                response.function_calls.push(call);
            }
        }
        Ok(response)
    }
}

impl GeminiModel {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            http: HttpClient::new(concat!("persona-agent-backend/", env!("CARGO_PKG_VERSION")))?,
        })
    }

    fn body(&self, request: &LlmRequest) -> Result<String> {
        let wire = GenerateRequest {
            system_instruction: request.system_instruction.as_ref().map(|s| WireContent {
                role: None,
                parts: vec![WirePart {
                    text: Some(s.clone()),
                    ..Default::default()
                }],
            }),
            contents: request.contents.iter().map(WireContent::from).collect(),
            tools: if request.tools.is_empty() {
                Vec::new()
            } else {
                vec![WireTool {
                    function_declarations: &request.tools,
                }]
            },
            generation_config: request.json_output.then(|| GenerationConfig {
                response_mime_type: "application/json",
                response_schema: request.response_schema.clone(),
            }),
        };
        serde_json::to_string(&wire).map_err(|e| Error::parse(format!("serialize request: {e}")))
    }

    fn url(&self, method: &str) -> String {
        format!("{}/models/{}:{method}", self.base_url, self.model)
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        debug!(model = %self.model, contents = request.contents.len(), "sending Gemini request");
        let body = self.body(&request)?;
        let text = self
            .http
            .post_json_raw(
                &self.url("generateContent"),
                &body,
                &[("x-goog-api-key", &self.api_key)],
            )
            .await
            .inspect_err(|e| warn!(model = %self.model, "Gemini API error: {e}"))?;

        let resp: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| Error::parse(format!("parse Gemini response: {e}")))?;
        resp.into_llm_response()
    }

    async fn generate_stream(&self, request: LlmRequest) -> Result<TextStream> {
        debug!(model = %self.model, "opening Gemini stream");
        let body = self.body(&request)?;
        let resp = self
            .http
            .post_json_streaming(
                &self.url("streamGenerateContent?alt=sse"),
                &body,
                &[("x-goog-api-key", &self.api_key)],
            )
            .await
            .inspect_err(|e| warn!(model = %self.model, "Gemini stream error: {e}"))?;

        Ok(text_deltas(resp.bytes_stream()))
    }
}

/// Text deltas from a `streamGenerateContent?alt=sse` body. Each SSE event
/// carries one `GenerateResponse`; chunks without text are skipped.
fn text_deltas<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let deltas = bytes.eventsource().filter_map(|event| async move {
        let delta = event
            .map_err(|e| Error::http(format!("Gemini stream: {e}")))
            .and_then(|event| {
                let resp: GenerateResponse = serde_json::from_str(&event.data)
                    .map_err(|e| Error::parse(format!("parse Gemini chunk: {e}")))?;
                Ok(resp.into_llm_response()?.text)
            });
        match delta {
            Ok(text) if text.is_empty() => None,
            other => Some(other),
        }
    });
    Box::pin(deltas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;

    fn model() -> GeminiModel {
        GeminiModel::new("gemini-2.0-flash-lite", "key", "http://localhost/v1beta").unwrap()
    }

    #[test]
    fn request_body_uses_gemini_field_names() {
        let request = LlmRequest {
            system_instruction: Some("be brief".into()),
            contents: vec![
                Content::user("hi"),
                Content {
                    role: "user".into(),
                    parts: vec![Part::FunctionResponse {
                        name: "calculate_bmi".into(),
                        response: json!({"bmi": 22.5}),
                    }],
                },
            ],
            tools: vec![FunctionDeclaration {
                name: "calculate_bmi".into(),
                description: "bmi".into(),
                parameters: json!({"type": "object"}),
            }],
            json_output: true,
            response_schema: Some(json!({"type": "OBJECT"})),
        };
        let body: Value = serde_json::from_str(&model().body(&request).unwrap()).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(
            body["contents"][1]["parts"][0]["functionResponse"]["name"],
            "calculate_bmi"
        );
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "calculate_bmi"
        );
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }

    #[test]
    fn plain_request_omits_optional_sections() {
        let request = LlmRequest {
            contents: vec![Content::user("hi")],
            ..Default::default()
        };
        let body: Value = serde_json::from_str(&model().body(&request).unwrap()).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("generationConfig").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn response_collects_text_and_calls() {
        let resp: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "thinking", "thought": true},
                        {"text": "Hello "},
                        {"text": "there"},
                        {"functionCall": {"name": "convert_weight", "args": {"value": 1}}}
                    ]
                }
            }]
        }))
        .unwrap();
        let out = resp.into_llm_response().unwrap();
        assert_eq!(out.text, "Hello there");
        assert_eq!(out.function_calls.len(), 1);
        assert_eq!(out.function_calls[0].name, "convert_weight");
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let resp: GenerateResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let err = resp.into_llm_response().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    fn chunks(parts: &[&str]) -> impl Stream<Item = std::result::Result<Vec<u8>, std::io::Error>> + Send + 'static {
        let owned: Vec<std::result::Result<Vec<u8>, std::io::Error>> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(owned)
    }

    #[tokio::test]
    async fn stream_yields_text_across_chunk_boundaries() {
        let deltas: Vec<String> = text_deltas(chunks(&[
            "data: {\"candidates\": [{\"content\": {\"parts\": [{\"text\": \"Hel",
            "lo \"}]}}]}\r\n\r\n",
            "data: {\"candidates\": [{\"content\": {\"parts\": []}}]}\n\n",
            "data: {\"candidates\": [{\"content\": {\"parts\": [{\"text\": \"world\"}]}}]}\n\n",
        ]))
        .try_collect()
        .await
        .unwrap();
        assert_eq!(deltas, vec!["Hello ", "world"]);
    }

    #[tokio::test]
    async fn stream_reports_malformed_chunk() {
        let mut deltas = text_deltas(chunks(&["data: not json\n\n"]));
        let err = deltas.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("parse Gemini chunk"));
    }

    #[test]
    fn url_targets_model_method() {
        assert_eq!(
            model().url("generateContent"),
            "http://localhost/v1beta/models/gemini-2.0-flash-lite:generateContent"
        );
    }
}
