#![allow(dead_code)]

use async_trait::async_trait;
use persona_agent_backend::apps::{self, AgentRegistry};
use persona_agent_backend::config::Config;
use persona_agent_backend::error::{Error, Result};
use persona_agent_backend::model::{LanguageModel, LlmRequest, LlmResponse, TextStream};
use persona_agent_backend::state::{AppState, SharedState};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const PERSONA_REPLY: &str =
    r#"{"race": "Black", "age": 34, "sex": "female", "response": "Boarding up the windows"}"#;
pub const MERGER_REPLY: &str = r#"{"output": "Mostly anxious but prepared"}"#;

/// Answers by looking at the requested output shape, so the order in which
/// parallel agents call it does not matter.
pub struct RuleModel {
    pub calls: AtomicUsize,
    fail_merger: bool,
}

impl RuleModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_merger: false,
        })
    }

    pub fn failing_merger() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_merger: true,
        })
    }

    fn reply(&self, request: &LlmRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let properties = request
            .response_schema
            .as_ref()
            .and_then(|s| s.get("properties"))
            .and_then(|p| p.as_object());
        match properties {
            Some(p) if p.contains_key("race") => {
                if p.contains_key("archetype_influence") {
                    Ok(r#"{"race": "White", "age": 70, "sex": "male", "response": "Staying home",
                           "archetype_influence": "limited mobility"}"#
                        .to_string())
                } else {
                    Ok(PERSONA_REPLY.to_string())
                }
            }
            Some(p) if p.contains_key("output") => {
                if self.fail_merger {
                    Err(Error::api_with_status("gemini", "quota exhausted", 503))
                } else {
                    Ok(MERGER_REPLY.to_string())
                }
            }
            _ => Ok("Hello there friend".to_string()),
        }
    }
}

#[async_trait]
impl LanguageModel for RuleModel {
    fn name(&self) -> &str {
        "rule-model"
    }

    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        Ok(LlmResponse {
            text: self.reply(&request)?,
            function_calls: vec![],
        })
    }

    async fn generate_stream(&self, request: LlmRequest) -> Result<TextStream> {
        let text = self.reply(&request)?;
        let parts: Vec<Result<String>> = text
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(parts)))
    }
}

pub fn test_config() -> Config {
    Config {
        eval_dir: std::env::temp_dir().join("persona-agent-no-evals"),
        static_dir: std::env::temp_dir().join("persona-agent-no-static"),
        ..Config::default()
    }
}

pub fn registry(config: &Config, model: Arc<RuleModel>) -> AgentRegistry {
    apps::build_registry(config, model.clone(), model).unwrap()
}

pub fn test_state_with(config: Config, model: Arc<RuleModel>) -> SharedState {
    let agents = registry(&config, model);
    Arc::new(AppState::new(config, agents).unwrap())
}

pub fn test_state() -> SharedState {
    test_state_with(test_config(), RuleModel::new())
}
