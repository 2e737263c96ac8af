use super::{
    Agent, Event, EventStream, InvocationContext, OutputSchema, Tool, USER_AUTHOR, template, tool,
};
use crate::error::{Error, Result};
use crate::model::{Content, LanguageModel, LlmRequest, Part};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

/// Agent backed by a single language model.
///
/// The instruction may reference session state with `{key}` placeholders.
/// When an output schema is set the reply must be a JSON object of that
/// shape; with an output key the reply is also written to session state.
#[derive(Clone)]
pub struct LlmAgent {
    name: String,
    description: String,
    model: Arc<dyn LanguageModel>,
    instruction: String,
    output_key: Option<String>,
    output_schema: Option<OutputSchema>,
    tools: Vec<Arc<dyn Tool>>,
    max_tool_rounds: usize,
}

impl LlmAgent {
    pub fn new(name: impl Into<String>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            model,
            instruction: String::new(),
            output_key: None,
            output_schema: None,
            tools: Vec::new(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn with_output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Session history as model turns: own replies are `model`, everything
    /// else is `user`, with other agents' replies quoted for context.
    fn contents(&self, history: &[Event], user_content: &str) -> Vec<Content> {
        let mut contents: Vec<Content> = history
            .iter()
            .filter(|e| !e.text.is_empty())
            .map(|e| {
                if e.author == USER_AUTHOR {
                    Content::user(e.text.clone())
                } else if e.author == self.name {
                    Content::model(e.text.clone())
                } else {
                    Content::user(format!("For context: [{}] said: {}", e.author, e.text))
                }
            })
            .collect();
        if contents.is_empty() {
            contents.push(Content::user(user_content));
        }
        contents
    }

    fn request(&self, instruction: String, contents: Vec<Content>) -> LlmRequest {
        LlmRequest {
            system_instruction: (!instruction.is_empty()).then_some(instruction),
            contents,
            tools: self.tools.iter().map(|t| t.declaration()).collect(),
            json_output: self.output_schema.is_some(),
            response_schema: self.output_schema.as_ref().map(OutputSchema::to_response_schema),
        }
    }

    async fn generate_with_tools(&self, request: &mut LlmRequest) -> Result<String> {
        for round in 0..=self.max_tool_rounds {
            let response = self.model.generate(request.clone()).await?;
            if response.function_calls.is_empty() {
                return Ok(response.text);
            }
            if round == self.max_tool_rounds {
                break;
            }

            let mut call_parts = Vec::new();
            if !response.text.is_empty() {
                call_parts.push(Part::Text(response.text));
            }
            let mut response_parts = Vec::new();
            for call in response.function_calls {
                debug!(agent = %self.name, tool = %call.name, "calling tool");
                let result = match self.tools.iter().find(|t| t.name() == call.name) {
                    Some(t) => tool::invoke(t.as_ref(), call.args.clone()).await,
                    None => json!({ "error": format!("unknown tool '{}'", call.name) }),
                };
                response_parts.push(Part::FunctionResponse {
                    name: call.name.clone(),
                    response: result,
                });
                call_parts.push(Part::FunctionCall(call));
            }
            request.contents.push(Content {
                role: "model".into(),
                parts: call_parts,
            });
            request.contents.push(Content {
                role: "user".into(),
                parts: response_parts,
            });
        }
        Err(Error::agent(format!(
            "{}: still calling tools after {} rounds",
            self.name, self.max_tool_rounds
        )))
    }

    fn final_event(&self, invocation_id: &str, text: &str) -> Result<Event> {
        let mut event = Event::new(invocation_id, &self.name);
        let stored = match &self.output_schema {
            Some(schema) => {
                let value = schema.parse(text)?;
                event.text = value.to_string();
                value
            }
            None => {
                event.text = text.trim().to_string();
                Value::String(event.text.clone())
            }
        };
        if let Some(key) = &self.output_key {
            event.actions.state_delta.insert(key.clone(), stored);
        }
        Ok(event)
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, ctx: Arc<InvocationContext>) -> Result<EventStream> {
        let agent = self.clone();

        let s = async_stream::try_stream! {
            let state = ctx.state().await;
            let instruction = template::inject_state(&agent.instruction, &state)?;
            let history = ctx.history().await;
            let mut request = agent.request(instruction, agent.contents(&history, &ctx.user_content));

            let text = if ctx.streaming && agent.tools.is_empty() {
                let mut deltas = agent.model.generate_stream(request).await?;
                let mut text = String::new();
                while let Some(delta) = deltas.next().await {
                    let delta = delta?;
                    text.push_str(&delta);
                    yield Event::new(&ctx.invocation_id, &agent.name).with_text(delta).partial();
                }
                text
            } else {
                agent.generate_with_tools(&mut request).await?
            };

            let event = agent.final_event(&ctx.invocation_id, &text)?;
            info!(agent = %agent.name, model = %agent.model.name(), chars = event.text.len(), "agent finished");
            ctx.record(&event).await;
            yield event;
        };

        Ok(Box::pin(s))
    }
}
