//! Agents, the events they emit, and the per-run context they share.

pub mod llm_agent;
pub mod schema;
pub mod template;
pub mod tool;
pub mod workflow;

pub use llm_agent::LlmAgent;
pub use schema::{FieldType, OutputSchema};
pub use tool::{FunctionTool, Tool};
pub use workflow::{LoopAgent, ParallelAgent, SequentialAgent};

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub type EventStream = BoxStream<'static, Result<Event>>;

/// Author recorded on events that carry the caller's message.
pub const USER_AUTHOR: &str = "user";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventActions {
    #[serde(default)]
    pub state_delta: Map<String, Value>,
    #[serde(default)]
    pub escalate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub actions: EventActions,
}

impl Event {
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            timestamp: Utc::now(),
            text: String::new(),
            partial: false,
            actions: EventActions::default(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    pub fn is_from_user(&self) -> bool {
        self.author == USER_AUTHOR
    }
}

/// State and history visible to agents during one invocation.
#[derive(Debug, Default)]
pub struct SessionView {
    state: RwLock<Map<String, Value>>,
    history: RwLock<Vec<Event>>,
}

impl SessionView {
    pub fn new(state: Map<String, Value>, history: Vec<Event>) -> Self {
        Self {
            state: RwLock::new(state),
            history: RwLock::new(history),
        }
    }
}

pub struct InvocationContext {
    pub invocation_id: String,
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub user_content: String,
    pub streaming: bool,
    session: SessionView,
}

impl InvocationContext {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        user_content: impl Into<String>,
        session: SessionView,
    ) -> Self {
        Self {
            invocation_id: format!("e-{}", Uuid::new_v4()),
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            user_content: user_content.into(),
            streaming: false,
            session,
        }
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub async fn state(&self) -> Map<String, Value> {
        self.session.state.read().await.clone()
    }

    pub async fn history(&self) -> Vec<Event> {
        self.session.history.read().await.clone()
    }

    /// Fold a finished event into the shared view so later agents see it.
    pub async fn record(&self, event: &Event) {
        if event.partial {
            return;
        }
        if !event.actions.state_delta.is_empty() {
            let mut state = self.session.state.write().await;
            for (k, v) in &event.actions.state_delta {
                state.insert(k.clone(), v.clone());
            }
        }
        if !event.text.is_empty() {
            self.session.history.write().await.push(event.clone());
        }
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &[]
    }

    async fn run(&self, ctx: Arc<InvocationContext>) -> Result<EventStream>;
}

/// Name, description and sub-agent tree as JSON.
pub fn describe(agent: &dyn Agent) -> Value {
    json!({
        "name": agent.name(),
        "description": agent.description(),
        "sub_agents": agent
            .sub_agents()
            .iter()
            .map(|a| describe(a.as_ref()))
            .collect::<Vec<_>>(),
    })
}

/// Depth-first search for an agent by name.
pub fn find_agent<'a>(root: &'a Arc<dyn Agent>, name: &str) -> Option<&'a Arc<dyn Agent>> {
    if root.name() == name {
        return Some(root);
    }
    root.sub_agents().iter().find_map(|a| find_agent(a, name))
}

/// The agent whose output is the run's answer: the last leaf reached by
/// following each agent's final sub-agent.
pub fn answering_agent(root: &dyn Agent) -> &dyn Agent {
    match root.sub_agents().last() {
        Some(last) => answering_agent(last.as_ref()),
        None => root,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> InvocationContext {
        InvocationContext::new("app", "user", "s1", "hi", SessionView::default())
    }

    #[tokio::test]
    async fn record_applies_delta_and_history() {
        let ctx = ctx();
        let mut event = Event::new(&ctx.invocation_id, "student").with_text("{}");
        event
            .actions
            .state_delta
            .insert("student_key".into(), json!({"age": 20}));
        ctx.record(&event).await;

        assert_eq!(ctx.state().await["student_key"]["age"], 20);
        assert_eq!(ctx.history().await.len(), 1);
    }

    #[tokio::test]
    async fn partial_events_are_not_recorded() {
        let ctx = ctx();
        let event = Event::new(&ctx.invocation_id, "a").with_text("tok").partial();
        ctx.record(&event).await;
        assert!(ctx.history().await.is_empty());
    }

    struct Named(&'static str, Vec<Arc<dyn Agent>>);

    #[async_trait]
    impl Agent for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            ""
        }
        fn sub_agents(&self) -> &[Arc<dyn Agent>] {
            &self.1
        }
        async fn run(&self, _ctx: Arc<InvocationContext>) -> Result<EventStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    #[test]
    fn answering_agent_follows_last_sub_agent() {
        let wave: Arc<dyn Agent> = Arc::new(Named("wave", vec![Arc::new(Named("p1", vec![]))]));
        let merger: Arc<dyn Agent> = Arc::new(Named("merger", vec![]));
        let root = Named("root", vec![wave, merger]);
        assert_eq!(answering_agent(&root).name(), "merger");

        let leaf = Named("solo", vec![]);
        assert_eq!(answering_agent(&leaf).name(), "solo");
    }

    #[test]
    fn event_json_is_camel_case() {
        let mut event = Event::new("inv-1", "merger_agent").with_text("{}");
        event.actions.state_delta.insert("final_summary".into(), json!("calm"));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["invocationId"], "inv-1");
        assert_eq!(value["actions"]["stateDelta"]["final_summary"], "calm");
        assert!(value.get("invocation_id").is_none());
        assert_eq!(serde_json::from_value::<Event>(value).unwrap(), event);
    }

    #[test]
    fn invocation_ids_are_unique() {
        assert_ne!(ctx().invocation_id, ctx().invocation_id);
    }
}
