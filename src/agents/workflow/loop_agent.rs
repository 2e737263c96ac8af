use crate::agents::{Agent, EventStream, InvocationContext};
use crate::error::Result;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::debug;

/// Upper bound on iterations when none is configured.
pub const DEFAULT_LOOP_MAX_ITERATIONS: u32 = 1000;

/// Loop agent executes sub-agents repeatedly for N iterations or until escalation
pub struct LoopAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn Agent>>,
    max_iterations: u32,
}

impl LoopAgent {
    pub fn new(name: impl Into<String>, sub_agents: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            sub_agents,
            max_iterations: DEFAULT_LOOP_MAX_ITERATIONS,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }
}

#[async_trait]
impl Agent for LoopAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.sub_agents
    }

    async fn run(&self, ctx: Arc<InvocationContext>) -> Result<EventStream> {
        let sub_agents = self.sub_agents.clone();
        let max_iterations = self.max_iterations;
        let name = self.name.clone();

        let s = try_stream! {
            'outer: for iteration in 1..=max_iterations {
                debug!(agent = %name, iteration, "loop iteration");
                for agent in &sub_agents {
                    let mut stream = agent.run(ctx.clone()).await?;
                    let mut escalate = false;
                    while let Some(event) = stream.next().await {
                        let event = event?;
                        escalate |= event.actions.escalate;
                        yield event;
                    }
                    if escalate {
                        debug!(agent = %name, by = agent.name(), "escalated, leaving loop");
                        break 'outer;
                    }
                }
            }
        };

        Ok(Box::pin(s))
    }
}
