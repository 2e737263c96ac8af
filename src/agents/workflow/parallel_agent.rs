use crate::agents::{Agent, EventStream, InvocationContext};
use crate::error::Result;
use async_stream::stream;
use async_trait::async_trait;
use futures::stream::{SelectAll, StreamExt};
use std::sync::Arc;

/// Parallel agent executes sub-agents concurrently
pub struct ParallelAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn Agent>>,
}

impl ParallelAgent {
    pub fn new(name: impl Into<String>, sub_agents: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            sub_agents,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }
}

#[async_trait]
impl Agent for ParallelAgent {
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
        let mut merged: SelectAll<EventStream> = SelectAll::new();
        for agent in &self.sub_agents {
            merged.push(agent.run(ctx.clone()).await?);
        }

        // Events arrive in completion order; the first error ends the run.
        let s = stream! {
            while let Some(result) = merged.next().await {
                let failed = result.is_err();
                yield result;
                if failed {
                    return;
                }
            }
        };

        Ok(Box::pin(s))
    }
}
