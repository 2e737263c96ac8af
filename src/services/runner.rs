use crate::agents::{Agent, Event, EventStream, InvocationContext, SessionView, USER_AUTHOR};
use crate::error::Result;
use crate::services::{metrics_manager::MetricsManager, session_manager::SessionManager};
use async_stream::stream;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub output: String,
    pub events: Vec<Event>,
    pub state: Map<String, Value>,
}

/// Runs agents against stored sessions and persists what they emit.
#[derive(Clone)]
pub struct Runner {
    sessions: SessionManager,
    metrics: MetricsManager,
}

impl Runner {
    pub fn new(sessions: SessionManager, metrics: MetricsManager) -> Self {
        Self { sessions, metrics }
    }

    pub async fn run(
        &self,
        agent: Arc<dyn Agent>,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        input: &str,
        streaming: bool,
    ) -> Result<EventStream> {
        let session = self.sessions.ensure_session(app_name, user_id, session_id).await;
        let ctx = Arc::new(
            InvocationContext::new(
                app_name,
                user_id,
                session_id,
                input,
                SessionView::new(session.state, session.events),
            )
            .with_streaming(streaming),
        );

        let user_event = Event::new(&ctx.invocation_id, USER_AUTHOR).with_text(input);
        ctx.record(&user_event).await;
        self.sessions
            .append_event(app_name, user_id, session_id, user_event)
            .await;

        info!(
            app = app_name,
            agent = agent.name(),
            session_id,
            invocation_id = %ctx.invocation_id,
            streaming,
            "starting run"
        );
        let mut events = agent.run(ctx).await?;

        let sessions = self.sessions.clone();
        let metrics = self.metrics.clone();
        let (app, user, sid) = (app_name.to_string(), user_id.to_string(), session_id.to_string());

        let s = stream! {
            while let Some(item) = events.next().await {
                match item {
                    Ok(event) => {
                        if !event.partial {
                            sessions.append_event(&app, &user, &sid, event.clone()).await;
                        }
                        yield Ok(event);
                    }
                    Err(e) => {
                        warn!(app = %app, session_id = %sid, error = %e, "run failed");
                        metrics.record_run(&app, false).await;
                        yield Err(e);
                        return;
                    }
                }
            }
            metrics.record_run(&app, true).await;
        };

        Ok(Box::pin(s))
    }

    /// Run to the end and gather the result.
    pub async fn run_to_completion(
        &self,
        agent: Arc<dyn Agent>,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        input: &str,
    ) -> Result<RunOutcome> {
        let mut stream = self
            .run(agent, app_name, user_id, session_id, input, false)
            .await?;

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event?);
        }

        let output = final_output(&events);
        let state = self
            .sessions
            .get_session(app_name, user_id, session_id)
            .await
            .map(|s| s.state)
            .unwrap_or_default();

        Ok(RunOutcome {
            output,
            events,
            state,
        })
    }
}

/// Text of the last complete agent event.
pub fn final_output(events: &[Event]) -> String {
    events
        .iter()
        .rev()
        .find(|e| !e.partial && !e.is_from_user() && !e.text.is_empty())
        .map(|e| e.text.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_output_skips_partials_and_user() {
        let events = vec![
            Event::new("i", "student").with_text("{\"age\":20}"),
            Event::new("i", "merger_agent").with_text("tok").partial(),
            Event::new("i", "merger_agent").with_text("{\"output\":\"calm\"}"),
            Event::new("i", USER_AUTHOR).with_text("again"),
        ];
        assert_eq!(final_output(&events), "{\"output\":\"calm\"}");
        assert_eq!(final_output(&[]), "");
    }
}
