// src/state.rs
use std::sync::Arc;
use std::time::Duration;

use crate::apps::AgentRegistry;
use crate::config::Config;
use crate::error::Result;
use crate::http::HttpClient;
use crate::services::eval_store::EvalStore;
use crate::services::metrics_manager::MetricsManager;
use crate::services::runner::Runner;
use crate::services::session_manager::SessionManager;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub agents: AgentRegistry,
    pub sessions: SessionManager,
    pub metrics: MetricsManager,
    pub runner: Runner,
    pub evals: EvalStore,
    /// Client for calls back into this service.
    pub loopback: HttpClient,
}

impl AppState {
    pub fn new(config: Config, agents: AgentRegistry) -> Result<Self> {
        let sessions = SessionManager::new(config.session_ttl);
        let metrics = MetricsManager::new();
        let runner = Runner::new(sessions.clone(), metrics.clone());
        let evals = EvalStore::new(config.eval_dir.clone());
        let loopback = HttpClient::with_timeout(
            concat!("persona-agent-backend/", env!("CARGO_PKG_VERSION")),
            Duration::from_secs(30),
        )?;
        Ok(Self {
            config,
            agents,
            sessions,
            metrics,
            runner,
            evals,
            loopback,
        })
    }
}
