use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default, Clone, Serialize)]
pub struct MetricsData {
    pub route_usage: HashMap<String, u64>,
    pub agent_runs: HashMap<String, u64>,
    pub agent_failures: HashMap<String, u64>,
}

#[derive(Debug, Clone)]
pub struct MetricsManager {
    inner: Arc<RwLock<MetricsData>>,
}

impl Default for MetricsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsData::default())),
        }
    }

    pub async fn increment_route(&self, route: &str) {
        let mut data = self.inner.write().await;
        *data.route_usage.entry(route.to_string()).or_insert(0) += 1;
    }

    pub async fn record_run(&self, app: &str, ok: bool) {
        let mut data = self.inner.write().await;
        *data.agent_runs.entry(app.to_string()).or_insert(0) += 1;
        if !ok {
            *data.agent_failures.entry(app.to_string()).or_insert(0) += 1;
        }
    }

    pub async fn get_metrics(&self) -> MetricsData {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_runs_and_failures_per_app() {
        let metrics = MetricsManager::new();
        metrics.record_run("multi-persona-agent", true).await;
        metrics.record_run("multi-persona-agent", false).await;
        metrics.increment_route("/chat").await;

        let data = metrics.get_metrics().await;
        assert_eq!(data.agent_runs["multi-persona-agent"], 2);
        assert_eq!(data.agent_failures["multi-persona-agent"], 1);
        assert_eq!(data.route_usage["/chat"], 1);
    }
}
