use std::{sync::Arc, time::Duration};

use anyhow::Context;
use persona_agent_backend::{apps, config::Config, routes, state::AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let agents = apps::from_config(&config).context("building agents")?;
    let state = Arc::new(AppState::new(config, agents)?);

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            let purged = sessions.purge_expired().await;
            if purged > 0 {
                let remaining = sessions.len().await;
                info!(purged, remaining, "expired sessions removed");
            }
        }
    });

    let addr = format!("0.0.0.0:{}", state.config.port);
    info!(backend = ?state.config.backend_url, stream = ?state.config.stream_url, "client endpoints");
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("persona agent backend listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
