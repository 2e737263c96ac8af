// src/routes/mod.rs
pub mod apps;
pub mod chat;
pub mod runtime;
pub mod sessions;
pub mod simulate;
pub mod upload;

use crate::error::AppError;
use crate::state::SharedState;
use axum::{
    Json, Router,
    extract::{MatchedPath, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// User id for the simple chat endpoints.
pub const CHAT_USER: &str = "user";

pub fn create_router(state: SharedState) -> Router {
    let admin_routes = Router::new()
        .route("/metrics", get(get_metrics_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let session_routes = Router::new()
        .route(
            "/apps/{app_name}/users/{user_id}/sessions",
            post(sessions::create_session).get(sessions::list_sessions),
        )
        .route(
            "/apps/{app_name}/users/{user_id}/sessions/{session_id}",
            get(sessions::get_session)
                .post(sessions::create_session_with_id)
                .delete(sessions::delete_session),
        );

    Router::new()
        .route("/chat", post(chat::chat_handler))
        .route("/stream", get(chat::stream_handler))
        .route("/run", post(runtime::run))
        .route("/run_sse", post(runtime::run_sse))
        .merge(session_routes)
        .route("/apps/{app_name}/eval_sets", get(apps::eval_sets))
        .route("/apps/{app_name}/eval_results", get(apps::eval_results))
        .route("/list-apps", get(apps::list_apps))
        .route("/agent-info", get(apps::agent_info))
        .route("/upload", post(upload::upload_handler))
        .route("/simulate-flow", post(simulate::simulate_flow))
        .route("/health", get(apps::health_check))
        .nest("/admin", admin_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), track_route))
        .fallback_service(ServeDir::new(&state.config.static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

pub(crate) fn require_app(state: &SharedState, app_name: &str) -> Result<(), AppError> {
    match state.agents.get(app_name) {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound(format!("app '{app_name}' not found"))),
    }
}

async fn auth_middleware(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // No configured key means the admin routes stay closed.
    let Some(expected) = state.config.admin_key.as_deref() else {
        return Err(AppError::Unauthorized);
    };
    match req.headers().get("x-admin-key") {
        Some(val) if val.as_bytes() == expected.as_bytes() => Ok(next.run(req).await),
        _ => Err(AppError::Unauthorized),
    }
}

async fn track_route(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    if let Some(path) = req.extensions().get::<MatchedPath>() {
        state.metrics.increment_route(path.as_str()).await;
    }
    next.run(req).await
}

async fn get_metrics_handler(
    State(state): State<SharedState>,
) -> Json<crate::services::metrics_manager::MetricsData> {
    Json(state.metrics.get_metrics().await)
}
