use super::require_app;
use crate::{agents::describe, error::AppError, state::SharedState};
use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn agent_info(State(state): State<SharedState>) -> Json<Value> {
    let root = state.agents.default_agent();
    Json(json!({
        "app_name": state.agents.default_app(),
        "root_agent": describe(root.as_ref()),
        "apps": state.agents.names(),
    }))
}

pub async fn list_apps(State(state): State<SharedState>) -> Json<Vec<String>> {
    Json(state.agents.names())
}

pub async fn eval_sets(
    State(state): State<SharedState>,
    Path(app_name): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    require_app(&state, &app_name)?;
    Ok(Json(state.evals.list_eval_sets(&app_name).await?))
}

pub async fn eval_results(
    State(state): State<SharedState>,
    Path(app_name): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    require_app(&state, &app_name)?;
    Ok(Json(state.evals.list_eval_results(&app_name).await?))
}
