use axum::{
    extract::State,
    middleware::{self as axum_middleware},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware;
use crate::switch::AwaySwitch;

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub bridge_api_key: String,
    pub switch: AwaySwitch,
}

/// Away state returned by the bridge
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AwayResponse {
    pub away: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
}

/// Body of `PUT /api/away`
#[derive(Debug, Deserialize)]
pub struct SetAwayRequest {
    pub away: bool,
}

/// Health check routes (no authentication required)
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// Away switch routes (require authentication)
pub fn away_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/away", get(get_away_handler).put(set_away_handler))
        .route("/api/away/refresh", post(refresh_away_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}

/// GET / - Simple health check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Netatmo Away bridge is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

/// GET /api/away - Current away state
///
/// Answers from the cache. On a miss it returns `away: false, cached: false`
/// and refreshes in the background; poll again to get the real value.
async fn get_away_handler(State(state): State<AppState>) -> Json<AwayResponse> {
    let current = state.switch.get();
    Json(AwayResponse {
        away: current.away,
        cached: Some(current.cached),
    })
}

/// POST /api/away/refresh - Read the away state from Netatmo
async fn refresh_away_handler(
    State(state): State<AppState>,
) -> Result<Json<AwayResponse>, ApiError> {
    let away = state.switch.refresh().await?;
    Ok(Json(AwayResponse { away, cached: None }))
}

/// PUT /api/away - Switch away mode on or off
async fn set_away_handler(
    State(state): State<AppState>,
    body: Result<Json<SetAwayRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<AwayResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::ValidationError(e.body_text()))?;

    tracing::info!("Request to set away mode `{}`", request.away);
    state.switch.set(request.away).await?;

    Ok(Json(AwayResponse {
        away: request.away,
        cached: None,
    }))
}
