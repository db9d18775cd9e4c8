use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::app_state::AppState;

pub mod auth;
pub mod error;
pub mod extract;
pub mod health;
pub mod metrics;
pub mod users;
pub mod visits;

async fn root() -> Json<Value> {
    Json(json!({ "message": "Server running successfully 🚀" }))
}

/// Application routes, without the metrics endpoint and outer middleware.
pub fn router(state: AppState) -> Router {
    let body_limit = state.upload_limits.body_limit();

    Router::new()
        .route("/", get(root))
        .route("/health", get(health::health_check))
        .route("/api/addUser", post(users::add_user))
        .route("/api/user/verify", post(users::verify_user))
        .route("/api/user/status", get(users::user_status))
        .route(
            "/api/visits",
            get(visits::list_visits).post(visits::create_visit),
        )
        .route("/api/visits/{id}", get(visits::get_visit))
        .route("/api/visits/{id}/status", patch(visits::update_visit_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// CORS for the single frontend origin, with credentials.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, axum::http::header::InvalidHeaderValue> {
    Ok(CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true))
}
