pub mod access_log;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod fault;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod state;
pub mod token;
pub mod users;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::pipeline::Stage;
use crate::state::AppState;

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/api/v1/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/v1/users/register", post(handlers::register_handler))
        .route("/api/v1/users/login", post(handlers::login_handler))
        .route("/api/v1/users/me", get(handlers::me_handler))
        .with_state(state)
}

pub fn app_with_stages(state: Arc<AppState>, stages: &[Stage]) -> Router {
    pipeline::apply(routes(Arc::clone(&state)), &state, stages)
}

pub fn app(state: Arc<AppState>) -> Router {
    app_with_stages(state, &Stage::ALL)
}
