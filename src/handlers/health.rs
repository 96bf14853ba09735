use axum::{Json, response::IntoResponse};

pub const SERVICE_NAME: &str = "AI Backend Service";

// health handler
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": SERVICE_NAME
    }))
}

pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": format!("Welcome to {SERVICE_NAME}"),
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/docs",
        "health": "/api/v1/health"
    }))
}
