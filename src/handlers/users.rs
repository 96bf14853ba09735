use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{ApiResponse, Credentials, TokenResponse};
use crate::pipeline::RequestContext;
use crate::state::AppState;
use crate::users::User;

// malformed bodies are validation faults, not axum's plain-text rejection
fn credentials(payload: Result<Json<Credentials>, JsonRejection>) -> AppResult<Credentials> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::Validation(e.body_text()))
}

// password hashing is CPU-bound, keep it off the async workers
async fn run_blocking<T, F>(work: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("credential task failed")?
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<User>>)> {
    let body = credentials(payload)?;
    let users = Arc::clone(&state.users);
    let user = run_blocking(move || users.register(&body.email, &body.password)).await?;

    info!(user_id = user.id, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("User registered successfully", user)),
    ))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let body = credentials(payload)?;

    let users = Arc::clone(&state.users);
    let authenticated = run_blocking(move || users.authenticate(&body.email, &body.password)).await?;
    let Some(user) = authenticated else {
        return Err(AppError::Unauthorized("Incorrect email or password".into()));
    };

    let access_token = state
        .tokens
        .issue(user.id, state.token_ttl)
        .context("failed to issue access token")?;

    Ok(Json(ApiResponse::ok(
        "Login successful",
        TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: state.token_ttl.as_secs(),
        },
    )))
}

pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    ctx: Option<Extension<RequestContext>>,
) -> AppResult<Json<ApiResponse<User>>> {
    let subject = ctx
        .as_ref()
        .and_then(|Extension(ctx)| ctx.subject())
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;

    let user = subject
        .parse::<u64>()
        .ok()
        .and_then(|id| state.users.find(id))
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(Json(ApiResponse::ok("Current user", user)))
}
