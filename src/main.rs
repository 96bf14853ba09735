use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ai_backend::clock::{Clock, SystemClock};
use ai_backend::config::Args;
use ai_backend::rate_limit::{RateLimiter, sweeper};
use ai_backend::state::AppState;
use ai_backend::token::TokenCodec;
use ai_backend::users::InMemoryUserStore;

// this is main async function with tokio
#[tokio::main]
async fn main() -> Result<()> {
    // .env first so clap sees its values as environment
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let tokens = TokenCodec::new(args.secret_key.as_bytes(), &args.algorithm, Arc::clone(&clock))
        .context("invalid token configuration")?;

    // creating shared state
    let state = Arc::new(AppState {
        clock,
        tokens,
        token_ttl: args.access_token_ttl(),
        rate_limiter: RateLimiter::new(args.rate_limit_requests, args.rate_window()),
        users: Arc::new(InMemoryUserStore::new()),
    });

    // spawn the idle-client sweeper
    tokio::spawn(sweeper(Arc::clone(&state), args.sweep_interval()));

    let app = ai_backend::app(state).layer(cors_layer(&args.cors_origins));

    let addr = args.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "server listening");
    info!(
        requests = args.rate_limit_requests,
        window_secs = args.rate_limit_period,
        "rate limit configured"
    );
    info!(
        algorithm = %args.algorithm,
        ttl_minutes = args.access_token_expire_minutes,
        "access tokens configured"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("server stopped");
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
