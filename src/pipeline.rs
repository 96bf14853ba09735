use axum::{
    Router,
    extract::{ConnectInfo, Request},
    middleware,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;

use crate::state::AppState;
use crate::{access_log, auth, fault, rate_limit};

pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FaultTranslator,
    AccessLogger,
    RateLimiter,
    AuthGate,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::FaultTranslator,
        Stage::AccessLogger,
        Stage::RateLimiter,
        Stage::AuthGate,
    ];
}

// first entry outermost; panics are caught innermost
pub fn apply(router: Router, state: &Arc<AppState>, stages: &[Stage]) -> Router {
    let router = router.layer(CatchPanicLayer::custom(fault::panic_response));

    // Router::layer wraps what is already there, so add innermost first
    stages.iter().rev().fold(router, |router, stage| match stage {
        Stage::FaultTranslator => router.layer(middleware::from_fn(fault::translate)),
        Stage::AccessLogger => router.layer(middleware::from_fn(access_log::log_requests)),
        Stage::RateLimiter => router.layer(middleware::from_fn_with_state(
            Arc::clone(state),
            rate_limit::enforce,
        )),
        Stage::AuthGate => router.layer(middleware::from_fn_with_state(
            Arc::clone(state),
            auth::require_bearer,
        )),
    })
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub subject: Option<String>,
    pub started_at: Instant,
}

impl RequestContext {
    pub fn new(started_at: Instant) -> Self {
        Self {
            subject: None,
            started_at,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }
}

pub fn client_address(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

// exact match or a `/`-separated continuation; "/" matches only the root
pub fn path_matches(path: &str, entries: &[&str]) -> bool {
    entries.iter().any(|entry| {
        if *entry == "/" {
            return path == "/";
        }
        match path.strip_prefix(entry) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    })
}
