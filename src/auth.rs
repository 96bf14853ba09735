use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::ErrorEnvelope;
use crate::metrics::AUTH_REJECTED_TOTAL;
use crate::pipeline::{RequestContext, path_matches};
use crate::state::AppState;
use crate::token::TokenCodec;

pub const AUTH_EXEMPT_PATHS: &[&str] = &[
    "/",
    "/docs",
    "/redoc",
    "/openapi.json",
    "/api/v1/health",
    "/api/v1/users/register",
    "/api/v1/users/login",
    "/metrics",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    MissingHeader,
    MalformedHeader,
    InvalidToken,
}

impl AuthRejection {
    fn message(self) -> &'static str {
        match self {
            AuthRejection::MissingHeader => "Authorization header missing",
            AuthRejection::MalformedHeader => "Invalid authorization header format",
            AuthRejection::InvalidToken => "Could not validate credentials",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    // None for exempt paths
    Allow(Option<String>),
    Reject(AuthRejection),
}

pub fn decide(path: &str, headers: &HeaderMap, tokens: &TokenCodec) -> AuthDecision {
    if path_matches(path, AUTH_EXEMPT_PATHS) {
        return AuthDecision::Allow(None);
    }

    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return AuthDecision::Reject(AuthRejection::MissingHeader);
    };

    let Some(credential) = bearer_credential(value) else {
        return AuthDecision::Reject(AuthRejection::MalformedHeader);
    };

    match tokens.verify(credential) {
        Ok(subject) => AuthDecision::Allow(Some(subject)),
        Err(reason) => {
            debug!(%reason, "bearer token rejected");
            AuthDecision::Reject(AuthRejection::InvalidToken)
        }
    }
}

// "<scheme> <credential>" with scheme == bearer, case-insensitive
fn bearer_credential(value: &HeaderValue) -> Option<&str> {
    let value = value.to_str().ok()?;
    let mut parts = value.split_whitespace();
    let (scheme, credential) = (parts.next()?, parts.next()?);
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(credential)
}

// binds the token subject into RequestContext for handlers
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let decision = decide(request.uri().path(), request.headers(), &state.tokens);

    match decision {
        AuthDecision::Allow(None) => next.run(request).await,
        AuthDecision::Allow(Some(subject)) => {
            match request.extensions_mut().get_mut::<RequestContext>() {
                Some(ctx) => ctx.subject = Some(subject),
                None => {
                    let mut ctx = RequestContext::new(Instant::now());
                    ctx.subject = Some(subject);
                    request.extensions_mut().insert(ctx);
                }
            }
            next.run(request).await
        }
        AuthDecision::Reject(reason) => {
            AUTH_REJECTED_TOTAL.inc();
            debug!(path = %request.uri().path(), ?reason, "unauthenticated request");
            unauthorized_response(reason)
        }
    }
}

pub fn unauthorized_response(reason: AuthRejection) -> Response {
    let mut response = ErrorEnvelope::new("UNAUTHORIZED", reason.message())
        .with_status(StatusCode::UNAUTHORIZED)
        .into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new(b"gate-secret", "HS256", Arc::new(ManualClock::at_secs(1_700_000_000)))
            .unwrap()
    }

    fn headers(auth: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth.parse().unwrap());
        headers
    }

    #[test]
    fn exempt_path_needs_no_header() {
        assert_eq!(
            decide("/api/v1/health", &HeaderMap::new(), &codec()),
            AuthDecision::Allow(None)
        );
    }

    #[test]
    fn exempt_path_ignores_bad_token() {
        assert_eq!(
            decide("/api/v1/health", &headers("Bearer junk"), &codec()),
            AuthDecision::Allow(None)
        );
    }

    #[test]
    fn missing_header() {
        assert_eq!(
            decide("/api/v1/users/me", &HeaderMap::new(), &codec()),
            AuthDecision::Reject(AuthRejection::MissingHeader)
        );
    }

    #[test]
    fn malformed_headers() {
        let codec = codec();
        for value in ["Bearer", "Basic abc", "Bearer a b", "token"] {
            assert_eq!(
                decide("/api/v1/users/me", &headers(value), &codec),
                AuthDecision::Reject(AuthRejection::MalformedHeader),
                "{value}"
            );
        }
    }

    #[test]
    fn invalid_token() {
        assert_eq!(
            decide("/api/v1/users/me", &headers("Bearer not.a.jwt"), &codec()),
            AuthDecision::Reject(AuthRejection::InvalidToken)
        );
    }

    #[test]
    fn valid_token_any_scheme_case() {
        let codec = codec();
        let token = codec.issue("42", Duration::from_secs(60)).unwrap();

        for scheme in ["Bearer", "bearer", "BEARER"] {
            assert_eq!(
                decide("/api/v1/users/me", &headers(&format!("{scheme} {token}")), &codec),
                AuthDecision::Allow(Some("42".to_string()))
            );
        }
    }
}
