use std::sync::Arc;
use std::time::Duration;
use crate::clock::Clock;
use crate::rate_limit::RateLimiter;
use crate::token::TokenCodec;
use crate::users::UserStore;
// app's shared state

pub struct AppState {
    pub clock: Arc<dyn Clock>,
    pub tokens: TokenCodec,           // signs and verifies bearer tokens
    pub token_ttl: Duration,          // lifetime of tokens issued at login
    pub rate_limiter: RateLimiter,
    pub users: Arc<dyn UserStore>,
}
