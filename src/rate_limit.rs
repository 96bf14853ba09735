use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::error::ErrorEnvelope;
use crate::metrics::{RATE_LIMITED_TOTAL, RATE_LIMIT_CLIENTS};
use crate::pipeline::{client_address, path_matches};
use crate::state::AppState;

pub const RATE_LIMIT_EXEMPT_PATHS: &[&str] = &[
    "/",
    "/docs",
    "/redoc",
    "/openapi.json",
    "/api/v1/health",
    "/metrics",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Permitted { remaining: u32 },
    Limited { retry_after: u64 },
}

pub struct RateLimiter {
    windows: DashMap<String, VecDeque<DateTime<Utc>>>, // client key -> accepted request times
    max_requests: u32,
    window: TimeDelta,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    // entry() holds the shard lock across prune, check and append; rejections aren't recorded
    pub fn allow(&self, client_key: &str, now: DateTime<Utc>) -> RateDecision {
        let mut seq = self.windows.entry(client_key.to_string()).or_default();
        evict_stale(&mut seq, now, self.window);

        if seq.len() >= self.max_requests as usize {
            let retry_after = match seq.iter().min() {
                Some(oldest) => retry_after_secs(
                    self.window.checked_sub(&(now - *oldest)).unwrap_or(self.window),
                ),
                None => retry_after_secs(self.window - TimeDelta::seconds(1)),
            };
            return RateDecision::Limited { retry_after };
        }

        seq.push_back(now);
        let used = u32::try_from(seq.len()).unwrap_or(u32::MAX);
        RateDecision::Permitted {
            remaining: self.max_requests.saturating_sub(used),
        }
    }

    pub fn prune(&self, client_key: &str, now: DateTime<Utc>) -> usize {
        match self.windows.get_mut(client_key) {
            Some(mut seq) => {
                evict_stale(&mut seq, now, self.window);
                seq.len()
            }
            None => 0,
        }
    }

    // returns how many keys were removed
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, seq| {
            evict_stale(seq, now, self.window);
            !seq.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    // Forget everything
    pub fn reset(&self) {
        self.windows.clear();
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("clients", &self.windows.len())
            .finish()
    }
}

// keep only timestamps with now - ts < window
fn evict_stale(seq: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: TimeDelta) {
    seq.retain(|ts| now - *ts < window);
}

// (window - age) + 1 second, rounded up to whole seconds
fn retry_after_secs(wait: TimeDelta) -> u64 {
    let millis = wait.num_milliseconds().saturating_add(1000).max(1000);
    u64::try_from(millis.saturating_add(999) / 1000).unwrap_or(u64::MAX)
}

pub async fn enforce(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    if path_matches(request.uri().path(), RATE_LIMIT_EXEMPT_PATHS) {
        return next.run(request).await;
    }

    let client = client_address(&request);
    let now = state.clock.now();
    let limiter = &state.rate_limiter;

    match limiter.allow(&client, now) {
        RateDecision::Limited { retry_after } => {
            RATE_LIMITED_TOTAL.inc();
            warn!(
                client = %client,
                path = %request.uri().path(),
                retry_after,
                "rate limit exceeded"
            );
            rate_limit_response(retry_after, limiter.max_requests())
        }
        RateDecision::Permitted { remaining } => {
            let mut response = next.run(request).await;
            let reset_at = now.timestamp().saturating_add(limiter.window().num_seconds());
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limiter.max_requests()));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            headers.insert("x-ratelimit-reset", HeaderValue::from(reset_at));
            response
        }
    }
}

pub fn rate_limit_response(retry_after: u64, limit: u32) -> Response {
    let mut response = ErrorEnvelope::new(
        "RATE_LIMIT_EXCEEDED",
        format!("Rate limit exceeded. Try again in {retry_after} seconds."),
    )
    .with_status(StatusCode::TOO_MANY_REQUESTS)
    .into_response();

    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
    response
}

// Idle-key sweeper - runs every `sweep_interval`
pub async fn sweeper(state: Arc<AppState>, sweep_interval: Duration) {
    let mut interval = interval(sweep_interval);

    info!(interval = ?sweep_interval, "rate limit sweeper started");

    loop {
        interval.tick().await;

        let removed = state.rate_limiter.sweep_idle(state.clock.now());
        let tracked = state.rate_limiter.tracked_clients();
        RATE_LIMIT_CLIENTS.set(tracked as f64);

        if removed > 0 {
            debug!(removed, tracked, "evicted idle rate limit clients");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn limiter() -> RateLimiter {
        RateLimiter::new(3, Duration::from_secs(60))
    }

    #[test]
    fn permits_up_to_quota_then_limits() {
        let limiter = limiter();

        assert_eq!(limiter.allow("a", at(0)), RateDecision::Permitted { remaining: 2 });
        assert_eq!(limiter.allow("a", at(1)), RateDecision::Permitted { remaining: 1 });
        assert_eq!(limiter.allow("a", at(2)), RateDecision::Permitted { remaining: 0 });
        assert_eq!(limiter.allow("a", at(3)), RateDecision::Limited { retry_after: 58 });
    }

    #[test]
    fn rejected_attempts_are_not_recorded() {
        let limiter = limiter();
        for t in 0..3 {
            limiter.allow("a", at(t));
        }
        for t in 3..10 {
            assert!(matches!(limiter.allow("a", at(t)), RateDecision::Limited { .. }));
        }
        assert_eq!(limiter.prune("a", at(10)), 3);
    }

    #[test]
    fn window_slides_as_oldest_ages_out() {
        let limiter = limiter();
        for t in 0..3 {
            limiter.allow("a", at(t));
        }

        // t=0 is exactly one window old at t=60 and no longer counts
        assert_eq!(limiter.allow("a", at(60)), RateDecision::Permitted { remaining: 0 });
        assert_eq!(limiter.allow("a", at(60)), RateDecision::Limited { retry_after: 2 });

        // at t=61, t=1 has aged out too
        assert!(matches!(limiter.allow("a", at(61)), RateDecision::Permitted { .. }));
    }

    #[test]
    fn eviction_is_strict_at_the_boundary() {
        let limiter = limiter();
        for t in 0..3 {
            limiter.allow("a", at(t));
        }

        let just_before = at(59) + TimeDelta::milliseconds(999);
        assert!(matches!(limiter.allow("a", just_before), RateDecision::Limited { .. }));
        assert!(matches!(limiter.allow("a", at(60)), RateDecision::Permitted { .. }));
    }

    #[test]
    fn fractional_wait_rounds_up() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.allow("a", at(0));

        let now = at(2) + TimeDelta::milliseconds(500);
        // 60 - 2.5 + 1 = 58.5 -> 59
        assert_eq!(limiter.allow("a", now), RateDecision::Limited { retry_after: 59 });
    }

    #[test]
    fn prune_is_idempotent() {
        let limiter = limiter();
        for t in 0..3 {
            limiter.allow("a", at(t * 20));
        }

        let first = limiter.prune("a", at(70));
        let second = limiter.prune("a", at(70));
        assert_eq!(first, 2);
        assert_eq!(first, second);
    }

    #[test]
    fn clients_are_isolated() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert!(matches!(limiter.allow("a", at(0)), RateDecision::Permitted { .. }));
        assert!(matches!(limiter.allow("a", at(0)), RateDecision::Limited { .. }));
        assert!(matches!(limiter.allow("b", at(0)), RateDecision::Permitted { .. }));
    }

    #[test]
    fn sweep_drops_only_idle_keys() {
        let limiter = limiter();
        limiter.allow("idle", at(0));
        limiter.allow("busy", at(50));

        assert_eq!(limiter.sweep_idle(at(70)), 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.prune("busy", at(70)), 1);
        assert_eq!(limiter.prune("idle", at(70)), 0);
    }

    #[test]
    fn reset_forgets_all_clients() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.allow("a", at(0));
        limiter.reset();

        assert_eq!(limiter.tracked_clients(), 0);
        assert!(matches!(limiter.allow("a", at(1)), RateDecision::Permitted { .. }));
    }

    #[test]
    fn zero_quota_always_limits() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        assert_eq!(limiter.allow("a", at(0)), RateDecision::Limited { retry_after: 60 });
    }

    #[test]
    fn retry_after_never_below_one_second() {
        assert_eq!(retry_after_secs(TimeDelta::zero()), 1);
        assert_eq!(retry_after_secs(TimeDelta::seconds(57)), 58);
        assert_eq!(retry_after_secs(TimeDelta::milliseconds(57_001)), 59);
    }

    #[test]
    fn concurrent_callers_never_exceed_quota() {
        let limiter = RateLimiter::new(50, Duration::from_secs(60));
        let now = at(0);

        let permitted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    s.spawn(|| {
                        (0..100)
                            .filter(|_| {
                                matches!(limiter.allow("k", now), RateDecision::Permitted { .. })
                            })
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(permitted, 50);
        assert_eq!(limiter.prune("k", now), 50);
    }

    #[test]
    fn unbounded_window_saturates() {
        assert_eq!(retry_after_secs(TimeDelta::MAX), (i64::MAX / 1000) as u64);

        let limiter = RateLimiter::new(1, Duration::MAX);
        limiter.allow("a", at(0));
        assert!(matches!(limiter.allow("a", at(1)), RateDecision::Limited { .. }));
    }
}
