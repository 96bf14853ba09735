use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, IntCounterVec, register_counter, register_gauge,
    register_histogram, register_int_counter_vec,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("ai_backend_requests_total", "Total number of requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter = register_counter!(
        "ai_backend_rate_limited_total",
        "Requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref AUTH_REJECTED_TOTAL: Counter = register_counter!(
        "ai_backend_auth_rejected_total",
        "Requests rejected by the auth gate"
    )
    .unwrap();
    pub static ref FAULTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ai_backend_faults_total",
        "Handler faults by error code",
        &["code"]
    )
    .unwrap();
    pub static ref REQUESTS_ABORTED_TOTAL: Counter = register_counter!(
        "ai_backend_requests_aborted_total",
        "Requests dropped before a response was produced"
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "ai_backend_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref RATE_LIMIT_CLIENTS: Gauge = register_gauge!(
        "ai_backend_rate_limit_clients",
        "Client keys currently tracked by the rate limiter"
    )
    .unwrap();
}
