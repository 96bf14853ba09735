use axum::{
    extract::Request,
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::error::Fault;
use crate::metrics::{REQUESTS_ABORTED_TOTAL, REQUEST_LATENCY, REQUEST_TOTAL};
use crate::pipeline::{RequestContext, client_address};

pub const PROCESS_TIME_HEADER: &str = "x-process-time";

// Logs an abort line if dropped before `finish`, e.g. when the client
// disconnects and the request future is cancelled.
struct InFlight {
    method: Method,
    path: String,
    client: String,
    started_at: Instant,
    finished: bool,
}

impl InFlight {
    fn finish(&mut self) -> f64 {
        self.finished = true;
        let elapsed = self.started_at.elapsed().as_secs_f64();
        REQUEST_LATENCY.observe(elapsed);
        elapsed
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            REQUESTS_ABORTED_TOTAL.inc();
            warn!(
                method = %self.method,
                path = %self.path,
                client = %self.client,
                elapsed = %format!("{:.3}s", self.started_at.elapsed().as_secs_f64()),
                "request aborted"
            );
        }
    }
}

// a fault from inner stages is logged and passed on unchanged
pub async fn log_requests(mut request: Request, next: Next) -> Response {
    let started_at = Instant::now();
    REQUEST_TOTAL.inc();

    let mut in_flight = InFlight {
        method: request.method().clone(),
        path: request.uri().path().to_owned(),
        client: client_address(&request),
        started_at,
        finished: false,
    };

    info!(method = %in_flight.method, path = %in_flight.path, "request started");
    request.extensions_mut().insert(RequestContext::new(started_at));

    let mut response = next.run(request).await;
    let elapsed = in_flight.finish();
    let time = format!("{elapsed:.3}s");

    match response.extensions().get::<Fault>() {
        Some(fault) => error!(
            method = %in_flight.method,
            path = %in_flight.path,
            status = response.status().as_u16(),
            error = %fault,
            time = %time,
            client = %in_flight.client,
            "request failed"
        ),
        None => info!(
            method = %in_flight.method,
            path = %in_flight.path,
            status = response.status().as_u16(),
            time = %time,
            client = %in_flight.client,
            "request completed"
        ),
    }

    if let Ok(value) = HeaderValue::from_str(&elapsed.to_string()) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }

    response
}
