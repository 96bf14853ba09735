use axum::{
    extract::Request,
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::any::Any;
use tracing::{error, warn};

use crate::error::{AppError, ErrorEnvelope, Fault};
use crate::metrics::FAULTS_TOTAL;

pub async fn translate(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = next.run(request).await;
    let fault = match response.extensions().get::<Fault>().cloned() {
        Some(fault) => fault,
        // bare 5xx from extractor rejections or layers: never forward its body
        None if response.status().is_server_error() => Fault::new(AppError::Internal(
            anyhow::anyhow!("{} response without fault", response.status()),
        )),
        None => return response,
    };

    let err = fault.error();
    let (status, code) = err.classify();
    FAULTS_TOTAL.with_label_values(&[code]).inc();

    match err {
        AppError::Internal(_) => {
            error!(%method, %path, error = %fault, "unhandled fault");
        }
        _ => {
            warn!(%method, %path, code, error = %fault, "request failed");
        }
    }

    let (parts, _) = response.into_parts();
    let mut translated = ErrorEnvelope::new(code, err.public_message())
        .with_status(status)
        .into_response();

    // keep headers stamped by inner stages (process time, rate-limit counters)
    for (name, value) in parts.headers.iter() {
        if *name != header::CONTENT_TYPE && *name != header::CONTENT_LENGTH {
            translated.headers_mut().append(name.clone(), value.clone());
        }
    }

    let headers = translated.headers_mut();
    match err {
        AppError::RateLimited { retry_after } => {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
        }
        AppError::Unauthorized(_) => {
            headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        _ => {}
    }

    translated
}

pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };

    AppError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}
