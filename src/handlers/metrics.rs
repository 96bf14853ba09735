use anyhow::Context;
use prometheus::{Encoder, TextEncoder};

use crate::error::AppResult;

pub async fn metrics_handler() -> AppResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("failed to encode metrics")?;
    Ok(String::from_utf8(buffer).context("metrics output is not utf-8")?)
}
