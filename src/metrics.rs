//! Prometheus metrics.
//!
//! Counters are recorded through the `metrics` facade; they are no-ops
//! unless [`install_exporter`] was called.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub const UPLOADS_TOTAL: &str = "burnshare_uploads_total";
pub const DOWNLOADS_TOTAL: &str = "burnshare_downloads_total";
pub const RATE_LIMITED_TOTAL: &str = "burnshare_rate_limited_total";
pub const SWEEP_DELETED_TOTAL: &str = "burnshare_sweep_deleted_total";

/// Start the Prometheus scrape endpoint on `addr`.
///
/// # Errors
///
/// Returns an error if the address is invalid or the exporter cannot be
/// installed (for example, when one is already installed).
pub fn install_exporter(addr: &str) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid metrics address: {addr}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    metrics::describe_counter!(UPLOADS_TOTAL, "Files successfully uploaded");
    metrics::describe_counter!(DOWNLOADS_TOTAL, "Download attempts by outcome");
    metrics::describe_counter!(RATE_LIMITED_TOTAL, "Requests rejected by the rate limiter");
    metrics::describe_counter!(SWEEP_DELETED_TOTAL, "Files removed by the expiry sweep");

    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_upload() {
    metrics::counter!(UPLOADS_TOTAL).increment(1);
}

/// `outcome` is one of `served`, `denied`, `expired`, `not_found`.
pub fn record_download(outcome: &'static str) {
    metrics::counter!(DOWNLOADS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_rate_limited() {
    metrics::counter!(RATE_LIMITED_TOTAL).increment(1);
}

pub fn record_sweep_deleted(count: u64) {
    metrics::counter!(SWEEP_DELETED_TOTAL).increment(count);
}
