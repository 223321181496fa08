//! # Prometheus Metrics
//!
//! Operational metrics for the payment platform, scraped at the `/metrics`
//! endpoint on the configured metrics port.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] so they do not
//! collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the server.
#[derive(Clone)]
pub struct PlatformMetrics {
    /// Registry that owns all metrics below.
    registry: Registry,
    /// Completed vendor payments.
    pub payments_total: IntCounter,
    /// Vendor payment attempts that failed (any reason).
    pub payment_failures_total: IntCounter,
    /// Completed deposits (direct loads plus confirmed gateway orders).
    pub deposits_total: IntCounter,
    /// Completed guardian → student transfers.
    pub transfers_total: IntCounter,
    /// Withdrawal requests accepted (vendor debited, record PENDING).
    pub withdrawal_requests_total: IntCounter,
    /// Withdrawals settled by an administrator.
    pub settlements_total: IntCounter,
    /// End-to-end vendor payment latency in seconds. Dominated by the
    /// bcrypt PIN verification, which is the point of the histogram.
    pub payment_latency_seconds: Histogram,
}

impl PlatformMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("campuspay".into()), None)
            .expect("failed to create prometheus registry");

        let payments_total =
            IntCounter::new("payments_total", "Completed vendor payments").expect("metric creation");
        registry
            .register(Box::new(payments_total.clone()))
            .expect("metric registration");

        let payment_failures_total = IntCounter::new(
            "payment_failures_total",
            "Vendor payment attempts that failed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(payment_failures_total.clone()))
            .expect("metric registration");

        let deposits_total =
            IntCounter::new("deposits_total", "Completed wallet deposits").expect("metric creation");
        registry
            .register(Box::new(deposits_total.clone()))
            .expect("metric registration");

        let transfers_total = IntCounter::new(
            "transfers_total",
            "Completed guardian to student transfers",
        )
        .expect("metric creation");
        registry
            .register(Box::new(transfers_total.clone()))
            .expect("metric registration");

        let withdrawal_requests_total = IntCounter::new(
            "withdrawal_requests_total",
            "Vendor withdrawal requests accepted",
        )
        .expect("metric creation");
        registry
            .register(Box::new(withdrawal_requests_total.clone()))
            .expect("metric registration");

        let settlements_total = IntCounter::new(
            "settlements_total",
            "Withdrawals settled by an administrator",
        )
        .expect("metric creation");
        registry
            .register(Box::new(settlements_total.clone()))
            .expect("metric registration");

        let payment_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "payment_latency_seconds",
                "End-to-end vendor payment latency in seconds",
            )
            .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(payment_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            payments_total,
            payment_failures_total,
            deposits_total,
            transfers_total,
            withdrawal_requests_total,
            settlements_total,
            payment_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for PlatformMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics handle passed to axum handlers.
pub type SharedMetrics = Arc<PlatformMetrics>;

/// Axum handler rendering `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_encode() {
        let metrics = PlatformMetrics::new();
        metrics.payments_total.inc();
        metrics.deposits_total.inc_by(3);
        metrics.payment_latency_seconds.observe(0.12);

        let text = metrics.encode().unwrap();
        assert!(text.contains("campuspay_payments_total 1"));
        assert!(text.contains("campuspay_deposits_total 3"));
        assert!(text.contains("campuspay_payment_latency_seconds"));
    }
}
