//! Prometheus counters for vendor traffic.
//!
//! Counters live in a private registry installed once by [`init`]. Recording
//! before `init` (unit tests, CLI commands) is a no-op.

use once_cell::sync::OnceCell;
use prometheus::{opts, Encoder, IntCounterVec, Registry, TextEncoder};

use crate::models::integration::Provider;

static METRICS: OnceCell<Metrics> = OnceCell::new();

pub struct Metrics {
    registry: Registry,
    vendor_calls_total: IntCounterVec,
    token_refresh_total: IntCounterVec,
    bookings_total: IntCounterVec,
}

impl Metrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let vendor_calls_total = IntCounterVec::new(
            opts!("callhub_vendor_calls_total", "Vendor capability calls by outcome"),
            &["provider", "outcome"],
        )?;
        let token_refresh_total = IntCounterVec::new(
            opts!("callhub_token_refresh_total", "OAuth token refreshes by outcome"),
            &["provider", "outcome"],
        )?;
        let bookings_total = IntCounterVec::new(
            opts!("callhub_bookings_total", "Unified booking requests by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(vendor_calls_total.clone()))?;
        registry.register(Box::new(token_refresh_total.clone()))?;
        registry.register(Box::new(bookings_total.clone()))?;

        Ok(Self {
            registry,
            vendor_calls_total,
            token_refresh_total,
            bookings_total,
        })
    }
}

pub fn init() -> prometheus::Result<&'static Metrics> {
    METRICS.get_or_try_init(Metrics::new)
}

pub fn record_vendor_call(provider: Provider, outcome: &str) {
    if let Some(m) = METRICS.get() {
        m.vendor_calls_total
            .with_label_values(&[provider.as_str(), outcome])
            .inc();
    }
}

pub fn record_token_refresh(provider: Provider, ok: bool) {
    if let Some(m) = METRICS.get() {
        m.token_refresh_total
            .with_label_values(&[provider.as_str(), if ok { "ok" } else { "failed" }])
            .inc();
    }
}

pub fn record_booking(outcome: &str) {
    if let Some(m) = METRICS.get() {
        m.bookings_total.with_label_values(&[outcome]).inc();
    }
}

/// Text exposition format for `GET /metrics`.
pub fn render() -> String {
    let Some(m) = METRICS.get() else {
        return String::new();
    };
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&m.registry.gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_after_init() {
        init().unwrap();
        record_vendor_call(Provider::Zoom, "ok");
        record_token_refresh(Provider::Calendly, false);
        record_booking("success");

        let text = render();
        assert!(text.contains("callhub_vendor_calls_total{"));
        assert!(text.contains("provider=\"zoom\""));
        assert!(text.contains("callhub_bookings_total"));
    }
}
