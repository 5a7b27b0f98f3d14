//! Tracing + Prometheus wiring.
//!
//! Collectors are constructed up front, registered once, and exposed via
//! `/metrics` directly against a `Registry` rather than through a facade
//! crate.

use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static DEVICES_ONLINE: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("meshctl_devices_online", "Currently online devices").unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static ALERTS_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("meshctl_alerts_created_total", "Alerts created").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static ALERTS_UPDATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("meshctl_alerts_updated_total", "Alert occurrences folded").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static NOTIFICATIONS_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("meshctl_notifications_sent_total", "Notifications dispatched by channel"),
        &["channel", "outcome"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static EVENTBUS_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new(
        "meshctl_eventbus_dropped_total",
        "Events dropped because a client's send buffer was full",
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static TOPOLOGY_RESOLVE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(HistogramOpts::new(
        "meshctl_topology_resolve_seconds",
        "Time to compute a device's peer set",
    ))
    .unwrap();
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

pub fn render() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    encoder.encode(&families, &mut buf).ok();
    buf
}
