//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Relay publish/receive counters and publish failures
//! - Durable log append and append-failure counters
//! - Persistence consumer counters (persisted, skipped, failures, pauses)
//! - Active WebSocket connection gauge

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Messages published into the relay channel by this process
pub static RELAY_MESSAGES_PUBLISHED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "relay_messages_published_total",
            "Messages published to the relay channel",
        )
        .namespace("chat_relay"),
    )
    .expect("Failed to create RELAY_MESSAGES_PUBLISHED metric")
});

/// Relay publish attempts that failed (message not fanned out)
pub static RELAY_PUBLISH_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "relay_publish_failures_total",
            "Failed publishes to the relay channel",
        )
        .namespace("chat_relay"),
    )
    .expect("Failed to create RELAY_PUBLISH_FAILURES metric")
});

/// Messages delivered to this process by the relay subscription
pub static RELAY_MESSAGES_RECEIVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "relay_messages_received_total",
            "Messages received from the relay channel",
        )
        .namespace("chat_relay"),
    )
    .expect("Failed to create RELAY_MESSAGES_RECEIVED metric")
});

/// Records appended to the durable log
pub static LOG_RECORDS_APPENDED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "log_records_appended_total",
            "Records appended to the durable log",
        )
        .namespace("chat_relay"),
    )
    .expect("Failed to create LOG_RECORDS_APPENDED metric")
});

/// Best-effort log appends that failed (message broadcast but not persisted)
pub static LOG_APPEND_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "log_append_failures_total",
            "Failed appends to the durable log",
        )
        .namespace("chat_relay"),
    )
    .expect("Failed to create LOG_APPEND_FAILURES metric")
});

/// Records successfully persisted to the row store
pub static LOG_RECORDS_PERSISTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "log_records_persisted_total",
            "Log records persisted to the row store",
        )
        .namespace("chat_relay"),
    )
    .expect("Failed to create LOG_RECORDS_PERSISTED metric")
});

/// Records skipped by the consumer (empty or malformed payloads)
pub static LOG_RECORDS_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "log_records_skipped_total",
            "Log records skipped by the persistence consumer",
        )
        .namespace("chat_relay"),
    )
    .expect("Failed to create LOG_RECORDS_SKIPPED metric")
});

/// Row-store writes that failed
pub static PERSISTENCE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "persistence_failures_total",
            "Failed row-store writes in the persistence consumer",
        )
        .namespace("chat_relay"),
    )
    .expect("Failed to create PERSISTENCE_FAILURES metric")
});

/// Times the consumer entered its pause state
pub static CONSUMER_PAUSES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "consumer_pauses_total",
            "Times the persistence consumer paused after a failure",
        )
        .namespace("chat_relay"),
    )
    .expect("Failed to create CONSUMER_PAUSES metric")
});

/// Active WebSocket connections gauge
pub static WEBSOCKET_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new(
            "websocket_connections_active",
            "Number of active WebSocket connections",
        )
        .namespace("chat_relay"),
    )
    .expect("Failed to create WEBSOCKET_CONNECTIONS_ACTIVE metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(RELAY_MESSAGES_PUBLISHED.clone()))
        .expect("Failed to register RELAY_MESSAGES_PUBLISHED");
    registry
        .register(Box::new(RELAY_PUBLISH_FAILURES.clone()))
        .expect("Failed to register RELAY_PUBLISH_FAILURES");
    registry
        .register(Box::new(RELAY_MESSAGES_RECEIVED.clone()))
        .expect("Failed to register RELAY_MESSAGES_RECEIVED");
    registry
        .register(Box::new(LOG_RECORDS_APPENDED.clone()))
        .expect("Failed to register LOG_RECORDS_APPENDED");
    registry
        .register(Box::new(LOG_APPEND_FAILURES.clone()))
        .expect("Failed to register LOG_APPEND_FAILURES");
    registry
        .register(Box::new(LOG_RECORDS_PERSISTED.clone()))
        .expect("Failed to register LOG_RECORDS_PERSISTED");
    registry
        .register(Box::new(LOG_RECORDS_SKIPPED.clone()))
        .expect("Failed to register LOG_RECORDS_SKIPPED");
    registry
        .register(Box::new(PERSISTENCE_FAILURES.clone()))
        .expect("Failed to register PERSISTENCE_FAILURES");
    registry
        .register(Box::new(CONSUMER_PAUSES.clone()))
        .expect("Failed to register CONSUMER_PAUSES");
    registry
        .register(Box::new(WEBSOCKET_CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register WEBSOCKET_CONNECTIONS_ACTIVE");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Metrics should be valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // Force lazy initialization
        let _ = &*REGISTRY;
        let _ = &*RELAY_MESSAGES_PUBLISHED;
        let _ = &*LOG_RECORDS_PERSISTED;
        let _ = &*WEBSOCKET_CONNECTIONS_ACTIVE;
    }

    #[test]
    fn test_gather_metrics() {
        let metrics = gather_metrics();
        assert!(!metrics.is_empty());
    }

    #[test]
    fn test_counters_increment() {
        let before = RELAY_MESSAGES_RECEIVED.get();
        RELAY_MESSAGES_RECEIVED.inc();
        assert_eq!(RELAY_MESSAGES_RECEIVED.get(), before + 1);

        let metrics = gather_metrics();
        assert!(metrics.contains("relay_messages_received_total"));
    }
}
