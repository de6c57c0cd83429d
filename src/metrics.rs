//! Prometheus metrics collection for slrelay.
//!
//! Metrics live in a process-wide registry and are exposed by [`crate::http`]
//! when a metrics port is configured. Every recorder is a no-op until
//! [`init`] has run, so code paths exercised in unit tests need no setup.
//!
//! - `relay_sessions_active` - live sessions in the registry (gauge)
//! - `relay_connections_total` - accepted WebSocket connections
//! - `relay_connection_errors_total{error}` - connections that failed before their loop
//! - `relay_commands_total{command}` - frames processed by verb
//! - `relay_command_duration_seconds{command}` - dispatch latency by verb
//! - `relay_frames_sent_total` - frames queued to a live connection
//! - `relay_send_failures_total` - frames dropped because the target had closed
//! - `relay_publish_fanout` - peers reached per `publish`

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Gauges
// ========================================================================

/// Sessions currently registered.
pub static SESSIONS_ACTIVE: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Counters
// ========================================================================

/// Connections that completed the WebSocket handshake.
pub static CONNECTIONS: OnceLock<IntCounter> = OnceLock::new();

/// Connections that failed before entering their receive loop.
pub static CONNECTION_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Commands processed by verb.
pub static COMMAND_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Frames queued to a live connection.
pub static FRAMES_SENT: OnceLock<IntCounter> = OnceLock::new();

/// Frames dropped because the target connection had already gone.
pub static SEND_FAILURES: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

/// Dispatch latency by verb.
pub static COMMAND_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Recipients per publish.
pub static PUBLISH_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before metrics are scraped. Later calls
/// leave the already-registered metrics in place.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(SESSIONS_ACTIVE, IntGauge::new("relay_sessions_active", "Sessions currently registered"));
    register!(CONNECTIONS, IntCounter::new("relay_connections_total", "Accepted WebSocket connections"));
    register!(CONNECTION_ERRORS, IntCounterVec::new(Opts::new("relay_connection_errors_total", "Connections that failed before serving"), &["error"]));
    register!(COMMAND_COUNTER, IntCounterVec::new(Opts::new("relay_commands_total", "Relay commands processed by verb"), &["command"]));
    register!(FRAMES_SENT, IntCounter::new("relay_frames_sent_total", "Frames queued to live connections"));
    register!(SEND_FAILURES, IntCounter::new("relay_send_failures_total", "Frames dropped for closed connections"));
    register!(COMMAND_LATENCY, HistogramVec::new(
        HistogramOpts::new("relay_command_duration_seconds", "Relay command latency by verb")
            .buckets(vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05]),
        &["command"]));
    register!(PUBLISH_FANOUT, Histogram::with_opts(
        HistogramOpts::new("relay_publish_fanout", "Peers reached per publish")
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 500.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recorders
// ============================================================================

#[inline]
pub fn inc_sessions() {
    if let Some(g) = SESSIONS_ACTIVE.get() {
        g.inc();
    }
}

#[inline]
pub fn dec_sessions() {
    if let Some(g) = SESSIONS_ACTIVE.get() {
        g.dec();
    }
}

#[inline]
pub fn record_connection() {
    if let Some(c) = CONNECTIONS.get() {
        c.inc();
    }
}

#[inline]
pub fn record_connection_error(error: &str) {
    if let Some(c) = CONNECTION_ERRORS.get() {
        c.with_label_values(&[error]).inc();
    }
}

/// Record a command execution with latency.
#[inline]
pub fn record_command(command: &str, duration_secs: f64) {
    if let Some(c) = COMMAND_COUNTER.get() {
        c.with_label_values(&[command]).inc();
    }
    if let Some(h) = COMMAND_LATENCY.get() {
        h.with_label_values(&[command]).observe(duration_secs);
    }
}

#[inline]
pub fn record_frame_sent() {
    if let Some(c) = FRAMES_SENT.get() {
        c.inc();
    }
}

#[inline]
pub fn record_send_failure() {
    if let Some(c) = SEND_FAILURES.get() {
        c.inc();
    }
}

/// Record how many peers a publish reached.
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = PUBLISH_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();
        init();

        record_command("publish", 0.0001);
        record_fanout(3);
        record_connection_error("handshake");

        let output = gather_metrics();
        assert!(output.contains("relay_commands_total"));
        assert!(output.contains("relay_publish_fanout"));
        assert!(output.contains("relay_connection_errors_total"));
    }
}
