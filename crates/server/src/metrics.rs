//! Prometheus metrics
//!
//! Exposes the recorder at `/metrics` and small helpers the connection and
//! turn code call at the relevant points.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder and register metric descriptions
///
/// Safe to call more than once; later calls return the existing handle.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            describe_counter!("gateway_requests_total", "HTTP requests handled");
            describe_counter!("gateway_errors_total", "Errors by kind");
            describe_counter!("gateway_turns_total", "Turns by outcome");
            describe_gauge!("gateway_open_connections", "Open WebSocket connections");
            describe_histogram!("gateway_stt_duration_seconds", "STT phase latency");
            describe_histogram!("gateway_query_duration_seconds", "Resolver phase latency");
            describe_histogram!("gateway_tts_duration_seconds", "TTS phase latency");
            describe_histogram!("gateway_store_duration_seconds", "Store append latency");
            describe_histogram!("gateway_turn_duration_seconds", "Whole-turn latency");

            handle
        })
        .clone()
}

/// Render the current metric values
pub async fn metrics_handler() -> String {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}

pub fn record_request(endpoint: &'static str) {
    counter!("gateway_requests_total", "endpoint" => endpoint).increment(1);
}

pub fn record_error(kind: &'static str) {
    counter!("gateway_errors_total", "kind" => kind).increment(1);
}

pub fn record_turn(outcome: &'static str, elapsed: Duration) {
    counter!("gateway_turns_total", "outcome" => outcome).increment(1);
    histogram!("gateway_turn_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_stt_latency(elapsed: Duration) {
    histogram!("gateway_stt_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_query_latency(elapsed: Duration) {
    histogram!("gateway_query_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_tts_latency(elapsed: Duration) {
    histogram!("gateway_tts_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_store_latency(elapsed: Duration) {
    histogram!("gateway_store_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn connection_opened() {
    gauge!("gateway_open_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("gateway_open_connections").decrement(1.0);
}
