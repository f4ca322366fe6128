//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tmclient_tx_broadcast_total` (counter): broadcasts by mode and outcome
//! - `tmclient_sequence_retries_total` (counter): rebuilds after a sequence mismatch
//! - `tmclient_batch_shrinks_total` (counter): batch size halvings on oversized txs
//! - `tmclient_account_cache_total` (counter): cache lookups by result (hit/miss)
//! - `tmclient_ws_reconnects_total` (counter): websocket redial attempts by outcome
//! - `tmclient_ws_pong_latency_seconds` (histogram): ping→pong round trip
//! - `tmclient_ws_dropped_events_total` (counter): events dropped on full channels
//! - `tmclient_ws_subscriptions` (gauge): registered subscriptions

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_broadcast(mode: &'static str, success: bool) {
    let outcome = if success { "ok" } else { "error" };
    metrics::counter!("tmclient_tx_broadcast_total", "mode" => mode, "outcome" => outcome).increment(1);
}

pub fn record_sequence_retry() {
    metrics::counter!("tmclient_sequence_retries_total").increment(1);
}

pub fn record_batch_shrink(new_size: usize) {
    metrics::counter!("tmclient_batch_shrinks_total").increment(1);
    metrics::gauge!("tmclient_batch_size").set(new_size as f64);
}

pub fn record_account_cache(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("tmclient_account_cache_total", "result" => result).increment(1);
}

pub fn record_ws_reconnect(success: bool) {
    let outcome = if success { "ok" } else { "error" };
    metrics::counter!("tmclient_ws_reconnects_total", "outcome" => outcome).increment(1);
}

pub fn record_pong_latency(latency: Duration) {
    metrics::histogram!("tmclient_ws_pong_latency_seconds").record(latency.as_secs_f64());
}

pub fn record_dropped_event() {
    metrics::counter!("tmclient_ws_dropped_events_total").increment(1);
}

pub fn record_subscriptions(count: usize) {
    metrics::gauge!("tmclient_ws_subscriptions").set(count as f64);
}
