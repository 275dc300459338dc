// crates/server/src/metrics.rs
//! Prometheus metrics for the broadcast hub and file watcher.
//!
//! Recording is a no-op until [`init_metrics`] installs the global recorder,
//! so the hub can call these helpers unconditionally (tests included).

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_gauge!(
        "hub_clients_connected",
        "Number of push clients currently attached to the hub"
    );
    describe_counter!(
        "hub_frames_sent_total",
        "Frames queued to clients, by frame kind"
    );
    describe_counter!(
        "hub_clients_dropped_total",
        "Clients removed from the hub, by reason"
    );
    describe_counter!(
        "hub_hook_events_total",
        "Lifecycle events ingested, by event type"
    );
    describe_counter!(
        "watcher_events_dropped_total",
        "Raw file events lost because the debouncer fell behind"
    );
    describe_histogram!(
        "hub_aggregation_duration_seconds",
        "Duration of full snapshot aggregation passes in seconds"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn set_clients_connected(count: usize) {
    gauge!("hub_clients_connected").set(count as f64);
}

pub fn record_frames_sent(kind: &'static str, clients: usize) {
    counter!("hub_frames_sent_total", "kind" => kind).increment(clients as u64);
}

/// `reason` is one of `closed`, `backpressure`, `shutdown`.
pub fn record_client_dropped(reason: &'static str) {
    counter!("hub_clients_dropped_total", "reason" => reason).increment(1);
}

pub fn record_hook_event(event_type: &'static str) {
    counter!("hub_hook_events_total", "type" => event_type).increment(1);
}

pub fn record_watcher_event_dropped() {
    counter!("watcher_events_dropped_total").increment(1);
}

pub fn record_aggregation(duration: Duration, sessions: usize) {
    histogram!("hub_aggregation_duration_seconds").record(duration.as_secs_f64());
    tracing::debug!(
        duration_ms = duration.as_millis() as u64,
        sessions,
        "Aggregation pass completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        set_clients_connected(3);
        record_frames_sent("heartbeat", 3);
        record_client_dropped("backpressure");
        record_hook_event("SessionStart");
        record_watcher_event_dropped();
        record_aggregation(Duration::from_millis(5), 2);
    }

    #[test]
    fn test_dropped_watcher_events_are_counted() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            record_watcher_event_dropped();
            record_watcher_event_dropped();
        });
        assert!(handle.render().contains("watcher_events_dropped_total 2"));
    }

    #[test]
    fn test_render_metrics_before_init() {
        // Another test may have installed the recorder; only check it doesn't panic.
        let _ = render_metrics();
    }
}
