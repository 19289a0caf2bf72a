use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

const BUCKETS: &[f64] = &[
    1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0,
];

/// Install a global Prometheus recorder together with the exporter's own HTTP listener.
/// Must be called from inside a tokio runtime.
pub fn install_prometheus_exporter(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .set_buckets(BUCKETS)?
        .with_http_listener(address)
        .install()
}

// Shorthand for common metric types
pub fn inc(name: &'static str, labels: &[(String, String)], value: u64) {
    metrics::counter!(name, labels).increment(value);
}

pub fn gauge(name: &'static str, labels: &[(String, String)], value: f64) {
    metrics::gauge!(name, labels).set(value);
}

pub fn histogram(name: &'static str, labels: &[(String, String)], value: f64) {
    metrics::histogram!(name, labels).record(value);
}

// Records the milliseconds between creation and drop as a histogram entry
pub struct TimingGuard<'a> {
    name: &'static str,
    labels: TimingGuardLabels<'a>,
    start: Instant,
}

pub fn timing_guard<'a>(name: &'static str, labels: &'a [(String, String)]) -> TimingGuard<'a> {
    TimingGuard {
        name,
        labels: TimingGuardLabels::new(labels),
        start: Instant::now(),
    }
}

// Borrowed until a label is pushed, then owned.
enum TimingGuardLabels<'a> {
    Borrowed(&'a [(String, String)]),
    Owned(Vec<(String, String)>),
}

impl TimingGuard<'_> {
    // Consumes the guard so "label then report" is a one-liner.
    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.push_label(key, value);
        self
    }

    pub fn fin(self) {}
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        let labels = self.labels.as_slice();
        metrics::histogram!(self.name, labels).record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

impl<'a> TimingGuardLabels<'a> {
    fn new(labels: &'a [(String, String)]) -> Self {
        TimingGuardLabels::Borrowed(labels)
    }

    fn as_slice(&self) -> &[(String, String)] {
        match self {
            TimingGuardLabels::Borrowed(labels) => labels,
            TimingGuardLabels::Owned(labels) => labels,
        }
    }

    fn push_label(&mut self, key: &str, value: &str) {
        match self {
            TimingGuardLabels::Borrowed(labels) => {
                let mut existing = labels.to_vec();
                existing.push((key.to_string(), value.to_string()));
                *self = TimingGuardLabels::Owned(existing);
            }
            TimingGuardLabels::Owned(labels) => {
                labels.push((key.to_string(), value.to_string()));
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_inc_records_counter_with_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let labels = [("outcome".to_string(), "success".to_string())];
            inc("voucher_orders_total", &labels, 1);
            inc("voucher_orders_total", &labels, 2);
        });

        let counters: Vec<_> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(v) => Some((key.key().name().to_string(), v)),
                _ => None,
            })
            .collect();

        assert_eq!(counters, vec![("voucher_orders_total".to_string(), 3)]);
    }

    #[test]
    fn test_gauge_keeps_last_value_and_histogram_keeps_all() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let labels = [("cache".to_string(), "cache:shop:hot:".to_string())];
            gauge("cache_rebuild_slots_available", &labels, 4.0);
            gauge("cache_rebuild_slots_available", &labels, 1.0);
            histogram("cache_rebuild_duration_ms", &labels, 5.0);
            histogram("cache_rebuild_duration_ms", &labels, 7.0);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(snapshot.len(), 2);
        for (key, _, _, value) in snapshot {
            match (key.key().name(), value) {
                ("cache_rebuild_slots_available", DebugValue::Gauge(v)) => {
                    assert_eq!(v.into_inner(), 1.0)
                }
                ("cache_rebuild_duration_ms", DebugValue::Histogram(values)) => {
                    let values: Vec<f64> = values.into_iter().map(|v| v.into_inner()).collect();
                    assert_eq!(values, vec![5.0, 7.0]);
                }
                (name, other) => panic!("unexpected metric {name}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_timing_guard_records_once_with_pushed_label() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let labels: [(String, String); 0] = [];
            timing_guard("voucher_order_duration_ms", &labels)
                .label("outcome", "out_of_stock")
                .fin();
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(snapshot.len(), 1);
        let (key, _, _, value) = &snapshot[0];
        assert_eq!(key.key().name(), "voucher_order_duration_ms");
        assert!(key
            .key()
            .labels()
            .any(|l| l.key() == "outcome" && l.value() == "out_of_stock"));
        match value {
            DebugValue::Histogram(values) => assert_eq!(values.len(), 1),
            other => panic!("expected histogram, got {other:?}"),
        }
    }
}
