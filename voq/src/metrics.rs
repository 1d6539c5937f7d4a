use crate::History;
use prometheus_client::metrics::{counter::Counter, histogram::Histogram};
use reorder_runtime::{
    telemetry::histogram::{Buckets, HistogramExt},
    Metrics as RuntimeMetrics,
};
use std::time::SystemTime;

/// Metrics shared by every [`Voq`](super::Voq) in a simulation.
///
/// Create once and hand a clone to each queue.
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Number of flushes triggered by an alarm firing
    pub forced: Counter,
    /// Number of flushes (forced or external)
    pub flushes: Counter,
    /// Number of packets released by flushes
    pub flushed: Counter,
    /// Number of estimate-error samples recorded
    pub probes: Counter,
    /// Histogram of packets released per flush
    pub flush_size: Histogram,
    /// Histogram of time from creation to flush
    pub hold_duration: Histogram,
    /// Histogram of estimate-error samples
    pub estimate_error: Histogram,
    /// Every estimate-error sample, in order
    pub history: History,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<M: RuntimeMetrics>(context: M) -> Self {
        let forced = Counter::default();
        context.register(
            "forced_flushes",
            "Number of flushes triggered by an alarm firing",
            forced.clone(),
        );
        let flushes = Counter::default();
        context.register(
            "flushes",
            "Number of flushes (forced or external)",
            flushes.clone(),
        );
        let flushed = Counter::default();
        context.register(
            "flushed_packets",
            "Number of packets released by flushes",
            flushed.clone(),
        );
        let probes = Counter::default();
        context.register(
            "probes",
            "Number of estimate-error samples recorded",
            probes.clone(),
        );
        let flush_size = Histogram::new(Buckets::BURST.into_iter());
        context.register(
            "flush_size",
            "Histogram of packets released per flush",
            flush_size.clone(),
        );
        let hold_duration = Histogram::new(Buckets::HOLD.into_iter());
        context.register(
            "hold_duration",
            "Histogram of time from creation to flush",
            hold_duration.clone(),
        );
        let estimate_error = Histogram::new(Buckets::SKEW.into_iter());
        context.register(
            "estimate_error",
            "Histogram of estimate-error samples",
            estimate_error.clone(),
        );

        Self {
            forced,
            flushes,
            flushed,
            probes,
            flush_size,
            hold_duration,
            estimate_error,
            history: History::default(),
        }
    }

    pub(crate) fn probe(&self, sample: i64) {
        self.probes.inc();
        self.estimate_error.observe_nanos(sample);
        self.history.record(sample);
    }

    pub(crate) fn flush(&self, count: usize, created: SystemTime, now: SystemTime) {
        self.flushes.inc();
        self.flushed.inc_by(count as u64);
        self.flush_size.observe(count as f64);
        self.hold_duration.observe_between(created, now);
    }
}
