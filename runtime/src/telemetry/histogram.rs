//! Utilities for working with histograms.

use prometheus_client::metrics::histogram::Histogram;
use std::time::SystemTime;

/// Holds constants for bucket sizes for histograms.
pub struct Buckets;

impl Buckets {
    /// For how long a packet is held before release, in seconds.
    ///
    /// Data-center round trips are measured in microseconds, so holding a packet for more than a
    /// few milliseconds is already pathological.
    pub const HOLD: [f64; 12] = [
        1e-6, 2e-6, 5e-6, 1e-5, 2e-5, 5e-5, 1e-4, 2e-4, 5e-4, 0.001, 0.002, 0.005,
    ];

    /// For signed timing errors, in seconds.
    ///
    /// Negative values mean a deadline had already been overtaken by the measurement.
    pub const SKEW: [f64; 13] = [
        -1e-4, -1e-5, -5e-6, -2e-6, -1e-6, 0.0, 1e-6, 2e-6, 5e-6, 1e-5, 2e-5, 5e-5, 1e-4,
    ];

    /// For the number of items released together.
    pub const BURST: [f64; 10] = [1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0];
}

/// Extension trait for histograms.
pub trait HistogramExt {
    /// Observe the duration between two points in time, in seconds.
    ///
    /// If the clock goes backwards, the duration is 0.
    fn observe_between(&self, start: SystemTime, end: SystemTime);

    /// Observe a signed number of nanoseconds, in seconds.
    fn observe_nanos(&self, nanos: i64);
}

impl HistogramExt for Histogram {
    fn observe_between(&self, start: SystemTime, end: SystemTime) {
        let duration = end.duration_since(start).map_or(
            // Clock went backwards
            0.0,
            |duration| duration.as_secs_f64(),
        );
        self.observe(duration);
    }

    fn observe_nanos(&self, nanos: i64) {
        self.observe(nanos as f64 / 1e9);
    }
}
