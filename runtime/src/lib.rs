//! Drive discrete-event simulations with a deterministic clock and one-shot alarms.
//!
//! This crate provides the timing primitives that simulated network components are written
//! against. Components hold a `Context` and only ever interact with it through the [Clock],
//! [Timer], and [Metrics] traits. The owner of the simulation holds the matching `Executor`
//! and uses it to advance virtual time, dispatching each fired alarm to whichever component
//! armed it.
//!
//! # Terminology
//!
//! Each runtime is composed of an `Executor` and a `Context`. The `Executor` drives execution
//! (it decides which alarm fires next and moves the clock). The `Context` implements the other
//! traits and is cheap to clone.
//!
//! # Status
//!
//! `reorder-runtime` is **ALPHA** software and is not yet recommended for production use. Developers
//! should expect breaking changes and occasional instability.

use prometheus_client::registry::Metric;
use std::time::{Duration, SystemTime};
use thiserror::Error;

pub mod deterministic;
pub mod telemetry;
mod utils;
pub use utils::{hex, SystemTimeExt};

/// Prefix for runtime metrics.
const METRICS_PREFIX: &str = "runtime";

/// Errors that can occur when interacting with the runtime.
#[derive(Error, Debug)]
pub enum Error {
    #[error("metrics encoding failed: {0}")]
    Encode(#[from] std::fmt::Error),
}

/// Handle to a one-shot alarm armed with a [Timer].
///
/// Handles are unique for the lifetime of the runtime that issued them, so a stale handle
/// (one that already fired or was cancelled) never refers to a newer alarm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Alarm(u64);

impl Alarm {
    /// Create a handle from a raw identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier of the alarm.
    pub const fn id(&self) -> u64 {
        self.0
    }
}

/// Interface that any runtime must implement to provide the current time.
///
/// It is necessary to mock time to provide deterministic execution of
/// simulated components.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Returns the current time.
    fn current(&self) -> SystemTime;
}

/// Interface that any runtime must implement to arm and disarm one-shot alarms.
///
/// Arming an alarm returns immediately. When the alarm fires, the runtime hands its
/// [Timer::Event] back to whoever drives execution, who is responsible for routing it to the
/// component that armed it.
pub trait Timer: Clock {
    /// Payload delivered when an alarm fires.
    type Event;

    /// Arm an alarm that fires `delay` after the current time.
    ///
    /// Deadlines that would overflow saturate, so the alarm stays armed but effectively never
    /// fires.
    fn schedule(&self, delay: Duration, event: Self::Event) -> Alarm;

    /// Disarm an alarm, returning whether it was still pending.
    ///
    /// Cancelling an alarm that already fired or was already cancelled is a no-op. A cancelled
    /// alarm never fires.
    fn cancel(&self, alarm: Alarm) -> bool;

    /// Returns the time at which a pending alarm will fire (or `None` if it is no longer
    /// pending).
    fn deadline(&self, alarm: Alarm) -> Option<SystemTime>;
}

/// Interface to register and encode metrics.
pub trait Metrics: Clone + Send + Sync + 'static {
    /// Get the current label of the context.
    fn label(&self) -> String;

    /// Create a new instance of `Metrics` with the given label appended to the end
    /// of the current `Metrics` label.
    ///
    /// This is commonly used to create a nested context for `register`.
    ///
    /// It is not permitted for any implementation to use `METRICS_PREFIX` as the start of a
    /// label (reserved for metrics for the runtime).
    fn with_label(&self, label: &str) -> Self;

    /// Prefix the given label with the current context's label.
    ///
    /// Unlike `with_label`, this method does not create a new context.
    fn scoped_label(&self, label: &str) -> String {
        let label = if self.label().is_empty() {
            label.to_string()
        } else {
            format!("{}_{}", self.label(), label)
        };
        assert!(
            !label.starts_with(METRICS_PREFIX),
            "using runtime label is not allowed"
        );
        label
    }

    /// Register a metric with the runtime.
    ///
    /// Any registered metric will include (as a prefix) the label of the current context.
    fn register<N: Into<String>, H: Into<String>>(&self, name: N, help: H, metric: impl Metric);

    /// Encode all metrics into a buffer using the text exposition format.
    fn encode(&self) -> Result<String, Error>;
}
