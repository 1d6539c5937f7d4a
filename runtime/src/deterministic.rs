//! A deterministic runtime that fires one-shot alarms in virtual time.
//!
//! Time only moves when the [Executor] is asked for the next alarm. Alarms fire in deadline
//! order and alarms sharing a deadline fire in the order they were armed, so a simulation
//! driven by this runtime always replays identically.
//!
//! # Panics
//!
//! If the configured timeout elapses (in virtual time), the runtime will panic.
//!
//! # Example
//!
//! ```rust
//! use reorder_runtime::{deterministic::{Config, Executor}, Clock, Timer};
//! use std::time::Duration;
//!
//! let (executor, context) = Executor::init(Config::default());
//! context.schedule(Duration::from_nanos(50), "flush");
//! let fired = executor.next().unwrap();
//! assert_eq!(fired.event, "flush");
//! assert_eq!(fired.at, context.current());
//! ```

use crate::{hex, Alarm, Clock, Error, SystemTimeExt, Timer, METRICS_PREFIX};
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, gauge::Gauge},
    registry::{Metric, Registry},
};
use sha2::{Digest, Sha256};
use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::trace;

#[derive(Debug)]
struct Metrics {
    alarms_scheduled: Counter,
    alarms_cancelled: Counter,
    alarms_fired: Counter,
    alarms_pending: Gauge,
}

impl Metrics {
    pub fn init(registry: &mut Registry) -> Self {
        let metrics = Self {
            alarms_scheduled: Counter::default(),
            alarms_cancelled: Counter::default(),
            alarms_fired: Counter::default(),
            alarms_pending: Gauge::default(),
        };
        registry.register(
            "alarms_scheduled",
            "Total number of alarms scheduled",
            metrics.alarms_scheduled.clone(),
        );
        registry.register(
            "alarms_cancelled",
            "Total number of alarms cancelled before firing",
            metrics.alarms_cancelled.clone(),
        );
        registry.register(
            "alarms_fired",
            "Total number of alarms fired",
            metrics.alarms_fired.clone(),
        );
        registry.register(
            "alarms_pending",
            "Number of alarms currently pending",
            metrics.alarms_pending.clone(),
        );
        metrics
    }
}

/// Track the state of the runtime for determinism auditing.
pub struct Auditor {
    hash: Mutex<Vec<u8>>,
}

impl Default for Auditor {
    fn default() -> Self {
        Self {
            hash: Vec::new().into(),
        }
    }
}

impl Auditor {
    fn fire(&self, at: SystemTime, alarm: Alarm, label: &str) {
        let mut hash = self.hash.lock().unwrap();
        let mut hasher = Sha256::new();
        hasher.update(&*hash);
        hasher.update(b"fire");
        hasher.update(at.epoch().as_nanos().to_be_bytes());
        hasher.update(alarm.id().to_be_bytes());
        hasher.update(label.as_bytes());
        *hash = hasher.finalize().to_vec();
    }

    /// Generate a representation of the current state of the runtime.
    ///
    /// This can be used to ensure that logic running on top
    /// of the runtime is interacting deterministically.
    pub fn state(&self) -> String {
        let hash = self.hash.lock().unwrap().clone();
        hex(&hash)
    }
}

/// Configuration for the `deterministic` runtime.
#[derive(Clone, Debug)]
pub struct Config {
    /// Virtual time at which the runtime starts.
    pub start: SystemTime,

    /// If the runtime is still running at this point (i.e. an alarm is about to fire after
    /// this much virtual time has elapsed), it will panic.
    pub timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start: UNIX_EPOCH,
            timeout: None,
        }
    }
}

/// An alarm waiting in the heap.
///
/// Cancelled alarms are removed from `State::pending` eagerly and skipped lazily when they
/// reach the top of the heap.
#[derive(Clone, Copy)]
struct Entry {
    deadline: SystemTime,
    alarm: Alarm,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.alarm == other.alarm
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse the ordering for min-heap (ties broken by arming order)
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.alarm.cmp(&self.alarm))
    }
}

struct Pending<V> {
    deadline: SystemTime,
    label: String,
    event: V,
}

struct State<V> {
    time: SystemTime,
    next_alarm: u64,
    heap: BinaryHeap<Entry>,
    pending: HashMap<Alarm, Pending<V>>,
}

struct Runtime<V> {
    state: Mutex<State<V>>,
    registry: Mutex<Registry>,
    metrics: Metrics,
    auditor: Arc<Auditor>,
    deadline: Option<SystemTime>,
}

/// An alarm that has fired.
#[derive(Debug)]
pub struct Fired<V> {
    /// Handle returned when the alarm was armed.
    pub alarm: Alarm,

    /// Virtual time at which the alarm fired.
    pub at: SystemTime,

    /// Payload provided when the alarm was armed.
    pub event: V,
}

/// Deterministic runtime that fires alarms in virtual time.
pub struct Executor<V> {
    runtime: Arc<Runtime<V>>,
}

impl<V: Send + 'static> Executor<V> {
    /// Initialize a new `deterministic` runtime with the given configuration.
    pub fn init(cfg: Config) -> (Self, Context<V>) {
        // Create a new registry
        let mut registry = Registry::default();
        let runtime_registry = registry.sub_registry_with_prefix(METRICS_PREFIX);

        // Initialize runtime
        let metrics = Metrics::init(runtime_registry);
        let deadline = cfg
            .timeout
            .map(|timeout| cfg.start.checked_add(timeout).expect("timeout overflowed"));
        let runtime = Arc::new(Runtime {
            state: Mutex::new(State {
                time: cfg.start,
                next_alarm: 0,
                heap: BinaryHeap::new(),
                pending: HashMap::new(),
            }),
            registry: Mutex::new(registry),
            metrics,
            auditor: Arc::new(Auditor::default()),
            deadline,
        });
        let context = Context {
            label: String::new(),
            runtime: runtime.clone(),
        };
        (Self { runtime }, context)
    }

    /// Initialize a new `deterministic` runtime with the default configuration
    /// but exit after the given timeout.
    pub fn timed(timeout: Duration) -> (Self, Context<V>) {
        let cfg = Config {
            timeout: Some(timeout),
            ..Config::default()
        };
        Self::init(cfg)
    }

    /// Returns the auditor of the runtime.
    pub fn auditor(&self) -> Arc<Auditor> {
        self.runtime.auditor.clone()
    }

    /// Returns the current virtual time.
    pub fn now(&self) -> SystemTime {
        self.runtime.state.lock().unwrap().time
    }

    /// Returns the number of alarms that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        self.runtime.state.lock().unwrap().pending.len()
    }

    /// Fire the earliest pending alarm, advancing virtual time to its deadline.
    ///
    /// Returns `None` (without moving time) if no alarm is pending.
    pub fn next(&self) -> Option<Fired<V>> {
        self.fire(None)
    }

    /// Fire the earliest pending alarm if it is due at or before `until`.
    ///
    /// If no such alarm exists, virtual time advances to `until` (it never moves backwards) and
    /// `None` is returned.
    pub fn next_until(&self, until: SystemTime) -> Option<Fired<V>> {
        self.fire(Some(until))
    }

    fn fire(&self, until: Option<SystemTime>) -> Option<Fired<V>> {
        let mut state = self.runtime.state.lock().unwrap();
        while let Some(entry) = state.heap.peek().copied() {
            // Skip alarms that were cancelled after being armed
            if !state.pending.contains_key(&entry.alarm) {
                state.heap.pop();
                continue;
            }
            if until.is_some_and(|until| entry.deadline > until) {
                break;
            }
            state.heap.pop();
            let Some(pending) = state.pending.remove(&entry.alarm) else {
                continue;
            };
            self.advance(&mut state, pending.deadline);
            self.runtime.metrics.alarms_fired.inc();
            self.runtime.metrics.alarms_pending.dec();
            self.runtime
                .auditor
                .fire(pending.deadline, entry.alarm, &pending.label);
            trace!(
                alarm = entry.alarm.id(),
                label = %pending.label,
                now = ?pending.deadline.epoch(),
                "alarm fired"
            );
            return Some(Fired {
                alarm: entry.alarm,
                at: pending.deadline,
                event: pending.event,
            });
        }
        if let Some(until) = until {
            self.advance(&mut state, until);
        }
        None
    }

    fn advance(&self, state: &mut State<V>, to: SystemTime) {
        if to <= state.time {
            return;
        }
        if let Some(deadline) = self.runtime.deadline {
            if to > deadline {
                panic!("runtime timeout");
            }
        }
        state.time = to;
    }
}

/// Implementation of [crate::Clock], [crate::Timer], and [crate::Metrics] for the
/// `deterministic` runtime.
pub struct Context<V> {
    label: String,
    runtime: Arc<Runtime<V>>,
}

impl<V> Clone for Context<V> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<V: Send + 'static> Clock for Context<V> {
    fn current(&self) -> SystemTime {
        self.runtime.state.lock().unwrap().time
    }
}

impl<V: Send + 'static> Timer for Context<V> {
    type Event = V;

    fn schedule(&self, delay: Duration, event: V) -> Alarm {
        let mut state = self.runtime.state.lock().unwrap();
        let deadline = state.time.saturating_add(delay);
        let alarm = Alarm::new(state.next_alarm);
        state.next_alarm = state
            .next_alarm
            .checked_add(1)
            .expect("alarm counter overflow");
        state.heap.push(Entry { deadline, alarm });
        state.pending.insert(
            alarm,
            Pending {
                deadline,
                label: self.label.clone(),
                event,
            },
        );
        self.runtime.metrics.alarms_scheduled.inc();
        self.runtime.metrics.alarms_pending.inc();
        trace!(
            alarm = alarm.id(),
            label = %self.label,
            ?delay,
            "alarm scheduled"
        );
        alarm
    }

    fn cancel(&self, alarm: Alarm) -> bool {
        let mut state = self.runtime.state.lock().unwrap();
        if state.pending.remove(&alarm).is_none() {
            return false;
        }
        self.runtime.metrics.alarms_cancelled.inc();
        self.runtime.metrics.alarms_pending.dec();
        trace!(alarm = alarm.id(), label = %self.label, "alarm cancelled");
        true
    }

    fn deadline(&self, alarm: Alarm) -> Option<SystemTime> {
        let state = self.runtime.state.lock().unwrap();
        state.pending.get(&alarm).map(|pending| pending.deadline)
    }
}

impl<V: Send + 'static> crate::Metrics for Context<V> {
    fn with_label(&self, label: &str) -> Self {
        let label = {
            let prefix = self.label.clone();
            if prefix.is_empty() {
                label.to_string()
            } else {
                format!("{}_{}", prefix, label)
            }
        };
        assert!(
            !label.starts_with(METRICS_PREFIX),
            "using runtime label is not allowed"
        );
        Self {
            label,
            runtime: self.runtime.clone(),
        }
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn register<N: Into<String>, H: Into<String>>(&self, name: N, help: H, metric: impl Metric) {
        // Prepare args
        let name = name.into();
        let help = help.into();

        // Register metric
        let prefixed_name = {
            let prefix = &self.label;
            if prefix.is_empty() {
                name
            } else {
                format!("{}_{}", *prefix, name)
            }
        };
        self.runtime
            .registry
            .lock()
            .unwrap()
            .register(prefixed_name, help, metric)
    }

    fn encode(&self) -> Result<String, Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.runtime.registry.lock().unwrap())?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Metrics as _;
    use commonware_macros::test_traced;

    fn at(nanos: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(nanos)
    }

    #[test_traced]
    fn test_fires_in_deadline_order() {
        let (executor, context) = Executor::init(Config::default());
        context.schedule(Duration::from_nanos(30), "c");
        context.schedule(Duration::from_nanos(10), "a");
        context.schedule(Duration::from_nanos(20), "b");

        let mut order = Vec::new();
        while let Some(fired) = executor.next() {
            assert_eq!(fired.at, context.current());
            order.push((fired.event, fired.at));
        }
        assert_eq!(order, vec![("a", at(10)), ("b", at(20)), ("c", at(30))]);
        assert_eq!(executor.pending(), 0);
    }

    #[test_traced]
    fn test_ties_fire_in_arming_order() {
        let (executor, context) = Executor::init(Config::default());
        for i in 0..5 {
            context.schedule(Duration::from_nanos(7), i);
        }
        let order: Vec<_> = std::iter::from_fn(|| executor.next())
            .map(|fired| fired.event)
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test_traced]
    fn test_cancelled_alarm_never_fires() {
        let (executor, context) = Executor::init(Config::default());
        let first = context.schedule(Duration::from_nanos(10), 1);
        let second = context.schedule(Duration::from_nanos(20), 2);
        assert!(context.cancel(first));
        assert_eq!(context.deadline(first), None);
        assert_eq!(context.deadline(second), Some(at(20)));

        let fired = executor.next().unwrap();
        assert_eq!(fired.alarm, second);
        assert_eq!(fired.event, 2);
        assert!(executor.next().is_none());
    }

    #[test_traced]
    fn test_cancel_is_idempotent() {
        let (executor, context) = Executor::init(Config::default());
        let alarm = context.schedule(Duration::from_nanos(10), ());
        assert!(context.cancel(alarm));
        assert!(!context.cancel(alarm));

        // Cancelling a fired alarm is a no-op
        let alarm = context.schedule(Duration::from_nanos(10), ());
        assert_eq!(executor.next().unwrap().alarm, alarm);
        assert!(!context.cancel(alarm));
        assert_eq!(executor.pending(), 0);
    }

    #[test_traced]
    fn test_unbounded_delay_stays_armed() {
        let (executor, context) = Executor::init(Config::default());
        let far = context.schedule(Duration::MAX, "far");
        context.schedule(Duration::from_nanos(10), "near");

        let deadline = context.deadline(far).unwrap();
        assert!(deadline > at(u64::MAX));
        assert_eq!(executor.next_until(at(1_000)).unwrap().event, "near");
        assert!(executor.next_until(at(1_000)).is_none());
        assert_eq!(executor.pending(), 1);
        assert!(context.cancel(far));
    }

    #[test_traced]
    fn test_next_until_advances_time() {
        let (executor, context) = Executor::init(Config::default());
        context.schedule(Duration::from_nanos(80), "late");

        // Nothing due yet, so time jumps to the requested point
        assert!(executor.next_until(at(30)).is_none());
        assert_eq!(context.current(), at(30));
        assert_eq!(executor.now(), at(30));

        // Time never moves backwards
        assert!(executor.next_until(at(10)).is_none());
        assert_eq!(context.current(), at(30));

        // Alarms are relative to the current time
        context.schedule(Duration::from_nanos(5), "early");
        assert_eq!(executor.next_until(at(100)).unwrap().event, "early");
        assert_eq!(context.current(), at(35));
        assert_eq!(executor.next_until(at(100)).unwrap().event, "late");
        assert_eq!(context.current(), at(80));
        assert!(executor.next_until(at(100)).is_none());
        assert_eq!(context.current(), at(100));
    }

    #[test]
    #[should_panic(expected = "runtime timeout")]
    fn test_timeout() {
        let (executor, context) = Executor::timed(Duration::from_secs(10));
        loop {
            context.schedule(Duration::from_secs(1), ());
            executor.next();
        }
    }

    #[test_traced]
    fn test_determinism() {
        fn run() -> String {
            let (executor, context) = Executor::init(Config::default());
            let context = crate::Metrics::with_label(&context, "flow");
            for i in 0..10u64 {
                let alarm = context.schedule(Duration::from_nanos(100 - i * 7), i);
                if i % 3 == 0 {
                    context.cancel(alarm);
                }
            }
            while executor.next().is_some() {}
            executor.auditor().state()
        }
        assert_eq!(run(), run());
    }

    #[test_traced]
    fn test_auditor_tracks_firing_order() {
        let (executor, context) = Executor::init(Config::default());
        context.schedule(Duration::from_nanos(1), ());
        let empty = executor.auditor().state();
        executor.next();
        assert_ne!(executor.auditor().state(), empty);
    }

    #[test_traced]
    fn test_metrics() {
        let (executor, context) = Executor::<()>::init(Config::default());
        let alarm = context.schedule(Duration::from_nanos(5), ());
        context.schedule(Duration::from_nanos(10), ());
        context.cancel(alarm);
        executor.next();

        let scoped = context.with_label("voq");
        let counter = Counter::<u64>::default();
        scoped.register("flushes", "Number of flushes", counter.clone());
        counter.inc();
        assert_eq!(scoped.scoped_label("inner"), "voq_inner");

        let encoded = context.encode().unwrap();
        assert!(encoded.contains("runtime_alarms_scheduled_total 2"));
        assert!(encoded.contains("runtime_alarms_cancelled_total 1"));
        assert!(encoded.contains("runtime_alarms_fired_total 1"));
        assert!(encoded.contains("runtime_alarms_pending 0"));
        assert!(encoded.contains("voq_flushes_total 1"));
    }

    #[test]
    #[should_panic(expected = "using runtime label is not allowed")]
    fn test_reserved_label() {
        let (_, context) = Executor::<()>::init(Config::default());
        context.with_label(METRICS_PREFIX);
    }
}
