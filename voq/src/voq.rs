use crate::{Config, Controller, FlowKey, Metrics, Packet, Sink};
use reorder_runtime::{Alarm, SystemTimeExt, Timer};
use std::{
    collections::VecDeque,
    net::Ipv4Addr,
    time::{Duration, SystemTime},
};
use tracing::{debug, trace};

/// Event armed on the [Timer] by a [Voq].
///
/// Whoever drives the timer must route it, along with the [Alarm] that fired, to
/// [Voq::enforce_flush_all] on the queue of `flow`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Flush {
    pub flow: FlowKey,
}

/// State of the flush alarm of a [Voq].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushTimer {
    /// No alarm was armed yet.
    Idle,
    /// The alarm will fire unless rescheduled or cancelled.
    Pending(Alarm),
    /// The alarm fired and forced a flush.
    Fired(Alarm),
    /// The alarm was cancelled by an external flush.
    Cancelled(Alarm),
}

/// Per-flow queue that holds packets until they can be released in order.
pub struct Voq<E, P, C, S>
where
    E: Timer,
    E::Event: From<Flush>,
    P: Packet,
    C: Controller,
    S: Sink<P>,
{
    context: E,
    flow: FlowKey,
    destination: Ipv4Addr,
    extra_flush_margin: Duration,
    probe_delay: Option<Duration>,
    created: SystemTime,

    buffer: VecDeque<P>,
    timer: FlushTimer,
    flushed: bool,

    metrics: Metrics,
    controller: C,
    sink: S,
}

impl<E, P, C, S> Voq<E, P, C, S>
where
    E: Timer,
    E::Event: From<Flush>,
    P: Packet,
    C: Controller,
    S: Sink<P>,
{
    /// Create an empty queue for `cfg.flow` and arm its first flush alarm `cfg.time_to_flush`
    /// from now.
    ///
    /// A delay too large to represent leaves the alarm armed at the latest representable time.
    pub fn new(context: E, cfg: Config, metrics: Metrics, controller: C, sink: S) -> Self {
        let created = context.current();
        let mut voq = Self {
            context,
            flow: cfg.flow,
            destination: cfg.destination,
            extra_flush_margin: cfg.extra_flush_margin,
            probe_delay: cfg.probe_delay,
            created,
            buffer: VecDeque::new(),
            timer: FlushTimer::Idle,
            flushed: false,
            metrics,
            controller,
            sink,
        };
        voq.reschedule_flush(cfg.time_to_flush);
        debug!(
            flow = voq.flow,
            destination = %voq.destination,
            time_to_flush = ?cfg.time_to_flush,
            "created voq"
        );
        voq
    }

    /// Append a packet to the tail of the queue.
    ///
    /// # Panics
    ///
    /// Panics if the queue was already flushed.
    pub fn enqueue(&mut self, packet: P) {
        assert!(!self.flushed, "enqueue after flush");
        self.buffer.push_back(packet);
    }

    /// Replace the pending flush alarm with one that fires `delay` from now.
    ///
    /// If `delay` matches [Config::probe_delay] and an alarm is pending, an estimate-error sample
    /// is recorded against the old alarm first. A `delay` too large to represent saturates.
    ///
    /// # Panics
    ///
    /// Panics if the queue was already flushed.
    pub fn reschedule_flush(&mut self, delay: Duration) {
        assert!(!self.flushed, "reschedule after flush");
        if let FlushTimer::Pending(alarm) = self.timer {
            if self.probe_delay == Some(delay) {
                self.record_estimate_error();
            }
            self.context.cancel(alarm);
        }
        let alarm = self
            .context
            .schedule(delay, Flush { flow: self.flow }.into());
        self.timer = FlushTimer::Pending(alarm);
        trace!(flow = self.flow, alarm = alarm.id(), ?delay, "rescheduled flush");
    }

    /// Record how far the pending alarm is from now, less the configured margin, without
    /// touching the alarm.
    ///
    /// Returns the recorded sample (in nanoseconds), or `None` if no alarm is pending.
    pub fn record_estimate_error(&self) -> Option<i64> {
        let FlushTimer::Pending(alarm) = self.timer else {
            return None;
        };
        let deadline = self.context.deadline(alarm)?;
        let margin = i64::try_from(self.extra_flush_margin.as_nanos()).unwrap_or(i64::MAX);
        let sample = self
            .context
            .current()
            .nanos_until(deadline)
            .saturating_sub(margin);
        self.metrics.probe(sample);
        debug!(flow = self.flow, sample, "recorded estimate error");
        Some(sample)
    }

    /// Flush the queue because `alarm` fired.
    ///
    /// Ignored unless `alarm` is the pending alarm of this queue (it was replaced by a reschedule,
    /// or the queue was flushed by other means).
    pub fn enforce_flush_all(&mut self, alarm: Alarm) {
        if self.timer != FlushTimer::Pending(alarm) {
            debug!(
                flow = self.flow,
                alarm = alarm.id(),
                timer = ?self.timer,
                "ignoring stale flush"
            );
            return;
        }
        self.timer = FlushTimer::Fired(alarm);
        self.metrics.forced.inc();

        // The alarm already fired, so this only clears any state the timer kept for it
        self.context.cancel(alarm);
        debug!(flow = self.flow, size = self.buffer.len(), "flush enforced by timeout");
        self.flush_all_immediately();
    }

    /// Release every buffered packet, in arrival order, then ask the controller to delete the
    /// queue.
    ///
    /// A pending alarm is cancelled. Calling this more than once has no effect.
    pub fn flush_all_immediately(&mut self) {
        if self.flushed {
            debug!(flow = self.flow, "already flushed");
            return;
        }
        self.flushed = true;
        if let FlushTimer::Pending(alarm) = self.timer {
            self.context.cancel(alarm);
            self.timer = FlushTimer::Cancelled(alarm);
        }

        // Notify before releasing anything
        let count = self.buffer.len();
        self.controller.flushed(self.flow, count);
        while let Some(packet) = self.buffer.pop_front() {
            let header = packet.header();
            self.sink.send(packet, header);
        }
        self.controller.deleted(self.flow);

        self.metrics
            .flush(count, self.created, self.context.current());
        debug!(flow = self.flow, count, "flushed voq");
    }

    /// Returns whether the queue holds no packet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the number of packets held.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the flow of the queue.
    pub fn flow(&self) -> FlowKey {
        self.flow
    }

    /// Returns the destination of the flow.
    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    /// Returns the state of the flush alarm.
    pub fn timer(&self) -> FlushTimer {
        self.timer
    }

    /// Returns when the flush alarm will fire, if it is pending.
    pub fn deadline(&self) -> Option<SystemTime> {
        match self.timer {
            FlushTimer::Pending(alarm) => self.context.deadline(alarm),
            _ => None,
        }
    }

    /// Returns whether the queue was flushed.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }
}
