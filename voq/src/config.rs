use crate::FlowKey;
use std::{net::Ipv4Addr, time::Duration};

/// Reschedule delay that routing layers historically used to request an estimate-error probe
/// instead of a real reschedule.
pub const LEGACY_PROBE_DELAY: Duration = Duration::from_nanos(1);

/// Configuration for a [`Voq`](super::Voq).
#[derive(Clone, Debug)]
pub struct Config {
    /// Flow whose packets are buffered.
    pub flow: FlowKey,

    /// Destination of the flow.
    pub destination: Ipv4Addr,

    /// Initial estimate of when the flow can be released, relative to creation.
    pub time_to_flush: Duration,

    /// Slack the routing layer added on top of its raw estimate.
    ///
    /// This does not change when the queue is flushed. It is subtracted from every
    /// estimate-error sample so that samples describe the raw estimate.
    pub extra_flush_margin: Duration,

    /// If set, rescheduling with exactly this delay while an alarm is pending also records an
    /// estimate-error sample (as [`Voq::record_estimate_error`](super::Voq::record_estimate_error)
    /// does) before the alarm is rearmed.
    ///
    /// Use [LEGACY_PROBE_DELAY] to interoperate with routing layers that signal probes this way.
    /// Leave unset when a genuine reschedule of that length is possible.
    pub probe_delay: Option<Duration>,
}
