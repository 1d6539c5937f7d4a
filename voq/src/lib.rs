//! Hold out-of-order packets of a rerouted flow until they can be released in order.
//!
//! # Overview
//!
//! When a load balancer moves a flow onto a path with lower latency, packets sent on the new
//! path can overtake packets still in flight on the old one. The destination-side switch parks
//! the early arrivals in a per-flow [Voq] (Virtual Output Queue) and releases them in a single
//! in-order burst once the old path has drained.
//!
//! The [Voq] does not decide when a flow is at risk or how long the risk lasts. Its owner (the
//! routing layer, represented here by the [Controller] trait) creates it with an initial flush
//! estimate and refines that estimate with [Voq::reschedule_flush] as more information arrives.
//! If no tighter estimate arrives in time, the flush alarm fires and the queue is drained anyway.
//!
//! # Timing
//!
//! Each [Voq] keeps at most one pending alarm on a [reorder_runtime::Timer]. When it fires, the
//! runtime hands back a [Flush] event and its alarm, which the owner routes to
//! [Voq::enforce_flush_all]. Any
//! reschedule cancels the previous alarm before arming the next one.
//!
//! To measure how accurate the routing layer's estimates are, the [Voq] can record the signed
//! difference between the deadline it was about to fire at and the moment the routing layer
//! learned the real answer (less a configured margin). Samples accumulate in a [History] shared
//! by every queue in the simulation.
//!
//! # Status
//!
//! `reorder-voq` is **ALPHA** software and is not yet recommended for production use. Developers
//! should expect breaking changes and occasional instability.

use thiserror::Error;

mod config;
pub use config::{Config, LEGACY_PROBE_DELAY};
mod history;
pub use history::{Cdf, History, Point};
mod metrics;
pub use metrics::Metrics;
mod occupancy;
pub use occupancy::Occupancy;
pub mod mocks;
mod voq;
pub use voq::{Flush, FlushTimer, Voq};

/// Identifier of a flow (typically a hash of its 5-tuple).
pub type FlowKey = u64;

/// Errors that can occur when exporting diagnostics.
#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A packet that can be buffered in a [Voq].
pub trait Packet {
    /// Parsed header handed to the [Sink] alongside the packet.
    type Header;

    /// Peek at the header of the packet without consuming it.
    fn header(&self) -> Self::Header;
}

/// Interface used by a [Voq] to notify the routing layer that owns it.
pub trait Controller {
    /// Called once, before any buffered packet is released, with the number of packets about to
    /// be released.
    ///
    /// After this call, the routing layer should stop treating new arrivals of `flow` as at risk
    /// of reordering.
    fn flushed(&mut self, flow: FlowKey, count: usize);

    /// Called once, after the last buffered packet was released.
    ///
    /// The routing layer should drop the [Voq] from its registry. It is never used again.
    fn deleted(&mut self, flow: FlowKey);
}

/// Interface used by a [Voq] to deliver released packets downstream.
pub trait Sink<P: Packet> {
    /// Deliver a released packet.
    ///
    /// Delivery failures are the concern of the sink and are not reported back.
    fn send(&mut self, packet: P, header: P::Header);
}
