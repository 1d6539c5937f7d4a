//! Mock implementations of the collaborators of a [`Voq`](crate::Voq).

use crate::{Controller, FlowKey, Sink};
use bytes::Bytes;
use std::sync::{Arc, Mutex};

/// Packet carrying its flow, a sequence number and an opaque payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub flow: FlowKey,
    pub seq: u64,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(flow: FlowKey, seq: u64, payload: &[u8]) -> Self {
        Self {
            flow,
            seq,
            payload: Bytes::copy_from_slice(payload),
        }
    }
}

/// Header parsed from a [Packet].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub flow: FlowKey,
    pub seq: u64,
    pub len: usize,
}

impl crate::Packet for Packet {
    type Header = Header;

    fn header(&self) -> Header {
        Header {
            flow: self.flow,
            seq: self.seq,
            len: self.payload.len(),
        }
    }
}

/// Callback observed by a [Recorder].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Flushed { flow: FlowKey, count: usize },
    Sent { header: Header, packet: Packet },
    Deleted { flow: FlowKey },
}

/// [Controller] and [Sink] that records every callback in a single log.
///
/// Clones share the log, so using clones of the same recorder as controller and sink preserves
/// the relative order of all callbacks.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    /// Returns every callback observed so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Returns the sequence numbers of sent packets, in delivery order.
    pub fn sent(&self) -> Vec<u64> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::Sent { packet, .. } => Some(packet.seq),
                _ => None,
            })
            .collect()
    }

    /// Returns the flows deleted so far, in order.
    pub fn deletions(&self) -> Vec<FlowKey> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::Deleted { flow } => Some(*flow),
                _ => None,
            })
            .collect()
    }
}

impl Controller for Recorder {
    fn flushed(&mut self, flow: FlowKey, count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Flushed { flow, count });
    }

    fn deleted(&mut self, flow: FlowKey) {
        self.events.lock().unwrap().push(Event::Deleted { flow });
    }
}

impl Sink<Packet> for Recorder {
    fn send(&mut self, packet: Packet, header: Header) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Sent { header, packet });
    }
}
