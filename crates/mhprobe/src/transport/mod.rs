//! Transport collaborator interface.
//!
//! Probes ride on an already-connected overlay. Connection management,
//! framing and encryption belong to the transport; the probe subsystem only
//! reads the connected peer set, sends messages and waits for replies.

pub mod memory;

use libp2p::PeerId;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::protocol::{MessageKind, ProbeMessage, ProbeType};

/// A connected peer as advertised to the probe subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerInfo {
    pub id: PeerId,

    /// Number of peers this peer reports being connected to; 0 if unknown
    pub degree: u32,

    /// Location of the peer in the overlay keyspace, in `[0.0, 1.0)`
    pub location: f64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer {0} is not connected")]
    NotConnected(PeerId),
    #[error("transport is shut down")]
    Closed,
}

/// Matches the single reply expected from one peer for one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFilter {
    pub peer: PeerId,
    pub uid: u64,
    /// Result kind answering the requested type. Refusals and errors always match as well.
    pub expected: MessageKind,
}

impl ReplyFilter {
    pub fn new(peer: PeerId, uid: u64, probe_type: ProbeType) -> Self {
        Self { peer, uid, expected: probe_type.response_kind() }
    }

    pub fn matches(&self, from: &PeerId, message: &ProbeMessage) -> bool {
        if *from != self.peer || message.uid() != self.uid {
            return false;
        }
        let kind = message.kind();
        kind == self.expected || kind == MessageKind::Refused || kind == MessageKind::Error
    }
}

/// What the probe subsystem needs from the peer-to-peer layer.
///
/// Implementations must not call back into the probe synchronously from
/// these methods; inbound messages are delivered separately. They are called
/// on the path of every probe and must not block: `send` queues and returns.
pub trait Transport: Send + Sync {
    /// Peers currently connected to this node
    fn connected_peers(&self) -> Vec<PeerInfo>;

    fn is_connected(&self, peer: &PeerId) -> bool;

    /// Queue `message` for `peer`. Fails if the peer is no longer connected.
    fn send(&self, peer: &PeerId, message: ProbeMessage) -> Result<(), TransportError>;

    /// Wait for the first message matching `filter`.
    ///
    /// The returned channel yields that message, or is closed without a value
    /// when the filtered peer disconnects. Dropping the receiver cancels the
    /// filter.
    fn register_reply_filter(
        &self,
        filter: ReplyFilter,
    ) -> Result<oneshot::Receiver<ProbeMessage>, TransportError>;
}
