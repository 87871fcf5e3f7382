//! Receivers of probe outcomes.
//!
//! Every probe attempt at every hop ends in exactly one call to
//! [`Listener::on_outcome`]. For a locally started probe the listener is the
//! caller's; for a relayed probe it sends the outcome back to the peer the
//! request came from.

use std::sync::{Arc, Mutex, PoisonError};

use libp2p::PeerId;
use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    protocol::{Outcome, ProbeMessage},
    transport::Transport,
};

/// Receives the single terminal outcome of one probe attempt.
pub trait Listener: Send + Sync {
    fn on_outcome(&self, outcome: Outcome);
}

impl<F> Listener for F
where
    F: Fn(Outcome) + Send + Sync,
{
    fn on_outcome(&self, outcome: Outcome) {
        self(outcome)
    }
}

/// Hands the outcome of a locally started probe to a [`ProbeHandle`].
pub(crate) struct LocalSink {
    sender: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl LocalSink {
    pub(crate) fn channel() -> (Self, ProbeHandle) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender: Mutex::new(Some(sender)) }, ProbeHandle { receiver })
    }
}

impl Listener for LocalSink {
    fn on_outcome(&self, outcome: Outcome) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(sender) => {
                if sender.send(outcome).is_err() {
                    debug!("Probe handle dropped before the outcome arrived");
                }
            },
            None => debug!("Ignoring second outcome for a local probe: {}", outcome),
        }
    }
}

/// Awaitable outcome of a probe started with [`crate::Probe::start`].
#[derive(Debug)]
pub struct ProbeHandle {
    receiver: oneshot::Receiver<Outcome>,
}

impl ProbeHandle {
    /// Wait for the outcome.
    ///
    /// Returns `None` only if the node was torn down before the probe
    /// finished.
    pub async fn outcome(self) -> Option<Outcome> {
        self.receiver.await.ok()
    }
}

/// Sends the outcome of a relayed probe back to the peer it came from.
pub(crate) struct RelaySink {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) source: PeerId,
    pub(crate) uid: u64,
}

impl Listener for RelaySink {
    fn on_outcome(&self, outcome: Outcome) {
        if !self.transport.is_connected(&self.source) {
            debug!("Peer {} disconnected before probe {} could be answered", self.source, self.uid);
            return;
        }
        let message = ProbeMessage::from_outcome(self.uid, &outcome);
        if let Err(e) = self.transport.send(&self.source, message) {
            debug!("Failed to relay {} for probe {} to {}: {}", outcome, self.uid, self.source, e);
        }
    }
}
