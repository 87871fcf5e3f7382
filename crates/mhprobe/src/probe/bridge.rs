//! Waiting for the next hop's reply.

use std::{sync::Arc, time::Duration};

use tokio::{sync::oneshot, time};
use tracing::{debug, warn};

use super::listener::Listener;
use crate::{
    protocol::{Outcome, ProbeError, ProbeMessage},
    transport::ReplyFilter,
};

/// Wait for the reply matching `filter` and report it to `listener`.
///
/// Exactly one outcome is delivered: the decoded reply, TIMEOUT once
/// `timeout` elapses, or DISCONNECTED if the transport closes the channel.
pub(crate) async fn await_reply(
    receiver: oneshot::Receiver<ProbeMessage>,
    filter: ReplyFilter,
    timeout: Duration,
    listener: Arc<dyn Listener>,
) {
    let outcome = match time::timeout(timeout, receiver).await {
        Ok(Ok(message)) => match Outcome::from_reply(message) {
            Some(outcome) => outcome,
            None => {
                warn!("Peer {} answered probe {} with a request", filter.peer, filter.uid);
                Outcome::local_error(ProbeError::Unknown)
            },
        },
        Ok(Err(_)) => {
            debug!("Peer {} disconnected while probe {} was pending", filter.peer, filter.uid);
            Outcome::local_error(ProbeError::Disconnected)
        },
        Err(_) => {
            debug!("Probe {} timed out after {:?} waiting on {}", filter.uid, timeout, filter.peer);
            Outcome::local_error(ProbeError::Timeout)
        },
    };

    listener.on_outcome(outcome);
}
