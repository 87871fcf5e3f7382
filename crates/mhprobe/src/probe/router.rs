//! Degree-corrected random walk.
//!
//! A plain random walk visits nodes in proportion to their degree. Accepting
//! a step from `self` to `candidate` with probability
//! `min(1, degree(self) / degree(candidate))` makes the walk's stationary
//! distribution uniform over nodes instead.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use libp2p::PeerId;
use rand::{seq::SliceRandom, Rng, RngCore};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::htl::probabilistic_decrement;
use crate::{
    config::ProbeConfig,
    protocol::{ProbeError, ProbeMessage, ProbeRequest},
    transport::{PeerInfo, ReplyFilter, Transport},
};

/// A request handed to the next hop, with its reply still outstanding.
#[derive(Debug)]
pub(crate) struct PendingReply {
    pub(crate) peer: PeerId,
    pub(crate) filter: ReplyFilter,
    pub(crate) timeout: Duration,
    pub(crate) receiver: oneshot::Receiver<ProbeMessage>,
}

#[derive(Debug)]
pub(crate) enum Route {
    Forwarded(PendingReply),
    /// The hop budget ran out during the walk; answer locally
    Local,
    Failed(ProbeError),
}

/// Chance of accepting a step to `candidate` from a node with `own_degree`
/// connected peers.
///
/// Candidates that do not advertise a degree are always accepted, which
/// degrades to an uncorrected walk for them.
pub fn acceptance_probability(own_degree: usize, candidate: &PeerInfo) -> f64 {
    if candidate.degree == 0 {
        return 1.0;
    }
    (own_degree as f64 / f64::from(candidate.degree)).min(1.0)
}

/// Try to hand `request` to a randomly chosen peer.
///
/// `request.htl` has already been decremented for this hop. Every rejected
/// candidate consumes another probabilistic decrement.
///
/// `rng` is only locked while drawing, never across transport calls.
pub(crate) fn route<R: RngCore>(
    transport: &dyn Transport,
    config: &ProbeConfig,
    rng: &Mutex<R>,
    request: ProbeRequest,
) -> Route {
    let mut htl = request.htl;

    for attempt in 1..=config.max_send_attempts {
        let peers = transport.connected_peers();
        let Some(candidate) = peers.choose(&mut *lock(rng)) else {
            debug!("No connected peers to route probe {}", request.uid);
            return Route::Failed(ProbeError::Disconnected);
        };

        if !transport.is_connected(&candidate.id) {
            trace!("Candidate {} for probe {} is gone, attempt {}", candidate.id, request.uid, attempt);
            continue;
        }

        let probability = acceptance_probability(peers.len(), candidate);
        let accepted = lock(rng).gen::<f64>() < probability;
        if accepted {
            let forwarded = ProbeRequest::new(request.uid, htl, request.probe_type);
            let filter = ReplyFilter::new(candidate.id, request.uid, request.probe_type);

            // Registered before sending so a fast reply cannot slip past.
            let receiver = match transport.register_reply_filter(filter.clone()) {
                Ok(receiver) => receiver,
                Err(e) => {
                    debug!("Could not await {} for probe {}: {}", candidate.id, request.uid, e);
                    continue;
                },
            };

            match transport.send(&candidate.id, forwarded.to_message()) {
                Ok(()) => {
                    debug!("Forwarded probe {} to {} with htl {}", request.uid, candidate.id, htl);
                    return Route::Forwarded(PendingReply {
                        peer: candidate.id,
                        filter,
                        timeout: config.reply_timeout(htl),
                        receiver,
                    });
                },
                Err(e) => {
                    debug!("Sending probe {} to {} failed: {}", request.uid, candidate.id, e);
                    continue;
                },
            }
        }

        htl = probabilistic_decrement(htl, config.decrement_probability, &mut *lock(rng));
        if htl == 0 {
            return Route::Local;
        }
    }

    warn!(
        "Could not forward probe {} after {} attempts, htl {}",
        request.uid, config.max_send_attempts, htl
    );
    Route::Failed(ProbeError::CannotForward)
}

fn lock<R>(rng: &Mutex<R>) -> MutexGuard<'_, R> {
    rng.lock().unwrap_or_else(PoisonError::into_inner)
}
