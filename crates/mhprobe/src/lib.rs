//! mhprobe - Metropolis-Hastings corrected network probes
//!
//! This library lets a node ask what a randomly chosen node of a peer-to-peer
//! overlay reports for some statistic, without enumerating the overlay and
//! without any single answer being attributable to an identifiable node.
//! Requests take a degree-corrected random walk, the endpoint answers with a
//! deliberately noised value, and the answer travels back along the reverse
//! path.

pub mod admission;
pub mod config;
pub mod error;
pub mod probe;
pub mod protocol;
pub mod settings;
pub mod transport;

use std::time::Duration;

// Re-export main types
pub use config::{ProbeConfig, ProbeConfigBuilder};
pub use error::{Error, Result};
pub use probe::{Listener, NodeStats, Probe, ProbeBuilder, ProbeHandle, StaticStats, WeakProbe};
pub use protocol::{Outcome, ProbeError, ProbeMessage, ProbeRequest, ProbeType, ProbeValue};
pub use settings::{ProbeSettings, SharedSettings};
pub use transport::{PeerInfo, ReplyFilter, Transport, TransportError};

/// Re-exported so transports and callers share the same peer identity type.
pub use libp2p::PeerId;

/// Maximum hops to live; larger incoming values are clamped to this.
pub const MAX_HTL: u8 = 70;

/// Forwarding attempts per hop before giving up with CANNOT_FORWARD.
pub const MAX_SEND_ATTEMPTS: usize = 50;

/// Probability of decrementing HTL when it is 1.
pub const DECREMENT_PROBABILITY: f32 = 0.2;

/// Reply timeout per HTL above 1.
pub const TIMEOUT_PER_HTL: Duration = Duration::from_millis(3000);

/// Probes accepted from a single peer within one admission window.
pub const PEER_LIMIT: usize = 10;

/// Peer count the local admission ceiling is scaled by.
pub const TYPICAL_MAX_PEERS: usize = 40;

/// Probes the local node may start within one admission window.
pub const LOCAL_LIMIT: usize = PEER_LIMIT * TYPICAL_MAX_PEERS;

/// How long an accepted probe occupies its admission slot.
pub const ADMISSION_WINDOW: Duration = Duration::from_secs(60);

/// Scale of the exponential delay applied before sending a local response.
pub const WAIT_BASE: Duration = Duration::from_millis(1000);

/// Upper bound on the delay before sending a local response.
pub const WAIT_MAX: Duration = Duration::from_millis(2000);
