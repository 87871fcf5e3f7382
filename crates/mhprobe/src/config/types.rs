//! Probe configuration types.
//!
//! This module defines the protocol tunables used by a probe node.

use std::time::Duration;

use crate::{
    ADMISSION_WINDOW, DECREMENT_PROBABILITY, LOCAL_LIMIT, MAX_HTL, MAX_SEND_ATTEMPTS, PEER_LIMIT,
    TIMEOUT_PER_HTL, WAIT_BASE, WAIT_MAX,
};

/// Protocol tunables for a probe node
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Incoming HTL values above this are clamped
    pub max_htl: u8,

    /// Forwarding attempts before failing with CANNOT_FORWARD
    pub max_send_attempts: usize,

    /// Chance of decrementing at HTL 1
    pub decrement_probability: f32,

    /// Reply timeout added per HTL above 1
    pub timeout_per_htl: Duration,

    /// Concurrently accepted probes per peer
    pub peer_limit: usize,

    /// Concurrently accepted probes started by this node
    pub local_limit: usize,

    /// How long an accepted probe holds its slot
    pub admission_window: Duration,

    /// Scale of the local response delay
    pub wait_base: Duration,

    /// Local response delays are resampled until below this
    pub wait_max: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_htl: MAX_HTL,
            max_send_attempts: MAX_SEND_ATTEMPTS,
            decrement_probability: DECREMENT_PROBABILITY,
            timeout_per_htl: TIMEOUT_PER_HTL,
            peer_limit: PEER_LIMIT,
            local_limit: LOCAL_LIMIT,
            admission_window: ADMISSION_WINDOW,
            wait_base: WAIT_BASE,
            wait_max: WAIT_MAX,
        }
    }
}

impl ProbeConfig {
    /// Create a new configuration builder
    pub fn builder() -> ProbeConfigBuilder {
        ProbeConfigBuilder::default()
    }
}

/// Builder for ProbeConfig
#[derive(Default)]
pub struct ProbeConfigBuilder {
    pub(crate) config: ProbeConfig,
}
