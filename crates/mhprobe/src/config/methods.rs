//! Probe configuration methods.
//!
//! Derived timing values and the builder setters.

use std::time::Duration;

use super::types::{ProbeConfig, ProbeConfigBuilder};

impl ProbeConfig {
    /// Extra reply time granted at HTL 1, where the next hop may keep the
    /// probe for several rounds before its probabilistic decrement fires.
    pub fn timeout_htl1(&self) -> Duration {
        let millis = self.timeout_per_htl.as_millis() as f32 / self.decrement_probability;
        Duration::from_millis(millis.round() as u64)
    }

    /// How long to wait for a reply after forwarding with `htl` hops left.
    ///
    /// Always positive and growing with `htl`.
    pub fn reply_timeout(&self, htl: u8) -> Duration {
        self.timeout_per_htl * u32::from(htl.saturating_sub(1)) + self.timeout_htl1()
    }
}

impl ProbeConfigBuilder {
    /// Build the configuration
    pub fn build(self) -> ProbeConfig {
        self.config
    }

    /// Set the HTL clamp
    pub fn max_htl(mut self, max_htl: u8) -> Self {
        self.config.max_htl = max_htl;
        self
    }

    /// Set the forwarding attempt limit
    pub fn max_send_attempts(mut self, attempts: usize) -> Self {
        self.config.max_send_attempts = attempts;
        self
    }

    /// Set the decrement probability at HTL 1
    pub fn decrement_probability(mut self, probability: f32) -> Self {
        self.config.decrement_probability = probability;
        self
    }

    /// Set the per-HTL reply timeout
    pub fn timeout_per_htl(mut self, timeout: Duration) -> Self {
        self.config.timeout_per_htl = timeout;
        self
    }

    /// Set the per-peer admission ceiling
    pub fn peer_limit(mut self, limit: usize) -> Self {
        self.config.peer_limit = limit;
        self
    }

    /// Set the local admission ceiling
    pub fn local_limit(mut self, limit: usize) -> Self {
        self.config.local_limit = limit;
        self
    }

    /// Set the admission window
    pub fn admission_window(mut self, window: Duration) -> Self {
        self.config.admission_window = window;
        self
    }

    /// Set the local response delay bounds
    pub fn response_delay(mut self, base: Duration, max: Duration) -> Self {
        self.config.wait_base = base;
        self.config.wait_max = max;
        self
    }
}
