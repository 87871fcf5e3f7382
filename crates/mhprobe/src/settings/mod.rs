//! Response settings shared by every probe handled on this node.
//!
//! Which statistics the node is willing to disclose, and the pseudonymous
//! identifier it answers IDENTIFIER probes with. Both may change at runtime
//! and are read once per response.

mod store;

use std::sync::{Arc, PoisonError, RwLock};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::protocol::ProbeType;

pub use store::ConfigError;

/// Identifier value reserved to mean "not chosen yet". Never used as a live
/// identifier.
pub const UNSET_IDENTIFIER: i64 = -1;

/// Pick a random identifier, never returning [`UNSET_IDENTIFIER`].
pub fn random_identifier<R: Rng + ?Sized>(rng: &mut R) -> i64 {
    loop {
        let identifier: i64 = rng.gen();
        if identifier != UNSET_IDENTIFIER {
            return identifier;
        }
    }
}

/// Whether to answer each probe type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseToggles {
    pub bandwidth: bool,
    pub build: bool,
    pub identifier: bool,
    pub link_lengths: bool,
    pub location: bool,
    pub store_size: bool,
    pub uptime_48h: bool,
    pub uptime_7d: bool,
}

impl Default for ResponseToggles {
    fn default() -> Self {
        Self {
            bandwidth: true,
            build: true,
            identifier: true,
            link_lengths: true,
            location: true,
            store_size: true,
            uptime_48h: true,
            uptime_7d: true,
        }
    }
}

impl ResponseToggles {
    pub fn enabled(&self, probe_type: ProbeType) -> bool {
        *self.toggle(probe_type)
    }

    pub fn set(&mut self, probe_type: ProbeType, enabled: bool) {
        *self.toggle_mut(probe_type) = enabled;
    }

    fn toggle(&self, probe_type: ProbeType) -> &bool {
        match probe_type {
            ProbeType::Bandwidth => &self.bandwidth,
            ProbeType::Build => &self.build,
            ProbeType::Identifier => &self.identifier,
            ProbeType::LinkLengths => &self.link_lengths,
            ProbeType::Location => &self.location,
            ProbeType::StoreSize => &self.store_size,
            ProbeType::Uptime48h => &self.uptime_48h,
            ProbeType::Uptime7d => &self.uptime_7d,
        }
    }

    fn toggle_mut(&mut self, probe_type: ProbeType) -> &mut bool {
        match probe_type {
            ProbeType::Bandwidth => &mut self.bandwidth,
            ProbeType::Build => &mut self.build,
            ProbeType::Identifier => &mut self.identifier,
            ProbeType::LinkLengths => &mut self.link_lengths,
            ProbeType::Location => &mut self.location,
            ProbeType::StoreSize => &mut self.store_size,
            ProbeType::Uptime48h => &mut self.uptime_48h,
            ProbeType::Uptime7d => &mut self.uptime_7d,
        }
    }
}

/// Persisted probe response settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Types this node answers
    #[serde(default)]
    pub respond: ResponseToggles,

    /// Pseudonymous identifier for IDENTIFIER probes
    #[serde(default = "unset_identifier")]
    pub identifier: i64,
}

fn unset_identifier() -> i64 {
    UNSET_IDENTIFIER
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self { respond: ResponseToggles::default(), identifier: UNSET_IDENTIFIER }
    }
}

impl ProbeSettings {
    /// Replace an unset identifier with a random one. Returns whether the
    /// settings changed.
    pub fn ensure_identifier<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if self.identifier == UNSET_IDENTIFIER {
            self.identifier = random_identifier(rng);
            true
        } else {
            false
        }
    }
}

/// Runtime handle on the node's response settings.
#[derive(Debug, Clone)]
pub struct SharedSettings {
    inner: Arc<RwLock<ProbeSettings>>,
}

impl SharedSettings {
    pub fn new(mut settings: ProbeSettings) -> Self {
        settings.ensure_identifier(&mut rand::thread_rng());
        Self { inner: Arc::new(RwLock::new(settings)) }
    }

    pub fn enabled(&self, probe_type: ProbeType) -> bool {
        self.read().respond.enabled(probe_type)
    }

    pub fn set_enabled(&self, probe_type: ProbeType, enabled: bool) {
        self.write().respond.set(probe_type, enabled);
    }

    pub fn identifier(&self) -> i64 {
        self.read().identifier
    }

    /// Set the identifier. Setting [`UNSET_IDENTIFIER`] picks a new random one.
    pub fn set_identifier(&self, identifier: i64) {
        let mut settings = self.write();
        settings.identifier = identifier;
        settings.ensure_identifier(&mut rand::thread_rng());
    }

    /// Copy of the current settings, e.g. for persisting.
    pub fn snapshot(&self) -> ProbeSettings {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ProbeSettings> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ProbeSettings> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self::new(ProbeSettings::default())
    }
}
