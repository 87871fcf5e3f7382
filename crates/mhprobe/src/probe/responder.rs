//! Local responses.
//!
//! Values are measured locally and perturbed with multiplicative Gaussian
//! noise so that an answer narrows a node down to a range of common values
//! rather than an exact one. Each sigma is chosen so that one standard
//! deviation covers at least one step a person would plausibly configure.

use std::sync::Arc;

use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};

use crate::{
    protocol::{Outcome, ProbeType, ProbeValue},
    settings::SharedSettings,
    transport::PeerInfo,
};

/// Bandwidth limits sit around 20 KiB/s and are set in 1 KiB/s steps.
pub const BANDWIDTH_SIGMA: f64 = 0.05;
/// Weekly uptime around 20% (~40 h) with whole-percent quantization.
pub const IDENTIFIER_UPTIME_SIGMA: f64 = 0.05;
/// A 0.002 change on a typical 0.2 link length.
pub const LINK_LENGTH_SIGMA: f64 = 0.01;
/// Stores sit around 20 GiB and are sized in 1 GiB steps.
pub const STORE_SIZE_SIGMA: f64 = 0.05;
/// Half an hour in 48 hours, against ~25% uptime.
pub const UPTIME_48H_SIGMA: f64 = 0.04;
/// One hour in 168 hours, against ~20% uptime.
pub const UPTIME_7D_SIGMA: f64 = 0.03;

const KIB: f64 = (1u64 << 10) as f64;
const GIB: f64 = (1u64 << 30) as f64;

/// Local statistics a node can disclose.
pub trait NodeStats: Send + Sync {
    /// Output bandwidth limit in bytes per second
    fn output_bandwidth_limit(&self) -> u64;

    fn build(&self) -> i32;

    /// Fraction of the last 48 hours this node was online, in `[0, 1]`
    fn uptime_48h(&self) -> f64;

    /// Fraction of the last 7 days this node was online, in `[0, 1]`
    fn uptime_week(&self) -> f64;

    /// Location in the overlay keyspace, in `[0.0, 1.0)`
    fn location(&self) -> f64;

    /// Datastore size in bytes
    fn store_size(&self) -> u64;
}

/// Fixed statistics, for nodes whose values are known up front.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticStats {
    pub output_bandwidth_limit: u64,
    pub build: i32,
    pub uptime_48h: f64,
    pub uptime_week: f64,
    pub location: f64,
    pub store_size: u64,
}

impl Default for StaticStats {
    fn default() -> Self {
        Self {
            output_bandwidth_limit: 20 * 1024,
            build: 1,
            uptime_48h: 0.25,
            uptime_week: 0.2,
            location: 0.0,
            store_size: 20 << 30,
        }
    }
}

impl NodeStats for StaticStats {
    fn output_bandwidth_limit(&self) -> u64 {
        self.output_bandwidth_limit
    }

    fn build(&self) -> i32 {
        self.build
    }

    fn uptime_48h(&self) -> f64 {
        self.uptime_48h
    }

    fn uptime_week(&self) -> f64 {
        self.uptime_week
    }

    fn location(&self) -> f64 {
        self.location
    }

    fn store_size(&self) -> u64 {
        self.store_size
    }
}

/// Apply multiplicative Gaussian noise with mean 1 and standard deviation
/// `sigma` to `input`.
pub fn random_noise<R: Rng + ?Sized>(rng: &mut R, input: f64, sigma: f64) -> f64 {
    match Normal::new(1.0, sigma) {
        Ok(normal) => input * normal.sample(rng),
        Err(_) => input,
    }
}

/// Distance between two keyspace locations on the unit circle.
fn circular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).abs();
    d.min(1.0 - d)
}

/// Builds the answer this node gives when a probe ends here.
#[derive(Clone)]
pub struct Responder {
    settings: SharedSettings,
    stats: Arc<dyn NodeStats>,
}

impl Responder {
    pub fn new(settings: SharedSettings, stats: Arc<dyn NodeStats>) -> Self {
        Self { settings, stats }
    }

    /// Answer `probe_type`, or refuse if this node does not disclose it.
    ///
    /// `peers` is the current connected peer set, used for link lengths.
    pub fn respond(&self, probe_type: ProbeType, peers: &[PeerInfo], rng: &mut dyn RngCore) -> Outcome {
        if !self.settings.enabled(probe_type) {
            return Outcome::Refused;
        }

        let stats = &self.stats;
        let value = match probe_type {
            ProbeType::Bandwidth => {
                let kib = stats.output_bandwidth_limit() as f64 / KIB;
                ProbeValue::Bandwidth(random_noise(rng, kib, BANDWIDTH_SIGMA) as f32)
            },
            // Build numbers reveal little and noise would make them useless.
            ProbeType::Build => ProbeValue::Build(stats.build()),
            ProbeType::Identifier => {
                // Quantized as well as noised, since it travels with a linkable identifier.
                let percent =
                    random_noise(rng, 100.0 * stats.uptime_week(), IDENTIFIER_UPTIME_SIGMA).round();
                let uptime_percent = percent.clamp(f64::from(i8::MIN), f64::from(i8::MAX)) as i8;
                ProbeValue::Identifier { identifier: self.settings.identifier(), uptime_percent }
            },
            ProbeType::LinkLengths => {
                let own = stats.location();
                let lengths = peers
                    .iter()
                    .map(|peer| {
                        let length = circular_distance(own, peer.location);
                        random_noise(rng, length, LINK_LENGTH_SIGMA) as f32
                    })
                    .collect();
                ProbeValue::LinkLengths(lengths)
            },
            ProbeType::Location => ProbeValue::Location(stats.location() as f32),
            ProbeType::StoreSize => {
                let gib = stats.store_size() as f64 / GIB;
                ProbeValue::StoreSize(random_noise(rng, gib, STORE_SIZE_SIGMA) as f32)
            },
            ProbeType::Uptime48h => {
                let percent = 100.0 * stats.uptime_48h();
                ProbeValue::Uptime(random_noise(rng, percent, UPTIME_48H_SIGMA) as f32)
            },
            ProbeType::Uptime7d => {
                let percent = 100.0 * stats.uptime_week();
                ProbeValue::Uptime(random_noise(rng, percent, UPTIME_7D_SIGMA) as f32)
            },
        };

        Outcome::Value(value)
    }
}
