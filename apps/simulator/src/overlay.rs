//! Random overlay generation.

use std::sync::Arc;

use anyhow::Context;
use mhprobe::{
    PeerId, Probe, ProbeConfig, ProbeSettings, SharedSettings, StaticStats,
    settings::UNSET_IDENTIFIER, transport::memory::MemoryNetwork,
};
use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use tokio::runtime::Handle;
use tracing::{debug, info};

const BUILDS: [i32; 3] = [1465, 1466, 1467];

pub struct OverlayOptions {
    pub nodes: usize,
    /// Links each joining node makes
    pub links: usize,
    /// Fraction of nodes advertising degree 0
    pub hidden_degree: f64,
    pub config: ProbeConfig,
    /// Response toggles applied to every node
    pub settings: ProbeSettings,
}

pub struct SimNode {
    pub id: PeerId,
    pub probe: Probe,
}

pub struct Overlay {
    pub network: MemoryNetwork,
    pub nodes: Vec<SimNode>,
}

impl Overlay {
    /// Grow an overlay by preferential attachment, so that degrees vary
    /// widely the way they do in real networks.
    pub fn build(options: &OverlayOptions, rng: &mut ChaCha8Rng, runtime: Handle) -> anyhow::Result<Self> {
        let network = MemoryNetwork::new(runtime.clone());
        let mut nodes = Vec::with_capacity(options.nodes);

        for index in 0..options.nodes {
            let id = PeerId::random();
            let stats = random_stats(rng);
            let transport = network.add_node(id, stats.location);

            // Every node picks its own identifier.
            let mut settings = options.settings.clone();
            settings.identifier = UNSET_IDENTIFIER;

            let probe = Probe::builder(Arc::new(transport), Arc::new(stats))
                .config(options.config.clone())
                .settings(SharedSettings::new(settings))
                .rng(ChaCha8Rng::seed_from_u64(rng.r#gen()))
                .runtime(runtime.clone())
                .build()
                .with_context(|| format!("failed to build probe for node {index}"))?;
            network.attach(&id, &probe);
            nodes.push(SimNode { id, probe });
        }

        let links = options.links.max(1);
        let seed = (links + 1).min(nodes.len());
        // One entry per link end, so sampling it is proportional to degree.
        let mut ends: Vec<usize> = Vec::new();

        for a in 0..seed {
            for b in (a + 1)..seed {
                network.connect(&nodes[a].id, &nodes[b].id);
                ends.extend([a, b]);
            }
        }
        for joining in seed..nodes.len() {
            let mut targets: Vec<usize> = Vec::with_capacity(links);
            while targets.len() < links.min(joining) {
                let Some(target) = ends.choose(rng).copied() else {
                    break;
                };
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
            for target in targets {
                network.connect(&nodes[joining].id, &nodes[target].id);
                ends.extend([joining, target]);
            }
        }

        let mut hidden = 0;
        for node in &nodes {
            if rng.gen_bool(options.hidden_degree.clamp(0.0, 1.0)) {
                network.set_advertised_degree(&node.id, Some(0));
                hidden += 1;
            }
        }

        info!("Built overlay of {} nodes with {} links", nodes.len(), ends.len() / 2);
        if hidden > 0 {
            debug!("{} nodes advertise no degree", hidden);
        }

        Ok(Self { network, nodes })
    }

    pub fn mean_degree(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        let total: usize = self.nodes.iter().map(|node| self.network.link_count(&node.id)).sum();
        total as f64 / self.nodes.len() as f64
    }
}

fn random_stats(rng: &mut ChaCha8Rng) -> StaticStats {
    let uptime_48h = rng.gen_range(0.05..1.0);
    StaticStats {
        output_bandwidth_limit: rng.gen_range(16..=128u64) * 1024,
        build: BUILDS[rng.gen_range(0..BUILDS.len())],
        uptime_48h,
        uptime_week: uptime_48h * rng.gen_range(0.5..1.0),
        location: rng.r#gen(),
        store_size: rng.gen_range(1..=64u64) << 30,
    }
}
