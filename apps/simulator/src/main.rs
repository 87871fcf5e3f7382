mod overlay;
mod summary;

use std::{collections::HashMap, path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use clap::{ArgAction, Parser};
use futures::future::join_all;
use mhprobe::{MAX_HTL, PEER_LIMIT, ProbeConfig, ProbeSettings, ProbeType};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::runtime::Handle;
use tracing::info;

use overlay::{Overlay, OverlayOptions};
use summary::Summary;

#[derive(Debug, Parser)]
#[clap(name = "mhprobe-sim", about = "Runs probes over a simulated overlay.", version)]
struct Opts {
    /// Number of nodes in the overlay.
    #[clap(long, default_value_t = 200)]
    nodes: usize,

    /// Links each joining node makes.
    #[clap(long, default_value_t = 3)]
    links: usize,

    /// Number of probes to run.
    #[clap(long, default_value_t = 100)]
    probes: usize,

    /// Hops to live of each probe.
    #[clap(long, default_value_t = 25)]
    htl: u8,

    /// Statistic to probe for, e.g. location or uptime_48h.
    #[clap(long = "type", value_parser = parse_probe_type, default_value = "identifier")]
    probe_type: ProbeType,

    /// Index of the node every probe starts from. Random origins if unset.
    #[clap(long)]
    origin: Option<usize>,

    /// Probes accepted per peer per admission window.
    #[clap(long, default_value_t = PEER_LIMIT)]
    peer_limit: usize,

    /// Fraction of nodes that advertise no degree.
    #[clap(long, default_value_t = 0.0)]
    hidden_degree: f64,

    /// Answer immediately instead of after a random delay.
    #[clap(long)]
    no_delay: bool,

    /// Settings file with the response toggles every node uses.
    #[clap(long)]
    settings: Option<PathBuf>,

    /// Seed for the overlay and every node's random source.
    #[clap(long, default_value_t = 1)]
    seed: u64,

    /// Increase log verbosity.
    #[clap(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_probe_type(value: &str) -> Result<ProbeType, String> {
    ProbeType::ALL.into_iter().find(|t| t.name().eq_ignore_ascii_case(value)).ok_or_else(|| {
        let names: Vec<_> = ProbeType::ALL.iter().map(|t| t.name().to_lowercase()).collect();
        format!("unknown probe type, expected one of {}", names.join(", "))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    logger::init_with_level(logger::verbosity(opts.verbose));

    if opts.nodes == 0 {
        bail!("the overlay needs at least one node");
    }
    if opts.htl == 0 || opts.htl > MAX_HTL {
        bail!("htl must be between 1 and {MAX_HTL}");
    }

    let settings = match &opts.settings {
        Some(path) => ProbeSettings::load_or_init(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => ProbeSettings::default(),
    };

    if let Some(origin) = opts.origin {
        if origin >= opts.nodes {
            bail!("origin {origin} is not one of the {} nodes", opts.nodes);
        }
    }

    let mut builder = ProbeConfig::builder().peer_limit(opts.peer_limit);
    if opts.no_delay {
        builder = builder.response_delay(Duration::ZERO, Duration::ZERO);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
    let options = OverlayOptions {
        nodes: opts.nodes,
        links: opts.links,
        hidden_degree: opts.hidden_degree,
        config: builder.build(),
        settings,
    };
    let overlay = Overlay::build(&options, &mut rng, Handle::current())?;

    info!("Starting {} {} probes with htl {}", opts.probes, opts.probe_type, opts.htl);
    let probes: Vec<_> = (0..opts.probes)
        .map(|_| {
            let index = opts.origin.unwrap_or_else(|| rng.gen_range(0..overlay.nodes.len()));
            let uid: u64 = rng.r#gen();
            (uid, overlay.nodes[index].probe.start(opts.htl, uid, opts.probe_type))
        })
        .collect();

    let outcomes = join_all(probes.into_iter().map(|(uid, handle)| async move {
        (uid, handle.outcome().await)
    }))
    .await;

    let mut summary = Summary::default();
    for (uid, outcome) in outcomes {
        match &outcome {
            Some(outcome) => info!("Probe {}: {}", uid, outcome),
            None => info!("Probe {} was dropped", uid),
        }
        summary.record(outcome.as_ref());
    }

    println!("{summary}");

    if opts.probe_type == ProbeType::Identifier && !summary.identifiers().is_empty() {
        // Uniform sampling finds endpoints with the overlay's mean degree; an
        // uncorrected walk would favour well-connected nodes.
        let degrees: HashMap<i64, usize> = overlay
            .nodes
            .iter()
            .map(|node| (node.probe.settings().identifier(), overlay.network.link_count(&node.id)))
            .collect();
        let sampled: Vec<usize> =
            summary.identifiers().iter().filter_map(|id| degrees.get(id).copied()).collect();
        let sampled_mean = sampled.iter().sum::<usize>() as f64 / sampled.len().max(1) as f64;

        println!("Degrees:");
        println!("  overlay mean: {:.3}", overlay.mean_degree());
        println!("  sampled endpoint mean: {sampled_mean:.3}");
    }

    Ok(())
}
