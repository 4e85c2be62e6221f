use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

use urban_traffic::config::SimConfig;
use urban_traffic::control::{spawn_control_worker, ControlClient, ControlLink, ControlWorker};
use urban_traffic::simulation::{MapData, SimWorld};

#[derive(Parser)]
#[command(name = "urban_traffic")]
#[command(about = "Headless urban traffic micro-simulation")]
struct Cli {
    /// Map data JSON (nodes, arcs, intersections, centralAntenna); a demo grid is used when omitted
    #[arg(long)]
    map: Option<PathBuf>,

    /// Simulation config JSON; missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of simulation ticks to run
    #[arg(long, default_value = "600")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.1")]
    delta: f64,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Backend base url serving /api/antenna and /api/ai
    #[arg(long)]
    endpoint: Option<String>,

    /// Run without remote services, using only the local heuristics
    #[arg(long)]
    offline: bool,

    /// Pace ticks in wall-clock time instead of running as fast as possible
    #[arg(long)]
    realtime: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,urban_traffic=info"),
    )
    .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(endpoint) = &cli.endpoint {
        config.control = config.control.with_base_url(endpoint);
    }

    let map = match &cli.map {
        Some(path) => MapData::load(path)?,
        None => MapData::demo_grid(7, 5, 26.0960, 44.4340, 0.0012),
    };

    let mut world = match cli.seed {
        Some(seed) => SimWorld::new_with_seed(&map, config, seed),
        None => SimWorld::new(&map, config),
    }
    .context("Failed to create simulation world")?;

    let worker = if cli.offline {
        info!("Running offline; signal decisions come from the local heuristic");
        None
    } else {
        Some(connect_control(&mut world)?)
    };

    run_headless(&mut world, cli.ticks, cli.delta, cli.realtime).await;

    if let Some(worker) = worker {
        worker.shutdown().await;
    }
    world.log_final_stats();
    Ok(())
}

fn connect_control(world: &mut SimWorld) -> Result<ControlWorker> {
    let client = ControlClient::new(&world.config.control)
        .context("Failed to build HTTP client for the control services")?;
    let (link, endpoint) = ControlLink::pair();
    world.attach_control(link);
    info!(
        "Remote control enabled (antenna {}, ai {})",
        world.config.control.antenna_url, world.config.control.ai_url
    );
    Ok(spawn_control_worker(client, endpoint))
}

/// Run the simulation without graphics, logging a summary every simulated second
async fn run_headless(world: &mut SimWorld, ticks: u32, delta: f64, realtime: bool) {
    info!("Ticks: {}, Delta: {}s", ticks, delta);
    if delta <= 0.0 {
        warn!("Non-positive delta {}; time will not advance", delta);
    }

    // How many ticks equal 1 second of simulation time
    let ticks_per_second = if delta > 0.0 {
        (1.0 / delta).ceil().max(1.0) as u32
    } else {
        1
    };

    let mut interval = realtime
        .then(|| tokio::time::interval(Duration::from_secs_f64(delta.max(0.001))));

    for tick in 1..=ticks {
        match interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            // Let the control worker make progress between ticks
            None => tokio::task::yield_now().await,
        }

        world.tick(delta);

        if tick % ticks_per_second == 0 {
            world.log_summary();
        }
    }
}
