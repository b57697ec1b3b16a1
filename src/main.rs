//! BeliefCache Simulator
//!
//! Replays an access trace through the predictive cache and prints hit
//! ratio, prefetch usefulness and adaptation activity.
//!
//! ```text
//! trace ──▶ Simulator (inline)          ──▶ report (text / JSON)
//!       └─▶ PredictionEngine (--pipeline) ──▶ snapshot + advice log
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use beliefcache::engine::{EngineMetrics, LoggingAdvisor};
use beliefcache::{EvictionMode, PredictionEngine, SimulationConfig, Simulator, Workload};

// =============================================================================
// CLI Arguments
// =============================================================================

/// BeliefCache simulator - replay traces through the predictive cache
#[derive(Parser, Debug)]
#[command(name = "beliefcache-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Access trace: decimal object IDs separated by whitespace
    #[arg(env = "BELIEFCACHE_WORKLOAD")]
    workload: PathBuf,

    /// YAML configuration file (simulation and engine settings)
    #[arg(long, env = "BELIEFCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Virtual cache size
    #[arg(long, env = "BELIEFCACHE_CACHE_SIZE")]
    cache_size: Option<usize>,

    /// Candidates kept per update
    #[arg(long, env = "BELIEFCACHE_CANDIDATE_SET_SIZE")]
    candidate_set_size: Option<usize>,

    /// Voter window
    #[arg(long, env = "BELIEFCACHE_VOTER_WINDOW")]
    voter_window: Option<usize>,

    /// Transition window
    #[arg(long, env = "BELIEFCACHE_HISTORY_WINDOW")]
    history_window: Option<usize>,

    /// Belief threshold
    #[arg(long, env = "BELIEFCACHE_THRESHOLD")]
    threshold: Option<f64>,

    /// Size of the dense object ID space
    #[arg(long, env = "BELIEFCACHE_MAX_TRACKED_OBJECTS")]
    max_tracked_objects: Option<u64>,

    /// Real cache capacity
    #[arg(long, env = "BELIEFCACHE_REAL_CAPACITY")]
    real_capacity: Option<usize>,

    /// Real cache eviction mode (lru, belief)
    #[arg(long, env = "BELIEFCACHE_EVICTION_MODE")]
    eviction_mode: Option<EvictionMode>,

    /// Disable drift detection and parameter tuning
    #[arg(long, env = "BELIEFCACHE_NO_ADAPTIVE")]
    no_adaptive: bool,

    /// Seed for parameter perturbation
    #[arg(long, env = "BELIEFCACHE_SEED")]
    seed: Option<u64>,

    /// Replayed accesses excluded from hit counting
    #[arg(long, env = "BELIEFCACHE_WARMUP")]
    warmup: Option<u64>,

    /// Leading accesses used only for training
    #[arg(long, env = "BELIEFCACHE_TRAIN")]
    train: Option<usize>,

    /// Run through the queued engine instead of the inline simulator
    #[arg(long, env = "BELIEFCACHE_PIPELINE")]
    pipeline: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Write Prometheus metrics to this file
    #[arg(long, env = "BELIEFCACHE_METRICS_OUT")]
    metrics_out: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = build_config(&args)?;
    let workload = Workload::from_path(&args.workload)
        .with_context(|| format!("failed to load workload {}", args.workload.display()))?;

    info!("Starting BeliefCache simulator");
    info!(
        "  Workload: {} ({} accesses, {} objects)",
        args.workload.display(),
        workload.len(),
        workload.distinct()
    );
    info!("  Cache size: {}", config.engine.cache.cache_size);
    info!("  Real cache: {} ({})", config.engine.real_capacity, config.engine.eviction_mode);
    info!("  Adaptive: {}", config.engine.adaptive);

    let metrics = if args.pipeline {
        run_pipeline(config, &workload, args.json).await?
    } else {
        run_simulation(config, &workload, args.json)?
    };

    if let Some(path) = &args.metrics_out {
        let text = metrics.encode_text().context("failed to encode metrics")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write metrics to {}", path.display()))?;
        info!("Metrics written to {}", path.display());
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            SimulationConfig::from_yaml(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => SimulationConfig::default(),
    };

    let engine = &mut config.engine;
    if let Some(v) = args.cache_size {
        engine.cache.cache_size = v;
    }
    if let Some(v) = args.candidate_set_size {
        engine.cache.candidate_set_size = v;
    }
    if let Some(v) = args.voter_window {
        engine.cache.voter_window_size = v;
    }
    if let Some(v) = args.history_window {
        engine.cache.history_window_size = v;
    }
    if let Some(v) = args.threshold {
        engine.cache.belief_threshold = v;
    }
    if let Some(v) = args.max_tracked_objects {
        engine.cache.max_tracked_objects = v;
    }
    if let Some(v) = args.real_capacity {
        engine.real_capacity = v;
    }
    if let Some(v) = args.eviction_mode {
        engine.eviction_mode = v;
    }
    if args.no_adaptive {
        engine.adaptive = false;
    }
    if args.seed.is_some() {
        engine.switch.seed = args.seed;
    }
    if let Some(v) = args.warmup {
        config.warmup = v;
    }
    if let Some(v) = args.train {
        config.train = v;
    }

    config.engine.validate().context("invalid parameters")?;
    Ok(config)
}

fn run_simulation(
    config: SimulationConfig,
    workload: &Workload,
    json: bool,
) -> Result<EngineMetrics> {
    let mut simulator = Simulator::new(config).context("failed to build simulator")?;
    let report = simulator.run(workload).context("simulation failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(simulator.metrics().clone())
}

async fn run_pipeline(
    config: SimulationConfig,
    workload: &Workload,
    json: bool,
) -> Result<EngineMetrics> {
    let engine = PredictionEngine::start(config.engine, Arc::new(LoggingAdvisor::new()))
        .context("failed to start engine")?;
    let metrics = engine.metrics().clone();

    for &raw in workload.ids() {
        let id = if config.intern_ids {
            engine.interner().intern(raw)?
        } else {
            raw
        };
        engine.submit(id)?;
    }

    let (snapshot, stats) = engine.shutdown().await.context("engine shutdown failed")?;
    info!(
        processed = stats.prediction.processed,
        rejected = stats.prediction.failed,
        "Pipeline drained"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!(
            "accesses:      {}\nhits:          {} ({:.4})\nprefetched:    {}\nadaptation:    {} phase shifts, {} promotions",
            snapshot.accesses,
            snapshot.hits,
            snapshot.hit_ratio,
            snapshot.virtual_insertions,
            snapshot.phase_shifts,
            snapshot.promotions
        );
    }
    Ok(metrics)
}

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
