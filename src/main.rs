// src/main.rs
//
// Demo harness: runs a batch of episodes with a seeded random policy,
// either against a live simulator process or against the scripted
// in-memory simulator, and prints per-episode summaries.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;

use greenwave::{
    Action, EnvConfig, EpisodeRunner, EpisodeSink, JsonlSink, NoopSink, ProcessBackend,
    ScriptedSimulator, SimulatorBackend,
};

#[derive(Debug, Parser)]
#[command(name = "greenwave", about = "Traffic-signal environment demo harness")]
struct Cli {
    /// Episodes to run.
    #[arg(long, default_value_t = 5)]
    episodes: u32,

    /// Steps per episode before truncation (overrides GREENWAVE_MAX_STEPS).
    #[arg(long)]
    steps: Option<u64>,

    /// RNG seed for the random policy and the scripted traffic.
    #[arg(long)]
    seed: Option<u64>,

    /// Append per-episode records to this JSONL file.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Launch this simulator executable instead of the scripted simulator.
    #[arg(long)]
    command: Option<String>,

    /// Extra argument for the simulator command (repeatable).
    #[arg(long = "sim-arg")]
    sim_args: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut cfg = EnvConfig::from_env();
    if let Some(steps) = cli.steps {
        cfg.max_steps = steps;
    }

    let seed: u64 = cli.seed.unwrap_or_else(rand::random);

    let sink: Box<dyn EpisodeSink> = match &cli.record {
        Some(path) => Box::new(
            JsonlSink::create(path)
                .with_context(|| format!("opening record file {}", path.display()))?,
        ),
        None => Box::new(NoopSink),
    };

    println!("greenwave demo harness");
    println!(
        "  episodes={} max_steps={} seed={} backend={}",
        cli.episodes,
        cfg.max_steps,
        seed,
        if cli.command.is_some() {
            "process"
        } else {
            "scripted"
        }
    );

    match cli.command {
        Some(command) => {
            cfg.launch.command = command;
            if !cli.sim_args.is_empty() {
                cfg.launch.args = cli.sim_args;
            }
            run(cfg, ProcessBackend::new(), sink, cli.episodes, seed)
        }
        None => {
            let sim = scripted_traffic(&cfg, seed);
            run(cfg, sim, sink, cli.episodes, seed)
        }
    }
}

/// Scripted simulator with pseudo-random queue traces derived from the seed.
fn scripted_traffic(cfg: &EnvConfig, seed: u64) -> ScriptedSimulator {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let detectors: Vec<&str> = cfg.detector_ids.iter().map(String::as_str).collect();
    let mut sim = ScriptedSimulator::new(&cfg.tls_id, &detectors);
    for id in &cfg.detector_ids {
        let trace: Vec<f64> = (0..cfg.max_steps.min(512))
            .map(|_| f64::from(rng.gen_range(0u32..12)))
            .collect();
        sim = sim.with_queue_trace(id, trace);
    }
    sim
}

fn run<B: SimulatorBackend>(
    cfg: EnvConfig,
    backend: B,
    sink: Box<dyn EpisodeSink>,
    episodes: u32,
    seed: u64,
) -> anyhow::Result<()> {
    let mut runner = EpisodeRunner::new(&cfg, backend, sink);
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));

    for _ in 0..episodes {
        let (_obs, reset_info) = runner
            .reset()
            .with_context(|| "could not start a simulator session")?;
        if !reset_info.missing_ids.is_empty() {
            println!(
                "episode {}: missing identifiers {:?}, observations degrade to zero",
                reset_info.episode, reset_info.missing_ids
            );
        }

        loop {
            let action = if rng.gen_bool(0.5) {
                Action::Advance
            } else {
                Action::Hold
            };
            let result = runner.step(action);
            if result.terminated || result.truncated {
                break;
            }
        }

        if let Some(record) = runner.history().last() {
            println!(
                "episode {:>3}: steps={:<5} reward={:>10.1} avg_queue={:>6.2}{}",
                record.episode,
                record.steps,
                record.cumulative_reward,
                record.avg_queue,
                if record.terminated { "  [terminated]" } else { "" }
            );
        }
    }

    runner.close();
    Ok(())
}
