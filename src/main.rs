//! Graph runner
//!
//! Loads a graph file, runs its looped triggers for a while and prints the
//! final snapshot as JSON.
//!
//! ```text
//! stepgraph <graph.toml|graph.json> [--run-ms N]
//! ```

use anyhow::{bail, Context};
use std::path::PathBuf;
use std::time::Duration;
use stepgraph::{EngineSettings, GraphFile, Group, StepRegistry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Run time when `--run-ms` is not given
const DEFAULT_RUN_MS: u64 = 1000;

struct Args {
    path: PathBuf,
    run_for: Duration,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut path = None;
    let mut run_ms = DEFAULT_RUN_MS;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--run-ms" => {
                let value = args.next().context("--run-ms needs a value")?;
                run_ms = value
                    .parse()
                    .with_context(|| format!("Invalid --run-ms value '{}'", value))?;
            }
            "-h" | "--help" => {
                println!("usage: stepgraph <graph.toml|graph.json> [--run-ms N]");
                std::process::exit(0);
            }
            _ if path.is_none() => path = Some(PathBuf::from(arg)),
            _ => bail!("Unexpected argument '{}'", arg),
        }
    }

    let path = path.context("usage: stepgraph <graph.toml|graph.json> [--run-ms N]")?;
    Ok(Args {
        path,
        run_for: Duration::from_millis(run_ms),
    })
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stepgraph=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args()?;
    let settings = EngineSettings::load_or_default();
    let registry = StepRegistry::with_builtins();

    let file = GraphFile::load(&args.path)
        .with_context(|| format!("Failed to load {:?}", args.path))?;
    let group = Group::from_file_with(&registry, &file, &settings)
        .with_context(|| format!("Failed to build graph '{}'", file.name))?;

    let started = group.start_all();
    tracing::info!(
        "Running graph '{}' with {} loop(s) for {:?}",
        group.name(),
        started,
        args.run_for
    );
    std::thread::sleep(args.run_for);

    for trigger in group.looped_triggers() {
        if !trigger.stop_with_timeout(settings.stop_timeout()) {
            tracing::warn!("Loop '{}' did not stop within {:?}", trigger.name(), settings.stop_timeout());
        }
    }
    group.stop_all();
    tracing::info!("Shutting down...");

    println!("{}", group.snapshot().to_json_pretty()?);
    Ok(())
}
