//! Volley CLI
//!
//! Closed-loop TCP load generator: opens N persistent connections, injects
//! newline-framed requests at a controlled per-connection rate, correlates
//! every response back to its request, and reports the latency distribution
//! plus the in-flight count once a second.
//!
//! ```bash
//! volley -c 4 -r 250 -a 127.0.0.1:2007 -f input.txt
//! ```

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use volley_core::{LoadConfig, ReportMode, DEFAULT_TICK_HZ};
use volley_engine::LoadTestDriver;

#[derive(Parser)]
#[command(name = "volley")]
#[command(version)]
#[command(about = "Closed-loop TCP load generator", long_about = None)]
struct Cli {
    /// Number of persistent connections
    #[arg(short = 'c', long, default_value_t = 1)]
    connections: usize,

    /// Target requests per second, per connection
    #[arg(short = 'r', long, default_value_t = 100)]
    rps: u64,

    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:2007")]
    addr: String,

    /// Line-oriented request corpus
    #[arg(short = 'f', long, value_name = "FILE")]
    file: PathBuf,

    /// Rate controller tick frequency in Hz
    #[arg(long, default_value_t = DEFAULT_TICK_HZ)]
    tick_hz: u32,

    /// Latency reporting: cumulative or windowed
    #[arg(long, default_value = "cumulative")]
    report_mode: ReportMode,

    /// Write the final run summary to a JSON file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = LoadConfig {
        connections: cli.connections,
        target_rps: cli.rps,
        server_addr: cli.addr,
        corpus_path: cli.file,
        tick_hz: cli.tick_hz,
        report_mode: cli.report_mode,
    };

    if let Err(e) = run(config, cli.output).await {
        tracing::error!("{:#}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: LoadConfig, output: Option<PathBuf>) -> anyhow::Result<()> {
    let driver = LoadTestDriver::new(config).context("could not start load test")?;
    let summary = driver.run().await?;

    println!();
    println!("run finished in {:.2}s", summary.counters.elapsed_secs);
    println!(
        "  dispatched={} sent={} resolved={} faulted-connections={}",
        summary.counters.dispatched,
        summary.counters.sent,
        summary.counters.resolved,
        summary.counters.faulted_connections,
    );
    println!("  achieved rate: {:.2} rps", summary.counters.achieved_rps);
    println!("  latency: {}", summary.latency);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&summary).context("serializing summary")?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("summary saved to {}", path.display());
    }

    Ok(())
}
