//! `wsprobe`: run the stock workloads against a simulation server.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use wsprobe::config::{ENDPOINT_ENV, SnapshotPolicy};
use wsprobe::listener::Listener;
use wsprobe::scenario::builtin;
use wsprobe::{Config, Envelope, ParticleSpec, Report, harness};

#[derive(Parser)]
#[command(name = "wsprobe")]
#[command(about = "Black-box protocol checks for a particle-simulation WebSocket server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server WebSocket URL
    #[arg(long, global = true, env = ENDPOINT_ENV)]
    url: Option<String>,

    /// Print the final report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Per-attempt receive wait in milliseconds
    #[arg(long, global = true, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    attempt_timeout: Option<u64>,

    /// Snapshot requests per expectation
    #[arg(long, global = true, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    attempts: Option<u32>,

    /// Settling pause after each creation in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    settle: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create one proton and verify the particle count grew
    Create,

    /// Create a proton, then a neutron, verifying the count after each
    CreatePair,

    /// Request a snapshot, then tally server traffic for a while
    Listen {
        /// Observation window in seconds
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },

    /// Send one createParticle and print whatever comes back
    Probe {
        /// Stop after this many messages
        #[arg(long, default_value_t = 5)]
        max_messages: u64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = build_config(&cli);

    let code = match cli.command {
        Commands::Create => {
            let scenario = builtin::create_particle(config.settle);
            let result = harness::run_scenario(&config, &scenario).await;
            emit(&result, cli.json)?
        }
        Commands::CreatePair => {
            let scenario = builtin::create_particle_pair(config.settle);
            let result = harness::run_scenario(&config, &scenario).await;
            emit(&result, cli.json)?
        }
        Commands::Listen { seconds } => {
            let listener = Listener::from_config(Duration::from_secs(seconds), &config)
                .with_greeting(Envelope::get_snapshot());
            let json = cli.json;
            let summary = harness::listen_with(&config, &listener, |event| {
                if !json {
                    println!("{}", event);
                }
            })
            .await;
            emit(&summary, cli.json)?
        }
        Commands::Probe { max_messages } => {
            let spec = ParticleSpec::proton(builtin::PROTON_POSITION);
            let summary =
                harness::probe(&config, &spec, max_messages, config.timeouts.receive).await;
            emit(&summary, cli.json)?
        }
    };

    Ok(ExitCode::from(code))
}

fn build_config(cli: &Cli) -> Config {
    let mut config = Config::new().with_endpoint_override(cli.url.clone());
    if let Some(ms) = cli.attempt_timeout {
        config = config.with_receive_timeout(Duration::from_millis(ms));
    }
    if let Some(attempts) = cli.attempts {
        let policy = SnapshotPolicy {
            attempts,
            ..config.snapshot.clone()
        };
        config = config.with_snapshot_policy(policy);
    }
    if let Some(ms) = cli.settle {
        config = config.with_settle(Duration::from_millis(ms));
    }
    config
}

fn emit<R: Report>(report: &R, json: bool) -> Result<u8> {
    if json {
        println!("{}", report.to_json().context("failed to serialize report")?);
    } else {
        println!("{}", report);
    }
    Ok(report.exit_code())
}
