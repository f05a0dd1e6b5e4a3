//! chatterbox-rs: lifecycle supervisor CLI for the ChatterBox TTS service.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use chatterbox_rs::config::Config;
use chatterbox_rs::health::HttpHealthProbe;
use chatterbox_rs::pidfile::PidFile;
use chatterbox_rs::process::{CommandSpawner, SpawnError, SystemProcessTable};
use chatterbox_rs::supervisor::{ServiceState, StartOutcome, StopOutcome, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "chatterbox-rs", about = "ChatterBox TTS service supervisor")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the service and wait for it to become ready
    Start,
    /// Stop the service (graceful, then forced)
    Stop,
    /// Stop, wait, and start again
    Restart,
    /// Report service state and health
    Status,
    /// Start the service only if it is not already running
    Ensure,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref());
    init_logging(&config, args.verbose);

    let supervisor = Supervisor::new(
        config.supervisor.clone(),
        config.service.signature.clone(),
        PidFile::new(config.service.pid_path()),
        SystemProcessTable,
        HttpHealthProbe::new(&config.service.url),
        CommandSpawner::new(&config.service),
    );

    match args.command {
        Command::Start => report_start(supervisor.start().await),
        Command::Stop => report_stop(supervisor.stop().await),
        Command::Restart => report_start(supervisor.restart().await),
        Command::Ensure => report_start(supervisor.ensure_running().await),
        Command::Status => {
            let report = supervisor.status().await;
            match (report.state, report.pid) {
                (ServiceState::NotRunning, _) => println!("ChatterBox TTS service is not running"),
                (state, Some(pid)) => println!("ChatterBox TTS service is {state} (PID {pid})"),
                (state, None) => println!("ChatterBox TTS service is {state}"),
            }
            if let Some(health) = report.health {
                println!("  Status: {}", health.status);
                println!("  Model loaded: {}", health.model_loaded);
            }
        }
    }
}

/// Console + file logging. The activity log keeps a timestamped trail
/// of the supervisor's own actions next to the service logs.
fn init_logging(config: &Config, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let activity_file = std::fs::create_dir_all(config.service.log_dir())
        .ok()
        .and_then(|()| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(config.service.activity_log())
                .ok()
        });

    match activity_file {
        Some(file) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

fn report_start(result: Result<StartOutcome, SpawnError>) {
    match result {
        Ok(StartOutcome::AlreadyRunning) => println!("Service is already running"),
        Ok(StartOutcome::Ready { pid }) => println!("ChatterBox TTS service is ready (PID {pid})"),
        Ok(StartOutcome::Launched { pid }) => println!(
            "Service started (PID {pid}) but not responsive yet; it may still be loading the model"
        ),
        Ok(StartOutcome::AlreadyStarting) => {
            println!("Another invocation is already starting the service");
        }
        Err(e) => {
            eprintln!("Failed to start service: {e}");
            std::process::exit(1);
        }
    }
}

fn report_stop(outcome: StopOutcome) {
    match outcome {
        StopOutcome::Stopped => println!("Service stopped"),
        StopOutcome::AlreadyExited => println!("Process already stopped"),
        StopOutcome::NoRecord => println!("No PID record found, nothing to stop"),
    }
}
