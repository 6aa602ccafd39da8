//! SafeGuard Agent CLI
//!
//! Wearable fall detection with adaptive calibration and emergency calling.

use clap::{Parser, Subcommand};
use safeguard_agent::{
    alert::{AlertCoordinator, ChannelDispatch, LogOnlyDispatch},
    classifier::FallClassifier,
    config::Config,
    notifier::spawn_notifier_worker,
    pipeline::Orchestrator,
    source::{spawn_replay, spawn_synthetic},
    stats::shared_counters,
    telemetry::{shared_status, Command, NullSink},
    VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "safeguard")]
#[command(version = VERSION)]
#[command(about = "Wearable fall detection agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection pipeline
    Run {
        /// Replay a recorded session (JSONL, one sample per line) instead of
        /// the built-in synthetic gait source
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Keep the recorded timestamps instead of rebasing them to now
        #[arg(long)]
        raw_time: bool,

        /// Override the model path from the config file
        #[arg(long)]
        model: Option<PathBuf>,

        /// Override the server port from the config file
        #[arg(long)]
        port: Option<u16>,

        /// Run without the status/telemetry server
        #[arg(long)]
        no_server: bool,
    },

    /// Query a running agent's status
    Status {
        /// Server port of the running agent
        #[arg(long)]
        port: Option<u16>,
    },

    /// Command a running agent to start calibration
    Calibrate {
        /// Server port of the running agent
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            replay,
            raw_time,
            model,
            port,
            no_server,
        } => cmd_run(replay, raw_time, model, port, no_server),
        Commands::Status { port } => cmd_status(port),
        Commands::Calibrate { port } => cmd_calibrate(port),
        Commands::Config => cmd_config(),
    }
}

#[allow(unused_variables)]
fn cmd_run(
    replay: Option<PathBuf>,
    raw_time: bool,
    model: Option<PathBuf>,
    port: Option<u16>,
    no_server: bool,
) {
    println!("SafeGuard Agent v{VERSION}");
    println!();

    let mut config = Config::load().unwrap_or_default();
    if let Some(model) = model {
        config.model_path = model;
    }
    if let Some(port) = port {
        config.server_port = port;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let counters = shared_counters();
    let status = shared_status();

    let device_id = safeguard_agent::telemetry::device_id();
    println!("  Device ID: {device_id}");

    // Classifier: a missing model degrades to plain monitoring.
    let classifier = FallClassifier::load(&config.model_path);
    println!(
        "  Fall model: {}",
        if classifier.is_ready() {
            "loaded"
        } else {
            "unavailable (detection disabled)"
        }
    );

    // Alert path: hand falls to the notifier worker, or log-only when no
    // account is configured.
    let alerts = if config.notifier.is_configured() {
        let (alert_tx, alert_rx) = crossbeam_channel::bounded(4);
        let _worker = spawn_notifier_worker(config.notifier.clone(), alert_rx);
        println!("  Emergency calls: enabled -> {}", config.notifier.to_number);
        AlertCoordinator::new(Box::new(ChannelDispatch::new(alert_tx)))
    } else {
        println!("  Emergency calls: disabled (no notifier account configured)");
        AlertCoordinator::new(Box::new(LogOnlyDispatch))
    };

    // UI command channel; the main thread keeps one sender alive so the
    // pipeline keeps draining it even without the server.
    let (command_tx, command_rx) = crossbeam_channel::unbounded::<Command>();

    // Telemetry server and event fan-out.
    #[cfg(feature = "server")]
    let (events, server_runtime, server_shutdown) = if no_server {
        (
            Box::new(NullSink) as Box<dyn safeguard_agent::EventSink>,
            None,
            None,
        )
    } else {
        let sink = safeguard_agent::telemetry::BroadcastSink::new(256);
        let state = safeguard_agent::server::ServerState::new(
            status.clone(),
            command_tx.clone(),
            sink.sender(),
        );
        let server_config = safeguard_agent::server::ServerConfig::new(config.server_port);

        match tokio::runtime::Runtime::new() {
            Ok(runtime) => match runtime.block_on(safeguard_agent::server::run(server_config, state))
            {
                Ok((addr, shutdown_tx)) => {
                    println!("  Telemetry server: http://{addr}");
                    (
                        Box::new(sink) as Box<dyn safeguard_agent::EventSink>,
                        Some(runtime),
                        Some(shutdown_tx),
                    )
                }
                Err(e) => {
                    eprintln!("Warning: telemetry server failed to start: {e}");
                    eprintln!("Continuing without the UI surface.");
                    (
                        Box::new(NullSink) as Box<dyn safeguard_agent::EventSink>,
                        Some(runtime),
                        None,
                    )
                }
            },
            Err(e) => {
                eprintln!("Warning: could not create server runtime: {e}");
                (
                    Box::new(NullSink) as Box<dyn safeguard_agent::EventSink>,
                    None,
                    None,
                )
            }
        }
    };

    #[cfg(not(feature = "server"))]
    let events: Box<dyn safeguard_agent::EventSink> = Box::new(NullSink);

    // Sample feed.
    let feed = match replay {
        Some(path) => {
            println!("  Sample feed: replay {}", path.display());
            match spawn_replay(&path, !raw_time) {
                Ok(feed) => feed,
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => {
            println!("  Sample feed: synthetic gait (100 Hz)");
            spawn_synthetic()
        }
    };

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut orchestrator = Orchestrator::new(classifier, alerts, events, status, counters.clone());
    orchestrator.run(feed.into_receiver(), command_rx, &running);

    // Shut down the UI surface before reporting.
    #[cfg(feature = "server")]
    {
        if let Some(shutdown_tx) = server_shutdown {
            let _ = shutdown_tx.send(());
        }
        drop(server_runtime);
    }
    drop(command_tx);

    println!();
    println!("{}", counters.summary());
}

fn cmd_status(port: Option<u16>) {
    let config = Config::load().unwrap_or_default();
    let port = port.unwrap_or(config.server_port);
    let url = format!("http://127.0.0.1:{port}/status");

    match fetch_json(&url) {
        Ok(status) => {
            println!("SafeGuard Agent Status");
            println!("======================");
            println!();
            println!(
                "{}",
                serde_json::to_string_pretty(&status).unwrap_or_else(|_| "Error".to_string())
            );
        }
        Err(e) => {
            eprintln!("Error: could not reach agent at {url}: {e}");
            eprintln!("Is `safeguard run` active?");
            std::process::exit(1);
        }
    }
}

fn cmd_calibrate(port: Option<u16>) {
    let config = Config::load().unwrap_or_default();
    let port = port.unwrap_or(config.server_port);
    let url = format!("http://127.0.0.1:{port}/calibrate");

    match post_json(&url) {
        Ok(response) => {
            println!(
                "Calibration: {}",
                response
                    .get("msg")
                    .and_then(|v| v.as_str())
                    .unwrap_or("requested")
            );
            println!("Keep wearing the device normally for the next 15 seconds.");
        }
        Err(e) => {
            eprintln!("Error: could not reach agent at {url}: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Blocking GET returning parsed JSON.
fn fetch_json(url: &str) -> Result<serde_json::Value, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| e.to_string())?;

    runtime.block_on(async {
        let response = reqwest::get(url).await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("server answered {}", response.status()));
        }
        response.json().await.map_err(|e| e.to_string())
    })
}

/// Blocking empty POST returning parsed JSON.
fn post_json(url: &str) -> Result<serde_json::Value, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| e.to_string())?;

    runtime.block_on(async {
        let client = reqwest::Client::new();
        let response = client.post(url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("server answered {}", response.status()));
        }
        response.json().await.map_err(|e| e.to_string())
    })
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not install Ctrl+C handler: {e}");
    }
}
