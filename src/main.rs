//! VPoW Worker - Vite proof-of-work worker
//!
//! This is the main entry point for the vpow-worker binary. The worker
//! launches a local PoW work server, connects to the VPoW coordinator,
//! receives work assignments, computes them through the work server, and
//! returns nonces.

mod cli;
mod config;
mod coordinator;
mod error;
mod gateway;
mod logging;
mod protocol;
mod types;
mod version;
mod work;

use clap::Parser;
use tracing::{debug, info, warn};

use crate::cli::{Cli, Commands, ConfigSubcommand};
use crate::config::{GatewayBackendKind, WorkerConfig};
use crate::coordinator::{ClientEvent, CoordinatorClient, CoordinatorClientConfig};
use crate::error::{Error, Result};
use crate::gateway::{create_gateway, derive_port, WorkServerProcess};
use crate::types::ViteAddress;
use crate::work::WorkDispatcher;

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    // Commands that don't need the full logging setup
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone());
        }
        Commands::Run { .. } => {}
    }

    // Load config (or use defaults) and fold in CLI overrides
    let config = match load_run_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprint!("{}", e.format_for_terminal());
            std::process::exit(e.exit_code());
        }
    };

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(version = %build.full_version(), target = %build.target, "Launching VPoW worker");

    // Resolve the payout address before anything touches the network
    let address = match config.address() {
        Ok(address) => address,
        Err(e) => {
            eprint!("{}", e.format_for_terminal());
            std::process::exit(e.exit_code());
        }
    };

    run_worker(config, address)
}

/// Load configuration for the run command and apply CLI argument overrides
fn load_run_config(cli: &Cli) -> Result<WorkerConfig> {
    let Commands::Run { address, gpu, rpc_server, config } = &cli.command else {
        unreachable!("only the run command reaches config loading");
    };

    let mut loaded = WorkerConfig::load(config.as_deref())?;

    if let Some(address) = address {
        // Re-validated here so a bad CLI address fails exactly like a bad
        // configured one
        ViteAddress::parse(address)?;
        loaded.node.address = Some(address.clone());
    }
    if let Some(gpu) = gpu {
        loaded.node.gpu = gpu.clone();
    }
    if *rpc_server {
        loaded.gateway.backend = GatewayBackendKind::RpcServer;
    }

    Ok(loaded)
}

/// Run the worker in normal operation mode
fn run_worker(config: WorkerConfig, address: ViteAddress) -> Result<()> {
    info!(
        address = %address,
        coordinator_url = %config.coordinator.url,
        backend = ?config.gateway.backend,
        gpu = %config.node.gpu,
        "Configuration loaded"
    );

    // One event loop drives transport I/O, timers, and gateway exchanges;
    // concurrent work items are interleaved suspensions, not threads.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async_worker_main(config, address))
}

/// Async worker main loop
async fn async_worker_main(config: WorkerConfig, address: ViteAddress) -> Result<()> {
    // The loopback port is chosen once per process lifetime
    let port = if config.gateway.port != 0 {
        config.gateway.port
    } else {
        derive_port()
    };
    info!(port = port, "Using port");

    // The work-server child is killed on every exit path: explicitly on the
    // graceful one, through kill_on_drop otherwise.
    let work_server = WorkServerProcess::spawn(&config.gateway, &config.node.gpu, port)?;
    info!("Work server launched!");

    let gateway = create_gateway(&config.gateway, port);
    let (mut dispatcher, mut outcome_rx) = WorkDispatcher::new(gateway, 100);

    let client_config = CoordinatorClientConfig {
        url: config.coordinator.url.clone(),
        address,
        reconnect_delay: std::time::Duration::from_millis(config.coordinator.reconnect_interval_ms),
        liveness_timeout: std::time::Duration::from_millis(config.coordinator.liveness_timeout_ms),
        channel_capacity: 100,
    };

    let mut client = CoordinatorClient::new(client_config);
    let mut event_rx = client.start().await?;

    // Graceful shutdown on Ctrl+C
    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    info!("Worker event loop started");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Shutdown signal received");
                client.shutdown().await;
                break;
            }

            // Events from the coordinator connection
            event = event_rx.recv() => {
                match event {
                    Some(ClientEvent::Connected) => {
                        info!("Connected to coordinator");
                    }
                    Some(ClientEvent::Disconnected { reason }) => {
                        // Work outstanding at disconnect is orphaned: any
                        // result finishing now is dropped by the send path,
                        // and the coordinator re-issues what it still wants.
                        warn!(reason = %reason, orphaned = ?dispatcher.active_hashes(), "Disconnected from coordinator");
                    }
                    Some(ClientEvent::Reconnecting) => {
                        debug!("Reconnecting to coordinator");
                    }
                    Some(ClientEvent::Message(message)) => {
                        dispatcher.handle_message(message);
                    }
                    None => {
                        info!("Coordinator event channel closed");
                        break;
                    }
                }
            }

            // Resolved gateway exchanges
            outcome = outcome_rx.recv() => {
                if let Some(outcome) = outcome {
                    if let Some(response) = dispatcher.handle_outcome(outcome) {
                        client.send(response).await;
                    }
                }
            }
        }
    }

    info!(in_flight = dispatcher.in_flight(), "Worker shutting down");
    work_server.terminate().await;

    Ok(())
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = WorkerConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            config::init_config(path.as_deref(), force)?;
        }
        ConfigSubcommand::Validate { config } => {
            match WorkerConfig::load(config.as_deref()) {
                Ok(_) => {
                    println!("Configuration is valid.");
                }
                Err(e) => {
                    eprint!("{}", e.format_for_terminal());
                    std::process::exit(e.exit_code());
                }
            }
        }
    }

    Ok(())
}
