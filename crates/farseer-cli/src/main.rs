mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod ui;

use crate::cli::{Cli, Commands};
use crate::commands::CommandSummary;
use crate::error::{CliError, Result};
use crate::ui::{UiEvent, UiManager};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run_app(cli).await {
        Ok(summary) => println!("{summary}"),
        Err(e) => {
            // Let the UI task flush buffered log lines first.
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_app(cli: Cli) -> Result<CommandSummary> {
    let (ui_manager, ui_sender, shutdown_sender) = UiManager::new();
    let ui_handle = tokio::spawn(ui_manager.run());

    logging::setup_logging(
        cli.verbose,
        cli.quiet,
        cli.log_path().as_deref(),
        ui_sender.clone(),
    )?;
    install_panic_report()?;

    info!("Farseer v{} started.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let outcome = match configure_thread_pool(cli.threads) {
        Ok(()) => dispatch(cli.command, ui_sender).await,
        Err(e) => Err(e),
    };
    match &outcome {
        Ok(summary) => info!(result = %summary.headline, "Command finished."),
        Err(e) => error!("Command failed: {}", e),
    }

    if shutdown_sender.send(true).is_err() {
        warn!("UI manager exited before the shutdown signal.");
    }
    ui_handle
        .await
        .map_err(|e| CliError::Other(anyhow::anyhow!("UI manager task failed: {}", e)))?;

    outcome
}

async fn dispatch(command: Commands, ui_sender: mpsc::Sender<UiEvent>) -> Result<CommandSummary> {
    match command {
        Commands::Run(args) => {
            info!(spectra = %args.spectra.display(), output = %args.output.display(), "Running analysis.");
            commands::run::run(args, ui_sender).await
        }
        Commands::Check(args) => {
            info!(spectra = %args.spectra.display(), "Checking spectra.");
            commands::check::run(args).await
        }
    }
}

/// Routes panic reports through `tracing` so they reach the log file.
fn install_panic_report() -> Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |info| {
        error!("{}", panic_hook.panic_report(info));
    }));
    Ok(())
}

fn configure_thread_pool(threads: Option<usize>) -> Result<()> {
    let Some(num_threads) = threads else {
        return Ok(());
    };
    info!(threads = num_threads, "Sizing the fitting thread pool.");
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to build global thread pool: {}", e)))
}
