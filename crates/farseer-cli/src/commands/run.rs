use super::CommandSummary;
use crate::cli::RunArgs;
use crate::config::PartialAnalysisConfig;
use crate::error::Result;
use crate::ui::{CliProgressHandler, UiEvent};
use farseer::{core::io::dataset::load_spectra, engine::progress::ProgressReporter, workflows};
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: RunArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<CommandSummary> {
    let partial_config = PartialAnalysisConfig::load(args.config.as_deref())?;
    info!("Merging configuration from file and CLI arguments...");
    let final_config = partial_config.merge_with_cli(&args)?;

    info!("Loading spectra from {:?}", &args.spectra);
    let raw = load_spectra(&args.spectra, final_config.conditions.as_ref())?;
    let (z, y, x) = raw.keys.shape();
    info!(peaklists = raw.peaklists.len(), z, y, x, "Loaded spectra.");

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    info!("Invoking the titration workflow...");
    let result = tokio::task::block_in_place(|| {
        workflows::titration::run(&raw, &final_config, &reporter)
    })?;

    info!("Writing results to {:?}", &args.output);
    let written = tokio::task::block_in_place(|| {
        workflows::titration::write_outputs(&result, &args.output)
    })?;

    let mut summary = CommandSummary::new(format!(
        "Analysed {} peaklist(s) over {} x {} x {} conditions",
        raw.peaklists.len(),
        z,
        y,
        x
    ));
    for resonance in result.resonances() {
        let (_, _, steps, residues) = resonance.cube.shape();
        summary = summary.detail(format!(
            "{}: {} residue(s), {} step(s), {} view(s)",
            resonance.cube.resonance(),
            residues,
            steps,
            resonance.views.len()
        ));
    }
    Ok(summary.detail(format!(
        "{} result file(s) written to {}",
        written.len(),
        args.output.display()
    )))
}
