use super::CommandSummary;
use crate::cli::CheckArgs;
use crate::config::PartialAnalysisConfig;
use crate::error::Result;
use farseer::core::io::dataset::load_spectra;
use farseer::engine::dataset::{build_trees, validate_completeness};
use farseer::engine::error::InputKind;
use tracing::info;

pub async fn run(args: CheckArgs) -> Result<CommandSummary> {
    let config = PartialAnalysisConfig::load(args.config.as_deref())?.into_config()?;

    info!("Checking spectra under {:?}", &args.spectra);
    let raw = load_spectra(&args.spectra, config.conditions.as_ref())?;
    validate_completeness(&raw, InputKind::Peaklist)?;
    if config.fasta.is_some() {
        validate_completeness(&raw, InputKind::Sequence)?;
    }
    let (backbone, sidechains) = build_trees(&raw, config.use_sidechains)?;

    let mut summary = CommandSummary::new(format!(
        "{} is complete: {} peaklist(s)",
        args.spectra.display(),
        backbone.len()
    ));
    for (axis, labels) in [
        ("cond3", raw.keys.z()),
        ("cond2", raw.keys.y()),
        ("cond1", raw.keys.x()),
    ] {
        summary = summary.detail(format!("{:<6} {}", axis, labels.join(", ")));
    }
    let peaks: usize = backbone.iter().map(|(_, table)| table.len()).sum();
    summary = summary.detail(format!("{} backbone peak(s)", peaks));
    if let Some(tree) = &sidechains {
        let peaks: usize = tree.iter().map(|(_, table)| table.len()).sum();
        summary = summary.detail(format!("{} side-chain peak(s)", peaks));
    }
    let pre_files: usize = raw.pre_files.values().map(Vec::len).sum();
    if pre_files > 0 {
        summary = summary.detail(format!("{} theoretical PRE file(s)", pre_files));
    }

    Ok(summary)
}
