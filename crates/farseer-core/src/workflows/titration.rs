use crate::core::io::dataset::RawDataset;
use crate::core::io::export::{
    ExportError, export_to_path, write_attribute_file, write_experiment_table, write_fit_report,
    write_step_table,
};
use crate::core::io::pre::TheoreticalProfile;
use crate::core::models::conditions::{Axis, GroupKey};
use crate::core::models::peak::PeakColumn;
use crate::engine::config::AnalysisConfig;
use crate::engine::cube::DatasetCube;
use crate::engine::dataset::{ConditionTree, build_trees, validate_completeness};
use crate::engine::error::{EngineError, InputKind};
use crate::engine::fitting::FitStatus;
use crate::engine::pre::{apply_pre, profile_for_group};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::reconcile::{
    absorb_late_residues, apply_cs_offsets, cs_reference_offsets, expand_across, fill_from_sequence,
    reconcile_tree, unify_references,
};
use crate::engine::titration::{Column, TitrationView};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

const FITTED_COLUMNS: [Column; 3] = [Column::H1Delta, Column::N15Delta, Column::Csp];

/// The cube of one resonance type and every view computed from it.
#[derive(Debug, Clone)]
pub struct ResonanceResult {
    pub cube: DatasetCube,
    pub views: Vec<TitrationView>,
}

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub backbone: ResonanceResult,
    pub sidechains: Option<ResonanceResult>,
}

impl AnalysisResult {
    pub fn resonances(&self) -> impl Iterator<Item = &ResonanceResult> {
        std::iter::once(&self.backbone).chain(self.sidechains.as_ref())
    }
}

#[instrument(skip_all, name = "titration_workflow")]
pub fn run(
    raw: &RawDataset,
    config: &AnalysisConfig,
    reporter: &ProgressReporter,
) -> Result<AnalysisResult, EngineError> {
    // === Phase 0: Input validation ===
    reporter.phase_start("Validation");
    validate_completeness(raw, InputKind::Peaklist)?;
    if config.fasta.is_some() {
        validate_completeness(raw, InputKind::Sequence)?;
    }
    if let Some(fit) = &config.fit {
        let steps = raw.keys.x().len();
        if fit.x_values.len() != steps {
            return Err(EngineError::FitInputMismatch {
                expected: steps,
                found: fit.x_values.len(),
            });
        }
    }
    info!(shape = ?raw.keys.shape(), "Input dataset is complete.");
    reporter.phase_finish();

    // === Phase 1: Residue-axis reconciliation ===
    reporter.phase_start("Reconciliation");
    let (mut backbone, mut sidechains) = build_trees(raw, config.use_sidechains)?;

    if let Some(fasta) = &config.fasta {
        for group in raw.keys.groups() {
            if let Some(sequence) = raw.load_sequence(&group)? {
                fill_from_sequence(&mut backbone, &group, &sequence, fasta.start)?;
            }
        }
    }

    prepare_tree(&mut backbone, config)?;
    if let Some(tree) = sidechains.as_mut() {
        prepare_tree(tree, config)?;
    }

    if let Some(residue) = config.cs_reference {
        let offsets = cs_reference_offsets(&backbone, residue)?;
        apply_cs_offsets(&mut backbone, &offsets);
        if let Some(tree) = sidechains.as_mut() {
            apply_cs_offsets(tree, &offsets);
        }
        info!(residue, corrected = offsets.len(), "Applied internal chemical-shift referencing.");
    }
    reporter.phase_finish();

    // === Phase 2: Calculations ===
    let backbone = analyse_tree(&backbone, raw, config, reporter)?;
    let sidechains = sidechains
        .as_ref()
        .map(|tree| analyse_tree(tree, raw, config, reporter))
        .transpose()?;

    info!(
        views = backbone.views.len() + sidechains.as_ref().map_or(0, |s| s.views.len()),
        "Analysis finished."
    );
    Ok(AnalysisResult {
        backbone,
        sidechains,
    })
}

fn prepare_tree(tree: &mut ConditionTree, config: &AnalysisConfig) -> Result<(), EngineError> {
    absorb_late_residues(tree)?;
    if config.expansion.along_y {
        expand_across(tree, Axis::Cond2)?;
    }
    if config.expansion.along_z {
        expand_across(tree, Axis::Cond3)?;
    }
    unify_references(tree)?;
    reconcile_tree(tree)?;
    Ok(())
}

fn analyse_tree(
    tree: &ConditionTree,
    raw: &RawDataset,
    config: &AnalysisConfig,
    reporter: &ProgressReporter,
) -> Result<ResonanceResult, EngineError> {
    reporter.phase_start(format!("{} calculations", tree.resonance()));
    let cube = DatasetCube::build(tree)?;

    let mut views = Vec::new();
    for axis in config.axes.enabled() {
        for view in cube.views(axis)? {
            if config.comparisons && axis != Axis::Cond1 {
                for pair in view.steps().windows(2) {
                    views.push(view.compare(&pair[0], &pair[1])?);
                }
            }
            views.push(view);
        }
    }

    reporter.report(Progress::TaskStart {
        total: views.len() as u64,
    });
    let mut profiles: HashMap<GroupKey, TheoreticalProfile> = HashMap::new();
    for view in &mut views {
        reporter.status(view.meta().label());
        compute_columns(view, config)?;

        let primary = view.meta().compared.is_none();
        if let Some(fit) = config.fit.as_ref().filter(|_| primary && view.meta().axis == Axis::Cond1) {
            for column in FITTED_COLUMNS {
                if view.column(column).is_none() {
                    continue;
                }
                let results = view.fit(column, fit)?;
                let failed = results.iter().filter(|r| r.status == FitStatus::Failed).count();
                debug!(view = %view.meta().label(), column = %column, failed, "Fitted column.");
            }
        }

        if let Some(pre) = config.pre.as_ref().filter(|_| primary && view.meta().axis == Axis::Cond3) {
            let group = GroupKey::new(pre.paramagnetic.clone(), view.meta().fixed[0].1.clone());
            if !profiles.contains_key(&group) {
                let profile = profile_for_group(raw, &group)?;
                profiles.insert(group.clone(), profile);
            }
            if let Some(profile) = profiles.get(&group) {
                apply_pre(view, profile, pre)?;
            }
        }
        reporter.report(Progress::TaskIncrement { amount: 1 });
    }
    reporter.report(Progress::TaskFinish);
    reporter.phase_finish();

    info!(resonance = %cube.resonance(), views = views.len(), "Computed titration views.");
    Ok(ResonanceResult { cube, views })
}

fn compute_columns(view: &mut TitrationView, config: &AnalysisConfig) -> Result<(), EngineError> {
    let flags = &config.calculations;
    let (policy, sentinel) = (config.lost_policy, config.lost_sentinel);
    let needs_pre = config.pre.is_some() && view.meta().axis == Axis::Cond3;

    if flags.h1_delta || flags.csp {
        view.calc_cs_diff(Column::H1Delta, PeakColumn::PositionF1, policy, sentinel)?;
    }
    if flags.n15_delta || flags.csp {
        view.calc_cs_diff(Column::N15Delta, PeakColumn::PositionF2, policy, sentinel)?;
    }
    if flags.csp {
        view.calc_csp(
            Column::Csp,
            Column::H1Delta,
            Column::N15Delta,
            &config.csp,
            policy,
            sentinel,
        )?;
    }
    if flags.height_ratio || needs_pre {
        view.calc_ratio(Column::HeightRatio, PeakColumn::Height)?;
    }
    if flags.volume_ratio {
        view.calc_ratio(Column::VolumeRatio, PeakColumn::Volume)?;
    }
    Ok(())
}

fn file_stem(name: &str) -> String {
    name.replace([' ', '/'], "_")
}

/// Writes every table of `result` under `out_dir` and returns the paths
/// written.
///
/// Layout: `{resonance}/{view}/{column}.tsv`, `{column}_fit.tsv`,
/// `attributes/{column}_{step}.attr` and `steps/{step}.tsv`.
#[instrument(skip_all, name = "export_results", fields(out_dir = %out_dir.display()))]
pub fn write_outputs(result: &AnalysisResult, out_dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
    let mut written = Vec::new();
    for resonance in result.resonances() {
        let resonance_dir = out_dir.join(resonance.cube.resonance().to_string());
        for view in &resonance.views {
            let dir = resonance_dir.join(view.meta().label());
            write_view(view, &dir, &mut written)?;
        }
    }
    info!(files = written.len(), "Exported results.");
    Ok(written)
}

fn write_view(view: &TitrationView, dir: &Path, written: &mut Vec<PathBuf>) -> Result<(), ExportError> {
    let columns: Vec<Column> = view.derived_columns().collect();
    if columns.is_empty() {
        warn!(view = %view.meta().label(), "View has no derived columns to export.");
    }

    for column in &columns {
        let Some(table) = view.step_table(*column) else {
            continue;
        };
        let path = dir.join(format!("{}.tsv", file_stem(column.name())));
        export_to_path(&path, |w| write_step_table(w, &table))?;
        written.push(path);

        for (step_idx, step) in view.steps().iter().enumerate() {
            let path = dir
                .join("attributes")
                .join(format!("{}_{}.attr", file_stem(column.name()), file_stem(step)));
            export_to_path(&path, |w| {
                write_attribute_file(
                    w,
                    column.name(),
                    view.residues(),
                    table.values.row(step_idx),
                    view.step_statuses(step_idx),
                )
            })?;
            written.push(path);
        }
    }

    for column in view.fitted_columns() {
        let Some(fits) = view.fits(column) else {
            continue;
        };
        let rows: Vec<_> = fits.iter().map(|f| f.report_row()).collect();
        let path = dir.join(format!("{}_fit.tsv", file_stem(column.name())));
        export_to_path(&path, |w| write_fit_report(w, column.name(), view.context(), &rows))?;
        written.push(path);
    }

    for (step_idx, step) in view.steps().iter().enumerate() {
        let table = view.experiment_table(step_idx);
        let path = dir.join("steps").join(format!("{}.tsv", file_stem(step)));
        export_to_path(&path, |w| write_experiment_table(w, &table))?;
        written.push(path);
    }
    debug!(view = %view.meta().label(), dir = %dir.display(), "Exported view.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::dataset::load_spectra;
    use crate::core::models::peak::PeakStatus;
    use crate::engine::config::{AnalysisConfigBuilder, AxisSelection, FastaConfig, FitConfig, PreConfig};
    use std::fs;
    use tempfile::{TempDir, tempdir};

    const HEADER: &str = "Assign F1,Assign F2,Position F1,Position F2,Height,Volume\n";
    const X: [f64; 7] = [0.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0];

    fn hill(x: f64) -> f64 {
        0.2 * x / (500.0 + x)
    }

    /// Two `(z, y)` groups with seven cond1 steps each. Residue 2 binds
    /// following a Hill curve, residue 3 is lost from step 2 onwards and
    /// residue 4 only appears in the sequence.
    fn write_spectra() -> TempDir {
        let dir = tempdir().unwrap();
        for z in ["dia", "para"] {
            let group = dir.path().join("spectra").join(z).join("wt");
            fs::create_dir_all(&group).unwrap();
            fs::write(group.join("seq.fasta"), ">demo\nMKAG\n").unwrap();
            if z == "para" {
                fs::write(group.join("tag.pre"), "#1\n1 0.9\n2 0.5\n3 0.4\n4 0.3\n").unwrap();
            }
            let height_scale = if z == "para" { 0.8 } else { 1.0 };
            for (i, x) in X.iter().enumerate() {
                let mut content = HEADER.to_string();
                content.push_str(&format!("1MetH,1MetN,8.300,121.000,{},500\n", 100.0 * height_scale));
                content.push_str(&format!(
                    "2LysH,2LysN,{:.6},120.000,{},400\n",
                    8.0 + hill(*x),
                    90.0 * height_scale
                ));
                if i < 2 {
                    content.push_str(&format!("3AlaH,3AlaN,7.900,118.000,{},300\n", 80.0 * height_scale));
                }
                fs::write(group.join(format!("{i:02}.csv")), content).unwrap();
            }
        }
        dir
    }

    fn config() -> AnalysisConfig {
        AnalysisConfigBuilder::new()
            .axes(AxisSelection {
                cond1: true,
                cond2: false,
                cond3: true,
            })
            .fit(FitConfig::new(X.to_vec()))
            .fasta(FastaConfig::default())
            .pre(PreConfig::default())
            .comparisons(true)
            .build()
            .unwrap()
    }

    #[test]
    fn run_reconciles_fits_and_exports() {
        let dir = write_spectra();
        let raw = load_spectra(&dir.path().join("spectra"), None).unwrap();
        let result = run(&raw, &config(), &ProgressReporter::new()).unwrap();

        assert!(result.sidechains.is_none());
        let cube = &result.backbone.cube;
        assert_eq!(cube.shape(), (2, 1, 7, 4));

        let cond1: Vec<_> = result
            .backbone
            .views
            .iter()
            .filter(|v| v.meta().axis == Axis::Cond1)
            .collect();
        assert_eq!(cond1.len(), 2);
        let view = cond1[0];
        let status = view.status();
        assert_eq!(status[(6, 2)], PeakStatus::Lost);
        assert_eq!(status[(0, 3)], PeakStatus::Unassigned);
        assert_eq!(status[(6, 3)], PeakStatus::Unassigned);

        let fits = view.fits(Column::H1Delta).unwrap();
        assert_eq!(fits[1].status, FitStatus::Ok);
        assert!((fits[1].vmax() - 0.2).abs() / 0.2 < 0.05);
        assert!((fits[1].kd() - 500.0).abs() / 500.0 < 0.05);
        assert_eq!(fits[2].status, FitStatus::NoData);
        assert_eq!(fits[3].status, FitStatus::NoData);

        // One primary view and one dia-vs-para comparison per cond1 step.
        let cond3: Vec<_> = result
            .backbone
            .views
            .iter()
            .filter(|v| v.meta().axis == Axis::Cond3)
            .collect();
        assert_eq!(cond3.len(), 14);
        let primary = cond3.iter().find(|v| v.meta().compared.is_none()).unwrap();
        let delta = primary.column(Column::HeightDeltaPre).unwrap();
        // Residue 2: 0.5 - 0.8 clamps to zero; residue 1: 0.9 - 0.8.
        assert_eq!(delta[(1, 1)], 0.0);
        assert!((delta[(1, 0)] - 0.1).abs() < 1e-9);
        assert!(cond3.iter().any(|v| v.meta().compared.is_some()));

        let out = dir.path().join("out");
        let written = write_outputs(&result, &out).unwrap();
        assert!(written.iter().all(|p| p.exists()));
        let csp = out.join("Backbone").join("cond1_dia_wt").join("CSP.tsv");
        assert!(csp.exists());
        let fit = fs::read_to_string(out.join("Backbone").join("cond1_dia_wt").join("H1_delta_fit.tsv")).unwrap();
        assert!(fit.contains("# fitted column: H1_delta"));
        assert!(fit.contains("No Data"));
        let attr = fs::read_to_string(
            out.join("Backbone")
                .join("cond1_dia_wt")
                .join("attributes")
                .join("CSP_06.attr"),
        )
        .unwrap();
        assert!(attr.contains("# lost residues: 3"));
        assert!(attr.contains("# unassigned residues: 4"));
        assert!(out.join("Backbone").join("cond3_wt_00").join("Theo_PRE.tsv").exists());
    }

    #[test]
    fn run_aligns_groups_observing_different_residues() {
        let dir = tempdir().unwrap();
        for (y, extra) in [("wt", false), ("mut", true)] {
            let group = dir.path().join("spectra").join("dia").join(y);
            fs::create_dir_all(&group).unwrap();
            for i in 0..2 {
                let mut content = HEADER.to_string();
                content.push_str("1MetH,1MetN,8.300,121.000,100,500\n");
                if extra {
                    content.push_str("2LysH,2LysN,8.000,120.000,90,400\n");
                }
                fs::write(group.join(format!("{i:02}.csv")), content).unwrap();
            }
        }
        let raw = load_spectra(&dir.path().join("spectra"), None).unwrap();
        let result = run(&raw, &AnalysisConfig::default(), &ProgressReporter::new()).unwrap();

        assert_eq!(result.backbone.cube.shape(), (1, 2, 2, 2));
        let wt = result
            .backbone
            .views
            .iter()
            .find(|v| v.meta().label() == "cond1_dia_wt")
            .unwrap();
        assert_eq!(wt.status()[(0, 1)], PeakStatus::Unassigned);
        assert_eq!(wt.status()[(1, 1)], PeakStatus::Unassigned);
        let mutant = result
            .backbone
            .views
            .iter()
            .find(|v| v.meta().label() == "cond1_dia_mut")
            .unwrap();
        assert_eq!(mutant.status()[(1, 1)], PeakStatus::Measured);
    }

    #[test]
    fn run_rejects_mismatched_fit_x_values() {
        let dir = write_spectra();
        let raw = load_spectra(&dir.path().join("spectra"), None).unwrap();
        let config = AnalysisConfigBuilder::new()
            .fit(FitConfig::new(vec![0.0, 1.0]))
            .build()
            .unwrap();
        assert!(matches!(
            run(&raw, &config, &ProgressReporter::new()),
            Err(EngineError::FitInputMismatch { expected: 7, found: 2 })
        ));
    }

    #[test]
    fn run_stops_on_incomplete_dataset() {
        let dir = write_spectra();
        fs::remove_file(dir.path().join("spectra/para/wt/03.csv")).unwrap();
        let raw = load_spectra(&dir.path().join("spectra"), None).unwrap();
        let err = run(&raw, &AnalysisConfig::default(), &ProgressReporter::new()).unwrap_err();
        assert!(matches!(err, EngineError::Incomplete { found: 13, expected: 14, .. }));
        assert!(err.to_string().contains("(para, wt, 03)"));
    }

    #[test]
    fn run_requires_pre_file_for_paramagnetic_group() {
        let dir = write_spectra();
        fs::remove_file(dir.path().join("spectra/para/wt/tag.pre")).unwrap();
        let raw = load_spectra(&dir.path().join("spectra"), None).unwrap();
        assert!(matches!(
            run(&raw, &config(), &ProgressReporter::new()),
            Err(EngineError::MissingPreFile { .. })
        ));
    }
}
