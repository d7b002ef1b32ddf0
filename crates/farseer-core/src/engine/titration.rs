use super::config::{CspWeights, FitConfig, LostPolicy};
use super::error::EngineError;
use super::fitting::{FitResult, fit_column};
use crate::core::io::export::{ExperimentTable, HeaderContext, StepTable};
use crate::core::models::conditions::{Axis, ResonanceType};
use crate::core::models::peak::{PeakColumn, PeakStatus, ResidueAnnotation};
use crate::core::models::residue::ResidueKey;
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis as ArrayAxis, s};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Columns a view exposes: the raw peak columns plus everything derived
/// from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Raw(PeakColumn),
    H1Delta,
    N15Delta,
    Csp,
    HeightRatio,
    VolumeRatio,
    TheoreticalPre,
    HeightDeltaPre,
    VolumeDeltaPre,
    HeightDeltaPreSmooth,
    VolumeDeltaPreSmooth,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Raw(c) => c.name(),
            Column::H1Delta => "H1_delta",
            Column::N15Delta => "N15_delta",
            Column::Csp => "CSP",
            Column::HeightRatio => "Height_ratio",
            Column::VolumeRatio => "Vol_ratio",
            Column::TheoreticalPre => "Theo PRE",
            Column::HeightDeltaPre => "Hgt_DPRE",
            Column::VolumeDeltaPre => "Vol_DPRE",
            Column::HeightDeltaPreSmooth => "Hgt_DPRE_smooth",
            Column::VolumeDeltaPreSmooth => "Vol_DPRE_smooth",
        }
    }

    /// Chemical-shift-derived columns, the only ones eligible for fitting.
    pub fn is_chemical_shift(&self) -> bool {
        matches!(self, Column::H1Delta | Column::N15Delta | Column::Csp)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewMeta {
    pub axis: Axis,
    /// Labels of the two fixed axes, outermost first.
    pub fixed: [(Axis, String); 2],
    pub resonance: ResonanceType,
    /// The two steps of a comparison view.
    pub compared: Option<(String, String)>,
}

impl ViewMeta {
    /// A file-name friendly identifier, e.g. `cond1_dia_wt`.
    pub fn label(&self) -> String {
        let mut label = format!("{}_{}_{}", self.axis, self.fixed[0].1, self.fixed[1].1);
        if let Some((a, b)) = &self.compared {
            label.push_str(&format!("_{a}_vs_{b}"));
        }
        label
    }

    pub fn context(&self) -> HeaderContext {
        let mut context = vec![("observed axis".to_string(), self.axis.to_string())];
        for (axis, value) in &self.fixed {
            context.push((format!("fixed {axis}"), value.clone()));
        }
        context.push(("resonance".to_string(), self.resonance.to_string()));
        if let Some((a, b)) = &self.compared {
            context.push(("compared".to_string(), format!("{a} vs {b}")));
        }
        context
    }
}

/// The experiments along one axis of the cube, with the other two axes
/// held fixed, plus every column derived from them.
#[derive(Debug, Clone)]
pub struct TitrationView {
    meta: ViewMeta,
    context: HeaderContext,
    residues: Vec<ResidueAnnotation>,
    steps: Vec<String>,
    /// Shape `(steps, residues, PeakColumn::ALL.len())`.
    observations: Array3<f64>,
    /// Shape `(steps, residues)`.
    status: Array2<PeakStatus>,
    derived: BTreeMap<Column, Array2<f64>>,
    fits: BTreeMap<Column, Vec<FitResult>>,
}

impl TitrationView {
    pub fn new(
        meta: ViewMeta,
        residues: Vec<ResidueAnnotation>,
        steps: Vec<String>,
        observations: Array3<f64>,
        status: Array2<PeakStatus>,
    ) -> Result<Self, EngineError> {
        let expected = (steps.len(), residues.len());
        if observations.dim() != (expected.0, expected.1, PeakColumn::ALL.len())
            || status.dim() != expected
        {
            return Err(EngineError::Internal(format!(
                "view {} has inconsistent array shapes",
                meta.label()
            )));
        }
        let context = meta.context();
        Ok(Self {
            meta,
            context,
            residues,
            steps,
            observations,
            status,
            derived: BTreeMap::new(),
            fits: BTreeMap::new(),
        })
    }

    pub fn meta(&self) -> &ViewMeta {
        &self.meta
    }

    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    pub fn residues(&self) -> &[ResidueAnnotation] {
        &self.residues
    }

    pub fn residue_keys(&self) -> Vec<ResidueKey> {
        self.residues.iter().map(|r| r.residue).collect()
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn status(&self) -> ArrayView2<'_, PeakStatus> {
        self.status.view()
    }

    /// Values of `column` with shape `(steps, residues)`, if available.
    pub fn column(&self, column: Column) -> Option<ArrayView2<'_, f64>> {
        match column {
            Column::Raw(c) => Some(self.observations.index_axis(ArrayAxis(2), c.index())),
            other => self.derived.get(&other).map(Array2::view),
        }
    }

    fn require(&self, column: Column) -> Result<ArrayView2<'_, f64>, EngineError> {
        self.column(column)
            .ok_or_else(|| EngineError::MissingColumn(column.name().to_string()))
    }

    pub fn derived_columns(&self) -> impl Iterator<Item = Column> + '_ {
        self.derived.keys().copied()
    }

    pub fn set_column(&mut self, column: Column, values: Array2<f64>) -> Result<(), EngineError> {
        if matches!(column, Column::Raw(_)) || values.dim() != self.status.dim() {
            return Err(EngineError::Internal(format!(
                "cannot store {column} with shape {:?} on view {}",
                values.dim(),
                self.meta.label()
            )));
        }
        self.derived.insert(column, values);
        Ok(())
    }

    /// Replaces the value of every `lost` cell according to `policy`.
    fn apply_lost_policy(&self, values: &mut Array2<f64>, policy: LostPolicy, sentinel: f64) {
        let (n_steps, n_res) = values.dim();
        for r in 0..n_res {
            for i in 0..n_steps {
                if self.status[(i, r)] != PeakStatus::Lost {
                    continue;
                }
                values[(i, r)] = match policy {
                    LostPolicy::Full => sentinel,
                    LostPolicy::Zero => 0.0,
                    LostPolicy::Prev if i == 0 => f64::NAN,
                    LostPolicy::Prev => values[(i - 1, r)],
                };
            }
        }
    }

    /// `target = source(step) - source(step 0)`, with lost cells filled by
    /// `policy`.
    pub fn calc_cs_diff(
        &mut self,
        target: Column,
        source: PeakColumn,
        policy: LostPolicy,
        sentinel: f64,
    ) -> Result<(), EngineError> {
        let src = self.require(Column::Raw(source))?;
        let reference = src.row(0).to_owned();
        let mut values = &src - &reference.insert_axis(ArrayAxis(0));
        self.apply_lost_policy(&mut values, policy, sentinel);
        debug!(view = %self.meta.label(), column = %target, policy = %policy, "Computed chemical-shift difference.");
        self.set_column(target, values)
    }

    /// `target = source(step) / source(step 0)`; NaN propagates.
    pub fn calc_ratio(&mut self, target: Column, source: PeakColumn) -> Result<(), EngineError> {
        let src = self.require(Column::Raw(source))?;
        let reference = src.row(0).to_owned();
        let values = &src / &reference.insert_axis(ArrayAxis(0));
        debug!(view = %self.meta.label(), column = %target, "Computed intensity ratio.");
        self.set_column(target, values)
    }

    /// Combined perturbation `sqrt(0.5 * (d1² + (alpha · d2)²))` from two
    /// chemical-shift difference columns.
    pub fn calc_csp(
        &mut self,
        target: Column,
        pos1: Column,
        pos2: Column,
        weights: &CspWeights,
        policy: LostPolicy,
        sentinel: f64,
    ) -> Result<(), EngineError> {
        let d1 = self.require(pos1)?;
        let d2 = self.require(pos2)?;
        let alphas: Vec<f64> = self
            .residues
            .iter()
            .map(|r| weights.alpha(r.residue_type))
            .collect();

        let mut values = Array2::<f64>::zeros(d1.dim());
        for ((i, r), v) in values.indexed_iter_mut() {
            let a = d1[(i, r)];
            let b = alphas[r] * d2[(i, r)];
            *v = (0.5 * (a * a + b * b)).sqrt();
        }
        self.apply_lost_policy(&mut values, policy, sentinel);
        debug!(view = %self.meta.label(), column = %target, "Computed combined chemical-shift perturbation.");
        self.set_column(target, values)
    }

    /// Fits every residue of a chemical-shift column against `config.x_values`.
    ///
    /// Only cond1 views of chemical-shift columns can be fitted.
    pub fn fit(&mut self, column: Column, config: &FitConfig) -> Result<&[FitResult], EngineError> {
        if self.meta.axis != Axis::Cond1 || !column.is_chemical_shift() {
            return Err(EngineError::FitNotApplicable {
                column: column.name().to_string(),
                axis: self.meta.axis,
            });
        }
        if config.x_values.len() != self.steps.len() {
            return Err(EngineError::FitInputMismatch {
                expected: self.steps.len(),
                found: config.x_values.len(),
            });
        }
        let values = self.require(column)?;
        let results = fit_column(
            &self.residue_keys(),
            &config.x_values,
            values,
            self.status.view(),
            config,
        );
        let entry = self.fits.entry(column).or_default();
        *entry = results;
        Ok(entry.as_slice())
    }

    pub fn fits(&self, column: Column) -> Option<&[FitResult]> {
        self.fits.get(&column).map(Vec::as_slice)
    }

    pub fn fitted_columns(&self) -> impl Iterator<Item = Column> + '_ {
        self.fits.keys().copied()
    }

    fn step_index(&self, label: &str) -> Result<usize, EngineError> {
        self.steps
            .iter()
            .position(|s| s == label)
            .ok_or_else(|| EngineError::UnknownStep {
                axis: self.meta.axis,
                label: label.to_string(),
            })
    }

    fn select_steps(&self, indices: &[usize]) -> (Array3<f64>, Array2<PeakStatus>) {
        (
            self.observations.select(ArrayAxis(0), indices),
            self.status.select(ArrayAxis(0), indices),
        )
    }

    /// A two-step view comparing step `a` (as reference) with step `b`.
    ///
    /// Derived columns are not carried over; they must be recomputed
    /// against the new reference.
    pub fn compare(&self, a: &str, b: &str) -> Result<TitrationView, EngineError> {
        let indices = [self.step_index(a)?, self.step_index(b)?];
        let (observations, status) = self.select_steps(&indices);
        let meta = ViewMeta {
            compared: Some((a.to_string(), b.to_string())),
            ..self.meta.clone()
        };
        TitrationView::new(
            meta,
            self.residues.clone(),
            vec![a.to_string(), b.to_string()],
            observations,
            status,
        )
    }

    /// Reorders the steps. `order` must be a permutation of the current
    /// step labels.
    ///
    /// Derived columns and fits are discarded: they are relative to the
    /// first step and must be recomputed on the new order.
    pub fn reorder_steps(&mut self, order: &[String]) -> Result<(), EngineError> {
        let indices = order
            .iter()
            .map(|label| self.step_index(label))
            .collect::<Result<Vec<_>, _>>()?;
        let mut seen = indices.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.steps.len() || indices.len() != self.steps.len() {
            return Err(EngineError::Internal(format!(
                "step order {order:?} is not a permutation of {:?}",
                self.steps
            )));
        }

        let (observations, status) = self.select_steps(&indices);
        self.observations = observations;
        self.status = status;
        self.steps = order.to_vec();
        self.derived.clear();
        self.fits.clear();
        debug!(view = %self.meta.label(), steps = ?self.steps, "Reordered steps.");
        Ok(())
    }

    pub fn step_table(&self, column: Column) -> Option<StepTable<'_>> {
        self.column(column).map(|values| StepTable {
            column: column.name(),
            context: &self.context,
            residues: &self.residues,
            steps: &self.steps,
            values,
        })
    }

    pub fn step_statuses(&self, step: usize) -> ArrayView1<'_, PeakStatus> {
        self.status.row(step)
    }

    /// Every raw and derived column of one step.
    pub fn experiment_table(&self, step: usize) -> ExperimentTable<'_> {
        let mut columns: Vec<(&str, ArrayView1<'_, f64>)> = PeakColumn::ALL
            .iter()
            .map(|&c| (c.name(), self.observations.slice(s![step, .., c.index()])))
            .collect();
        columns.extend(
            self.derived
                .iter()
                .map(|(column, values)| (column.name(), values.row(step))),
        );
        ExperimentTable {
            context: &self.context,
            residues: &self.residues,
            statuses: self.status.row(step),
            columns,
        }
    }
}
