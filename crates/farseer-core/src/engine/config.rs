use crate::core::models::conditions::{Axis, ConditionKeys};
use crate::core::models::residue::AminoAcid;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

/// How chemical-shift differences are filled for rows that are `lost`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LostPolicy {
    /// Force the difference to a saturating sentinel value.
    Full,
    /// Carry the previous step's difference forward.
    #[default]
    Prev,
    /// Force the difference to zero.
    Zero,
}

impl LostPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LostPolicy::Full => "full",
            LostPolicy::Prev => "prev",
            LostPolicy::Zero => "zero",
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid lost policy: '{0}'. Expected 'full', 'prev' or 'zero'.")]
pub struct ParseLostPolicyError(String);

impl FromStr for LostPolicy {
    type Err = ParseLostPolicyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(LostPolicy::Full),
            "prev" => Ok(LostPolicy::Prev),
            "zero" => Ok(LostPolicy::Zero),
            _ => Err(ParseLostPolicyError(s.to_string())),
        }
    }
}

impl fmt::Display for LostPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-residue-type weighting of the F2 (heteronuclear) dimension in the
/// combined chemical-shift perturbation.
#[derive(Debug, Clone, PartialEq)]
pub struct CspWeights {
    pub default_alpha: f64,
    pub overrides: HashMap<AminoAcid, f64>,
}

impl CspWeights {
    pub const DEFAULT_ALPHA: f64 = 0.14;
    pub const GLYCINE_ALPHA: f64 = 0.2;

    pub fn alpha(&self, residue_type: AminoAcid) -> f64 {
        self.overrides
            .get(&residue_type)
            .copied()
            .unwrap_or(self.default_alpha)
    }

    pub fn with_override(mut self, residue_type: AminoAcid, alpha: f64) -> Self {
        self.overrides.insert(residue_type, alpha);
        self
    }
}

impl Default for CspWeights {
    fn default() -> Self {
        Self {
            default_alpha: Self::DEFAULT_ALPHA,
            overrides: HashMap::from([(AminoAcid::Glycine, Self::GLYCINE_ALPHA)]),
        }
    }
}

/// Which derived columns are computed on every view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalculationFlags {
    pub h1_delta: bool,
    pub n15_delta: bool,
    pub csp: bool,
    pub height_ratio: bool,
    pub volume_ratio: bool,
}

impl Default for CalculationFlags {
    fn default() -> Self {
        Self {
            h1_delta: true,
            n15_delta: true,
            csp: true,
            height_ratio: true,
            volume_ratio: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSelection {
    pub cond1: bool,
    pub cond2: bool,
    pub cond3: bool,
}

impl AxisSelection {
    pub fn contains(&self, axis: Axis) -> bool {
        match axis {
            Axis::Cond1 => self.cond1,
            Axis::Cond2 => self.cond2,
            Axis::Cond3 => self.cond3,
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = Axis> + '_ {
        Axis::ALL.into_iter().filter(move |&a| self.contains(a))
    }
}

impl Default for AxisSelection {
    fn default() -> Self {
        Self {
            cond1: true,
            cond2: false,
            cond3: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    /// Titrant value of each cond1 step, in step order.
    pub x_values: Vec<f64>,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl FitConfig {
    pub const DEFAULT_MAX_ITERATIONS: usize = 800;
    pub const DEFAULT_TOLERANCE: f64 = 1e-10;

    pub fn new(x_values: Vec<f64>) -> Self {
        Self {
            x_values,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            tolerance: Self::DEFAULT_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianParams {
    pub stddev: f64,
    /// Kernel length in residues; must be odd.
    pub window: usize,
}

impl Default for GaussianParams {
    fn default() -> Self {
        Self {
            stddev: 1.0,
            window: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreConfig {
    /// cond3 label of the paramagnetic experiments.
    pub paramagnetic: String,
    /// cond3 label of the diamagnetic experiments.
    pub diamagnetic: String,
    pub gaussian: GaussianParams,
}

impl Default for PreConfig {
    fn default() -> Self {
        Self {
            paramagnetic: "para".to_string(),
            diamagnetic: "dia".to_string(),
            gaussian: GaussianParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastaConfig {
    /// Residue number of the first sequence position.
    pub start: isize,
}

impl Default for FastaConfig {
    fn default() -> Self {
        Self { start: 1 }
    }
}

/// Cross-dimension expansion of lost residues between `(z, y)` groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpansionConfig {
    pub along_y: bool,
    pub along_z: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub conditions: Option<ConditionKeys>,
    pub axes: AxisSelection,
    pub calculations: CalculationFlags,
    pub csp: CspWeights,
    pub lost_policy: LostPolicy,
    pub lost_sentinel: f64,
    pub fit: Option<FitConfig>,
    pub pre: Option<PreConfig>,
    pub fasta: Option<FastaConfig>,
    pub expansion: ExpansionConfig,
    /// Residue number used for internal chemical-shift referencing.
    pub cs_reference: Option<isize>,
    pub use_sidechains: bool,
    pub comparisons: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            conditions: None,
            axes: AxisSelection::default(),
            calculations: CalculationFlags::default(),
            csp: CspWeights::default(),
            lost_policy: LostPolicy::default(),
            lost_sentinel: AnalysisConfig::DEFAULT_LOST_SENTINEL,
            fit: None,
            pre: None,
            fasta: None,
            expansion: ExpansionConfig::default(),
            cs_reference: None,
            use_sidechains: false,
            comparisons: false,
        }
    }
}

impl AnalysisConfig {
    pub const DEFAULT_LOST_SENTINEL: f64 = 1.0;
}

#[derive(Default)]
pub struct AnalysisConfigBuilder {
    conditions: Option<ConditionKeys>,
    axes: Option<AxisSelection>,
    calculations: Option<CalculationFlags>,
    csp: Option<CspWeights>,
    lost_policy: Option<LostPolicy>,
    lost_sentinel: Option<f64>,
    fit: Option<FitConfig>,
    pre: Option<PreConfig>,
    fasta: Option<FastaConfig>,
    expansion: Option<ExpansionConfig>,
    cs_reference: Option<isize>,
    use_sidechains: Option<bool>,
    comparisons: Option<bool>,
}

impl AnalysisConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conditions(mut self, keys: ConditionKeys) -> Self {
        self.conditions = Some(keys);
        self
    }
    pub fn axes(mut self, axes: AxisSelection) -> Self {
        self.axes = Some(axes);
        self
    }
    pub fn calculations(mut self, flags: CalculationFlags) -> Self {
        self.calculations = Some(flags);
        self
    }
    pub fn csp(mut self, weights: CspWeights) -> Self {
        self.csp = Some(weights);
        self
    }
    pub fn lost_policy(mut self, policy: LostPolicy) -> Self {
        self.lost_policy = Some(policy);
        self
    }
    pub fn lost_sentinel(mut self, value: f64) -> Self {
        self.lost_sentinel = Some(value);
        self
    }
    pub fn fit(mut self, fit: FitConfig) -> Self {
        self.fit = Some(fit);
        self
    }
    pub fn pre(mut self, pre: PreConfig) -> Self {
        self.pre = Some(pre);
        self
    }
    pub fn fasta(mut self, fasta: FastaConfig) -> Self {
        self.fasta = Some(fasta);
        self
    }
    pub fn expansion(mut self, expansion: ExpansionConfig) -> Self {
        self.expansion = Some(expansion);
        self
    }
    pub fn cs_reference(mut self, residue_number: isize) -> Self {
        self.cs_reference = Some(residue_number);
        self
    }
    pub fn use_sidechains(mut self, enabled: bool) -> Self {
        self.use_sidechains = Some(enabled);
        self
    }
    pub fn comparisons(mut self, enabled: bool) -> Self {
        self.comparisons = Some(enabled);
        self
    }

    pub fn build(self) -> Result<AnalysisConfig, ConfigError> {
        let csp = self.csp.unwrap_or_default();
        if !(csp.default_alpha.is_finite() && csp.default_alpha > 0.0) {
            return Err(invalid("csp.default_alpha", "must be a positive number"));
        }
        if let Some((aa, _)) = csp
            .overrides
            .iter()
            .find(|(_, a)| !(a.is_finite() && **a > 0.0))
        {
            return Err(invalid("csp.alpha", format!("override for {aa} must be a positive number")));
        }

        let lost_sentinel = self
            .lost_sentinel
            .unwrap_or(AnalysisConfig::DEFAULT_LOST_SENTINEL);
        if !lost_sentinel.is_finite() {
            return Err(invalid("lost_sentinel", "must be finite"));
        }

        if let Some(fit) = &self.fit {
            if fit.x_values.is_empty() {
                return Err(ConfigError::MissingParameter("fit.x_values"));
            }
            if fit.x_values.iter().any(|x| !x.is_finite() || *x < 0.0) {
                return Err(invalid("fit.x_values", "must be finite and non-negative"));
            }
            if fit.max_iterations == 0 {
                return Err(invalid("fit.max_iterations", "must be at least 1"));
            }
        }

        if let Some(pre) = &self.pre {
            if pre.paramagnetic == pre.diamagnetic {
                return Err(invalid(
                    "pre.paramagnetic",
                    "paramagnetic and diamagnetic labels must differ",
                ));
            }
            if pre.gaussian.window == 0 || pre.gaussian.window % 2 == 0 {
                return Err(invalid("pre.gaussian.window", "must be a positive odd number"));
            }
            if !(pre.gaussian.stddev.is_finite() && pre.gaussian.stddev > 0.0) {
                return Err(invalid("pre.gaussian.stddev", "must be a positive number"));
            }
        }

        let axes = self.axes.unwrap_or_default();
        if axes.enabled().next().is_none() {
            return Err(ConfigError::MissingParameter("axes"));
        }
        if self.pre.is_some() && !axes.cond3 {
            return Err(invalid("pre", "PRE analysis runs on cond3 views; enable the cond3 axis"));
        }

        Ok(AnalysisConfig {
            conditions: self.conditions,
            axes,
            calculations: self.calculations.unwrap_or_default(),
            csp,
            lost_policy: self.lost_policy.unwrap_or_default(),
            lost_sentinel,
            fit: self.fit,
            pre: self.pre,
            fasta: self.fasta,
            expansion: self.expansion.unwrap_or_default(),
            cs_reference: self.cs_reference,
            use_sidechains: self.use_sidechains.unwrap_or(false),
            comparisons: self.comparisons.unwrap_or(false),
        })
    }
}
