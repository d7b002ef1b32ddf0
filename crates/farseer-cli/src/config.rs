use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use farseer::core::models::conditions::ConditionKeys;
use farseer::core::models::residue::AminoAcid;
use farseer::engine::config as core_config;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialConditions {
    cond1: Vec<String>,
    cond2: Vec<String>,
    cond3: Vec<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialAxes {
    cond1: Option<bool>,
    cond2: Option<bool>,
    cond3: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialCalculations {
    h1_delta: Option<bool>,
    n15_delta: Option<bool>,
    csp: Option<bool>,
    height_ratio: Option<bool>,
    volume_ratio: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialCsp {
    default_alpha: Option<f64>,
    /// Per-residue-type overrides keyed by one- or three-letter code.
    #[serde(default)]
    alpha: BTreeMap<String, f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialFit {
    x_values: Option<Vec<f64>>,
    max_iterations: Option<usize>,
    tolerance: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialPre {
    paramagnetic: Option<String>,
    diamagnetic: Option<String>,
    gaussian_stddev: Option<f64>,
    gaussian_window: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialFasta {
    start: Option<isize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialExpansion {
    along_y: Option<bool>,
    along_z: Option<bool>,
}

/// Analysis settings as written in a TOML file; every section is optional
/// and the `fit`, `pre` and `fasta` analyses are enabled by the presence of
/// their section.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PartialAnalysisConfig {
    conditions: Option<PartialConditions>,
    axes: Option<PartialAxes>,
    calculations: Option<PartialCalculations>,
    csp: Option<PartialCsp>,
    lost_policy: Option<String>,
    lost_sentinel: Option<f64>,
    fit: Option<PartialFit>,
    pre: Option<PartialPre>,
    fasta: Option<PartialFasta>,
    expansion: Option<PartialExpansion>,
    cs_reference: Option<isize>,
    use_sidechains: Option<bool>,
    comparisons: Option<bool>,
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: '{}'", key, value)))
}

impl PartialAnalysisConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Reads `path` when given, otherwise starts from the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        path.map(Self::from_file).transpose().map(Option::unwrap_or_default)
    }

    /// Applies `--set` values and command-line flags, then validates.
    pub fn merge_with_cli(mut self, args: &RunArgs) -> Result<core_config::AnalysisConfig> {
        self.apply_set_values(&args.set_values)?;

        if let Some(x_values) = &args.fit_x {
            self.fit.get_or_insert_with(Default::default).x_values = Some(x_values.clone());
        }
        if let Some(policy) = args.lost_policy {
            self.lost_policy = Some(policy.to_string());
        }
        if args.sidechains {
            self.use_sidechains = Some(true);
        }
        if args.compare {
            self.comparisons = Some(true);
        }

        self.into_config()
    }

    pub fn into_config(self) -> Result<core_config::AnalysisConfig> {
        let mut builder = core_config::AnalysisConfigBuilder::new();

        if let Some(c) = self.conditions {
            builder = builder.conditions(ConditionKeys::new(c.cond3, c.cond2, c.cond1));
        }
        if let Some(axes) = self.axes {
            let defaults = core_config::AxisSelection::default();
            builder = builder.axes(core_config::AxisSelection {
                cond1: axes.cond1.unwrap_or(defaults.cond1),
                cond2: axes.cond2.unwrap_or(defaults.cond2),
                cond3: axes.cond3.unwrap_or(defaults.cond3),
            });
        }
        if let Some(calc) = self.calculations {
            let defaults = core_config::CalculationFlags::default();
            builder = builder.calculations(core_config::CalculationFlags {
                h1_delta: calc.h1_delta.unwrap_or(defaults.h1_delta),
                n15_delta: calc.n15_delta.unwrap_or(defaults.n15_delta),
                csp: calc.csp.unwrap_or(defaults.csp),
                height_ratio: calc.height_ratio.unwrap_or(defaults.height_ratio),
                volume_ratio: calc.volume_ratio.unwrap_or(defaults.volume_ratio),
            });
        }
        if let Some(csp) = self.csp {
            builder = builder.csp(Self::merge_csp(csp)?);
        }
        if let Some(policy) = self.lost_policy {
            let policy = core_config::LostPolicy::from_str(&policy)
                .map_err(|e| CliError::Config(e.to_string()))?;
            builder = builder.lost_policy(policy);
        }
        if let Some(sentinel) = self.lost_sentinel {
            builder = builder.lost_sentinel(sentinel);
        }
        if let Some(fit) = self.fit {
            let mut config = core_config::FitConfig::new(fit.x_values.unwrap_or_default());
            config.max_iterations = fit.max_iterations.unwrap_or(config.max_iterations);
            config.tolerance = fit.tolerance.unwrap_or(config.tolerance);
            builder = builder.fit(config);
        }
        if let Some(pre) = self.pre {
            let defaults = core_config::PreConfig::default();
            builder = builder.pre(core_config::PreConfig {
                paramagnetic: pre.paramagnetic.unwrap_or(defaults.paramagnetic),
                diamagnetic: pre.diamagnetic.unwrap_or(defaults.diamagnetic),
                gaussian: core_config::GaussianParams {
                    stddev: pre.gaussian_stddev.unwrap_or(defaults.gaussian.stddev),
                    window: pre.gaussian_window.unwrap_or(defaults.gaussian.window),
                },
            });
        }
        if let Some(fasta) = self.fasta {
            let start = fasta
                .start
                .unwrap_or(core_config::FastaConfig::default().start);
            builder = builder.fasta(core_config::FastaConfig { start });
        }
        if let Some(expansion) = self.expansion {
            builder = builder.expansion(core_config::ExpansionConfig {
                along_y: expansion.along_y.unwrap_or(false),
                along_z: expansion.along_z.unwrap_or(false),
            });
        }
        if let Some(residue) = self.cs_reference {
            builder = builder.cs_reference(residue);
        }
        if let Some(enabled) = self.use_sidechains {
            builder = builder.use_sidechains(enabled);
        }
        if let Some(enabled) = self.comparisons {
            builder = builder.comparisons(enabled);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn merge_csp(partial: PartialCsp) -> Result<core_config::CspWeights> {
        let mut weights = core_config::CspWeights::default();
        if let Some(alpha) = partial.default_alpha {
            weights.default_alpha = alpha;
        }
        for (code, alpha) in partial.alpha {
            let residue_type = AminoAcid::from_str(&code)
                .map_err(|e| CliError::Config(format!("csp.alpha: {}", e)))?;
            weights = weights.with_override(residue_type, alpha);
        }
        Ok(weights)
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };
            let key = key.trim();

            if let Some(code) = key.strip_prefix("csp.alpha.") {
                self.csp
                    .get_or_insert_with(Default::default)
                    .alpha
                    .insert(code.to_string(), parse_value(key, value)?);
                continue;
            }

            match key {
                "lost-policy" => self.lost_policy = Some(value.trim().to_string()),
                "lost-sentinel" => self.lost_sentinel = Some(parse_value(key, value)?),
                "cs-reference" => self.cs_reference = Some(parse_value(key, value)?),
                "use-sidechains" => self.use_sidechains = Some(parse_value(key, value)?),
                "comparisons" => self.comparisons = Some(parse_value(key, value)?),
                "axes.cond1" | "axes.cond2" | "axes.cond3" => {
                    let axes = self.axes.get_or_insert_with(Default::default);
                    let enabled = Some(parse_value(key, value)?);
                    match key {
                        "axes.cond1" => axes.cond1 = enabled,
                        "axes.cond2" => axes.cond2 = enabled,
                        _ => axes.cond3 = enabled,
                    }
                }
                "calculations.h1-delta"
                | "calculations.n15-delta"
                | "calculations.csp"
                | "calculations.height-ratio"
                | "calculations.volume-ratio" => {
                    let calc = self.calculations.get_or_insert_with(Default::default);
                    let enabled = Some(parse_value(key, value)?);
                    match key {
                        "calculations.h1-delta" => calc.h1_delta = enabled,
                        "calculations.n15-delta" => calc.n15_delta = enabled,
                        "calculations.csp" => calc.csp = enabled,
                        "calculations.height-ratio" => calc.height_ratio = enabled,
                        _ => calc.volume_ratio = enabled,
                    }
                }
                "csp.default-alpha" => {
                    self.csp.get_or_insert_with(Default::default).default_alpha =
                        Some(parse_value(key, value)?);
                }
                "fit.max-iterations" => {
                    self.fit.get_or_insert_with(Default::default).max_iterations =
                        Some(parse_value(key, value)?);
                }
                "fit.tolerance" => {
                    self.fit.get_or_insert_with(Default::default).tolerance =
                        Some(parse_value(key, value)?);
                }
                "fasta.start" => {
                    self.fasta.get_or_insert_with(Default::default).start =
                        Some(parse_value(key, value)?);
                }
                "pre.paramagnetic" => {
                    self.pre.get_or_insert_with(Default::default).paramagnetic =
                        Some(value.trim().to_string());
                }
                "pre.diamagnetic" => {
                    self.pre.get_or_insert_with(Default::default).diamagnetic =
                        Some(value.trim().to_string());
                }
                "pre.gaussian-stddev" => {
                    self.pre.get_or_insert_with(Default::default).gaussian_stddev =
                        Some(parse_value(key, value)?);
                }
                "pre.gaussian-window" => {
                    self.pre.get_or_insert_with(Default::default).gaussian_window =
                        Some(parse_value(key, value)?);
                }
                "expansion.along-y" => {
                    self.expansion.get_or_insert_with(Default::default).along_y =
                        Some(parse_value(key, value)?);
                }
                "expansion.along-z" => {
                    self.expansion.get_or_insert_with(Default::default).along_z =
                        Some(parse_value(key, value)?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use farseer::core::models::conditions::Axis;
    use once_cell::sync::Lazy;
    use std::fs;
    use tempfile::tempdir;

    static FULL_CONFIG: Lazy<String> = Lazy::new(|| {
        r#"
lost-policy = "full"
lost-sentinel = 2.0
cs-reference = 12
use-sidechains = true

[conditions]
cond1 = ["0", "125", "250"]
cond2 = ["wt"]
cond3 = ["dia", "para"]

[axes]
cond1 = true
cond3 = true

[calculations]
volume-ratio = false

[csp]
default-alpha = 0.15
alpha = { Gly = 0.25, P = 0.3 }

[fit]
x-values = [0.0, 125.0, 250.0]
max-iterations = 400

[pre]
gaussian-window = 5

[fasta]
start = 3

[expansion]
along-z = true
"#
        .to_string()
    });

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["farseer", "run"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
            Commands::Check(_) => unreachable!(),
        }
    }

    fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("farseer.toml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = PartialAnalysisConfig::load(None).unwrap().into_config().unwrap();
        assert_eq!(config, core_config::AnalysisConfig::default());
    }

    #[test]
    fn full_file_is_translated_into_analysis_config() {
        let (_dir, path) = write_config(&FULL_CONFIG);
        let config = PartialAnalysisConfig::from_file(&path)
            .unwrap()
            .into_config()
            .unwrap();

        let keys = config.conditions.as_ref().unwrap();
        assert_eq!(keys.z(), &["dia".to_string(), "para".to_string()]);
        assert_eq!(keys.x().len(), 3);
        assert_eq!(
            config.axes.enabled().collect::<Vec<_>>(),
            vec![Axis::Cond1, Axis::Cond3]
        );
        assert!(!config.calculations.volume_ratio);
        assert!(config.calculations.csp);
        assert_eq!(config.csp.default_alpha, 0.15);
        assert_eq!(config.csp.alpha(AminoAcid::Glycine), 0.25);
        assert_eq!(config.csp.alpha(AminoAcid::Proline), 0.3);
        assert_eq!(config.lost_policy, core_config::LostPolicy::Full);
        assert_eq!(config.lost_sentinel, 2.0);
        let fit = config.fit.as_ref().unwrap();
        assert_eq!(fit.max_iterations, 400);
        assert_eq!(fit.x_values, vec![0.0, 125.0, 250.0]);
        let pre = config.pre.as_ref().unwrap();
        assert_eq!(pre.gaussian.window, 5);
        assert_eq!(pre.paramagnetic, "para");
        assert_eq!(config.fasta.unwrap().start, 3);
        assert!(config.expansion.along_z && !config.expansion.along_y);
        assert_eq!(config.cs_reference, Some(12));
        assert!(config.use_sidechains);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let (_dir, path) = write_config("[fit]\nx-vals = [1.0]\n");
        assert!(matches!(
            PartialAnalysisConfig::from_file(&path),
            Err(CliError::FileParsing { .. })
        ));
    }

    #[test]
    fn cli_flags_and_set_values_override_the_file() {
        let (_dir, path) = write_config(&FULL_CONFIG);
        let args = run_args(&[
            "--fit-x",
            "0,50,100",
            "--lost-policy",
            "zero",
            "--compare",
            "-S",
            "fit.max-iterations=50",
            "csp.alpha.Ala=0.5",
            "pre.diamagnetic=apo",
            "axes.cond2=true",
        ]);
        let config = PartialAnalysisConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&args)
            .unwrap();

        let fit = config.fit.as_ref().unwrap();
        assert_eq!(fit.x_values, vec![0.0, 50.0, 100.0]);
        assert_eq!(fit.max_iterations, 50);
        assert_eq!(config.lost_policy, core_config::LostPolicy::Zero);
        assert!(config.comparisons);
        assert_eq!(config.csp.alpha(AminoAcid::Alanine), 0.5);
        assert_eq!(config.pre.as_ref().unwrap().diamagnetic, "apo");
        assert!(config.axes.cond2);
    }

    #[test]
    fn invalid_set_values_are_reported() {
        let mut partial = PartialAnalysisConfig::default();
        assert!(partial.apply_set_values(&["fit.max-iterations".into()]).is_err());
        assert!(partial.apply_set_values(&["fit.max-iterations=many".into()]).is_err());
        assert!(partial.apply_set_values(&["optimization.num-solutions=2".into()]).is_err());
    }

    #[test]
    fn validation_errors_surface_as_config_errors() {
        let args = run_args(&["-S", "lost-policy=carry"]);
        assert!(matches!(
            PartialAnalysisConfig::default().merge_with_cli(&args),
            Err(CliError::Config(_))
        ));

        let (_dir, path) = write_config("[csp.alpha]\nXyz = 0.2\n");
        assert!(matches!(
            PartialAnalysisConfig::from_file(&path).unwrap().into_config(),
            Err(CliError::Config(_))
        ));

        let (_dir, path) = write_config("[fit]\nmax-iterations = 10\n");
        assert!(matches!(
            PartialAnalysisConfig::from_file(&path).unwrap().into_config(),
            Err(CliError::Config(_))
        ));
    }
}
