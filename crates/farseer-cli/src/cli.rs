use clap::{Args, Parser, Subcommand};
use farseer::engine::config::LostPolicy;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Farseer-NMR Developers",
    version,
    about = "Farseer CLI - analysis of multi-dimensional NMR titration series: chemical-shift perturbations, intensity ratios, Hill fits and PRE.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Append logs to this file. `run` defaults to `<output>/farseer.log`
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used to fit residues in parallel.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

impl Cli {
    /// The log file requested explicitly or implied by the command.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file.clone().or_else(|| match &self.command {
            Commands::Run(args) => Some(args.output.join("farseer.log")),
            Commands::Check(_) => None,
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full analysis over a spectra directory and write every result table.
    Run(RunArgs),
    /// Load a spectra directory and check it is complete, without analysing it.
    Check(CheckArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    // --- Core Arguments ---
    /// Root of the `{cond3}/{cond2}/{cond1}.csv` peaklist tree.
    #[arg(short, long, default_value = "spectra", value_name = "DIR")]
    pub spectra: PathBuf,

    /// Directory receiving the result tables.
    #[arg(short, long, default_value = "results", value_name = "DIR")]
    pub output: PathBuf,

    /// Path to an analysis configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    // --- Analysis Overrides ---
    /// Override the x-values used for Hill fitting, one per cond1 step.
    #[arg(long = "fit-x", value_name = "FLOAT", value_delimiter = ',', num_args = 1..)]
    pub fit_x: Option<Vec<f64>>,

    /// Override how lost peaks are filled in derived columns.
    #[arg(long, value_name = "POLICY")]
    pub lost_policy: Option<LostPolicy>,

    /// Analyse side-chain peaks as a separate resonance set.
    #[arg(long)]
    pub sidechains: bool,

    /// Generate two-step comparison views along cond2 and cond3.
    #[arg(long)]
    pub compare: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S fit.max-iterations=2000
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Root of the `{cond3}/{cond2}/{cond1}.csv` peaklist tree.
    #[arg(short, long, default_value = "spectra", value_name = "DIR")]
    pub spectra: PathBuf,

    /// Path to an analysis configuration file; declared conditions and
    /// required sequence files are taken from it.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
