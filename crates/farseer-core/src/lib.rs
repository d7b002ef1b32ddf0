//! # Farseer Core Library
//!
//! Analysis of multi-dimensional NMR titration series: peaklists recorded
//! over up to three experimental conditions are reconciled into a common
//! residue axis and turned into chemical-shift perturbation, intensity
//! ratio, Hill-fit and PRE results.
//!
//! ## Architecture
//!
//! - **[`core`]: The Foundation.** Data models (residues, peaks, condition
//!   labels) and the readers and writers for peaklists, sequences,
//!   theoretical PRE profiles and result tables.
//!
//! - **[`engine`]: The Logic Core.** Assignment splitting, peaklist
//!   reconciliation, the dense dataset cube, per-axis titration views with
//!   their derived columns, Hill fitting and PRE analysis.
//!
//! - **[`workflows`]: The Public API.** Complete runs that tie the loaders,
//!   the engine and the exporters together.

pub mod core;
pub mod engine;
pub mod workflows;
