//! # Core Models Module
//!
//! This module contains the fundamental data structures used to represent
//! NMR titration peaklists in Farseer, providing the foundation for all
//! reconciliation and calculation steps.
//!
//! ## Overview
//!
//! A titration dataset is a set of peaklists, one per experiment, indexed by
//! up to three experimental conditions. The models here describe:
//!
//! - **Residues** - Sequence numbers, side-chain tags, amino acid types and the
//!   assignment grammar used to recover them from peaklist strings
//! - **Peaks** - One residue's observation in one experiment, with its status
//! - **Peaklists** - Residue-ordered tables of peaks for a single experiment
//! - **Conditions** - Coordinates and axis labels of the `(z, y, x)` condition space
//!
//! ## Key Components
//!
//! - [`residue`] - Amino acid codes, residue keys and assignment parsing
//! - [`peak`] - Peak rows, observations and peak status
//! - [`peaklist`] - The residue-indexed peaklist table
//! - [`conditions`] - Coordinates, axes, resonance types and condition labels
//! - [`ids`] - Arena keys for peaklist storage

pub mod conditions;
pub mod ids;
pub mod peak;
pub mod peaklist;
pub mod residue;
