//! Provides input/output functionality for titration datasets.
//!
//! Inputs are a `spectra/{z}/{y}/{x}.csv` tree of peaklists in the normalized
//! column schema, plus optional FASTA sequences and theoretical PRE profiles
//! stored next to the peaklists of each `(z, y)` group. Outputs are
//! tab-separated tables and residue attribute files describing the results
//! of an analysis.

pub mod dataset;
pub mod export;
pub mod fasta;
pub mod peaklist;
pub mod pre;
