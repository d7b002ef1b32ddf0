//! # Core Module
//!
//! Stateless building blocks shared by the engine and the workflows.
//!
//! - **Data models** ([`models`]) - residues, peaklist rows and tables, and
//!   the `(z, y, x)` condition coordinates of a dataset
//! - **File I/O** ([`io`]) - spectra discovery, peaklist, FASTA and `.pre`
//!   parsing, and the tab-separated result writers

pub mod io;
pub mod models;
