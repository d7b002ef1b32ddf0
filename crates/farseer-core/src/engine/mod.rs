//! # Engine Module
//!
//! The analysis pipeline from parsed peaklists to derived results.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - analysis parameters and their builder
//! - **Dataset assembly** ([`dataset`], [`reconcile`]) - assignment splitting,
//!   completeness checks and the residue-axis reconciliation of every
//!   peaklist against its reference
//! - **Cube and views** ([`cube`], [`titration`]) - the dense
//!   `(z, y, x, residue, column)` array and the per-axis series sliced from it
//! - **Analyses** ([`fitting`], [`pre`]) - Hill-equation fits and PRE
//!   comparison with Gaussian smoothing
//! - **Progress Monitoring** ([`progress`]) and **Error Handling** ([`error`])

pub mod config;
pub mod cube;
pub mod dataset;
pub mod error;
pub mod fitting;
pub mod pre;
pub mod progress;
pub mod reconcile;
pub mod titration;
