//! # Workflows Module
//!
//! End-to-end entry points that tie the loaders, the engine and the
//! exporters together.
//!
//! - **Titration Workflow** ([`titration`]) - completeness checks,
//!   reconciliation, per-axis calculations, Hill fits and PRE analysis over
//!   a loaded dataset, plus export of every resulting table.

pub mod titration;
