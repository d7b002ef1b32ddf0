use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use super::config::ConfigError;
use super::dataset::SplitError;
use crate::core::io::dataset::LoadError;
use crate::core::models::conditions::{Axis, Coordinate, GroupKey};

/// Input files whose presence is checked before a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Peaklist,
    Sequence,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Peaklist => f.write_str("peaklist"),
            InputKind::Sequence => f.write_str("sequence file"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Dataset is incomplete: expected {expected} {kind} entries, found {found}; missing {}", .missing.join(", "))]
    Incomplete {
        kind: InputKind,
        expected: usize,
        found: usize,
        missing: Vec<String>,
    },

    #[error("Invalid peaklist {coordinate}: {source}")]
    Peaklist {
        coordinate: Coordinate,
        #[source]
        source: SplitError,
    },

    #[error("Peaklist {coordinate} has {found} residues, expected {expected}")]
    ShapeMismatch {
        coordinate: Coordinate,
        expected: usize,
        found: usize,
    },

    #[error("Peaklist {coordinate} differs from the residue axis at position {position}")]
    ResidueAxisMismatch {
        coordinate: Coordinate,
        position: usize,
    },

    #[error("Fit x-values have {found} entries but the titration has {expected} steps")]
    FitInputMismatch { expected: usize, found: usize },

    #[error("Column '{column}' cannot be fitted on a {axis} view")]
    FitNotApplicable { column: String, axis: Axis },

    #[error("No theoretical PRE file found for {group}")]
    MissingPreFile { group: GroupKey },

    #[error("Several theoretical PRE files found for {group}: {paths:?}")]
    AmbiguousPreFile { group: GroupKey, paths: Vec<PathBuf> },

    #[error("PRE analysis needs cond3 labels '{paramagnetic}' and '{diamagnetic}'")]
    PreConditionsMissing {
        paramagnetic: String,
        diamagnetic: String,
    },

    #[error("Reference residue {residue} is not measured in {coordinate}")]
    ReferenceResidueMissing { residue: isize, coordinate: Coordinate },

    #[error("Column '{0}' has not been computed")]
    MissingColumn(String),

    #[error("Unknown {axis} step '{label}'")]
    UnknownStep { axis: Axis, label: String },

    #[error("Failed to load input: {0}")]
    Load(#[from] LoadError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
