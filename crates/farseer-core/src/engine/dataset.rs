use super::error::{EngineError, InputKind};
use crate::core::io::dataset::RawDataset;
use crate::core::models::conditions::{ConditionKeys, Coordinate, ResonanceType};
use crate::core::models::ids::PeaklistId;
use crate::core::models::peak::{PeakRow, PeakStatus, RawPeak};
use crate::core::models::peaklist::{DuplicateResidueError, PeaklistTable};
use crate::core::models::residue::{AssignmentParseError, parse_assignment};
use slotmap::SlotMap;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("{0}")]
    Assignment(#[from] AssignmentParseError),
    #[error("{0}")]
    Duplicate(#[from] DuplicateResidueError),
}

/// Backbone and side-chain tables parsed from one raw peaklist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitPeaklist {
    pub backbone: PeaklistTable,
    pub sidechains: PeaklistTable,
}

/// Parses every row's `Assign F1` into a residue key and type, marks the
/// rows measured, and separates side-chain resonances (tagged `a`/`b`)
/// from backbone ones.
///
/// A single malformed assignment or a residue listed twice fails the whole
/// peaklist.
pub fn split_assignment(peaks: &[RawPeak]) -> Result<SplitPeaklist, SplitError> {
    let mut backbone = Vec::with_capacity(peaks.len());
    let mut sidechains = Vec::new();

    for peak in peaks {
        let parsed = parse_assignment(&peak.assign_f1)?;
        let row = PeakRow {
            residue: parsed.key(),
            residue_type: parsed.residue_type,
            assign_f1: peak.assign_f1.trim().to_string(),
            assign_f2: peak.assign_f2.trim().to_string(),
            observation: peak.observation,
            status: PeakStatus::Measured,
            bookkeeping: peak.bookkeeping.clone(),
        };
        if row.residue.is_sidechain() {
            sidechains.push(row);
        } else {
            backbone.push(row);
        }
    }

    Ok(SplitPeaklist {
        backbone: PeaklistTable::from_rows(backbone)?,
        sidechains: PeaklistTable::from_rows(sidechains)?,
    })
}

/// Checks that every declared `(z, y, x)` peaklist, or every `(z, y)`
/// sequence file, is present.
pub fn validate_completeness(raw: &RawDataset, kind: InputKind) -> Result<(), EngineError> {
    let (expected, missing): (usize, Vec<String>) = match kind {
        InputKind::Peaklist => (
            raw.keys.expected_count(),
            raw.missing_peaklists().iter().map(ToString::to_string).collect(),
        ),
        InputKind::Sequence => (
            raw.keys.z().len() * raw.keys.y().len(),
            raw.groups_without_sequence()
                .iter()
                .map(ToString::to_string)
                .collect(),
        ),
    };

    if missing.is_empty() {
        debug!(%kind, expected, "Dataset is complete.");
        return Ok(());
    }
    Err(EngineError::Incomplete {
        kind,
        expected,
        found: expected - missing.len(),
        missing,
    })
}

/// Peaklists of one resonance type, stored in an arena and addressed by
/// their `(z, y, x)` coordinate.
#[derive(Debug, Clone)]
pub struct ConditionTree {
    resonance: ResonanceType,
    keys: ConditionKeys,
    tables: SlotMap<PeaklistId, PeaklistTable>,
    index: HashMap<Coordinate, PeaklistId>,
}

impl ConditionTree {
    pub fn new(resonance: ResonanceType, keys: ConditionKeys) -> Self {
        Self {
            resonance,
            keys,
            tables: SlotMap::with_key(),
            index: HashMap::new(),
        }
    }

    pub fn resonance(&self) -> ResonanceType {
        self.resonance
    }

    pub fn keys(&self) -> &ConditionKeys {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Stores `table` at `coordinate`, replacing any table already there.
    pub fn insert(&mut self, coordinate: Coordinate, table: PeaklistTable) -> PeaklistId {
        if let Some(&id) = self.index.get(&coordinate) {
            self.tables[id] = table;
            return id;
        }
        let id = self.tables.insert(table);
        self.index.insert(coordinate, id);
        id
    }

    pub fn id_of(&self, coordinate: &Coordinate) -> Option<PeaklistId> {
        self.index.get(coordinate).copied()
    }

    pub fn get(&self, coordinate: &Coordinate) -> Option<&PeaklistTable> {
        self.id_of(coordinate).and_then(|id| self.tables.get(id))
    }

    pub fn get_mut(&mut self, coordinate: &Coordinate) -> Option<&mut PeaklistTable> {
        let id = self.id_of(coordinate)?;
        self.tables.get_mut(id)
    }

    pub fn table(&self, id: PeaklistId) -> Option<&PeaklistTable> {
        self.tables.get(id)
    }

    pub fn table_mut(&mut self, id: PeaklistId) -> Option<&mut PeaklistTable> {
        self.tables.get_mut(id)
    }

    /// Present tables in lexicographic coordinate order.
    pub fn iter(&self) -> impl Iterator<Item = (Coordinate, &PeaklistTable)> + '_ {
        self.keys
            .coordinates()
            .filter_map(move |c| self.get(&c).map(|t| (c, t)))
    }

    pub fn missing(&self) -> Vec<Coordinate> {
        self.keys
            .coordinates()
            .filter(|c| !self.index.contains_key(c))
            .collect()
    }
}

/// Parses every raw peaklist into a backbone tree and, when requested, a
/// side-chain tree.
#[instrument(skip_all, name = "split_assignments")]
pub fn build_trees(
    raw: &RawDataset,
    use_sidechains: bool,
) -> Result<(ConditionTree, Option<ConditionTree>), EngineError> {
    let mut backbone = ConditionTree::new(ResonanceType::Backbone, raw.keys.clone());
    let mut sidechains =
        use_sidechains.then(|| ConditionTree::new(ResonanceType::Sidechains, raw.keys.clone()));

    for coordinate in raw.keys.coordinates() {
        let Some(peaks) = raw.peaklist(&coordinate) else {
            continue;
        };
        let split = split_assignment(peaks).map_err(|source| EngineError::Peaklist {
            coordinate: coordinate.clone(),
            source,
        })?;
        debug!(
            coordinate = %coordinate,
            backbone = split.backbone.len(),
            sidechains = split.sidechains.len(),
            "Split assignments."
        );
        match sidechains.as_mut() {
            Some(tree) => {
                tree.insert(coordinate.clone(), split.sidechains);
            }
            None if !split.sidechains.is_empty() => {
                debug!(coordinate = %coordinate, dropped = split.sidechains.len(), "Ignoring side-chain peaks.");
            }
            None => {}
        }
        backbone.insert(coordinate, split.backbone);
    }

    info!(
        peaklists = backbone.len(),
        sidechains = sidechains.is_some(),
        "Parsed peaklist assignments."
    );
    Ok((backbone, sidechains))
}
