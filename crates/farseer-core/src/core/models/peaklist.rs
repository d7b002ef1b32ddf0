use super::peak::{PeakRow, PeakStatus};
use super::residue::ResidueKey;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Residue {0} appears more than once in the same peaklist")]
pub struct DuplicateResidueError(pub ResidueKey);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub measured: usize,
    pub lost: usize,
    pub unassigned: usize,
}

/// Residue-ordered rows of one experiment.
///
/// Rows are kept sorted by [`ResidueKey`] and each key appears at most once,
/// so lookups are binary searches and two tables with the same residue set
/// always iterate in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeaklistTable {
    rows: Vec<PeakRow>,
}

impl PeaklistTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(mut rows: Vec<PeakRow>) -> Result<Self, DuplicateResidueError> {
        rows.sort_by_key(|row| row.residue);
        if let Some(pair) = rows.windows(2).find(|w| w[0].residue == w[1].residue) {
            return Err(DuplicateResidueError(pair[0].residue));
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[PeakRow] {
        &self.rows
    }

    /// Mutable access to row contents; callers must not change `residue`.
    pub(crate) fn rows_mut(&mut self) -> &mut [PeakRow] {
        &mut self.rows
    }

    pub(crate) fn into_rows(self) -> Vec<PeakRow> {
        self.rows
    }

    pub(crate) fn replace_rows(&mut self, rows: Vec<PeakRow>) {
        debug_assert!(rows.windows(2).all(|w| w[0].residue < w[1].residue));
        self.rows = rows;
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn residue_keys(&self) -> impl Iterator<Item = ResidueKey> + '_ {
        self.rows.iter().map(|row| row.residue)
    }

    pub fn get(&self, key: ResidueKey) -> Option<&PeakRow> {
        self.rows
            .binary_search_by_key(&key, |row| row.residue)
            .ok()
            .map(|idx| &self.rows[idx])
    }

    pub fn get_mut(&mut self, key: ResidueKey) -> Option<&mut PeakRow> {
        self.rows
            .binary_search_by_key(&key, |row| row.residue)
            .ok()
            .map(|idx| &mut self.rows[idx])
    }

    pub fn contains(&self, key: ResidueKey) -> bool {
        self.get(key).is_some()
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for row in &self.rows {
            match row.status {
                PeakStatus::Measured => counts.measured += 1,
                PeakStatus::Lost => counts.lost += 1,
                PeakStatus::Unassigned => counts.unassigned += 1,
            }
        }
        counts
    }

    pub fn keys_with_status(&self, status: PeakStatus) -> Vec<ResidueKey> {
        self.rows
            .iter()
            .filter(|row| row.status == status)
            .map(|row| row.residue)
            .collect()
    }
}
