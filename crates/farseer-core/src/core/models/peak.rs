use super::residue::{AminoAcid, ResidueKey};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PeakStatus {
    /// Peak observed and assigned in this experiment.
    #[default]
    Measured,
    /// Residue observed in the reference experiment but not detected here.
    Lost,
    /// Residue present in the sequence but never observed.
    Unassigned,
}

impl PeakStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeakStatus::Measured => "measured",
            PeakStatus::Lost => "lost",
            PeakStatus::Unassigned => "unassigned",
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid peak status string: '{0}'")]
pub struct ParsePeakStatusError(String);

impl FromStr for PeakStatus {
    type Err = ParsePeakStatusError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "measured" => Ok(PeakStatus::Measured),
            "lost" => Ok(PeakStatus::Lost),
            "unassigned" => Ok(PeakStatus::Unassigned),
            _ => Err(ParsePeakStatusError(s.to_string())),
        }
    }
}

impl fmt::Display for PeakStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric observation columns carried by every peaklist row, in cube order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeakColumn {
    PositionF1,
    PositionF2,
    Height,
    Volume,
    LinewidthF1,
    LinewidthF2,
}

impl PeakColumn {
    pub const ALL: [PeakColumn; 6] = [
        PeakColumn::PositionF1,
        PeakColumn::PositionF2,
        PeakColumn::Height,
        PeakColumn::Volume,
        PeakColumn::LinewidthF1,
        PeakColumn::LinewidthF2,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            PeakColumn::PositionF1 => "Position F1",
            PeakColumn::PositionF2 => "Position F2",
            PeakColumn::Height => "Height",
            PeakColumn::Volume => "Volume",
            PeakColumn::LinewidthF1 => "Line Width F1 (Hz)",
            PeakColumn::LinewidthF2 => "Line Width F2 (Hz)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub position_f1: f64,
    pub position_f2: f64,
    pub height: f64,
    pub volume: f64,
    pub linewidth_f1: f64,
    pub linewidth_f2: f64,
}

impl Observation {
    pub fn missing() -> Self {
        Self {
            position_f1: f64::NAN,
            position_f2: f64::NAN,
            height: f64::NAN,
            volume: f64::NAN,
            linewidth_f1: f64::NAN,
            linewidth_f2: f64::NAN,
        }
    }

    pub fn get(&self, column: PeakColumn) -> f64 {
        match column {
            PeakColumn::PositionF1 => self.position_f1,
            PeakColumn::PositionF2 => self.position_f2,
            PeakColumn::Height => self.height,
            PeakColumn::Volume => self.volume,
            PeakColumn::LinewidthF1 => self.linewidth_f1,
            PeakColumn::LinewidthF2 => self.linewidth_f2,
        }
    }

    pub fn is_missing(&self) -> bool {
        PeakColumn::ALL.iter().all(|&c| self.get(c).is_nan())
    }
}

impl Default for Observation {
    fn default() -> Self {
        Self::missing()
    }
}

/// Free-form bookkeeping fields carried through from the input peaklist.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bookkeeping {
    pub merit: String,
    pub fit_method: String,
    pub volume_method: String,
    pub details: String,
}

/// One residue's observation in one experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakRow {
    pub residue: ResidueKey,
    pub residue_type: AminoAcid,
    pub assign_f1: String,
    pub assign_f2: String,
    pub observation: Observation,
    pub status: PeakStatus,
    pub bookkeeping: Bookkeeping,
}

impl PeakRow {
    pub fn one_letter(&self) -> char {
        self.residue_type.one_letter()
    }

    pub fn three_letter(&self) -> &'static str {
        self.residue_type.three_letter()
    }
}

/// Sequence-derived identity of a row, shared by every experiment once the
/// residue axis is reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidueAnnotation {
    pub residue: ResidueKey,
    pub residue_type: AminoAcid,
    pub assign_f1: String,
    pub assign_f2: String,
}

impl From<&PeakRow> for ResidueAnnotation {
    fn from(row: &PeakRow) -> Self {
        Self {
            residue: row.residue,
            residue_type: row.residue_type,
            assign_f1: row.assign_f1.clone(),
            assign_f2: row.assign_f2.clone(),
        }
    }
}

/// A peaklist row as read from an input file, before assignment parsing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawPeak {
    pub assign_f1: String,
    pub assign_f2: String,
    pub observation: Observation,
    pub bookkeeping: Bookkeeping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_status_parses_case_insensitively_and_displays_lowercase() {
        assert_eq!("Lost".parse::<PeakStatus>().unwrap(), PeakStatus::Lost);
        assert_eq!(
            " UNASSIGNED ".parse::<PeakStatus>().unwrap(),
            PeakStatus::Unassigned
        );
        assert!("gone".parse::<PeakStatus>().is_err());
        assert_eq!(PeakStatus::Measured.to_string(), "measured");
    }

    #[test]
    fn peak_column_indices_follow_declaration_order() {
        for (i, column) in PeakColumn::ALL.iter().enumerate() {
            assert_eq!(column.index(), i);
        }
    }

    #[test]
    fn missing_observation_is_all_nan() {
        let obs = Observation::missing();
        assert!(obs.is_missing());
        let mut measured = obs;
        measured.height = 1.0;
        assert!(!measured.is_missing());
        assert_eq!(measured.get(PeakColumn::Height), 1.0);
    }
}
