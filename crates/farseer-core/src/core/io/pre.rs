use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid tag position header on line 1: '{0}'")]
    InvalidHeader(String),
    #[error("Line {line} is not a 'residue value' pair: '{content}'")]
    InvalidLine { line: usize, content: String },
    #[error("Residue {0} is listed more than once")]
    DuplicateResidue(isize),
}

/// Theoretical PRE profile for one paramagnetic condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TheoreticalProfile {
    /// Residue carrying the paramagnetic tag, from the `#` header line.
    pub tag_position: Option<isize>,
    values: BTreeMap<isize, f64>,
}

impl TheoreticalProfile {
    pub fn from_values(tag_position: Option<isize>, values: BTreeMap<isize, f64>) -> Self {
        Self {
            tag_position,
            values,
        }
    }

    pub fn value(&self, residue_number: isize) -> Option<f64> {
        self.values.get(&residue_number).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Parses a `.pre` file: a `#<tag>` header line followed by
/// whitespace-separated `residue value` pairs.
pub fn parse_pre(content: &str) -> Result<TheoreticalProfile, PreFileError> {
    let mut tag_position = None;
    let mut values = BTreeMap::new();

    for (idx, line) in content.lines().enumerate() {
        let line_num = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            if line_num == 1 {
                let comment = comment.trim();
                if !comment.is_empty() {
                    tag_position = Some(
                        comment
                            .parse::<isize>()
                            .map_err(|_| PreFileError::InvalidHeader(trimmed.to_string()))?,
                    );
                }
            }
            continue;
        }

        let mut fields = trimmed.split(|c: char| c.is_whitespace() || c == ',').filter(|f| !f.is_empty());
        let invalid = || PreFileError::InvalidLine {
            line: line_num,
            content: trimmed.to_string(),
        };
        let residue: isize = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(invalid)?;
        let value: f64 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(invalid)?;
        if values.insert(residue, value).is_some() {
            return Err(PreFileError::DuplicateResidue(residue));
        }
    }

    Ok(TheoreticalProfile {
        tag_position,
        values,
    })
}

pub fn read_pre_from_path(path: &Path) -> Result<TheoreticalProfile, PreFileError> {
    let content = std::fs::read_to_string(path)?;
    parse_pre(&content)
}
