use crate::core::models::residue::AminoAcid;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FastaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid residue code '{code}' on line {line}")]
    InvalidResidue { line: usize, code: char },
    #[error("Sequence is empty")]
    Empty,
}

/// A protein sequence read from the first record of a FASTA-like file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub header: Option<String>,
    residues: Vec<AminoAcid>,
}

impl Sequence {
    pub fn new(residues: Vec<AminoAcid>) -> Self {
        Self {
            header: None,
            residues,
        }
    }

    pub fn residues(&self) -> &[AminoAcid] {
        &self.residues
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    /// Pairs each residue with its sequence number, counting from `start`.
    pub fn numbered(&self, start: isize) -> impl Iterator<Item = (isize, AminoAcid)> + '_ {
        self.residues
            .iter()
            .enumerate()
            .map(move |(i, &aa)| (start + i as isize, aa))
    }
}

/// Parses the first record of a FASTA-like text.
///
/// Sequence lines may be wrapped and may contain whitespace, digits
/// (position rulers) or a terminal `*`, all of which are ignored. Lines
/// starting with `;` are comments. Reading stops at the second header.
pub fn parse_fasta(content: &str) -> Result<Sequence, FastaError> {
    let mut header = None;
    let mut residues = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        if let Some(title) = line.strip_prefix('>') {
            if header.is_some() || !residues.is_empty() {
                break;
            }
            header = Some(title.trim().to_string());
            continue;
        }
        for c in line.chars() {
            if c.is_whitespace() || c.is_ascii_digit() || c == '*' {
                continue;
            }
            let aa = AminoAcid::from_one_letter(c).ok_or(FastaError::InvalidResidue {
                line: line_num + 1,
                code: c,
            })?;
            residues.push(aa);
        }
    }

    if residues.is_empty() {
        return Err(FastaError::Empty);
    }
    Ok(Sequence { header, residues })
}

pub fn read_fasta_from_path(path: &Path) -> Result<Sequence, FastaError> {
    let content = std::fs::read_to_string(path)?;
    parse_fasta(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_sequence_with_header() {
        let seq = parse_fasta(">sp|P0|TEST some protein\nMKV\nLGa\n").unwrap();
        assert_eq!(seq.header.as_deref(), Some("sp|P0|TEST some protein"));
        assert_eq!(
            seq.residues(),
            &[
                AminoAcid::Methionine,
                AminoAcid::Lysine,
                AminoAcid::Valine,
                AminoAcid::Leucine,
                AminoAcid::Glycine,
                AminoAcid::Alanine,
            ]
        );
    }

    #[test]
    fn only_first_record_is_used() {
        let seq = parse_fasta(">first\nMK\n>second\nGGGG\n").unwrap();
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn headerless_sequence_with_rulers_and_terminator_is_accepted() {
        let seq = parse_fasta("1 MKV LG 10\n; comment\nAS*\n").unwrap();
        assert_eq!(seq.len(), 7);
        assert!(seq.header.is_none());
    }

    #[test]
    fn numbered_counts_from_start() {
        let seq = parse_fasta("MKG").unwrap();
        let numbered: Vec<_> = seq.numbered(10).collect();
        assert_eq!(
            numbered,
            vec![
                (10, AminoAcid::Methionine),
                (11, AminoAcid::Lysine),
                (12, AminoAcid::Glycine)
            ]
        );
    }

    #[test]
    fn invalid_codes_and_empty_input_are_rejected() {
        assert!(matches!(
            parse_fasta(">x\nMKB\n"),
            Err(FastaError::InvalidResidue { line: 2, code: 'B' })
        ));
        assert!(matches!(parse_fasta(">only header\n"), Err(FastaError::Empty)));
    }
}
