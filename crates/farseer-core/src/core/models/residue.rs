use phf::{Map, phf_map};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AminoAcid {
    // --- Aliphatic, Nonpolar ---
    Alanine,
    Glycine,
    Isoleucine,
    Leucine,
    Proline,
    Valine,

    // --- Aromatic ---
    Phenylalanine,
    Tryptophan,
    Tyrosine,

    // --- Polar, Uncharged ---
    Asparagine,
    Cysteine,
    Glutamine,
    Serine,
    Threonine,
    Methionine,

    // --- Positively Charged (Basic) ---
    Arginine,
    Histidine,
    Lysine,

    // --- Negatively Charged (Acidic) ---
    AsparticAcid,
    GlutamicAcid,
}

static THREE_LETTER_CODES: Map<&'static str, AminoAcid> = phf_map! {
    "ALA" => AminoAcid::Alanine,
    "GLY" => AminoAcid::Glycine,
    "ILE" => AminoAcid::Isoleucine,
    "LEU" => AminoAcid::Leucine,
    "PRO" => AminoAcid::Proline,
    "VAL" => AminoAcid::Valine,
    "PHE" => AminoAcid::Phenylalanine,
    "TRP" => AminoAcid::Tryptophan,
    "TYR" => AminoAcid::Tyrosine,
    "ASN" => AminoAcid::Asparagine,
    "CYS" => AminoAcid::Cysteine,
    "GLN" => AminoAcid::Glutamine,
    "SER" => AminoAcid::Serine,
    "THR" => AminoAcid::Threonine,
    "MET" => AminoAcid::Methionine,
    "ARG" => AminoAcid::Arginine,
    "HIS" => AminoAcid::Histidine,
    "LYS" => AminoAcid::Lysine,
    "ASP" => AminoAcid::AsparticAcid,
    "GLU" => AminoAcid::GlutamicAcid,
};

static ONE_LETTER_CODES: Map<char, AminoAcid> = phf_map! {
    'A' => AminoAcid::Alanine,
    'G' => AminoAcid::Glycine,
    'I' => AminoAcid::Isoleucine,
    'L' => AminoAcid::Leucine,
    'P' => AminoAcid::Proline,
    'V' => AminoAcid::Valine,
    'F' => AminoAcid::Phenylalanine,
    'W' => AminoAcid::Tryptophan,
    'Y' => AminoAcid::Tyrosine,
    'N' => AminoAcid::Asparagine,
    'C' => AminoAcid::Cysteine,
    'Q' => AminoAcid::Glutamine,
    'S' => AminoAcid::Serine,
    'T' => AminoAcid::Threonine,
    'M' => AminoAcid::Methionine,
    'R' => AminoAcid::Arginine,
    'H' => AminoAcid::Histidine,
    'K' => AminoAcid::Lysine,
    'D' => AminoAcid::AsparticAcid,
    'E' => AminoAcid::GlutamicAcid,
};

impl AminoAcid {
    pub fn from_three_letter(code: &str) -> Option<Self> {
        THREE_LETTER_CODES
            .get(code.trim().to_ascii_uppercase().as_str())
            .copied()
    }

    pub fn from_one_letter(code: char) -> Option<Self> {
        ONE_LETTER_CODES.get(&code.to_ascii_uppercase()).copied()
    }

    pub fn one_letter(&self) -> char {
        match self {
            AminoAcid::Alanine => 'A',
            AminoAcid::Glycine => 'G',
            AminoAcid::Isoleucine => 'I',
            AminoAcid::Leucine => 'L',
            AminoAcid::Proline => 'P',
            AminoAcid::Valine => 'V',
            AminoAcid::Phenylalanine => 'F',
            AminoAcid::Tryptophan => 'W',
            AminoAcid::Tyrosine => 'Y',
            AminoAcid::Asparagine => 'N',
            AminoAcid::Cysteine => 'C',
            AminoAcid::Glutamine => 'Q',
            AminoAcid::Serine => 'S',
            AminoAcid::Threonine => 'T',
            AminoAcid::Methionine => 'M',
            AminoAcid::Arginine => 'R',
            AminoAcid::Histidine => 'H',
            AminoAcid::Lysine => 'K',
            AminoAcid::AsparticAcid => 'D',
            AminoAcid::GlutamicAcid => 'E',
        }
    }

    /// Title-cased three-letter code, as written in assignment strings (e.g. `Lys`).
    pub fn three_letter(&self) -> &'static str {
        match self {
            AminoAcid::Alanine => "Ala",
            AminoAcid::Glycine => "Gly",
            AminoAcid::Isoleucine => "Ile",
            AminoAcid::Leucine => "Leu",
            AminoAcid::Proline => "Pro",
            AminoAcid::Valine => "Val",
            AminoAcid::Phenylalanine => "Phe",
            AminoAcid::Tryptophan => "Trp",
            AminoAcid::Tyrosine => "Tyr",
            AminoAcid::Asparagine => "Asn",
            AminoAcid::Cysteine => "Cys",
            AminoAcid::Glutamine => "Gln",
            AminoAcid::Serine => "Ser",
            AminoAcid::Threonine => "Thr",
            AminoAcid::Methionine => "Met",
            AminoAcid::Arginine => "Arg",
            AminoAcid::Histidine => "His",
            AminoAcid::Lysine => "Lys",
            AminoAcid::AsparticAcid => "Asp",
            AminoAcid::GlutamicAcid => "Glu",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid amino acid code: '{0}'")]
pub struct ParseAminoAcidError(pub String);

impl FromStr for AminoAcid {
    type Err = ParseAminoAcidError;

    /// Accepts either a one-letter or a three-letter code, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let parsed = match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_one_letter(c),
            _ => Self::from_three_letter(trimmed),
        };
        parsed.ok_or_else(|| ParseAminoAcidError(s.to_string()))
    }
}

impl fmt::Display for AminoAcid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.three_letter())
    }
}

/// Side-chain amide/indole proton tag (`a`/`b` for Asn/Gln, `a` for Trp).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SidechainTag {
    A,
    B,
}

impl SidechainTag {
    pub fn as_char(&self) -> char {
        match self {
            SidechainTag::A => 'a',
            SidechainTag::B => 'b',
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c {
            'a' => Some(SidechainTag::A),
            'b' => Some(SidechainTag::B),
            _ => None,
        }
    }
}

/// Identity of one resonance along the residue axis.
///
/// Ordering is lexicographic on `(number, tag)`: the untagged backbone
/// residue sorts before its `a` and `b` side-chain resonances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResidueKey {
    pub number: isize,
    pub tag: Option<SidechainTag>,
}

impl ResidueKey {
    pub fn backbone(number: isize) -> Self {
        Self { number, tag: None }
    }

    pub fn sidechain(number: isize, tag: SidechainTag) -> Self {
        Self {
            number,
            tag: Some(tag),
        }
    }

    pub fn is_sidechain(&self) -> bool {
        self.tag.is_some()
    }
}

impl Ord for ResidueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then_with(|| self.tag.cmp(&other.tag))
    }
}

impl PartialOrd for ResidueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ResidueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Some(tag) => write!(f, "{}{}", self.number, tag.as_char()),
            None => write!(f, "{}", self.number),
        }
    }
}

/// Structured form of an assignment string such as `45LysH` or `12AsnHD21a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAssignment {
    pub number: isize,
    pub residue_type: AminoAcid,
    pub atom: String,
    pub tag: Option<SidechainTag>,
}

impl ParsedAssignment {
    pub fn key(&self) -> ResidueKey {
        ResidueKey {
            number: self.number,
            tag: self.tag,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssignmentParseError {
    #[error("Assignment '{0}' does not start with a residue number")]
    MissingResidueNumber(String),
    #[error("Assignment '{0}' has an out-of-range residue number")]
    InvalidResidueNumber(String),
    #[error("Assignment '{0}' does not carry a three-letter residue code after the number")]
    MissingResidueCode(String),
    #[error("Assignment '{assignment}' uses unknown residue code '{code}'")]
    UnknownResidueCode { assignment: String, code: String },
}

/// Parses an assignment string.
///
/// Grammar: `DIGITS CODE3 ATOM? TAG?` where `DIGITS` is the residue number,
/// `CODE3` is a three-letter amino acid code (any case) and `TAG` is a
/// trailing lowercase `a` or `b` marking a side-chain resonance. Whatever
/// sits between the code and the tag is the atom label.
pub fn parse_assignment(raw: &str) -> Result<ParsedAssignment, AssignmentParseError> {
    let s = raw.trim();

    let digits_end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if digits_end == 0 {
        return Err(AssignmentParseError::MissingResidueNumber(raw.to_string()));
    }
    let number: isize = s[..digits_end]
        .parse()
        .map_err(|_| AssignmentParseError::InvalidResidueNumber(raw.to_string()))?;

    let rest = &s[digits_end..];
    let code: String = rest.chars().take(3).collect();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AssignmentParseError::MissingResidueCode(raw.to_string()));
    }
    let residue_type =
        AminoAcid::from_three_letter(&code).ok_or_else(|| AssignmentParseError::UnknownResidueCode {
            assignment: raw.to_string(),
            code: code.clone(),
        })?;

    let mut atom = rest[3..].to_string();
    let tag = atom.chars().last().and_then(SidechainTag::from_char);
    if tag.is_some() {
        atom.pop();
    }

    Ok(ParsedAssignment {
        number,
        residue_type,
        atom,
        tag,
    })
}

/// Builds the canonical assignment label `{num}{3-letter}{atom}{tag}`.
pub fn assignment_label(key: ResidueKey, residue_type: AminoAcid, atom: &str) -> String {
    match key.tag {
        Some(tag) => format!(
            "{}{}{}{}",
            key.number,
            residue_type.three_letter(),
            atom,
            tag.as_char()
        ),
        None => format!("{}{}{}", key.number, residue_type.three_letter(), atom),
    }
}
