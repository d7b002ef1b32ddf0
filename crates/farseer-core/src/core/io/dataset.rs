use super::fasta::{FastaError, Sequence, read_fasta_from_path};
use super::peaklist::read_peaklist_from_path;
use super::pre::{PreFileError, TheoreticalProfile, read_pre_from_path};
use crate::core::models::conditions::{ConditionKeys, Coordinate, GroupKey};
use crate::core::models::peak::RawPeak;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read peaklist '{path}': {source}")]
    Peaklist {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to read sequence file '{path}': {source}")]
    Sequence {
        path: PathBuf,
        #[source]
        source: FastaError,
    },
    #[error("Failed to read theoretical PRE file '{path}': {source}")]
    Pre {
        path: PathBuf,
        #[source]
        source: PreFileError,
    },
    #[error("Spectra root '{0}' is not a directory")]
    NotADirectory(PathBuf),
    #[error("No peaklists found under '{0}'")]
    Empty(PathBuf),
}

/// Peaklists and auxiliary files discovered under a `spectra/` root.
///
/// The layout is `{root}/{z}/{y}/{x}.csv`, with optional `*.fasta` and
/// `*.pre` files next to the peaklists of each `(z, y)` group.
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    pub root: PathBuf,
    pub keys: ConditionKeys,
    pub peaklists: BTreeMap<Coordinate, Vec<RawPeak>>,
    pub fasta_files: BTreeMap<GroupKey, Vec<PathBuf>>,
    pub pre_files: BTreeMap<GroupKey, Vec<PathBuf>>,
}

impl RawDataset {
    /// Builds a dataset directly from parsed peaklists, deriving the
    /// condition labels from the coordinates.
    pub fn from_peaklists(peaklists: BTreeMap<Coordinate, Vec<RawPeak>>) -> Self {
        let keys = ConditionKeys::new(
            peaklists.keys().map(|c| c.z.clone()).collect::<Vec<_>>(),
            peaklists.keys().map(|c| c.y.clone()).collect::<Vec<_>>(),
            peaklists.keys().map(|c| c.x.clone()).collect::<Vec<_>>(),
        );
        Self {
            root: PathBuf::new(),
            keys,
            peaklists,
            fasta_files: BTreeMap::new(),
            pre_files: BTreeMap::new(),
        }
    }

    pub fn peaklist(&self, coordinate: &Coordinate) -> Option<&[RawPeak]> {
        self.peaklists.get(coordinate).map(Vec::as_slice)
    }

    pub fn missing_peaklists(&self) -> Vec<Coordinate> {
        self.keys
            .coordinates()
            .filter(|c| !self.peaklists.contains_key(c))
            .collect()
    }

    pub fn groups_without_sequence(&self) -> Vec<GroupKey> {
        self.keys
            .groups()
            .filter(|g| self.fasta_files.get(g).is_none_or(Vec::is_empty))
            .collect()
    }

    /// Reads the first sequence file of a group.
    pub fn load_sequence(&self, group: &GroupKey) -> Result<Option<Sequence>, LoadError> {
        let Some(path) = self.fasta_files.get(group).and_then(|files| files.first()) else {
            return Ok(None);
        };
        if self.fasta_files.get(group).is_some_and(|f| f.len() > 1) {
            warn!(group = %group, path = %path.display(), "Several sequence files found; using the first.");
        }
        read_fasta_from_path(path)
            .map(Some)
            .map_err(|source| LoadError::Sequence {
                path: path.clone(),
                source,
            })
    }

    pub fn pre_paths(&self, group: &GroupKey) -> &[PathBuf] {
        self.pre_files.get(group).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub fn load_theoretical_profile(path: &Path) -> Result<TheoreticalProfile, LoadError> {
    read_pre_from_path(path).map_err(|source| LoadError::Pre {
        path: path.to_path_buf(),
        source,
    })
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    entries.sort();
    Ok(entries)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn dir_label(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.starts_with('.'))
        .map(str::to_string)
}

/// Discovers and reads every peaklist under `root`.
///
/// When `declared` is given, only those labels are considered part of the
/// dataset and any extra directories or files are ignored with a warning;
/// otherwise the labels are the union of what is found on disk.
pub fn load_spectra(root: &Path, declared: Option<&ConditionKeys>) -> Result<RawDataset, LoadError> {
    if !root.is_dir() {
        return Err(LoadError::NotADirectory(root.to_path_buf()));
    }

    let mut peaklists = BTreeMap::new();
    let mut fasta_files: BTreeMap<GroupKey, Vec<PathBuf>> = BTreeMap::new();
    let mut pre_files: BTreeMap<GroupKey, Vec<PathBuf>> = BTreeMap::new();
    let (mut zs, mut ys, mut xs) = (BTreeSet::new(), BTreeSet::new(), BTreeSet::new());

    for z_dir in sorted_entries(root)?.into_iter().filter(|p| p.is_dir()) {
        let Some(z) = dir_label(&z_dir) else { continue };
        for y_dir in sorted_entries(&z_dir)?.into_iter().filter(|p| p.is_dir()) {
            let Some(y) = dir_label(&y_dir) else { continue };
            let group = GroupKey::new(z.clone(), y.clone());

            for file in sorted_entries(&y_dir)?.into_iter().filter(|p| p.is_file()) {
                if has_extension(&file, "fasta") {
                    fasta_files.entry(group.clone()).or_default().push(file);
                } else if has_extension(&file, "pre") {
                    pre_files.entry(group.clone()).or_default().push(file);
                } else if has_extension(&file, "csv") {
                    let Some(x) = file.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                        continue;
                    };
                    let coordinate = group.with_x(&x);
                    if let Some(keys) = declared {
                        let known = keys.z().contains(&z) && keys.y().contains(&y) && keys.x().contains(&x);
                        if !known {
                            warn!(coordinate = %coordinate, path = %file.display(), "Ignoring peaklist outside the declared conditions.");
                            continue;
                        }
                    }
                    let peaks = read_peaklist_from_path(&file).map_err(|source| LoadError::Peaklist {
                        path: file.clone(),
                        source,
                    })?;
                    debug!(coordinate = %coordinate, peaks = peaks.len(), "Read peaklist.");
                    zs.insert(z.clone());
                    ys.insert(y.clone());
                    xs.insert(x);
                    peaklists.insert(coordinate, peaks);
                }
            }
        }
    }

    if peaklists.is_empty() {
        return Err(LoadError::Empty(root.to_path_buf()));
    }

    let keys = match declared {
        Some(keys) => keys.clone(),
        None => ConditionKeys::new(
            zs.into_iter().collect::<Vec<_>>(),
            ys.into_iter().collect::<Vec<_>>(),
            xs.into_iter().collect::<Vec<_>>(),
        ),
    };

    info!(
        root = %root.display(),
        peaklists = peaklists.len(),
        expected = keys.expected_count(),
        "Loaded spectra."
    );

    Ok(RawDataset {
        root: root.to_path_buf(),
        keys,
        peaklists,
        fasta_files,
        pre_files,
    })
}
