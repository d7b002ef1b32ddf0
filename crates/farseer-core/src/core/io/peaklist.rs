use crate::core::models::peak::{Bookkeeping, Observation, RawPeak};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// One row of the normalized peaklist schema.
///
/// Numeric fields that are missing or unparsable are read as NaN; the
/// bookkeeping columns are optional.
#[derive(Debug, Deserialize)]
struct PeaklistRecord {
    #[serde(rename = "Assign F1", default)]
    assign_f1: String,
    #[serde(rename = "Assign F2", default)]
    assign_f2: String,
    #[serde(
        rename = "Position F1",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    position_f1: Option<f64>,
    #[serde(
        rename = "Position F2",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    position_f2: Option<f64>,
    #[serde(rename = "Height", default, deserialize_with = "csv::invalid_option")]
    height: Option<f64>,
    #[serde(rename = "Volume", default, deserialize_with = "csv::invalid_option")]
    volume: Option<f64>,
    #[serde(
        rename = "Line Width F1 (Hz)",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    linewidth_f1: Option<f64>,
    #[serde(
        rename = "Line Width F2 (Hz)",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    linewidth_f2: Option<f64>,
    #[serde(rename = "Merit", default)]
    merit: String,
    #[serde(rename = "Fit Method", default)]
    fit_method: String,
    #[serde(rename = "Vol. Method", default)]
    volume_method: String,
    #[serde(rename = "Details", default)]
    details: String,
}

impl From<PeaklistRecord> for RawPeak {
    fn from(r: PeaklistRecord) -> Self {
        let nan = |v: Option<f64>| v.unwrap_or(f64::NAN);
        Self {
            assign_f1: r.assign_f1,
            assign_f2: r.assign_f2,
            observation: Observation {
                position_f1: nan(r.position_f1),
                position_f2: nan(r.position_f2),
                height: nan(r.height),
                volume: nan(r.volume),
                linewidth_f1: nan(r.linewidth_f1),
                linewidth_f2: nan(r.linewidth_f2),
            },
            bookkeeping: Bookkeeping {
                merit: r.merit,
                fit_method: r.fit_method,
                volume_method: r.volume_method,
                details: r.details,
            },
        }
    }
}

/// Reads a normalized comma-separated peaklist.
///
/// Rows whose `Assign F1` is blank are picked-but-unassigned peaks and are
/// skipped; they carry no residue identity to reconcile.
pub fn read_peaklist<R: Read>(reader: R) -> Result<Vec<RawPeak>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut peaks = Vec::new();
    let mut skipped = 0usize;
    for result in csv_reader.deserialize::<PeaklistRecord>() {
        let record = result?;
        if record.assign_f1.trim().is_empty() {
            skipped += 1;
            continue;
        }
        peaks.push(record.into());
    }
    if skipped > 0 {
        debug!(skipped, "Skipped peaks without an assignment.");
    }
    Ok(peaks)
}

pub fn read_peaklist_from_path(path: &Path) -> Result<Vec<RawPeak>, csv::Error> {
    let file = std::fs::File::open(path)?;
    read_peaklist(std::io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const HEADER: &str = "Assign F1,Assign F2,Position F1,Position F2,Height,Volume,Line Width F1 (Hz),Line Width F2 (Hz),Merit,Fit Method,Vol. Method,Details";

    #[test]
    fn reads_all_schema_columns() {
        let content = format!(
            "{HEADER}\n45LysH,45LysN,8.123,121.45,15000.5,80000,21.3,30.1,1.0,parabolic,box sum,None\n"
        );
        let peaks = read_peaklist(content.as_bytes()).unwrap();
        assert_eq!(peaks.len(), 1);
        let p = &peaks[0];
        assert_eq!(p.assign_f1, "45LysH");
        assert_eq!(p.assign_f2, "45LysN");
        assert_eq!(p.observation.position_f1, 8.123);
        assert_eq!(p.observation.position_f2, 121.45);
        assert_eq!(p.observation.height, 15000.5);
        assert_eq!(p.observation.volume, 80000.0);
        assert_eq!(p.observation.linewidth_f2, 30.1);
        assert_eq!(p.bookkeeping.fit_method, "parabolic");
        assert_eq!(p.bookkeeping.volume_method, "box sum");
        assert_eq!(p.bookkeeping.details, "None");
    }

    #[test]
    fn missing_numeric_values_become_nan() {
        let content = format!("{HEADER}\n3GlyH,3GlyN,8.0,,,n/a,,,,,,\n");
        let peaks = read_peaklist(content.as_bytes()).unwrap();
        let obs = peaks[0].observation;
        assert_eq!(obs.position_f1, 8.0);
        assert!(obs.position_f2.is_nan());
        assert!(obs.height.is_nan());
        assert!(obs.volume.is_nan());
    }

    #[test]
    fn optional_bookkeeping_columns_may_be_absent() {
        let content = "Assign F1,Assign F2,Position F1,Position F2,Height,Volume\n7AlaH,7AlaN,8.2,123.0,10,20\n";
        let peaks = read_peaklist(content.as_bytes()).unwrap();
        assert_eq!(peaks.len(), 1);
        assert!(peaks[0].bookkeeping.merit.is_empty());
        assert!(peaks[0].observation.linewidth_f1.is_nan());
    }

    #[test]
    fn rows_without_assignment_are_skipped() {
        let content = format!("{HEADER}\n,,8.0,120.0,1,1,1,1,,,,\n5SerH,5SerN,8.1,116.0,1,1,1,1,,,,\n");
        let peaks = read_peaklist(content.as_bytes()).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].assign_f1, "5SerH");
    }

    #[test]
    fn read_from_path_reports_missing_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        assert!(read_peaklist_from_path(&missing).is_err());

        let path = dir.path().join("ok.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "1MetH,1MetN,8.5,122.0,1,1,1,1,,,,").unwrap();
        drop(file);
        assert_eq!(read_peaklist_from_path(&path).unwrap().len(), 1);
    }
}
