use crate::core::models::peak::{PeakStatus, ResidueAnnotation};
use crate::core::models::residue::ResidueKey;
use ndarray::{ArrayView1, ArrayView2};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to create output directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// `# key: value` lines written above a table to record the conditions it
/// was computed under.
pub type HeaderContext = Vec<(String, String)>;

/// One derived column of a titration view, laid out residue by step.
#[derive(Debug, Clone)]
pub struct StepTable<'a> {
    pub column: &'a str,
    pub context: &'a [(String, String)],
    pub residues: &'a [ResidueAnnotation],
    pub steps: &'a [String],
    /// Shape `(steps, residues)`.
    pub values: ArrayView2<'a, f64>,
}

/// Every column of one experiment step.
#[derive(Debug, Clone)]
pub struct ExperimentTable<'a> {
    pub context: &'a [(String, String)],
    pub residues: &'a [ResidueAnnotation],
    pub statuses: ArrayView1<'a, PeakStatus>,
    pub columns: Vec<(&'a str, ArrayView1<'a, f64>)>,
}

/// One line of a fit report.
#[derive(Debug, Clone, PartialEq)]
pub struct FitReportRow {
    pub residue: ResidueKey,
    pub status: &'static str,
    pub vmax: f64,
    pub half_max: f64,
    pub kd: f64,
    pub hill: f64,
    pub r_squared: f64,
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{value:.6}")
    }
}

fn write_context<W: Write>(writer: &mut W, context: &[(String, String)]) -> std::io::Result<()> {
    for (key, value) in context {
        writeln!(writer, "# {key}: {value}")?;
    }
    Ok(())
}

fn tsv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(false)
        .from_writer(writer)
}

pub fn write_step_table<W: Write>(mut writer: W, table: &StepTable<'_>) -> Result<(), csv::Error> {
    write_context(&mut writer, table.context)?;
    writeln!(writer, "# column: {}", table.column)?;

    let mut wtr = tsv_writer(writer);
    let mut header = vec!["Res#".to_string(), "1-letter".to_string(), "3-letter".to_string()];
    header.extend(table.steps.iter().cloned());
    wtr.write_record(&header)?;

    for (r, residue) in table.residues.iter().enumerate() {
        let mut record = vec![
            residue.residue.to_string(),
            residue.residue_type.one_letter().to_string(),
            residue.residue_type.three_letter().to_string(),
        ];
        record.extend(table.values.column(r).iter().map(|&v| format_value(v)));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn attribute_name(column: &str) -> String {
    column
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

fn residues_with_status(
    residues: &[ResidueAnnotation],
    statuses: ArrayView1<'_, PeakStatus>,
    status: PeakStatus,
) -> String {
    residues
        .iter()
        .zip(statuses.iter())
        .filter(|(_, s)| **s == status)
        .map(|(r, _)| r.residue.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Writes one step of a column in the residue attribute format read by
/// structure viewers (`attribute:` / `match mode:` / `recipient:` header,
/// then `\t:<residue>\t<value>` lines).
///
/// Only measured residues with a finite value get a value line; lost and
/// unassigned residues are listed in comment lines instead.
pub fn write_attribute_file<W: Write>(
    mut writer: W,
    column: &str,
    residues: &[ResidueAnnotation],
    values: ArrayView1<'_, f64>,
    statuses: ArrayView1<'_, PeakStatus>,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "# lost residues: {}",
        residues_with_status(residues, statuses, PeakStatus::Lost)
    )?;
    writeln!(
        writer,
        "# unassigned residues: {}",
        residues_with_status(residues, statuses, PeakStatus::Unassigned)
    )?;
    writeln!(writer, "attribute: {}", attribute_name(column))?;
    writeln!(writer, "match mode: 1-to-1")?;
    writeln!(writer, "recipient: residues")?;

    for ((residue, &value), &status) in residues.iter().zip(values.iter()).zip(statuses.iter()) {
        if status == PeakStatus::Measured && value.is_finite() {
            writeln!(writer, "\t:{}\t{}", residue.residue.number, format_value(value))?;
        }
    }
    writer.flush()
}

pub fn write_fit_report<W: Write>(
    mut writer: W,
    column: &str,
    context: &[(String, String)],
    rows: &[FitReportRow],
) -> Result<(), csv::Error> {
    write_context(&mut writer, context)?;
    writeln!(writer, "# fitted column: {column}")?;

    let mut wtr = tsv_writer(writer);
    wtr.write_record(["Res#", "Status", "Vmax", "Half-max", "Kd", "n", "R2"])?;
    for row in rows {
        wtr.write_record([
            row.residue.to_string(),
            row.status.to_string(),
            format_value(row.vmax),
            format_value(row.half_max),
            format_value(row.kd),
            format_value(row.hill),
            format_value(row.r_squared),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_experiment_table<W: Write>(
    mut writer: W,
    table: &ExperimentTable<'_>,
) -> Result<(), csv::Error> {
    write_context(&mut writer, table.context)?;

    let mut wtr = tsv_writer(writer);
    let mut header: Vec<String> = ["Res#", "1-letter", "3-letter", "Assign F1", "Assign F2", "Peak Status"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(table.columns.iter().map(|(name, _)| name.to_string()));
    wtr.write_record(&header)?;

    for (r, residue) in table.residues.iter().enumerate() {
        let mut record = vec![
            residue.residue.to_string(),
            residue.residue_type.one_letter().to_string(),
            residue.residue_type.three_letter().to_string(),
            residue.assign_f1.clone(),
            residue.assign_f2.clone(),
            table.statuses[r].to_string(),
        ];
        record.extend(table.columns.iter().map(|(_, values)| format_value(values[r])));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn create_file(path: &Path) -> Result<BufWriter<File>, ExportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ExportError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| ExportError::Write {
            path: path.to_path_buf(),
            source: source.into(),
        })
}

/// Creates `path` (and its parent directories) and hands a buffered writer
/// to `write`, attaching the path to any error.
pub fn export_to_path<F, E>(path: &Path, write: F) -> Result<(), ExportError>
where
    F: FnOnce(BufWriter<File>) -> Result<(), E>,
    E: Into<csv::Error>,
{
    let file = create_file(path)?;
    write(file).map_err(|e| ExportError::Write {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::residue::{AminoAcid, SidechainTag};
    use ndarray::{Array1, array};
    use tempfile::tempdir;

    fn annotations() -> Vec<ResidueAnnotation> {
        vec![
            ResidueAnnotation {
                residue: ResidueKey::backbone(1),
                residue_type: AminoAcid::Methionine,
                assign_f1: "1MetH".into(),
                assign_f2: "1MetN".into(),
            },
            ResidueAnnotation {
                residue: ResidueKey::backbone(2),
                residue_type: AminoAcid::Glycine,
                assign_f1: "2GlyH".into(),
                assign_f2: "2GlyN".into(),
            },
            ResidueAnnotation {
                residue: ResidueKey::sidechain(3, SidechainTag::A),
                residue_type: AminoAcid::Asparagine,
                assign_f1: "3AsnHD21a".into(),
                assign_f2: "3AsnND2a".into(),
            },
        ]
    }

    #[test]
    fn step_table_has_context_header_and_one_row_per_residue() {
        let residues = annotations();
        let steps = vec!["01_0".to_string(), "02_100".to_string()];
        let context = vec![("axis".to_string(), "cond1".to_string())];
        let values = array![[0.0, 0.0, 0.0], [0.05, f64::NAN, 0.1]];
        let table = StepTable {
            column: "CSP",
            context: &context,
            residues: &residues,
            steps: &steps,
            values: values.view(),
        };
        let mut out = Vec::new();
        write_step_table(&mut out, &table).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "# axis: cond1");
        assert_eq!(lines[1], "# column: CSP");
        assert_eq!(lines[2], "Res#\t1-letter\t3-letter\t01_0\t02_100");
        assert_eq!(lines[3], "1\tM\tMet\t0.000000\t0.050000");
        assert_eq!(lines[4], "2\tG\tGly\t0.000000\tNaN");
        assert_eq!(lines[5], "3a\tN\tAsn\t0.000000\t0.100000");
    }

    #[test]
    fn attribute_file_lists_lost_and_unassigned_separately() {
        let residues = annotations();
        let values = Array1::from(vec![0.2, f64::NAN, 0.0]);
        let statuses = Array1::from(vec![PeakStatus::Measured, PeakStatus::Lost, PeakStatus::Unassigned]);
        let mut out = Vec::new();
        write_attribute_file(&mut out, "H1_delta", &residues, values.view(), statuses.view()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("# lost residues: 2\n"));
        assert!(text.contains("# unassigned residues: 3a\n"));
        assert!(text.contains("attribute: h1_delta\n"));
        assert!(text.contains("\t:1\t0.200000\n"));
        assert!(!text.contains("\t:2\t"));
        assert!(!text.contains("\t:3\t"));
    }

    #[test]
    fn fit_report_and_experiment_table_write_through_export_to_path() {
        let dir = tempdir().unwrap();
        let report_path = dir.path().join("fits/CSP_fit.tsv");
        let rows = vec![FitReportRow {
            residue: ResidueKey::backbone(1),
            status: "OK",
            vmax: 1.0,
            half_max: 0.5,
            kd: 500.0,
            hill: 1.0,
            r_squared: 0.99,
        }];
        export_to_path(&report_path, |w| write_fit_report(w, "CSP", &[], &rows)).unwrap();
        let report = fs::read_to_string(&report_path).unwrap();
        assert!(report.contains("Res#\tStatus\tVmax\tHalf-max\tKd\tn\tR2\n"));
        assert!(report.contains("1\tOK\t1.000000\t0.500000\t500.000000\t1.000000\t0.990000\n"));

        let residues = annotations();
        let statuses = Array1::from(vec![PeakStatus::Measured, PeakStatus::Lost, PeakStatus::Unassigned]);
        let heights = Array1::from(vec![10.0, f64::NAN, f64::NAN]);
        let table = ExperimentTable {
            context: &[],
            residues: &residues,
            statuses: statuses.view(),
            columns: vec![("Height", heights.view())],
        };
        let table_path = dir.path().join("full/01_0.tsv");
        export_to_path(&table_path, |w| write_experiment_table(w, &table)).unwrap();
        let text = fs::read_to_string(&table_path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Res#\t1-letter\t3-letter\tAssign F1\tAssign F2\tPeak Status\tHeight");
        assert_eq!(lines[2], "2\tG\tGly\t2GlyH\t2GlyN\tlost\tNaN");
    }
}
