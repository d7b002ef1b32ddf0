use super::dataset::ConditionTree;
use super::error::EngineError;
use crate::core::io::fasta::Sequence;
use crate::core::models::conditions::{Axis, Coordinate, GroupKey};
use crate::core::models::peak::{Bookkeeping, Observation, PeakRow, PeakStatus};
use crate::core::models::peaklist::PeaklistTable;
use crate::core::models::residue::{ResidueKey, assignment_label};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Status and bookkeeping given to rows created by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillValues {
    pub status: PeakStatus,
    pub merit: String,
    pub fit_method: String,
    pub volume_method: String,
    pub details: String,
}

impl FillValues {
    fn with_status(status: PeakStatus) -> Self {
        Self {
            status,
            merit: "0".to_string(),
            fit_method: "None".to_string(),
            volume_method: "None".to_string(),
            details: "None".to_string(),
        }
    }

    pub fn lost() -> Self {
        Self::with_status(PeakStatus::Lost)
    }

    pub fn unassigned() -> Self {
        Self::with_status(PeakStatus::Unassigned)
    }

    fn bookkeeping(&self) -> Bookkeeping {
        Bookkeeping {
            merit: self.merit.clone(),
            fit_method: self.fit_method.clone(),
            volume_method: self.volume_method.clone(),
            details: self.details.clone(),
        }
    }

    /// A placeholder row carrying `template`'s sequence annotation.
    ///
    /// Rows created from a template that was never measured stay
    /// `unassigned` whatever the fill status.
    fn row_from(&self, template: &PeakRow) -> PeakRow {
        let status = match template.status {
            PeakStatus::Unassigned => PeakStatus::Unassigned,
            _ => self.status,
        };
        PeakRow {
            residue: template.residue,
            residue_type: template.residue_type,
            assign_f1: template.assign_f1.clone(),
            assign_f2: template.assign_f2.clone(),
            observation: Observation::missing(),
            status,
            bookkeeping: self.bookkeeping(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub dropped: usize,
}

impl ReconcileSummary {
    pub fn is_unchanged(&self) -> bool {
        self.added == 0 && self.dropped == 0
    }
}

/// Reindexes `target` onto the residue axis of `reference`.
///
/// Residues missing from `target` are created from the reference row with
/// NaN observations and `fill`'s status and bookkeeping. Residues that only
/// `target` has are dropped. Afterwards `target` holds exactly the
/// reference's residues in the reference's order.
pub fn reconcile(
    reference: &PeaklistTable,
    target: &mut PeaklistTable,
    fill: &FillValues,
) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();
    let old_rows = std::mem::take(target).into_rows();
    let mut old = old_rows.into_iter().peekable();
    let mut rows = Vec::with_capacity(reference.len());

    for ref_row in reference.rows() {
        while old.next_if(|row| row.residue < ref_row.residue).is_some() {
            summary.dropped += 1;
        }
        match old.next_if(|row| row.residue == ref_row.residue) {
            Some(row) => rows.push(row),
            None => {
                rows.push(fill.row_from(ref_row));
                summary.added += 1;
            }
        }
    }
    summary.dropped += old.count();

    target.replace_rows(rows);
    summary
}

/// Adds to `reference` every residue of `other` it does not have yet,
/// returning how many rows were added.
pub fn absorb(reference: &mut PeaklistTable, other: &PeaklistTable, fill: &FillValues) -> usize {
    let new_rows: Vec<PeakRow> = other
        .rows()
        .iter()
        .filter(|row| !reference.contains(row.residue))
        .map(|row| fill.row_from(row))
        .collect();
    if new_rows.is_empty() {
        return 0;
    }
    let added = new_rows.len();
    let mut rows = std::mem::take(reference).into_rows();
    rows.extend(new_rows);
    rows.sort_by_key(|row| row.residue);
    reference.replace_rows(rows);
    added
}

/// Builds a table of `unassigned` backbone rows covering a whole sequence.
pub fn sequence_table(sequence: &Sequence, start: isize) -> PeaklistTable {
    let fill = FillValues::unassigned();
    let rows = sequence
        .numbered(start)
        .map(|(number, residue_type)| {
            let residue = ResidueKey::backbone(number);
            PeakRow {
                residue,
                residue_type,
                assign_f1: assignment_label(residue, residue_type, "H"),
                assign_f2: assignment_label(residue, residue_type, "N"),
                observation: Observation::missing(),
                status: PeakStatus::Unassigned,
                bookkeeping: fill.bookkeeping(),
            }
        })
        .collect();
    let mut table = PeaklistTable::new();
    table.replace_rows(rows);
    table
}

fn reference_coordinate(tree: &ConditionTree, group: &GroupKey) -> Result<Coordinate, EngineError> {
    tree.keys()
        .reference_x()
        .map(|x| group.with_x(x))
        .ok_or_else(|| EngineError::Internal("condition keys have no cond1 labels".into()))
}

/// Expands the reference table of `group` with the full sequence.
pub fn fill_from_sequence(
    tree: &mut ConditionTree,
    group: &GroupKey,
    sequence: &Sequence,
    start: isize,
) -> Result<usize, EngineError> {
    let coordinate = reference_coordinate(tree, group)?;
    let seq_table = sequence_table(sequence, start);
    let reference = tree
        .get_mut(&coordinate)
        .ok_or_else(|| EngineError::Internal(format!("missing reference peaklist {coordinate}")))?;

    for row in reference.rows() {
        if let Some(seq_row) = seq_table.get(ResidueKey::backbone(row.residue.number)) {
            if seq_row.residue_type != row.residue_type {
                warn!(
                    coordinate = %coordinate,
                    residue = %row.residue,
                    assigned = %row.residue_type,
                    sequence = %seq_row.residue_type,
                    "Assignment disagrees with the sequence."
                );
            }
        }
    }

    let added = absorb(reference, &seq_table, &FillValues::unassigned());
    info!(coordinate = %coordinate, added, "Filled reference peaklist from sequence.");
    Ok(added)
}

/// Adds to each group's reference every residue that first appears in a
/// later step, as `unassigned`, so no measured peak is dropped by the
/// per-step reindexing.
pub fn absorb_late_residues(tree: &mut ConditionTree) -> Result<usize, EngineError> {
    let keys = tree.keys().clone();
    let fill = FillValues::unassigned();
    let mut total = 0;

    for group in keys.groups() {
        let ref_coord = reference_coordinate(tree, &group)?;
        let Some(mut reference) = tree.get(&ref_coord).cloned() else {
            continue;
        };
        let mut added = 0;
        for x in keys.x().iter().skip(1) {
            if let Some(step) = tree.get(&group.with_x(x)) {
                added += absorb(&mut reference, step, &fill);
            }
        }
        if added > 0 {
            warn!(
                coordinate = %ref_coord,
                added,
                "Residues absent from the reference experiment were added as unassigned."
            );
            tree.insert(ref_coord, reference);
            total += added;
        }
    }
    Ok(total)
}

/// Propagates residues between the reference tables of groups that differ
/// only along `axis` (cond2 or cond3), marking them `lost` where absent.
///
/// Every reference table of a line along `axis` ends with the union of the
/// residues of that line. Must run before same-dimension reconciliation.
pub fn expand_across(tree: &mut ConditionTree, axis: Axis) -> Result<usize, EngineError> {
    let keys = tree.keys().clone();
    let Some(ref_x) = keys.reference_x().map(str::to_string) else {
        return Ok(0);
    };

    let lines: Vec<Vec<Coordinate>> = match axis {
        Axis::Cond2 => keys
            .z()
            .iter()
            .map(|z| keys.y().iter().map(|y| Coordinate::new(z.clone(), y.clone(), ref_x.clone())).collect())
            .collect(),
        Axis::Cond3 => keys
            .y()
            .iter()
            .map(|y| keys.z().iter().map(|z| Coordinate::new(z.clone(), y.clone(), ref_x.clone())).collect())
            .collect(),
        Axis::Cond1 => {
            return Err(EngineError::Internal(
                "cross-dimension expansion runs along cond2 or cond3".into(),
            ));
        }
    };

    let fill = FillValues::lost();
    let mut total = 0;
    for line in lines {
        let mut union = PeaklistTable::new();
        for coordinate in &line {
            if let Some(table) = tree.get(coordinate) {
                absorb(&mut union, table, &fill);
            }
        }
        // A residue unassigned in the first table holding it stays unassigned.
        for coordinate in &line {
            if let Some(table) = tree.get_mut(coordinate) {
                let added = absorb(table, &union, &fill);
                if added > 0 {
                    debug!(coordinate = %coordinate, added, axis = %axis, "Expanded reference across conditions.");
                }
                total += added;
            }
        }
    }
    info!(axis = %axis, added = total, "Cross-dimension expansion finished.");
    Ok(total)
}

/// Gives every group reference the union of all group references, adding
/// the missing residues as `unassigned`.
///
/// Runs after [`expand_across`], so residues propagated by a configured
/// expansion keep their `lost` status. Afterwards every table of the tree
/// can share one residue axis.
pub fn unify_references(tree: &mut ConditionTree) -> Result<usize, EngineError> {
    let keys = tree.keys().clone();
    let fill = FillValues::unassigned();

    let mut references = Vec::new();
    for group in keys.groups() {
        let coordinate = reference_coordinate(tree, &group)?;
        if tree.get(&coordinate).is_some() {
            references.push(coordinate);
        }
    }

    let mut union = PeaklistTable::new();
    for coordinate in &references {
        if let Some(table) = tree.get(coordinate) {
            absorb(&mut union, table, &fill);
        }
    }

    let mut total = 0;
    for coordinate in &references {
        if let Some(table) = tree.get_mut(coordinate) {
            let added = absorb(table, &union, &fill);
            if added > 0 {
                debug!(coordinate = %coordinate, added, "Added residues observed in other groups.");
            }
            total += added;
        }
    }
    if total > 0 {
        info!(resonance = %tree.resonance(), added = total, "Unified residue axes across groups.");
    }
    Ok(total)
}

/// Reconciles every non-reference step of every group onto its group
/// reference, filling absent residues as `lost`.
pub fn reconcile_tree(tree: &mut ConditionTree) -> Result<ReconcileSummary, EngineError> {
    let keys = tree.keys().clone();
    let fill = FillValues::lost();
    let mut total = ReconcileSummary::default();

    for group in keys.groups() {
        let ref_coord = reference_coordinate(tree, &group)?;
        let Some(reference) = tree.get(&ref_coord).cloned() else {
            continue;
        };
        for x in keys.x().iter().skip(1) {
            let coordinate = group.with_x(x);
            if let Some(target) = tree.get_mut(&coordinate) {
                let summary = reconcile(&reference, target, &fill);
                if !summary.is_unchanged() {
                    debug!(
                        coordinate = %coordinate,
                        lost = summary.added,
                        dropped = summary.dropped,
                        "Reconciled peaklist."
                    );
                }
                total.added += summary.added;
                total.dropped += summary.dropped;
            }
        }
    }
    info!(
        resonance = %tree.resonance(),
        lost = total.added,
        dropped = total.dropped,
        "Reconciled residue axes."
    );
    Ok(total)
}

/// Position offsets `(ΔF1, ΔF2)` of the internal reference residue in each
/// experiment relative to its group's reference experiment.
pub fn cs_reference_offsets(
    tree: &ConditionTree,
    residue: isize,
) -> Result<HashMap<Coordinate, (f64, f64)>, EngineError> {
    let key = ResidueKey::backbone(residue);
    let keys = tree.keys();
    let mut offsets = HashMap::new();

    for group in keys.groups() {
        let ref_coord = reference_coordinate(tree, &group)?;
        let anchor = tree
            .get(&ref_coord)
            .and_then(|t| t.get(key))
            .filter(|row| row.status == PeakStatus::Measured)
            .ok_or_else(|| EngineError::ReferenceResidueMissing {
                residue,
                coordinate: ref_coord.clone(),
            })?;
        let (f1, f2) = (anchor.observation.position_f1, anchor.observation.position_f2);

        for x in keys.x() {
            let coordinate = group.with_x(x);
            match tree.get(&coordinate).and_then(|t| t.get(key)) {
                Some(row) if row.status == PeakStatus::Measured => {
                    offsets.insert(
                        coordinate,
                        (row.observation.position_f1 - f1, row.observation.position_f2 - f2),
                    );
                }
                _ => {
                    warn!(coordinate = %coordinate, residue, "Reference residue not measured; skipping correction.");
                }
            }
        }
    }
    Ok(offsets)
}

/// Subtracts the per-experiment offsets from every measured position.
pub fn apply_cs_offsets(tree: &mut ConditionTree, offsets: &HashMap<Coordinate, (f64, f64)>) {
    for (coordinate, &(d1, d2)) in offsets {
        let Some(table) = tree.get_mut(coordinate) else {
            continue;
        };
        for row in table.rows_mut() {
            if row.status == PeakStatus::Measured {
                row.observation.position_f1 -= d1;
                row.observation.position_f2 -= d2;
            }
        }
        debug!(coordinate = %coordinate, d_f1 = d1, d_f2 = d2, "Applied chemical-shift referencing.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::fasta::parse_fasta;
    use crate::core::models::conditions::{ConditionKeys, ResonanceType};
    use crate::core::models::peaklist::test_support::measured_row;
    use crate::core::models::residue::AminoAcid;

    fn table(numbers: &[isize]) -> PeaklistTable {
        PeaklistTable::from_rows(
            numbers
                .iter()
                .map(|&n| measured_row(n, AminoAcid::Alanine, 8.0 + n as f64 * 0.01, 120.0))
                .collect(),
        )
        .unwrap()
    }

    fn numbers(table: &PeaklistTable) -> Vec<isize> {
        table.residue_keys().map(|k| k.number).collect()
    }

    #[test]
    fn reconcile_matches_reference_axis_and_marks_lost() {
        let reference = table(&[1, 2, 3, 4]);
        let mut target = table(&[1, 3, 5]);
        let summary = reconcile(&reference, &mut target, &FillValues::lost());

        assert_eq!(numbers(&target), vec![1, 2, 3, 4]);
        assert_eq!(summary, ReconcileSummary { added: 2, dropped: 1 });
        let lost = target.get(ResidueKey::backbone(2)).unwrap();
        assert_eq!(lost.status, PeakStatus::Lost);
        assert!(lost.observation.is_missing());
        assert_eq!(lost.assign_f1, "2AlaH");
        assert_eq!(lost.bookkeeping.merit, "0");
        assert_eq!(lost.bookkeeping.details, "None");
        assert_eq!(target.get(ResidueKey::backbone(3)).unwrap().status, PeakStatus::Measured);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let reference = table(&[1, 2, 3]);
        let mut target = table(&[2]);
        reconcile(&reference, &mut target, &FillValues::lost());
        let once = target.clone();
        let summary = reconcile(&reference, &mut target, &FillValues::lost());
        assert!(summary.is_unchanged());
        assert_eq!(target, once);
    }

    #[test]
    fn rows_from_unassigned_reference_rows_stay_unassigned() {
        let mut reference = table(&[1]);
        let seq = parse_fasta("AA").unwrap();
        absorb(&mut reference, &sequence_table(&seq, 1), &FillValues::unassigned());
        let mut target = table(&[1]);
        reconcile(&reference, &mut target, &FillValues::lost());
        assert_eq!(target.get(ResidueKey::backbone(2)).unwrap().status, PeakStatus::Unassigned);
    }

    #[test]
    fn sequence_table_numbers_from_start_with_backbone_labels() {
        let seq = parse_fasta("MG").unwrap();
        let t = sequence_table(&seq, 10);
        assert_eq!(numbers(&t), vec![10, 11]);
        let row = t.get(ResidueKey::backbone(11)).unwrap();
        assert_eq!(row.assign_f1, "11GlyH");
        assert_eq!(row.assign_f2, "11GlyN");
        assert_eq!(row.status, PeakStatus::Unassigned);
    }

    fn tree(keys: ConditionKeys, tables: Vec<(Coordinate, PeaklistTable)>) -> ConditionTree {
        let mut tree = ConditionTree::new(ResonanceType::Backbone, keys);
        for (c, t) in tables {
            tree.insert(c, t);
        }
        tree
    }

    #[test]
    fn full_reconciliation_gives_every_table_its_reference_axis() {
        let keys = ConditionKeys::new(vec!["z"], vec!["y"], vec!["0", "1", "2"]);
        let mut tree = tree(
            keys,
            vec![
                (Coordinate::new("z", "y", "0"), table(&[1, 2, 3])),
                (Coordinate::new("z", "y", "1"), table(&[1, 3])),
                (Coordinate::new("z", "y", "2"), table(&[3, 4])),
            ],
        );
        let raw_measured: Vec<Vec<isize>> = tree.iter().map(|(_, t)| numbers(t)).collect();

        let seq = parse_fasta("AAAAA").unwrap();
        let group = GroupKey::new("z", "y");
        fill_from_sequence(&mut tree, &group, &seq, 1).unwrap();
        absorb_late_residues(&mut tree).unwrap();
        reconcile_tree(&mut tree).unwrap();

        let reference_axis = numbers(tree.get(&Coordinate::new("z", "y", "0")).unwrap());
        assert_eq!(reference_axis, vec![1, 2, 3, 4, 5]);
        for ((_, t), measured) in tree.iter().zip(raw_measured) {
            assert_eq!(numbers(t), reference_axis);
            let now_measured: Vec<isize> = t
                .keys_with_status(PeakStatus::Measured)
                .iter()
                .map(|k| k.number)
                .collect();
            assert_eq!(now_measured, measured);
        }
        let step1 = tree.get(&Coordinate::new("z", "y", "1")).unwrap();
        assert_eq!(step1.get(ResidueKey::backbone(2)).unwrap().status, PeakStatus::Lost);
        assert_eq!(step1.get(ResidueKey::backbone(4)).unwrap().status, PeakStatus::Unassigned);
        assert_eq!(step1.get(ResidueKey::backbone(5)).unwrap().status, PeakStatus::Unassigned);
    }

    #[test]
    fn expansion_across_cond2_propagates_lost_residues() {
        let keys = ConditionKeys::new(vec!["z"], vec!["a", "b"], vec!["0", "1"]);
        let mut tree = tree(
            keys,
            vec![
                (Coordinate::new("z", "a", "0"), table(&[1, 2])),
                (Coordinate::new("z", "a", "1"), table(&[1, 2])),
                (Coordinate::new("z", "b", "0"), table(&[1, 3])),
                (Coordinate::new("z", "b", "1"), table(&[3])),
            ],
        );
        let added = expand_across(&mut tree, Axis::Cond2).unwrap();
        assert_eq!(added, 2);
        reconcile_tree(&mut tree).unwrap();

        for (_, t) in tree.iter() {
            assert_eq!(numbers(t), vec![1, 2, 3]);
        }
        let a_ref = tree.get(&Coordinate::new("z", "a", "0")).unwrap();
        assert_eq!(a_ref.get(ResidueKey::backbone(3)).unwrap().status, PeakStatus::Lost);
        let b_step = tree.get(&Coordinate::new("z", "b", "1")).unwrap();
        assert_eq!(b_step.get(ResidueKey::backbone(1)).unwrap().status, PeakStatus::Lost);
        assert_eq!(b_step.get(ResidueKey::backbone(2)).unwrap().status, PeakStatus::Lost);
        assert!(expand_across(&mut tree, Axis::Cond1).is_err());
    }

    #[test]
    fn groups_with_different_residues_share_one_axis() {
        let keys = ConditionKeys::new(vec!["z"], vec!["mut", "wt"], vec!["0", "1"]);
        let mut tree = tree(
            keys,
            vec![
                (Coordinate::new("z", "wt", "0"), table(&[1])),
                (Coordinate::new("z", "wt", "1"), table(&[1])),
                (Coordinate::new("z", "mut", "0"), table(&[1, 2])),
                (Coordinate::new("z", "mut", "1"), table(&[1, 2])),
            ],
        );
        absorb_late_residues(&mut tree).unwrap();
        assert_eq!(unify_references(&mut tree).unwrap(), 1);
        reconcile_tree(&mut tree).unwrap();

        for (_, t) in tree.iter() {
            assert_eq!(numbers(t), vec![1, 2]);
        }
        let wt_ref = tree.get(&Coordinate::new("z", "wt", "0")).unwrap();
        assert_eq!(wt_ref.get(ResidueKey::backbone(2)).unwrap().status, PeakStatus::Unassigned);
        let wt_step = tree.get(&Coordinate::new("z", "wt", "1")).unwrap();
        assert_eq!(wt_step.get(ResidueKey::backbone(2)).unwrap().status, PeakStatus::Unassigned);
        let mut_step = tree.get(&Coordinate::new("z", "mut", "1")).unwrap();
        assert_eq!(mut_step.get(ResidueKey::backbone(2)).unwrap().status, PeakStatus::Measured);
    }

    #[test]
    fn unification_keeps_lost_status_from_expansion() {
        let keys = ConditionKeys::new(vec!["z"], vec!["a", "b"], vec!["0"]);
        let mut tree = tree(
            keys,
            vec![
                (Coordinate::new("z", "a", "0"), table(&[1])),
                (Coordinate::new("z", "b", "0"), table(&[1, 2])),
            ],
        );
        expand_across(&mut tree, Axis::Cond2).unwrap();
        assert_eq!(unify_references(&mut tree).unwrap(), 0);
        let a_ref = tree.get(&Coordinate::new("z", "a", "0")).unwrap();
        assert_eq!(a_ref.get(ResidueKey::backbone(2)).unwrap().status, PeakStatus::Lost);
    }

    #[test]
    fn cs_referencing_aligns_the_reference_residue() {
        let keys = ConditionKeys::new(vec!["z"], vec!["y"], vec!["0", "1"]);
        let mut shifted = table(&[1, 2]);
        for row in shifted.rows_mut() {
            row.observation.position_f1 += 0.05;
            row.observation.position_f2 -= 0.5;
        }
        let mut tree = tree(
            keys,
            vec![
                (Coordinate::new("z", "y", "0"), table(&[1, 2])),
                (Coordinate::new("z", "y", "1"), shifted),
            ],
        );
        let offsets = cs_reference_offsets(&tree, 1).unwrap();
        apply_cs_offsets(&mut tree, &offsets);

        let reference = tree.get(&Coordinate::new("z", "y", "0")).unwrap().clone();
        let corrected = tree.get(&Coordinate::new("z", "y", "1")).unwrap();
        for (a, b) in reference.rows().iter().zip(corrected.rows()) {
            assert!((a.observation.position_f1 - b.observation.position_f1).abs() < 1e-12);
            assert!((a.observation.position_f2 - b.observation.position_f2).abs() < 1e-12);
        }

        assert!(matches!(
            cs_reference_offsets(&tree, 99),
            Err(EngineError::ReferenceResidueMissing { residue: 99, .. })
        ));
    }
}
