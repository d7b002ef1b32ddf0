use super::error::{EngineError, InputKind};
use super::dataset::ConditionTree;
use super::titration::{TitrationView, ViewMeta};
use crate::core::models::conditions::{Axis, ConditionKeys, ResonanceType};
use crate::core::models::peak::{PeakColumn, PeakStatus, ResidueAnnotation};
use ndarray::{Array4, Array5, s};
use tracing::{debug, info, instrument};

/// Reconciled peaklists of one resonance type as a dense array indexed by
/// `(z, y, x, residue, column)`.
#[derive(Debug, Clone)]
pub struct DatasetCube {
    resonance: ResonanceType,
    keys: ConditionKeys,
    residues: Vec<ResidueAnnotation>,
    data: Array5<f64>,
    status: Array4<PeakStatus>,
}

impl DatasetCube {
    /// Stacks every table of a reconciled tree.
    ///
    /// All tables must carry the same residue axis in the same order.
    #[instrument(skip_all, name = "build_cube", fields(resonance = %tree.resonance()))]
    pub fn build(tree: &ConditionTree) -> Result<Self, EngineError> {
        let keys = tree.keys().clone();
        let missing = tree.missing();
        if !missing.is_empty() {
            return Err(EngineError::Incomplete {
                kind: InputKind::Peaklist,
                expected: keys.expected_count(),
                found: keys.expected_count() - missing.len(),
                missing: missing.iter().map(ToString::to_string).collect(),
            });
        }

        let mut tables = tree.iter();
        let Some((_, first)) = tables.next() else {
            return Err(EngineError::Internal("cannot build a cube from an empty tree".into()));
        };
        let residues: Vec<ResidueAnnotation> = first.rows().iter().map(ResidueAnnotation::from).collect();

        let (nz, ny, nx) = keys.shape();
        let n_res = residues.len();
        let n_col = PeakColumn::ALL.len();
        let mut data = Array5::<f64>::from_elem((nz, ny, nx, n_res, n_col), f64::NAN);
        let mut status = Array4::<PeakStatus>::default((nz, ny, nx, n_res));

        for (coordinate, table) in tree.iter() {
            if table.len() != n_res {
                return Err(EngineError::ShapeMismatch {
                    coordinate,
                    expected: n_res,
                    found: table.len(),
                });
            }
            if let Some(position) = table
                .rows()
                .iter()
                .zip(&residues)
                .position(|(row, annotation)| row.residue != annotation.residue)
            {
                return Err(EngineError::ResidueAxisMismatch { coordinate, position });
            }

            let (Some(zi), Some(yi), Some(xi)) = (
                keys.index_of(Axis::Cond3, &coordinate.z),
                keys.index_of(Axis::Cond2, &coordinate.y),
                keys.index_of(Axis::Cond1, &coordinate.x),
            ) else {
                return Err(EngineError::Internal(format!("coordinate {coordinate} is not declared")));
            };
            for (r, row) in table.rows().iter().enumerate() {
                status[(zi, yi, xi, r)] = row.status;
                for column in PeakColumn::ALL {
                    data[(zi, yi, xi, r, column.index())] = row.observation.get(column);
                }
            }
        }

        info!(shape = ?(nz, ny, nx, n_res), "Built dataset cube.");
        Ok(Self {
            resonance: tree.resonance(),
            keys,
            residues,
            data,
            status,
        })
    }

    pub fn resonance(&self) -> ResonanceType {
        self.resonance
    }

    pub fn keys(&self) -> &ConditionKeys {
        &self.keys
    }

    pub fn residues(&self) -> &[ResidueAnnotation] {
        &self.residues
    }

    /// `(z, y, x, residues)`.
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        self.status.dim()
    }

    fn label_index(&self, axis: Axis, label: &str) -> Result<usize, EngineError> {
        self.keys
            .index_of(axis, label)
            .ok_or_else(|| EngineError::UnknownStep {
                axis,
                label: label.to_string(),
            })
    }

    /// The series along `axis` with the two other axes fixed at `outer` and
    /// `inner` (in the order given by [`Axis::fixed_axes`]).
    pub fn view(&self, axis: Axis, outer: &str, inner: &str) -> Result<TitrationView, EngineError> {
        let (outer_axis, inner_axis) = axis.fixed_axes();
        let oi = self.label_index(outer_axis, outer)?;
        let ii = self.label_index(inner_axis, inner)?;

        let (observations, status) = match axis {
            Axis::Cond1 => (
                self.data.slice(s![oi, ii, .., .., ..]).to_owned(),
                self.status.slice(s![oi, ii, .., ..]).to_owned(),
            ),
            Axis::Cond2 => (
                self.data.slice(s![oi, .., ii, .., ..]).to_owned(),
                self.status.slice(s![oi, .., ii, ..]).to_owned(),
            ),
            Axis::Cond3 => (
                self.data.slice(s![.., oi, ii, .., ..]).to_owned(),
                self.status.slice(s![.., oi, ii, ..]).to_owned(),
            ),
        };

        let meta = ViewMeta {
            axis,
            fixed: [(outer_axis, outer.to_string()), (inner_axis, inner.to_string())],
            resonance: self.resonance,
            compared: None,
        };
        debug!(view = %meta.label(), "Sliced titration view.");
        TitrationView::new(
            meta,
            self.residues.clone(),
            self.keys.along(axis).to_vec(),
            observations,
            status,
        )
    }

    /// One view per combination of fixed labels.
    pub fn views(&self, axis: Axis) -> Result<Vec<TitrationView>, EngineError> {
        let (outer_axis, inner_axis) = axis.fixed_axes();
        let mut views = Vec::new();
        for outer in self.keys.along(outer_axis) {
            for inner in self.keys.along(inner_axis) {
                views.push(self.view(axis, outer, inner)?);
            }
        }
        info!(axis = %axis, count = views.len(), "Prepared titration views.");
        Ok(views)
    }
}
