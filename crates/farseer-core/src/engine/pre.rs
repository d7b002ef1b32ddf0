//! Paramagnetic relaxation enhancement analysis on cond3 views.
//!
//! The observed intensity ratio of a paramagnetic experiment against its
//! diamagnetic reference is compared with a theoretical profile, and the
//! difference is smoothed with a Gaussian kernel along the residue axis.

use super::config::{GaussianParams, PreConfig};
use super::error::EngineError;
use super::titration::{Column, TitrationView};
use crate::core::io::dataset::{RawDataset, load_theoretical_profile};
use crate::core::io::pre::TheoreticalProfile;
use crate::core::models::conditions::{Axis, GroupKey};
use crate::core::models::peak::{PeakColumn, ResidueAnnotation};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis as ArrayAxis};
use tracing::{debug, info};

const SMOOTHED_COLUMNS: [(Column, PeakColumn, Column, Column); 2] = [
    (
        Column::HeightRatio,
        PeakColumn::Height,
        Column::HeightDeltaPre,
        Column::HeightDeltaPreSmooth,
    ),
    (
        Column::VolumeRatio,
        PeakColumn::Volume,
        Column::VolumeDeltaPre,
        Column::VolumeDeltaPreSmooth,
    ),
];

/// Loads the single `.pre` file stored with the paramagnetic peaklists of
/// `group`.
pub fn profile_for_group(raw: &RawDataset, group: &GroupKey) -> Result<TheoreticalProfile, EngineError> {
    match raw.pre_paths(group) {
        [] => Err(EngineError::MissingPreFile { group: group.clone() }),
        [path] => {
            let profile = load_theoretical_profile(path)?;
            debug!(group = %group, residues = profile.len(), tag = ?profile.tag_position, "Loaded theoretical PRE profile.");
            Ok(profile)
        }
        paths => Err(EngineError::AmbiguousPreFile {
            group: group.clone(),
            paths: paths.to_vec(),
        }),
    }
}

/// Theoretical values per `(step, residue)`: the profile on paramagnetic
/// steps, 1 on diamagnetic steps, NaN elsewhere or where the profile has no
/// entry.
pub fn theoretical_column(
    profile: &TheoreticalProfile,
    residues: &[ResidueAnnotation],
    steps: &[String],
    config: &PreConfig,
) -> Array2<f64> {
    Array2::from_shape_fn((steps.len(), residues.len()), |(i, r)| {
        let step = steps[i].as_str();
        if step == config.diamagnetic {
            1.0
        } else if step == config.paramagnetic {
            profile.value(residues[r].residue.number).unwrap_or(f64::NAN)
        } else {
            f64::NAN
        }
    })
}

/// `theoretical - observed`, with negative differences clamped to zero.
pub fn delta_pre(theoretical: ArrayView2<'_, f64>, observed: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut delta = &theoretical - &observed;
    delta.mapv_inplace(|v| if v < 0.0 { 0.0 } else { v });
    delta
}

/// Intensities of every step divided by those of the diamagnetic step at
/// `reference`, whatever the step order.
fn paramagnetic_ratio(intensities: ArrayView2<'_, f64>, reference: usize) -> Array2<f64> {
    let diamagnetic = intensities.row(reference);
    &intensities / &diamagnetic
}

/// Normalized Gaussian weights `exp(-u²/2)` with `u = offset / stddev`.
pub fn gaussian_kernel(params: &GaussianParams) -> Vec<f64> {
    let half = (params.window / 2) as f64;
    let weights: Vec<f64> = (0..params.window)
        .map(|i| {
            let u = (i as f64 - half) / params.stddev;
            (-0.5 * u * u).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Convolves `values` with the Gaussian kernel.
///
/// Edges are extended with the nearest value. NaN entries are skipped and
/// the remaining weights renormalized; a window with no finite value yields
/// NaN.
pub fn gaussian_smooth(values: ArrayView1<'_, f64>, params: &GaussianParams) -> Array1<f64> {
    let kernel = gaussian_kernel(params);
    let half = (params.window / 2) as isize;
    let n = values.len();
    if n == 0 {
        return Array1::zeros(0);
    }
    let last = n as isize - 1;

    Array1::from_shape_fn(n, |i| {
        let mut acc = 0.0;
        let mut weight = 0.0;
        for (k, w) in kernel.iter().enumerate() {
            let j = (i as isize + k as isize - half).clamp(0, last) as usize;
            let v = values[j];
            if v.is_finite() {
                acc += w * v;
                weight += w;
            }
        }
        if weight > 0.0 { acc / weight } else { f64::NAN }
    })
}

/// Adds the theoretical, delta and smoothed delta PRE columns to a cond3
/// view.
///
/// Each intensity ratio column present on the view selects an observable;
/// the observed value is recomputed against the diamagnetic step.
pub fn apply_pre(
    view: &mut TitrationView,
    profile: &TheoreticalProfile,
    config: &PreConfig,
) -> Result<(), EngineError> {
    let steps = view.steps();
    let reference = steps
        .iter()
        .position(|s| *s == config.diamagnetic)
        .filter(|_| view.meta().axis == Axis::Cond3 && steps.contains(&config.paramagnetic));
    let Some(reference) = reference else {
        return Err(EngineError::PreConditionsMissing {
            paramagnetic: config.paramagnetic.clone(),
            diamagnetic: config.diamagnetic.clone(),
        });
    };

    let theoretical = theoretical_column(profile, view.residues(), steps, config);
    let mut computed = 0;
    for (selector, source, target, smooth_target) in SMOOTHED_COLUMNS {
        if view.column(selector).is_none() {
            continue;
        }
        let Some(intensities) = view.column(Column::Raw(source)) else {
            continue;
        };
        let observed = paramagnetic_ratio(intensities, reference);
        let delta = delta_pre(theoretical.view(), observed.view());
        let mut smoothed = Array2::<f64>::zeros(delta.dim());
        for (step, mut row) in smoothed.axis_iter_mut(ArrayAxis(0)).enumerate() {
            row.assign(&gaussian_smooth(delta.row(step), &config.gaussian));
        }
        view.set_column(target, delta)?;
        view.set_column(smooth_target, smoothed)?;
        computed += 1;
    }
    if computed == 0 {
        return Err(EngineError::MissingColumn(Column::HeightRatio.name().to_string()));
    }
    view.set_column(Column::TheoreticalPre, theoretical)?;

    info!(view = %view.meta().label(), tag = ?profile.tag_position, "Computed PRE columns.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::conditions::ResonanceType;
    use crate::core::models::peak::PeakStatus;
    use crate::core::models::residue::{AminoAcid, ResidueKey};
    use crate::engine::titration::ViewMeta;
    use crate::engine::titration::test_support::view;
    use ndarray::{Array3, arr1, arr2};
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn delta_pre_clamps_negative_differences() {
        let theo = arr2(&[[1.0, 1.0], [0.5, 0.9]]);
        let observed = arr2(&[[1.0, 1.0], [0.8, 0.4]]);
        let delta = delta_pre(theo.view(), observed.view());
        assert_eq!(delta[(1, 0)], 0.0);
        assert!(close(delta[(1, 1)], 0.5));
        assert_eq!(delta[(0, 0)], 0.0);
    }

    #[test]
    fn delta_pre_keeps_nan() {
        let theo = arr2(&[[f64::NAN]]);
        let observed = arr2(&[[0.5]]);
        assert!(delta_pre(theo.view(), observed.view())[(0, 0)].is_nan());
    }

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(&GaussianParams { stddev: 1.0, window: 5 });
        assert_eq!(kernel.len(), 5);
        assert!(close(kernel.iter().sum::<f64>(), 1.0));
        assert!(close(kernel[0], kernel[4]));
        assert!(kernel[2] > kernel[1]);
    }

    #[test]
    fn smoothing_preserves_constants_and_skips_nan() {
        let params = GaussianParams { stddev: 1.0, window: 3 };
        let constant = arr1(&[2.0, 2.0, f64::NAN, 2.0]);
        let smoothed = gaussian_smooth(constant.view(), &params);
        assert!(smoothed.iter().all(|v| close(*v, 2.0)));

        let all_nan = arr1(&[f64::NAN, f64::NAN]);
        assert!(gaussian_smooth(all_nan.view(), &params).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn smoothing_spreads_a_spike() {
        let params = GaussianParams { stddev: 1.0, window: 3 };
        let spike = arr1(&[0.0, 0.0, 1.0, 0.0, 0.0]);
        let smoothed = gaussian_smooth(spike.view(), &params);
        assert!(smoothed[2] < 1.0);
        assert!(smoothed[1] > 0.0);
        assert!(close(smoothed[1], smoothed[3]));
        assert_eq!(smoothed[0], 0.0);
    }

    #[test]
    fn smoothing_extends_edges_with_the_nearest_value() {
        let params = GaussianParams { stddev: 1.0, window: 5 };
        let plateau = arr1(&[1.0, 1.0, 1.0, 0.0, 0.0]);
        let smoothed = gaussian_smooth(plateau.view(), &params);
        // Zero padding would pull the first residue below 1.
        assert!(close(smoothed[0], 1.0));
        assert!(smoothed[2] < 1.0 && smoothed[2] > 0.0);
        assert!(smoothed[4] > 0.0);
    }

    #[test]
    fn theoretical_column_uses_profile_on_paramagnetic_step() {
        let profile = TheoreticalProfile::from_values(Some(10), BTreeMap::from([(1, 0.3)]));
        let v = view(
            Axis::Cond3,
            &["dia", "para"],
            &[
                (AminoAcid::Lysine, vec![8.0, 8.0], vec![120.0, 120.0]),
                (AminoAcid::Serine, vec![8.0, 8.0], vec![120.0, 120.0]),
            ],
        );
        let theo = theoretical_column(&profile, v.residues(), v.steps(), &PreConfig::default());
        assert_eq!(theo[(0, 0)], 1.0);
        assert!(close(theo[(1, 0)], 0.3));
        assert!(theo[(1, 1)].is_nan());
    }

    #[test]
    fn apply_pre_adds_delta_columns() {
        let profile = TheoreticalProfile::from_values(None, BTreeMap::from([(1, 0.3), (2, 0.9)]));
        let mut v = view(
            Axis::Cond3,
            &["dia", "para"],
            &[
                (AminoAcid::Lysine, vec![8.0, 8.0], vec![120.0, 120.0]),
                (AminoAcid::Serine, vec![8.0, 8.0], vec![120.0, 120.0]),
            ],
        );
        assert!(matches!(
            apply_pre(&mut v, &profile, &PreConfig::default()),
            Err(EngineError::MissingColumn(_))
        ));

        v.calc_ratio(Column::HeightRatio, PeakColumn::Height).unwrap();
        apply_pre(&mut v, &profile, &PreConfig::default()).unwrap();
        // Height halves on the second step in the test view.
        let delta = v.column(Column::HeightDeltaPre).unwrap();
        assert_eq!(delta[(1, 0)], 0.0);
        assert!(close(delta[(1, 1)], 0.4));
        assert_eq!(delta[(0, 0)], 0.0);
        assert!(v.column(Column::HeightDeltaPreSmooth).is_some());
        assert!(v.column(Column::TheoreticalPre).is_some());
        assert!(v.column(Column::VolumeDeltaPre).is_none());
    }

    fn two_state_view(steps: [&str; 2], heights: [f64; 2]) -> TitrationView {
        let mut observations = Array3::<f64>::zeros((2, 1, PeakColumn::ALL.len()));
        for (i, height) in heights.iter().enumerate() {
            observations[(i, 0, PeakColumn::Height.index())] = *height;
            observations[(i, 0, PeakColumn::Volume.index())] = height * 10.0;
        }
        let residue = ResidueKey::backbone(1);
        let meta = ViewMeta {
            axis: Axis::Cond3,
            fixed: [(Axis::Cond2, "wt".to_string()), (Axis::Cond1, "00".to_string())],
            resonance: ResonanceType::Backbone,
            compared: None,
        };
        TitrationView::new(
            meta,
            vec![ResidueAnnotation {
                residue,
                residue_type: AminoAcid::Lysine,
                assign_f1: "1LysH".to_string(),
                assign_f2: "1LysN".to_string(),
            }],
            steps.iter().map(|s| s.to_string()).collect(),
            observations,
            Array2::from_elem((2, 1), PeakStatus::Measured),
        )
        .unwrap()
    }

    #[test]
    fn apply_pre_divides_by_the_diamagnetic_step_when_it_sorts_last() {
        let config = PreConfig {
            paramagnetic: "ox".to_string(),
            diamagnetic: "red".to_string(),
            ..PreConfig::default()
        };
        let profile = TheoreticalProfile::from_values(None, BTreeMap::from([(1, 0.5)]));
        let mut v = two_state_view(["ox", "red"], [40.0, 100.0]);
        v.calc_ratio(Column::HeightRatio, PeakColumn::Height).unwrap();
        v.calc_ratio(Column::VolumeRatio, PeakColumn::Volume).unwrap();
        apply_pre(&mut v, &profile, &config).unwrap();

        for column in [Column::HeightDeltaPre, Column::VolumeDeltaPre] {
            let delta = v.column(column).unwrap();
            assert!(close(delta[(0, 0)], 0.1));
            assert_eq!(delta[(1, 0)], 0.0);
        }
        let theo = v.column(Column::TheoreticalPre).unwrap();
        assert!(close(theo[(0, 0)], 0.5));
        assert_eq!(theo[(1, 0)], 1.0);
    }

    #[test]
    fn apply_pre_requires_para_and_dia_steps() {
        let mut v = view(
            Axis::Cond3,
            &["a", "b"],
            &[(AminoAcid::Lysine, vec![8.0, 8.0], vec![120.0, 120.0])],
        );
        v.calc_ratio(Column::HeightRatio, PeakColumn::Height).unwrap();
        assert!(matches!(
            apply_pre(&mut v, &TheoreticalProfile::default(), &PreConfig::default()),
            Err(EngineError::PreConditionsMissing { .. })
        ));
    }

    #[test]
    fn profile_lookup_requires_exactly_one_file() {
        let dir = tempdir().unwrap();
        let group = GroupKey::new("para", "wt");
        let mut raw = RawDataset::default();
        assert!(matches!(
            profile_for_group(&raw, &group),
            Err(EngineError::MissingPreFile { .. })
        ));

        let first = dir.path().join("tag.pre");
        fs::write(&first, "#10\n1 0.5\n2 0.25\n").unwrap();
        raw.pre_files.insert(group.clone(), vec![first.clone()]);
        let profile = profile_for_group(&raw, &group).unwrap();
        assert_eq!(profile.tag_position, Some(10));
        assert_eq!(profile.value(2), Some(0.25));

        raw.pre_files
            .insert(group.clone(), vec![first, dir.path().join("other.pre")]);
        assert!(matches!(
            profile_for_group(&raw, &group),
            Err(EngineError::AmbiguousPreFile { .. })
        ));
    }
}
