//! Per-residue Hill-equation fitting.
//!
//! Each residue's titration curve is fitted to
//!
//! ```text
//! y = Vmax · xⁿ / (Kdⁿ + xⁿ)
//! ```
//!
//! with a damped Gauss-Newton (Levenberg-Marquardt) solver on the three
//! parameters. Only numerical failures of the solver are classified as
//! [`FitStatus::Failed`]; residues with too few measured points are
//! [`FitStatus::NoData`] and are never attempted.

use super::config::FitConfig;
use crate::core::io::export::FitReportRow;
use crate::core::models::peak::PeakStatus;
use crate::core::models::residue::ResidueKey;
use nalgebra::{Matrix3, Vector3};
use ndarray::ArrayView2;
use thiserror::Error;
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Minimum number of measured points needed to attempt a fit.
pub const MIN_FIT_POINTS: usize = 3;
/// Upper bound of the x-range of the dense fitted curve.
pub const CURVE_X_MAX: f64 = 10_000.0;
/// Number of samples in the dense fitted curve.
pub const CURVE_POINTS: usize = 100_001;

const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    Ok,
    Failed,
    NoData,
}

impl FitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitStatus::Ok => "OK",
            FitStatus::Failed => "Failed",
            FitStatus::NoData => "No Data",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },
    #[error("normal equations are singular")]
    Singular,
    #[error("objective is not finite at the starting point")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HillParams {
    pub vmax: f64,
    pub kd: f64,
    pub hill: f64,
}

impl HillParams {
    pub fn eval(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        let xn = x.powf(self.hill);
        self.vmax * xn / (self.kd.powf(self.hill) + xn)
    }

    /// Partial derivatives with respect to `(vmax, kd, hill)`.
    fn gradient(&self, x: f64) -> Vector3<f64> {
        if x <= 0.0 {
            return Vector3::zeros();
        }
        let xn = x.powf(self.hill);
        let kn = self.kd.powf(self.hill);
        let d = kn + xn;
        let d2 = d * d;
        Vector3::new(
            xn / d,
            -self.vmax * xn * self.hill * kn / (self.kd * d2),
            self.vmax * xn * kn * (x.ln() - self.kd.ln()) / d2,
        )
    }

    fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.vmax, self.kd, self.hill)
    }

    fn from_vector(v: &Vector3<f64>) -> Self {
        Self {
            vmax: v[0],
            kd: v[1],
            hill: v[2],
        }
    }

    fn is_valid(&self) -> bool {
        self.vmax.is_finite() && self.kd.is_finite() && self.kd > 0.0 && self.hill.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub residue: ResidueKey,
    pub status: FitStatus,
    pub params: Option<HillParams>,
    pub r_squared: f64,
    /// Points actually used, as `(x, y)`.
    pub points: Vec<(f64, f64)>,
}

impl FitResult {
    fn without_fit(residue: ResidueKey, status: FitStatus, points: Vec<(f64, f64)>) -> Self {
        Self {
            residue,
            status,
            params: None,
            r_squared: f64::NAN,
            points,
        }
    }

    pub fn vmax(&self) -> f64 {
        self.params.map_or(f64::NAN, |p| p.vmax)
    }

    pub fn kd(&self) -> f64 {
        self.params.map_or(f64::NAN, |p| p.kd)
    }

    pub fn hill(&self) -> f64 {
        self.params.map_or(f64::NAN, |p| p.hill)
    }

    pub fn half_max(&self) -> f64 {
        self.vmax() / 2.0
    }

    /// The fitted curve sampled at [`CURVE_POINTS`] evenly spaced x-values
    /// over `[0, CURVE_X_MAX]`. Empty unless the fit succeeded.
    pub fn curve(&self) -> Vec<(f64, f64)> {
        let Some(params) = self.params else {
            return Vec::new();
        };
        let step = CURVE_X_MAX / (CURVE_POINTS - 1) as f64;
        (0..CURVE_POINTS)
            .map(|i| {
                let x = i as f64 * step;
                (x, params.eval(x))
            })
            .collect()
    }

    pub fn report_row(&self) -> FitReportRow {
        FitReportRow {
            residue: self.residue,
            status: self.status.as_str(),
            vmax: self.vmax(),
            half_max: self.half_max(),
            kd: self.kd(),
            hill: self.hill(),
            r_squared: self.r_squared,
        }
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn cost(params: &HillParams, x: &[f64], y: &[f64]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let r = yi - params.eval(xi);
            r * r
        })
        .sum()
}

/// Initial guess: `Vmax = max(y)`, `n = 1`, `Kd = median(x)`.
///
/// A non-positive median falls back to the mean of the positive x-values.
pub fn initial_guess(x: &[f64], y: &[f64]) -> HillParams {
    let vmax = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut kd = median(x);
    if !(kd > 0.0) {
        let positive: Vec<f64> = x.iter().copied().filter(|&v| v > 0.0).collect();
        kd = if positive.is_empty() {
            1.0
        } else {
            positive.iter().sum::<f64>() / positive.len() as f64
        };
    }
    HillParams { vmax, kd, hill: 1.0 }
}

/// Fits the Hill equation to `(x, y)`, returning the parameters and the
/// number of iterations used.
pub fn fit_hill(x: &[f64], y: &[f64], config: &FitConfig) -> Result<(HillParams, usize), FitError> {
    let mut params = initial_guess(x, y);
    let mut current = cost(&params, x, y);
    if !params.is_valid() || !current.is_finite() {
        return Err(FitError::NonFinite);
    }

    let mut lambda = INITIAL_DAMPING;
    for iteration in 1..=config.max_iterations {
        if current <= f64::MIN_POSITIVE {
            return Ok((params, iteration));
        }

        let mut jtj = Matrix3::<f64>::zeros();
        let mut jtr = Vector3::<f64>::zeros();
        for (&xi, &yi) in x.iter().zip(y) {
            let g = params.gradient(xi);
            let r = yi - params.eval(xi);
            jtj += g * g.transpose();
            jtr += g * r;
        }

        loop {
            let mut damped = jtj;
            for i in 0..3 {
                damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }
            let Some(delta) = damped.cholesky().map(|c| c.solve(&jtr)) else {
                lambda *= 10.0;
                if lambda > MAX_DAMPING {
                    return Err(FitError::Singular);
                }
                continue;
            };

            let p = params.as_vector();
            let candidate = HillParams::from_vector(&(p + delta));
            let trial = if candidate.is_valid() {
                cost(&candidate, x, y)
            } else {
                f64::NAN
            };

            if trial.is_finite() && trial < current {
                let small_step = delta.norm() <= config.tolerance * (p.norm() + config.tolerance);
                let small_gain = current - trial <= config.tolerance * current;
                params = candidate;
                current = trial;
                lambda = (lambda / 10.0).max(1e-12);
                if small_step || small_gain {
                    return Ok((params, iteration));
                }
                break;
            }

            lambda *= 10.0;
            if lambda > MAX_DAMPING {
                // No descent direction left: the current point is stationary.
                return Ok((params, iteration));
            }
        }
    }

    Err(FitError::NonConvergence {
        iterations: config.max_iterations,
    })
}

fn r_squared(params: &HillParams, x: &[f64], y: &[f64]) -> f64 {
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    let ss_tot: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return f64::NAN;
    }
    1.0 - cost(params, x, y) / ss_tot
}

/// Fits one residue, classifying the outcome.
///
/// Only `measured` points with finite values are used.
pub fn fit_residue(
    residue: ResidueKey,
    x: &[f64],
    y: impl IntoIterator<Item = f64>,
    statuses: impl IntoIterator<Item = PeakStatus>,
    config: &FitConfig,
) -> FitResult {
    let points: Vec<(f64, f64)> = x
        .iter()
        .copied()
        .zip(y)
        .zip(statuses)
        .filter(|((xi, yi), status)| *status == PeakStatus::Measured && xi.is_finite() && yi.is_finite())
        .map(|(point, _)| point)
        .collect();

    if points.len() < MIN_FIT_POINTS {
        debug!(residue = %residue, points = points.len(), "Too few measured points to fit.");
        return FitResult::without_fit(residue, FitStatus::NoData, points);
    }

    let (xs, ys): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
    match fit_hill(&xs, &ys, config) {
        Ok((params, iterations)) => {
            let r2 = r_squared(&params, &xs, &ys);
            debug!(
                residue = %residue,
                vmax = params.vmax,
                kd = params.kd,
                n = params.hill,
                r2,
                iterations,
                "Fit converged."
            );
            FitResult {
                residue,
                status: FitStatus::Ok,
                params: Some(params),
                r_squared: r2,
                points,
            }
        }
        Err(error) => {
            warn!(residue = %residue, x = ?xs, y = ?ys, %error, "Fit failed.");
            FitResult::without_fit(residue, FitStatus::Failed, points)
        }
    }
}

/// Fits every residue of a `(steps, residues)` column.
pub fn fit_column(
    residues: &[ResidueKey],
    x: &[f64],
    values: ArrayView2<'_, f64>,
    statuses: ArrayView2<'_, PeakStatus>,
    config: &FitConfig,
) -> Vec<FitResult> {
    let fit_one = |r: usize| {
        fit_residue(
            residues[r],
            x,
            values.column(r).iter().copied(),
            statuses.column(r).iter().copied(),
            config,
        )
    };

    #[cfg(not(feature = "parallel"))]
    let results = (0..residues.len()).map(fit_one).collect();

    #[cfg(feature = "parallel")]
    let results = (0..residues.len()).into_par_iter().map(fit_one).collect();

    results
}
