// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Shift manifold: how far traced zero candidates drift off σ = ½ as a
//! function of the kernel coefficients, and a least-squares plane
//! `f(α, μ) ≈ k_α·α + k_μ·μ + c` through those drifts.

use std::path::{Path, PathBuf};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::table::{load_table, TableError};
use crate::tracer::TraceRow;

/// Singular values below this fraction of the largest are treated as zero.
const RANK_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("plane fit needs at least 3 samples (got {0})")]
    Underdetermined(usize),
    #[error("sample {index} is not finite")]
    NonFinite { index: usize },
    #[error("least-squares solve failed: {0}")]
    Solve(&'static str),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// mean(σ − ½) over a trace; `None` for an empty trace.
pub fn mean_shift(rows: &[TraceRow]) -> Option<f64> {
    if rows.is_empty() {
        return None;
    }
    Some(rows.iter().map(|row| row.sigma - 0.5).sum::<f64>() / rows.len() as f64)
}

/// Extracts `(α, μ)` from names such as `zeros_a0.02_m0.01.csv`.
pub fn parse_grid_label(name: &str) -> Option<(f64, f64)> {
    fn number(text: &str) -> (&str, &str) {
        let end = text
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(text.len());
        let (digits, rest) = text.split_at(end);
        // "0.01." in "a0.02_m0.01.csv" ends at the extension dot
        (digits.trim_end_matches('.'), rest)
    }

    for (start, _) in name.match_indices('a') {
        let (alpha, rest) = number(&name[start + 1..]);
        let Some(rest) = rest.strip_prefix("_m") else {
            continue;
        };
        let (mu, _) = number(rest);
        if let (Ok(alpha), Ok(mu)) = (alpha.parse(), mu.parse()) {
            return Some((alpha, mu));
        }
    }
    None
}

/// Mean drift of one trace together with its kernel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShiftSample {
    pub alpha: f64,
    pub mu: f64,
    pub shift: f64,
    pub path: PathBuf,
}

/// Reads every labelled, non-empty trace table among `paths`.
pub fn load_shift_samples(paths: &[PathBuf]) -> Result<Vec<ShiftSample>, FitError> {
    let mut samples = Vec::new();
    for path in paths {
        let label = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_grid_label);
        let Some((alpha, mu)) = label else {
            debug!(target: "st_zeta::fit", path = %path.display(), "no (alpha, mu) label");
            continue;
        };
        let rows: Vec<TraceRow> = load_table(Path::new(path))?;
        if let Some(shift) = mean_shift(&rows) {
            samples.push(ShiftSample {
                alpha,
                mu,
                shift,
                path: path.clone(),
            });
        }
    }
    Ok(samples)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneFit {
    pub k_alpha: f64,
    pub k_mu: f64,
    pub intercept: f64,
    /// Numerical rank of the design matrix; below 3 the minimum-norm
    /// solution is returned.
    pub rank: usize,
    pub residual_rms: f64,
}

impl PlaneFit {
    pub fn predict(&self, alpha: f64, mu: f64) -> f64 {
        self.k_alpha * alpha + self.k_mu * mu + self.intercept
    }
}

/// Least-squares plane through the samples via SVD.
pub fn fit_shift_plane(samples: &[ShiftSample]) -> Result<PlaneFit, FitError> {
    let n = samples.len();
    if n < 3 {
        return Err(FitError::Underdetermined(n));
    }
    if let Some(index) = samples
        .iter()
        .position(|s| !(s.alpha.is_finite() && s.mu.is_finite() && s.shift.is_finite()))
    {
        return Err(FitError::NonFinite { index });
    }

    let design = DMatrix::from_fn(n, 3, |i, j| match j {
        0 => samples[i].alpha,
        1 => samples[i].mu,
        _ => 1.0,
    });
    let target = DVector::from_iterator(n, samples.iter().map(|s| s.shift));
    let svd = design.clone().svd(true, true);
    let largest = svd.singular_values.max();
    let eps = RANK_TOLERANCE * largest.max(f64::MIN_POSITIVE);
    let rank = svd.rank(eps);
    let solution = svd.solve(&target, eps).map_err(FitError::Solve)?;

    let residual = &design * &solution - &target;
    let fit = PlaneFit {
        k_alpha: solution[0],
        k_mu: solution[1],
        intercept: solution[2],
        rank,
        residual_rms: (residual.norm_squared() / n as f64).sqrt(),
    };
    debug!(
        target: "st_zeta::fit",
        k_alpha = fit.k_alpha,
        k_mu = fit.k_mu,
        intercept = fit.intercept,
        rank,
        "fitted shift plane"
    );
    Ok(fit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::save_table;
    use approx::assert_abs_diff_eq;
    use tempfile::tempdir;

    fn sample(alpha: f64, mu: f64, shift: f64) -> ShiftSample {
        ShiftSample {
            alpha,
            mu,
            shift,
            path: PathBuf::new(),
        }
    }

    #[test]
    fn labels_are_parsed_from_file_names() {
        assert_eq!(parse_grid_label("zeros_a0.02_m0.01.csv"), Some((0.02, 0.01)));
        assert_eq!(parse_grid_label("heat_a0_m0.png"), Some((0.0, 0.0)));
        assert_eq!(parse_grid_label("zeros_alpha.csv"), None);
        assert_eq!(parse_grid_label("baseline.csv"), None);
    }

    #[test]
    fn mean_shift_of_a_trace() {
        let rows = [
            TraceRow {
                sigma: 0.6,
                t: 10.0,
                abs_zeta: 0.1,
            },
            TraceRow {
                sigma: 0.5,
                t: 10.25,
                abs_zeta: 0.1,
            },
        ];
        assert_abs_diff_eq!(mean_shift(&rows).unwrap(), 0.05, epsilon = 1e-15);
        assert_eq!(mean_shift(&[]), None);
    }

    #[test]
    fn exact_plane_is_recovered() {
        let plane = |a: f64, m: f64| 0.8 * a - 1.5 * m + 0.01;
        let samples: Vec<_> = [(0.0, 0.0), (0.02, 0.0), (0.0, 0.01), (0.02, 0.01), (0.04, 0.02)]
            .into_iter()
            .map(|(a, m)| sample(a, m, plane(a, m)))
            .collect();
        let fit = fit_shift_plane(&samples).unwrap();
        assert_eq!(fit.rank, 3);
        assert_abs_diff_eq!(fit.k_alpha, 0.8, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.k_mu, -1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.intercept, 0.01, epsilon = 1e-12);
        assert!(fit.residual_rms < 1e-12);
        assert_abs_diff_eq!(fit.predict(0.01, 0.01), plane(0.01, 0.01), epsilon = 1e-12);
    }

    #[test]
    fn too_few_samples_is_an_error() {
        let err = fit_shift_plane(&[sample(0.0, 0.0, 0.0), sample(1.0, 0.0, 0.1)]).unwrap_err();
        assert!(matches!(err, FitError::Underdetermined(2)));
    }

    #[test]
    fn collinear_samples_report_reduced_rank() {
        let samples: Vec<_> = (0..4)
            .map(|i| sample(f64::from(i) * 0.01, 0.0, 0.1 * f64::from(i)))
            .collect();
        let fit = fit_shift_plane(&samples).unwrap();
        assert_eq!(fit.rank, 2);
        assert!(fit.residual_rms < 1e-9);
    }

    #[test]
    fn samples_are_loaded_from_labelled_traces() {
        let dir = tempdir().unwrap();
        let labelled = dir.path().join("zeros_a0.02_m0.01.csv");
        let unlabelled = dir.path().join("notes.csv");
        save_table(
            &labelled,
            &[TraceRow {
                sigma: 0.52,
                t: 14.0,
                abs_zeta: 1e-3,
            }],
        )
        .unwrap();
        std::fs::write(&unlabelled, "whatever\n").unwrap();
        let samples = load_shift_samples(&[labelled.clone(), unlabelled]).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!((samples[0].alpha, samples[0].mu), (0.02, 0.01));
        assert_abs_diff_eq!(samples[0].shift, 0.02, epsilon = 1e-15);
        assert_eq!(samples[0].path, labelled);
    }
}
