// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Nearest-neighbour spacing statistics of traced ordinates against the GUE
//! Wigner surmise `p(s) = (32/π²)·s²·exp(−4s²/π)`.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fewest ordinates for which a spacing test is attempted.
pub const MIN_ORDINATES: usize = 6;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpacingError {
    #[error("spacing test needs at least {MIN_ORDINATES} ordinates (got {0})")]
    TooFewOrdinates(usize),
    #[error("ordinates must be finite")]
    NonFinite,
    #[error("ordinates have zero mean spacing")]
    Degenerate,
}

pub fn gue_pdf(s: f64) -> f64 {
    32.0 / (PI * PI) * s * s * (-4.0 * s * s / PI).exp()
}

/// `∫₀ˢ p = erf(2s/√π) − (4s/π)·exp(−4s²/π)` for `s ≥ 0`.
pub fn gue_cdf(s: f64) -> f64 {
    if s <= 0.0 {
        return 0.0;
    }
    libm::erf(2.0 * s / PI.sqrt()) - 4.0 * s / PI * (-4.0 * s * s / PI).exp()
}

/// Sorted spacings of the sorted ordinates, unfolded to unit mean.
pub fn spacings(ordinates: &[f64]) -> Result<Vec<f64>, SpacingError> {
    if ordinates.iter().any(|t| !t.is_finite()) {
        return Err(SpacingError::NonFinite);
    }
    let mut sorted = ordinates.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut gaps: Vec<f64> = sorted.windows(2).map(|w| w[1] - w[0]).collect();
    if gaps.is_empty() {
        return Ok(gaps);
    }
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    if mean <= 0.0 {
        return Err(SpacingError::Degenerate);
    }
    for gap in &mut gaps {
        *gap /= mean;
    }
    gaps.sort_by(f64::total_cmp);
    Ok(gaps)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpacingReport {
    /// Kolmogorov–Smirnov distance to the surmise.
    pub ks: f64,
    /// Sorted, unfolded spacings.
    pub spacings: Vec<f64>,
}

/// Two-sided KS distance between the empirical spacing distribution of
/// `ordinates` and the GUE surmise.
pub fn ks_distance_to_gue(ordinates: &[f64]) -> Result<SpacingReport, SpacingError> {
    if ordinates.len() < MIN_ORDINATES {
        return Err(SpacingError::TooFewOrdinates(ordinates.len()));
    }
    let spacings = spacings(ordinates)?;
    let n = spacings.len() as f64;
    let ks = spacings
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let cdf = gue_cdf(s);
            let above = (i + 1) as f64 / n - cdf;
            let below = cdf - i as f64 / n;
            above.max(below)
        })
        .fold(0.0, f64::max);
    Ok(SpacingReport { ks, spacings })
}
