// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! `log|ζₐ|` sampled over a rectangle of the `σ + it` plane.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::outcome::{partition, Outcome, Skip, SkipReason};
use crate::series::{AdaptiveZeta, SeriesError};
use crate::tracer::{linspace, MAX_POINTS};

/// Added to the modulus before the logarithm.
pub const LOG_FLOOR: f64 = 1e-30;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScanError {
    #[error("invalid scan parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error(transparent)]
    Series(#[from] SeriesError),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub sigma_min: f64,
    pub sigma_max: f64,
    pub sigma_samples: usize,
    pub t_min: f64,
    pub t_max: f64,
    pub t_samples: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            sigma_min: 0.3,
            sigma_max: 1.0,
            sigma_samples: 120,
            t_min: 0.0,
            t_max: 40.0,
            t_samples: 400,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ScanError> {
        for (name, value) in [
            ("sigma_min", self.sigma_min),
            ("sigma_max", self.sigma_max),
            ("t_min", self.t_min),
            ("t_max", self.t_max),
        ] {
            if !value.is_finite() {
                return Err(invalid(name, value, "must be finite"));
            }
        }
        if self.sigma_max < self.sigma_min {
            return Err(invalid("sigma_max", self.sigma_max, "must not be below sigma_min"));
        }
        if self.t_max < self.t_min {
            return Err(invalid("t_max", self.t_max, "must not be below t_min"));
        }
        for (name, count) in [
            ("sigma_samples", self.sigma_samples),
            ("t_samples", self.t_samples),
        ] {
            if count < 1 {
                return Err(invalid(name, 0.0, "must be at least 1"));
            }
        }
        let cells = self.sigma_samples.checked_mul(self.t_samples);
        if cells.map_or(true, |cells| cells > MAX_POINTS) {
            return Err(invalid(
                "t_samples",
                self.t_samples as f64,
                "grid would exceed 1000000 cells",
            ));
        }
        Ok(())
    }
}

/// One grid cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanRow {
    pub sigma: f64,
    pub t: f64,
    /// `ln(|ζₐ| + LOG_FLOOR)`.
    pub log_abs_zeta: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlaneScan {
    /// `t`-major, σ ascending within each ordinate.
    pub rows: Vec<ScanRow>,
    pub skipped: Vec<Skip>,
}

pub fn scan_plane(zeta: &AdaptiveZeta, config: &ScanConfig) -> Result<PlaneScan, ScanError> {
    debug!(
        target: "st_zeta::scan",
        kernel = %zeta.kernel().kind(),
        truncation = zeta.config().truncation,
        "scanning plane"
    );
    scan_with(config, |sigma, t| {
        Ok(zeta.evaluate(Complex64::new(sigma, t))?.norm())
    })
}

/// Grid loop over an arbitrary modulus `(σ, t) ↦ |f|`.
pub fn scan_with<F>(config: &ScanConfig, mut modulus: F) -> Result<PlaneScan, ScanError>
where
    F: FnMut(f64, f64) -> Result<f64, SeriesError>,
{
    config.validate()?;
    let sigmas = linspace(config.sigma_min, config.sigma_max, config.sigma_samples);
    let ts = linspace(config.t_min, config.t_max, config.t_samples);
    let mut outcomes = Vec::with_capacity(sigmas.len() * ts.len());
    for &t in &ts {
        for &sigma in &sigmas {
            let outcome = match modulus(sigma, t) {
                Ok(value) if value.is_finite() => Outcome::Kept(ScanRow {
                    sigma,
                    t,
                    log_abs_zeta: (value + LOG_FLOOR).ln(),
                }),
                Ok(_) => Outcome::Skipped(Skip {
                    t,
                    sigma,
                    reason: SkipReason::NonFinite,
                }),
                Err(err) if err.is_numerical() => Outcome::Skipped(Skip {
                    t,
                    sigma,
                    reason: SkipReason::Numerical {
                        message: err.to_string(),
                    },
                }),
                Err(err) => return Err(err.into()),
            };
            outcomes.push(outcome);
        }
    }
    let (rows, skipped) = partition(outcomes);
    info!(
        target: "st_zeta::scan",
        rows = rows.len(),
        skipped = skipped.len(),
        "plane scan finished"
    );
    Ok(PlaneScan { rows, skipped })
}

fn invalid(name: &'static str, value: f64, reason: &'static str) -> ScanError {
    ScanError::InvalidParameter {
        name,
        value,
        reason,
    }
}
