// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Functional-equation probe.
//!
//! Along a sampled line the probe compares the completed values
//! `Λ(s) = Γ_mode(s)·ζₐ(s)` and `Λ(1 − s)`. Where the classical functional
//! equation holds the ratio `Λ(s)/Λ(1 − s)` is exactly 1; the report keeps
//! its modulus and argument per point.

use std::fmt;
use std::str::FromStr;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::gamma::{GammaError, GammaFactor, GammaMode};
use crate::kernel::{KernelError, KernelParams, KernelSpec};
use crate::outcome::{partition, Outcome, Side, Skip, SkipReason};
use crate::series::{AdaptiveZeta, SeriesConfig, SeriesError};
use crate::summary::ProbeSummary;
use crate::tracer::{linspace, MAX_POINTS};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProbeError {
    #[error("invalid probe parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error("unknown line `{0}` (expected critical, offset_plus or offset_minus)")]
    UnknownLine(String),
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Gamma(#[from] GammaError),
}

/// Which vertical line is sampled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Line {
    /// σ itself.
    #[default]
    Critical,
    /// σ + ε_σ.
    OffsetPlus,
    /// σ − ε_σ.
    OffsetMinus,
}

impl Line {
    pub fn as_str(&self) -> &'static str {
        match self {
            Line::Critical => "critical",
            Line::OffsetPlus => "offset_plus",
            Line::OffsetMinus => "offset_minus",
        }
    }

    pub fn abscissa(&self, sigma: f64, eps_sigma: f64) -> f64 {
        match self {
            Line::Critical => sigma,
            Line::OffsetPlus => sigma + eps_sigma,
            Line::OffsetMinus => sigma - eps_sigma,
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Line {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "critical" => Ok(Line::Critical),
            "offset_plus" => Ok(Line::OffsetPlus),
            "offset_minus" => Ok(Line::OffsetMinus),
            other => Err(ProbeError::UnknownLine(other.to_string())),
        }
    }
}

/// Scan over `[1, upper]` whose mean πₐ serves as the effective π.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PiEffScan {
    pub upper: f64,
    pub samples: usize,
}

impl Default for PiEffScan {
    fn default() -> Self {
        Self {
            upper: 1000.0,
            samples: 400,
        }
    }
}

/// Mean of πₐ(x) over `scan.samples` points evenly spaced on `[1, upper]`.
pub fn effective_pi(kernel: &KernelParams, scan: &PiEffScan) -> Result<f64, KernelError> {
    let xs = linspace(1.0, scan.upper, scan.samples);
    let mut total = 0.0;
    for &x in &xs {
        total += kernel.pi_a(x)?;
    }
    Ok(total / xs.len() as f64)
}

/// Everything a probe run depends on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    pub kernel: KernelSpec,
    pub series: SeriesConfig,
    pub line: Line,
    pub sigma: f64,
    pub eps_sigma: f64,
    pub t_min: f64,
    pub t_max: f64,
    pub samples: usize,
    pub gamma: GammaMode,
    pub pi_eff: PiEffScan,
    pub eps_zero: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            kernel: KernelSpec::default(),
            series: SeriesConfig::default(),
            line: Line::Critical,
            sigma: 0.5,
            eps_sigma: 0.01,
            t_min: 10.0,
            t_max: 60.0,
            samples: 200,
            gamma: GammaMode::Classic,
            pi_eff: PiEffScan::default(),
            eps_zero: 1e-10,
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<(), ProbeError> {
        for (name, value) in [
            ("sigma", self.sigma),
            ("eps_sigma", self.eps_sigma),
            ("t_min", self.t_min),
            ("t_max", self.t_max),
        ] {
            if !value.is_finite() {
                return Err(invalid(name, value, "must be finite"));
            }
        }
        if self.samples < 1 {
            return Err(invalid("samples", 0.0, "must be at least 1"));
        }
        if self.samples > MAX_POINTS {
            return Err(invalid("samples", self.samples as f64, "must not exceed 1000000"));
        }
        if self.t_max < self.t_min {
            return Err(invalid("t_max", self.t_max, "must not be below t_min"));
        }
        if !(self.eps_zero.is_finite() && self.eps_zero > 0.0) {
            return Err(invalid("eps_zero", self.eps_zero, "must be positive"));
        }
        if !self.series.precision.resolves(self.eps_zero) {
            return Err(invalid(
                "precision",
                f64::from(self.series.precision.digits()),
                "too few digits to resolve eps_zero",
            ));
        }
        if self.gamma == GammaMode::PiEff {
            if !(self.pi_eff.upper.is_finite() && self.pi_eff.upper >= 1.0) {
                return Err(invalid("pi_eff.upper", self.pi_eff.upper, "must be at least 1"));
            }
            if !(1..=MAX_POINTS).contains(&self.pi_eff.samples) {
                return Err(invalid(
                    "pi_eff.samples",
                    self.pi_eff.samples as f64,
                    "must lie in 1..=1000000",
                ));
            }
        }
        self.series.validate()?;
        Ok(())
    }

    pub fn line_sigma(&self) -> f64 {
        self.line.abscissa(self.sigma, self.eps_sigma)
    }
}

/// One kept probe point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeRow {
    pub t: f64,
    pub sigma: f64,
    pub abs_ratio: f64,
    pub arg_ratio: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProbeReport {
    pub rows: Vec<ProbeRow>,
    pub skipped: Vec<Skip>,
    /// Set when the Γ-factor used a scan-averaged π.
    pub pi_eff: Option<f64>,
    /// `None` when every point was skipped.
    pub summary: Option<ProbeSummary>,
}

/// `(σ, t_k)` along `line`, with `t` spaced evenly over `[t_min, t_max]`.
pub fn sample_points(
    line: Line,
    sigma: f64,
    eps_sigma: f64,
    t_min: f64,
    t_max: f64,
    samples: usize,
) -> Vec<(f64, f64)> {
    let abscissa = line.abscissa(sigma, eps_sigma);
    linspace(t_min, t_max, samples)
        .into_iter()
        .map(|t| (abscissa, t))
        .collect()
}

/// Classifies one reflected pair `A = ζₐ(s)`, `B = ζₐ(1 − s)`.
pub fn assess_pair(
    s: Complex64,
    a: Complex64,
    b: Complex64,
    gamma: &GammaFactor,
    eps_zero: f64,
) -> Outcome<ProbeRow> {
    let skip = |reason| {
        Outcome::Skipped(Skip {
            t: s.im,
            sigma: s.re,
            reason,
        })
    };
    if !(a.is_finite() && b.is_finite()) {
        return skip(SkipReason::NonFinite);
    }
    for (side, value) in [(Side::Point, a), (Side::Reflection, b)] {
        let magnitude = value.norm();
        if magnitude < eps_zero {
            return skip(SkipReason::NearZero { side, magnitude });
        }
    }
    let gamma_ratio = match gamma.ratio(s) {
        Ok(ratio) => ratio,
        Err(err) => {
            return skip(SkipReason::Numerical {
                message: err.to_string(),
            })
        }
    };
    let ratio = gamma_ratio * a / b;
    if !ratio.is_finite() {
        return skip(SkipReason::NonFinite);
    }
    Outcome::Kept(ProbeRow {
        t: s.im,
        sigma: s.re,
        abs_ratio: ratio.norm(),
        arg_ratio: ratio.arg(),
    })
}

/// Probes every point, skipping those that fail numerically.
pub fn probe_line(
    zeta: &AdaptiveZeta,
    points: &[(f64, f64)],
    gamma: &GammaFactor,
    eps_zero: f64,
) -> Result<Vec<Outcome<ProbeRow>>, ProbeError> {
    let one = Complex64::new(1.0, 0.0);
    let mut outcomes = Vec::with_capacity(points.len());
    for &(sigma, t) in points {
        let s = Complex64::new(sigma, t);
        let pair = zeta
            .evaluate(s)
            .and_then(|a| Ok((a.to_complex64(), zeta.evaluate(one - s)?.to_complex64())));
        let outcome = match pair {
            Ok((a, b)) => assess_pair(s, a, b, gamma, eps_zero),
            Err(err) if err.is_numerical() => Outcome::Skipped(Skip {
                t,
                sigma,
                reason: SkipReason::Numerical {
                    message: err.to_string(),
                },
            }),
            Err(err) => return Err(err.into()),
        };
        if let Outcome::Skipped(skip) = &outcome {
            debug!(target: "st_zeta::probe", t = skip.t, reason = %skip.reason, "point skipped");
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

/// Runs a complete probe as configured.
pub fn run_probe(config: &ProbeConfig) -> Result<ProbeReport, ProbeError> {
    config.validate()?;
    let kernel = config.kernel.build()?;
    let zeta = AdaptiveZeta::new(&kernel, config.series)?;
    let pi_eff = match config.gamma {
        GammaMode::PiEff => Some(effective_pi(&kernel, &config.pi_eff)?),
        GammaMode::Classic | GammaMode::Identity => None,
    };
    let gamma = GammaFactor::new(config.gamma, pi_eff)?;
    let points = sample_points(
        config.line,
        config.sigma,
        config.eps_sigma,
        config.t_min,
        config.t_max,
        config.samples,
    );
    let (rows, skipped) = partition(probe_line(&zeta, &points, &gamma, config.eps_zero)?);
    let summary = ProbeSummary::from_rows(&rows);
    match &summary {
        Some(summary) => info!(
            target: "st_zeta::probe",
            kernel = %kernel.kind(),
            line = %config.line,
            gamma = %gamma.mode(),
            kept = summary.n,
            skipped = skipped.len(),
            abs_mean = summary.abs_mean,
            abs_dev = summary.abs_dev,
            arg_std = summary.arg_std,
            "probe finished"
        ),
        None => info!(
            target: "st_zeta::probe",
            kernel = %kernel.kind(),
            line = %config.line,
            skipped = skipped.len(),
            "no valid points"
        ),
    }
    Ok(ProbeReport {
        rows,
        skipped,
        pi_eff,
        summary,
    })
}

fn invalid(name: &'static str, value: f64, reason: &'static str) -> ProbeError {
    ProbeError::InvalidParameter {
        name,
        value,
        reason,
    }
}
