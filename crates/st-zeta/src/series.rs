// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Truncated adaptive zeta series `ζₐ(s) = Σ_{n≤N} n^{−s·p(n)}`.
//!
//! With [`ExponentScale::Adaptive`] the exponent factor is `p(n) = πₐ(n)`;
//! with [`ExponentScale::Relative`] it is `πₐ(n)/π = 1 + κ(n)`, which turns
//! the undeformed kernel into the classical Dirichlet series.
//!
//! Writing `L_n = p(n)·ln n`, each term is
//! `exp(−σ·L_n)·(cos(t·L_n) − i·sin(t·L_n))`. The table of `L_n` depends only
//! on the kernel, `N` and the precision, so [`AdaptiveZeta`] builds it once
//! and reuses it for every evaluation point.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::kernel::{KernelError, KernelParams};
use crate::precision::{ln_table, BigComplex, Fixed, Precision, PrecisionError};

/// Largest accepted truncation bound; the exponent table holds one entry per term.
pub const MAX_TRUNCATION: u64 = 10_000_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SeriesError {
    #[error("truncation bound must lie in 1..={MAX_TRUNCATION} (got {0})")]
    Truncation(u64),
    #[error("evaluation point must be finite (got {re} + {im}i)")]
    NonFinitePoint { re: f64, im: f64 },
    #[error("term n = {n} overflowed the working range")]
    Overflow { n: u64 },
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error(transparent)]
    Precision(#[from] PrecisionError),
}

impl SeriesError {
    /// Whether the failure belongs to a single evaluation point rather than
    /// to the configuration.
    pub fn is_numerical(&self) -> bool {
        match self {
            SeriesError::Overflow { .. } => true,
            SeriesError::Kernel(err) => err.is_numerical(),
            SeriesError::Precision(err) => matches!(err, PrecisionError::Overflow { .. }),
            SeriesError::Truncation(_) | SeriesError::NonFinitePoint { .. } => false,
        }
    }
}

/// How the kernel scales the exponent of each term.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExponentScale {
    /// `n^{−s·πₐ(n)}`.
    #[default]
    Adaptive,
    /// `n^{−s·πₐ(n)/π}`.
    Relative,
}

/// Truncation, precision and tail handling. Together with the kernel this is
/// the reproducibility record of every series value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeriesConfig {
    pub truncation: u64,
    pub precision: Precision,
    pub tail: bool,
    pub exponent: ExponentScale,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            truncation: 20_000,
            precision: Precision::default(),
            tail: false,
            exponent: ExponentScale::Adaptive,
        }
    }
}

impl SeriesConfig {
    pub fn new(truncation: u64, precision: Precision) -> Self {
        Self {
            truncation,
            precision,
            ..Self::default()
        }
    }

    pub fn with_tail(mut self, tail: bool) -> Self {
        self.tail = tail;
        self
    }

    pub fn with_exponent(mut self, exponent: ExponentScale) -> Self {
        self.exponent = exponent;
        self
    }

    pub fn validate(&self) -> Result<(), SeriesError> {
        if !(1..=MAX_TRUNCATION).contains(&self.truncation) {
            return Err(SeriesError::Truncation(self.truncation));
        }
        Ok(())
    }
}

/// A series value at working precision.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesValue {
    pub value: BigComplex,
    pub tail_applied: bool,
}

impl SeriesValue {
    pub fn to_complex64(&self) -> Complex64 {
        self.value.to_complex64()
    }

    pub fn norm(&self) -> f64 {
        self.to_complex64().norm()
    }

    /// Both components representable as finite doubles.
    pub fn is_finite(&self) -> bool {
        self.to_complex64().is_finite()
    }
}

/// Adaptive zeta evaluator with its exponent table prepared.
#[derive(Clone, Debug)]
pub struct AdaptiveZeta {
    kernel: KernelParams,
    config: SeriesConfig,
    /// `L_n = p(n)·ln n` for `n = 1..=N`.
    exponents: Vec<Fixed>,
    /// `p(N)`, the constant exponent proxy used by the tail correction.
    last_factor: Fixed,
    ln_truncation: Fixed,
}

impl AdaptiveZeta {
    pub fn new(kernel: &KernelParams, config: SeriesConfig) -> Result<Self, SeriesError> {
        config.validate()?;
        kernel.validate()?;
        let precision = config.precision;
        let logs = ln_table(config.truncation, precision);
        let prepared = kernel.prepare(&Fixed::zero(precision))?;
        let one = Fixed::one(precision);
        let scale = match config.exponent {
            ExponentScale::Adaptive => Fixed::pi(precision),
            ExponentScale::Relative => one.clone(),
        };

        let mut exponents = Vec::with_capacity(logs.len());
        let mut last_factor = scale.clone();
        for ln_n in &logs {
            let kappa = prepared.kappa(ln_n)?;
            let factor = scale.mul(&(&one + &kappa));
            exponents.push(factor.mul(ln_n));
            last_factor = factor;
        }
        let ln_truncation = logs.last().cloned().unwrap_or_else(|| Fixed::zero(precision));

        debug!(
            target: "st_zeta::series",
            kernel = %kernel.kind(),
            truncation = config.truncation,
            digits = precision.digits(),
            exponent = ?config.exponent,
            "prepared adaptive zeta table"
        );
        Ok(Self {
            kernel: kernel.clone(),
            config,
            exponents,
            last_factor,
            ln_truncation,
        })
    }

    pub fn kernel(&self) -> &KernelParams {
        &self.kernel
    }

    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Evaluates the truncated series at `s`, adding the tail estimate when
    /// the configuration asks for it and it converges.
    pub fn evaluate(&self, s: Complex64) -> Result<SeriesValue, SeriesError> {
        if !s.is_finite() {
            return Err(SeriesError::NonFinitePoint { re: s.re, im: s.im });
        }
        let precision = self.config.precision;
        let sigma = Fixed::from_f64(s.re, precision)?;
        let t = Fixed::from_f64(s.im, precision)?;

        let mut re = Fixed::zero(precision);
        let mut im = Fixed::zero(precision);
        for (index, exponent) in self.exponents.iter().enumerate() {
            let magnitude = (-&sigma.mul(exponent))
                .exp()
                .map_err(|_| SeriesError::Overflow {
                    n: index as u64 + 1,
                })?;
            let (cos, sin) = t.mul(exponent).cis();
            re = &re + &magnitude.mul(&cos);
            im = &im - &magnitude.mul(&sin);
        }

        let mut tail_applied = false;
        if self.config.tail {
            if let Some(tail) = self.tail(&sigma)? {
                re = &re + &tail;
                tail_applied = true;
            }
        }

        let value = SeriesValue {
            value: BigComplex { re, im },
            tail_applied,
        };
        trace!(
            target: "st_zeta::series",
            sigma = s.re,
            t = s.im,
            abs = value.norm(),
            tail_applied,
            "evaluated"
        );
        Ok(value)
    }

    /// `∫_N^∞ x^{−σ_eff} dx = N^{1−σ_eff}/(σ_eff − 1)` with
    /// `σ_eff = Re(s)·p(N)`; `None` when `σ_eff ≤ 1`.
    fn tail(&self, sigma: &Fixed) -> Result<Option<Fixed>, SeriesError> {
        let one = Fixed::one(self.config.precision);
        let excess = &sigma.mul(&self.last_factor) - &one;
        if !excess.is_positive() {
            return Ok(None);
        }
        let numerator = (-&excess.mul(&self.ln_truncation))
            .exp()
            .map_err(|_| SeriesError::Overflow {
                n: self.config.truncation,
            })?;
        Ok(numerator.checked_div(&excess))
    }
}

/// One-shot evaluation of `ζₐ(s)`.
pub fn zeta_a(
    s: Complex64,
    kernel: &KernelParams,
    config: SeriesConfig,
) -> Result<SeriesValue, SeriesError> {
    AdaptiveZeta::new(kernel, config)?.evaluate(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn config(truncation: u64) -> SeriesConfig {
        SeriesConfig::new(truncation, Precision::new(40).unwrap())
    }

    #[test]
    fn zero_truncation_is_rejected() {
        let err = AdaptiveZeta::new(&KernelParams::default(), config(0)).unwrap_err();
        assert_eq!(err, SeriesError::Truncation(0));
        assert!(!err.is_numerical());
    }

    #[test]
    fn oversized_truncation_is_rejected_before_allocating() {
        let huge = config(u64::MAX);
        assert_eq!(huge.validate(), Err(SeriesError::Truncation(u64::MAX)));
        assert!(AdaptiveZeta::new(&KernelParams::default(), config(MAX_TRUNCATION + 1)).is_err());
        assert!(config(MAX_TRUNCATION).validate().is_ok());
    }

    #[test]
    fn evaluator_keeps_its_inputs() {
        let kernel = KernelParams::single(0.02, 0.01, 0.0);
        let series = config(30).with_tail(true);
        let zeta = AdaptiveZeta::new(&kernel, series).unwrap();
        assert_eq!(zeta.kernel(), &kernel);
        assert_eq!(zeta.config(), &series);
    }

    #[test]
    fn single_term_series_is_one() {
        let value = zeta_a(Complex64::new(0.5, 14.0), &KernelParams::default(), config(1)).unwrap();
        assert!((value.to_complex64() - Complex64::new(1.0, 0.0)).norm() < 1e-30);
    }

    #[test]
    fn adaptive_scale_of_undeformed_kernel_sums_n_to_minus_pi_s() {
        let s = Complex64::new(1.2, 3.0);
        let value = zeta_a(s, &KernelParams::default(), config(60)).unwrap();
        let expected: Complex64 = (1..=60)
            .map(|n| Complex64::new(n as f64, 0.0).powc(-s * std::f64::consts::PI))
            .sum();
        assert!((value.to_complex64() - expected).norm() < 1e-12);
    }

    #[test]
    fn relative_scale_reduces_to_classical_dirichlet_series() {
        let s = Complex64::new(2.0, 1.5);
        let cfg = config(100).with_exponent(ExponentScale::Relative);
        let value = zeta_a(s, &KernelParams::default(), cfg).unwrap();
        let expected: Complex64 = (1..=100)
            .map(|n| Complex64::new(n as f64, 0.0).powc(-s))
            .sum();
        assert!((value.to_complex64() - expected).norm() < 1e-12);
    }

    #[test]
    fn tail_is_skipped_when_it_diverges() {
        let cfg = config(50).with_exponent(ExponentScale::Relative).with_tail(true);
        let zeta = AdaptiveZeta::new(&KernelParams::default(), cfg).unwrap();
        let divergent = zeta.evaluate(Complex64::new(0.8, 0.0)).unwrap();
        assert!(!divergent.tail_applied);
        let convergent = zeta.evaluate(Complex64::new(2.0, 0.0)).unwrap();
        assert!(convergent.tail_applied);
        assert_relative_eq!(
            convergent.to_complex64().re,
            (1..=50).map(|n| (n as f64).powi(-2)).sum::<f64>() + 1.0 / 50.0,
            max_relative = 1e-13
        );
    }

    #[test]
    fn non_finite_point_is_rejected() {
        let zeta = AdaptiveZeta::new(&KernelParams::default(), config(5)).unwrap();
        let err = zeta.evaluate(Complex64::new(f64::NAN, 1.0)).unwrap_err();
        assert!(matches!(err, SeriesError::NonFinitePoint { .. }));
    }

    #[test]
    fn divergent_region_reports_non_finite_or_overflow() {
        let zeta = AdaptiveZeta::new(&KernelParams::single(0.0, 0.0, 30.0), config(2000)).unwrap();
        match zeta.evaluate(Complex64::new(-3.0, 0.0)) {
            Ok(value) => assert!(!value.is_finite()),
            Err(err) => assert!(err.is_numerical(), "{err}"),
        }
    }
}
