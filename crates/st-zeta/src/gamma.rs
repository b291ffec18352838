// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Γ-factors completing ζₐ in the functional-equation probe.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stirling coefficients `B_{2k} / (2k(2k−1))` for k = 1..=8.
const STIRLING: [f64; 8] = [
    1.0 / 12.0,
    -1.0 / 360.0,
    1.0 / 1260.0,
    -1.0 / 1680.0,
    1.0 / 1188.0,
    -691.0 / 360_360.0,
    1.0 / 156.0,
    -3617.0 / 122_400.0,
];

/// Real part from which the asymptotic series is used directly.
const STIRLING_THRESHOLD: f64 = 10.0;
/// Furthest left the recurrence is allowed to walk.
const MIN_REAL_PART: f64 = -1.0e5;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GammaError {
    #[error("Γ has a pole at {0}")]
    Pole(f64),
    #[error("Γ argument must be finite (got {re} + {im}i)")]
    NonFinite { re: f64, im: f64 },
    #[error("Γ argument real part {0} is below the supported range")]
    OutOfRange(f64),
    #[error("unknown Γ mode `{0}` (expected classic, pi_eff or none)")]
    UnknownMode(String),
    #[error("effective π must be positive and finite (got {0})")]
    InvalidPi(f64),
}

impl GammaError {
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            GammaError::Pole(_) | GammaError::NonFinite { .. } | GammaError::OutOfRange(_)
        )
    }
}

/// Principal-branch-free `ln Γ(z)`: the imaginary part may differ from the
/// principal value by a multiple of 2π, which is irrelevant once
/// exponentiated.
pub fn ln_gamma(z: Complex64) -> Result<Complex64, GammaError> {
    if !z.is_finite() {
        return Err(GammaError::NonFinite { re: z.re, im: z.im });
    }
    if z.im == 0.0 && z.re <= 0.0 && z.re.fract() == 0.0 {
        return Err(GammaError::Pole(z.re));
    }
    if z.re < MIN_REAL_PART {
        return Err(GammaError::OutOfRange(z.re));
    }

    let mut z = z;
    let mut shift = Complex64::new(0.0, 0.0);
    while z.re < STIRLING_THRESHOLD {
        shift += z.ln();
        z += 1.0;
    }

    let inv = z.inv();
    let inv_sq = inv * inv;
    let mut power = inv;
    let mut series = Complex64::new(0.0, 0.0);
    for coefficient in STIRLING {
        series += power * coefficient;
        power *= inv_sq;
    }
    let value = (z - 0.5) * z.ln() - z + 0.5 * (2.0 * PI).ln() + series - shift;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(GammaError::NonFinite {
            re: value.re,
            im: value.im,
        })
    }
}

/// Which Γ-factor completes the series.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GammaMode {
    /// `π^{−s/2}·Γ(s/2)`.
    #[default]
    Classic,
    /// `π_eff^{−s/2}·Γ(s/2)` with a scan-averaged π.
    PiEff,
    /// The constant 1.
    #[serde(rename = "none")]
    Identity,
}

impl GammaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GammaMode::Classic => "classic",
            GammaMode::PiEff => "pi_eff",
            GammaMode::Identity => "none",
        }
    }
}

impl fmt::Display for GammaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GammaMode {
    type Err = GammaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "classic" => Ok(GammaMode::Classic),
            "pi_eff" => Ok(GammaMode::PiEff),
            "none" => Ok(GammaMode::Identity),
            other => Err(GammaError::UnknownMode(other.to_string())),
        }
    }
}

/// A resolved Γ-factor, with the base of its π power fixed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GammaFactor {
    mode: GammaMode,
    ln_base: f64,
}

impl GammaFactor {
    pub fn classic() -> Self {
        Self {
            mode: GammaMode::Classic,
            ln_base: PI.ln(),
        }
    }

    pub fn identity() -> Self {
        Self {
            mode: GammaMode::Identity,
            ln_base: 0.0,
        }
    }

    pub fn pi_eff(pi_eff: f64) -> Result<Self, GammaError> {
        if !(pi_eff.is_finite() && pi_eff > 0.0) {
            return Err(GammaError::InvalidPi(pi_eff));
        }
        Ok(Self {
            mode: GammaMode::PiEff,
            ln_base: pi_eff.ln(),
        })
    }

    /// Resolves `mode`; `pi_eff` is only consulted for [`GammaMode::PiEff`].
    pub fn new(mode: GammaMode, pi_eff: Option<f64>) -> Result<Self, GammaError> {
        match mode {
            GammaMode::Classic => Ok(Self::classic()),
            GammaMode::Identity => Ok(Self::identity()),
            GammaMode::PiEff => Self::pi_eff(pi_eff.unwrap_or(f64::NAN)),
        }
    }

    pub fn mode(&self) -> GammaMode {
        self.mode
    }

    /// `ln Γ_mode(s) = −(s/2)·ln base + ln Γ(s/2)`.
    pub fn ln_value(&self, s: Complex64) -> Result<Complex64, GammaError> {
        if self.mode == GammaMode::Identity {
            return Ok(Complex64::new(0.0, 0.0));
        }
        let half = s * 0.5;
        Ok(ln_gamma(half)? - half * self.ln_base)
    }

    /// `Γ_mode(s) / Γ_mode(1 − s)`.
    pub fn ratio(&self, s: Complex64) -> Result<Complex64, GammaError> {
        let reflected = Complex64::new(1.0, 0.0) - s;
        let ln_ratio = self.ln_value(s)? - self.ln_value(reflected)?;
        let ratio = ln_ratio.exp();
        if ratio.is_finite() {
            Ok(ratio)
        } else {
            Err(GammaError::NonFinite {
                re: ratio.re,
                im: ratio.im,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn matches_factorials_on_the_real_axis() {
        assert!(ln_gamma(Complex64::new(1.0, 0.0)).unwrap().norm() < 1e-14);
        assert!(ln_gamma(Complex64::new(2.0, 0.0)).unwrap().norm() < 1e-14);
        assert_relative_eq!(
            ln_gamma(Complex64::new(5.0, 0.0)).unwrap().re,
            24.0f64.ln(),
            max_relative = 1e-14
        );
        assert_relative_eq!(
            ln_gamma(Complex64::new(0.5, 0.0)).unwrap().re,
            0.5 * PI.ln(),
            max_relative = 1e-13
        );
    }

    #[test]
    fn satisfies_the_recurrence_off_axis() {
        let z = Complex64::new(0.3, 7.5);
        let lhs = ln_gamma(z + 1.0).unwrap().exp();
        let rhs = z * ln_gamma(z).unwrap().exp();
        assert!((lhs - rhs).norm() / rhs.norm() < 1e-12);
    }

    #[test]
    fn modulus_on_the_half_line() {
        // |Γ(½ + it)|² = π / cosh(πt)
        let t = 3.25;
        let g = ln_gamma(Complex64::new(0.5, t)).unwrap().exp();
        assert_relative_eq!(g.norm_sqr(), PI / (PI * t).cosh(), max_relative = 1e-12);
    }

    #[test]
    fn negative_real_arguments_use_the_recurrence() {
        // Γ(−½) = −2√π
        let g = ln_gamma(Complex64::new(-0.5, 0.0)).unwrap().exp();
        assert_relative_eq!(g.re, -2.0 * PI.sqrt(), max_relative = 1e-12);
        assert!(g.im.abs() < 1e-12);
    }

    #[test]
    fn poles_and_bad_inputs_are_reported() {
        assert_eq!(ln_gamma(Complex64::new(0.0, 0.0)), Err(GammaError::Pole(0.0)));
        assert_eq!(ln_gamma(Complex64::new(-3.0, 0.0)), Err(GammaError::Pole(-3.0)));
        assert!(ln_gamma(Complex64::new(-3.0, 0.1)).is_ok());
        let err = ln_gamma(Complex64::new(f64::INFINITY, 0.0)).unwrap_err();
        assert!(err.is_numerical());
    }

    #[test]
    fn mode_names_round_trip() {
        for mode in [GammaMode::Classic, GammaMode::PiEff, GammaMode::Identity] {
            assert_eq!(mode.as_str().parse::<GammaMode>().unwrap(), mode);
        }
        let err = "euler".parse::<GammaMode>().unwrap_err();
        assert_eq!(err, GammaError::UnknownMode("euler".into()));
        assert!(!err.is_numerical());
        assert_eq!(serde_json::to_string(&GammaMode::Identity).unwrap(), "\"none\"");
    }

    #[test]
    fn factor_resolves_its_mode() {
        for mode in [GammaMode::Classic, GammaMode::PiEff, GammaMode::Identity] {
            assert_eq!(GammaFactor::new(mode, Some(3.2)).unwrap().mode(), mode);
        }
        assert!(matches!(
            GammaFactor::new(GammaMode::PiEff, None),
            Err(GammaError::InvalidPi(pi)) if pi.is_nan()
        ));
    }

    #[test]
    fn identity_ratio_is_one() {
        let ratio = GammaFactor::identity().ratio(Complex64::new(0.5, 14.0)).unwrap();
        assert_eq!(ratio, Complex64::new(1.0, 0.0));
    }

    #[test]
    fn classic_ratio_is_unimodular_on_the_critical_line() {
        // 1 − s is the conjugate of s when σ = ½.
        let ratio = GammaFactor::classic().ratio(Complex64::new(0.5, 21.0)).unwrap();
        assert_relative_eq!(ratio.norm(), 1.0, max_relative = 1e-12);
    }

    #[test]
    fn pi_eff_equal_to_pi_matches_classic() {
        let s = Complex64::new(0.6, 12.0);
        let classic = GammaFactor::classic().ratio(s).unwrap();
        let eff = GammaFactor::pi_eff(PI).unwrap().ratio(s).unwrap();
        assert!((classic - eff).norm() < 1e-12 * classic.norm());
        assert_eq!(GammaFactor::pi_eff(0.0), Err(GammaError::InvalidPi(0.0)));
        assert!(GammaFactor::new(GammaMode::PiEff, None).is_err());
    }
}
