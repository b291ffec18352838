// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Scale-dependent correction κ(x) and the adaptive π it induces.
//!
//! Each regime contributes `κᵢ(x) = αᵢ·ln x / (1 + μᵢ·ln x) + k0ᵢ`. Multi-regime
//! kernels blend consecutive regimes with a logistic weight in log-scale,
//!
//! ```text
//! w(x) = 1 / (1 + exp(−(ln x − ln n_star) / width))
//! κ(x) = (1 − w₁)·κ₁ + w₁·[(1 − w₂)·κ₂ + w₂·κ₃]
//! ```
//!
//! so κ is continuous, reduces to the first regime as `x → 0⁺`, to the last
//! regime as `x → ∞`, and every weight moves monotonically between the two.
//! The adaptive π is `πₐ(x) = π·(1 + κ(x))`.
//!
//! The formulas are written once against [`KernelScalar`], which is
//! implemented for `f64` and for the fixed-point [`Fixed`], so the series
//! evaluator can run the kernel at its working precision.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::precision::{Fixed, PrecisionError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    #[error("kernel scale must be positive and finite (got {x})")]
    Domain { x: f64 },
    #[error("invalid kernel parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error("unknown kernel `{0}` (expected zeta_a, zeta_two or zeta_three)")]
    UnknownKernel(String),
    #[error("malformed override `{0}` (expected key=value)")]
    MalformedOverride(String),
    #[error("unknown override key `{0}`")]
    UnknownOverride(String),
    #[error("override `{key}` has a non-numeric value `{value}`")]
    InvalidOverrideValue { key: String, value: String },
    #[error("override `{0}` given more than once")]
    DuplicateOverride(String),
    #[error("override `{key}` does not apply to kernel {kind}")]
    UnsupportedOverride { key: &'static str, kind: KernelKind },
    #[error("{quantity} vanished")]
    Singular { quantity: &'static str },
    #[error(transparent)]
    Precision(#[from] PrecisionError),
}

impl KernelError {
    /// Failures caused by the numbers rather than by the configuration.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            KernelError::Singular { .. }
                | KernelError::Precision(PrecisionError::Overflow { .. })
        )
    }
}

/// Arithmetic needed to evaluate a kernel.
pub trait KernelScalar: Clone + Sized {
    /// Constant at the same precision as `self`.
    fn lift(&self, value: f64) -> Result<Self, KernelError>;
    fn add(&self, other: &Self) -> Self;
    fn sub(&self, other: &Self) -> Self;
    fn mul(&self, other: &Self) -> Self;
    fn div(&self, other: &Self) -> Option<Self>;
    fn neg(&self) -> Self;
    fn ln(&self) -> Result<Self, KernelError>;
    fn exp(&self) -> Result<Self, KernelError>;
    fn is_negative(&self) -> bool;
}

impl KernelScalar for f64 {
    fn lift(&self, value: f64) -> Result<Self, KernelError> {
        Ok(value)
    }

    fn add(&self, other: &Self) -> Self {
        self + other
    }

    fn sub(&self, other: &Self) -> Self {
        self - other
    }

    fn mul(&self, other: &Self) -> Self {
        self * other
    }

    fn div(&self, other: &Self) -> Option<Self> {
        (*other != 0.0).then(|| self / other)
    }

    fn neg(&self) -> Self {
        -self
    }

    fn ln(&self) -> Result<Self, KernelError> {
        if !(self.is_finite() && *self > 0.0) {
            return Err(KernelError::Domain { x: *self });
        }
        Ok(f64::ln(*self))
    }

    fn exp(&self) -> Result<Self, KernelError> {
        Ok(f64::exp(*self))
    }

    fn is_negative(&self) -> bool {
        *self < 0.0
    }
}

impl KernelScalar for Fixed {
    fn lift(&self, value: f64) -> Result<Self, KernelError> {
        Ok(Fixed::lift(self, value)?)
    }

    fn add(&self, other: &Self) -> Self {
        self + other
    }

    fn sub(&self, other: &Self) -> Self {
        self - other
    }

    fn mul(&self, other: &Self) -> Self {
        Fixed::mul(self, other)
    }

    fn div(&self, other: &Self) -> Option<Self> {
        self.checked_div(other)
    }

    fn neg(&self) -> Self {
        -self
    }

    fn ln(&self) -> Result<Self, KernelError> {
        Fixed::ln(self).map_err(|_| KernelError::Domain { x: self.to_f64() })
    }

    fn exp(&self) -> Result<Self, KernelError> {
        Ok(Fixed::exp(self)?)
    }

    fn is_negative(&self) -> bool {
        Fixed::is_negative(self)
    }
}

/// Coefficients of one regime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Regime {
    pub alpha: f64,
    pub mu: f64,
    pub k0: f64,
}

impl Regime {
    pub fn new(alpha: f64, mu: f64, k0: f64) -> Self {
        Self { alpha, mu, k0 }
    }

    fn validate(&self, names: [&'static str; 3]) -> Result<(), KernelError> {
        non_negative(names[0], self.alpha)?;
        non_negative(names[1], self.mu)?;
        if !self.k0.is_finite() {
            return Err(KernelError::InvalidParameter {
                name: names[2],
                value: self.k0,
                reason: "must be finite",
            });
        }
        Ok(())
    }
}

/// Logistic transition between two regimes, centred at `n_star` with a
/// log-scale `width`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Blend {
    pub n_star: f64,
    pub width: f64,
}

impl Blend {
    pub fn new(n_star: f64, width: f64) -> Self {
        Self { n_star, width }
    }

    fn validate(&self, names: [&'static str; 2]) -> Result<(), KernelError> {
        positive(names[0], self.n_star)?;
        positive(names[1], self.width)
    }
}

/// Selector for the supported kernel shapes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    #[default]
    #[serde(rename = "zeta_a", alias = "single")]
    Single,
    #[serde(rename = "zeta_two", alias = "two")]
    TwoRegime,
    #[serde(rename = "zeta_three", alias = "three")]
    ThreeRegime,
}

impl KernelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KernelKind::Single => "zeta_a",
            KernelKind::TwoRegime => "zeta_two",
            KernelKind::ThreeRegime => "zeta_three",
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KernelKind {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "zeta_a" | "single" => Ok(KernelKind::Single),
            "zeta_two" | "two" | "two_regime" => Ok(KernelKind::TwoRegime),
            "zeta_three" | "three" | "three_regime" => Ok(KernelKind::ThreeRegime),
            other => Err(KernelError::UnknownKernel(other.to_string())),
        }
    }
}

/// Fully resolved kernel: one variant per supported shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KernelParams {
    Single(Regime),
    TwoRegime {
        first: Regime,
        second: Regime,
        blend: Blend,
    },
    ThreeRegime {
        first: Regime,
        second: Regime,
        third: Regime,
        lower: Blend,
        upper: Blend,
    },
}

impl Default for KernelParams {
    fn default() -> Self {
        KernelParams::Single(Regime::default())
    }
}

impl KernelParams {
    pub fn single(alpha: f64, mu: f64, k0: f64) -> Self {
        KernelParams::Single(Regime::new(alpha, mu, k0))
    }

    pub fn kind(&self) -> KernelKind {
        match self {
            KernelParams::Single(_) => KernelKind::Single,
            KernelParams::TwoRegime { .. } => KernelKind::TwoRegime,
            KernelParams::ThreeRegime { .. } => KernelKind::ThreeRegime,
        }
    }

    pub fn validate(&self) -> Result<(), KernelError> {
        match self {
            KernelParams::Single(regime) => regime.validate(["alpha", "mu", "k0"]),
            KernelParams::TwoRegime {
                first,
                second,
                blend,
            } => {
                first.validate(["alpha1", "mu1", "k01"])?;
                second.validate(["alpha2", "mu2", "k02"])?;
                blend.validate(["n_star", "w_log"])
            }
            KernelParams::ThreeRegime {
                first,
                second,
                third,
                lower,
                upper,
            } => {
                first.validate(["alpha1", "mu1", "k01"])?;
                second.validate(["alpha2", "mu2", "k02"])?;
                third.validate(["alpha3", "mu3", "k03"])?;
                lower.validate(["n_star1", "w1"])?;
                upper.validate(["n_star2", "w2"])?;
                if upper.n_star <= lower.n_star {
                    return Err(KernelError::InvalidParameter {
                        name: "n_star2",
                        value: upper.n_star,
                        reason: "must exceed n_star1",
                    });
                }
                Ok(())
            }
        }
    }

    /// Lifts every coefficient to the precision of `template`.
    pub fn prepare<T: KernelScalar>(&self, template: &T) -> Result<PreparedKernel<T>, KernelError> {
        let (regimes, blends): (Vec<&Regime>, Vec<&Blend>) = match self {
            KernelParams::Single(regime) => (vec![regime], vec![]),
            KernelParams::TwoRegime {
                first,
                second,
                blend,
            } => (vec![first, second], vec![blend]),
            KernelParams::ThreeRegime {
                first,
                second,
                third,
                lower,
                upper,
            } => (vec![first, second, third], vec![lower, upper]),
        };
        let one = template.lift(1.0)?;
        let regimes = regimes
            .into_iter()
            .map(|r| {
                Ok(LiftedRegime {
                    alpha: template.lift(r.alpha)?,
                    mu: template.lift(r.mu)?,
                    k0: template.lift(r.k0)?,
                })
            })
            .collect::<Result<Vec<_>, KernelError>>()?;
        let blends = blends
            .into_iter()
            .map(|b| {
                Ok(LiftedBlend {
                    log_centre: template.lift(b.n_star)?.ln()?,
                    width: template.lift(b.width)?,
                })
            })
            .collect::<Result<Vec<_>, KernelError>>()?;
        Ok(PreparedKernel {
            regimes,
            blends,
            one,
        })
    }

    /// κ(x) in double precision.
    pub fn kappa(&self, x: f64) -> Result<f64, KernelError> {
        let ln_x = KernelScalar::ln(&x)?;
        self.prepare(&x)?.kappa(&ln_x)
    }

    /// πₐ(x) = π·(1 + κ(x)) in double precision.
    pub fn pi_a(&self, x: f64) -> Result<f64, KernelError> {
        Ok(PI * (1.0 + self.kappa(x)?))
    }
}

struct LiftedRegime<T> {
    alpha: T,
    mu: T,
    k0: T,
}

struct LiftedBlend<T> {
    log_centre: T,
    width: T,
}

/// Kernel with coefficients lifted to a concrete scalar type.
pub struct PreparedKernel<T> {
    regimes: Vec<LiftedRegime<T>>,
    blends: Vec<LiftedBlend<T>>,
    one: T,
}

impl<T: KernelScalar> PreparedKernel<T> {
    /// κ evaluated from `ln x`.
    pub fn kappa(&self, ln_x: &T) -> Result<T, KernelError> {
        let (last, rest) = self
            .regimes
            .split_last()
            .ok_or(KernelError::Singular { quantity: "regime list" })?;
        let mut acc = self.regime(last, ln_x)?;
        for (regime, blend) in rest.iter().zip(&self.blends).rev() {
            let weight = self.weight(blend, ln_x)?;
            let own = self.regime(regime, ln_x)?;
            acc = self.one.sub(&weight).mul(&own).add(&weight.mul(&acc));
        }
        Ok(acc)
    }

    fn regime(&self, regime: &LiftedRegime<T>, ln_x: &T) -> Result<T, KernelError> {
        let denominator = self.one.add(&regime.mu.mul(ln_x));
        let ratio = regime
            .alpha
            .mul(ln_x)
            .div(&denominator)
            .ok_or(KernelError::Singular {
                quantity: "1 + mu*ln(x)",
            })?;
        Ok(ratio.add(&regime.k0))
    }

    fn weight(&self, blend: &LiftedBlend<T>, ln_x: &T) -> Result<T, KernelError> {
        let z = ln_x
            .sub(&blend.log_centre)
            .div(&blend.width)
            .ok_or(KernelError::Singular { quantity: "blend width" })?;
        let singular = KernelError::Singular {
            quantity: "logistic denominator",
        };
        // Only ever exponentiate a non-positive argument.
        if z.is_negative() {
            let e = z.exp()?;
            e.div(&self.one.add(&e)).ok_or(singular)
        } else {
            let e = z.neg().exp()?;
            self.one.div(&self.one.add(&e)).ok_or(singular)
        }
    }
}

/// Keys accepted by the `key=value` override list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKey {
    Alpha1,
    Mu1,
    K01,
    Alpha2,
    Mu2,
    K02,
    Alpha3,
    Mu3,
    K03,
    NStar,
    WLog,
    NStar1,
    NStar2,
    W1,
    W2,
}

impl OverrideKey {
    pub const ALL: [OverrideKey; 15] = [
        OverrideKey::Alpha1,
        OverrideKey::Mu1,
        OverrideKey::K01,
        OverrideKey::Alpha2,
        OverrideKey::Mu2,
        OverrideKey::K02,
        OverrideKey::Alpha3,
        OverrideKey::Mu3,
        OverrideKey::K03,
        OverrideKey::NStar,
        OverrideKey::WLog,
        OverrideKey::NStar1,
        OverrideKey::NStar2,
        OverrideKey::W1,
        OverrideKey::W2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideKey::Alpha1 => "alpha1",
            OverrideKey::Mu1 => "mu1",
            OverrideKey::K01 => "k01",
            OverrideKey::Alpha2 => "alpha2",
            OverrideKey::Mu2 => "mu2",
            OverrideKey::K02 => "k02",
            OverrideKey::Alpha3 => "alpha3",
            OverrideKey::Mu3 => "mu3",
            OverrideKey::K03 => "k03",
            OverrideKey::NStar => "n_star",
            OverrideKey::WLog => "w_log",
            OverrideKey::NStar1 => "n_star1",
            OverrideKey::NStar2 => "n_star2",
            OverrideKey::W1 => "w1",
            OverrideKey::W2 => "w2",
        }
    }

    pub fn applies_to(&self, kind: KernelKind) -> bool {
        use OverrideKey::*;
        match kind {
            KernelKind::Single => matches!(self, Alpha1 | Mu1 | K01),
            KernelKind::TwoRegime => {
                matches!(self, Alpha1 | Mu1 | K01 | Alpha2 | Mu2 | K02 | NStar | WLog)
            }
            KernelKind::ThreeRegime => !matches!(self, NStar | WLog),
        }
    }
}

impl FromStr for OverrideKey {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OverrideKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| KernelError::UnknownOverride(s.to_string()))
    }
}

/// Validated override values keyed by parameter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KernelOverrides(BTreeMap<OverrideKey, f64>);

impl KernelOverrides {
    /// Parses `alpha2=0.02,n_star=2000`. Empty segments are ignored.
    pub fn parse(text: &str) -> Result<Self, KernelError> {
        let mut values = BTreeMap::new();
        for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| KernelError::MalformedOverride(pair.to_string()))?;
            let (key, value) = (key.trim(), value.trim());
            let parsed_key: OverrideKey = key.parse()?;
            let parsed_value: f64 =
                value
                    .parse()
                    .map_err(|_| KernelError::InvalidOverrideValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    })?;
            if values.insert(parsed_key, parsed_value).is_some() {
                return Err(KernelError::DuplicateOverride(key.to_string()));
            }
        }
        Ok(Self(values))
    }

    pub fn get(&self, key: OverrideKey) -> Option<f64> {
        self.0.get(&key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Structured kernel configuration: a selector, base coefficients for the
/// first regime, and explicit overrides for everything else.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelSpec {
    pub kind: KernelKind,
    pub alpha: f64,
    pub mu: f64,
    pub k0: f64,
    pub overrides: KernelOverrides,
}

impl KernelSpec {
    pub fn new(kind: KernelKind, alpha: f64, mu: f64, k0: f64) -> Self {
        Self {
            kind,
            alpha,
            mu,
            k0,
            overrides: KernelOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: KernelOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Resolves the per-variant defaults and validates the result.
    pub fn build(&self) -> Result<KernelParams, KernelError> {
        for key in self.overrides.0.keys() {
            if !key.applies_to(self.kind) {
                return Err(KernelError::UnsupportedOverride {
                    key: key.as_str(),
                    kind: self.kind,
                });
            }
        }
        let get = |key: OverrideKey, default: f64| self.overrides.get(key).unwrap_or(default);
        let first = Regime::new(
            get(OverrideKey::Alpha1, self.alpha),
            get(OverrideKey::Mu1, self.mu),
            get(OverrideKey::K01, self.k0),
        );
        let second = Regime::new(
            get(OverrideKey::Alpha2, 0.0),
            get(OverrideKey::Mu2, 0.0),
            get(OverrideKey::K02, 0.0),
        );
        let params = match self.kind {
            KernelKind::Single => KernelParams::Single(first),
            KernelKind::TwoRegime => KernelParams::TwoRegime {
                first,
                second,
                blend: Blend::new(get(OverrideKey::NStar, 1000.0), get(OverrideKey::WLog, 0.5)),
            },
            KernelKind::ThreeRegime => KernelParams::ThreeRegime {
                first,
                second,
                third: Regime::new(
                    get(OverrideKey::Alpha3, 0.0),
                    get(OverrideKey::Mu3, 0.0),
                    get(OverrideKey::K03, 0.0),
                ),
                lower: Blend::new(get(OverrideKey::NStar1, 1000.0), get(OverrideKey::W1, 0.6)),
                upper: Blend::new(get(OverrideKey::NStar2, 8000.0), get(OverrideKey::W2, 0.6)),
            },
        };
        params.validate()?;
        Ok(params)
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), KernelError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(KernelError::InvalidParameter {
            name,
            value,
            reason: "must be finite and non-negative",
        })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), KernelError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(KernelError::InvalidParameter {
            name,
            value,
            reason: "must be finite and positive",
        })
    }
}
