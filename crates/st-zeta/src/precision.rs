// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Binary fixed-point arithmetic at a caller-selected precision.
//!
//! A [`Fixed`] value stores `raw / 2^bits` with an unbounded [`BigInt`]
//! mantissa, so large magnitudes never overflow and small magnitudes keep
//! an absolute resolution of `2^-bits`. The number of bits is derived from a
//! [`Precision`] expressed in decimal digits plus [`GUARD_BITS`] of headroom.
//! Every operation works at the precision of its operands; there is no
//! process-wide "current precision".
//!
//! The elementary functions use the classical reductions:
//!
//! * `exp` — `x = m·ln 2 + r`, then `r / 2^8` through a Taylor series and
//!   eight squarings.
//! * `ln` — `x = 2^e·y` with `y ∈ [0.75, 1.5)`, then `2·atanh((y−1)/(y+1))`.
//! * `cis` — reduction modulo `2π`, then a joint sine/cosine Taylor series on
//!   `r / 2^10` followed by ten double-angle steps.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::sync::{Mutex, OnceLock};

use num_bigint::BigInt;
use num_complex::Complex64;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extra binary digits carried beyond the requested decimal precision.
pub const GUARD_BITS: u32 = 64;

/// Internal headroom used inside the elementary functions.
const WORK_BITS: usize = 32;

/// Headroom for the integer logarithm table, which accumulates one rounding
/// error per entry.
const TABLE_BITS: usize = 48;

/// Largest binary exponent `exp` is allowed to produce.
const MAX_EXP_SHIFT: i64 = 1 << 16;

const LOG2_10: f64 = 3.321_928_094_887_362_3;

/// Errors raised by the fixed-point layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PrecisionError {
    #[error("precision must be within {min}..={max} decimal digits (got {digits})")]
    InvalidDigits { digits: u32, min: u32, max: u32 },
    #[error("cannot represent non-finite value {value}")]
    NonFinite { value: f64 },
    #[error("logarithm of a non-positive value")]
    NonPositiveLog,
    #[error("exponential overflow: result exceeds 2^{shift}")]
    Overflow { shift: i64 },
}

/// Working precision in significant decimal digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Precision {
    digits: u32,
}

impl Precision {
    pub const MIN_DIGITS: u32 = 1;
    pub const MAX_DIGITS: u32 = 1000;

    pub fn new(digits: u32) -> Result<Self, PrecisionError> {
        if !(Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digits) {
            return Err(PrecisionError::InvalidDigits {
                digits,
                min: Self::MIN_DIGITS,
                max: Self::MAX_DIGITS,
            });
        }
        Ok(Self { digits })
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// Number of fractional bits used by [`Fixed`] values at this precision.
    pub fn bits(&self) -> u32 {
        (self.digits as f64 * LOG2_10).ceil() as u32 + GUARD_BITS
    }

    /// Whether magnitudes down to `epsilon` are resolved with at least two
    /// spare decimal digits.
    pub fn resolves(&self, epsilon: f64) -> bool {
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return false;
        }
        self.digits as f64 > -epsilon.log10() + 2.0
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self { digits: 60 }
    }
}

impl TryFrom<u32> for Precision {
    type Error = PrecisionError;

    fn try_from(digits: u32) -> Result<Self, Self::Error> {
        Self::new(digits)
    }
}

impl From<Precision> for u32 {
    fn from(precision: Precision) -> Self {
        precision.digits
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} digits", self.digits)
    }
}

/// Binary fixed-point real number `raw · 2^-bits`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fixed {
    raw: BigInt,
    bits: u32,
}

impl Fixed {
    fn from_raw(raw: BigInt, bits: u32) -> Self {
        Self { raw, bits }
    }

    pub fn zero(precision: Precision) -> Self {
        Self::from_raw(BigInt::zero(), precision.bits())
    }

    pub fn one(precision: Precision) -> Self {
        let bits = precision.bits();
        Self::from_raw(BigInt::one() << bits as usize, bits)
    }

    pub fn from_int(value: i64, precision: Precision) -> Self {
        let bits = precision.bits();
        Self::from_raw(BigInt::from(value) << bits as usize, bits)
    }

    /// Exact conversion of a finite double.
    pub fn from_f64(value: f64, precision: Precision) -> Result<Self, PrecisionError> {
        let bits = precision.bits();
        Ok(Self::from_raw(raw_from_f64(value, bits)?, bits))
    }

    /// Constant at the same precision as `self`.
    pub fn lift(&self, value: f64) -> Result<Self, PrecisionError> {
        Ok(Self::from_raw(raw_from_f64(value, self.bits)?, self.bits))
    }

    pub fn pi(precision: Precision) -> Self {
        let bits = precision.bits();
        Self::from_raw(constants(bits).pi, bits)
    }

    pub fn ln2(precision: Precision) -> Self {
        let bits = precision.bits();
        Self::from_raw(constants(bits).ln2, bits)
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.raw.is_positive()
    }

    pub fn is_negative(&self) -> bool {
        self.raw.is_negative()
    }

    pub fn mul(&self, other: &Fixed) -> Fixed {
        debug_assert_eq!(self.bits, other.bits, "precision mismatch");
        Self::from_raw(mul_trunc(&self.raw, &other.raw, self.bits as usize), self.bits)
    }

    pub fn checked_div(&self, other: &Fixed) -> Option<Fixed> {
        debug_assert_eq!(self.bits, other.bits, "precision mismatch");
        if other.raw.is_zero() {
            return None;
        }
        Some(Self::from_raw(
            (&self.raw << self.bits as usize) / &other.raw,
            self.bits,
        ))
    }

    /// Rounds to the nearest double; values beyond the `f64` range saturate
    /// to `±∞`.
    pub fn to_f64(&self) -> f64 {
        if self.raw.is_zero() {
            return 0.0;
        }
        let len = self.raw.bits();
        let shift = len.saturating_sub(64);
        let top = (&self.raw >> shift as usize).to_f64().unwrap_or(f64::NAN);
        scale_by_pow2(top, shift as i64 - self.bits as i64)
    }

    pub fn exp(&self) -> Result<Fixed, PrecisionError> {
        let bits = self.bits as usize;
        let work = bits + WORK_BITS;
        let x = &self.raw << WORK_BITS;
        let ln2 = constants(work as u32).ln2;
        let two_ln2 = &ln2 << 1usize;
        let m = ((&x << 1usize) + &ln2).div_floor(&two_ln2);

        let shift = match m.to_i64() {
            Some(shift) if shift > MAX_EXP_SHIFT => {
                return Err(PrecisionError::Overflow { shift });
            }
            Some(shift) if shift < -(work as i64) - 2 => return Ok(Self::from_raw(BigInt::zero(), self.bits)),
            Some(shift) => shift,
            None if m.is_negative() => return Ok(Self::from_raw(BigInt::zero(), self.bits)),
            None => return Err(PrecisionError::Overflow { shift: i64::MAX }),
        };

        const HALVINGS: usize = 8;
        let r = (x - &m * &ln2) >> HALVINGS;
        let one = BigInt::one() << work;
        let mut sum = one.clone();
        let mut term = one;
        let mut k = 1u32;
        loop {
            term = mul_trunc(&term, &r, work) / k;
            if term.is_zero() {
                break;
            }
            sum += &term;
            k += 1;
        }
        for _ in 0..HALVINGS {
            sum = mul_trunc(&sum, &sum, work);
        }
        let scaled = if shift >= 0 {
            sum << shift as usize
        } else {
            sum >> (-shift) as usize
        };
        Ok(Self::from_raw(scaled >> WORK_BITS, self.bits))
    }

    pub fn ln(&self) -> Result<Fixed, PrecisionError> {
        if !self.raw.is_positive() {
            return Err(PrecisionError::NonPositiveLog);
        }
        let work = self.bits as usize + WORK_BITS;
        let x = &self.raw << WORK_BITS;
        let one = BigInt::one() << work;

        let mut exponent = x.bits() as i64 - 1 - work as i64;
        let mut y = if exponent >= 0 {
            x >> exponent as usize
        } else {
            x << (-exponent) as usize
        };
        let three_halves = (&one * 3u32) >> 1usize;
        if y >= three_halves {
            y = y >> 1usize;
            exponent += 1;
        }

        let z = ((&y - &one) << work) / (&y + &one);
        let z2 = mul_trunc(&z, &z, work);
        let mut sum = z.clone();
        let mut term = z;
        let mut k = 1u64;
        loop {
            term = mul_trunc(&term, &z2, work);
            if term.is_zero() {
                break;
            }
            sum += &term / (2 * k + 1);
            k += 1;
        }

        let ln2 = constants(work as u32).ln2;
        let raw = (sum << 1usize) + ln2 * BigInt::from(exponent);
        Ok(Self::from_raw(raw >> WORK_BITS, self.bits))
    }

    /// Returns `(cos x, sin x)`.
    pub fn cis(&self) -> (Fixed, Fixed) {
        let work = self.bits as usize + WORK_BITS;
        let x = &self.raw << WORK_BITS;
        let two_pi = constants(work as u32).pi << 1usize;
        let turns = ((&x << 1usize) + &two_pi).div_floor(&(&two_pi << 1usize));

        const HALVINGS: usize = 10;
        let r = (x - turns * &two_pi) >> HALVINGS;
        let one = BigInt::one() << work;
        let mut cos = one.clone();
        let mut sin = BigInt::zero();
        let mut term = one;
        let mut k = 1u32;
        loop {
            term = mul_trunc(&term, &r, work) / k;
            if term.is_zero() {
                break;
            }
            match k % 4 {
                1 => sin += &term,
                2 => cos -= &term,
                3 => sin -= &term,
                _ => cos += &term,
            }
            k += 1;
        }
        for _ in 0..HALVINGS {
            let next_cos = mul_trunc(&cos, &cos, work) - mul_trunc(&sin, &sin, work);
            let next_sin = mul_trunc(&sin, &cos, work) << 1usize;
            cos = next_cos;
            sin = next_sin;
        }
        (
            Self::from_raw(cos >> WORK_BITS, self.bits),
            Self::from_raw(sin >> WORK_BITS, self.bits),
        )
    }
}

impl Add<&Fixed> for &Fixed {
    type Output = Fixed;

    fn add(self, rhs: &Fixed) -> Fixed {
        debug_assert_eq!(self.bits, rhs.bits, "precision mismatch");
        Fixed::from_raw(&self.raw + &rhs.raw, self.bits)
    }
}

impl Sub<&Fixed> for &Fixed {
    type Output = Fixed;

    fn sub(self, rhs: &Fixed) -> Fixed {
        debug_assert_eq!(self.bits, rhs.bits, "precision mismatch");
        Fixed::from_raw(&self.raw - &rhs.raw, self.bits)
    }
}

impl Neg for &Fixed {
    type Output = Fixed;

    fn neg(self) -> Fixed {
        Fixed::from_raw(-&self.raw, self.bits)
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

/// Complex number with fixed-point components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BigComplex {
    pub re: Fixed,
    pub im: Fixed,
}

impl BigComplex {
    pub fn zero(precision: Precision) -> Self {
        Self {
            re: Fixed::zero(precision),
            im: Fixed::zero(precision),
        }
    }

    pub fn to_complex64(&self) -> Complex64 {
        Complex64::new(self.re.to_f64(), self.im.to_f64())
    }
}

/// `ln 1, ln 2, …, ln n_max` at the given precision.
pub fn ln_table(n_max: u64, precision: Precision) -> Vec<Fixed> {
    let bits = precision.bits();
    let work = bits as usize + TABLE_BITS;
    let mut out = Vec::with_capacity(n_max as usize);
    let mut acc = BigInt::zero();
    for n in 1..=n_max {
        if n > 1 {
            // ln n − ln(n−1) = 2·atanh(1/(2n−1))
            acc += atanh_inv(2 * n - 1, work) << 1usize;
        }
        out.push(Fixed::from_raw(&acc >> TABLE_BITS, bits));
    }
    out
}

struct Constants {
    pi: BigInt,
    ln2: BigInt,
}

static CONSTANTS: OnceLock<Mutex<HashMap<u32, (BigInt, BigInt)>>> = OnceLock::new();

/// π and ln 2 at `bits` fractional bits, memoised per bit count.
fn constants(bits: u32) -> Constants {
    let cache = CONSTANTS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let (pi, ln2) = cache
        .entry(bits)
        .or_insert_with(|| {
            let work = bits as usize + WORK_BITS;
            // Machin: π = 16·atan(1/5) − 4·atan(1/239)
            let pi = (atan_inv(5, work) << 4usize) - (atan_inv(239, work) << 2usize);
            let ln2 = atanh_inv(3, work) << 1usize;
            (pi >> WORK_BITS, ln2 >> WORK_BITS)
        })
        .clone();
    Constants { pi, ln2 }
}

fn atan_inv(k: u64, bits: usize) -> BigInt {
    inverse_series(k, bits, true)
}

fn atanh_inv(k: u64, bits: usize) -> BigInt {
    inverse_series(k, bits, false)
}

/// `Σ (±1)^j / ((2j+1)·k^(2j+1))`, i.e. `atan(1/k)` or `atanh(1/k)`.
fn inverse_series(k: u64, bits: usize, alternating: bool) -> BigInt {
    let k_squared = BigInt::from(k) * k;
    let mut term = (BigInt::one() << bits) / k;
    let mut sum = term.clone();
    let mut j = 1u64;
    loop {
        term = term / &k_squared;
        if term.is_zero() {
            break;
        }
        let contribution = &term / (2 * j + 1);
        if alternating && j % 2 == 1 {
            sum -= contribution;
        } else {
            sum += contribution;
        }
        j += 1;
    }
    sum
}

/// Product rounded toward zero so sign-alternating series terminate.
fn mul_trunc(a: &BigInt, b: &BigInt, bits: usize) -> BigInt {
    let product = a * b;
    if product.is_negative() {
        -((-product) >> bits)
    } else {
        product >> bits
    }
}

fn raw_from_f64(value: f64, bits: u32) -> Result<BigInt, PrecisionError> {
    if !value.is_finite() {
        return Err(PrecisionError::NonFinite { value });
    }
    if value == 0.0 {
        return Ok(BigInt::zero());
    }
    let word = value.to_bits();
    let negative = word >> 63 == 1;
    let exponent_field = ((word >> 52) & 0x7ff) as i64;
    let fraction = word & ((1u64 << 52) - 1);
    let (mantissa, exponent) = if exponent_field == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), exponent_field - 1075)
    };
    let shift = exponent + bits as i64;
    let magnitude = BigInt::from(mantissa);
    let raw = if shift >= 0 {
        magnitude << shift as usize
    } else {
        magnitude >> (-shift) as usize
    };
    Ok(if negative { -raw } else { raw })
}

fn scale_by_pow2(mut value: f64, mut exponent: i64) -> f64 {
    while exponent > 1000 {
        value *= 2f64.powi(1000);
        exponent -= 1000;
        if value.is_infinite() {
            return value;
        }
    }
    while exponent < -1000 {
        value *= 2f64.powi(-1000);
        exponent += 1000;
        if value == 0.0 {
            return value;
        }
    }
    value * 2f64.powi(exponent as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn p(digits: u32) -> Precision {
        Precision::new(digits).unwrap()
    }

    #[test]
    fn rejects_out_of_range_digits() {
        assert!(matches!(
            Precision::new(0),
            Err(PrecisionError::InvalidDigits { digits: 0, .. })
        ));
        assert!(Precision::new(1001).is_err());
        assert_eq!(Precision::default().digits(), 60);
    }

    #[test]
    fn f64_round_trip_is_exact() {
        for value in [0.0, 1.0, -2.5, 0.1, 1e-300, 123456.789, -7.25e12] {
            let fixed = Fixed::from_f64(value, p(400)).unwrap();
            assert_eq!(fixed.to_f64(), value);
        }
        assert!(Fixed::from_f64(f64::NAN, p(30)).is_err());
    }

    #[test]
    fn constants_match_double_precision() {
        assert_relative_eq!(Fixed::pi(p(50)).to_f64(), std::f64::consts::PI);
        assert_relative_eq!(Fixed::ln2(p(50)).to_f64(), std::f64::consts::LN_2);
    }

    #[test]
    fn pi_agrees_across_precisions() {
        let coarse = Fixed::pi(p(40));
        let fine = Fixed::pi(p(80));
        let shifted = Fixed::from_raw(&fine.raw >> (fine.bits - coarse.bits) as usize, coarse.bits);
        let diff = (&coarse - &shifted).raw.abs();
        assert!(diff <= BigInt::from(2), "diff = {diff}");
    }

    #[test]
    fn exp_and_ln_are_inverse() {
        let precision = p(50);
        for value in [-40.0, -3.2, -0.5, 0.0, 0.25, 1.0, 7.5, 55.0] {
            let x = Fixed::from_f64(value, precision).unwrap();
            let back = x.exp().unwrap().ln().unwrap();
            assert!((&back - &x).to_f64().abs() < 1e-40, "value = {value}");
        }
        assert_relative_eq!(
            Fixed::from_f64(1.0, precision).unwrap().exp().unwrap().to_f64(),
            std::f64::consts::E
        );
    }

    #[test]
    fn exp_underflows_to_zero_and_overflow_is_reported() {
        let precision = p(20);
        let tiny = Fixed::from_f64(-1.0e5, precision).unwrap().exp().unwrap();
        assert!(tiny.is_zero());
        let huge = Fixed::from_f64(1.0e6, precision).unwrap().exp();
        assert!(matches!(huge, Err(PrecisionError::Overflow { .. })));
    }

    #[test]
    fn ln_rejects_non_positive() {
        assert_eq!(
            Fixed::zero(p(20)).ln(),
            Err(PrecisionError::NonPositiveLog)
        );
        assert_relative_eq!(
            Fixed::from_int(10, p(30)).ln().unwrap().to_f64(),
            10f64.ln(),
            max_relative = 1e-15
        );
    }

    #[test]
    fn cis_matches_libm_after_reduction() {
        let precision = p(40);
        for value in [0.0, 0.3, -1.7, 3.0, 100.25, -2345.5] {
            let (cos, sin) = Fixed::from_f64(value, precision).unwrap().cis();
            assert!((cos.to_f64() - f64::cos(value)).abs() < 1e-12, "cos({value})");
            assert!((sin.to_f64() - f64::sin(value)).abs() < 1e-12, "sin({value})");
        }
    }

    #[test]
    fn ln_table_matches_direct_logarithm() {
        let precision = p(45);
        let table = ln_table(300, precision);
        assert_eq!(table.len(), 300);
        assert!(table[0].is_zero());
        for n in [2u64, 3, 17, 128, 300] {
            let direct = Fixed::from_int(n as i64, precision).ln().unwrap();
            let diff = (&table[n as usize - 1] - &direct).to_f64().abs();
            assert!(diff < 1e-40, "n = {n}, diff = {diff}");
        }
    }

    #[test]
    fn resolves_requires_headroom() {
        assert!(p(60).resolves(1e-10));
        assert!(!p(11).resolves(1e-10));
        assert!(!p(60).resolves(0.0));
    }
}
