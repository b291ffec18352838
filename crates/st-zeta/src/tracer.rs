// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Zero-candidate tracing along vertical cuts `s = σ + it`.
//!
//! For each ordinate the tracer locates a local minimum of `|ζₐ(σ + it)|`
//! in σ. These are candidates only: a minimum of the modulus along a 1-D cut
//! is not a certified zero.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::outcome::{partition, Outcome, Skip, SkipReason};
use crate::series::{AdaptiveZeta, SeriesError};

/// Slack on the upper ordinate so accumulated rounding cannot drop `t_stop`.
pub const ORDINATE_SLACK: f64 = 1e-12;
/// Upper bound on ordinates per trace and on samples per grid axis.
pub const MAX_POINTS: usize = 1_000_000;
/// Added before taking the log of the modulus in the bracketed objective.
const MODULUS_FLOOR: f64 = 1e-60;
const GOLDEN: f64 = 0.381_966_011_250_105;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TraceError {
    #[error("invalid trace parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// How σ is searched at each ordinate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceMethod {
    Grid {
        sigma_min: f64,
        sigma_max: f64,
        samples: usize,
    },
    Bracketed {
        lower: f64,
        guess: f64,
        upper: f64,
        tolerance: f64,
        max_iterations: u32,
    },
}

impl Default for TraceMethod {
    fn default() -> Self {
        TraceMethod::Grid {
            sigma_min: 0.3,
            sigma_max: 0.9,
            samples: 121,
        }
    }
}

impl TraceMethod {
    pub fn bracketed() -> Self {
        TraceMethod::Bracketed {
            lower: 0.3,
            guess: 0.5,
            upper: 0.9,
            tolerance: 1e-6,
            max_iterations: 100,
        }
    }

    fn validate(&self) -> Result<(), TraceError> {
        match *self {
            TraceMethod::Grid {
                sigma_min,
                sigma_max,
                samples,
            } => {
                finite("sigma_min", sigma_min)?;
                finite("sigma_max", sigma_max)?;
                if sigma_max < sigma_min {
                    return Err(invalid("sigma_max", sigma_max, "must not be below sigma_min"));
                }
                check_count("samples", samples)
            }
            TraceMethod::Bracketed {
                lower,
                guess,
                upper,
                tolerance,
                max_iterations,
            } => {
                finite("lower", lower)?;
                finite("guess", guess)?;
                finite("upper", upper)?;
                if !(lower < guess && guess < upper) {
                    return Err(invalid("guess", guess, "must lie strictly inside (lower, upper)"));
                }
                if !(tolerance.is_finite() && tolerance > 0.0) {
                    return Err(invalid("tolerance", tolerance, "must be positive"));
                }
                if max_iterations < 1 {
                    return Err(invalid(
                        "max_iterations",
                        f64::from(max_iterations),
                        "must be at least 1",
                    ));
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceConfig {
    pub t_start: f64,
    pub t_stop: f64,
    pub dt: f64,
    pub method: TraceMethod,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            t_start: 10.0,
            t_stop: 60.0,
            dt: 0.25,
            method: TraceMethod::default(),
        }
    }
}

impl TraceConfig {
    pub fn validate(&self) -> Result<(), TraceError> {
        finite("t_start", self.t_start)?;
        finite("t_stop", self.t_stop)?;
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(invalid("dt", self.dt, "must be positive"));
        }
        if self.t_stop < self.t_start {
            return Err(invalid("t_stop", self.t_stop, "must not be below t_start"));
        }
        let count = ((self.t_stop - self.t_start) / self.dt).floor() + 1.0;
        if count > MAX_POINTS as f64 {
            return Err(invalid("dt", self.dt, "yields more than 1000000 ordinates"));
        }
        self.method.validate()
    }

    /// `t_k = t_start + k·dt` for every `t_k ≤ t_stop` (with slack).
    pub fn ordinates(&self) -> Vec<f64> {
        let mut out = Vec::new();
        let mut k = 0u64;
        loop {
            let t = self.t_start + k as f64 * self.dt;
            if t > self.t_stop + ORDINATE_SLACK {
                break;
            }
            out.push(t);
            k += 1;
        }
        out
    }
}

/// One zero candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraceRow {
    pub sigma: f64,
    pub t: f64,
    pub abs_zeta: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZeroTrace {
    /// Ascending in `t`.
    pub rows: Vec<TraceRow>,
    pub skipped: Vec<Skip>,
}

/// Traces minima of `|ζₐ|` across the configured ordinates.
pub fn trace_zeros(zeta: &AdaptiveZeta, config: &TraceConfig) -> Result<ZeroTrace, TraceError> {
    trace_with(config, |sigma, t| {
        Ok(zeta.evaluate(Complex64::new(sigma, t))?.norm())
    })
}

/// Tracing loop over an arbitrary modulus `(σ, t) ↦ |f|`.
pub fn trace_with<F>(config: &TraceConfig, mut modulus: F) -> Result<ZeroTrace, TraceError>
where
    F: FnMut(f64, f64) -> Result<f64, SeriesError>,
{
    config.validate()?;
    let ordinates = config.ordinates();
    let mut outcomes = Vec::with_capacity(ordinates.len());
    for t in ordinates {
        let outcome = match config.method {
            TraceMethod::Grid {
                sigma_min,
                sigma_max,
                samples,
            } => grid_minimum(t, &linspace(sigma_min, sigma_max, samples), &mut modulus)?,
            TraceMethod::Bracketed {
                lower,
                guess,
                upper,
                tolerance,
                max_iterations,
            } => bracketed_minimum(
                t,
                (lower, guess, upper),
                tolerance,
                max_iterations,
                &mut modulus,
            )?,
        };
        if let Outcome::Skipped(skip) = &outcome {
            warn!(target: "st_zeta::tracer", t = skip.t, reason = %skip.reason, "ordinate skipped");
        }
        outcomes.push(outcome);
    }
    let (rows, skipped) = partition(outcomes);
    info!(
        target: "st_zeta::tracer",
        rows = rows.len(),
        skipped = skipped.len(),
        "zero trace finished"
    );
    Ok(ZeroTrace { rows, skipped })
}

/// Maps a per-point failure to a skip, or aborts on configuration errors.
fn absorb(t: f64, sigma: f64, err: SeriesError) -> Result<Outcome<TraceRow>, TraceError> {
    if err.is_numerical() {
        Ok(Outcome::Skipped(Skip {
            t,
            sigma,
            reason: SkipReason::Numerical {
                message: err.to_string(),
            },
        }))
    } else {
        Err(err.into())
    }
}

fn grid_minimum<F>(t: f64, sigmas: &[f64], modulus: &mut F) -> Result<Outcome<TraceRow>, TraceError>
where
    F: FnMut(f64, f64) -> Result<f64, SeriesError>,
{
    let mut values = Vec::with_capacity(sigmas.len());
    for &sigma in sigmas {
        match modulus(sigma, t) {
            Ok(value) if value.is_nan() => {
                return Ok(Outcome::Skipped(Skip {
                    t,
                    sigma,
                    reason: SkipReason::NonFinite,
                }))
            }
            Ok(value) => values.push(value),
            Err(err) => return absorb(t, sigma, err),
        }
    }

    // First index wins ties.
    let mut best = 0;
    for (j, &value) in values.iter().enumerate().skip(1) {
        if value < values[best] {
            best = j;
        }
    }
    if !values[best].is_finite() {
        return Ok(Outcome::Skipped(Skip {
            t,
            sigma: sigmas[best],
            reason: SkipReason::NonFinite,
        }));
    }

    let mut sigma = sigmas[best];
    if best > 0 && best + 1 < sigmas.len() {
        if let Some(vertex) = parabolic_vertex(
            (sigmas[best - 1], values[best - 1]),
            (sigmas[best], values[best]),
            (sigmas[best + 1], values[best + 1]),
        ) {
            sigma = vertex;
        }
    }
    Ok(Outcome::Kept(TraceRow {
        sigma,
        t,
        abs_zeta: values[best],
    }))
}

/// Vertex of the parabola through three points, when the fit is well posed
/// and the vertex lies within `[x0, x2]`.
pub fn parabolic_vertex(p0: (f64, f64), p1: (f64, f64), p2: (f64, f64)) -> Option<f64> {
    let (x0, y0) = p0;
    let (x1, y1) = p1;
    let (x2, y2) = p2;
    let denom = (x0 - x1) * (x0 - x2) * (x1 - x2);
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    let a = (x2 * (y1 - y0) + x1 * (y0 - y2) + x0 * (y2 - y1)) / denom;
    let b = (x2 * x2 * (y0 - y1) + x1 * x1 * (y2 - y0) + x0 * x0 * (y1 - y2)) / denom;
    if a == 0.0 || !a.is_finite() {
        return None;
    }
    let vertex = -b / (2.0 * a);
    let (lo, hi) = if x0 <= x2 { (x0, x2) } else { (x2, x0) };
    (vertex >= lo && vertex <= hi).then_some(vertex)
}

fn bracketed_minimum<F>(
    t: f64,
    bracket: (f64, f64, f64),
    tolerance: f64,
    max_iterations: u32,
    modulus: &mut F,
) -> Result<Outcome<TraceRow>, TraceError>
where
    F: FnMut(f64, f64) -> Result<f64, SeriesError>,
{
    let mut objective = |sigma: f64| -> Result<f64, (f64, SeriesError)> {
        modulus(sigma, t)
            .map(|value| (value + MODULUS_FLOOR).ln())
            .map_err(|err| (sigma, err))
    };
    let found = match brent_minimize(&mut objective, bracket, tolerance, max_iterations) {
        Ok(found) => found,
        Err(BrentFailure::Objective((sigma, err))) => return absorb(t, sigma, err),
        Err(BrentFailure::NotConverged) => {
            return Ok(Outcome::Skipped(Skip {
                t,
                sigma: bracket.1,
                reason: SkipReason::NotConverged {
                    iterations: max_iterations,
                },
            }))
        }
    };
    let (sigma, _) = found;
    let abs_zeta = match modulus(sigma, t) {
        Ok(value) => value,
        Err(err) => return absorb(t, sigma, err),
    };
    if !abs_zeta.is_finite() {
        return Ok(Outcome::Skipped(Skip {
            t,
            sigma,
            reason: SkipReason::NonFinite,
        }));
    }
    Ok(Outcome::Kept(TraceRow { sigma, t, abs_zeta }))
}

enum BrentFailure<E> {
    Objective(E),
    NotConverged,
}

/// Brent's bounded minimiser on `[lower, upper]`, started at `guess`.
fn brent_minimize<F, E>(
    f: &mut F,
    (lower, guess, upper): (f64, f64, f64),
    tolerance: f64,
    max_iterations: u32,
) -> Result<(f64, f64), BrentFailure<E>>
where
    F: FnMut(f64) -> Result<f64, E>,
{
    let sqrt_eps = f64::EPSILON.sqrt();
    let (mut a, mut b) = (lower, upper);
    let (mut x, mut w, mut v) = (guess, guess, guess);
    let mut fx = f(x).map_err(BrentFailure::Objective)?;
    if fx.is_nan() {
        return Err(BrentFailure::NotConverged);
    }
    let (mut fw, mut fv) = (fx, fx);
    let (mut d, mut e) = (0.0f64, 0.0f64);

    for _ in 0..max_iterations {
        let xm = 0.5 * (a + b);
        let tol1 = sqrt_eps * x.abs() + tolerance / 3.0;
        let tol2 = 2.0 * tol1;
        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            return Ok((x, fx));
        }

        let mut golden = true;
        if e.abs() > tol1 {
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let previous = e;
            e = d;
            if p.abs() < (0.5 * q * previous).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = tol1.copysign(xm - x);
                }
                golden = false;
            }
        }
        if golden {
            e = if x >= xm { a - x } else { b - x };
            d = GOLDEN * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else {
            x + tol1.copysign(d)
        };
        let fu = f(u).map_err(BrentFailure::Objective)?;
        if fu.is_nan() {
            return Err(BrentFailure::NotConverged);
        }
        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }
    Err(BrentFailure::NotConverged)
}

/// `n` evenly spaced points from `start` to `stop` inclusive; `[start]` when
/// `n == 1`.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i + 1 == n { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

fn invalid(name: &'static str, value: f64, reason: &'static str) -> TraceError {
    TraceError::InvalidParameter {
        name,
        value,
        reason,
    }
}

/// `1 ≤ count ≤ MAX_POINTS`.
pub(crate) fn check_count(name: &'static str, count: usize) -> Result<(), TraceError> {
    if count < 1 {
        return Err(invalid(name, 0.0, "must be at least 1"));
    }
    if count > MAX_POINTS {
        return Err(invalid(name, count as f64, "must not exceed 1000000"));
    }
    Ok(())
}

fn finite(name: &'static str, value: f64) -> Result<(), TraceError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(name, value, "must be finite"))
    }
}
