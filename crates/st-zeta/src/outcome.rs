// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Per-point results of the tracer and the probe.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which evaluation of a reflected pair fell below the zero-avoidance bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// `ζₐ(s)`.
    Point,
    /// `ζₐ(1 − s)`.
    Reflection,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    NonFinite,
    NearZero { side: Side, magnitude: f64 },
    Numerical { message: String },
    NotConverged { iterations: u32 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NonFinite => f.write_str("non-finite value"),
            SkipReason::NearZero { side, magnitude } => {
                let side = match side {
                    Side::Point => "ζ(s)",
                    Side::Reflection => "ζ(1-s)",
                };
                write!(f, "|{side}| = {magnitude:e} below zero-avoidance bound")
            }
            SkipReason::Numerical { message } => write!(f, "numerical failure: {message}"),
            SkipReason::NotConverged { iterations } => {
                write!(f, "no convergence after {iterations} iterations")
            }
        }
    }
}

/// A dropped point together with why it was dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Skip {
    pub t: f64,
    pub sigma: f64,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T> {
    Kept(T),
    Skipped(Skip),
}

impl<T> Outcome<T> {
    pub fn is_kept(&self) -> bool {
        matches!(self, Outcome::Kept(_))
    }
}

/// Splits outcomes into kept rows and skips, preserving order.
pub fn partition<T>(outcomes: impl IntoIterator<Item = Outcome<T>>) -> (Vec<T>, Vec<Skip>) {
    let mut kept = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            Outcome::Kept(row) => kept.push(row),
            Outcome::Skipped(skip) => skipped.push(skip),
        }
    }
    (kept, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_keeps_order() {
        let skip = Skip {
            t: 2.0,
            sigma: 0.5,
            reason: SkipReason::NonFinite,
        };
        let (kept, skipped) = partition(vec![
            Outcome::Kept(1),
            Outcome::Skipped(skip.clone()),
            Outcome::Kept(3),
        ]);
        assert_eq!(kept, vec![1, 3]);
        assert_eq!(skipped, vec![skip]);
    }

    #[test]
    fn skip_serialises_flat() {
        let skip = Skip {
            t: 10.5,
            sigma: 0.5,
            reason: SkipReason::NearZero {
                side: Side::Reflection,
                magnitude: 0.0,
            },
        };
        let json = serde_json::to_value(&skip).unwrap();
        assert_eq!(json["reason"], "near_zero");
        assert_eq!(json["side"], "reflection");
        assert!(skip.reason.to_string().contains("ζ(1-s)"));
    }
}
