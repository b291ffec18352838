// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Reductions of probe rows to functional-equation statistics.

use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::probe::ProbeRow;
use crate::table::{load_table, TableError};

/// Removes jumps larger than π between consecutive phases by adding
/// multiples of 2π. Corrections accumulate from the raw differences, so an
/// exact jump of ±π is left alone.
pub fn unwrap_phase(phases: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(phases.len());
    let Some(&first) = phases.first() else {
        return out;
    };
    out.push(first);
    let mut correction = 0.0;
    for pair in phases.windows(2) {
        let delta = pair[1] - pair[0];
        let mut wrapped = (delta + PI).rem_euclid(2.0 * PI) - PI;
        if wrapped == -PI && delta > 0.0 {
            wrapped = PI;
        }
        if delta.abs() >= PI {
            correction += wrapped - delta;
        }
        out.push(pair[1] + correction);
    }
    out
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len() as f64;
    values.sum::<f64>() / n
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    let mu = mean(values.iter().copied());
    mean(values.iter().map(|v| (v - mu) * (v - mu))).sqrt()
}

/// Statistics of one probe run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbeSummary {
    pub n: usize,
    /// mean(|ratio|)
    pub abs_mean: f64,
    /// mean(||ratio| − 1|)
    pub abs_dev: f64,
    /// Standard deviation of the unwrapped phase.
    pub arg_std: f64,
}

impl ProbeSummary {
    /// `None` when there are no rows.
    pub fn from_rows(rows: &[ProbeRow]) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let phases: Vec<f64> = rows.iter().map(|row| row.arg_ratio).collect();
        Some(Self {
            n: rows.len(),
            abs_mean: mean(rows.iter().map(|row| row.abs_ratio)),
            abs_dev: mean(rows.iter().map(|row| (row.abs_ratio - 1.0).abs())),
            arg_std: std_dev(&unwrap_phase(&phases)),
        })
    }
}

/// One line of the summary table.
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryRow {
    pub file: String,
    pub n: usize,
    pub abs_mean: f64,
    pub abs_dev: f64,
    pub arg_std: f64,
    pub tag: String,
}

impl SummaryRow {
    pub fn new(file: impl Into<String>, summary: Option<ProbeSummary>, tag: impl Into<String>) -> Self {
        let summary = summary.unwrap_or(ProbeSummary {
            n: 0,
            abs_mean: f64::NAN,
            abs_dev: f64::NAN,
            arg_std: f64::NAN,
        });
        Self {
            file: file.into(),
            n: summary.n,
            abs_mean: summary.abs_mean,
            abs_dev: summary.abs_dev,
            arg_std: summary.arg_std,
            tag: tag.into(),
        }
    }
}

/// Summarises one probe table read from `path`.
pub fn summarize_table(path: &Path, tag: &str) -> Result<SummaryRow, TableError> {
    let rows: Vec<ProbeRow> = load_table(path)?;
    let row = SummaryRow::new(path.display().to_string(), ProbeSummary::from_rows(&rows), tag);
    debug!(target: "st_zeta::summary", file = %row.file, n = row.n, "summarised probe table");
    Ok(row)
}

/// Summarises every table in `paths`, in sorted path order.
pub fn batch_summarize(paths: &[PathBuf]) -> Result<Vec<SummaryRow>, TableError> {
    if paths.is_empty() {
        return Err(TableError::NoInputs);
    }
    let mut sorted = paths.to_vec();
    sorted.sort();
    sorted.iter().map(|path| summarize_table(path, "")).collect()
}
