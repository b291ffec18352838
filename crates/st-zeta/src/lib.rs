// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

// crates/st-zeta/src/lib.rs
//! Adaptive zeta ζₐ: a Dirichlet-type series whose exponent is deformed by a
//! scale-dependent πₐ(n) = π·(1 + κ(n)), evaluated at explicit arbitrary
//! precision, together with a zero-candidate tracer, a functional-equation
//! probe and the statistics built on their tables.

pub mod fit;
pub mod gamma;
pub mod kernel;
pub mod outcome;
pub mod precision;
pub mod probe;
pub mod scan;
pub mod series;
pub mod spacing;
pub mod summary;
pub mod table;
pub mod telemetry;
pub mod tracer;

pub use fit::{fit_shift_plane, mean_shift, FitError, PlaneFit, ShiftSample};
pub use gamma::{GammaError, GammaFactor, GammaMode};
pub use kernel::{KernelError, KernelKind, KernelOverrides, KernelParams, KernelSpec};
pub use outcome::{Outcome, Side, Skip, SkipReason};
pub use precision::{Precision, PrecisionError};
pub use probe::{run_probe, Line, ProbeConfig, ProbeError, ProbeReport, ProbeRow};
pub use scan::{scan_plane, PlaneScan, ScanConfig, ScanError, ScanRow};
pub use series::{zeta_a, AdaptiveZeta, ExponentScale, SeriesConfig, SeriesError, SeriesValue};
pub use spacing::{ks_distance_to_gue, SpacingError, SpacingReport};
pub use summary::{batch_summarize, ProbeSummary, SummaryRow};
pub use table::{load_table, save_table, TableError, TableRow};
pub use telemetry::ZetaFeedback;
pub use tracer::{trace_zeros, TraceConfig, TraceError, TraceMethod, TraceRow, ZeroTrace};

use thiserror::Error;

/// Any failure of the library.
#[derive(Debug, Error)]
pub enum ZetaError {
    #[error(transparent)]
    Precision(#[from] PrecisionError),
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Gamma(#[from] GammaError),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Spacing(#[from] SpacingError),
}

pub type ZetaResult<T> = Result<T, ZetaError>;

/// Builds the kernel described by `spec` and prepares its evaluator.
pub fn zeta_from_spec(spec: &KernelSpec, series: SeriesConfig) -> ZetaResult<AdaptiveZeta> {
    let kernel = spec.build()?;
    Ok(AdaptiveZeta::new(&kernel, series)?)
}
