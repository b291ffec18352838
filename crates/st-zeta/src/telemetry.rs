// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Telemetry helpers for emitting run metrics as structured events.

use tracing::event;
use tracing::Level;

use crate::fit::PlaneFit;
use crate::spacing::SpacingReport;
use crate::summary::ProbeSummary;
use crate::tracer::ZeroTrace;

/// Emits the metrics of one run under the `st_zeta::telemetry` target.
#[derive(Clone, Debug)]
pub struct ZetaFeedback {
    run_id: String,
    export_path: String,
    metrics: Vec<String>,
}

impl ZetaFeedback {
    /// An empty `metrics` list lets every metric through.
    pub fn new(
        run_id: impl Into<String>,
        export_path: impl Into<String>,
        metrics: Vec<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            export_path: export_path.into(),
            metrics,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn export_path(&self) -> &str {
        &self.export_path
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn wants(&self, metric_name: &str) -> bool {
        self.metrics.is_empty() || self.metrics.iter().any(|m| m == metric_name)
    }

    pub fn emit_probe_summary(&self, summary: Option<&ProbeSummary>, skipped: usize) {
        self.emit_count("probe_skipped", skipped);
        match summary {
            Some(summary) => {
                self.emit_count("probe_kept", summary.n);
                self.emit_numeric("abs_mean", summary.abs_mean);
                self.emit_numeric("abs_dev", summary.abs_dev);
                self.emit_numeric("arg_std", summary.arg_std);
            }
            None => self.emit_count("probe_kept", 0),
        }
    }

    pub fn emit_trace(&self, trace: &ZeroTrace) {
        self.emit_count("trace_rows", trace.rows.len());
        self.emit_count("trace_skipped", trace.skipped.len());
        if let Some(shift) = crate::fit::mean_shift(&trace.rows) {
            self.emit_numeric("mean_shift", shift);
        }
    }

    pub fn emit_plane_fit(&self, fit: &PlaneFit) {
        self.emit_numeric("k_alpha", fit.k_alpha);
        self.emit_numeric("k_mu", fit.k_mu);
        self.emit_numeric("intercept", fit.intercept);
    }

    pub fn emit_spacing(&self, report: &SpacingReport) {
        self.emit_numeric("ks_gue", report.ks);
    }

    pub fn emit_count(&self, metric_name: &str, count: usize) {
        self.emit_numeric(metric_name, count as f64);
    }

    pub fn emit_numeric(&self, metric_name: &str, value: f64) {
        if !self.wants(metric_name) {
            return;
        }
        event!(
            target: "st_zeta::telemetry",
            Level::INFO,
            run = %self.run_id,
            export = %self.export_path,
            metric = %metric_name,
            value
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_filter() {
        let all = ZetaFeedback::new("session", "runs/1", Vec::new());
        assert!(all.wants("abs_dev"));
        let some = ZetaFeedback::new("session", "runs/1", vec!["abs_dev".into()]);
        assert_eq!(some.run_id(), "session");
        assert_eq!(some.export_path(), "runs/1");
        assert!(some.wants("abs_dev"));
        assert!(!some.wants("arg_std"));
        some.emit_probe_summary(None, 3);
    }
}
