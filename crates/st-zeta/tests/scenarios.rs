// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use approx::assert_abs_diff_eq;
use num_complex::Complex64;
use proptest::prelude::*;
use st_zeta::kernel::{Blend, Regime};
use st_zeta::probe::PiEffScan;
use st_zeta::{
    load_table, run_probe, save_table, trace_zeros, AdaptiveZeta, ExponentScale, GammaMode,
    KernelKind, KernelOverrides, KernelParams, KernelSpec, Line, Precision, ProbeConfig, ProbeRow,
    SeriesConfig, TraceConfig, TraceMethod, TraceRow,
};
use tempfile::tempdir;

fn series(truncation: u64, digits: u32) -> SeriesConfig {
    SeriesConfig::new(truncation, Precision::new(digits).unwrap())
}

#[test]
fn truncated_basel_sum() {
    let undeformed = KernelParams::default();
    let s = Complex64::new(2.0, 0.0);
    let bare = series(500, 40).with_exponent(ExponentScale::Relative);
    let value = AdaptiveZeta::new(&undeformed, bare).unwrap().evaluate(s).unwrap();
    let basel = std::f64::consts::PI.powi(2) / 6.0;
    let z = value.to_complex64();
    assert!(!value.tail_applied);
    assert!(z.re < basel && basel - z.re < 1.0 / 500.0);
    assert_abs_diff_eq!(z.im, 0.0, epsilon = 1e-30);

    let with_tail = AdaptiveZeta::new(&undeformed, bare.with_tail(true))
        .unwrap()
        .evaluate(s)
        .unwrap();
    assert!(with_tail.tail_applied);
    assert_abs_diff_eq!(with_tail.to_complex64().re, basel, epsilon = 1e-5);
}

#[test]
fn undeformed_series_settles_as_truncation_grows() {
    let s = Complex64::new(1.2, 0.0);
    for exponent in [ExponentScale::Relative, ExponentScale::Adaptive] {
        let values: Vec<Complex64> = [100, 200, 400, 800]
            .into_iter()
            .map(|n| {
                let config = series(n, 30).with_exponent(exponent);
                let value = AdaptiveZeta::new(&KernelParams::default(), config)
                    .unwrap()
                    .evaluate(s)
                    .unwrap();
                assert!(value.is_finite());
                value.to_complex64()
            })
            .collect();
        let gaps: Vec<f64> = values.windows(2).map(|w| (w[1] - w[0]).norm()).collect();
        assert!(gaps.windows(2).all(|g| g[1] < g[0]), "{exponent:?}: {gaps:?}");
    }
}

#[test]
fn blended_kernels_are_continuous_across_their_centres() {
    let three = KernelParams::ThreeRegime {
        first: Regime::new(0.02, 0.01, 0.0),
        second: Regime::new(0.02, 0.0, 0.01),
        third: Regime::new(0.0, 0.05, 0.0),
        lower: Blend::new(2000.0, 0.6),
        upper: Blend::new(8000.0, 0.6),
    };
    for centre in [2000.0f64, 8000.0] {
        let mut previous = three.kappa(centre * 0.9).unwrap();
        for k in 1..=400 {
            let x = centre * (0.9 + 0.2 * f64::from(k) / 400.0);
            let kappa = three.kappa(x).unwrap();
            assert!((kappa - previous).abs() < 1e-3, "jump at x = {x}");
            previous = kappa;
        }
    }
}

proptest! {
    #[test]
    fn adaptive_pi_is_monotone_in_scale(
        alpha in 0.0f64..1.0,
        mu in 0.0f64..1.0,
        k0 in -0.5f64..0.5,
        x1 in 1.0f64..1e6,
        ratio in 1.0f64..1e3,
    ) {
        let kernel = KernelParams::single(alpha, mu, k0);
        let p1 = kernel.pi_a(x1).unwrap();
        let p2 = kernel.pi_a(x1 * ratio).unwrap();
        prop_assert!(p1 <= p2 + 1e-12);
    }
}

#[test]
fn identity_gamma_probe_is_stable() {
    let config = ProbeConfig {
        kernel: KernelSpec::default(),
        series: series(400, 30),
        line: Line::Critical,
        t_min: 10.0,
        t_max: 11.0,
        samples: 5,
        gamma: GammaMode::Identity,
        ..ProbeConfig::default()
    };
    let first = run_probe(&config).unwrap();
    let second = run_probe(&config).unwrap();
    assert_eq!(first, second);
    let summary = first.summary.expect("points kept");
    assert_eq!(summary.n + first.skipped.len(), 5);
    // ζₐ(1 − s) is the conjugate of ζₐ(s) on σ = ½, so only the phase moves.
    assert!(summary.abs_dev < 1e-9);
    assert!(summary.arg_std > 1e-3);
}

#[test]
fn pi_eff_probe_reports_its_effective_pi() {
    let config = ProbeConfig {
        kernel: KernelSpec::new(KernelKind::TwoRegime, 0.02, 0.01, 0.0)
            .with_overrides(KernelOverrides::parse("alpha2=0.0,mu2=0.02,n_star=2000,w_log=0.6").unwrap()),
        series: series(150, 30),
        samples: 3,
        t_min: 20.0,
        t_max: 21.0,
        gamma: GammaMode::PiEff,
        pi_eff: PiEffScan {
            upper: 100.0,
            samples: 50,
        },
        ..ProbeConfig::default()
    };
    let report = run_probe(&config).unwrap();
    let pi_eff = report.pi_eff.expect("pi_eff computed");
    assert!(pi_eff > std::f64::consts::PI);
    assert_eq!(report.rows.len() + report.skipped.len(), 3);
}

#[test]
fn single_ordinate_trace_has_at_most_one_row() {
    let zeta = AdaptiveZeta::new(&KernelParams::single(0.02, 0.01, 0.0), series(200, 30)).unwrap();
    let config = TraceConfig {
        t_start: 14.0,
        t_stop: 14.0,
        dt: 0.25,
        method: TraceMethod::Grid {
            sigma_min: 0.3,
            sigma_max: 0.9,
            samples: 7,
        },
    };
    let trace = trace_zeros(&zeta, &config).unwrap();
    assert!(trace.rows.len() <= 1);
    assert_eq!(trace.rows.len() + trace.skipped.len(), 1);
    if let Some(row) = trace.rows.first() {
        assert_eq!(row.t, 14.0);
        assert!((0.3..=0.9).contains(&row.sigma));
    }
}

#[test]
fn written_tables_read_back_identically() {
    let zeta = AdaptiveZeta::new(&KernelParams::default(), series(100, 30)).unwrap();
    let config = TraceConfig {
        t_start: 10.0,
        t_stop: 10.5,
        dt: 0.25,
        method: TraceMethod::Grid {
            sigma_min: 0.4,
            sigma_max: 0.8,
            samples: 5,
        },
    };
    let trace = trace_zeros(&zeta, &config).unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("zeros.csv");
    save_table(&path, &trace.rows).unwrap();
    let back: Vec<TraceRow> = load_table(&path).unwrap();
    assert_eq!(back, trace.rows);

    let probe = run_probe(&ProbeConfig {
        series: series(100, 30),
        samples: 4,
        t_min: 12.0,
        t_max: 13.0,
        ..ProbeConfig::default()
    })
    .unwrap();
    let path = dir.path().join("probe.csv");
    save_table(&path, &probe.rows).unwrap();
    let back: Vec<ProbeRow> = load_table(&path).unwrap();
    assert_eq!(back, probe.rows);
}
