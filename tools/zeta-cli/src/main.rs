// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use serde_json::json;
use st_zeta::fit::load_shift_samples;
use st_zeta::probe::PiEffScan;
use st_zeta::summary::summarize_table;
use st_zeta::{
    batch_summarize, fit_shift_plane, ks_distance_to_gue, load_table, run_probe, save_table,
    scan_plane, trace_zeros, zeta_from_spec, ExponentScale, GammaMode, KernelKind,
    KernelOverrides, KernelSpec, Line, Precision, ProbeConfig, ProbeReport, ScanConfig,
    SeriesConfig, SummaryRow, TraceConfig, TraceMethod, TraceRow, ZetaFeedback,
};
use tracing::{error, info};
use zeta_config::defaults::{defaults, NumericDefaults};

mod manifest;

/// File name of the summary table written by `sweep` and `summarize`.
const SUMMARY_FILE: &str = "fe_summary.csv";

use manifest::{manifest_path, write_json};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Adaptive zeta explorer: zero traces, functional-equation probes and their statistics"
)]
struct Cli {
    /// Run identifier attached to telemetry events
    #[arg(long, global = true, default_value = "st-zeta")]
    run_id: String,

    /// Restrict telemetry to these metrics (comma separated; all when omitted)
    #[arg(long, global = true, value_delimiter = ',')]
    metrics: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Trace minima of |ζₐ(σ + it)| along an ordinate scan
    Trace(TraceArgs),

    /// Sample log|ζₐ| over a σ × t grid
    Scan(ScanArgs),

    /// Probe the functional equation along one line
    Probe(ProbeArgs),

    /// Run the classic/pi_eff probe grid and summarise it
    Sweep(SweepArgs),

    /// Summarise probe tables into one table
    Summarize(SummarizeArgs),

    /// Fit the mean σ shift of labelled traces as a plane in (α, μ)
    Fit(FitArgs),

    /// Compare the spacing of traced ordinates with the GUE surmise
    Spacing(SpacingArgs),
}

#[derive(Args, Clone, Debug)]
struct KernelArgs {
    /// Kernel variant: zeta_a, zeta_two or zeta_three
    #[arg(long, default_value = "zeta_a")]
    kernel: KernelKind,

    /// α of the first regime
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    alpha: f64,

    /// μ of the first regime
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    mu: f64,

    /// k0 of the first regime
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    k0: f64,

    /// Further coefficients as key=value pairs, e.g. "alpha2=0.0,n_star=2000"
    #[arg(long, default_value = "")]
    extra: String,
}

impl KernelArgs {
    fn spec(&self) -> Result<KernelSpec> {
        let overrides = KernelOverrides::parse(&self.extra).context("invalid --extra")?;
        let spec = KernelSpec::new(self.kernel, self.alpha, self.mu, self.k0)
            .with_overrides(overrides);
        spec.build().context("invalid kernel parameters")?;
        Ok(spec)
    }
}

#[derive(Args, Clone, Debug)]
struct SeriesArgs {
    /// Truncation bound N (default: ZETA_TRUNCATION or 20000)
    #[arg(long, alias = "nsum")]
    truncation: Option<u64>,

    /// Working precision in decimal digits (default: ZETA_PRECISION_DIGITS or 60)
    #[arg(long)]
    precision: Option<u32>,

    /// Add the closed-form tail estimate where it converges
    #[arg(long, action = ArgAction::SetTrue)]
    tail: bool,

    /// Exponent scaling: adaptive (n^{-s·πₐ}) or relative (n^{-s·πₐ/π})
    #[arg(long, default_value = "adaptive", value_parser = parse_exponent)]
    exponent: ExponentScale,
}

impl SeriesArgs {
    fn config(&self, defaults: &NumericDefaults) -> Result<SeriesConfig> {
        let digits = self.precision.unwrap_or(defaults.precision_digits);
        let precision = Precision::new(digits).context("invalid --precision")?;
        let config = SeriesConfig::new(self.truncation.unwrap_or(defaults.truncation), precision)
            .with_tail(self.tail)
            .with_exponent(self.exponent);
        config.validate().context("invalid --truncation")?;
        Ok(config)
    }
}

fn parse_exponent(raw: &str) -> std::result::Result<ExponentScale, String> {
    match raw {
        "adaptive" => Ok(ExponentScale::Adaptive),
        "relative" => Ok(ExponentScale::Relative),
        other => Err(format!("unknown exponent scaling `{other}` (expected adaptive or relative)")),
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MethodChoice {
    Grid,
    Bracketed,
}

#[derive(Args)]
struct TraceArgs {
    #[command(flatten)]
    kernel: KernelArgs,

    #[command(flatten)]
    series: SeriesArgs,

    /// Trace configuration as JSON; replaces the scan flags below
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
    t_start: f64,

    #[arg(long, default_value_t = 60.0, allow_negative_numbers = true)]
    t_stop: f64,

    #[arg(long, default_value_t = 0.25)]
    dt: f64,

    /// σ search: a fixed grid with parabolic refinement, or a bracketed minimiser
    #[arg(long, value_enum, default_value_t = MethodChoice::Grid)]
    method: MethodChoice,

    #[arg(long, default_value_t = 0.3, allow_negative_numbers = true)]
    sigma_min: f64,

    #[arg(long, default_value_t = 0.9, allow_negative_numbers = true)]
    sigma_max: f64,

    /// Number of σ grid samples
    #[arg(long, default_value_t = 121)]
    samples: usize,

    /// Initial σ of the bracketed minimiser
    #[arg(long, default_value_t = 0.5, allow_negative_numbers = true)]
    guess: f64,

    /// Abscissa tolerance of the bracketed minimiser
    #[arg(long, default_value_t = 1e-6)]
    tolerance: f64,

    #[arg(long, default_value_t = 100)]
    max_iterations: u32,

    /// Output table
    #[arg(long, default_value = "zeta_a_zeros.csv", value_hint = ValueHint::FilePath)]
    out: PathBuf,
}

impl TraceArgs {
    fn trace_config(&self) -> Result<TraceConfig> {
        if let Some(path) = &self.config {
            return read_config(path);
        }
        let method = match self.method {
            MethodChoice::Grid => TraceMethod::Grid {
                sigma_min: self.sigma_min,
                sigma_max: self.sigma_max,
                samples: self.samples,
            },
            MethodChoice::Bracketed => TraceMethod::Bracketed {
                lower: self.sigma_min,
                guess: self.guess,
                upper: self.sigma_max,
                tolerance: self.tolerance,
                max_iterations: self.max_iterations,
            },
        };
        Ok(TraceConfig {
            t_start: self.t_start,
            t_stop: self.t_stop,
            dt: self.dt,
            method,
        })
    }
}

#[derive(Args)]
struct ScanArgs {
    #[command(flatten)]
    kernel: KernelArgs,

    #[command(flatten)]
    series: SeriesArgs,

    /// Scan configuration as JSON; replaces the grid flags below
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 0.3, allow_negative_numbers = true)]
    sigma_min: f64,

    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    sigma_max: f64,

    /// Number of σ columns
    #[arg(long = "ns", default_value_t = 120)]
    sigma_samples: usize,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    t_min: f64,

    #[arg(long, default_value_t = 40.0, allow_negative_numbers = true)]
    t_max: f64,

    /// Number of t rows
    #[arg(long = "nt", default_value_t = 400)]
    t_samples: usize,

    /// Output table
    #[arg(long, default_value = "zeta_a_heat.csv", value_hint = ValueHint::FilePath)]
    out: PathBuf,
}

impl ScanArgs {
    fn scan_config(&self) -> Result<ScanConfig> {
        if let Some(path) = &self.config {
            return read_config(path);
        }
        Ok(ScanConfig {
            sigma_min: self.sigma_min,
            sigma_max: self.sigma_max,
            sigma_samples: self.sigma_samples,
            t_min: self.t_min,
            t_max: self.t_max,
            t_samples: self.t_samples,
        })
    }
}

#[derive(Args)]
struct ProbeArgs {
    #[command(flatten)]
    kernel: KernelArgs,

    #[command(flatten)]
    series: SeriesArgs,

    /// Probe configuration as JSON; replaces every other probe flag
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Sampled line: critical, offset_plus or offset_minus
    #[arg(long, default_value = "critical")]
    line: Line,

    #[arg(long, default_value_t = 0.5, allow_negative_numbers = true)]
    sigma: f64,

    /// Offset of the offset_plus/offset_minus lines
    #[arg(long, default_value_t = 0.01)]
    eps_sigma: f64,

    #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
    t_min: f64,

    #[arg(long, default_value_t = 60.0, allow_negative_numbers = true)]
    t_max: f64,

    /// Number of sampled ordinates
    #[arg(long = "nt", default_value_t = 200)]
    samples: usize,

    /// Γ-factor: classic, pi_eff or none
    #[arg(long, default_value = "classic")]
    gamma: GammaMode,

    /// Upper end of the effective-π scan
    #[arg(long = "pi-eff-n", default_value_t = 1000.0)]
    pi_eff_upper: f64,

    #[arg(long, default_value_t = 400)]
    pi_eff_samples: usize,

    /// Zero-avoidance threshold (default: ZETA_EPS_ZERO or 1e-10)
    #[arg(long)]
    eps_zero: Option<f64>,

    /// Output table
    #[arg(long, default_value = "fe_probe.csv", value_hint = ValueHint::FilePath)]
    out: PathBuf,
}

impl ProbeArgs {
    fn probe_config(&self, defaults: &NumericDefaults) -> Result<ProbeConfig> {
        if let Some(path) = &self.config {
            return read_config(path);
        }
        Ok(ProbeConfig {
            kernel: self.kernel.spec()?,
            series: self.series.config(defaults)?,
            line: self.line,
            sigma: self.sigma,
            eps_sigma: self.eps_sigma,
            t_min: self.t_min,
            t_max: self.t_max,
            samples: self.samples,
            gamma: self.gamma,
            pi_eff: PiEffScan {
                upper: self.pi_eff_upper,
                samples: self.pi_eff_samples,
            },
            eps_zero: self.eps_zero.unwrap_or(defaults.eps_zero),
        })
    }
}

#[derive(Args)]
struct SweepArgs {
    #[command(flatten)]
    kernel: KernelArgs,

    #[command(flatten)]
    series: SeriesArgs,

    #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
    t_min: f64,

    #[arg(long, default_value_t = 60.0, allow_negative_numbers = true)]
    t_max: f64,

    #[arg(long = "nt", default_value_t = 200)]
    samples: usize,

    #[arg(long)]
    eps_zero: Option<f64>,

    /// Directory receiving one table per configuration plus the summary
    #[arg(long, value_hint = ValueHint::DirPath)]
    out_dir: PathBuf,
}

#[derive(Args)]
struct SummarizeArgs {
    /// Probe tables, or directories whose .csv files are all probe tables
    #[arg(required = true, value_hint = ValueHint::AnyPath)]
    inputs: Vec<PathBuf>,

    /// Free-text tag stored in every summary row
    #[arg(long, default_value = "")]
    tag: String,

    #[arg(long, default_value = "fe_summary.csv", value_hint = ValueHint::FilePath)]
    out: PathBuf,
}

#[derive(Args)]
struct FitArgs {
    /// Zero-trace tables named like zeros_a<α>_m<μ>.csv, or directories of them
    #[arg(required = true, value_hint = ValueHint::AnyPath)]
    inputs: Vec<PathBuf>,

    /// Optional JSON report of the samples and the fitted plane
    #[arg(long, value_hint = ValueHint::FilePath)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct SpacingArgs {
    /// Zero-trace table
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Optional JSON report with the unfolded spacings
    #[arg(long, value_hint = ValueHint::FilePath)]
    out: Option<PathBuf>,
}

fn main() {
    let code = match try_main() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    };
    zeta_config::tracing::flush_chrome_trace();
    std::process::exit(code);
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    match zeta_config::init_tracing() {
        Ok(()) | Err(zeta_config::InitError::AlreadyInitialised) => {}
        Err(err) => eprintln!("warning: {err}"),
    }
    let defaults = defaults().context("invalid environment defaults")?;
    match &cli.command {
        Command::Trace(args) => run_trace(&cli, args, defaults),
        Command::Scan(args) => run_scan(args, defaults),
        Command::Probe(args) => run_probe_cli(&cli, args, defaults),
        Command::Sweep(args) => run_sweep(&cli, args, defaults),
        Command::Summarize(args) => run_summarize(args),
        Command::Fit(args) => run_fit(&cli, args),
        Command::Spacing(args) => run_spacing(&cli, args),
    }
}

fn feedback(cli: &Cli, export: &Path) -> ZetaFeedback {
    ZetaFeedback::new(
        cli.run_id.clone(),
        export.display().to_string(),
        cli.metrics.clone(),
    )
}

fn run_trace(cli: &Cli, args: &TraceArgs, defaults: &NumericDefaults) -> Result<()> {
    let spec = args.kernel.spec()?;
    let series = args.series.config(defaults)?;
    let config = args.trace_config()?;
    config.validate().context("invalid trace configuration")?;

    let zeta = zeta_from_spec(&spec, series)?;
    let trace = trace_zeros(&zeta, &config)?;
    save_table(&args.out, &trace.rows)?;
    write_json(
        &manifest_path(&args.out),
        &json!({
            "command": "trace",
            "version": env!("CARGO_PKG_VERSION"),
            "table": args.out.display().to_string(),
            "kernel": zeta.kernel(),
            "series": zeta.config(),
            "trace": config,
            "rows": trace.rows.len(),
            "skipped": trace.skipped,
        }),
    )?;
    feedback(cli, &args.out).emit_trace(&trace);

    if trace.rows.is_empty() {
        println!("no valid points ({} ordinates skipped)", trace.skipped.len());
    } else {
        println!(
            "saved {} ({} rows, {} skipped)",
            args.out.display(),
            trace.rows.len(),
            trace.skipped.len()
        );
    }
    Ok(())
}

fn run_scan(args: &ScanArgs, defaults: &NumericDefaults) -> Result<()> {
    let spec = args.kernel.spec()?;
    let series = args.series.config(defaults)?;
    let config = args.scan_config()?;
    config.validate().context("invalid scan configuration")?;

    let zeta = zeta_from_spec(&spec, series)?;
    let scan = scan_plane(&zeta, &config)?;
    save_table(&args.out, &scan.rows)?;
    write_json(
        &manifest_path(&args.out),
        &json!({
            "command": "scan",
            "version": env!("CARGO_PKG_VERSION"),
            "table": args.out.display().to_string(),
            "kernel": zeta.kernel(),
            "series": zeta.config(),
            "scan": config,
            "rows": scan.rows.len(),
            "skipped": scan.skipped,
        }),
    )?;
    println!(
        "saved {} ({} cells, {} skipped)",
        args.out.display(),
        scan.rows.len(),
        scan.skipped.len()
    );
    Ok(())
}

fn run_probe_cli(cli: &Cli, args: &ProbeArgs, defaults: &NumericDefaults) -> Result<()> {
    let config = args.probe_config(defaults)?;
    let report = run_probe(&config)?;
    write_probe(&args.out, &config, &report)?;
    feedback(cli, &args.out).emit_probe_summary(report.summary.as_ref(), report.skipped.len());
    print_probe(&args.out, &report);
    Ok(())
}

fn write_probe(out: &Path, config: &ProbeConfig, report: &ProbeReport) -> Result<()> {
    let kernel = config.kernel.build()?;
    save_table(out, &report.rows)?;
    write_json(
        &manifest_path(out),
        &json!({
            "command": "probe",
            "version": env!("CARGO_PKG_VERSION"),
            "table": out.display().to_string(),
            "config": config,
            "kernel": kernel,
            "pi_eff": report.pi_eff,
            "summary": report.summary,
            "skipped": report.skipped,
        }),
    )
}

fn print_probe(out: &Path, report: &ProbeReport) {
    match &report.summary {
        Some(summary) => println!(
            "Points kept: {}  |  mean(|ratio|)={:.4}  |  mean(| |ratio|-1 |)={:.4e}  |  std(arg)={:.4}  ->  {}",
            summary.n,
            summary.abs_mean,
            summary.abs_dev,
            summary.arg_std,
            out.display()
        ),
        None => println!(
            "no valid points (all {} skipped near zeros)  ->  {}",
            report.skipped.len(),
            out.display()
        ),
    }
}

fn run_sweep(cli: &Cli, args: &SweepArgs, defaults: &NumericDefaults) -> Result<()> {
    let spec = args.kernel.spec()?;
    let series = args.series.config(defaults)?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("cannot create {}", args.out_dir.display()))?;

    let grid = [
        (GammaMode::Classic, Line::Critical),
        (GammaMode::Classic, Line::OffsetPlus),
        (GammaMode::Classic, Line::OffsetMinus),
        (GammaMode::PiEff, Line::Critical),
    ];
    let mut entries = Vec::new();
    let mut summaries: Vec<SummaryRow> = Vec::new();
    for (gamma, line) in grid {
        let name = format!("fe_{}_{}_{}", spec.kind, gamma, line);
        let out = args.out_dir.join(format!("{name}.csv"));
        let config = ProbeConfig {
            kernel: spec.clone(),
            series,
            line,
            gamma,
            t_min: args.t_min,
            t_max: args.t_max,
            samples: args.samples,
            eps_zero: args.eps_zero.unwrap_or(defaults.eps_zero),
            ..ProbeConfig::default()
        };
        let outcome = run_probe(&config)
            .map_err(anyhow::Error::from)
            .and_then(|report| write_probe(&out, &config, &report).map(|()| report));
        match outcome {
            Ok(report) => {
                info!(target: "st_zeta_cli::sweep", config = %name, "configuration finished");
                print_probe(&out, &report);
                feedback(cli, &out)
                    .emit_probe_summary(report.summary.as_ref(), report.skipped.len());
                summaries.push(summarize_table(&out, &format!("{gamma}/{line}"))?);
                entries.push(json!({ "name": name, "table": out.display().to_string(), "status": "ok" }));
            }
            Err(err) => {
                error!(target: "st_zeta_cli::sweep", config = %name, error = %format!("{err:#}"), "configuration failed");
                entries.push(json!({ "name": name, "status": "failed", "error": format!("{err:#}") }));
            }
        }
    }

    let summary_path = args.out_dir.join(SUMMARY_FILE);
    save_table(&summary_path, &summaries)?;
    write_json(
        &args.out_dir.join("sweep.json"),
        &json!({
            "command": "sweep",
            "version": env!("CARGO_PKG_VERSION"),
            "kernel": spec,
            "series": series,
            "configurations": entries,
            "summary": summary_path.display().to_string(),
        }),
    )?;
    println!("Summary -> {}", summary_path.display());
    if summaries.is_empty() {
        bail!("every sweep configuration failed; see {}", args.out_dir.join("sweep.json").display());
    }
    Ok(())
}

fn run_summarize(args: &SummarizeArgs) -> Result<()> {
    let inputs = expand_inputs(&args.inputs, &[args.out.as_path()])?;
    let mut rows = batch_summarize(&inputs)?;
    for row in &mut rows {
        row.tag.clone_from(&args.tag);
    }
    save_table(&args.out, &rows)?;
    for row in &rows {
        println!(
            "{}: n={} abs_mean={:.4} abs_dev={:.4e} arg_std={:.4}",
            row.file, row.n, row.abs_mean, row.abs_dev, row.arg_std
        );
    }
    println!("Summary -> {}", args.out.display());
    Ok(())
}

fn run_fit(cli: &Cli, args: &FitArgs) -> Result<()> {
    let inputs = expand_inputs(&args.inputs, &[])?;
    let samples = load_shift_samples(&inputs)?;
    if samples.is_empty() {
        bail!("no labelled zero-trace tables among the inputs");
    }
    let fit = fit_shift_plane(&samples)?;
    println!(
        "Fit: f ≈ {:.6}·alpha + {:.6}·mu + {:.6}  (rank {}, rms {:.3e})",
        fit.k_alpha, fit.k_mu, fit.intercept, fit.rank, fit.residual_rms
    );
    if let Some(out) = &args.out {
        write_json(out, &json!({ "samples": samples, "fit": fit }))?;
        feedback(cli, out).emit_plane_fit(&fit);
    }
    Ok(())
}

fn run_spacing(cli: &Cli, args: &SpacingArgs) -> Result<()> {
    let rows: Vec<TraceRow> = load_table(&args.input)?;
    let ordinates: Vec<f64> = rows.iter().map(|row| row.t).collect();
    let report = ks_distance_to_gue(&ordinates)
        .with_context(|| format!("spacing test on {}", args.input.display()))?;
    println!("KS vs GUE: D={:.4} over {} spacings", report.ks, report.spacings.len());
    feedback(cli, &args.input).emit_spacing(&report);
    if let Some(out) = &args.out {
        write_json(out, &report)?;
    }
    Ok(())
}

/// Files as given; directories contribute their `.csv` files in sorted order,
/// leaving out summary tables and anything in `exclude`.
fn expand_inputs(paths: &[PathBuf], exclude: &[&Path]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(path)
                .with_context(|| format!("cannot list {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
                .filter(|p| p.file_name().map_or(true, |name| name != SUMMARY_FILE))
                .filter(|p| !exclude.iter().any(|skip| same_file(p, skip)))
                .collect();
            found.sort();
            if found.is_empty() {
                bail!("{} contains no .csv tables", path.display());
            }
            out.extend(found);
        } else {
            out.push(path.clone());
        }
    }
    Ok(out)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn read_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("invalid configuration in {}", path.display()))
}
