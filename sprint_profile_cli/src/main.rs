use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use rayon::prelude::*;
use serde::Serialize;
use sprint_profile::{
    checkpoint_distances, parse_samples, process_text, trim_samples, BaselinePolicy,
    DecimalSeparator, ErrorKind, FieldSeparator, Params, Sample, Smoothing, SpeedColumn, Trial,
    TrialOutcome, TrialReport, TrialSummary, TrimWindow,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Sprint timing-gate profile CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute cleaned speed profiles and checkpoint tables for one or more exports
    Profile(ProfileArgs),
    /// Cut exports down to the sprint window and write the trimmed samples
    Trim(TrimArgs),
    /// Report rows, spans and calibration crossings without running the pipeline
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct ProfileArgs {
    /// Timing-gate exports to process
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Directory receiving per-trial tables, plots and the batch summary
    #[arg(short, long, default_value = "sprint_profiles", value_hint = ValueHint::DirPath)]
    out_dir: PathBuf,

    /// Disable speed chart generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Render charts as SVG instead of PNG
    #[arg(long, action = ArgAction::SetTrue)]
    svg: bool,

    /// Profile major stages with timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Parser, Debug)]
struct TrimArgs {
    /// Timing-gate exports to trim
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Directory receiving `<name>_trimmed.csv` files
    #[arg(short, long, default_value = "trimmed", value_hint = ValueHint::DirPath)]
    out_dir: PathBuf,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Timing-gate exports to inspect
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Output report path (`-` for stdout)
    #[arg(short, long, default_value = "sprint_diagnostics.txt", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug, Clone)]
struct PipelineArgs {
    /// JSON parameter file; individual flags override its values
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Calibration distance (m)
    #[arg(long)]
    calibration: Option<f64>,

    /// Sprint length (m)
    #[arg(long)]
    sprint_length: Option<f64>,

    /// Lead-in kept before the calibration crossing (s)
    #[arg(long)]
    lead_in: Option<f64>,

    /// Distance kept past the sprint length (m)
    #[arg(long)]
    trailing_margin: Option<f64>,

    /// Outlier tolerance around the heavy baseline (m/s)
    #[arg(long)]
    tolerance: Option<f64>,

    /// Heavy smoothing as PASSES,HALF_WINDOW
    #[arg(long, value_parser = parse_smoothing)]
    heavy: Option<Smoothing>,

    /// Light smoothing as PASSES,HALF_WINDOW
    #[arg(long, value_parser = parse_smoothing)]
    light: Option<Smoothing>,

    /// Checkpoint interval (m)
    #[arg(long)]
    interval: Option<f64>,

    /// Field separator of the input files
    #[arg(long, value_enum)]
    delimiter: Option<DelimiterOpt>,

    /// Decimal separator of the input files
    #[arg(long, value_enum)]
    decimal: Option<DecimalOpt>,

    /// Use the mean baseline ± tolerance for every sample
    #[arg(long, action = ArgAction::SetTrue)]
    global_mean_bounds: bool,

    /// Speed column re-integrated into distance and differentiated into acceleration
    #[arg(long, value_enum)]
    reconstruct_from: Option<SpeedOpt>,

    /// Speed column reported at checkpoints
    #[arg(long, value_enum)]
    checkpoint_speed: Option<SpeedOpt>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DelimiterOpt {
    Tab,
    Semicolon,
    Comma,
    Whitespace,
}

impl From<DelimiterOpt> for FieldSeparator {
    fn from(value: DelimiterOpt) -> Self {
        match value {
            DelimiterOpt::Tab => FieldSeparator::Tab,
            DelimiterOpt::Semicolon => FieldSeparator::Semicolon,
            DelimiterOpt::Comma => FieldSeparator::Comma,
            DelimiterOpt::Whitespace => FieldSeparator::Whitespace,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DecimalOpt {
    Point,
    Comma,
}

impl From<DecimalOpt> for DecimalSeparator {
    fn from(value: DecimalOpt) -> Self {
        match value {
            DecimalOpt::Point => DecimalSeparator::Point,
            DecimalOpt::Comma => DecimalSeparator::Comma,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SpeedOpt {
    Raw,
    Heavy,
    Light,
    Clamped,
}

impl From<SpeedOpt> for SpeedColumn {
    fn from(value: SpeedOpt) -> Self {
        match value {
            SpeedOpt::Raw => SpeedColumn::Raw,
            SpeedOpt::Heavy => SpeedColumn::Heavy,
            SpeedOpt::Light => SpeedColumn::Light,
            SpeedOpt::Clamped => SpeedColumn::Clamped,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Profile(args) => args.pipeline.verbose,
        Command::Trim(args) => args.pipeline.verbose,
        Command::Inspect(args) => args.pipeline.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Profile(args) => handle_profile(args),
        Command::Trim(args) => handle_trim(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn parse_smoothing(input: &str) -> Result<Smoothing, String> {
    let (passes, half_window) = input
        .split_once(',')
        .ok_or_else(|| format!("expected PASSES,HALF_WINDOW, got '{}'", input))?;
    let passes: usize = passes
        .trim()
        .parse()
        .map_err(|_| format!("invalid pass count '{}'", passes.trim()))?;
    let half_window: usize = half_window
        .trim()
        .parse()
        .map_err(|_| format!("invalid half window '{}'", half_window.trim()))?;
    Ok(Smoothing::new(passes, half_window))
}

fn build_params(args: &PipelineArgs) -> Result<Params> {
    let mut params = match args.config.as_ref() {
        Some(path) => load_params(path)?,
        None => Params::default(),
    };

    if let Some(v) = args.calibration {
        params.calibration_m = v;
    }
    if let Some(v) = args.sprint_length {
        params.sprint_length_m = v;
    }
    if let Some(v) = args.lead_in {
        params.lead_in_s = v;
    }
    if let Some(v) = args.trailing_margin {
        params.trailing_margin_m = v;
    }
    if let Some(v) = args.tolerance {
        params.tolerance_mps = v;
    }
    if let Some(v) = args.heavy {
        params.heavy = v;
    }
    if let Some(v) = args.light {
        params.light = v;
    }
    if let Some(v) = args.interval {
        params.checkpoint_interval_m = v;
    }
    if let Some(v) = args.delimiter {
        params.input.field_separator = v.into();
    }
    if let Some(v) = args.decimal {
        params.input.decimal_separator = v.into();
    }
    if args.global_mean_bounds {
        params.baseline_policy = BaselinePolicy::GlobalMean;
    }
    if let Some(v) = args.reconstruct_from {
        params.reconstruction_speed = v.into();
    }
    if let Some(v) = args.checkpoint_speed {
        params.checkpoint_speed = v.into();
    }

    params.validate()?;
    debug!(
        "Params: calibration {:.3} m, sprint {:.1} m, tolerance {:.2} m/s, heavy {:?}, light {:?}",
        params.calibration_m, params.sprint_length_m, params.tolerance_mps, params.heavy, params.light
    );
    Ok(params)
}

fn load_params(path: &Path) -> Result<Params> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read params {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not a valid params file", path.display()))
}

struct InputFile {
    name: String,
    path: PathBuf,
    text: String,
}

fn read_inputs(paths: &[PathBuf]) -> Result<Vec<InputFile>> {
    let names = trial_names(paths);
    paths
        .par_iter()
        .zip(names.into_par_iter())
        .map(|(path, name)| -> Result<InputFile> {
            let bytes =
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            Ok(InputFile {
                name,
                path: path.clone(),
                text: String::from_utf8_lossy(&bytes).into_owned(),
            })
        })
        .collect()
}

/// File stems, suffixed with a counter until no two inputs share a name.
fn trial_names(paths: &[PathBuf]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    paths
        .iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("trial")
                .to_string();
            let mut name = stem.clone();
            let mut count = 1usize;
            while used.contains(&name) {
                count += 1;
                name = format!("{}_{}", stem, count);
            }
            used.insert(name.clone());
            name
        })
        .collect()
}

fn handle_profile(args: ProfileArgs) -> Result<()> {
    let params = build_params(&args.pipeline)?;
    let fingerprint = params.fingerprint()?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let t_parse = Instant::now();
    let inputs = read_inputs(&args.inputs)?;
    if args.profile || args.pipeline.verbose {
        info!(
            "Read stage: {:.1} ms ({} files)",
            t_parse.elapsed().as_secs_f64() * 1000.0,
            inputs.len()
        );
    }

    // Trials share nothing, so each one runs on its own worker.
    let t_compute = Instant::now();
    let outcomes: Vec<TrialOutcome> = inputs
        .par_iter()
        .map(|input| TrialOutcome {
            name: input.name.clone(),
            result: process_text(&input.text, &params),
        })
        .collect();
    if args.profile || args.pipeline.verbose {
        info!(
            "Compute stage: {:.1} ms",
            t_compute.elapsed().as_secs_f64() * 1000.0
        );
    }

    let t_write = Instant::now();
    let mut entries = Vec::with_capacity(outcomes.len());
    for (input, outcome) in inputs.iter().zip(outcomes.iter()) {
        let mut entry = ManifestEntry {
            name: outcome.name.clone(),
            input: input.path.display().to_string(),
            status: "ok",
            error_kind: None,
            error: None,
            outputs: Vec::new(),
            window: None,
            summary: None,
            rows_read: None,
            rows_dropped: None,
        };
        match &outcome.result {
            Ok(report) => {
                entry.outputs = write_trial_outputs(&outcome.name, report, &args)?;
                entry.window = Some(report.window);
                entry.summary = Some(report.summary.clone());
                entry.rows_read = Some(report.load.rows_read);
                entry.rows_dropped = Some(report.load.rows_dropped);
                info!(
                    "{}: {} samples, sprint time {}",
                    outcome.name,
                    report.trial.len(),
                    report
                        .summary
                        .sprint_time_s
                        .map(|t| format!("{:.3} s", t))
                        .unwrap_or_else(|| "n/a".into())
                );
            }
            Err(err) => {
                warn!("Skipping {} ({}): {}", input.path.display(), err.kind().as_str(), err);
                entry.status = "failed";
                entry.error_kind = Some(err.kind());
                entry.error = Some(err.to_string());
            }
        }
        entries.push(entry);
    }

    let summary_path = args.out_dir.join("summary.csv");
    write_summary_csv(&outcomes, &params, &summary_path)?;
    info!("Wrote batch summary: {}", summary_path.display());

    let manifest = Manifest {
        generated_at: Utc::now().to_rfc3339(),
        tool_version: env!("CARGO_PKG_VERSION"),
        params: &params,
        params_fingerprint: &fingerprint,
        trials: entries,
    };
    let manifest_path = args.out_dir.join("manifest.json");
    let text = serde_json::to_string_pretty(&manifest)?;
    fs::write(&manifest_path, text)
        .with_context(|| format!("failed to write {}", manifest_path.display()))?;

    if args.profile || args.pipeline.verbose {
        info!(
            "Write stage: {:.1} ms",
            t_write.elapsed().as_secs_f64() * 1000.0
        );
    }

    let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
    info!("Processed {}/{} trials", succeeded, outcomes.len());
    if succeeded == 0 {
        return Err(anyhow!("no trial could be processed"));
    }
    Ok(())
}

fn write_trial_outputs(name: &str, report: &TrialReport, args: &ProfileArgs) -> Result<Vec<String>> {
    let mut outputs = Vec::new();

    let profile_path = args.out_dir.join(format!("{}_profile.csv", name));
    write_profile_csv(&report.trial, &profile_path)?;
    outputs.push(profile_path.display().to_string());

    let checkpoint_path = args.out_dir.join(format!("{}_checkpoints.csv", name));
    write_checkpoint_csv(report, &checkpoint_path)?;
    outputs.push(checkpoint_path.display().to_string());

    if !args.no_plot {
        let (kind, ext) = if args.svg {
            (ChartKind::Svg, "svg")
        } else {
            (ChartKind::Png, "png")
        };
        let chart_path = args.out_dir.join(format!("{}_speed.{}", name, ext));
        match render_chart_guard(&report.trial, name, &chart_path, kind) {
            Ok(()) => outputs.push(chart_path.display().to_string()),
            Err(err) => warn!("Skipping chart ({}): {}", chart_path.display(), err),
        }
    }
    Ok(outputs)
}

#[derive(Serialize)]
struct Manifest<'a> {
    generated_at: String,
    tool_version: &'static str,
    params: &'a Params,
    params_fingerprint: &'a str,
    trials: Vec<ManifestEntry>,
}

#[derive(Serialize)]
struct ManifestEntry {
    name: String,
    input: String,
    status: &'static str,
    error_kind: Option<ErrorKind>,
    error: Option<String>,
    outputs: Vec<String>,
    window: Option<TrimWindow>,
    summary: Option<TrialSummary>,
    rows_read: Option<usize>,
    rows_dropped: Option<usize>,
}

fn fmt_value(value: f64) -> String {
    if value.is_finite() {
        format!("{:.4}", value)
    } else {
        String::new()
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(fmt_value).unwrap_or_default()
}

fn create_csv(path: &Path) -> Result<csv::Writer<File>> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(csv::Writer::from_writer(file))
}

fn write_profile_csv(trial: &Trial, path: &Path) -> Result<()> {
    let mut writer = create_csv(path)?;
    writer.write_record([
        "time",
        "distance",
        "raw_speed",
        "smoothed_speed_heavy",
        "smoothed_speed_light",
        "lower_bound",
        "upper_bound",
        "clamped_speed",
        "distance_covered",
        "acceleration",
    ])?;
    for i in 0..trial.len() {
        let row = [
            trial.time_s[i],
            trial.distance_m[i],
            trial.raw_speed[i],
            trial.smoothed_speed_heavy[i],
            trial.smoothed_speed_light[i],
            trial.lower_bound[i],
            trial.upper_bound[i],
            trial.clamped_speed[i],
            trial.distance_covered[i],
            trial.acceleration[i],
        ];
        writer.write_record(row.iter().map(|v| fmt_value(*v)))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_checkpoint_csv(report: &TrialReport, path: &Path) -> Result<()> {
    let mut writer = create_csv(path)?;
    writer.write_record(["distance", "time", "speed", "reached"])?;
    for cp in &report.checkpoints {
        writer.write_record([
            fmt_value(cp.distance_m),
            fmt_opt(cp.time_s),
            fmt_opt(cp.speed_mps),
            cp.reached.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_summary_csv(outcomes: &[TrialOutcome], params: &Params, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_summary_rows(outcomes, params, &mut writer)
}

fn write_summary_rows<W: Write>(
    outcomes: &[TrialOutcome],
    params: &Params,
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    let marks = checkpoint_distances(params.sprint_length_m, params.checkpoint_interval_m)?;
    let mut header: Vec<String> = [
        "name",
        "status",
        "error_kind",
        "error",
        "calibration_time_s",
        "sprint_time_s",
        "mean_speed_mps",
        "peak_speed_mps",
        "peak_speed_at_m",
        "peak_acceleration_mps2",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(marks.iter().map(|d| format!("split_{}m", d)));
    writer.write_record(&header)?;

    for outcome in outcomes {
        let mut row = vec![outcome.name.clone()];
        match &outcome.result {
            Ok(report) => {
                let s = &report.summary;
                row.extend([
                    "ok".to_string(),
                    String::new(),
                    String::new(),
                    fmt_value(report.window.calibration_time_s),
                    fmt_opt(s.sprint_time_s),
                    fmt_opt(s.mean_speed_mps),
                    fmt_opt(s.peak_speed_mps),
                    fmt_opt(s.peak_speed_at_m),
                    fmt_opt(s.peak_acceleration_mps2),
                ]);
                // Splits are measured from the zero checkpoint; unreached marks stay empty.
                let start = report.checkpoints.first().and_then(|c| c.time_s);
                row.extend(report.checkpoints.iter().map(|cp| match (cp.time_s, start) {
                    (Some(t), Some(t0)) if cp.reached => fmt_value(t - t0),
                    _ => String::new(),
                }));
            }
            Err(err) => {
                row.extend([
                    "failed".to_string(),
                    err.kind().as_str().to_string(),
                    err.to_string(),
                ]);
                row.resize(header.len(), String::new());
            }
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn handle_trim(args: TrimArgs) -> Result<()> {
    let params = build_params(&args.pipeline)?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    let inputs = read_inputs(&args.inputs)?;

    let mut written = 0usize;
    for input in &inputs {
        let trimmed = parse_samples(&input.text, &params.input)
            .and_then(|loaded| trim_samples(&loaded.samples, &params));
        let trimmed = match trimmed {
            Ok(trimmed) => trimmed,
            Err(err) => {
                warn!("Skipping {} ({}): {}", input.path.display(), err.kind().as_str(), err);
                continue;
            }
        };
        let path = args.out_dir.join(format!("{}_trimmed.csv", input.name));
        let mut writer = create_csv(&path)?;
        write_trimmed_rows(&trimmed.samples, &mut writer)?;
        written += 1;
        info!(
            "Wrote trimmed data: {} ({} samples, calibration crossed at t={:.3} s)",
            path.display(),
            trimmed.samples.len(),
            trimmed.window.calibration_time_s
        );
    }

    if written == 0 {
        return Err(anyhow!("no input could be trimmed"));
    }
    Ok(())
}

fn write_trimmed_rows<W: Write>(samples: &[Sample], writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["time", "distance"])?;
    for sample in samples {
        writer.write_record([fmt_value(sample.time_s), fmt_value(sample.distance_m)])?;
    }
    writer.flush()?;
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let params = build_params(&args.pipeline)?;
    let inputs = read_inputs(&args.inputs)?;
    let mut report = String::new();

    for input in &inputs {
        report.push_str(&format!("FILE: {}\n", input.path.display()));
        let loaded = match parse_samples(&input.text, &params.input) {
            Ok(loaded) => loaded,
            Err(err) => {
                report.push_str(&format!("  error: {} ({})\n\n", err, err.kind().as_str()));
                continue;
            }
        };
        report.push_str(&format!(
            "  rows: {} (dropped {})\n",
            loaded.rows_read, loaded.rows_dropped
        ));
        report.push_str(&format!("  timespan_s: {:.3}\n", loaded.time_span_s()));
        report.push_str(&format!("  max_distance_m: {:.3}\n", loaded.max_distance_m()));
        match trim_samples(&loaded.samples, &params) {
            Ok(trimmed) => {
                let w = &trimmed.window;
                report.push_str(&format!(
                    "  calibration_crossing: t={:.3} s (sample {})\n",
                    w.calibration_time_s, w.calibration_index
                ));
                report.push_str(&format!(
                    "  window: t >= {:.3} s, distance <= {:.3} m, {} samples kept\n",
                    w.window_start_s,
                    w.window_end_distance_m,
                    trimmed.samples.len()
                ));
            }
            Err(err) => {
                report.push_str(&format!("  error: {} ({})\n", err, err.kind().as_str()));
            }
        }
        report.push('\n');
    }

    if args.output.as_os_str() == "-" {
        io::stdout().lock().write_all(report.as_bytes())?;
    } else {
        fs::write(&args.output, report)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("Diagnostic report written: {}", args.output.display());
    }
    Ok(())
}

enum ChartKind {
    Png,
    Svg,
}

fn render_chart_guard(
    trial: &Trial,
    title: &str,
    path: &Path,
    kind: ChartKind,
) -> Result<(), String> {
    let render = || -> Result<(), String> {
        match kind {
            ChartKind::Png => {
                let root = BitMapBackend::new(path, (1280, 720)).into_drawing_area();
                draw_speed_chart(root, trial, title)
            }
            ChartKind::Svg => {
                let root = SVGBackend::new(path, (1280, 720)).into_drawing_area();
                draw_speed_chart(root, trial, title)
            }
        }
        .map_err(|e| format!("plotting error: {}", e))
    };

    // Font lookups can panic on hosts without system fonts.
    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn draw_speed_chart<DB>(
    root: DrawingArea<DB, plotters::coord::Shift>,
    trial: &Trial,
    title: &str,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let t_min = trial.time_s.first().copied().unwrap_or(0.0);
    let t_max = trial
        .time_s
        .last()
        .copied()
        .unwrap_or(1.0)
        .max(t_min + 1e-3);
    // Raw spikes are pinned to the frame so the cleaned traces stay readable.
    let y_max = trial
        .upper_bound
        .iter()
        .chain(trial.clamped_speed.iter())
        .copied()
        .filter(|v| v.is_finite())
        .fold(1.0_f64, f64::max)
        * 1.15;
    let y_min = trial
        .lower_bound
        .iter()
        .chain(trial.clamped_speed.iter())
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::min);

    let mut chart = ChartBuilder::on(&root)
        .caption(
            title,
            FontDesc::new(FontFamily::SansSerif, 22.0, FontStyle::Normal),
        )
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(t_min..t_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Time (s)")
        .y_desc("Speed (m/s)")
        .x_label_formatter(&|v| format!("{:.1}", v))
        .y_label_formatter(&|v| format!("{:.1}", v))
        .label_style(FontDesc::new(
            FontFamily::SansSerif,
            16.0,
            FontStyle::Normal,
        ))
        .draw()?;

    let series = [
        ("Raw", &trial.raw_speed, RGBColor(190, 190, 190)),
        ("Lower bound", &trial.lower_bound, RGBColor(135, 206, 250)),
        ("Upper bound", &trial.upper_bound, RGBColor(135, 206, 250)),
        ("Heavy", &trial.smoothed_speed_heavy, RGBColor(30, 144, 255)),
        ("Light", &trial.smoothed_speed_light, RGBColor(255, 140, 0)),
        ("Clamped", &trial.clamped_speed, RGBColor(200, 0, 100)),
    ];
    for (label, values, color) in series {
        let points: Vec<(f64, f64)> = trial
            .time_s
            .iter()
            .copied()
            .zip(values.iter().copied())
            .filter(|(_, v)| v.is_finite())
            .map(|(t, v)| (t, v.clamp(y_min, y_max)))
            .collect();
        chart
            .draw_series(LineSeries::new(points, color))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.7))
        .border_style(&BLACK.mix(0.3))
        .label_font(FontDesc::new(
            FontFamily::SansSerif,
            16.0,
            FontStyle::Normal,
        ))
        .position(SeriesLabelPosition::LowerRight)
        .draw()?;

    root.present()?;
    Ok(())
}
