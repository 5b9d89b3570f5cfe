//! Core sprint timing-gate profile computation library implemented in Rust.
//!
//! A trial flows through a fixed sequence of pure stages: load, trim, differentiate,
//! smooth, clamp, re-integrate, differentiate again and resample at checkpoints. Every
//! stage returns fresh columns, so a [`Trial`] can always be re-derived from its samples
//! and [`Params`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod checkpoints;
pub mod load;
pub mod signal;
pub mod trim;

pub use checkpoints::{checkpoint_distances, resample_checkpoints, Checkpoint, MAX_CHECKPOINTS};
pub use load::{parse_samples, DecimalSeparator, FieldSeparator, InputFormat, LoadedSamples};
pub use signal::{
    acceleration, box_smooth, clamp_to_band, raw_speed, reintegrate, tolerance_band,
    ToleranceBand,
};
pub use trim::{locate_calibration, trim_samples, TrimWindow, TrimmedTrial};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SprintError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error(
        "calibration distance {calibration_m} m never reached (max distance {max_distance_m:.3} m)"
    )]
    CalibrationNotReached {
        calibration_m: f64,
        max_distance_m: f64,
    },
    #[error("trimmed window holds {samples} sample(s); at least 2 are required")]
    DegenerateWindow { samples: usize },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Stable, machine-readable classification of a [`SprintError`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedInput,
    CalibrationNotReached,
    DegenerateWindow,
    InvalidParameter,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedInput => "malformed_input",
            ErrorKind::CalibrationNotReached => "calibration_not_reached",
            ErrorKind::DegenerateWindow => "degenerate_window",
            ErrorKind::InvalidParameter => "invalid_parameter",
        }
    }
}

impl SprintError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SprintError::MalformedInput(_) => ErrorKind::MalformedInput,
            SprintError::CalibrationNotReached { .. } => ErrorKind::CalibrationNotReached,
            SprintError::DegenerateWindow { .. } => ErrorKind::DegenerateWindow,
            SprintError::InvalidParameter(_) => ErrorKind::InvalidParameter,
        }
    }
}

/// One timing-gate reading: seconds since the sensor started, cumulative metres covered.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub time_s: f64,
    pub distance_m: f64,
}

impl Sample {
    pub fn new(time_s: f64, distance_m: f64) -> Self {
        Self { time_s, distance_m }
    }
}

/// Strength of the repeated centered box filter: `passes` iterations over a window of
/// `2 * half_window + 1` samples.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Smoothing {
    pub passes: usize,
    pub half_window: usize,
}

impl Smoothing {
    pub const HEAVY: Smoothing = Smoothing {
        passes: 9,
        half_window: 9,
    };
    pub const LIGHT: Smoothing = Smoothing {
        passes: 3,
        half_window: 3,
    };

    pub fn new(passes: usize, half_window: usize) -> Self {
        Self {
            passes,
            half_window,
        }
    }

    pub fn window_len(&self) -> usize {
        self.half_window.saturating_mul(2).saturating_add(1)
    }
}

/// How the tolerance band around the heavy baseline is built.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BaselinePolicy {
    /// `baseline[i] ± tolerance` at every index.
    PerSample,
    /// Mean of the whole baseline ± tolerance, identical for every index.
    GlobalMean,
}

impl Default for BaselinePolicy {
    fn default() -> Self {
        BaselinePolicy::PerSample
    }
}

/// Selects one of the speed columns of a [`Trial`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpeedColumn {
    Raw,
    Heavy,
    Light,
    Clamped,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Params {
    pub calibration_m: f64,
    pub sprint_length_m: f64,
    pub lead_in_s: f64,
    pub trailing_margin_m: f64,
    pub tolerance_mps: f64,
    pub baseline_policy: BaselinePolicy,
    pub heavy: Smoothing,
    pub light: Smoothing,
    /// Column re-integrated into `distance_covered` and differentiated into acceleration.
    pub reconstruction_speed: SpeedColumn,
    /// Column reported at each checkpoint.
    pub checkpoint_speed: SpeedColumn,
    pub checkpoint_interval_m: f64,
    pub input: InputFormat,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            calibration_m: 3.105,
            sprint_length_m: 30.0,
            lead_in_s: 1.0,
            trailing_margin_m: 2.0,
            tolerance_mps: 1.0,
            baseline_policy: BaselinePolicy::PerSample,
            heavy: Smoothing::HEAVY,
            light: Smoothing::LIGHT,
            reconstruction_speed: SpeedColumn::Light,
            checkpoint_speed: SpeedColumn::Clamped,
            checkpoint_interval_m: 5.0,
            input: InputFormat::default(),
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), SprintError> {
        require(
            self.calibration_m.is_finite() && self.calibration_m >= 0.0,
            "calibration distance must be a finite, non-negative number of metres",
        )?;
        require(
            self.sprint_length_m.is_finite() && self.sprint_length_m > 0.0,
            "sprint length must be a finite, positive number of metres",
        )?;
        require(
            self.lead_in_s.is_finite() && self.lead_in_s >= 0.0,
            "lead-in must be a finite, non-negative number of seconds",
        )?;
        require(
            self.trailing_margin_m.is_finite() && self.trailing_margin_m >= 0.0,
            "trailing margin must be a finite, non-negative number of metres",
        )?;
        require(
            self.tolerance_mps.is_finite() && self.tolerance_mps >= 0.0,
            "tolerance must be a finite, non-negative speed",
        )?;
        require(
            self.checkpoint_interval_m.is_finite() && self.checkpoint_interval_m > 0.0,
            "checkpoint interval must be a finite, positive number of metres",
        )?;
        require(
            self.sprint_length_m / self.checkpoint_interval_m <= MAX_CHECKPOINTS as f64,
            "checkpoint interval is too small for the sprint length",
        )?;
        self.input.validate()
    }

    /// Distance beyond which samples are cut from the trial window.
    pub fn window_end_distance_m(&self) -> f64 {
        self.calibration_m + self.sprint_length_m + self.trailing_margin_m
    }

    /// SHA-256 of the canonical JSON form, stamped into every report.
    pub fn fingerprint(&self) -> Result<String, SprintError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| SprintError::InvalidParameter(e.to_string()))?;
        Ok(sha256_hex(&bytes))
    }
}

fn require(condition: bool, message: &str) -> Result<(), SprintError> {
    if condition {
        Ok(())
    } else {
        Err(SprintError::InvalidParameter(message.to_string()))
    }
}

/// The trimmed samples of one trial and every column derived from them.
///
/// All columns share the length of `time_s`. `NaN` marks a missing value confined to its
/// own sample (for example a zero time delta).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trial {
    pub time_s: Vec<f64>,
    pub distance_m: Vec<f64>,
    pub raw_speed: Vec<f64>,
    pub smoothed_speed_heavy: Vec<f64>,
    pub smoothed_speed_light: Vec<f64>,
    pub lower_bound: Vec<f64>,
    pub upper_bound: Vec<f64>,
    pub clamped_speed: Vec<f64>,
    pub distance_covered: Vec<f64>,
    pub acceleration: Vec<f64>,
}

impl Trial {
    pub fn len(&self) -> usize {
        self.time_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_s.is_empty()
    }

    pub fn speed(&self, column: SpeedColumn) -> &[f64] {
        match column {
            SpeedColumn::Raw => &self.raw_speed,
            SpeedColumn::Heavy => &self.smoothed_speed_heavy,
            SpeedColumn::Light => &self.smoothed_speed_light,
            SpeedColumn::Clamped => &self.clamped_speed,
        }
    }

    /// Distance from the sprint's nominal zero point (raw distance minus calibration).
    pub fn reference_distance(&self, calibration_m: f64) -> Vec<f64> {
        self.distance_m.iter().map(|d| d - calibration_m).collect()
    }
}

/// Headline numbers for comparing trials.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TrialSummary {
    /// Final checkpoint time minus the zero checkpoint time.
    pub sprint_time_s: Option<f64>,
    pub mean_speed_mps: Option<f64>,
    pub peak_speed_mps: Option<f64>,
    /// Reference distance at which the peak speed occurs.
    pub peak_speed_at_m: Option<f64>,
    pub peak_acceleration_mps2: Option<f64>,
}

/// Diagnostics from ingestion, carried through to the report.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LoadStats {
    pub rows_read: usize,
    pub rows_dropped: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrialReport {
    pub window: TrimWindow,
    pub trial: Trial,
    pub checkpoints: Vec<Checkpoint>,
    pub summary: TrialSummary,
    pub load: LoadStats,
    pub params_fingerprint: String,
}

/// Result of one input in a batch. A failed trial never aborts its siblings.
#[derive(Clone, Debug)]
pub struct TrialOutcome {
    pub name: String,
    pub result: Result<TrialReport, SprintError>,
}

impl TrialOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Compute every derived column for an already trimmed window.
pub fn build_trial(samples: &[Sample], params: &Params) -> Result<Trial, SprintError> {
    if samples.len() < 2 {
        return Err(SprintError::DegenerateWindow {
            samples: samples.len(),
        });
    }

    let time_s: Vec<f64> = samples.iter().map(|s| s.time_s).collect();
    let distance_m: Vec<f64> = samples.iter().map(|s| s.distance_m).collect();
    // Without a single positive time step every derived column would be missing.
    if !time_s.windows(2).any(|w| (w[1] - w[0]).is_finite() && w[1] > w[0]) {
        return Err(SprintError::DegenerateWindow {
            samples: samples.len(),
        });
    }

    let raw = raw_speed(&time_s, &distance_m);
    let heavy = box_smooth(&raw, params.heavy);
    let light = box_smooth(&raw, params.light);
    let band = tolerance_band(&heavy, params.tolerance_mps, params.baseline_policy);
    let clamped = clamp_to_band(&raw, &band);

    let mut trial = Trial {
        time_s,
        distance_m,
        raw_speed: raw,
        smoothed_speed_heavy: heavy,
        smoothed_speed_light: light,
        lower_bound: band.lower,
        upper_bound: band.upper,
        clamped_speed: clamped,
        distance_covered: Vec::new(),
        acceleration: Vec::new(),
    };

    let covered = reintegrate(&trial.time_s, trial.speed(params.reconstruction_speed));
    let accel = acceleration(&trial.time_s, trial.speed(params.reconstruction_speed));
    trial.distance_covered = covered;
    trial.acceleration = accel;
    Ok(trial)
}

/// Parse delimited text and run the full pipeline on it.
pub fn process_text(input: &str, params: &Params) -> Result<TrialReport, SprintError> {
    params.validate()?;
    let loaded = parse_samples(input, &params.input)?;
    analyze(loaded, params)
}

/// Run the full pipeline on in-memory samples. Samples are normalized (non-finite rows
/// dropped, stable sort by time) exactly as the text loader would.
pub fn process_samples(samples: Vec<Sample>, params: &Params) -> Result<TrialReport, SprintError> {
    params.validate()?;
    let loaded = LoadedSamples::from_samples(samples)?;
    analyze(loaded, params)
}

/// Process independent inputs one after another, keeping each outcome.
///
/// Parameters are validated once up front; a bad parameter set fails the whole batch.
pub fn process_batch<I, N, T>(inputs: I, params: &Params) -> Result<Vec<TrialOutcome>, SprintError>
where
    I: IntoIterator<Item = (N, T)>,
    N: Into<String>,
    T: AsRef<str>,
{
    params.validate()?;
    Ok(inputs
        .into_iter()
        .map(|(name, text)| TrialOutcome {
            name: name.into(),
            result: parse_samples(text.as_ref(), &params.input)
                .and_then(|loaded| analyze(loaded, params)),
        })
        .collect())
}

fn analyze(loaded: LoadedSamples, params: &Params) -> Result<TrialReport, SprintError> {
    let trimmed = trim_samples(&loaded.samples, params)?;
    let trial = build_trial(&trimmed.samples, params)?;
    let reference = trial.reference_distance(params.calibration_m);
    let checkpoints = resample_checkpoints(
        &trial.time_s,
        &reference,
        trial.speed(params.checkpoint_speed),
        params.sprint_length_m,
        params.checkpoint_interval_m,
    )?;
    let summary = summarize(&trial, &reference, &checkpoints, params);
    Ok(TrialReport {
        window: trimmed.window,
        trial,
        checkpoints,
        summary,
        load: LoadStats {
            rows_read: loaded.rows_read,
            rows_dropped: loaded.rows_dropped,
        },
        params_fingerprint: params.fingerprint()?,
    })
}

fn summarize(
    trial: &Trial,
    reference: &[f64],
    checkpoints: &[Checkpoint],
    params: &Params,
) -> TrialSummary {
    let start = checkpoints.first().and_then(|c| c.time_s);
    // A fallback finish (trial ended short of the sprint length) is not a sprint time.
    let finish = checkpoints
        .last()
        .filter(|c| c.reached)
        .and_then(|c| c.time_s);
    let sprint_time_s = match (start, finish) {
        (Some(a), Some(b)) if b > a => Some(b - a),
        _ => None,
    };
    let mean_speed_mps = sprint_time_s.map(|t| params.sprint_length_m / t);

    // Peaks only count inside the timed distance, not the lead-in or trailing margin.
    let in_sprint = |i: usize| reference[i] >= 0.0 && reference[i] <= params.sprint_length_m;

    let peak_speed = (0..trial.len())
        .filter(|&i| in_sprint(i) && trial.clamped_speed[i].is_finite())
        .max_by(|&a, &b| trial.clamped_speed[a].total_cmp(&trial.clamped_speed[b]));
    let peak_acceleration_mps2 = (0..trial.len())
        .filter(|&i| in_sprint(i))
        .map(|i| trial.acceleration[i])
        .filter(|a| a.is_finite())
        .max_by(f64::total_cmp);

    TrialSummary {
        sprint_time_s,
        mean_speed_mps,
        peak_speed_mps: peak_speed.map(|i| trial.clamped_speed[i]),
        peak_speed_at_m: peak_speed.map(|i| reference[i]),
        peak_acceleration_mps2,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
