//! Resampling of a trial at fixed reference-distance marks.

use serde::{Deserialize, Serialize};

use crate::SprintError;

// Guards against `k * interval` landing a hair below the sprint length.
const DISTANCE_EPS_M: f64 = 1e-9;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub distance_m: f64,
    pub time_s: Option<f64>,
    pub speed_mps: Option<f64>,
    /// Whether a sample actually reached this distance. Only the final checkpoint can
    /// carry a time without being reached.
    pub reached: bool,
}

/// Upper bound on the number of checkpoints in one trial.
pub const MAX_CHECKPOINTS: usize = 10_000;

/// `0, interval, 2 * interval, ...` strictly below `sprint_length_m`, then
/// `sprint_length_m` itself.
pub fn checkpoint_distances(
    sprint_length_m: f64,
    interval_m: f64,
) -> Result<Vec<f64>, SprintError> {
    if !(interval_m.is_finite() && interval_m > 0.0) {
        return Err(SprintError::InvalidParameter(format!(
            "checkpoint interval must be positive, got {}",
            interval_m
        )));
    }
    if !(sprint_length_m.is_finite() && sprint_length_m >= 0.0) {
        return Err(SprintError::InvalidParameter(format!(
            "sprint length must be non-negative, got {}",
            sprint_length_m
        )));
    }
    if sprint_length_m / interval_m > MAX_CHECKPOINTS as f64 {
        return Err(SprintError::InvalidParameter(format!(
            "checkpoint interval {} m yields more than {} checkpoints over {} m",
            interval_m, MAX_CHECKPOINTS, sprint_length_m
        )));
    }
    let mut marks = Vec::new();
    let mut k = 0usize;
    loop {
        let mark = k as f64 * interval_m;
        if mark >= sprint_length_m - DISTANCE_EPS_M {
            break;
        }
        marks.push(mark);
        k += 1;
    }
    marks.push(sprint_length_m);
    Ok(marks)
}

/// Report time and speed at each checkpoint.
///
/// `reference_m` is raw distance minus the calibration distance. A regular checkpoint
/// takes the first sample whose reference distance reaches it and is left empty when
/// none does. The final checkpoint (the sprint length) falls back to the last sample
/// when the trial stops short of it.
pub fn resample_checkpoints(
    times: &[f64],
    reference_m: &[f64],
    speed: &[f64],
    sprint_length_m: f64,
    interval_m: f64,
) -> Result<Vec<Checkpoint>, SprintError> {
    let marks = checkpoint_distances(sprint_length_m, interval_m)?;
    let n = times.len().min(reference_m.len()).min(speed.len());
    let first_reaching = |mark: f64| (0..n).find(|&i| reference_m[i] >= mark);
    let at = |distance_m: f64, idx: Option<usize>, reached: bool| Checkpoint {
        distance_m,
        time_s: idx.map(|i| times[i]),
        speed_mps: idx.map(|i| speed[i]).filter(|v| v.is_finite()),
        reached,
    };

    let last = marks.len() - 1;
    Ok(marks
        .iter()
        .enumerate()
        .map(|(k, &mark)| {
            let idx = first_reaching(mark);
            if k == last && idx.is_none() {
                at(mark, n.checked_sub(1), false)
            } else {
                at(mark, idx, idx.is_some())
            }
        })
        .collect())
}
