//! Cut the raw stream down to the sprint window around the calibration crossing.

use serde::{Deserialize, Serialize};

use crate::{Params, Sample, SprintError};

/// Where the window was placed, for reporting alongside the trimmed samples.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrimWindow {
    /// Time of the first sample at or beyond the calibration distance.
    pub calibration_time_s: f64,
    /// Index of that sample in the untrimmed sequence.
    pub calibration_index: usize,
    pub window_start_s: f64,
    pub window_end_distance_m: f64,
}

#[derive(Clone, Debug)]
pub struct TrimmedTrial {
    pub window: TrimWindow,
    pub samples: Vec<Sample>,
}

/// Index and time of the first sample whose distance reaches `calibration_m`.
pub fn locate_calibration(
    samples: &[Sample],
    calibration_m: f64,
) -> Result<(usize, f64), SprintError> {
    if samples.is_empty() {
        return Err(SprintError::MalformedInput("no samples to trim".into()));
    }
    samples
        .iter()
        .position(|s| s.distance_m >= calibration_m)
        .map(|idx| (idx, samples[idx].time_s))
        .ok_or_else(|| SprintError::CalibrationNotReached {
            calibration_m,
            max_distance_m: samples
                .iter()
                .map(|s| s.distance_m)
                .fold(f64::NEG_INFINITY, f64::max),
        })
}

/// Keep samples with `time >= t_cal - lead_in` and
/// `distance <= calibration + sprint_length + trailing_margin`.
///
/// Samples must already be sorted by time.
pub fn trim_samples(samples: &[Sample], params: &Params) -> Result<TrimmedTrial, SprintError> {
    let (calibration_index, calibration_time_s) =
        locate_calibration(samples, params.calibration_m)?;
    let window = TrimWindow {
        calibration_time_s,
        calibration_index,
        window_start_s: calibration_time_s - params.lead_in_s,
        window_end_distance_m: params.window_end_distance_m(),
    };

    let kept: Vec<Sample> = samples
        .iter()
        .filter(|s| {
            s.time_s >= window.window_start_s && s.distance_m <= window.window_end_distance_m
        })
        .copied()
        .collect();

    if kept.len() < 2 {
        return Err(SprintError::DegenerateWindow {
            samples: kept.len(),
        });
    }

    Ok(TrimmedTrial {
        window,
        samples: kept,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(calibration_m: f64, sprint_length_m: f64) -> Params {
        Params {
            calibration_m,
            sprint_length_m,
            ..Params::default()
        }
    }

    fn samples(points: &[(f64, f64)]) -> Vec<Sample> {
        points.iter().map(|&(t, d)| Sample::new(t, d)).collect()
    }

    #[test]
    fn window_starts_one_second_before_crossing() {
        // 8 Hz, 2 m/s: crossing 3.0 m at t = 1.5.
        let data: Vec<Sample> = (0..60)
            .map(|i| {
                let t = i as f64 * 0.125;
                Sample::new(t, 2.0 * t)
            })
            .collect();
        let trimmed = trim_samples(&data, &params(3.0, 4.0)).unwrap();
        assert_eq!(trimmed.window.calibration_index, 12);
        assert_eq!(trimmed.window.calibration_time_s, 1.5);
        assert_eq!(trimmed.window.window_start_s, 0.5);
        assert_eq!(trimmed.window.window_end_distance_m, 9.0);

        let first = trimmed.samples.first().unwrap();
        let last = trimmed.samples.last().unwrap();
        assert_eq!(first.time_s, 0.5);
        assert_eq!(last.time_s, 4.5);
        assert_eq!(trimmed.samples.len(), 33);
    }

    #[test]
    fn early_window_start_keeps_leading_samples() {
        let data = samples(&[(0.0, 0.0), (0.2, 1.0), (0.4, 2.2), (0.6, 3.3), (0.8, 4.6)]);
        let trimmed = trim_samples(&data, &params(2.2, 2.0)).unwrap();
        assert_eq!(trimmed.window.calibration_index, 2);
        assert!((trimmed.window.window_start_s + 0.6).abs() < 1e-9);
        assert_eq!(trimmed.samples, data);
    }

    #[test]
    fn missing_crossing_is_an_error_not_an_empty_window() {
        let data = samples(&[(0.0, 0.0), (0.5, 1.0), (1.0, 2.0)]);
        let err = trim_samples(&data, &params(3.105, 30.0)).unwrap_err();
        assert_eq!(
            err,
            SprintError::CalibrationNotReached {
                calibration_m: 3.105,
                max_distance_m: 2.0
            }
        );
    }

    #[test]
    fn window_with_one_sample_is_degenerate() {
        // The sensor jumps straight past the end distance after crossing.
        let data = samples(&[(0.0, 0.0), (3.0, 3.2), (3.1, 50.0), (3.2, 51.0)]);
        let mut p = params(3.0, 5.0);
        p.lead_in_s = 0.5;
        let err = trim_samples(&data, &p).unwrap_err();
        assert_eq!(err, SprintError::DegenerateWindow { samples: 1 });
    }
}
