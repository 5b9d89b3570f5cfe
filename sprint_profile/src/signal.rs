//! Speed derivation, smoothing, outlier clamping and re-integration.
//!
//! All functions are pure: they borrow their inputs and return fresh columns of the
//! same length. `NaN` is the missing-value marker and never turns into an infinity.

use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::{BaselinePolicy, Smoothing};

/// Backward finite difference `(v[i] - v[i-1]) / (t[i] - t[i-1])`.
///
/// Index 0 has no predecessor and copies index 1. A zero or non-finite time delta yields
/// `NaN` at that index only.
fn finite_difference(times: &[f64], values: &[f64]) -> Vec<f64> {
    let n = times.len().min(values.len());
    if n < 2 {
        return vec![f64::NAN; n];
    }
    let mut out = Vec::with_capacity(n);
    out.push(f64::NAN);
    for i in 1..n {
        let dt = times[i] - times[i - 1];
        let dv = values[i] - values[i - 1];
        let rate = if dt != 0.0 { dv / dt } else { f64::NAN };
        out.push(if rate.is_finite() { rate } else { f64::NAN });
    }
    out[0] = out[1];
    out
}

/// Instantaneous speed from cumulative distance.
pub fn raw_speed(times: &[f64], distances: &[f64]) -> Vec<f64> {
    finite_difference(times, distances)
}

/// Acceleration from a speed column, with the same edge and missing-value rules as
/// [`raw_speed`].
pub fn acceleration(times: &[f64], speed: &[f64]) -> Vec<f64> {
    finite_difference(times, speed)
}

/// Repeated centered box filter.
///
/// Runs `smoothing.passes` passes of a `2B+1` moving average, each over the previous
/// pass's output. Windows are truncated at the edges and missing values are left out of
/// the average; a window without any finite value stays missing. Zero passes return the
/// input unchanged.
pub fn box_smooth(values: &[f64], smoothing: Smoothing) -> Vec<f64> {
    if smoothing.passes == 0 || values.is_empty() {
        return values.to_vec();
    }
    let mut current = Array1::from_vec(values.to_vec());
    for _ in 0..smoothing.passes {
        current = box_pass(current.view(), smoothing.half_window);
    }
    current.to_vec()
}

fn box_pass(data: ArrayView1<f64>, half_window: usize) -> Array1<f64> {
    let n = data.len();
    Array1::from_shape_fn(n, |i| {
        let start = i.saturating_sub(half_window);
        let end = i.saturating_add(half_window).saturating_add(1).min(n);
        window_mean(data.slice(s![start..end]))
    })
}

// Averaging deviations from the first finite value keeps a constant window exact.
fn window_mean(window: ArrayView1<f64>) -> f64 {
    let mut finite = window.iter().copied().filter(|v| v.is_finite());
    let pivot = match finite.next() {
        Some(v) => v,
        None => return f64::NAN,
    };
    let (offset, count) = finite.fold((0.0, 1usize), |(sum, count), v| {
        (sum + (v - pivot), count + 1)
    });
    pivot + offset / count as f64
}

/// Acceptance band for the tolerance clamp.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToleranceBand {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl ToleranceBand {
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn contains(&self, idx: usize, value: f64) -> bool {
        match (self.lower.get(idx), self.upper.get(idx)) {
            (Some(&lo), Some(&hi)) => value >= lo && value <= hi,
            _ => false,
        }
    }
}

/// Build `baseline ± tolerance` bounds.
pub fn tolerance_band(baseline: &[f64], tolerance: f64, policy: BaselinePolicy) -> ToleranceBand {
    match policy {
        BaselinePolicy::PerSample => ToleranceBand {
            lower: baseline.iter().map(|b| b - tolerance).collect(),
            upper: baseline.iter().map(|b| b + tolerance).collect(),
        },
        BaselinePolicy::GlobalMean => {
            let (sum, count) = baseline
                .iter()
                .filter(|b| b.is_finite())
                .fold((0.0, 0usize), |(sum, count), b| (sum + b, count + 1));
            let mean = if count > 0 {
                sum / count as f64
            } else {
                f64::NAN
            };
            ToleranceBand {
                lower: vec![mean - tolerance; baseline.len()],
                upper: vec![mean + tolerance; baseline.len()],
            }
        }
    }
}

/// Causal outlier clamp.
///
/// The first sample passes through untouched. Every later sample outside its band, or
/// missing, is replaced by the most recent accepted output value, so a run of outliers
/// repeats the last good value rather than anything computed after the run.
pub fn clamp_to_band(speed: &[f64], band: &ToleranceBand) -> Vec<f64> {
    let mut out = Vec::with_capacity(speed.len());
    let mut accepted = f64::NAN;
    for (idx, &value) in speed.iter().enumerate() {
        if idx == 0 || band.contains(idx, value) {
            accepted = value;
        }
        out.push(accepted);
    }
    out
}

/// Running sum of `speed[i] * (t[i] - t[i-1])` from index 1.
///
/// The first value copies the second and the last copies the second-to-last. A missing
/// increment adds nothing and marks only its own index missing.
pub fn reintegrate(times: &[f64], speed: &[f64]) -> Vec<f64> {
    let n = times.len().min(speed.len());
    if n < 2 {
        return vec![f64::NAN; n];
    }
    let mut covered = vec![f64::NAN; n];
    let mut total = 0.0;
    for i in 1..n {
        let increment = speed[i] * (times[i] - times[i - 1]);
        if increment.is_finite() {
            total += increment;
            covered[i] = total;
        }
    }
    covered[0] = covered[1];
    covered[n - 1] = covered[n - 2];
    covered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_times(n: usize, dt: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 * dt).collect()
    }

    #[test]
    fn raw_speed_copies_first_value() {
        let t = [0.0, 0.2, 0.4, 0.6];
        let d = [0.0, 1.0, 2.2, 3.3];
        let v = raw_speed(&t, &d);
        assert!((v[1] - 5.0).abs() < 1e-12);
        assert_eq!(v[0], v[1]);
        assert!((v[2] - 6.0).abs() < 1e-9);
    }

    #[test]
    fn zero_time_delta_is_missing_not_infinite() {
        let t = [0.0, 0.1, 0.1, 0.2];
        let d = [0.0, 0.5, 0.6, 1.0];
        let v = raw_speed(&t, &d);
        assert!(v[2].is_nan());
        assert!(v.iter().all(|x| !x.is_infinite()));
        assert!((v[3] - 4.0).abs() < 1e-9);
        assert!((v[1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn smoother_with_zero_passes_is_identity() {
        let input = vec![1.0, 7.0, f64::NAN, -3.0, 2.5];
        let out = box_smooth(&input, Smoothing::new(0, 4));
        assert_eq!(out.len(), input.len());
        for (a, b) in input.iter().zip(out.iter()) {
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }
    }

    #[test]
    fn smoother_preserves_constant_series_exactly() {
        let input = vec![0.1; 25];
        for (passes, half_window) in [(1, 1), (3, 3), (9, 9), (4, 40)] {
            let out = box_smooth(&input, Smoothing::new(passes, half_window));
            assert_eq!(out, input, "passes={} half_window={}", passes, half_window);
        }
    }

    #[test]
    fn smoother_truncates_windows_at_edges() {
        let out = box_smooth(&[0.0, 3.0, 6.0, 9.0], Smoothing::new(1, 1));
        assert!((out[0] - 1.5).abs() < 1e-12);
        assert!((out[1] - 3.0).abs() < 1e-12);
        assert!((out[2] - 6.0).abs() < 1e-12);
        assert!((out[3] - 7.5).abs() < 1e-12);

        let single = box_smooth(&[4.2], Smoothing::HEAVY);
        assert_eq!(single, vec![4.2]);
    }

    #[test]
    fn smoother_skips_missing_values() {
        let out = box_smooth(&[2.0, f64::NAN, 4.0], Smoothing::new(1, 1));
        assert!((out[0] - 2.0).abs() < 1e-12);
        assert!((out[1] - 3.0).abs() < 1e-12);
        assert!((out[2] - 4.0).abs() < 1e-12);

        let all_missing = box_smooth(&[f64::NAN, f64::NAN], Smoothing::new(2, 1));
        assert!(all_missing.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn repeated_passes_widen_the_filter() {
        let mut spike = vec![0.0; 21];
        spike[10] = 21.0;
        let once = box_smooth(&spike, Smoothing::new(1, 1));
        let thrice = box_smooth(&spike, Smoothing::new(3, 1));
        assert_eq!(once[7], 0.0);
        assert!(thrice[7] > 0.0);
        assert!(thrice[10] < once[10]);
        let total: f64 = thrice.iter().sum();
        assert!((total - 21.0).abs() < 1e-9);
    }

    #[test]
    fn clamp_carries_last_accepted_value() {
        let band = tolerance_band(&[5.0; 6], 1.0, BaselinePolicy::PerSample);
        let out = clamp_to_band(&[5.0, 5.0, 5.0, 9.0, 9.0, 5.0], &band);
        assert_eq!(out, vec![5.0; 6]);
    }

    #[test]
    fn clamp_never_touches_first_sample() {
        let band = tolerance_band(&[5.0; 4], 0.5, BaselinePolicy::PerSample);
        let out = clamp_to_band(&[12.0, 5.2, 20.0, 4.8], &band);
        assert_eq!(out, vec![12.0, 5.2, 5.2, 4.8]);
    }

    #[test]
    fn clamp_bounds_follow_the_local_baseline() {
        let baseline = [1.0, 2.0, 3.0, 4.0, 5.0];
        let band = tolerance_band(&baseline, 0.5, BaselinePolicy::PerSample);
        assert_eq!(band.lower, vec![0.5, 1.5, 2.5, 3.5, 4.5]);
        assert_eq!(band.upper, vec![1.5, 2.5, 3.5, 4.5, 5.5]);
        let out = clamp_to_band(&[1.0, 2.2, 3.9, 4.1, 5.0], &band);
        assert_eq!(out, vec![1.0, 2.2, 2.2, 4.1, 5.0]);

        let global = tolerance_band(&baseline, 0.5, BaselinePolicy::GlobalMean);
        assert_eq!(global.lower, vec![2.5; 5]);
        assert_eq!(global.upper, vec![3.5; 5]);
    }

    #[test]
    fn clamp_fills_missing_samples() {
        let band = tolerance_band(&[3.0; 4], 1.0, BaselinePolicy::PerSample);
        let out = clamp_to_band(&[3.0, f64::NAN, 3.5, f64::NAN], &band);
        assert_eq!(out, vec![3.0, 3.0, 3.5, 3.5]);
    }

    #[test]
    fn zero_tolerance_only_accepts_baseline_values() {
        let band = tolerance_band(&[2.0, 2.0, 2.0], 0.0, BaselinePolicy::PerSample);
        let out = clamp_to_band(&[1.0, 2.0, 2.1], &band);
        assert_eq!(out, vec![1.0, 2.0, 2.0]);
    }

    #[test]
    fn reintegration_of_constant_speed_is_linear() {
        let v = 7.5;
        let dt = 0.05;
        let times = uniform_times(50, dt);
        let speed = vec![v; times.len()];
        let covered = reintegrate(&times, &speed);

        let n = times.len();
        for i in 1..n - 1 {
            assert!((covered[i] - v * times[i]).abs() < 1e-9, "index {}", i);
        }
        assert_eq!(covered[0], covered[1]);
        assert_eq!(covered[n - 1], covered[n - 2]);

        // Differentiating the reconstructed distance recovers the speed away from the
        // copied edge samples.
        let recovered = raw_speed(&times, &covered);
        for (i, r) in recovered.iter().enumerate().take(n - 1).skip(2) {
            assert!((r - v).abs() < 1e-6, "index {}: {}", i, r);
        }
    }

    #[test]
    fn reintegration_skips_missing_increments() {
        let times = [0.0, 1.0, 2.0, 3.0, 4.0];
        let speed = [1.0, 1.0, f64::NAN, 1.0, 1.0];
        let covered = reintegrate(&times, &speed);
        assert_eq!(covered[1], 1.0);
        assert!(covered[2].is_nan());
        assert_eq!(covered[3], 2.0);
        assert_eq!(covered[4], 2.0);
        assert_eq!(covered[0], 1.0);
    }

    #[test]
    fn acceleration_of_linear_speed_is_constant() {
        let times = uniform_times(20, 0.1);
        let speed: Vec<f64> = times.iter().map(|t| 2.0 + 3.0 * t).collect();
        let accel = acceleration(&times, &speed);
        for a in accel {
            assert!((a - 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn short_inputs_do_not_panic() {
        assert!(raw_speed(&[], &[]).is_empty());
        assert!(raw_speed(&[0.0], &[1.0])[0].is_nan());
        assert!(reintegrate(&[0.0], &[1.0])[0].is_nan());
        assert!(box_smooth(&[], Smoothing::HEAVY).is_empty());
        assert!(clamp_to_band(&[], &tolerance_band(&[], 1.0, BaselinePolicy::PerSample))
            .is_empty());
    }
}
