use sprint_profile::{
    parse_samples, process_samples, process_text, DecimalSeparator, ErrorKind, FieldSeparator,
    InputFormat, Params, Sample, SpeedColumn,
};

const VMAX: f64 = 9.0;
const TAU: f64 = 1.2;
const STANDING_S: f64 = 2.0;
const RATE_HZ: f64 = 50.0;

// Mono-exponential sprint model: v(t) = vmax * (1 - exp(-t / tau)).
fn model_distance(t_rel: f64) -> f64 {
    if t_rel <= 0.0 {
        0.0
    } else {
        VMAX * (t_rel - TAU * (1.0 - (-t_rel / TAU).exp()))
    }
}

fn model_time_at(distance: f64) -> f64 {
    let (mut lo, mut hi) = (0.0, 20.0);
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if model_distance(mid) < distance {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    STANDING_S + hi
}

fn sensor_export(glitch_at: Option<usize>) -> String {
    let mut out = String::from("Time\tDistance\n");
    for i in 0..450 {
        let t = i as f64 / RATE_HZ;
        let mut d = model_distance(t - STANDING_S);
        if glitch_at == Some(i) {
            d += 0.3;
        }
        let row = format!("{:.4}\t{:.4}\n", t, d).replace('.', ",");
        out.push_str(&row);
    }
    out
}

#[test]
fn five_sample_scenario() {
    let params = Params {
        calibration_m: 2.2,
        sprint_length_m: 2.0,
        input: InputFormat {
            field_separator: FieldSeparator::Whitespace,
            decimal_separator: DecimalSeparator::Point,
        },
        ..Params::default()
    };
    let text = "0 0\n0.2 1.0\n0.4 2.2\n0.6 3.3\n0.8 4.6\n";
    let report = process_text(text, &params).unwrap();

    assert!((report.window.calibration_time_s - 0.4).abs() < 1e-12);
    assert!((report.window.window_start_s - (-0.6)).abs() < 1e-12);
    assert!((report.window.window_end_distance_m - 6.2).abs() < 1e-12);
    assert_eq!(report.trial.len(), 5);
    assert!((report.trial.raw_speed[1] - 5.0).abs() < 1e-12);
    assert_eq!(report.trial.raw_speed[0], report.trial.raw_speed[1]);

    assert_eq!(report.checkpoints.len(), 2);
    assert_eq!(report.checkpoints[0].time_s, Some(0.4));
    assert_eq!(report.checkpoints[1].distance_m, 2.0);
    assert_eq!(report.checkpoints[1].time_s, Some(0.8));
    assert_eq!(report.load.rows_dropped, 0);
}

#[test]
fn sensor_export_profile_matches_model() {
    let params = Params::default();
    let report = process_text(&sensor_export(None), &params).unwrap();

    assert_eq!(report.load.rows_dropped, 1);
    let expected_cal = model_time_at(params.calibration_m);
    assert!((report.window.calibration_time_s - expected_cal).abs() <= 0.021);
    assert!(report.trial.time_s[0] >= report.window.window_start_s);
    let last_distance = *report.trial.distance_m.last().unwrap();
    assert!(last_distance <= params.window_end_distance_m());

    assert_eq!(report.checkpoints.len(), 7);
    for cp in &report.checkpoints {
        let expected = model_time_at(params.calibration_m + cp.distance_m);
        let got = cp.time_s.unwrap();
        assert!(got >= expected - 1e-3 && got - expected <= 0.021, "{:?}", cp);
    }

    let sprint_time = report.summary.sprint_time_s.unwrap();
    let expected = model_time_at(params.calibration_m + 30.0) - expected_cal;
    assert!((sprint_time - expected).abs() < 0.03);
    let peak = report.summary.peak_speed_mps.unwrap();
    assert!(peak > 8.0 && peak < VMAX + 0.1, "peak {}", peak);
}

#[test]
fn distance_glitch_is_clamped_out() {
    let glitch = 250;
    let params = Params::default();
    let report = process_text(&sensor_export(Some(glitch)), &params).unwrap();
    let trial = &report.trial;
    let glitch_t = glitch as f64 / RATE_HZ;
    let idx = trial
        .time_s
        .iter()
        .position(|t| (t - glitch_t).abs() < 1e-6)
        .unwrap();

    assert!(trial.raw_speed[idx] > 20.0);
    assert!(trial.raw_speed[idx + 1] < 0.0);
    for i in idx - 2..=idx + 2 {
        let v = trial.clamped_speed[i];
        assert!((7.5..=10.0).contains(&v), "index {} clamped to {}", i, v);
    }
    // The run of two outliers repeats the sample just before it.
    assert_eq!(trial.clamped_speed[idx], trial.clamped_speed[idx - 1]);
    assert_eq!(trial.clamped_speed[idx + 1], trial.clamped_speed[idx - 1]);
}

#[test]
fn derived_columns_are_rederivable() {
    let params = Params::default();
    let text = sensor_export(Some(300));
    let a = process_text(&text, &params).unwrap();
    let b = process_text(&text, &params).unwrap();
    assert_eq!(a.trial.clamped_speed, b.trial.clamped_speed);
    assert_eq!(a.params_fingerprint, b.params_fingerprint);

    // Rebuilding from the trimmed samples reproduces the same columns.
    let samples: Vec<Sample> = a
        .trial
        .time_s
        .iter()
        .zip(a.trial.distance_m.iter())
        .map(|(&t, &d)| Sample::new(t, d))
        .collect();
    let rebuilt = sprint_profile::build_trial(&samples, &params).unwrap();
    assert_eq!(rebuilt.smoothed_speed_heavy, a.trial.smoothed_speed_heavy);
    assert_eq!(rebuilt.acceleration, a.trial.acceleration);
}

#[test]
fn reconstruction_column_is_selectable() {
    let mut params = Params::default();
    params.reconstruction_speed = SpeedColumn::Heavy;
    let text = sensor_export(None);
    let heavy = process_text(&text, &params).unwrap();
    params.reconstruction_speed = SpeedColumn::Light;
    let light = process_text(&text, &params).unwrap();
    assert_ne!(heavy.trial.distance_covered, light.trial.distance_covered);
    assert_eq!(heavy.trial.raw_speed, light.trial.raw_speed);
}

#[test]
fn calibration_never_reached_is_reported() {
    let samples = vec![
        Sample::new(0.0, 0.0),
        Sample::new(0.5, 1.0),
        Sample::new(1.0, 2.0),
    ];
    let err = process_samples(samples, &Params::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CalibrationNotReached);
}

#[test]
fn loader_reports_file_statistics() {
    let loaded = parse_samples(&sensor_export(None), &InputFormat::default()).unwrap();
    assert_eq!(loaded.samples.len(), 450);
    assert!((loaded.time_span_s() - 8.98).abs() < 1e-9);
    assert!(loaded.max_distance_m() > 50.0);
}
