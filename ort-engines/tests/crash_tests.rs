//! Integration tests for the CrashEngine

use ort_core::{CrashInput, EngineError, EngineHandle};
use ort_engines::{CrashEngine, CrashParams, DemoRide};

const THRESHOLD: f64 = 0.1;

/// One detection window of a signal sweeping evenly across its range
fn sweep_window(handle: &mut EngineHandle<CrashEngine>, t: &mut f64) -> Vec<f64> {
    (0..10)
        .map(|i| {
            let v = i as f64;
            let input = CrashInput {
                speed: 20.0 + v,
                current: 10.0 + v * 2.0,
                ay: v * 0.1,
                entropy_diff: THRESHOLD,
            };
            *t += 0.1;
            handle.update(*t, &input).unwrap().crash_flag
        })
        .collect()
}

/// One detection window of signals frozen at a single value
fn frozen_window(handle: &mut EngineHandle<CrashEngine>, t: &mut f64) -> Vec<f64> {
    (0..10)
        .map(|_| {
            let input = CrashInput {
                speed: 0.0,
                current: 0.5,
                ay: 9.5,
                entropy_diff: THRESHOLD,
            };
            *t += 0.1;
            handle.update(*t, &input).unwrap().crash_flag
        })
        .collect()
}

#[test]
fn test_first_update_with_zero_input() {
    let mut handle = EngineHandle::<CrashEngine>::create();
    let out = handle
        .update(0.0, &CrashInput::default())
        .expect("zero input should be accepted");
    assert_eq!(out.crash_flag, 0.0);
}

#[test]
fn test_steady_ride_never_flags() {
    let mut handle = EngineHandle::<CrashEngine>::create();
    let mut t = 0.0;
    for _ in 0..40 {
        let flags = sweep_window(&mut handle, &mut t);
        assert!(flags.iter().all(|&f| f == 0.0));
    }
    assert_eq!(handle.engine().last_entropy_diff(), 0.0);
}

#[test]
fn test_abrupt_change_raises_flag() {
    let mut handle = EngineHandle::<CrashEngine>::create();
    let mut t = 0.0;
    for _ in 0..12 {
        sweep_window(&mut handle, &mut t);
    }

    let mut raised_at = None;
    for pass in 0..6 {
        let flags = frozen_window(&mut handle, &mut t);
        if flags.last() == Some(&1.0) {
            raised_at = Some(pass);
            break;
        }
    }
    let raised_at = raised_at.expect("freezing every signal should be detected as a crash");
    assert!(raised_at >= 1, "a single changed pass is below the threshold");
    assert!(handle.engine().last_entropy_diff() < -THRESHOLD);
}

#[test]
fn test_threshold_changes_between_passes_take_effect() {
    let mut handle = EngineHandle::<CrashEngine>::create();
    let mut t = 0.0;
    for _ in 0..10 {
        sweep_window(&mut handle, &mut t);
    }
    for _ in 0..5 {
        frozen_window(&mut handle, &mut t);
    }
    let diff = handle.engine().last_entropy_diff();
    assert!(diff < -THRESHOLD);

    // the nine samples before the next pass reuse its difference with their own threshold
    let wide = diff.abs() + 1.0;
    for (i, threshold) in [THRESHOLD, wide, THRESHOLD, wide, 0.0, wide, THRESHOLD, wide, wide]
        .into_iter()
        .enumerate()
    {
        t += 0.1;
        let input = CrashInput {
            entropy_diff: threshold,
            ..Default::default()
        };
        let expected = if threshold == wide { 0.0 } else { 1.0 };
        assert_eq!(
            handle.update(t, &input).unwrap().crash_flag,
            expected,
            "sample {i} with threshold {threshold}"
        );
    }
    assert_eq!(handle.engine().last_entropy_diff(), diff);
}

#[test]
fn test_no_flag_before_history_fills() {
    let mut handle = EngineHandle::<CrashEngine>::create();
    let mut t = 0.0;
    for _ in 0..5 {
        sweep_window(&mut handle, &mut t);
    }
    // threshold below zero would flag anything once evaluated
    for _ in 0..49 {
        t += 0.1;
        let input = CrashInput {
            speed: 3.0,
            entropy_diff: -1.0,
            ..Default::default()
        };
        assert_eq!(handle.update(t, &input).unwrap().crash_flag, 0.0);
    }
}

#[test]
fn test_custom_window_length() {
    let params = CrashParams {
        window: 4,
        history: 6,
        entropy_span: 3,
        ..Default::default()
    };
    let mut handle = EngineHandle::new(
        CrashEngine::new(params).expect("custom window params should be valid"),
    );
    let input = CrashInput {
        entropy_diff: -1.0,
        ..Default::default()
    };
    // 6 passes of 4 samples fill the history; the 24th sample evaluates
    for i in 1..24 {
        assert_eq!(handle.update(i as f64, &input).unwrap().crash_flag, 0.0);
    }
    assert_eq!(handle.update(24.0, &input).unwrap().crash_flag, 1.0);
}

#[test]
fn test_non_finite_entropy_threshold_rejected() {
    let mut handle = EngineHandle::<CrashEngine>::create();
    let input = CrashInput {
        entropy_diff: f64::NAN,
        ..Default::default()
    };
    assert_eq!(
        handle.update(0.0, &input),
        Err(EngineError::NonFiniteInput {
            field: "EntropyDiff"
        })
    );
    assert_eq!(handle.steps(), 0);
}

#[test]
fn test_demo_ride_output_is_binary() {
    let ride = DemoRide::new().with_seed(3).with_tip_over(90.0);
    let mut handle = EngineHandle::<CrashEngine>::create();
    for t in DemoRide::timeline(10.0, 180.0) {
        let out = handle.update(t, &ride.crash_at(t, 0.15)).unwrap();
        assert!(out.crash_flag == 0.0 || out.crash_flag == 1.0);
    }
    assert_eq!(handle.steps(), 1801);
}

#[test]
fn test_invalid_params_fail_construction() {
    let params = CrashParams {
        window: 0,
        ..Default::default()
    };
    assert!(CrashEngine::new(params).is_err());

    let params = CrashParams {
        entropy_span: 0,
        ..Default::default()
    };
    assert!(CrashEngine::new(params).is_err());
}
