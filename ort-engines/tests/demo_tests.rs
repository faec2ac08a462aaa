//! Integration tests for the DemoRide and for session independence

use ort_core::{EngineHandle, TelemetryOutput};
use ort_engines::{CrashEngine, DemoRide, TelemetryEngine};
use std::thread;

fn run_ride(ride: &DemoRide, rate_hz: f64, duration_s: f64) -> Vec<TelemetryOutput> {
    let mut handle = EngineHandle::<TelemetryEngine>::create();
    DemoRide::timeline(rate_hz, duration_s)
        .map(|t| {
            handle
                .update(t, &ride.telemetry_at(t))
                .expect("demo samples should be accepted")
        })
        .collect()
}

#[test]
fn test_demo_ride_is_deterministic() {
    let ride = DemoRide::new().with_seed(11);
    assert_eq!(ride.telemetry_at(42.3), ride.telemetry_at(42.3));
    assert_eq!(
        DemoRide::new().with_seed(11).telemetry_at(42.3),
        ride.telemetry_at(42.3)
    );
}

#[test]
fn test_demo_seed_changes_noise() {
    let a = DemoRide::new().with_seed(1).telemetry_at(20.0);
    let b = DemoRide::new().with_seed(2).telemetry_at(20.0);
    assert_ne!(a.speed, b.speed);
}

#[test]
fn test_demo_frame_values_in_reasonable_range() {
    let ride = DemoRide::new();
    for t in DemoRide::timeline(5.0, ride.loop_duration() * 2.0) {
        let input = ride.telemetry_at(t);
        assert!(
            (0.0..=90.0).contains(&input.speed),
            "Speed {} should be in reasonable range",
            input.speed
        );
        assert!(
            (0.0..=100.0).contains(&input.soc),
            "SOC {} should be between 0 and 100",
            input.soc
        );
        assert!(
            (0.0..=4.0).contains(&input.current_gear),
            "Gear {} should be between 0 and 4",
            input.current_gear
        );
        assert!(
            (60.0..=80.0).contains(&input.voltage),
            "Voltage {} should be in reasonable range",
            input.voltage
        );
        assert!(input.bms_rem_cap > 0.0);
    }
}

#[test]
fn test_demo_ride_reaches_sixty_and_stops() {
    let ride = DemoRide::new();
    let outputs = run_ride(&ride, 10.0, ride.loop_duration());
    let last = outputs.last().expect("ride should produce outputs");
    assert!(last.current_max_speed > 60.0);
    assert!(last.min_time_0_to_60 > 0.0, "pull-away should be timed");
    assert!(last.distance_travelled > 1.0);
    assert!(last.ride_duration < ride.loop_duration());
    assert!(last.energy_kwh > 0.0);
}

#[test]
fn test_demo_ride_corners_lean_both_ways() {
    let ride = DemoRide::new();
    let outputs = run_ride(&ride, 10.0, ride.loop_duration());
    assert!(outputs.iter().any(|o| o.lean_angle > 25.0));
    assert!(outputs.iter().any(|o| o.lean_angle < -25.0));
    assert!(outputs.iter().all(|o| o.fall_detect_stationary == 0.0));
}

#[test]
fn test_demo_tip_over_detected_as_stationary_fall() {
    let ride = DemoRide::new().with_tip_over(30.0);
    let outputs = run_ride(&ride, 10.0, 40.0);
    let last = outputs.last().expect("ride should produce outputs");
    assert_eq!(last.fall_detect_stationary, 1.0);
    assert!(last.lean_angle > 80.0);
}

#[test]
fn test_identical_sessions_produce_identical_outputs() {
    let ride = DemoRide::new().with_seed(5);
    let first = run_ride(&ride, 20.0, 60.0);
    let second = run_ride(&ride, 20.0, 60.0);
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        // bit-identical, not just approximately equal
        assert_eq!(a.to_array().map(f64::to_bits), b.to_array().map(f64::to_bits));
    }
}

#[test]
fn test_interleaved_sessions_are_isolated() {
    let ride_a = DemoRide::new().with_seed(1);
    let ride_b = DemoRide::new().with_seed(2).with_tip_over(20.0);
    let expected_a = run_ride(&ride_a, 10.0, 30.0);
    let expected_b = run_ride(&ride_b, 10.0, 30.0);

    let mut a = EngineHandle::<TelemetryEngine>::create();
    let mut b = EngineHandle::<TelemetryEngine>::create();
    let mut crash = EngineHandle::<CrashEngine>::create();
    for (i, t) in DemoRide::timeline(10.0, 30.0).enumerate() {
        // b runs first on odd steps, a on even ones
        let (out_a, out_b) = if i % 2 == 0 {
            let out_a = a.update(t, &ride_a.telemetry_at(t)).unwrap();
            let out_b = b.update(t, &ride_b.telemetry_at(t)).unwrap();
            (out_a, out_b)
        } else {
            let out_b = b.update(t, &ride_b.telemetry_at(t)).unwrap();
            let out_a = a.update(t, &ride_a.telemetry_at(t)).unwrap();
            (out_a, out_b)
        };
        crash.update(t, &ride_b.crash_at(t, 0.2)).unwrap();
        assert_eq!(out_a, expected_a[i]);
        assert_eq!(out_b, expected_b[i]);
    }

    let summary = a.destroy();
    assert_eq!(summary.steps, 301);
    // b keeps working after a is gone
    assert!(b.update(31.0, &ride_b.telemetry_at(31.0)).is_ok());
}

#[test]
fn test_sessions_on_separate_threads_match_sequential_runs() {
    let seeds = [3_u64, 4, 5, 6];
    let expected: Vec<Vec<TelemetryOutput>> = seeds
        .iter()
        .map(|&s| run_ride(&DemoRide::new().with_seed(s), 10.0, 45.0))
        .collect();

    let workers: Vec<_> = seeds
        .iter()
        .map(|&seed| {
            // handles are created here and moved into the worker
            let mut handle = EngineHandle::<TelemetryEngine>::create();
            thread::spawn(move || {
                let ride = DemoRide::new().with_seed(seed);
                DemoRide::timeline(10.0, 45.0)
                    .map(|t| handle.update(t, &ride.telemetry_at(t)).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for (worker, expected) in workers.into_iter().zip(expected) {
        let outputs = worker.join().expect("worker thread should not panic");
        assert_eq!(outputs, expected);
    }
}
