//! Demo ride that generates synthetic vehicle-bus samples
//!
//! Loops a short urban route of stops, pull-aways, cruising, braking and
//! corners. Every sample is a pure function of elapsed time and seed, so the
//! same timeline always yields the same frames. An optional tip-over turns
//! the ride into a crash scenario from a given time on.

use ort_core::units::STANDARD_GRAVITY;
use ort_core::{CrashInput, TelemetryInput};

// =============================================================================
// Route definition: a sequence of segments that form one loop
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
enum SegmentKind {
    Stop,     // Waiting at a light, clutch in
    PullAway, // Hard acceleration from standstill
    Cruise,   // Steady throttle
    Braking,  // Slowing down with regen
    Corner,   // Leaned over at roughly constant speed
}

#[derive(Clone, Copy, Debug)]
struct RouteSegment {
    kind: SegmentKind,
    duration: f64,     // seconds
    target_speed: f64, // km/h at end of segment
    lean: f64,         // peak lean in degrees (signed: + = right)
    indicator: bool,   // right indicator on during this segment
}

fn seg(kind: SegmentKind, duration: f64, target_speed: f64, lean: f64, indicator: bool) -> RouteSegment {
    RouteSegment {
        kind,
        duration,
        target_speed,
        lean,
        indicator,
    }
}

/// A city loop: ~120 s with two stops, a fast stretch and both-way corners
fn demo_route() -> Vec<RouteSegment> {
    use SegmentKind::*;
    vec![
        seg(Stop, 6.0, 0.0, 0.0, false),
        seg(PullAway, 7.0, 62.0, 0.0, false),
        seg(Cruise, 15.0, 65.0, 0.0, false),
        seg(Braking, 4.0, 30.0, 0.0, true),
        seg(Corner, 5.0, 28.0, 32.0, true),
        seg(PullAway, 5.0, 50.0, 0.0, false),
        seg(Cruise, 12.0, 52.0, 0.0, false),
        seg(Braking, 3.0, 25.0, 0.0, false),
        seg(Corner, 4.0, 24.0, -35.0, false),
        seg(PullAway, 6.0, 70.0, 0.0, false),
        seg(Cruise, 20.0, 75.0, 0.0, false),
        seg(Braking, 6.0, 0.0, 0.0, false),
        seg(Stop, 8.0, 0.0, 0.0, false),
        seg(PullAway, 5.0, 40.0, 0.0, false),
        seg(Cruise, 8.0, 40.0, 0.0, false),
        seg(Braking, 4.0, 0.0, 0.0, false),
    ]
}

// =============================================================================
// Interpolation state derived from route position
// =============================================================================

struct RouteState {
    kind: SegmentKind,
    speed: f64,
    /// km/h per second
    speed_rate: f64,
    lean: f64,
    indicator: bool,
}

fn compute_route_state(route: &[RouteSegment], loop_time: f64) -> RouteState {
    let mut elapsed = 0.0;
    let mut seg_idx = route.len() - 1;
    for (i, seg) in route.iter().enumerate() {
        if elapsed + seg.duration > loop_time {
            seg_idx = i;
            break;
        }
        elapsed += seg.duration;
    }
    if seg_idx == route.len() - 1 {
        elapsed = route[..seg_idx].iter().map(|s| s.duration).sum();
    }

    let seg = route[seg_idx];
    let seg_t = ((loop_time - elapsed) / seg.duration).clamp(0.0, 1.0);
    let prev_target_speed = if seg_idx > 0 {
        route[seg_idx - 1].target_speed
    } else {
        route[route.len() - 1].target_speed
    };

    let smooth_t = smoothstep(seg_t);
    let speed = lerp(prev_target_speed, seg.target_speed, smooth_t);
    let speed_rate = (seg.target_speed - prev_target_speed) / seg.duration
        * 6.0
        * seg_t
        * (1.0 - seg_t);

    // Lean ramps in over the first half of a corner and out over the second
    let envelope = if seg_t < 0.5 {
        smoothstep(seg_t * 2.0)
    } else {
        smoothstep((1.0 - seg_t) * 2.0)
    };

    RouteState {
        kind: seg.kind,
        speed,
        speed_rate,
        lean: seg.lean * envelope,
        indicator: seg.indicator,
    }
}

fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn speed_to_gear(speed_kmph: f64) -> f64 {
    match speed_kmph {
        x if x < 1.0 => 0.0,
        x if x < 20.0 => 1.0,
        x if x < 40.0 => 2.0,
        x if x < 65.0 => 3.0,
        _ => 4.0,
    }
}

fn speed_to_rpm(speed_kmph: f64, gear: f64) -> f64 {
    // Lower gear = higher RPM for the same speed
    let ratio = match gear as i32 {
        1 => 190.0,
        2 => 120.0,
        3 => 85.0,
        _ => 68.0,
    };
    (speed_kmph * ratio + 900.0).clamp(900.0, 8500.0)
}

/// Simple deterministic noise from a seed
fn noise(seed: f64) -> f64 {
    let x = (seed * 12.9898 + 78.233).sin() * 43_758.547;
    x - x.floor()
}

/// Small jitter centered around 0
fn jitter(seed: f64, amplitude: f64) -> f64 {
    (noise(seed) - 0.5) * 2.0 * amplitude
}

// =============================================================================
// DemoRide
// =============================================================================

/// Pack capacity the demo BMS reports against (Ah)
const DEMO_CAPACITY_AH: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct DemoRide {
    route: Vec<RouteSegment>,
    loop_duration: f64,
    seed: f64,
    tip_over_at: Option<f64>,
}

impl DemoRide {
    pub fn new() -> Self {
        let route = demo_route();
        let loop_duration = route.iter().map(|s| s.duration).sum();
        Self {
            route,
            loop_duration,
            seed: 0.0,
            tip_over_at: None,
        }
    }

    /// Vary the noise pattern; rides with the same seed are identical
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = (seed % 10_000) as f64 * 0.731;
        self
    }

    /// Drop the vehicle on its side at `at_s` seconds
    pub fn with_tip_over(mut self, at_s: f64) -> Self {
        self.tip_over_at = Some(at_s);
        self
    }

    /// Length of one route loop (s)
    pub fn loop_duration(&self) -> f64 {
        self.loop_duration
    }

    /// Sample times for `duration_s` seconds at `rate_hz`, starting at 0
    pub fn timeline(rate_hz: f64, duration_s: f64) -> impl Iterator<Item = f64> {
        let rate = if rate_hz > 0.0 && rate_hz.is_finite() {
            rate_hz
        } else {
            1.0
        };
        let count = (duration_s.max(0.0) * rate).floor() as u64;
        (0..=count).map(move |i| i as f64 / rate)
    }

    fn tipped_over(&self, t: f64) -> Option<f64> {
        self.tip_over_at
            .filter(|&at| t >= at)
            .map(|at| t - at)
    }

    /// Raw vehicle-bus sample at elapsed time `t`
    pub fn telemetry_at(&self, t: f64) -> TelemetryInput {
        let n = t * 10.0 + self.seed; // noise seed
        let loop_time = t.max(0.0) % self.loop_duration;
        let mut state = compute_route_state(&self.route, loop_time);

        let soc = (92.0 - t.max(0.0) * 0.004).max(5.0);

        if let Some(since) = self.tipped_over(t) {
            // Slides to a halt within a second, then lies on its right side
            let decay = (1.0 - since).max(0.0);
            state.speed *= decay;
            state.speed_rate = if decay > 0.0 { -state.speed } else { 0.0 };
            state.lean = 85.0;
            state.kind = SegmentKind::Stop;
            state.indicator = false;
        }

        let speed = (state.speed + jitter(n, 0.3)).max(0.0);
        let current = match state.kind {
            SegmentKind::Stop => 0.8 + jitter(n * 1.1, 0.2),
            SegmentKind::PullAway => 55.0 + state.speed_rate * 2.0 + jitter(n * 1.1, 3.0),
            SegmentKind::Cruise => 10.0 + speed * 0.25 + jitter(n * 1.1, 1.5),
            SegmentKind::Braking => -6.0 + jitter(n * 1.1, 1.0),
            SegmentKind::Corner => 12.0 + jitter(n * 1.1, 1.0),
        };
        let voltage = 66.0 + 12.0 * soc / 100.0 - current * 0.02 + jitter(n * 1.2, 0.05);
        let gear = speed_to_gear(speed);
        let rpm = if gear == 0.0 {
            0.0
        } else {
            speed_to_rpm(speed, gear) + jitter(n * 1.3, 25.0)
        };
        let de_acc = if state.speed_rate < 0.0 {
            -state.speed_rate / 3.6
        } else {
            0.0
        };

        // Gravity seen through the lean, plus longitudinal acceleration on Ax
        let lean_rad = state.lean.to_radians();
        let ax = state.speed_rate / 3.6 + jitter(n * 1.4, 0.05);
        let ay = STANDARD_GRAVITY * lean_rad.sin() + jitter(n * 1.5, 0.05);
        let az = STANDARD_GRAVITY * lean_rad.cos() + jitter(n * 1.6, 0.05);

        TelemetryInput {
            voltage,
            current,
            speed,
            vehicle_mode: 1.0,
            soc,
            bms_rem_cap: DEMO_CAPACITY_AH * soc / 100.0,
            sub_ride_modes: 0.0,
            rpm,
            current_gear: gear,
            clutch_status: if state.kind == SegmentKind::Stop { 1.0 } else { 0.0 },
            torque: current * 0.9,
            de_acc,
            ax,
            ay,
            az,
            motor_switch_status: 1.0,
            vic_flag: 0.0,
            vacation_mode_off: 1.0,
            right_indicator: if state.indicator { 1.0 } else { 0.0 },
        }
    }

    /// Crash detector sample at elapsed time `t`
    pub fn crash_at(&self, t: f64, entropy_diff: f64) -> CrashInput {
        let sample = self.telemetry_at(t);
        CrashInput {
            speed: sample.speed,
            current: sample.current,
            ay: sample.ay,
            entropy_diff,
        }
    }
}

impl Default for DemoRide {
    fn default() -> Self {
        Self::new()
    }
}
