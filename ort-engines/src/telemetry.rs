//! Ride telemetry engine for electric two-wheelers
//!
//! Turns the raw 19-field vehicle-bus sample into the 27 derived values shown
//! on the dashboard and companion app: ride statistics, energy use, range
//! projections, orientation, fall detection and riding hints.
//!
//! Integrals use the trapezoidal rule between consecutive samples, so the
//! first step of a session (dt = 0) only primes the previous sample.
//! Accumulators and outputs saturate at the largest finite `f64`, so any
//! finite input yields finite outputs and never poisons later steps.

use crate::params::{ParamsError, VehicleParams};
use ort_core::units::*;
use ort_core::{Engine, TelemetryInput, TelemetryOutput};

/// 0-60 km/h target speed
const SPRINT_TARGET_KMPH: f64 = 60.0;

/// Below this distance the ride efficiency is not meaningful
const MIN_EFFICIENCY_DISTANCE: Kilometers = Kilometers(0.01);

/// Clamp an overflowed value back into the finite range
fn saturate(value: f64) -> f64 {
    value.clamp(-f64::MAX, f64::MAX)
}

fn accumulate(total: &mut f64, term: f64) {
    *total = saturate(*total + saturate(term));
}

/// Trapezoid mean that cannot overflow for finite endpoints
fn midpoint(a: f64, b: f64) -> f64 {
    0.5 * a + 0.5 * b
}

fn power_of(input: &TelemetryInput) -> Watts {
    Watts(saturate(Amperes(input.current).times(Volts(input.voltage)).0))
}

/// Everything the engine remembers between steps
#[derive(Debug, Clone, Default)]
struct RideState {
    previous: Option<TelemetryInput>,
    max_speed: KilometersPerHour,
    distance: Kilometers,
    ride_duration: Seconds,
    energy: WattHours,
    charge: AmpereHours,
    /// Last standstill time while a 0-60 run is armed
    sprint_start: Option<f64>,
    best_sprint: Option<Seconds>,
    eco_gauge: f64,
    /// When the current stationary, leaned-over spell began
    lying_since: Option<f64>,
    fallen_stationary: bool,
    fallen_moving: bool,
    indicator_since: Option<f64>,
}

pub struct TelemetryEngine {
    params: VehicleParams,
    state: RideState,
}

impl TelemetryEngine {
    pub fn new(params: VehicleParams) -> Result<Self, ParamsError> {
        params.validate()?;
        Ok(Self::with_valid_params(params))
    }

    fn with_valid_params(params: VehicleParams) -> Self {
        Self {
            params,
            state: RideState::default(),
        }
    }

    pub fn params(&self) -> &VehicleParams {
        &self.params
    }

    fn is_moving(&self, speed: f64) -> bool {
        speed > self.params.moving_speed_kmph.0
    }

    /// Ride efficiency once enough distance is covered
    fn ride_efficiency(&self) -> WattHoursPerKilometer {
        if self.state.distance.0 >= MIN_EFFICIENCY_DISTANCE.0 {
            WattHoursPerKilometer(saturate(self.state.energy.0 / self.state.distance.0))
        } else {
            WattHoursPerKilometer(0.0)
        }
    }

    /// Consumption used for range projections
    fn effective_consumption(&self, mode: f64) -> WattHoursPerKilometer {
        let learned = self.ride_efficiency();
        if self.state.distance.0 >= self.params.learning_distance.0 && learned.0 > 0.0 {
            learned
        } else {
            self.params.consumption_for_mode(mode)
        }
    }

    /// Energy left in the pack, from the BMS when it reports one
    fn remaining_energy(&self, input: &TelemetryInput) -> WattHours {
        let charge = if input.bms_rem_cap > 0.0 {
            AmpereHours(input.bms_rem_cap)
        } else {
            AmpereHours(
                self.params.battery_capacity_ah.0 * Percentage::new(input.soc).as_fraction(),
            )
        };
        WattHours(saturate(charge.at(self.params.nominal_voltage).0))
    }

    fn integrate(&mut self, dt: Seconds, previous: &TelemetryInput, input: &TelemetryInput) {
        if dt.0 <= 0.0 {
            return;
        }
        let mean_speed = KilometersPerHour(midpoint(previous.speed, input.speed));
        accumulate(&mut self.state.distance.0, mean_speed.distance_over(dt).0);

        if self.is_moving(previous.speed) || self.is_moving(input.speed) {
            accumulate(&mut self.state.ride_duration.0, dt.0);
        }

        let mean_power = midpoint(power_of(previous).0, power_of(input).0);
        accumulate(&mut self.state.energy.0, mean_power * dt.as_hours());
        let mean_current = midpoint(previous.current, input.current);
        accumulate(&mut self.state.charge.0, mean_current * dt.as_hours());
    }

    fn track_sprint(&mut self, time: f64, speed: f64) {
        if !self.is_moving(speed) {
            self.state.sprint_start = Some(time);
        } else if speed >= SPRINT_TARGET_KMPH {
            if let Some(start) = self.state.sprint_start.take() {
                let elapsed = Seconds(time - start);
                self.state.best_sprint = Some(match self.state.best_sprint {
                    Some(best) if best.0 <= elapsed.0 => best,
                    _ => elapsed,
                });
            }
        }
    }

    /// Smoothed 0-100 score of instantaneous consumption against the eco reference
    fn update_eco_gauge(&mut self, dt: Seconds, input: &TelemetryInput, power: Watts) {
        if !self.is_moving(input.speed) || dt.0 <= 0.0 {
            return;
        }
        // W divided by km/h is Wh/km
        let instant = power.0 / input.speed;
        let reference = self.params.eco_consumption.0;
        let score = 100.0 * (2.0 - instant / reference).clamp(0.0, 1.0);
        let alpha = dt.0 / (self.params.eco_gauge_time_constant.0 + dt.0);
        self.state.eco_gauge += alpha * (score - self.state.eco_gauge);
    }

    fn update_fall_flags(&mut self, time: f64, moving: bool, lean: Degrees, g: GForce, de_acc: f64) {
        let fall = &self.params.fall;
        let leaned_over = lean.0.abs() >= fall.lean_threshold.0;
        let upright = lean.0.abs() <= fall.upright_lean.0;

        if !moving && leaned_over {
            let since = *self.state.lying_since.get_or_insert(time);
            if time - since >= fall.hold_time.0 {
                self.state.fallen_stationary = true;
            }
        } else {
            self.state.lying_since = None;
        }
        if upright {
            self.state.fallen_stationary = false;
        }

        if moving && (g.0 >= fall.impact.0 || (de_acc >= fall.hard_deceleration && leaned_over)) {
            self.state.fallen_moving = true;
        } else if !moving && upright {
            self.state.fallen_moving = false;
        }
    }

    fn suggest_gear(&self, moving: bool, input: &TelemetryInput) -> f64 {
        let gears = &self.params.gears;
        if !moving {
            return 0.0;
        }
        let current = input.current_gear.round();
        if input.clutch_status != 0.0 {
            return current.clamp(0.0, f64::from(gears.count));
        }
        if current <= 0.0 {
            return f64::from(gears.gear_for_speed(input.speed));
        }
        let suggested = if input.rpm > gears.upshift_rpm {
            current + 1.0
        } else if input.rpm < gears.downshift_rpm {
            current - 1.0
        } else {
            current
        };
        suggested.clamp(1.0, f64::from(gears.count))
    }

    fn indicator_flag(&mut self, time: f64, moving: bool, input: &TelemetryInput) -> bool {
        if moving && input.right_indicator != 0.0 {
            let since = *self.state.indicator_since.get_or_insert(time);
            time - since >= self.params.indicator_timeout.0
        } else {
            self.state.indicator_since = None;
            false
        }
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::with_valid_params(VehicleParams::default())
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Roll and pitch from the gravity vector; level when the sensor reads nothing
fn orientation(input: &TelemetryInput) -> (Degrees, Degrees) {
    if input.ax == 0.0 && input.ay == 0.0 && input.az == 0.0 {
        return (Degrees(0.0), Degrees(0.0));
    }
    let lean = Degrees::from_radians(input.ay.atan2(input.az));
    let pitch = Degrees::from_radians((-input.ax).atan2(input.ay.hypot(input.az)));
    (lean, pitch)
}

impl Engine for TelemetryEngine {
    type Input = TelemetryInput;
    type Output = TelemetryOutput;

    fn name(&self) -> &str {
        "telemetry"
    }

    fn step(&mut self, dt: f64, time: f64, input: &TelemetryInput) -> TelemetryOutput {
        let dt = Seconds(dt);
        let previous = self.state.previous.unwrap_or(*input);
        self.integrate(dt, &previous, input);

        let moving = self.is_moving(input.speed);
        if input.speed > self.state.max_speed.0 {
            self.state.max_speed = KilometersPerHour(input.speed);
        }
        self.track_sprint(time, input.speed);

        let power = power_of(input);
        self.update_eco_gauge(dt, input, power);

        let (lean, pitch) = orientation(input);
        let g = GForce::from_raw(
            input.ax.hypot(input.ay).hypot(input.az),
            self.params.accel_units_per_g,
        );
        self.update_fall_flags(time, moving, lean, g, input.de_acc);
        let right_indicator_flag = self.indicator_flag(time, moving, input);

        let consumption = self.effective_consumption(input.vehicle_mode);
        let eco = self.params.eco_consumption;
        let full = self.params.full_charge_energy();
        let share = |fraction: f64| WattHours(full.0 * fraction);

        self.state.previous = Some(*input);

        let output = TelemetryOutput {
            current_max_speed: self.state.max_speed.0,
            current_avg_speed: KilometersPerHour::from_distance(
                self.state.distance,
                self.state.ride_duration,
            )
            .0,
            distance_travelled: self.state.distance.0,
            min_time_0_to_60: self.state.best_sprint.map_or(0.0, |s| s.0),
            ride_duration: self.state.ride_duration.0,
            co2: self.state.energy.as_kilowatt_hours() * self.params.grid_co2_kg_per_kwh,
            energy_kwh: self.state.energy.as_kilowatt_hours(),
            ride_efficiency: self.ride_efficiency().0,
            ampere_hours: self.state.charge.0,
            fall_detect_stationary: flag(self.state.fallen_stationary),
            fall_detect_motion: flag(self.state.fallen_moving),
            g_force: g.0,
            lean_angle: lean.0,
            eco_gauge: self.state.eco_gauge,
            power: power.as_kilowatts(),
            range: self.remaining_energy(input).range_at(consumption).0,
            range_full_charge: full.range_at(consumption).0,
            eco_range_full_charge: full.range_at(eco).0,
            range_25: share(0.25).range_at(consumption).0,
            range_50: share(0.50).range_at(consumption).0,
            range_75: share(0.75).range_at(consumption).0,
            eco_range_25: share(0.25).range_at(eco).0,
            eco_range_50: share(0.50).range_at(eco).0,
            eco_range_75: share(0.75).range_at(eco).0,
            suggested_gear: self.suggest_gear(moving, input),
            right_indicator_flag: flag(right_indicator_flag),
            pitch_angle: pitch.0,
        };
        TelemetryOutput::from_array(output.to_array().map(saturate))
    }

    fn reset(&mut self) {
        self.state = RideState::default();
    }
}
