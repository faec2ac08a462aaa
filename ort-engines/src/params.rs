//! Tunable parameters for the engines
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Unit newtypes serialize as bare numbers.

use ort_core::units::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamsError {
    #[error("`{name}` must be greater than zero (got {value})")]
    NotPositive { name: &'static str, value: f64 },

    #[error("`{name}` must not be empty")]
    Empty { name: &'static str },

    #[error("`{name}` must be strictly increasing")]
    NotIncreasing { name: &'static str },

    #[error("{0}")]
    Inconsistent(String),
}

fn positive(name: &'static str, value: f64) -> Result<(), ParamsError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ParamsError::NotPositive { name, value })
    }
}

/// Vehicle description used by the telemetry engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleParams {
    /// Usable pack capacity
    pub battery_capacity_ah: AmpereHours,
    pub nominal_voltage: Volts,
    /// Speeds above this count as moving
    pub moving_speed_kmph: KilometersPerHour,
    /// Expected consumption per `VehicleMode` value (index 0, 1, 2, ...)
    pub mode_consumption: Vec<WattHoursPerKilometer>,
    /// Consumption of a rider riding for range
    pub eco_consumption: WattHoursPerKilometer,
    /// Distance after which the ride's own efficiency replaces the mode table
    pub learning_distance: Kilometers,
    /// kg of CO2 per kWh drawn from the grid
    pub grid_co2_kg_per_kwh: f64,
    /// Raw accelerometer units that make one g
    pub accel_units_per_g: f64,
    /// Time constant of the eco gauge smoothing
    pub eco_gauge_time_constant: Seconds,
    /// Right indicator left on this long while riding raises RIndiflag
    pub indicator_timeout: Seconds,
    pub fall: FallParams,
    pub gears: GearParams,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            battery_capacity_ah: AmpereHours(50.0),
            nominal_voltage: Volts(72.0),
            moving_speed_kmph: KilometersPerHour(1.0),
            mode_consumption: vec![
                WattHoursPerKilometer(32.0),
                WattHoursPerKilometer(40.0),
                WattHoursPerKilometer(52.0),
            ],
            eco_consumption: WattHoursPerKilometer(28.0),
            learning_distance: Kilometers(2.0),
            grid_co2_kg_per_kwh: 0.82,
            accel_units_per_g: STANDARD_GRAVITY,
            eco_gauge_time_constant: Seconds(3.0),
            indicator_timeout: Seconds(30.0),
            fall: FallParams::default(),
            gears: GearParams::default(),
        }
    }
}

impl VehicleParams {
    /// Energy of a full pack at nominal voltage
    pub fn full_charge_energy(&self) -> WattHours {
        self.battery_capacity_ah.at(self.nominal_voltage)
    }

    /// Table consumption for a `VehicleMode` value
    ///
    /// Modes beyond the table use its last entry.
    pub fn consumption_for_mode(&self, mode: f64) -> WattHoursPerKilometer {
        let index = if mode.is_finite() && mode > 0.0 {
            mode.round() as usize
        } else {
            0
        };
        self.mode_consumption
            .get(index)
            .or_else(|| self.mode_consumption.last())
            .copied()
            .unwrap_or(self.eco_consumption)
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        positive("battery_capacity_ah", self.battery_capacity_ah.0)?;
        positive("nominal_voltage", self.nominal_voltage.0)?;
        positive("eco_consumption", self.eco_consumption.0)?;
        positive("accel_units_per_g", self.accel_units_per_g)?;
        positive("eco_gauge_time_constant", self.eco_gauge_time_constant.0)?;
        positive("indicator_timeout", self.indicator_timeout.0)?;
        if self.mode_consumption.is_empty() {
            return Err(ParamsError::Empty {
                name: "mode_consumption",
            });
        }
        for value in &self.mode_consumption {
            positive("mode_consumption", value.0)?;
        }
        if self.moving_speed_kmph.0 < 0.0 || self.learning_distance.0 < 0.0 {
            return Err(ParamsError::Inconsistent(
                "moving_speed_kmph and learning_distance must not be negative".to_string(),
            ));
        }
        if self.grid_co2_kg_per_kwh < 0.0 {
            return Err(ParamsError::Inconsistent(
                "grid_co2_kg_per_kwh must not be negative".to_string(),
            ));
        }
        self.fall.validate()?;
        self.gears.validate()
    }
}

/// Fall detection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallParams {
    /// Lean beyond this counts as down
    pub lean_threshold: Degrees,
    /// Lean within this counts as upright again
    pub upright_lean: Degrees,
    /// How long the vehicle must lie stationary before FallDetect_Stationary
    pub hold_time: Seconds,
    /// Acceleration magnitude treated as an impact while moving
    pub impact: GForce,
    /// DeAcc (m/s²) treated as a hard stop while moving
    pub hard_deceleration: f64,
}

impl Default for FallParams {
    fn default() -> Self {
        Self {
            lean_threshold: Degrees(60.0),
            upright_lean: Degrees(20.0),
            hold_time: Seconds(2.0),
            impact: GForce(3.0),
            hard_deceleration: 8.0,
        }
    }
}

impl FallParams {
    fn validate(&self) -> Result<(), ParamsError> {
        positive("fall.lean_threshold", self.lean_threshold.0)?;
        positive("fall.impact", self.impact.0)?;
        positive("fall.hard_deceleration", self.hard_deceleration)?;
        if self.hold_time.0 < 0.0 {
            return Err(ParamsError::Inconsistent(
                "fall.hold_time must not be negative".to_string(),
            ));
        }
        if self.upright_lean.0 < 0.0 || self.upright_lean.0 >= self.lean_threshold.0 {
            return Err(ParamsError::Inconsistent(
                "fall.upright_lean must lie between 0 and fall.lean_threshold".to_string(),
            ));
        }
        Ok(())
    }
}

/// Gearbox description for gear suggestions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GearParams {
    pub count: u8,
    pub upshift_rpm: f64,
    pub downshift_rpm: f64,
    /// Top speed of each gear but the last, ascending (km/h)
    pub speed_bands_kmph: Vec<f64>,
}

impl Default for GearParams {
    fn default() -> Self {
        Self {
            count: 4,
            upshift_rpm: 5500.0,
            downshift_rpm: 2500.0,
            speed_bands_kmph: vec![20.0, 40.0, 65.0],
        }
    }
}

impl GearParams {
    /// Gear whose speed band contains `speed_kmph`
    pub fn gear_for_speed(&self, speed_kmph: f64) -> u8 {
        let band = self
            .speed_bands_kmph
            .iter()
            .position(|&top| speed_kmph < top)
            .unwrap_or(self.speed_bands_kmph.len());
        u8::try_from(band)
            .unwrap_or(u8::MAX)
            .saturating_add(1)
            .clamp(1, self.count.max(1))
    }

    fn validate(&self) -> Result<(), ParamsError> {
        if self.count == 0 {
            return Err(ParamsError::NotPositive {
                name: "gears.count",
                value: 0.0,
            });
        }
        positive("gears.upshift_rpm", self.upshift_rpm)?;
        if self.downshift_rpm < 0.0 || self.downshift_rpm >= self.upshift_rpm {
            return Err(ParamsError::Inconsistent(
                "gears.downshift_rpm must lie between 0 and gears.upshift_rpm".to_string(),
            ));
        }
        if self
            .speed_bands_kmph
            .windows(2)
            .any(|pair| pair[1] <= pair[0])
        {
            return Err(ParamsError::NotIncreasing {
                name: "gears.speed_bands_kmph",
            });
        }
        Ok(())
    }
}

/// Crash detector windowing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashParams {
    /// Samples per signal window; a detection pass runs every `window` samples
    pub window: usize,
    /// Fraction of a window's range that separates the low and high buckets
    pub threshold_fraction: f64,
    /// Detection passes kept in the bucket history
    pub history: usize,
    /// Passes summed into one entropy estimate
    pub entropy_span: usize,
}

impl Default for CrashParams {
    fn default() -> Self {
        Self {
            window: 10,
            threshold_fraction: 0.33,
            history: 10,
            entropy_span: 5,
        }
    }
}

impl CrashParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.window == 0 {
            return Err(ParamsError::NotPositive {
                name: "window",
                value: 0.0,
            });
        }
        if !(self.threshold_fraction > 0.0 && self.threshold_fraction < 0.5) {
            return Err(ParamsError::Inconsistent(
                "threshold_fraction must lie strictly between 0 and 0.5".to_string(),
            ));
        }
        if self.entropy_span == 0 {
            return Err(ParamsError::NotPositive {
                name: "entropy_span",
                value: 0.0,
            });
        }
        if self.history < self.entropy_span + 1 {
            return Err(ParamsError::Inconsistent(
                "history must exceed entropy_span so recent and older estimates differ".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(VehicleParams::default().validate(), Ok(()));
        assert_eq!(CrashParams::default().validate(), Ok(()));
    }

    #[test]
    fn test_full_charge_energy() {
        assert_eq!(VehicleParams::default().full_charge_energy(), WattHours(3600.0));
    }

    #[test]
    fn test_consumption_for_mode_clamps_to_table() {
        let params = VehicleParams::default();
        assert_eq!(params.consumption_for_mode(0.0).0, 32.0);
        assert_eq!(params.consumption_for_mode(1.2).0, 40.0);
        assert_eq!(params.consumption_for_mode(9.0).0, 52.0);
        assert_eq!(params.consumption_for_mode(-3.0).0, 32.0);
    }

    #[test]
    fn test_gear_for_speed_bands() {
        let gears = GearParams::default();
        assert_eq!(gears.gear_for_speed(5.0), 1);
        assert_eq!(gears.gear_for_speed(20.0), 2);
        assert_eq!(gears.gear_for_speed(50.0), 3);
        assert_eq!(gears.gear_for_speed(120.0), 4);
    }

    #[test]
    fn test_gear_for_speed_respects_count() {
        let gears = GearParams {
            count: 2,
            ..Default::default()
        };
        assert_eq!(gears.gear_for_speed(120.0), 2);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let params = VehicleParams {
            nominal_voltage: Volts(0.0),
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParamsError::NotPositive {
                name: "nominal_voltage",
                ..
            })
        ));

        let params = VehicleParams {
            mode_consumption: vec![],
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(ParamsError::Empty { .. })));

        let mut params = VehicleParams::default();
        params.gears.speed_bands_kmph = vec![30.0, 20.0];
        assert!(matches!(params.validate(), Err(ParamsError::NotIncreasing { .. })));

        let crash = CrashParams {
            history: 5,
            ..Default::default()
        };
        assert!(matches!(crash.validate(), Err(ParamsError::Inconsistent(_))));
    }

    #[test]
    fn test_gear_for_speed_with_many_bands() {
        let gears = GearParams {
            count: u8::MAX,
            speed_bands_kmph: (1..=300).map(f64::from).collect(),
            ..Default::default()
        };
        assert_eq!(gears.gear_for_speed(0.5), 1);
        assert_eq!(gears.gear_for_speed(1000.0), u8::MAX);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let params: VehicleParams =
            serde_json::from_str(r#"{"battery_capacity_ah": 30.0, "gears": {"count": 5}}"#).unwrap();
        assert_eq!(params.battery_capacity_ah, AmpereHours(30.0));
        assert_eq!(params.gears.count, 5);
        assert_eq!(params.gears.upshift_rpm, 5500.0);
        assert_eq!(params.nominal_voltage, Volts(72.0));
    }
}
