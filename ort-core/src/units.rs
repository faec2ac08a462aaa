//! Type-safe wrappers for physical units
//!
//! Frames at the engine boundary stay flat `f64` records so hosts can marshal
//! them field by field. Inside the engines and in parameter sets these
//! newtypes keep km/h from being mixed up with m/s, or Wh with kWh.
//!
//! All unit types serialize with 4 decimal places to keep config dumps and
//! JSON payloads small.

use serde::{Deserialize, Serialize};

/// Standard gravity (m/s²)
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Round f64 to 4 decimal places for compact serialization
fn round4<S: serde::Serializer>(val: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((*val * 10000.0).round() / 10000.0)
}

/// Kilometers
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Kilometers(#[serde(serialize_with = "round4")] pub f64);

/// Kilometers per hour
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct KilometersPerHour(#[serde(serialize_with = "round4")] pub f64);

impl KilometersPerHour {
    /// Distance covered in `seconds` at this speed
    pub fn distance_over(&self, seconds: Seconds) -> Kilometers {
        Kilometers(self.0 * seconds.0 / 3600.0)
    }

    /// Average speed that covers `distance` in `seconds` (zero for zero time)
    pub fn from_distance(distance: Kilometers, seconds: Seconds) -> Self {
        if seconds.0 > 0.0 {
            Self(distance.0 * 3600.0 / seconds.0)
        } else {
            Self(0.0)
        }
    }
}

/// Seconds (timestamps, durations)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Seconds(#[serde(serialize_with = "round4")] pub f64);

impl Seconds {
    pub fn as_hours(&self) -> f64 {
        self.0 / 3600.0
    }
}

/// Volts (electrical)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Volts(#[serde(serialize_with = "round4")] pub f64);

/// Amperes (pack current, positive = discharge)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Amperes(#[serde(serialize_with = "round4")] pub f64);

impl Amperes {
    pub fn times(&self, voltage: Volts) -> Watts {
        Watts(self.0 * voltage.0)
    }
}

/// Ampere-hours (charge)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct AmpereHours(#[serde(serialize_with = "round4")] pub f64);

impl AmpereHours {
    /// Energy stored in this much charge at the given voltage
    pub fn at(&self, voltage: Volts) -> WattHours {
        WattHours(self.0 * voltage.0)
    }
}

/// Watts (power)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Watts(#[serde(serialize_with = "round4")] pub f64);

impl Watts {
    pub fn as_kilowatts(&self) -> f64 {
        self.0 / 1000.0
    }
}

/// Watt-hours (energy)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct WattHours(#[serde(serialize_with = "round4")] pub f64);

impl WattHours {
    pub fn as_kilowatt_hours(&self) -> f64 {
        self.0 / 1000.0
    }

    /// Distance this energy covers at the given consumption
    pub fn range_at(&self, consumption: WattHoursPerKilometer) -> Kilometers {
        if consumption.0 > 0.0 {
            Kilometers((self.0 / consumption.0).max(0.0))
        } else {
            Kilometers(0.0)
        }
    }
}

/// Watt-hours per kilometer (energy consumption / ride efficiency)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct WattHoursPerKilometer(#[serde(serialize_with = "round4")] pub f64);

/// Degrees (lean and pitch angles are reported in degrees)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Degrees(#[serde(serialize_with = "round4")] pub f64);

impl Degrees {
    pub fn from_radians(rad: f64) -> Self {
        Self(rad.to_degrees())
    }
}

/// G-force (multiples of gravitational acceleration)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct GForce(#[serde(serialize_with = "round4")] pub f64);

impl GForce {
    /// Convert a raw accelerometer magnitude given how many raw units make one g
    pub fn from_raw(magnitude: f64, units_per_g: f64) -> Self {
        if units_per_g > 0.0 {
            Self(magnitude / units_per_g)
        } else {
            Self(0.0)
        }
    }
}

/// Percentage (0.0 to 100.0)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Percentage(#[serde(serialize_with = "round4")] pub f64);

impl Percentage {
    /// Create a new percentage, clamping to [0.0, 100.0]
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 100.0))
    }

    /// Get as a fraction (0-1)
    pub fn as_fraction(&self) -> f64 {
        self.0 / 100.0
    }
}
