//! Flat frame records exchanged with the engines
//!
//! Every frame is a fixed set of `f64` fields. Field names on the wire
//! (serde, C ABI headers, recordings) are the names used by the vehicle
//! firmware and host applications, so they keep their original spelling and
//! order. Rust code uses the snake_case names.
//!
//! Positional access (`to_array`/`from_array`) and the name list are
//! generated from the same field list as the struct, so a field that is
//! missing or out of place is a compile error rather than a runtime one.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A fixed-shape record of `f64` fields with stable wire names
pub trait FlatRecord: Copy + Default + Serialize {
    /// Wire names, in positional order
    fn field_names() -> &'static [&'static str];

    /// Field values, in positional order
    fn values(&self) -> Vec<f64>;

    /// Wire name of the first field that is NaN or infinite
    fn first_non_finite(&self) -> Option<&'static str>;

    /// (wire name, value) pairs in positional order
    fn named_values(&self) -> Vec<(&'static str, f64)> {
        Self::field_names()
            .iter()
            .copied()
            .zip(self.values())
            .collect()
    }
}

macro_rules! frame_record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident [$len:literal] {
            $(
                $(#[doc = $doc:literal])*
                $field:ident => $wire:literal,
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
        pub struct $name {
            $(
                $(#[doc = $doc])*
                #[serde(rename = $wire)]
                pub $field: f64,
            )+
        }

        impl $name {
            /// Number of fields in this record
            pub const FIELD_COUNT: usize = $len;

            /// Wire names, in positional order
            pub const FIELD_NAMES: [&'static str; $len] = [$($wire),+];

            /// Positional view of the record
            pub fn to_array(&self) -> [f64; $len] {
                [$(self.$field),+]
            }

            /// Build a record from positional values
            pub fn from_array(values: [f64; $len]) -> Self {
                let [$($field),+] = values;
                Self { $($field),+ }
            }
        }

        impl FlatRecord for $name {
            fn field_names() -> &'static [&'static str] {
                &Self::FIELD_NAMES
            }

            fn values(&self) -> Vec<f64> {
                self.to_array().to_vec()
            }

            fn first_non_finite(&self) -> Option<&'static str> {
                $(
                    if !self.$field.is_finite() {
                        return Some($wire);
                    }
                )+
                None
            }
        }
    };
}

frame_record! {
    /// Raw vehicle-bus sample fed to the telemetry engine on every step
    pub struct TelemetryInput [19] {
        /// Pack voltage (V)
        voltage => "Voltage",
        /// Pack current (A, positive = discharge)
        current => "Current",
        /// Vehicle speed (km/h)
        speed => "Speed",
        /// Ride mode selector
        vehicle_mode => "VehicleMode",
        /// State of charge (%)
        soc => "SOC",
        /// Remaining capacity reported by the BMS (Ah)
        bms_rem_cap => "BMSRemCap",
        sub_ride_modes => "Subridemodes",
        /// Motor speed (rpm)
        rpm => "RPM",
        /// Engaged gear (0 = neutral)
        current_gear => "CurrentGear",
        /// Non-zero while the clutch lever is pulled
        clutch_status => "ClutchStatus",
        /// Motor torque (Nm)
        torque => "Torque",
        /// Deceleration reported by the motor controller (m/s²)
        de_acc => "DeAcc",
        /// Longitudinal acceleration (raw accelerometer units)
        ax => "Ax",
        /// Lateral acceleration (raw accelerometer units)
        ay => "Ay",
        /// Vertical acceleration (raw accelerometer units)
        az => "Az",
        motor_switch_status => "motorswitchstatus",
        vic_flag => "VICFlag",
        vacation_mode_off => "Vacationmodeoff",
        /// Non-zero while the right indicator is on
        right_indicator => "RightIndicator",
    }
}

frame_record! {
    /// Derived telemetry produced by the telemetry engine on every step
    pub struct TelemetryOutput [27] {
        /// Highest speed seen this session (km/h)
        current_max_speed => "CurrentMaxSpeed",
        /// Distance over ride duration (km/h)
        current_avg_speed => "CurrentAvgSpeed",
        /// Integrated distance (km)
        distance_travelled => "Current_distancetravelledraw",
        /// Best standstill-to-60 km/h time (s), 0 until measured
        min_time_0_to_60 => "Current_Mintime0to60kmph",
        /// Time spent moving (s)
        ride_duration => "Current_RideDuration",
        /// CO2 attributed to the consumed energy (kg)
        co2 => "CO2cons_current",
        /// Net energy drawn from the pack (kWh)
        energy_kwh => "Current_EnergykWhr",
        /// Energy per distance this ride (Wh/km)
        ride_efficiency => "Current_RideEffWhkm",
        /// Net charge drawn from the pack (Ah)
        ampere_hours => "Amperehour_Calc",
        fall_detect_stationary => "FallDetect_Stationary",
        fall_detect_motion => "FallDetect_Motion",
        g_force => "gForce",
        /// Roll angle (deg, positive = right)
        lean_angle => "LeanAngle",
        /// Eco gauge position (0-100)
        eco_gauge => "Leftguageeff",
        /// Instantaneous pack power (kW)
        power => "power",
        /// Projected range on the remaining charge (km)
        range => "Range",
        range_full_charge => "CTFullcharge",
        eco_range_full_charge => "FullchargeECORange",
        range_25 => "CT25percharge",
        range_50 => "CT50percharge",
        range_75 => "CT75percharge",
        eco_range_25 => "EcoRange25percharge",
        eco_range_50 => "EcoRange50percharge",
        eco_range_75 => "EcoRange75percharge",
        suggested_gear => "SuggestedGear",
        /// Right indicator left on while riding
        right_indicator_flag => "RIndiflag",
        /// Pitch angle (deg, positive = nose up)
        pitch_angle => "pitchangle",
    }
}

frame_record! {
    /// Sample fed to the crash engine on every step
    pub struct CrashInput [4] {
        speed => "Speed",
        current => "Curr",
        /// Lateral acceleration
        ay => "Ay",
        /// Entropy change that counts as a crash
        entropy_diff => "EntropyDiff",
    }
}

frame_record! {
    /// Crash engine output
    pub struct CrashOutput [1] {
        /// 1.0 when a crash is detected, otherwise 0.0
        crash_flag => "CrashFlag",
    }
}

impl CrashOutput {
    pub fn is_crash(&self) -> bool {
        self.crash_flag != 0.0
    }
}

// === Field Masking for Selective Output ===

/// Specifies which fields to include in serialized output
///
/// Matching is case-insensitive against the wire names.
#[derive(Debug, Clone, Default)]
pub struct FieldMask {
    fields: HashSet<String>,
    include_all: bool,
}

impl FieldMask {
    /// Create a mask that includes all fields
    pub fn all() -> Self {
        Self {
            fields: HashSet::new(),
            include_all: true,
        }
    }

    /// Create a mask from a comma-separated list of field names
    pub fn parse(fields: &str) -> Self {
        let fields: HashSet<String> = fields
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            fields,
            include_all: false,
        }
    }

    /// Check if a field should be included
    pub fn includes(&self, field: &str) -> bool {
        self.include_all || self.fields.contains(&field.to_lowercase())
    }

    /// Check if all fields should be included
    pub fn is_all(&self) -> bool {
        self.include_all
    }

    /// Requested names that do not exist in record `R`, sorted
    pub fn unknown_fields<R: FlatRecord>(&self) -> Vec<String> {
        let known: HashSet<String> = R::field_names()
            .iter()
            .map(|name| name.to_lowercase())
            .collect();
        let mut unknown: Vec<String> = self
            .fields
            .iter()
            .filter(|f| !known.contains(*f))
            .cloned()
            .collect();
        unknown.sort();
        unknown
    }

    /// Serialize `record` keeping only the fields this mask includes
    pub fn apply<R: FlatRecord>(&self, record: &R) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, value) in record.named_values() {
            if self.includes(name) {
                map.insert(name.to_string(), serde_json::Value::from(value));
            }
        }
        serde_json::Value::Object(map)
    }
}
