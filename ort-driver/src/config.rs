//! Driver configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `ORT_`-prefixed environment variables (`__` separates nested keys, e.g.
//! `ORT_SESSION__RATE_HZ=20` or `ORT_VEHICLE__BATTERY_CAPACITY_AH=40`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use ort_core::TimePolicy;
use ort_engines::{CrashParams, ParamsError, VehicleParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    Missing(PathBuf),

    #[error("invalid configuration: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("invalid vehicle parameters: {0}")]
    Vehicle(#[source] ParamsError),

    #[error("invalid crash parameters: {0}")]
    Crash(#[source] ParamsError),

    #[error("invalid session settings: {0}")]
    Session(String),
}

/// Everything a run needs besides the command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DriverConfig {
    pub session: SessionDefaults,
    pub vehicle: VehicleParams,
    pub crash: CrashParams,
}

/// Defaults for options the command line may override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    /// Sampling rate for demo sources (Hz)
    pub rate_hz: f64,
    /// Length of a demo ride (s)
    pub duration_s: f64,
    pub time_policy: TimePolicy,
    /// EntropyDiff fed to the crash engine by demo sources
    pub entropy_diff: f64,
    /// Where `record-demo` writes when no path is given
    pub output_dir: PathBuf,
    /// Records buffered per sink before sessions wait
    pub sink_buffer: usize,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            rate_hz: 10.0,
            duration_s: 120.0,
            time_policy: TimePolicy::Reject,
            entropy_diff: 0.15,
            output_dir: default_output_dir(),
            sink_buffer: 1024,
        }
    }
}

/// Per-user data directory, falling back to the system temp directory
pub fn default_output_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("openride-telemetry")
}

impl DriverConfig {
    /// Load defaults, then `path` (if given), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::Missing(path.to_path_buf()));
            }
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("ORT_").split("__"));
        Self::extract(figment)
    }

    /// Defaults overlaid with a TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let figment =
            Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(toml));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        if !(session.rate_hz > 0.0 && session.rate_hz.is_finite()) {
            return Err(ConfigError::Session(format!(
                "rate_hz must be positive (got {})",
                session.rate_hz
            )));
        }
        if !(session.duration_s >= 0.0 && session.duration_s.is_finite()) {
            return Err(ConfigError::Session(format!(
                "duration_s must not be negative (got {})",
                session.duration_s
            )));
        }
        if !session.entropy_diff.is_finite() {
            return Err(ConfigError::Session("entropy_diff must be finite".to_string()));
        }
        if session.sink_buffer == 0 {
            return Err(ConfigError::Session("sink_buffer must be at least 1".to_string()));
        }
        self.vehicle.validate().map_err(ConfigError::Vehicle)?;
        self.crash.validate().map_err(ConfigError::Crash)
    }

    /// Render as TOML, suitable as a starting config file
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ort_core::units::*;

    #[test]
    fn test_defaults_load_without_file() {
        let config = DriverConfig::from_toml_str("").unwrap();
        assert_eq!(config.session.rate_hz, 10.0);
        assert_eq!(config.session.time_policy, TimePolicy::Reject);
        assert_eq!(config.vehicle, VehicleParams::default());
    }

    #[test]
    fn test_toml_overrides_nested_values() {
        let config = DriverConfig::from_toml_str(
            r#"
            [session]
            rate_hz = 25.0
            time_policy = "clamp"

            [vehicle]
            battery_capacity_ah = 40.0
            mode_consumption = [30.0, 45.0]

            [vehicle.fall]
            hold_time = 5.0

            [crash]
            window = 20
            "#,
        )
        .unwrap();
        assert_eq!(config.session.rate_hz, 25.0);
        assert_eq!(config.session.time_policy, TimePolicy::Clamp);
        assert_eq!(config.vehicle.battery_capacity_ah, AmpereHours(40.0));
        assert_eq!(config.vehicle.mode_consumption.len(), 2);
        assert_eq!(config.vehicle.fall.hold_time, Seconds(5.0));
        assert_eq!(config.vehicle.fall.lean_threshold, Degrees(60.0));
        assert_eq!(config.crash.window, 20);
        assert_eq!(config.crash.history, 10);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = DriverConfig::from_toml_str("[session]\nrate_hz = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Session(_)));

        let err = DriverConfig::from_toml_str("[vehicle]\nnominal_voltage = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Vehicle(_)));

        let err = DriverConfig::from_toml_str("[crash]\nthreshold_fraction = 0.7\n").unwrap_err();
        assert!(matches!(err, ConfigError::Crash(_)));
    }

    #[test]
    fn test_type_mismatch_reported() {
        let err = DriverConfig::from_toml_str("[session]\nrate_hz = \"fast\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Figment(_)));
    }

    #[test]
    fn test_missing_file_reported() {
        let path = std::env::temp_dir().join("ort-driver-no-such-config.toml");
        let err = DriverConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_toml_dump_reloads() {
        let mut config = DriverConfig::default();
        config.session.rate_hz = 50.0;
        config.vehicle.gears.count = 5;
        let text = config.to_toml().unwrap();
        let reloaded = DriverConfig::from_toml_str(&text).unwrap();
        assert_eq!(reloaded.session.rate_hz, 50.0);
        assert_eq!(reloaded.vehicle.gears.count, 5);
    }

    #[test]
    fn test_environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "ort.toml",
                r#"
                [session]
                rate_hz = 25.0

                [crash]
                window = 12
                "#,
            )?;
            jail.set_env("ORT_SESSION__RATE_HZ", "40.5");
            jail.set_env("ORT_SESSION__TIME_POLICY", "clamp");
            jail.set_env("ORT_VEHICLE__GEARS__COUNT", "6");

            let config = DriverConfig::load(Some(Path::new("ort.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.session.rate_hz, 40.5);
            assert_eq!(config.session.time_policy, TimePolicy::Clamp);
            assert_eq!(config.vehicle.gears.count, 6);
            assert_eq!(config.crash.window, 12);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_environment_value_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("ORT_SESSION__RATE_HZ", "-3.0");
            let err = DriverConfig::load(None).expect_err("negative rate should be rejected");
            assert!(matches!(err, ConfigError::Session(_)));
            Ok(())
        });
    }
}
