//! Telemetry and crash-detection engines for OpenRideTelemetry

pub mod crash;
pub mod demo;
pub mod params;
pub mod telemetry;

pub use crash::CrashEngine;
pub use demo::DemoRide;
pub use params::{CrashParams, FallParams, GearParams, ParamsError, VehicleParams};
pub use telemetry::TelemetryEngine;
