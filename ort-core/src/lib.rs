//! OpenRideTelemetry Core Library
//!
//! This crate provides the frame records, the engine trait and the owned
//! session handle shared by every telemetry model.

pub mod clock;
pub mod engine;
pub mod error;
pub mod model;
pub mod units;

pub use clock::{StepClock, TimePolicy};
pub use engine::{Engine, EngineHandle, SessionSummary};
pub use error::EngineError;
pub use model::{CrashInput, CrashOutput, FieldMask, FlatRecord, TelemetryInput, TelemetryOutput};
