//! OpenRideTelemetry session driver
//!
//! Feeds telemetry and crash engines from demo rides or recordings and fans
//! their outputs out to sinks. Exposed as a library for integration testing.

pub mod cli;
pub mod config;
pub mod runner;
pub mod session;
pub mod sinks;
pub mod sources;
pub mod state;
