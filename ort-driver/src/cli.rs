//! Command line interface

use crate::config::DriverConfig;
use crate::runner::{Model, RecordOptions, RunOptions};
use crate::sinks::{OutputFormat, SinkSpec};
use crate::sources::SourceSpec;
use clap::{Args, Parser, Subcommand};
use ort_core::TimePolicy;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ort-driver", version, about = "Run ride telemetry and crash engines")]
pub struct Cli {
    /// TOML config file (ORT_* environment variables override it)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Feed sources through an engine and write outputs to sinks
    Run(RunArgs),
    /// Write a demo ride to an input recording
    RecordDemo(RecordArgs),
    /// Print the effective configuration as TOML
    PrintConfig,
}

/// Overrides shared by `run` and `record-demo`
#[derive(Debug, Clone, Args)]
pub struct TimelineArgs {
    /// Demo sampling rate (Hz)
    #[arg(long)]
    pub rate_hz: Option<f64>,

    /// Demo ride length (s)
    #[arg(long)]
    pub duration_s: Option<f64>,

    /// Demo noise seed
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Tip the demo vehicle over at this time (s)
    #[arg(long)]
    pub tip_over_s: Option<f64>,
}

impl TimelineArgs {
    fn apply(&self, config: &mut DriverConfig) {
        if let Some(rate_hz) = self.rate_hz {
            config.session.rate_hz = rate_hz;
        }
        if let Some(duration_s) = self.duration_s {
            config.session.duration_s = duration_s;
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[arg(long, value_enum, default_value_t = Model::Telemetry)]
    pub model: Model,

    /// `demo` or a recording path; one session per source
    #[arg(long = "source", default_value = "demo")]
    pub sources: Vec<SourceSpec>,

    /// `stdout`, `file:<path>` or `udp:<host>:<port>`
    #[arg(long = "sink", default_value = "stdout")]
    pub sinks: Vec<SinkSpec>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Comma-separated output fields to keep
    #[arg(long)]
    pub fields: Option<String>,

    /// Pace frames at the sampling rate instead of running flat out
    #[arg(long)]
    pub realtime: bool,

    /// How out-of-order timestamps are handled (reject or clamp)
    #[arg(long)]
    pub time_policy: Option<TimePolicy>,

    #[command(flatten)]
    pub timeline: TimelineArgs,
}

impl RunArgs {
    /// Fold command line overrides into `config` and build run options
    pub fn into_options(self, config: &mut DriverConfig) -> RunOptions {
        self.timeline.apply(config);
        if let Some(policy) = self.time_policy {
            config.session.time_policy = policy;
        }
        RunOptions {
            model: self.model,
            sources: self.sources,
            sinks: self.sinks,
            format: self.format,
            fields: self.fields,
            realtime: self.realtime,
            seed: self.timeline.seed,
            tip_over_s: self.timeline.tip_over_s,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RecordArgs {
    #[arg(long, value_enum, default_value_t = Model::Telemetry)]
    pub model: Model,

    /// Destination (`.zst` compresses); defaults to the output directory
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub timeline: TimelineArgs,
}

impl RecordArgs {
    pub fn into_options(self, config: &mut DriverConfig) -> RecordOptions {
        self.timeline.apply(config);
        RecordOptions {
            model: self.model,
            output: self.output,
            seed: self.timeline.seed,
            tip_over_s: self.timeline.tip_over_s,
        }
    }
}
