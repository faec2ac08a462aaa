//! Run orchestration: sinks, sessions and shutdown

use crate::config::DriverConfig;
use crate::session::{run_session, Pacing, SessionReport};
use crate::sinks::{create_sink, OutputFormat, SinkSpec};
use crate::sources::{open_source, write_recording, DemoSample, FrameSource, SourceSpec};
use crate::state::{OutputHub, RunState};
use anyhow::{bail, Context, Result};
use ort_core::{
    CrashOutput, Engine, EngineHandle, FieldMask, FlatRecord, TelemetryOutput, TimePolicy,
};
use ort_engines::{CrashEngine, DemoRide, ParamsError, TelemetryEngine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Which engine a run drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    #[default]
    Telemetry,
    Crash,
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telemetry => f.write_str("telemetry"),
            Self::Crash => f.write_str("crash"),
        }
    }
}

/// Everything `run` needs from the command line
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub model: Model,
    pub sources: Vec<SourceSpec>,
    pub sinks: Vec<SinkSpec>,
    pub format: OutputFormat,
    /// Comma-separated output field names; all fields when absent
    pub fields: Option<String>,
    pub realtime: bool,
    /// First demo seed; session `i` uses `seed + i`
    pub seed: u64,
    /// Tip the demo ride over at this time (s)
    pub tip_over_s: Option<f64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            model: Model::Telemetry,
            sources: vec![SourceSpec::Demo],
            sinks: vec![SinkSpec::Stdout],
            format: OutputFormat::Json,
            fields: None,
            realtime: false,
            seed: 0,
            tip_over_s: None,
        }
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub sessions: Vec<SessionReport>,
    /// Records written per sink, in sink order
    pub written: Vec<(String, u64)>,
}

impl RunReport {
    pub fn total_steps(&self) -> u64 {
        self.sessions.iter().map(|s| s.summary.steps).sum()
    }
}

fn demo_ride(options: &RunOptions, index: usize) -> DemoRide {
    let ride = DemoRide::new().with_seed(options.seed + index as u64);
    match options.tip_over_s {
        Some(at) => ride.with_tip_over(at),
        None => ride,
    }
}

fn field_mask<R: FlatRecord>(fields: Option<&str>) -> FieldMask {
    let Some(fields) = fields else {
        return FieldMask::all();
    };
    let mask = FieldMask::parse(fields);
    let unknown = mask.unknown_fields::<R>();
    if !unknown.is_empty() {
        warn!("Ignoring unknown output fields: {}", unknown.join(", "));
    }
    mask
}

/// Run one session per source until every source is exhausted or `cancel` fires
pub async fn run(
    options: RunOptions,
    config: DriverConfig,
    cancel: CancellationToken,
) -> Result<RunReport> {
    if options.sources.is_empty() {
        bail!("at least one source is required");
    }
    if options.sinks.is_empty() {
        bail!("at least one sink is required");
    }

    let mut hub = OutputHub::default();
    let mut writers = Vec::new();
    for spec in &options.sinks {
        let sink = create_sink(spec, options.format)
            .with_context(|| format!("failed to create sink {spec}"))?;
        let writer = hub.attach(spec.to_string(), sink, config.session.sink_buffer);
        writers.push((spec.to_string(), writer));
    }

    let state = RunState::new(config, cancel, hub);
    let sessions = match options.model {
        Model::Telemetry => {
            let mask = field_mask::<TelemetryOutput>(options.fields.as_deref());
            spawn_sessions(&options, &state, mask, |config| {
                TelemetryEngine::new(config.vehicle.clone())
            })
        }
        Model::Crash => {
            let mask = field_mask::<CrashOutput>(options.fields.as_deref());
            spawn_sessions(&options, &state, mask, |config| {
                CrashEngine::new(config.crash.clone())
            })
        }
    };
    // sink channels close once the last session drops its state
    drop(state);

    let sessions = match sessions {
        Ok(sessions) => collect_sessions(sessions).await,
        Err(e) => {
            for (_, writer) in writers {
                writer.abort();
            }
            return Err(e);
        }
    };

    let mut written = Vec::new();
    for (name, writer) in writers {
        match writer.await {
            Ok(count) => written.push((name, count)),
            Err(e) => {
                error!("Sink task {} failed: {}", name, e);
                written.push((name, 0));
            }
        }
    }

    Ok(RunReport { sessions, written })
}

/// Open every source up front, then start one task per session
fn spawn_sessions<E, F>(
    options: &RunOptions,
    state: &RunState,
    mask: FieldMask,
    make_engine: F,
) -> Result<JoinSet<SessionReport>>
where
    E: Engine + 'static,
    E::Input: DemoSample + DeserializeOwned + Send + 'static,
    E::Output: Send,
    F: Fn(&DriverConfig) -> Result<E, ParamsError>,
{
    let policy: TimePolicy = state.config.session.time_policy;
    let mut opened: Vec<(Box<dyn FrameSource<E::Input>>, EngineHandle<E>)> = Vec::new();
    for (index, spec) in options.sources.iter().enumerate() {
        let source = open_source(spec, demo_ride(options, index), &state.config)
            .with_context(|| format!("failed to open source {spec}"))?;
        let engine = make_engine(&state.config)
            .with_context(|| format!("invalid {} parameters", options.model))?;
        opened.push((source, EngineHandle::with_policy(engine, policy)));
    }

    let pacing = if options.realtime {
        Pacing::Realtime {
            rate_hz: state.config.session.rate_hz,
        }
    } else {
        Pacing::Unpaced
    };

    let mut tasks = JoinSet::new();
    for (index, (source, handle)) in opened.into_iter().enumerate() {
        let id = format!("{}-{}", options.model, index);
        tasks.spawn(run_session(
            id,
            handle,
            source,
            mask.clone(),
            pacing,
            state.clone(),
        ));
    }
    info!(
        "Started {} {} session(s) with {} sink(s)",
        tasks.len(),
        options.model,
        state.outputs.sink_count()
    );
    Ok(tasks)
}

async fn collect_sessions(mut tasks: JoinSet<SessionReport>) -> Vec<SessionReport> {
    let mut reports = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => error!("Session task failed: {}", e),
        }
    }
    reports.sort_by(|a, b| a.id.cmp(&b.id));
    reports
}

/// Options for writing a demo recording
#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub model: Model,
    /// Destination; a timestamped file in the output directory when absent
    pub output: Option<PathBuf>,
    pub seed: u64,
    pub tip_over_s: Option<f64>,
}

/// Default recording path inside `dir`
pub fn default_recording_path(dir: &Path, model: Model) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    dir.join("recordings")
        .join(format!("{model}-demo-{stamp}.ndjson.zst"))
}

/// Write a demo ride as an input recording; returns the path and frame count
pub fn record_demo(options: &RecordOptions, config: &DriverConfig) -> Result<(PathBuf, usize)> {
    let path = options
        .output
        .clone()
        .unwrap_or_else(|| default_recording_path(&config.session.output_dir, options.model));

    let mut ride = DemoRide::new().with_seed(options.seed);
    if let Some(at) = options.tip_over_s {
        ride = ride.with_tip_over(at);
    }
    let times = DemoRide::timeline(config.session.rate_hz, config.session.duration_s);
    let count = match options.model {
        Model::Telemetry => write_recording(&path, times.map(|t| (t, ride.telemetry_at(t))))?,
        Model::Crash => write_recording(
            &path,
            times.map(|t| (t, ride.crash_at(t, config.session.entropy_diff))),
        )?,
    };
    info!("Recorded {} demo frames to {}", count, path.display());
    Ok((path, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_display_matches_cli_names() {
        assert_eq!(Model::Telemetry.to_string(), "telemetry");
        assert_eq!(Model::Crash.to_string(), "crash");
    }

    #[test]
    fn test_default_recording_path_is_compressed() {
        let path = default_recording_path(Path::new("/data"), Model::Crash);
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("crash-demo-"));
        assert!(name.ends_with(".ndjson.zst"));
        assert!(path.starts_with("/data/recordings"));
    }

    #[test]
    fn test_field_mask_defaults_to_all() {
        assert!(field_mask::<CrashOutput>(None).is_all());
        let mask = field_mask::<TelemetryOutput>(Some("Range,power"));
        assert!(mask.includes("range"));
        assert!(!mask.is_all());
    }
}
