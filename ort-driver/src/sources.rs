//! Input frame sources for sessions
//!
//! A source yields `(elapsed time, input frame)` pairs until it runs dry.
//! Two kinds exist: the synthetic demo ride and recorded NDJSON files
//! (`{"t": ..., "input": {...}}` per line, zstd-compressed when the file name
//! ends in `.zst`).

use crate::config::DriverConfig;
use anyhow::{Context, Result};
use ort_core::{CrashInput, FlatRecord, TelemetryInput};
use ort_engines::DemoRide;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// One line of a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame<I> {
    pub t: f64,
    pub input: I,
}

/// Where a session takes its input from
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    Demo,
    Recording(PathBuf),
}

impl FromStr for SourceSpec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "demo" => Self::Demo,
            path => Self::Recording(PathBuf::from(path)),
        })
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Demo => f.write_str("demo"),
            Self::Recording(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Trait for anything that feeds frames to a session
pub trait FrameSource<I>: Send {
    /// Short description for logs
    fn describe(&self) -> String;

    /// Next frame, or `Ok(None)` when the source is exhausted
    fn next_frame(&mut self) -> Result<Option<(f64, I)>>;
}

/// Input frames the demo ride can produce
pub trait DemoSample: Sized {
    fn sample(ride: &DemoRide, t: f64, config: &DriverConfig) -> Self;
}

impl DemoSample for TelemetryInput {
    fn sample(ride: &DemoRide, t: f64, _config: &DriverConfig) -> Self {
        ride.telemetry_at(t)
    }
}

impl DemoSample for CrashInput {
    fn sample(ride: &DemoRide, t: f64, config: &DriverConfig) -> Self {
        ride.crash_at(t, config.session.entropy_diff)
    }
}

/// Demo ride sampled at a fixed rate
pub struct DemoSource {
    ride: DemoRide,
    times: Vec<f64>,
    next: usize,
    config: DriverConfig,
}

impl DemoSource {
    pub fn new(ride: DemoRide, config: &DriverConfig) -> Self {
        let times = DemoRide::timeline(config.session.rate_hz, config.session.duration_s).collect();
        Self {
            ride,
            times,
            next: 0,
            config: config.clone(),
        }
    }

    /// Number of frames this source will yield
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

impl<I: DemoSample> FrameSource<I> for DemoSource {
    fn describe(&self) -> String {
        format!(
            "demo ride ({} frames at {} Hz)",
            self.times.len(),
            self.config.session.rate_hz
        )
    }

    fn next_frame(&mut self) -> Result<Option<(f64, I)>> {
        let Some(&t) = self.times.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        Ok(Some((t, I::sample(&self.ride, t, &self.config))))
    }
}

fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

/// NDJSON recording read line by line
pub struct RecordingSource {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    line_number: usize,
    line: String,
}

impl RecordingSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open recording {}", path.display()))?;
        let reader: Box<dyn BufRead + Send> = if is_compressed(path) {
            let decoder = zstd::Decoder::new(file)
                .with_context(|| format!("failed to start zstd decoder for {}", path.display()))?;
            Box::new(BufReader::new(decoder))
        } else {
            Box::new(BufReader::new(file))
        };
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            line_number: 0,
            line: String::new(),
        })
    }
}

impl<I: DeserializeOwned> FrameSource<I> for RecordingSource {
    fn describe(&self) -> String {
        format!("recording {}", self.path.display())
    }

    fn next_frame(&mut self) -> Result<Option<(f64, I)>> {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .with_context(|| format!("failed to read {}", self.path.display()))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }
            let frame: RecordedFrame<I> = serde_json::from_str(line).with_context(|| {
                format!("{}:{}: malformed frame", self.path.display(), self.line_number)
            })?;
            return Ok(Some((frame.t, frame.input)));
        }
    }
}

/// Open a source for input frames of type `I`
///
/// `ride` is only used when `spec` is the demo source.
pub fn open_source<I>(
    spec: &SourceSpec,
    ride: DemoRide,
    config: &DriverConfig,
) -> Result<Box<dyn FrameSource<I>>>
where
    I: DemoSample + DeserializeOwned + 'static,
{
    match spec {
        SourceSpec::Demo => Ok(Box::new(DemoSource::new(ride, config))),
        SourceSpec::Recording(path) => Ok(Box::new(RecordingSource::open(path)?)),
    }
}

/// Write frames as an NDJSON recording, compressed if `path` ends in `.zst`
///
/// Returns the number of frames written.
pub fn write_recording<I, F>(path: &Path, frames: F) -> Result<usize>
where
    I: FlatRecord,
    F: IntoIterator<Item = (f64, I)>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;

    if is_compressed(path) {
        let mut encoder = zstd::Encoder::new(file, 3)?;
        let count = write_frames(&mut encoder, frames)?;
        encoder.finish()?.flush()?;
        Ok(count)
    } else {
        let mut writer = BufWriter::new(file);
        let count = write_frames(&mut writer, frames)?;
        writer.flush()?;
        Ok(count)
    }
}

fn write_frames<W, I, F>(writer: &mut W, frames: F) -> Result<usize>
where
    W: Write,
    I: FlatRecord,
    F: IntoIterator<Item = (f64, I)>,
{
    let mut count = 0;
    for (t, input) in frames {
        serde_json::to_writer(&mut *writer, &RecordedFrame { t, input })?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    Ok(count)
}
