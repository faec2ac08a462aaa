//! Session loop
//!
//! A session exclusively owns one engine handle and one input source. It
//! feeds every frame to the engine, forwards the outputs to the sinks and
//! destroys the handle when the source runs dry, a sink closes, or the run is
//! cancelled.

use crate::sinks::OutputRecord;
use crate::sources::FrameSource;
use crate::state::RunState;
use chrono::Utc;
use ort_core::{Engine, EngineHandle, FieldMask, SessionSummary};
use serde::Serialize;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// How a session paces its frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// As fast as the engine and sinks allow
    Unpaced,
    /// One frame per tick at the given rate
    Realtime { rate_hz: f64 },
}

/// Outcome of one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub id: String,
    pub summary: SessionSummary,
    /// Frames the engine refused
    pub rejected: u64,
    /// Records handed to the sinks
    pub published: u64,
    pub cancelled: bool,
    /// Source error that ended the session early
    pub failure: Option<String>,
}

/// Drive `handle` with every frame from `source`
pub async fn run_session<E>(
    id: String,
    mut handle: EngineHandle<E>,
    mut source: Box<dyn FrameSource<E::Input>>,
    mask: FieldMask,
    pacing: Pacing,
    state: RunState,
) -> SessionReport
where
    E: Engine,
{
    info!("Session {} started: {} engine on {}", id, handle.name(), source.describe());

    let mut ticker = match pacing {
        Pacing::Realtime { rate_hz } => {
            let mut ticker = interval(Duration::from_secs_f64(1.0 / rate_hz));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(ticker)
        }
        Pacing::Unpaced => None,
    };

    let mut rejected = 0;
    let mut published = 0;
    let mut cancelled = false;
    let mut failure = None;

    loop {
        if let Some(ticker) = ticker.as_mut() {
            tokio::select! {
                _ = state.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                _ = ticker.tick() => {}
            }
        } else if state.cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let (t, input) = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                error!("Session {} source failed: {:#}", id, e);
                failure = Some(format!("{e:#}"));
                break;
            }
        };

        let output = match handle.update(t, &input) {
            Ok(output) => output,
            Err(e) => {
                warn!("Session {} skipped frame at t={}: {}", id, t, e);
                rejected += 1;
                continue;
            }
        };

        let record = OutputRecord {
            session: id.clone(),
            step: handle.steps(),
            t,
            captured_at: Utc::now(),
            output: mask.apply(&output),
        };
        if !state.outputs.publish(record).await {
            warn!("Session {}: no sink is accepting records, stopping", id);
            break;
        }
        published += 1;

        if published % 1000 == 0 {
            debug!("Session {} published {} records", id, published);
        }
    }

    let summary = handle.destroy();
    info!(
        "Session {} finished: {} steps, last t={:?}, {} rejected{}",
        id,
        summary.steps,
        summary.last_time,
        rejected,
        if cancelled { " (cancelled)" } else { "" }
    );

    SessionReport {
        id,
        summary,
        rejected,
        published,
        cancelled,
        failure,
    }
}
