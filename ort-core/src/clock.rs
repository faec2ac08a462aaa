//! Elapsed-time bookkeeping for one session

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do when a caller supplies an elapsed time earlier than the last one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePolicy {
    /// Refuse the step with [`EngineError::NonMonotonicTime`]
    #[default]
    Reject,
    /// Run the step with `dt = 0` and keep the latest time seen
    Clamp,
}

impl FromStr for TimePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "clamp" => Ok(Self::Clamp),
            other => Err(format!("unknown time policy '{other}' (expected reject or clamp)")),
        }
    }
}

impl fmt::Display for TimePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => f.write_str("reject"),
            Self::Clamp => f.write_str("clamp"),
        }
    }
}

/// Tracks the previous elapsed time and hands out step deltas
///
/// The first accepted time produces `dt = 0`.
#[derive(Debug, Clone, Default)]
pub struct StepClock {
    policy: TimePolicy,
    last: Option<f64>,
}

impl StepClock {
    pub fn new(policy: TimePolicy) -> Self {
        Self { policy, last: None }
    }

    pub fn policy(&self) -> TimePolicy {
        self.policy
    }

    /// Latest accepted elapsed time, if any step has run
    pub fn last_time(&self) -> Option<f64> {
        self.last
    }

    /// Compute the delta for `time` without advancing the clock
    pub fn peek(&self, time: f64) -> Result<f64, EngineError> {
        if !time.is_finite() {
            return Err(EngineError::NonFiniteTime(time));
        }
        let Some(previous) = self.last else {
            return Ok(0.0);
        };
        if time >= previous {
            return Ok(time - previous);
        }
        match self.policy {
            TimePolicy::Reject => Err(EngineError::NonMonotonicTime {
                previous,
                current: time,
            }),
            TimePolicy::Clamp => Ok(0.0),
        }
    }

    /// Accept `time` and return the delta since the previous accepted time
    ///
    /// On error the clock is unchanged.
    pub fn advance(&mut self, time: f64) -> Result<f64, EngineError> {
        let dt = self.peek(time)?;
        self.commit(time);
        Ok(dt)
    }

    /// Record `time` as seen; the clock never moves backwards
    pub fn commit(&mut self, time: f64) {
        self.last = Some(match self.last {
            Some(previous) => previous.max(time),
            None => time,
        });
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
