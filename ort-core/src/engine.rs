//! Engine trait and the owned session handle

use crate::clock::{StepClock, TimePolicy};
use crate::error::EngineError;
use crate::model::FlatRecord;
use serde::{Deserialize, Serialize};

/// A stateful per-timestep estimator
///
/// Implementations hold every value that persists between steps. They do no
/// I/O and never fail inside `step`: the handle validates time and input
/// first, then dispatches.
pub trait Engine: Send {
    type Input: FlatRecord;
    type Output: FlatRecord;

    /// Short model name (e.g. "telemetry", "crash")
    fn name(&self) -> &str;

    /// Check an input frame before it reaches `step`
    ///
    /// The default refuses any non-finite field.
    fn validate(&self, input: &Self::Input) -> Result<(), EngineError> {
        match input.first_non_finite() {
            Some(field) => Err(EngineError::NonFiniteInput { field }),
            None => Ok(()),
        }
    }

    /// Advance state by `dt` seconds to elapsed time `time` and produce an output frame
    fn step(&mut self, dt: f64, time: f64, input: &Self::Input) -> Self::Output;

    /// Return to the construction baseline, keeping parameters
    fn reset(&mut self);
}

/// What a session did, returned when its handle is destroyed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub engine: String,
    pub steps: u64,
    pub last_time: Option<f64>,
}

/// Owner of one engine instance
///
/// The engine state lives on the heap and is released by [`destroy`](Self::destroy)
/// or drop. Handles share nothing with each other.
pub struct EngineHandle<E: Engine> {
    engine: Box<E>,
    clock: StepClock,
    steps: u64,
}

impl<E: Engine + Default> EngineHandle<E> {
    /// Create a handle around a default-configured engine
    pub fn create() -> Self {
        Self::new(E::default())
    }
}

impl<E: Engine> EngineHandle<E> {
    pub fn new(engine: E) -> Self {
        Self::with_policy(engine, TimePolicy::default())
    }

    pub fn with_policy(engine: E, policy: TimePolicy) -> Self {
        Self {
            engine: Box::new(engine),
            clock: StepClock::new(policy),
            steps: 0,
        }
    }

    /// Run one step at elapsed time `time` (seconds)
    ///
    /// Nothing changes when this returns an error.
    pub fn update(&mut self, time: f64, input: &E::Input) -> Result<E::Output, EngineError> {
        let dt = self.clock.peek(time)?;
        self.engine.validate(input)?;
        self.clock.commit(time);
        self.steps += 1;
        let effective_time = self.clock.last_time().unwrap_or(time);
        Ok(self.engine.step(dt, effective_time, input))
    }

    /// Return the engine to its baseline in place
    pub fn reset(&mut self) {
        self.engine.reset();
        self.clock.reset();
        self.steps = 0;
    }

    /// Release the engine and report what the session did
    pub fn destroy(self) -> SessionSummary {
        SessionSummary {
            engine: self.engine.name().to_string(),
            steps: self.steps,
            last_time: self.clock.last_time(),
        }
    }

    pub fn name(&self) -> &str {
        self.engine.name()
    }

    /// Number of accepted steps
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn last_time(&self) -> Option<f64> {
        self.clock.last_time()
    }

    pub fn time_policy(&self) -> TimePolicy {
        self.clock.policy()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: Engine> std::fmt::Debug for EngineHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("engine", &self.engine.name())
            .field("steps", &self.steps)
            .field("clock", &self.clock)
            .finish()
    }
}
