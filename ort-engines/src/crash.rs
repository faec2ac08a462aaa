//! Crash detection from the entropy of bucketed signal windows
//!
//! Speed, pack current and lateral acceleration are sampled into sliding
//! windows. Every `window` samples a detection pass sorts each window into
//! low, middle and high buckets (relative to that window's own range) and
//! records the bucket counts. Once the bucket history is full, the Shannon
//! entropy of the recent passes is compared with that of the older passes;
//! a jump in either direction larger than `EntropyDiff` raises the flag.
//! The difference only changes on pass steps, but every step with a full
//! history compares it against that step's own `EntropyDiff`.

use crate::params::{CrashParams, ParamsError};
use ort_core::{CrashInput, CrashOutput, Engine};
use std::collections::VecDeque;

/// Bucket counts of one detection pass, summed over all signals
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct BucketCounts {
    lower: usize,
    middle: usize,
    upper: usize,
}

impl BucketCounts {
    fn add(self, other: Self) -> Self {
        Self {
            lower: self.lower + other.lower,
            middle: self.middle + other.middle,
            upper: self.upper + other.upper,
        }
    }
}

/// Sliding window of the most recent samples of one signal
#[derive(Debug, Clone)]
struct SignalWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SignalWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_back();
        }
        self.samples.push_front(value);
    }

    /// Samples below the low threshold and at or above the high threshold
    fn extremes(&self, fraction: f64) -> (usize, usize) {
        let min = self.samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        let low = min + fraction * range;
        let high = max - fraction * range;
        let lower = self.samples.iter().filter(|&&v| v < low).count();
        let upper = self.samples.iter().filter(|&&v| v >= high).count();
        (lower, upper)
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Entropy (log10) of a bucket distribution, with 0·log 0 = 0
fn entropy(counts: BucketCounts, total: f64) -> f64 {
    [counts.lower, counts.middle, counts.upper]
        .into_iter()
        .map(|c| c as f64 / total)
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.log10())
        .sum()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub struct CrashEngine {
    params: CrashParams,
    speed: SignalWindow,
    current: SignalWindow,
    lateral: SignalWindow,
    since_pass: usize,
    /// Newest pass first
    history: VecDeque<BucketCounts>,
    /// Set once the history first fills
    entropy_diff: Option<f64>,
}

impl CrashEngine {
    pub fn new(params: CrashParams) -> Result<Self, ParamsError> {
        params.validate()?;
        Ok(Self::with_valid_params(params))
    }

    fn with_valid_params(params: CrashParams) -> Self {
        let window = params.window;
        Self {
            speed: SignalWindow::new(window),
            current: SignalWindow::new(window),
            lateral: SignalWindow::new(window),
            since_pass: 0,
            history: VecDeque::with_capacity(params.history),
            entropy_diff: None,
            params,
        }
    }

    pub fn params(&self) -> &CrashParams {
        &self.params
    }

    /// Recent minus older entropy from the latest pass (zero until the history fills)
    pub fn last_entropy_diff(&self) -> f64 {
        self.entropy_diff.unwrap_or(0.0)
    }

    fn detection_pass(&mut self) -> BucketCounts {
        let fraction = self.params.threshold_fraction;
        let mut lower = 0;
        let mut upper = 0;
        for window in [&self.speed, &self.current, &self.lateral] {
            let (l, u) = window.extremes(fraction);
            lower += l;
            upper += u;
        }
        let per_pass = 3 * self.params.window;
        BucketCounts {
            lower,
            upper,
            middle: per_pass.saturating_sub(lower + upper),
        }
    }

    fn entropy_diff(&self) -> f64 {
        let span = self.params.entropy_span;
        let total = (span * 3 * self.params.window) as f64;
        let history: Vec<BucketCounts> = self.history.iter().copied().collect();
        let estimates: Vec<f64> = history
            .windows(span)
            .map(|passes| {
                let summed = passes
                    .iter()
                    .copied()
                    .fold(BucketCounts::default(), BucketCounts::add);
                entropy(summed, total)
            })
            .collect();
        let half = estimates.len() / 2;
        let (recent, older) = estimates.split_at(half);
        mean(recent) - mean(&older[..half.min(older.len())])
    }
}

impl Default for CrashEngine {
    fn default() -> Self {
        Self::with_valid_params(CrashParams::default())
    }
}

impl Engine for CrashEngine {
    type Input = CrashInput;
    type Output = CrashOutput;

    fn name(&self) -> &str {
        "crash"
    }

    fn step(&mut self, _dt: f64, _time: f64, input: &CrashInput) -> CrashOutput {
        self.speed.push(input.speed);
        self.current.push(input.current);
        self.lateral.push(input.ay);
        self.since_pass += 1;

        if self.since_pass >= self.params.window {
            self.since_pass = 0;
            let counts = self.detection_pass();
            if self.history.len() == self.params.history {
                self.history.pop_back();
            }
            self.history.push_front(counts);

            if self.history.len() == self.params.history {
                self.entropy_diff = Some(self.entropy_diff());
            }
        }

        let threshold = input.entropy_diff;
        let crash = self
            .entropy_diff
            .is_some_and(|diff| diff > threshold || diff < -threshold);
        CrashOutput {
            crash_flag: if crash { 1.0 } else { 0.0 },
        }
    }

    fn reset(&mut self) {
        self.speed.clear();
        self.current.clear();
        self.lateral.clear();
        self.since_pass = 0;
        self.history.clear();
        self.entropy_diff = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp_window(engine: &mut CrashEngine) {
        for i in 0..10 {
            let v = i as f64;
            engine.step(0.1, 0.0, &CrashInput {
                speed: v,
                current: v,
                ay: v,
                entropy_diff: 0.1,
            });
        }
    }

    #[test]
    fn test_extremes_of_ramp() {
        let mut window = SignalWindow::new(10);
        for i in 0..10 {
            window.push(i as f64);
        }
        assert_eq!(window.extremes(0.33), (3, 3));
    }

    #[test]
    fn test_extremes_of_constant_signal_land_high() {
        let mut window = SignalWindow::new(10);
        for _ in 0..10 {
            window.push(4.2);
        }
        assert_eq!(window.extremes(0.33), (0, 10));
    }

    #[test]
    fn test_window_keeps_latest_samples() {
        let mut window = SignalWindow::new(3);
        for i in 0..5 {
            window.push(i as f64);
        }
        let kept: Vec<f64> = window.samples.iter().copied().collect();
        assert_eq!(kept, vec![4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_entropy_of_uniform_and_degenerate() {
        let uniform = BucketCounts {
            lower: 50,
            middle: 50,
            upper: 50,
        };
        assert_relative_eq!(entropy(uniform, 150.0), 3f64.log10(), epsilon = 1e-12);
        let single = BucketCounts {
            lower: 0,
            middle: 0,
            upper: 150,
        };
        assert_eq!(entropy(single, 150.0), 0.0);
    }

    #[test]
    fn test_detection_pass_counts() {
        let mut engine = CrashEngine::default();
        ramp_window(&mut engine);
        assert_eq!(
            engine.history.front().copied(),
            Some(BucketCounts {
                lower: 9,
                middle: 12,
                upper: 9
            })
        );
    }

    #[test]
    fn test_no_evaluation_before_history_full() {
        let mut engine = CrashEngine::default();
        for _ in 0..9 {
            ramp_window(&mut engine);
        }
        assert_eq!(engine.history.len(), 9);
        assert_eq!(engine.last_entropy_diff(), 0.0);
    }

    #[test]
    fn test_steady_pattern_has_zero_entropy_diff() {
        let mut engine = CrashEngine::default();
        for _ in 0..12 {
            ramp_window(&mut engine);
        }
        assert_eq!(engine.entropy_diff, Some(0.0));
    }

    #[test]
    fn test_reset_clears_windows_and_flag() {
        let mut engine = CrashEngine::default();
        for _ in 0..10 {
            ramp_window(&mut engine);
        }
        engine.entropy_diff = Some(1.0);
        engine.reset();
        assert!(engine.history.is_empty());
        assert!(engine.speed.samples.is_empty());
        let out = engine.step(0.0, 0.0, &CrashInput::default());
        assert!(!out.is_crash());
    }

    #[test]
    fn test_threshold_applies_on_every_step() {
        let mut engine = CrashEngine::default();
        for _ in 0..10 {
            ramp_window(&mut engine);
        }
        engine.entropy_diff = Some(0.2);
        // nine samples short of the next pass
        let mut flags = Vec::new();
        for threshold in [0.5, 0.1, 0.5, -0.3] {
            let out = engine.step(0.1, 0.0, &CrashInput {
                entropy_diff: threshold,
                ..Default::default()
            });
            flags.push(out.crash_flag);
        }
        assert_eq!(engine.since_pass, 4);
        assert_eq!(flags, vec![0.0, 1.0, 0.0, 1.0]);
    }
}
