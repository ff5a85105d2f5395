//! Progress simulation
//!
//! Stand-in for real download progress: a timed sequence of random progress
//! increments with a small per-tick failure chance. Randomness and timing sit
//! behind [`TickSource`] and [`Clock`] so runs can be replayed exactly.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::core::config::SimulationConfig;

/// Source of the random decisions taken during a simulated download
pub trait TickSource: Send {
    /// Progress increment for the next tick, within `[min, max]`
    fn next_increment(&mut self, min: u8, max: u8) -> u8;

    /// Whether the current tick fails
    fn should_fail(&mut self, probability: f64) -> bool;

    /// Reported size of a completed item in megabytes, within `[min, max)`
    fn size_mb(&mut self, min: f64, max: f64) -> f64;
}

/// `TickSource` backed by a real RNG
pub struct RandomTickSource<R: Rng + Send = StdRng> {
    rng: R,
}

impl RandomTickSource<StdRng> {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng + Send> RandomTickSource<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> TickSource for RandomTickSource<R> {
    fn next_increment(&mut self, min: u8, max: u8) -> u8 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    fn should_fail(&mut self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        self.rng.gen_bool(probability.min(1.0))
    }

    fn size_mb(&mut self, min: f64, max: f64) -> f64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..max)
    }
}

/// Deterministic `TickSource` replaying a fixed script
///
/// Increments are consumed in order and the last one repeats once the script
/// runs out. Failure decisions are consumed one per `should_fail` call across
/// the whole batch; an exhausted script never fails.
#[derive(Debug, Clone)]
pub struct ScriptedTicks {
    increments: VecDeque<u8>,
    last_increment: u8,
    failures: VecDeque<bool>,
    size_mb: f64,
}

impl ScriptedTicks {
    pub fn new(increments: Vec<u8>) -> Self {
        let last_increment = increments.last().copied().unwrap_or(25);
        Self {
            increments: increments.into(),
            last_increment,
            failures: VecDeque::new(),
            size_mb: 42.0,
        }
    }

    /// Same increment on every tick
    pub fn constant(increment: u8) -> Self {
        Self::new(vec![increment])
    }

    pub fn with_failures(mut self, failures: Vec<bool>) -> Self {
        self.failures = failures.into();
        self
    }

    /// Fail on the `call`-th failure roll (1-based) of the batch
    pub fn fail_on_roll(self, call: usize) -> Self {
        let mut failures = vec![false; call.saturating_sub(1)];
        failures.push(true);
        self.with_failures(failures)
    }

    pub fn with_size(mut self, size_mb: f64) -> Self {
        self.size_mb = size_mb;
        self
    }
}

impl TickSource for ScriptedTicks {
    fn next_increment(&mut self, _min: u8, _max: u8) -> u8 {
        match self.increments.pop_front() {
            Some(increment) => {
                self.last_increment = increment;
                increment
            }
            None => self.last_increment,
        }
    }

    fn should_fail(&mut self, _probability: f64) -> bool {
        self.failures.pop_front().unwrap_or(false)
    }

    fn size_mb(&mut self, _min: f64, _max: f64) -> f64 {
        self.size_mb
    }
}

/// Scheduler for the waits between ticks
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Skips the wait but still yields to the scheduler between ticks
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateClock;

#[async_trait]
impl Clock for ImmediateClock {
    async fn sleep(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}

/// How a simulated download ended
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationOutcome {
    Completed { size: String },
    Failed { message: String },
}

/// Drives one item's simulated download
pub struct ProgressSimulator {
    config: SimulationConfig,
    source: Box<dyn TickSource>,
    clock: Arc<dyn Clock>,
}

impl ProgressSimulator {
    pub fn new(config: SimulationConfig, source: Box<dyn TickSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            source,
            clock,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run one item to a terminal outcome
    ///
    /// `on_progress` sees strictly increasing values ending in 100 on success.
    /// On failure the last reported value is below 100.
    pub async fn run<F>(&mut self, item_id: &str, mut on_progress: F) -> SimulationOutcome
    where
        F: FnMut(u8),
    {
        let tick = self.config.tick_interval();
        let mut progress: u16 = 0;

        self.clock.sleep(self.config.metadata_delay()).await;

        loop {
            self.clock.sleep(tick).await;

            let increment = self
                .source
                .next_increment(self.config.min_increment, self.config.max_increment)
                .max(1);
            progress += u16::from(increment);

            if progress >= 100 {
                on_progress(100);
                let size_mb = self
                    .source
                    .size_mb(self.config.min_size_mb, self.config.max_size_mb);
                return SimulationOutcome::Completed {
                    size: format!("{:.1}MB", size_mb),
                };
            }

            debug!("Item {} progress {}%", item_id, progress);
            on_progress(progress as u8);

            if self.source.should_fail(self.config.failure_probability) {
                return SimulationOutcome::Failed {
                    message: self.config.failure_message.clone(),
                };
            }
        }
    }
}
