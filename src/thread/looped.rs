//! Self-pacing loop worker.
//!
//! Each iteration measures the wall time since the previous iteration, derives
//! the logical time step from the [`LoopMode`], runs the step callback and then
//! sleeps for whatever remains of the target interval. Overruns start the next
//! iteration immediately; they are counted but never compensated by skipping
//! later iterations.

use crate::sync::{lock_mutex, read_lock};
use crate::thread::wrapper::{StopToken, Worker};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Default interval between iterations.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10);

/// How the logical time step of an iteration is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    /// Always the configured step size, paced to the interval.
    Fixed,
    /// Step size times the number of intervals actually elapsed (rounded,
    /// at least one).
    #[default]
    FixedAdaptive,
    /// The measured wall time since the previous iteration.
    RealTime,
    /// The configured step size without any idle sleep.
    Simulated,
}

/// Timing configuration of a loop. Changes apply from the next iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSettings {
    pub interval: Duration,
    pub step_size: Duration,
    pub mode: LoopMode,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::with_interval(DEFAULT_INTERVAL)
    }
}

impl LoopSettings {
    /// Settings whose logical step equals the interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            step_size: interval,
            mode: LoopMode::default(),
        }
    }

    pub fn mode(mut self, mode: LoopMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn step_size(mut self, step_size: Duration) -> Self {
        self.step_size = step_size;
        self
    }

    /// Logical time step for an iteration that took `wall` since the previous
    /// one.
    pub fn logical_step(&self, wall: Duration) -> Duration {
        match self.mode {
            LoopMode::Fixed | LoopMode::Simulated => self.step_size,
            LoopMode::FixedAdaptive => {
                let taken = self.intervals_taken(wall).round().max(1.0);
                self.step_size.mul_f64(taken)
            }
            LoopMode::RealTime => wall,
        }
    }

    /// How many intervals `wall` spans.
    pub fn intervals_taken(&self, wall: Duration) -> f64 {
        if self.interval.is_zero() {
            1.0
        } else {
            wall.as_secs_f64() / self.interval.as_secs_f64()
        }
    }
}

/// Logical time handed to each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StepTime {
    /// Logical time step of this iteration.
    pub dt: Duration,
    /// Accumulated logical time including this iteration.
    pub total: Duration,
}

impl StepTime {
    pub fn new(dt: Duration, total: Duration) -> Self {
        Self { dt, total }
    }

    pub fn dt_secs(&self) -> f64 {
        self.dt.as_secs_f64()
    }

    pub fn total_secs(&self) -> f64 {
        self.total.as_secs_f64()
    }
}

/// Timing statistics of a loop since its last start.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoopStatistics {
    /// Completed iterations.
    pub rounds: u64,
    /// Time spent in the step callback during the last iteration.
    pub last_round_duration: Duration,
    /// Intervals spanned by the last iteration.
    pub last_intervals_taken: f64,
    pub max_intervals_taken: f64,
    pub mean_intervals_taken: f64,
    /// Iterations whose callback took longer than the interval.
    pub overruns: u64,
    pub started_at: Option<DateTime<Utc>>,
    /// Start of the last iteration, relative to `started_at`.
    pub last_round_start: Option<Duration>,
}

impl LoopStatistics {
    fn started() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    fn record(&mut self, since_start: Duration, busy: Duration, intervals_taken: f64, overrun: bool) {
        self.rounds += 1;
        self.last_round_start = Some(since_start);
        self.last_round_duration = busy;
        self.last_intervals_taken = intervals_taken;
        if intervals_taken > self.max_intervals_taken {
            self.max_intervals_taken = intervals_taken;
        }
        let n = self.rounds as f64;
        self.mean_intervals_taken += (intervals_taken - self.mean_intervals_taken) / n;
        if overrun {
            self.overruns += 1;
        }
    }
}

pub type SharedLoopSettings = Arc<RwLock<LoopSettings>>;
pub type SharedLoopStatistics = Arc<Mutex<LoopStatistics>>;

/// Worker that calls `step` once per iteration until stopped or until
/// `step` breaks.
pub struct LoopedThreadWorker<F> {
    settings: SharedLoopSettings,
    statistics: SharedLoopStatistics,
    step: F,
}

impl<F> LoopedThreadWorker<F>
where
    F: FnMut(StepTime) -> ControlFlow<()> + Send + 'static,
{
    pub fn new(settings: SharedLoopSettings, statistics: SharedLoopStatistics, step: F) -> Self {
        Self {
            settings,
            statistics,
            step,
        }
    }
}

impl<F> Worker for LoopedThreadWorker<F>
where
    F: FnMut(StepTime) -> ControlFlow<()> + Send + 'static,
{
    fn work(&mut self, stop: &StopToken) {
        *lock_mutex(&self.statistics) = LoopStatistics::started();

        let started = Instant::now();
        let mut previous_start: Option<Instant> = None;
        let mut total = Duration::ZERO;

        while !stop.is_stop_requested() {
            let settings = read_lock(&self.settings).clone();
            let round_start = Instant::now();
            let wall = previous_start
                .map(|previous| round_start - previous)
                .unwrap_or(settings.interval);
            previous_start = Some(round_start);

            let intervals_taken = settings.intervals_taken(wall);
            let dt = settings.logical_step(wall);
            total += dt;

            if (self.step)(StepTime::new(dt, total)).is_break() {
                tracing::debug!("Loop step requested exit");
                break;
            }

            let busy = round_start.elapsed();
            let overrun = busy > settings.interval;
            lock_mutex(&self.statistics).record(
                round_start - started,
                busy,
                intervals_taken,
                overrun,
            );

            if settings.mode == LoopMode::Simulated {
                std::thread::yield_now();
            } else if !overrun && stop.sleep(settings.interval - busy) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::wrapper::ThreadWrapper;

    #[test]
    fn test_fixed_step() {
        let settings = LoopSettings::with_interval(Duration::from_millis(10))
            .mode(LoopMode::Fixed)
            .step_size(Duration::from_millis(5));
        assert_eq!(
            settings.logical_step(Duration::from_millis(37)),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_fixed_adaptive_step() {
        let settings = LoopSettings::with_interval(Duration::from_millis(10));
        assert_eq!(settings.mode, LoopMode::FixedAdaptive);
        assert_eq!(
            settings.logical_step(Duration::from_millis(31)),
            Duration::from_millis(30)
        );
        // never less than one step
        assert_eq!(
            settings.logical_step(Duration::from_millis(2)),
            Duration::from_millis(10)
        );
    }

    #[test]
    fn test_real_time_step() {
        let settings =
            LoopSettings::with_interval(Duration::from_millis(10)).mode(LoopMode::RealTime);
        assert_eq!(
            settings.logical_step(Duration::from_millis(13)),
            Duration::from_millis(13)
        );
    }

    #[test]
    fn test_zero_interval() {
        let settings = LoopSettings::with_interval(Duration::ZERO);
        assert_eq!(settings.intervals_taken(Duration::from_millis(3)), 1.0);
    }

    #[test]
    fn test_statistics_mean() {
        let mut stats = LoopStatistics::started();
        stats.record(Duration::ZERO, Duration::from_millis(1), 1.0, false);
        stats.record(Duration::from_millis(10), Duration::from_millis(1), 3.0, true);
        assert_eq!(stats.rounds, 2);
        assert_eq!(stats.max_intervals_taken, 3.0);
        assert!((stats.mean_intervals_taken - 2.0).abs() < 1e-9);
        assert_eq!(stats.overruns, 1);
    }

    #[test]
    fn test_worker_runs_until_break() {
        let settings = Arc::new(RwLock::new(
            LoopSettings::with_interval(Duration::from_millis(1)).mode(LoopMode::Simulated),
        ));
        let statistics = Arc::new(Mutex::new(LoopStatistics::default()));
        let mut seen = Vec::new();
        let (tx, rx) = crossbeam_channel::unbounded();

        let worker = LoopedThreadWorker::new(settings, statistics.clone(), move |time| {
            seen.push(time);
            if seen.len() == 5 {
                let _ = tx.send(seen.clone());
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        let wrapper = ThreadWrapper::new("looped-test");
        wrapper.start(worker);
        let times = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        wrapper.stop();

        assert_eq!(times.len(), 5);
        assert_eq!(times[4].total, Duration::from_millis(5));
        assert_eq!(lock_mutex(&statistics).rounds, 4);
    }
}
