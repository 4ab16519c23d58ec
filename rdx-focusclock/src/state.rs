//! The session state exposed to callers and subscribers.
//!
//! A session is always in exactly one of four states. `Running` carries a
//! reference instant rather than an elapsed counter: authoritative elapsed
//! time is `now - start_time`, recomputed on every read.

use std::time::Duration;
use tokio::time::Instant;

/// The state of the engine's single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerState {
    /// No session. Terminal until a new session starts.
    #[default]
    Idle,
    Running(RunningState),
    Paused(PausedState),
    /// The session ran to completion or was force-completed.
    Finished,
}

/// Payload of `TimerState::Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunningState {
    /// Reference instant such that `now - start_time` is the elapsed time.
    /// After a resume or skip this is synthetic rather than the real start.
    pub start_time: Instant,
    pub planned_duration: Duration,
    /// Elapsed time as of the last transition. Display only.
    pub elapsed_hint: Duration,
}

impl RunningState {
    /// Elapsed time at `now`, clamped to `[0, planned_duration]`.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start_time)
            .min(self.planned_duration)
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.planned_duration.saturating_sub(self.elapsed(now))
    }

    /// True once the wall time since `start_time` has reached the planned duration.
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.start_time) >= self.planned_duration
    }
}

/// Payload of `TimerState::Paused`. Elapsed is frozen at the moment of pausing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PausedState {
    pub elapsed: Duration,
    pub planned_duration: Duration,
}

impl PausedState {
    pub fn remaining(&self) -> Duration {
        self.planned_duration.saturating_sub(self.elapsed)
    }
}

impl TimerState {
    /// Time accounted for in the current session.
    ///
    /// `Idle` reports zero; `Finished` carries no payload and also reports zero.
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self {
            TimerState::Idle | TimerState::Finished => Duration::ZERO,
            TimerState::Running(running) => running.elapsed(now),
            TimerState::Paused(paused) => paused.elapsed.min(paused.planned_duration),
        }
    }

    /// `planned - elapsed`, floored at zero. Zero for `Idle` and `Finished`.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self {
            TimerState::Idle | TimerState::Finished => Duration::ZERO,
            TimerState::Running(running) => running.remaining(now),
            TimerState::Paused(paused) => paused.remaining(),
        }
    }

    pub fn planned_duration(&self) -> Option<Duration> {
        match self {
            TimerState::Running(running) => Some(running.planned_duration),
            TimerState::Paused(paused) => Some(paused.planned_duration),
            TimerState::Idle | TimerState::Finished => None,
        }
    }

    /// Fraction of the session completed, in `0.0..=1.0`.
    pub fn progress(&self, now: Instant) -> f64 {
        match self {
            TimerState::Idle => 0.0,
            TimerState::Finished => 1.0,
            TimerState::Running(_) | TimerState::Paused(_) => {
                let planned = self.planned_duration().unwrap_or_default();
                if planned.is_zero() {
                    return 0.0;
                }
                (self.elapsed(now).as_secs_f64() / planned.as_secs_f64()).clamp(0.0, 1.0)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TimerState::Running(_))
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, TimerState::Paused(_))
    }

    /// True for the states that have an active session (`Running` or `Paused`).
    pub fn is_active(&self) -> bool {
        self.is_running() || self.is_paused()
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimerState::Idle => "idle",
            TimerState::Running(_) => "running",
            TimerState::Paused(_) => "paused",
            TimerState::Finished => "finished",
        }
    }
}
