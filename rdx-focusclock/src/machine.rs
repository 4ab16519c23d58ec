//! Pure transition logic for the session state machine.
//!
//! `transition` takes the current state, a command and the current instant,
//! and returns the next state. It performs no I/O and never fails: a command
//! with no meaning in the current state returns the state unchanged.
//!
//! ## State Transitions
//!
//! ```text
//!            start            pause
//! Idle ───────────────► Running ◄────► Paused
//!  ▲                     │   ▲ resume    │
//!  │ stop                │   │           │ skip/finish
//!  └─────────────────────┤   │           ▼
//!                        └───┴──────► Finished
//!                     tick/skip/finish
//! ```
//!
//! `start` is accepted from every state and discards any prior session.

use crate::state::{PausedState, RunningState, TimerState};
use std::time::Duration;
use tokio::time::Instant;

/// A request to change the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin a new session of the given planned duration.
    Start(Duration),
    Pause,
    Resume,
    /// Abandon the session and return to `Idle`.
    Stop,
    /// Advance the session by the given amount.
    Skip(Duration),
    /// Complete the session immediately.
    Finish,
    /// Periodic re-evaluation issued by the tick scheduler.
    Tick,
}

impl Command {
    /// True for commands that open a fresh `Running` period.
    pub fn opens_run(&self) -> bool {
        matches!(self, Command::Start(_) | Command::Resume)
    }

    pub fn opens_session(&self) -> bool {
        matches!(self, Command::Start(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Start(_) => "start",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop => "stop",
            Command::Skip(_) => "skip",
            Command::Finish => "finish",
            Command::Tick => "tick",
        }
    }
}

/// Record of one command applied by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Sequence number of the session this transition belongs to. Assigned by
    /// the engine: every `Start` that changes the state opens a new one, zero
    /// means none has started.
    pub session: u64,
    pub command: Command,
    pub from: TimerState,
    pub to: TimerState,
    /// The instant the command was evaluated at.
    pub at: Instant,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// Elapsed time of the session being left, measured at the transition instant.
    pub fn elapsed_before(&self) -> Duration {
        self.from.elapsed(self.at)
    }

    pub fn remaining_after(&self) -> Duration {
        self.to.remaining(self.at)
    }
}

/// Computes the next state.
///
/// A zero `Start` duration finishes the session at once rather than running a
/// session that can never report remaining time.
pub fn transition(state: &TimerState, command: &Command, now: Instant) -> TimerState {
    match (*command, *state) {
        (Command::Start(planned), _) => {
            if planned.is_zero() {
                TimerState::Finished
            } else {
                TimerState::Running(RunningState {
                    start_time: now,
                    planned_duration: planned,
                    elapsed_hint: Duration::ZERO,
                })
            }
        }

        (Command::Pause, TimerState::Running(running)) => TimerState::Paused(PausedState {
            elapsed: running.elapsed(now),
            planned_duration: running.planned_duration,
        }),

        (Command::Resume, TimerState::Paused(paused)) => {
            let elapsed = paused.elapsed.min(paused.planned_duration);
            TimerState::Running(RunningState {
                start_time: synthetic_start(now, elapsed),
                planned_duration: paused.planned_duration,
                elapsed_hint: elapsed,
            })
        }

        (Command::Stop, TimerState::Running(_) | TimerState::Paused(_)) => TimerState::Idle,

        (Command::Skip(by), _) if by.is_zero() => *state,
        (Command::Skip(by), TimerState::Running(running)) => {
            let planned = running.planned_duration;
            let advanced = running.elapsed(now).saturating_add(by).min(planned);
            if advanced >= planned {
                TimerState::Finished
            } else {
                TimerState::Running(RunningState {
                    start_time: synthetic_start(now, advanced),
                    planned_duration: planned,
                    elapsed_hint: advanced,
                })
            }
        }
        (Command::Skip(by), TimerState::Paused(paused)) => {
            let planned = paused.planned_duration;
            let advanced = paused.elapsed.saturating_add(by).min(planned);
            if advanced >= planned {
                TimerState::Finished
            } else {
                TimerState::Paused(PausedState {
                    elapsed: advanced,
                    planned_duration: planned,
                })
            }
        }

        (Command::Finish, TimerState::Running(_) | TimerState::Paused(_)) => TimerState::Finished,

        (Command::Tick, TimerState::Running(running)) => {
            if running.is_due(now) {
                TimerState::Finished
            } else {
                TimerState::Running(RunningState {
                    elapsed_hint: running.elapsed(now),
                    ..running
                })
            }
        }

        (
            Command::Pause
            | Command::Resume
            | Command::Stop
            | Command::Skip(_)
            | Command::Finish
            | Command::Tick,
            _,
        ) => *state,
    }
}

/// The instant `elapsed` before `now`, so that `now - start` reproduces `elapsed`.
fn synthetic_start(now: Instant, elapsed: Duration) -> Instant {
    // Only fails when `elapsed` reaches back past the platform's clock origin.
    now.checked_sub(elapsed).unwrap_or_else(|| {
        tracing::warn!(?elapsed, "monotonic clock cannot represent synthetic start; clamping");
        now
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Clock, ManualClock};

    const PLANNED: Duration = Duration::from_secs(60);

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn started(clock: &ManualClock, planned: Duration) -> TimerState {
        transition(&TimerState::Idle, &Command::Start(planned), clock.now())
    }

    fn paused_at(elapsed: Duration) -> TimerState {
        TimerState::Paused(PausedState {
            elapsed,
            planned_duration: PLANNED,
        })
    }

    #[test]
    fn start_runs_from_now() {
        let clock = ManualClock::new();
        let state = started(&clock, PLANNED);
        match state {
            TimerState::Running(running) => {
                assert_eq!(running.start_time, clock.now());
                assert_eq!(running.planned_duration, PLANNED);
                assert_eq!(running.elapsed_hint, Duration::ZERO);
            }
            other => panic!("expected running, got {:?}", other),
        }
    }

    #[test]
    fn start_with_zero_duration_finishes_immediately() {
        let clock = ManualClock::new();
        assert_eq!(started(&clock, Duration::ZERO), TimerState::Finished);
    }

    #[test]
    fn start_replaces_any_existing_session() {
        let clock = ManualClock::new();
        let first = started(&clock, PLANNED);
        clock.advance(secs(10));
        let second = transition(&first, &Command::Start(secs(120)), clock.now());
        assert_eq!(second.planned_duration(), Some(secs(120)));
        assert_eq!(second.elapsed(clock.now()), Duration::ZERO);

        for prior in [paused_at(secs(5)), TimerState::Finished] {
            let next = transition(&prior, &Command::Start(secs(30)), clock.now());
            assert!(next.is_running());
        }
    }

    #[test]
    fn pause_freezes_elapsed() {
        let clock = ManualClock::new();
        let running = started(&clock, PLANNED);
        clock.advance(Duration::from_millis(500));
        let paused = transition(&running, &Command::Pause, clock.now());
        assert_eq!(paused, paused_at(Duration::from_millis(500)));

        clock.advance(secs(30));
        assert_eq!(paused.remaining(clock.now()), Duration::from_millis(59_500));
    }

    #[test]
    fn pause_clamps_elapsed_to_planned() {
        let clock = ManualClock::new();
        let running = started(&clock, secs(10));
        clock.advance(secs(12));
        let paused = transition(&running, &Command::Pause, clock.now());
        assert_eq!(
            paused,
            TimerState::Paused(PausedState {
                elapsed: secs(10),
                planned_duration: secs(10),
            })
        );
    }

    #[test]
    fn resume_synthesizes_start_time() {
        let clock = ManualClock::new();
        let paused = paused_at(Duration::from_millis(300));
        clock.advance(secs(5));
        let resumed = transition(&paused, &Command::Resume, clock.now());
        match resumed {
            TimerState::Running(running) => {
                assert_eq!(running.elapsed_hint, Duration::from_millis(300));
                assert_eq!(running.start_time + Duration::from_millis(300), clock.now());
            }
            other => panic!("expected running, got {:?}", other),
        }

        clock.advance(Duration::from_millis(300));
        assert_eq!(resumed.elapsed(clock.now()), Duration::from_millis(600));
    }

    #[test]
    fn repeated_pause_resume_cycles_do_not_drift() {
        let clock = ManualClock::new();
        let mut state = started(&clock, PLANNED);
        for _ in 0..50 {
            clock.advance(Duration::from_millis(100));
            state = transition(&state, &Command::Pause, clock.now());
            clock.advance(secs(3));
            state = transition(&state, &Command::Resume, clock.now());
        }
        assert_eq!(state.elapsed(clock.now()), secs(5));
    }

    #[test]
    fn stop_returns_to_idle_only_from_active_states() {
        let clock = ManualClock::new();
        let running = started(&clock, PLANNED);
        assert_eq!(transition(&running, &Command::Stop, clock.now()), TimerState::Idle);
        assert_eq!(
            transition(&paused_at(secs(1)), &Command::Stop, clock.now()),
            TimerState::Idle
        );
        assert_eq!(
            transition(&TimerState::Finished, &Command::Stop, clock.now()),
            TimerState::Finished
        );
    }

    #[test]
    fn skip_advances_running_elapsed_exactly() {
        let clock = ManualClock::new();
        let running = started(&clock, PLANNED);
        clock.advance(secs(10));
        let skipped = transition(&running, &Command::Skip(secs(30)), clock.now());
        assert!(skipped.is_running());
        assert_eq!(skipped.elapsed(clock.now()), secs(40));
    }

    #[test]
    fn skip_past_planned_finishes() {
        let clock = ManualClock::new();
        let running = started(&clock, PLANNED);
        assert_eq!(
            transition(&running, &Command::Skip(secs(90)), clock.now()),
            TimerState::Finished
        );
        // Landing exactly on the planned duration also finishes.
        assert_eq!(
            transition(&running, &Command::Skip(PLANNED), clock.now()),
            TimerState::Finished
        );
    }

    #[test]
    fn skip_on_paused_stays_paused() {
        let clock = ManualClock::new();
        let skipped = transition(&paused_at(secs(20)), &Command::Skip(secs(15)), clock.now());
        assert_eq!(skipped, paused_at(secs(35)));
        assert_eq!(
            transition(&paused_at(secs(50)), &Command::Skip(secs(15)), clock.now()),
            TimerState::Finished
        );
    }

    #[test]
    fn zero_skip_is_a_no_op() {
        let clock = ManualClock::new();
        let running = started(&clock, PLANNED);
        clock.advance(secs(3));
        assert_eq!(
            transition(&running, &Command::Skip(Duration::ZERO), clock.now()),
            running
        );
    }

    #[test]
    fn finish_completes_active_sessions() {
        let clock = ManualClock::new();
        let running = started(&clock, PLANNED);
        assert_eq!(transition(&running, &Command::Finish, clock.now()), TimerState::Finished);
        assert_eq!(
            transition(&paused_at(secs(1)), &Command::Finish, clock.now()),
            TimerState::Finished
        );
        assert_eq!(
            transition(&TimerState::Idle, &Command::Finish, clock.now()),
            TimerState::Idle
        );
    }

    #[test]
    fn tick_refreshes_hint_without_moving_start() {
        let clock = ManualClock::new();
        let running = started(&clock, PLANNED);
        clock.advance(Duration::from_millis(200));
        let ticked = transition(&running, &Command::Tick, clock.now());
        match (running, ticked) {
            (TimerState::Running(before), TimerState::Running(after)) => {
                assert_eq!(before.start_time, after.start_time);
                assert_eq!(after.elapsed_hint, Duration::from_millis(200));
            }
            other => panic!("unexpected states {:?}", other),
        }
    }

    #[test]
    fn tick_finishes_once_due() {
        let clock = ManualClock::new();
        let running = started(&clock, Duration::from_millis(500));
        clock.advance(Duration::from_millis(499));
        assert!(transition(&running, &Command::Tick, clock.now()).is_running());
        clock.advance(Duration::from_millis(1));
        assert_eq!(transition(&running, &Command::Tick, clock.now()), TimerState::Finished);
    }

    #[test]
    fn commands_without_meaning_leave_state_untouched() {
        let clock = ManualClock::new();
        let now = clock.now();
        for command in [
            Command::Pause,
            Command::Resume,
            Command::Stop,
            Command::Skip(secs(5)),
            Command::Finish,
            Command::Tick,
        ] {
            assert_eq!(transition(&TimerState::Idle, &command, now), TimerState::Idle);
            assert_eq!(
                transition(&TimerState::Finished, &command, now),
                TimerState::Finished
            );
        }
        let paused = paused_at(secs(4));
        assert_eq!(transition(&paused, &Command::Pause, now), paused);
        assert_eq!(transition(&paused, &Command::Tick, now), paused);
        let running = started(&clock, PLANNED);
        assert_eq!(transition(&running, &Command::Resume, now), running);
    }

    #[test]
    fn elapsed_never_exceeds_planned_across_commands() {
        let clock = ManualClock::new();
        let script = [
            Command::Start(secs(30)),
            Command::Skip(secs(10)),
            Command::Pause,
            Command::Skip(secs(5)),
            Command::Resume,
            Command::Tick,
            Command::Skip(secs(7)),
            Command::Pause,
            Command::Resume,
            Command::Tick,
        ];
        let mut state = TimerState::Idle;
        let mut last_elapsed = Duration::ZERO;
        for command in script {
            clock.advance(secs(1));
            state = transition(&state, &command, clock.now());
            let elapsed = state.elapsed(clock.now());
            if let Some(planned) = state.planned_duration() {
                assert!(elapsed <= planned);
                assert!(elapsed >= last_elapsed, "elapsed went backwards on {:?}", command);
            }
            last_elapsed = elapsed;
        }
    }
}
