//! Defines the public event types broadcast by the Focusclock engine.
//!
//! Committed states flow through `Subscription`s; these events describe the
//! *changes* between them. Listeners subscribe to the stream they care about:
//! `SessionEvent` for the session lifecycle, `SystemEvent` for the engine itself.

use crate::common::SubscriberId;
use crate::machine::{Command, Transition};
use crate::state::TimerState;
use std::time::Duration;
use tokio::time::Instant;

/// Why a session reached `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishCause {
    /// The planned duration ran out.
    Elapsed,
    /// A skip carried elapsed time to the planned duration.
    Skipped,
    /// `finish` was called, or a zero-length session was started.
    Forced,
}

/// A lifecycle change of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEvent {
    /// Sequence number of the session, as carried by `Transition::session`.
    pub session: u64,
    pub kind: SessionEventKind,
    pub at: Instant,
}

/// What happened to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    Started {
        planned: Duration,
    },
    Paused {
        elapsed: Duration,
        remaining: Duration,
    },
    Resumed {
        elapsed: Duration,
        remaining: Duration,
    },
    /// A skip that left the session active.
    Skipped {
        by: Duration,
        elapsed: Duration,
    },
    /// The session was abandoned; `elapsed` is the time accounted for when it stopped.
    Stopped {
        elapsed: Duration,
    },
    Finished {
        /// Planned duration of the finished session. Zero when a zero-length start finished it.
        planned: Duration,
        cause: FinishCause,
    },
}

impl SessionEvent {
    /// Derives the event describing `transition`, if it changed anything worth reporting.
    ///
    /// Ticks that merely refresh the display hint produce no event.
    pub fn from_transition(transition: &Transition) -> Option<Self> {
        if !transition.changed() {
            return None;
        }
        let at = transition.at;
        let to = &transition.to;

        let kind = if *to == TimerState::Finished {
            let (planned, cause) = match transition.command {
                Command::Start(_) => (Duration::ZERO, FinishCause::Forced),
                Command::Tick => (planned_of(transition), FinishCause::Elapsed),
                Command::Skip(_) => (planned_of(transition), FinishCause::Skipped),
                _ => (planned_of(transition), FinishCause::Forced),
            };
            SessionEventKind::Finished { planned, cause }
        } else {
            match transition.command {
                Command::Start(planned) => SessionEventKind::Started { planned },
                Command::Pause => SessionEventKind::Paused {
                    elapsed: to.elapsed(at),
                    remaining: to.remaining(at),
                },
                Command::Resume => SessionEventKind::Resumed {
                    elapsed: to.elapsed(at),
                    remaining: to.remaining(at),
                },
                Command::Skip(by) => SessionEventKind::Skipped {
                    by,
                    elapsed: to.elapsed(at),
                },
                Command::Stop => SessionEventKind::Stopped {
                    elapsed: transition.elapsed_before(),
                },
                Command::Finish | Command::Tick => return None,
            }
        };

        Some(SessionEvent {
            session: transition.session,
            kind,
            at,
        })
    }
}

fn planned_of(transition: &Transition) -> Duration {
    transition.from.planned_duration().unwrap_or_default()
}

/// Events related to the lifecycle of the engine itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    /// Fired once when the engine's dispatcher begins.
    EngineStarted { at: Instant },
    /// Fired once when the dispatcher is about to exit.
    EngineShutdown,
    /// Fired when a state subscriber attaches.
    SubscriberAdded { id: SubscriberId },
    /// Fired when a state subscriber detaches or is pruned.
    SubscriberRemoved { id: SubscriberId },
}
