//! The periodic tick activity that drives natural session completion.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// A wake-up request produced by a tick task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickEvent {
    /// Generation of the run that produced this tick.
    pub run: u64,
}

/// The tick task currently alive, if any.
struct ActiveRun {
    run: u64,
    handle: JoinHandle<()>,
}

/// Owns at most one cancellable periodic task.
///
/// Each run is tagged with a generation number. A tick is only honoured when
/// `accepts` says its generation is the live one, so a tick that was already
/// queued when its run was cancelled is never applied.
pub struct TickScheduler {
    period: Duration,
    tick_sender: mpsc::Sender<TickEvent>,
    active: Option<ActiveRun>,
    next_run: u64,
}

impl TickScheduler {
    /// Creates an idle scheduler delivering ticks to `tick_sender` every `period`.
    pub fn new(period: Duration, tick_sender: mpsc::Sender<TickEvent>) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            tick_sender,
            active: None,
            next_run: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Cancels any existing run and spawns a fresh one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn restart(&mut self) {
        self.cancel();
        self.next_run += 1;
        let run = self.next_run;
        let period = self.period;
        let sender = self.tick_sender.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                trace!(run, "tick");
                match sender.try_send(TickEvent { run }) {
                    // A tick is already waiting; it will re-evaluate the same state.
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });
        debug!(run, period_ms = period.as_millis() as u64, "tick activity started");
        self.active = Some(ActiveRun { run, handle });
    }

    /// Stops the current run, if any. No tick from it will be accepted afterwards.
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.abort();
            debug!(run = active.run, "tick activity cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Whether `tick` belongs to the live run.
    pub fn accepts(&self, tick: &TickEvent) -> bool {
        self.active
            .as_ref()
            .map_or(false, |active| active.run == tick.run)
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
