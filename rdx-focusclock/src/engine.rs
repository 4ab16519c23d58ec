//! The core engine that owns the session and serializes every change to it.

use crate::components::broadcaster::{Broadcaster, Subscription};
use crate::components::scheduler::{TickEvent, TickScheduler};
use crate::config::FocusclockConfig;
use crate::events::{SessionEvent, SystemEvent};
use crate::machine::{transition, Command, Transition};
use crate::state::TimerState;
use crate::time::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace, warn};

const REQUEST_CAPACITY: usize = 64;

/// Work handed to the dispatcher.
enum Request {
    Apply {
        command: Command,
        reply: oneshot::Sender<Transition>,
    },
    Ticking {
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// The main Focusclock engine.
///
/// This struct is a handle to a single dispatcher task that owns the session
/// state. Every command, from any number of callers, and every tick from the
/// scheduler is queued to that task and applied one at a time, so no two
/// transitions ever interleave. The handle is designed to be cloned and shared
/// across tasks; the dispatcher lives until the last handle is dropped or
/// `shutdown` is called.
///
/// Commands never fail. A command that means nothing in the current state
/// returns a `Transition` whose `from` and `to` are equal.
#[derive(Clone)]
pub struct FocusclockEngine {
    config: Arc<FocusclockConfig>,
    clock: Arc<dyn Clock>,
    request_sender: mpsc::Sender<Request>,
    broadcaster: Broadcaster,
    session_event_sender: broadcast::Sender<SessionEvent>,
    system_event_sender: broadcast::Sender<SystemEvent>,
}

/// The single writer. Owned by the task spawned in `FocusclockEngine::with_clock`.
struct Dispatcher {
    state: TimerState,
    session: u64,
    clock: Arc<dyn Clock>,
    scheduler: TickScheduler,
    broadcaster: Broadcaster,
    session_event_sender: broadcast::Sender<SessionEvent>,
    system_event_sender: broadcast::Sender<SystemEvent>,
}

// Core implementation block for internal logic.
impl FocusclockEngine {
    /// Creates an engine reading the monotonic system clock.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: FocusclockConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an engine reading time from `clock`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_clock(config: FocusclockConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = config.event_capacity.max(1);
        let (request_sender, request_receiver) = mpsc::channel(REQUEST_CAPACITY);
        let (tick_sender, tick_receiver) = mpsc::channel(1);
        let (session_event_sender, _) = broadcast::channel(capacity);
        let (system_event_sender, _) = broadcast::channel(capacity);
        let broadcaster =
            Broadcaster::with_system_events(TimerState::Idle, system_event_sender.clone());

        let dispatcher = Dispatcher {
            state: TimerState::Idle,
            session: 0,
            clock: clock.clone(),
            scheduler: TickScheduler::new(config.tick_interval(), tick_sender),
            broadcaster: broadcaster.clone(),
            session_event_sender: session_event_sender.clone(),
            system_event_sender: system_event_sender.clone(),
        };
        tokio::spawn(dispatcher.run(request_receiver, tick_receiver));

        Self {
            config: Arc::new(config),
            clock,
            request_sender,
            broadcaster,
            session_event_sender,
            system_event_sender,
        }
    }

    #[doc(hidden)]
    async fn apply(&self, command: Command) -> Transition {
        let (reply, response) = oneshot::channel();
        if self
            .request_sender
            .send(Request::Apply { command, reply })
            .await
            .is_ok()
        {
            if let Ok(applied) = response.await {
                return applied;
            }
        }
        warn!(command = command.name(), "engine dispatcher is gone; command ignored");
        let state = self.current_state();
        Transition {
            session: 0,
            command,
            from: state,
            to: state,
            at: self.clock.now(),
        }
    }
}

// Public API implementation block.
impl FocusclockEngine {
    /// Starts a new session of `planned` length, discarding any current one.
    ///
    /// A zero duration finishes immediately.
    pub async fn start(&self, planned: Duration) -> Transition {
        self.apply(Command::Start(planned)).await
    }

    /// Freezes a running session.
    pub async fn pause(&self) -> Transition {
        self.apply(Command::Pause).await
    }

    /// Continues a paused session from where it was frozen.
    pub async fn resume(&self) -> Transition {
        self.apply(Command::Resume).await
    }

    /// Abandons the active session and returns to `Idle`.
    pub async fn stop(&self) -> Transition {
        self.apply(Command::Stop).await
    }

    /// Advances the active session by `by`, finishing it if that reaches the planned duration.
    pub async fn skip(&self, by: Duration) -> Transition {
        self.apply(Command::Skip(by)).await
    }

    /// Completes the active session immediately.
    pub async fn finish(&self) -> Transition {
        self.apply(Command::Finish).await
    }

    /// The most recently committed state.
    pub fn current_state(&self) -> TimerState {
        self.broadcaster.latest()
    }

    /// Time left in the session right now. Zero when idle or finished.
    pub fn remaining(&self) -> Duration {
        self.current_state().remaining(self.clock.now())
    }

    /// Time accounted for in the session right now.
    pub fn elapsed(&self) -> Duration {
        self.current_state().elapsed(self.clock.now())
    }

    /// The engine's notion of "now".
    pub fn now(&self) -> tokio::time::Instant {
        self.clock.now()
    }

    pub fn config(&self) -> &FocusclockConfig {
        &self.config
    }

    /// Attaches a state subscriber. The first value it yields is the current state.
    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe()
    }

    /// Subscribes to the `SessionEvent` stream.
    pub fn subscribe_session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_event_sender.subscribe()
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }

    /// Whether a tick activity is currently alive.
    pub async fn is_ticking(&self) -> bool {
        let (reply, response) = oneshot::channel();
        if self
            .request_sender
            .send(Request::Ticking { reply })
            .await
            .is_err()
        {
            return false;
        }
        response.await.unwrap_or(false)
    }

    /// Stops the dispatcher. Subscribers receive the last committed state and
    /// then end; later commands are ignored.
    pub async fn shutdown(&self) {
        let (reply, response) = oneshot::channel();
        if self
            .request_sender
            .send(Request::Shutdown { reply })
            .await
            .is_ok()
        {
            response.await.ok();
        }
    }
}

impl Dispatcher {
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut ticks: mpsc::Receiver<TickEvent>,
    ) {
        info!(
            tick_ms = self.scheduler.period().as_millis() as u64,
            "FocusclockEngine starting up..."
        );
        self.system_event_sender
            .send(SystemEvent::EngineStarted {
                at: self.clock.now(),
            })
            .ok();

        let mut shutdown_reply = None;
        loop {
            tokio::select! {
                biased;
                request = requests.recv() => match request {
                    Some(Request::Apply { command, reply }) => {
                        reply.send(self.apply(command)).ok();
                    }
                    Some(Request::Ticking { reply }) => {
                        reply.send(self.scheduler.is_active()).ok();
                    }
                    Some(Request::Shutdown { reply }) => {
                        shutdown_reply = Some(reply);
                        break;
                    }
                    None => break,
                },
                Some(tick) = ticks.recv() => {
                    if self.scheduler.accepts(&tick) {
                        self.apply(Command::Tick);
                    } else {
                        trace!(run = tick.run, "discarding stale tick");
                    }
                }
            }
        }

        self.scheduler.cancel();
        self.broadcaster.close();
        self.system_event_sender
            .send(SystemEvent::EngineShutdown)
            .ok();
        info!("FocusclockEngine has shut down.");
        if let Some(reply) = shutdown_reply {
            reply.send(()).ok();
        }
    }

    fn apply(&mut self, command: Command) -> Transition {
        let at = self.clock.now();
        let from = self.state;
        let to = transition(&from, &command, at);
        // Only a start that commits opens a new session; a no-op start keeps the current number.
        if command.opens_session() && from != to {
            self.session += 1;
        }
        let applied = Transition {
            session: self.session,
            command,
            from,
            to,
            at,
        };
        if !applied.changed() {
            if command != Command::Tick {
                debug!(command = command.name(), state = from.label(), "command has no effect");
            }
            return applied;
        }

        self.state = to;
        self.reschedule(&applied);
        self.broadcaster.publish(to);

        if let Some(event) = SessionEvent::from_transition(&applied) {
            debug!(
                session = self.session,
                command = command.name(),
                from = from.label(),
                to = to.label(),
                "session transition"
            );
            self.session_event_sender.send(event).ok();
        } else {
            trace!(elapsed_ms = to.elapsed(at).as_millis() as u64, "tick");
        }
        applied
    }

    /// Keeps exactly one tick activity alive while running, and none otherwise.
    fn reschedule(&mut self, applied: &Transition) {
        match applied.to {
            TimerState::Running(_) => {
                if applied.command.opens_run() || !self.scheduler.is_active() {
                    self.scheduler.restart();
                }
            }
            TimerState::Idle | TimerState::Paused(_) | TimerState::Finished => {
                self.scheduler.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn manual_engine() -> (FocusclockEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let engine = FocusclockEngine::with_clock(FocusclockConfig::default(), clock.clone());
        (engine, clock)
    }

    #[tokio::test]
    async fn commands_return_the_committed_transition() {
        let (engine, clock) = manual_engine();
        let started = engine.start(Duration::from_secs(60)).await;
        assert!(started.changed());
        assert_eq!(engine.current_state(), started.to);

        clock.advance(Duration::from_secs(10));
        let paused = engine.pause().await;
        assert_eq!(paused.elapsed_before(), Duration::from_secs(10));
        assert_eq!(engine.remaining(), Duration::from_secs(50));
    }

    #[tokio::test]
    async fn invalid_commands_are_no_ops() {
        let (engine, _clock) = manual_engine();
        for applied in [
            engine.pause().await,
            engine.resume().await,
            engine.stop().await,
            engine.finish().await,
            engine.skip(Duration::from_secs(5)).await,
        ] {
            assert!(!applied.changed());
            assert_eq!(applied.to, TimerState::Idle);
        }
        assert_eq!(engine.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn ticking_follows_the_running_state() {
        let (engine, _clock) = manual_engine();
        assert!(!engine.is_ticking().await);
        engine.start(Duration::from_secs(60)).await;
        assert!(engine.is_ticking().await);
        engine.pause().await;
        assert!(!engine.is_ticking().await);
        engine.resume().await;
        assert!(engine.is_ticking().await);
        engine.finish().await;
        assert!(!engine.is_ticking().await);
    }

    #[tokio::test]
    async fn only_committed_starts_open_a_session() {
        let (engine, _clock) = manual_engine();
        let mut events = engine.subscribe_session_events();

        let first = engine.start(Duration::ZERO).await;
        assert_eq!(first.to, TimerState::Finished);
        assert_eq!(first.session, 1);

        let repeated = engine.start(Duration::ZERO).await;
        assert!(!repeated.changed());
        assert_eq!(repeated.session, 1);

        let next = engine.start(Duration::from_secs(30)).await;
        assert_eq!(next.session, 2);

        let sessions = [events.recv().await.unwrap(), events.recv().await.unwrap()]
            .map(|event| event.session);
        assert_eq!(sessions, [1, 2]);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn shutdown_ends_subscriptions_and_ignores_later_commands() {
        let (engine, _clock) = manual_engine();
        let mut sub = engine.subscribe();
        assert_eq!(sub.recv().await, Some(TimerState::Idle));

        engine.shutdown().await;
        assert_eq!(sub.recv().await, None);

        let ignored = engine.start(Duration::from_secs(5)).await;
        assert!(!ignored.changed());
        assert_eq!(engine.current_state(), TimerState::Idle);
        assert!(!engine.is_ticking().await);
    }
}
