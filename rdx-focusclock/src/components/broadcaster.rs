//! Fan-out of committed session state to any number of subscribers.
//!
//! The broadcaster keeps the latest committed state plus a registry of
//! per-subscriber `watch` channels. A new subscriber's channel is seeded with
//! the current state, so the first value it reads is always "now". A consumer
//! that keeps up sees every committed state; one that falls behind sees the
//! newest state the next time it reads. Publishing never waits on a consumer.

use crate::common::SubscriberId;
use crate::events::SystemEvent;
use crate::state::TimerState;
use slotmap::SlotMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{broadcast, watch};
use tracing::debug;

struct Registry {
    latest: TimerState,
    subscribers: SlotMap<SubscriberId, watch::Sender<TimerState>>,
    system_events: Option<broadcast::Sender<SystemEvent>>,
    closed: bool,
}

impl Registry {
    fn announce(&self, event: SystemEvent) {
        if let Some(sender) = &self.system_events {
            sender.send(event).ok();
        }
    }
}

/// Shared handle to the subscriber registry. Cloning shares the registry.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl Broadcaster {
    /// Creates a broadcaster whose latest value is `initial`.
    pub fn new(initial: TimerState) -> Self {
        Self::build(initial, None)
    }

    /// Like `new`, but also reports subscriber churn as `SystemEvent`s.
    pub fn with_system_events(
        initial: TimerState,
        system_events: broadcast::Sender<SystemEvent>,
    ) -> Self {
        Self::build(initial, Some(system_events))
    }

    fn build(initial: TimerState, system_events: Option<broadcast::Sender<SystemEvent>>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                latest: initial,
                subscribers: SlotMap::with_key(),
                system_events,
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records `state` as the latest value and hands it to every subscriber.
    ///
    /// Subscribers whose receiving side has gone away are pruned.
    pub fn publish(&self, state: TimerState) {
        let mut registry = self.lock();
        if registry.closed {
            return;
        }
        registry.latest = state;

        let mut gone = Vec::new();
        for (id, sender) in registry.subscribers.iter() {
            if sender.send(state).is_err() {
                gone.push(id);
            }
        }
        for id in gone {
            registry.subscribers.remove(id);
            registry.announce(SystemEvent::SubscriberRemoved { id });
            debug!(?id, "pruned detached subscriber");
        }
    }

    /// The most recently published state.
    pub fn latest(&self) -> TimerState {
        self.lock().latest
    }

    /// Attaches a new subscriber. Its first value is the current state.
    ///
    /// Subscribing after `close` still yields the final state once, then ends.
    pub fn subscribe(&self) -> Subscription {
        let mut registry = self.lock();
        let (sender, receiver) = watch::channel(registry.latest);
        let id = if registry.closed {
            SubscriberId::default()
        } else {
            let id = registry.subscribers.insert(sender);
            registry.announce(SystemEvent::SubscriberAdded { id });
            debug!(?id, "subscriber attached");
            id
        };
        Subscription {
            id,
            receiver,
            primed: false,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Detaches the subscriber `id`. Returns `true` if it was attached.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        detach(&self.registry, id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Ends every subscription. Subscribers still receive the last published state.
    pub fn close(&self) {
        let mut registry = self.lock();
        registry.closed = true;
        registry.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

fn detach(registry: &Mutex<Registry>, id: SubscriberId) -> bool {
    let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
    let removed = registry.subscribers.remove(id).is_some();
    if removed {
        registry.announce(SystemEvent::SubscriberRemoved { id });
        debug!(?id, "subscriber detached");
    }
    removed
}

/// A read-only stream of committed states. Dropping it detaches the subscriber.
pub struct Subscription {
    id: SubscriberId,
    receiver: watch::Receiver<TimerState>,
    primed: bool,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next state.
    ///
    /// The first call returns immediately with the newest state, which is at
    /// least as recent as the one current at subscription. Returns `None` once
    /// the broadcaster has closed and the final state has been read.
    pub async fn recv(&mut self) -> Option<TimerState> {
        if !self.primed {
            self.primed = true;
            return Some(*self.receiver.borrow_and_update());
        }
        self.receiver.changed().await.ok()?;
        Some(*self.receiver.borrow_and_update())
    }

    /// The newest state delivered to this subscriber, without waiting.
    pub fn latest(&self) -> TimerState {
        *self.receiver.borrow()
    }

    /// Detaches explicitly. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            detach(&registry, self.id);
        }
    }
}
