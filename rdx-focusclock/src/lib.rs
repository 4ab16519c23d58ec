//! # Focusclock
//!
//! A drift-free countdown session engine for focus/break interval timers.
//!
//! Focusclock manages the lifecycle of exactly one timer session. It keeps
//! elapsed and remaining time correct across pause, resume and skip, and it
//! publishes every committed state to any number of observers.
//!
//! ## Core Concepts
//!
//! - **Single writer**: All commands and all ticks are queued to one dispatcher
//!   task and applied in order, so transitions never race.
//! - **Derived time**: Elapsed time is never counted tick by tick. A running
//!   session stores a reference instant and elapsed is `now - start_time`,
//!   read from a monotonic [`Clock`](time::Clock). Ticks exist only to notice
//!   completion and refresh a display hint.
//! - **Replay-latest fan-out**: A [`Subscription`](components::broadcaster::Subscription)
//!   yields the current state first, then every later commit. Slow consumers
//!   are coalesced to the newest state; the engine never waits on them.
//! - **Total commands**: No command fails. A command that has no meaning in
//!   the current state is a no-op.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use focusclock::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create the engine with the default configuration.
//!     let engine = FocusclockEngine::new(FocusclockConfig::default());
//!
//!     // 2. Observe committed states. The first value is the current one.
//!     let mut states = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Some(state) = states.recv().await {
//!             println!("state: {}", state.label());
//!         }
//!     });
//!
//!     // 3. Drive a session.
//!     engine.start(Duration::from_secs(25 * 60)).await;
//!     engine.skip(Duration::from_secs(30)).await;
//!     engine.pause().await;
//!     println!("remaining: {:?}", engine.remaining());
//!     engine.stop().await;
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Focus Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");


// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod events;
pub mod machine;
pub mod state;
pub mod time;

/// A prelude module for easy importing of the most common Focusclock types.
pub mod prelude {
    pub use crate::common::{SessionId, SessionMode, SubscriberId};
    pub use crate::components::broadcaster::Subscription;
    pub use crate::config::{FocusclockConfig, TickResolution};
    pub use crate::coordinator::{
        LogNotifier, MemorySessionStore, NewSession, Notifier, SessionCoordinator,
        SessionRecord, SessionStore,
    };
    pub use crate::engine::FocusclockEngine;
    pub use crate::events::{FinishCause, SessionEvent, SessionEventKind, SystemEvent};
    pub use crate::machine::{Command, Transition};
    pub use crate::state::{PausedState, RunningState, TimerState};
    pub use crate::time::{Clock, ManualClock, SystemClock};
}
