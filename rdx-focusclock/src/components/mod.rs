//! Contains the building blocks the engine is assembled from.
//!
//! The `TickScheduler` owns the periodic background activity of a running
//! session, and the `Broadcaster` fans committed state out to subscribers.
//! The `FocusclockEngine` owns one of each and drives them from its dispatcher.

pub mod broadcaster;
pub mod scheduler;
