//! Contains common, primitive types shared across the Focusclock crate.
//!
//! This module defines the identifier types handed out by the engine and the
//! session coordinator, plus the small conversion helpers used by text-facing
//! surfaces (the shell, configuration files).

use serde::Deserialize;
use slotmap::new_key_type;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A prelude module for convenient importing of the most common Focusclock types.
///
/// # Example
/// ```
/// use focusclock::common::prelude::*;
/// ```
pub mod prelude {
    pub use super::{SessionId, SessionMode, SubscriberId};
    pub use crate::config::FocusclockConfig;
    pub use crate::engine::FocusclockEngine;
}

new_key_type! {
    /// Uniquely and safely identifies an attached state subscriber.
    ///
    /// Keys are generational, so an id belonging to a detached subscriber is
    /// never confused with a newer one that happens to reuse its slot.
    pub struct SubscriberId;
}

/// Identifies a persisted session record inside a `SessionStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of interval a session represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Work,
    Break,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Work => "work",
            SessionMode::Break => "break",
        }
    }

    /// The title a session gets when the caller supplies none.
    pub fn default_title(&self) -> &'static str {
        match self {
            SessionMode::Work => "Work",
            SessionMode::Break => "Break",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "work" | "focus" => Ok(SessionMode::Work),
            "break" => Ok(SessionMode::Break),
            other => Err(anyhow::anyhow!("unknown session mode '{}'", other)),
        }
    }
}

/// Converts a signed, possibly fractional seconds value into a `Duration`.
///
/// Negative, zero and non-finite inputs all map to `Duration::ZERO`, which the
/// state machine treats as "no effect" for skips and "finish at once" for starts.
pub fn duration_from_secs_lossy(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Formats a duration as `MM:SS`, rounding partial seconds down.
pub fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
