//! The engine's only external time dependency.
//!
//! All elapsed-time arithmetic reads a monotonic `Instant`, never wall-clock
//! time, so a system clock step cannot rewind or fast-forward a session.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A source of "now".
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// The production clock, backed by tokio's monotonic `Instant`.
///
/// Under `tokio::time::pause()` this follows the runtime's virtual time, which
/// is what makes the engine's real-time behaviour testable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// The base instant sits one day ahead of the runtime clock so that synthetic
/// start times (`now - elapsed`) can always be represented.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now() + Duration::from_secs(86_400),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset = offset.saturating_add(by);
    }

    /// Places the clock at exactly `offset` past its base. Moving backwards is ignored.
    pub fn set(&self, offset: Duration) {
        let mut current = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        if offset > *current {
            *current = offset;
        }
    }

    /// How far the clock has been advanced since construction.
    pub fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset()
    }
}
