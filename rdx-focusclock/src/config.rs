//! Defines all configuration structures for the Focusclock engine.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`, layered under environment overrides by
//! the `config` crate. Nothing here decides how long a particular session
//! lasts; `SessionDefaults` only seeds front-ends that need a fallback.

use crate::common::{duration_from_secs_lossy, SessionMode};
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `FOCUSCLOCK__RESOLUTION=coarse`.
pub const ENV_PREFIX: &str = "FOCUSCLOCK";

/// The top-level configuration for the `FocusclockEngine`.
#[derive(Debug, Clone, Deserialize)]
pub struct FocusclockConfig {
    /// How often a running session is re-evaluated.
    #[serde(default)]
    pub resolution: TickResolution,

    /// Buffer size of the session and system event channels.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Fallback durations for front-ends.
    #[serde(default)]
    pub defaults: SessionDefaults,
}

/// Defines the tick speed of a running session.
///
/// Ticks only detect completion and refresh the display hint; elapsed time is
/// never counted from them, so a coarser resolution costs latency, not accuracy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickResolution {
    /// ~60 ticks per second. For animated displays.
    Smooth,
    /// 5 ticks per second.
    #[default]
    Standard,
    /// 1 tick per second. For headless or battery-sensitive hosts.
    Coarse,
    /// A user-defined speed in ticks per second. Zero is treated as one.
    Custom { ticks_per_second: u64 },
}

impl TickResolution {
    pub fn interval(&self) -> Duration {
        match self {
            TickResolution::Smooth => Duration::from_micros(16_667),
            TickResolution::Standard => Duration::from_millis(200),
            TickResolution::Coarse => Duration::from_secs(1),
            TickResolution::Custom { ticks_per_second } => {
                Duration::from_secs(1) / (*ticks_per_second).clamp(1, 1_000) as u32
            }
        }
    }
}

/// Fallback session lengths, in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionDefaults {
    #[serde(default = "default_work_secs")]
    pub work_secs: f64,
    #[serde(default = "default_break_secs")]
    pub break_secs: f64,
    /// Amount a bare `skip` advances the session.
    #[serde(default = "default_skip_secs")]
    pub skip_secs: f64,
    /// Mode of a session started without naming one.
    #[serde(default)]
    pub default_mode: SessionMode,
}

impl SessionDefaults {
    pub fn duration_for(&self, mode: SessionMode) -> Duration {
        let secs = match mode {
            SessionMode::Work => self.work_secs,
            SessionMode::Break => self.break_secs,
        };
        duration_from_secs_lossy(secs)
    }

    pub fn skip(&self) -> Duration {
        duration_from_secs_lossy(self.skip_secs)
    }
}

impl FocusclockConfig {
    /// Loads configuration from built-in defaults, then the optional TOML file at
    /// `path`, then `FOCUSCLOCK__*` environment variables.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("failed to assemble focusclock configuration")?;
        settings
            .try_deserialize()
            .context("invalid focusclock configuration")
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(source: &str) -> anyhow::Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .context("invalid focusclock configuration")
    }

    pub fn tick_interval(&self) -> Duration {
        self.resolution.interval()
    }
}

// --- Default value functions for serde ---

fn default_event_capacity() -> usize {
    64
}

fn default_work_secs() -> f64 {
    25.0 * 60.0
}

fn default_break_secs() -> f64 {
    5.0 * 60.0
}

fn default_skip_secs() -> f64 {
    30.0
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            work_secs: default_work_secs(),
            break_secs: default_break_secs(),
            skip_secs: default_skip_secs(),
            default_mode: SessionMode::default(),
        }
    }
}

impl Default for FocusclockConfig {
    fn default() -> Self {
        Self {
            resolution: TickResolution::default(),
            event_capacity: default_event_capacity(),
            defaults: SessionDefaults::default(),
        }
    }
}
