//! Sample sources for the Sensor Seed Agent.
//!
//! A [`SampleSource`] is the boundary to whatever actually produces sensor
//! readings. The scheduler only ever asks it three things: which channels it
//! supports, to enable a channel, and to disable channels again. Readings are
//! pushed to a registered [`ReadingListener`] from threads the source owns.

pub mod jitter;
pub mod noop;
pub mod types;

use std::sync::Arc;

// Re-export commonly used types
pub use jitter::JitterSource;
pub use noop::NoopSource;
pub use types::{RawReading, SamplingRate, SensorKind};

/// Platform-agnostic collector type alias
pub type Collector = JitterSource;

/// Callback invoked by a source for every reading it emits.
///
/// Sources may call it concurrently from several threads, so it must never
/// block for long.
pub type ReadingListener = Arc<dyn Fn(RawReading) + Send + Sync>;

/// A provider of sensor readings.
pub trait SampleSource: Send {
    /// Short name used in logs and status output.
    fn name(&self) -> &'static str;

    /// Whether this source can provide the given channel at all.
    fn supports(&self, kind: SensorKind) -> bool;

    /// Register the callback that receives readings. Replaces any previous one.
    fn set_listener(&mut self, listener: ReadingListener);

    /// Start emitting readings on a channel.
    ///
    /// Enabling a channel that is already enabled is a no-op.
    fn enable(&mut self, kind: SensorKind, rate: SamplingRate) -> Result<(), CollectorError>;

    /// Stop emitting readings on a channel. Disabling an idle channel is a no-op.
    ///
    /// Once this returns, no further readings for `kind` reach the listener.
    fn disable(&mut self, kind: SensorKind);

    /// Whether the channel is currently emitting.
    fn is_enabled(&self, kind: SensorKind) -> bool;

    /// Disable every channel.
    fn disable_all(&mut self) {
        for kind in SensorKind::ALL {
            self.disable(kind);
        }
    }

    /// Channels this source supports, in probe order.
    fn supported_channels(&self) -> Vec<SensorKind> {
        SensorKind::ALL
            .into_iter()
            .filter(|kind| self.supports(*kind))
            .collect()
    }
}

/// Build a source by name (`jitter` or `noop`).
pub fn create_source(name: &str) -> Result<Box<dyn SampleSource>, CollectorError> {
    match name.trim().to_lowercase().as_str() {
        "jitter" => Ok(Box::new(JitterSource::new())),
        "noop" | "none" => Ok(Box::new(NoopSource::new())),
        other => Err(CollectorError::UnknownSource(other.to_string())),
    }
}

/// Errors that can occur while driving a sample source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    /// The requested channel does not exist on this source
    MissingCapability(SensorKind),
    /// The channel exists but could not be enabled
    EnableFailed { kind: SensorKind, reason: String },
    /// The scheduler driving the source is already running
    AlreadyRunning,
    /// The scheduler thread could not be started
    SchedulerUnavailable(String),
    /// Tick interval and close delay would keep windows from ever closing
    InvalidSchedule(String),
    /// No source with this name is known
    UnknownSource(String),
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::MissingCapability(kind) => {
                write!(f, "Sensor channel not available: {kind}")
            }
            CollectorError::EnableFailed { kind, reason } => {
                write!(f, "Failed to enable {kind}: {reason}")
            }
            CollectorError::AlreadyRunning => write!(f, "Scheduler is already running"),
            CollectorError::SchedulerUnavailable(e) => {
                write!(f, "Could not start scheduler thread: {e}")
            }
            CollectorError::InvalidSchedule(e) => write!(f, "Invalid sampling schedule: {e}"),
            CollectorError::UnknownSource(name) => write!(f, "Unknown sample source '{name}'"),
        }
    }
}

impl std::error::Error for CollectorError {}
