//! Noop sample source for hosts without any usable sensor channel.
//!
//! Every capability query answers "no", so a sampling window opened against
//! this source enables nothing and the accumulator stays at its sentinel.

use crate::collector::types::{SamplingRate, SensorKind};
use crate::collector::{CollectorError, ReadingListener, SampleSource};

/// A source that supports no channels and never emits readings.
#[derive(Debug, Default)]
pub struct NoopSource;

impl NoopSource {
    /// Create a new noop source.
    pub fn new() -> Self {
        Self
    }
}

impl SampleSource for NoopSource {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn supports(&self, _kind: SensorKind) -> bool {
        false
    }

    fn set_listener(&mut self, _listener: ReadingListener) {}

    fn enable(&mut self, kind: SensorKind, _rate: SamplingRate) -> Result<(), CollectorError> {
        Err(CollectorError::MissingCapability(kind))
    }

    fn disable(&mut self, _kind: SensorKind) {}

    fn is_enabled(&self, _kind: SensorKind) -> bool {
        false
    }
}
