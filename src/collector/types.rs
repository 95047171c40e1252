//! Sensor channel and reading types for the Sensor Seed Agent.
//!
//! A reading carries only the raw measurement values of one channel. The
//! timestamp is informational and never enters the accumulator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// A physical sensor channel the agent knows how to sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    #[serde(rename = "pose_6dof")]
    Pose6Dof,
    MagneticField,
    RelativeHumidity,
    Light,
    Proximity,
}

impl SensorKind {
    /// Every channel, in the order a sampling window probes them.
    pub const ALL: [SensorKind; 7] = [
        SensorKind::Accelerometer,
        SensorKind::Gyroscope,
        SensorKind::Pose6Dof,
        SensorKind::MagneticField,
        SensorKind::RelativeHumidity,
        SensorKind::Light,
        SensorKind::Proximity,
    ];

    /// Stable lower_snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::Pose6Dof => "pose_6dof",
            SensorKind::MagneticField => "magnetic_field",
            SensorKind::RelativeHumidity => "relative_humidity",
            SensorKind::Light => "light",
            SensorKind::Proximity => "proximity",
        }
    }

    /// Sampling rate requested when a window opens this channel.
    ///
    /// Slow-changing environmental channels and the accelerometer are asked
    /// for the normal rate, everything else for the fastest one.
    pub fn default_rate(&self) -> SamplingRate {
        match self {
            SensorKind::Accelerometer | SensorKind::RelativeHumidity => SamplingRate::Normal,
            _ => SamplingRate::Fastest,
        }
    }

    /// Number of values a reading on this channel carries.
    pub fn value_count(&self) -> usize {
        match self {
            SensorKind::Accelerometer | SensorKind::Gyroscope | SensorKind::MagneticField => 3,
            SensorKind::Pose6Dof => 15,
            SensorKind::RelativeHumidity | SensorKind::Light | SensorKind::Proximity => 1,
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        SensorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown sensor channel '{s}'"))
    }
}

/// Sampling-rate hint passed to a source when a channel is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingRate {
    Fastest,
    Game,
    Ui,
    Normal,
}

impl SamplingRate {
    /// Nominal delay between two readings at this rate.
    pub fn period(&self) -> Duration {
        match self {
            SamplingRate::Fastest => Duration::from_millis(5),
            SamplingRate::Game => Duration::from_millis(20),
            SamplingRate::Ui => Duration::from_micros(66_667),
            SamplingRate::Normal => Duration::from_millis(200),
        }
    }
}

/// One discrete reading emitted by a sample source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// Channel that produced the reading
    pub channel: SensorKind,
    /// Measurement values, in channel order
    pub values: Vec<f32>,
    /// When the reading was taken (informational only)
    pub timestamp: DateTime<Utc>,
}

impl RawReading {
    pub fn new(channel: SensorKind, values: Vec<f32>) -> Self {
        Self {
            channel,
            values,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("light".parse::<SensorKind>(), Ok(SensorKind::Light));
        assert_eq!(
            "Magnetic-Field".parse::<SensorKind>(),
            Ok(SensorKind::MagneticField)
        );
        assert_eq!(" pose_6dof ".parse::<SensorKind>(), Ok(SensorKind::Pose6Dof));
        assert!("barometer".parse::<SensorKind>().is_err());
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in SensorKind::ALL {
            assert_eq!(kind.as_str().parse::<SensorKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_default_rates() {
        assert_eq!(SensorKind::Accelerometer.default_rate(), SamplingRate::Normal);
        assert_eq!(
            SensorKind::RelativeHumidity.default_rate(),
            SamplingRate::Normal
        );
        assert_eq!(SensorKind::Gyroscope.default_rate(), SamplingRate::Fastest);
        assert!(SamplingRate::Fastest.period() < SamplingRate::Normal.period());
    }

    #[test]
    fn test_reading_creation() {
        let reading = RawReading::new(SensorKind::Light, vec![120.5]);
        assert_eq!(reading.channel, SensorKind::Light);
        assert_eq!(reading.values, vec![120.5]);
    }
}
