//! Configuration for the Sensor Seed Agent.

use crate::collector::SensorKind;
use crate::core::conversion::ConversionOptions;
use crate::core::scheduler::{SchedulerConfig, DEFAULT_CLOSE_DELAY, FAST_TICK_INTERVAL};
use crate::core::seed::DEFAULT_DIGEST_ALGORITHM;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the seed agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Period between sampling windows
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,

    /// How long a window stays open after a reading was converted
    #[serde(with = "duration_millis_serde")]
    pub close_delay: Duration,

    /// Which sensor channels to request
    pub channels: ChannelConfig,

    /// Sample source to drive (`jitter` or `noop`)
    pub source: String,

    /// Digest algorithm name used for seeds
    pub digest_algorithm: String,

    /// What `get_seed` hands out
    pub seed_mode: SeedMode,

    /// Frame every measurement with OS-random bytes
    pub salt_readings: bool,

    /// Path for storing transparency counters
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-seed-agent");

        Self {
            tick_interval: FAST_TICK_INTERVAL,
            close_delay: DEFAULT_CLOSE_DELAY,
            channels: ChannelConfig::default(),
            source: "jitter".to_string(),
            digest_algorithm: DEFAULT_DIGEST_ALGORITHM.to_string(),
            seed_mode: SeedMode::Digest,
            salt_readings: false,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Reject settings under which a sampling window could never close.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler_config()
            .validate()
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-seed-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Path of the persisted transparency counters.
    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: self.tick_interval,
            close_delay: self.close_delay,
            channels: self.channels.kinds().to_vec(),
        }
    }

    pub fn conversion_options(&self) -> ConversionOptions {
        ConversionOptions {
            salt_readings: self.salt_readings,
        }
    }
}

/// What the service hands out when asked for a seed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedMode {
    /// Digest of the accumulator
    #[default]
    Digest,
    /// The accumulator bytes themselves
    Raw,
}

/// Configuration for which sensor channels to request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelConfig {
    channels: Vec<SensorKind>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channels: SensorKind::ALL.to_vec(),
        }
    }
}

impl ChannelConfig {
    /// Parse channel configuration from a comma-separated string.
    ///
    /// `all` selects every channel; unknown names are reported.
    pub fn from_csv(s: &str) -> Result<Self, ConfigError> {
        let mut channels = Vec::new();
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name.eq_ignore_ascii_case("all") {
                return Ok(Self::default());
            }
            let kind: SensorKind = name.parse().map_err(ConfigError::ParseError)?;
            if !channels.contains(&kind) {
                channels.push(kind);
            }
        }
        // Keep probe order regardless of how the list was written
        channels.sort();
        Ok(Self { channels })
    }

    pub fn kinds(&self) -> &[SensorKind] {
        &self.channels
    }

    /// Check if at least one channel is enabled.
    pub fn any_enabled(&self) -> bool {
        !self.channels.is_empty()
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidValue(e) => write!(f, "Invalid value: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde support for Duration as milliseconds.
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
