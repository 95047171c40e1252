//! Sensor Seed Agent - entropy accumulation from sensor noise.
//!
//! This library periodically samples device sensors, turns every measurement
//! into bytes, accumulates those bytes in a small bounded buffer and hands out
//! a message digest of the buffer as seed material.
//!
//! # Guarantees
//!
//! - **Bounded memory**: The accumulator never grows past 512 bytes
//! - **Single flight**: At most one reading is being converted at any time
//! - **Short windows**: Channels are only enabled while a sampling window is open
//! - **Transparency**: All collection is counted and auditable
//!
//! The seed is a digest of sensor noise and is not a vetted random number
//! generator. Mix it into a proper CSPRNG rather than using it directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Sensor Seed Agent                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Scheduler  │──▶│   Source    │──▶│ Conversion  │       │
//! │  │  (10s tick) │   │ (channels)  │   │(single slot)│       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         ▲                                    │              │
//! │         └──────── conversion done ───────────┤              │
//! │                                              ▼              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │Transparency │   │    Seed     │◀──│ Accumulator │       │
//! │  │    Log      │   │ (SHA-512)   │   │ (512 bytes) │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sensor_seed_agent::{collector, core::SeedService, transparency, Config};
//!
//! let config = Config::default();
//! let source = collector::create_source(&config.source).expect("known source");
//! let log = transparency::create_shared_log();
//!
//! let mut service = SeedService::new(source, &config, log).expect("service");
//! service.start().expect("Failed to start sampling");
//!
//! let seed = service.get_seed().expect("SHA-512 is available");
//! println!("{}", seed.to_hex());
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use collector::{
    create_source, Collector, CollectorError, RawReading, SampleSource, SensorKind,
};
pub use config::{ChannelConfig, Config, SeedMode};
pub use core::{ByteAccumulator, Seed, SeedError, SeedExtractor, SeedService};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Collection notice that can be displayed to users.
pub const COLLECTION_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║            SENSOR SEED AGENT - COLLECTION NOTICE                 ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent turns sensor noise into seed material.               ║
║                                                                  ║
║  ✓ WHAT WE READ:                                                 ║
║    • Motion, orientation and magnetic field samples              ║
║    • Humidity, light and proximity samples                       ║
║    • Only during short windows, every few seconds                ║
║                                                                  ║
║  ✗ WHAT WE NEVER DO:                                             ║
║    • Store readings on disk                                      ║
║    • Send readings anywhere                                      ║
║    • Keep more than 512 bytes of sensor data in memory           ║
║                                                                  ║
║  Seeds are digests of sensor noise, not vetted randomness.       ║
║  Mix them into a CSPRNG before use.                              ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    sensor-seed status                                            ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_notice_contents() {
        assert!(COLLECTION_NOTICE.contains("COLLECTION NOTICE"));
        assert!(COLLECTION_NOTICE.contains("NEVER DO"));
        assert!(COLLECTION_NOTICE.contains("512 bytes"));
    }
}
