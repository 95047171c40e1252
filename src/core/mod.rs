//! Core functionality for the Sensor Seed Agent.
//!
//! This module contains:
//! - The bounded byte accumulator holding collected measurement bytes
//! - Single-flight conversion of readings into accumulator bytes
//! - The periodic sampling scheduler
//! - Seed extraction by message digest
//! - The service tying all of the above together

pub mod accumulator;
pub mod conversion;
pub mod scheduler;
pub mod seed;
pub mod service;

// Re-export commonly used types
pub use accumulator::{AppendOutcome, ByteAccumulator, SharedAccumulator, MAX_BUFFER_LEN};
pub use conversion::{
    convert_reading, serialize_measurement, ConversionError, ConversionHandle, ConversionOptions,
    ConversionReport, ConversionWorker, InFlightGuard, InFlightPermit, Submission,
};
pub use scheduler::{
    SampleScheduler, SchedulerConfig, SchedulerHandle, DEFAULT_CLOSE_DELAY, FAST_TICK_INTERVAL,
    SLOW_TICK_INTERVAL,
};
pub use seed::{extract, DigestAlgorithm, Seed, SeedError, SeedExtractor, RAW_SEED_LABEL};
pub use service::{SeedService, ServiceError, DEFAULT_SAMPLE_WAIT};
