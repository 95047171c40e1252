//! Transparency module for the Sensor Seed Agent.
//!
//! This module provides counters describing what the pipeline has done,
//! so a user can see how much sensor noise actually went into their seeds.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, PersistedStats, SharedTransparencyLog,
    TransparencyLog, TransparencyStats,
};
