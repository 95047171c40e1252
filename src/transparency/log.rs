//! Transparency log of pipeline activity.
//!
//! This module counts what the pipeline did (ticks, windows, readings,
//! measurements, resets, extractions) without ever recording a measured value
//! or any part of the accumulator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Pipeline statistics for the current service instance.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Identifier of the service instance that owns this log
    instance_id: String,
    /// Scheduler ticks fired (periodic and triggered)
    ticks: AtomicU64,
    /// Sampling windows opened with at least one channel
    windows_opened: AtomicU64,
    /// Sampling windows closed
    windows_closed: AtomicU64,
    /// Readings delivered by the sample source
    readings_received: AtomicU64,
    /// Readings converted by the worker
    readings_processed: AtomicU64,
    /// Readings discarded because a conversion was in flight
    readings_dropped: AtomicU64,
    /// Measurements folded into the accumulator
    measurements_appended: AtomicU64,
    /// Measurements rejected as malformed
    measurements_rejected: AtomicU64,
    /// Times the accumulator was wiped back to the sentinel
    overflow_resets: AtomicU64,
    /// Seeds handed to consumers
    seeds_extracted: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
            ticks: AtomicU64::new(0),
            windows_opened: AtomicU64::new(0),
            windows_closed: AtomicU64::new(0),
            readings_received: AtomicU64::new(0),
            readings_processed: AtomicU64::new(0),
            readings_dropped: AtomicU64::new(0),
            measurements_appended: AtomicU64::new(0),
            measurements_rejected: AtomicU64::new(0),
            overflow_resets: AtomicU64::new(0),
            seeds_extracted: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        // Try to load existing stats
        if let Err(e) = log.load() {
            warn!("Could not load previous transparency stats: {e}");
        }

        log
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_opened(&self) {
        self.windows_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_closed(&self) {
        self.windows_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reading_received(&self) {
        self.readings_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reading_processed(&self) {
        self.readings_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reading_dropped(&self) {
        self.readings_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_measurements_appended(&self, count: u64) {
        self.measurements_appended.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_measurements_rejected(&self, count: u64) {
        self.measurements_rejected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_overflow_resets(&self, count: u64) {
        self.overflow_resets.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_seed_extracted(&self) {
        self.seeds_extracted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            instance_id: self.instance_id.clone(),
            ticks: self.ticks.load(Ordering::Relaxed),
            windows_opened: self.windows_opened.load(Ordering::Relaxed),
            windows_closed: self.windows_closed.load(Ordering::Relaxed),
            readings_received: self.readings_received.load(Ordering::Relaxed),
            readings_processed: self.readings_processed.load(Ordering::Relaxed),
            readings_dropped: self.readings_dropped.load(Ordering::Relaxed),
            measurements_appended: self.measurements_appended.load(Ordering::Relaxed),
            measurements_rejected: self.measurements_rejected.load(Ordering::Relaxed),
            overflow_resets: self.overflow_resets.load(Ordering::Relaxed),
            seeds_extracted: self.seeds_extracted.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds() as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics ({}):\n\
             - Scheduler ticks: {}\n\
             - Sampling windows opened/closed: {}/{}\n\
             - Readings received: {}\n\
             - Readings converted: {}\n\
             - Readings dropped (conversion busy): {}\n\
             - Measurements appended: {}\n\
             - Measurements rejected: {}\n\
             - Accumulator overflow resets: {}\n\
             - Seeds extracted: {}\n\
             - Session duration: {} seconds\n\
             \n\
             The accumulator lives in memory only and is never written to disk.",
            stats.instance_id,
            stats.ticks,
            stats.windows_opened,
            stats.windows_closed,
            stats.readings_received,
            stats.readings_processed,
            stats.readings_dropped,
            stats.measurements_appended,
            stats.measurements_rejected,
            stats.overflow_resets,
            stats.seeds_extracted,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                ticks: stats.ticks,
                windows_opened: stats.windows_opened,
                windows_closed: stats.windows_closed,
                readings_received: stats.readings_received,
                readings_processed: stats.readings_processed,
                readings_dropped: stats.readings_dropped,
                measurements_appended: stats.measurements_appended,
                measurements_rejected: stats.measurements_rejected,
                overflow_resets: stats.overflow_resets,
                seeds_extracted: stats.seeds_extracted,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.ticks.store(persisted.ticks, Ordering::Relaxed);
                self.windows_opened
                    .store(persisted.windows_opened, Ordering::Relaxed);
                self.windows_closed
                    .store(persisted.windows_closed, Ordering::Relaxed);
                self.readings_received
                    .store(persisted.readings_received, Ordering::Relaxed);
                self.readings_processed
                    .store(persisted.readings_processed, Ordering::Relaxed);
                self.readings_dropped
                    .store(persisted.readings_dropped, Ordering::Relaxed);
                self.measurements_appended
                    .store(persisted.measurements_appended, Ordering::Relaxed);
                self.measurements_rejected
                    .store(persisted.measurements_rejected, Ordering::Relaxed);
                self.overflow_resets
                    .store(persisted.overflow_resets, Ordering::Relaxed);
                self.seeds_extracted
                    .store(persisted.seeds_extracted, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.ticks,
            &self.windows_opened,
            &self.windows_closed,
            &self.readings_received,
            &self.readings_processed,
            &self.readings_dropped,
            &self.measurements_appended,
            &self.measurements_rejected,
            &self.overflow_resets,
            &self.seeds_extracted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub instance_id: String,
    pub ticks: u64,
    pub windows_opened: u64,
    pub windows_closed: u64,
    pub readings_received: u64,
    pub readings_processed: u64,
    pub readings_dropped: u64,
    pub measurements_appended: u64,
    pub measurements_rejected: u64,
    pub overflow_resets: u64,
    pub seeds_extracted: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Cumulative counters carried across runs.
///
/// Counters missing from an older file load as zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedStats {
    pub ticks: u64,
    #[serde(default)]
    pub windows_opened: u64,
    #[serde(default)]
    pub windows_closed: u64,
    pub readings_received: u64,
    pub readings_processed: u64,
    pub readings_dropped: u64,
    #[serde(default)]
    pub measurements_appended: u64,
    #[serde(default)]
    pub measurements_rejected: u64,
    pub overflow_resets: u64,
    pub seeds_extracted: u64,
    pub last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparency_log_counting() {
        let log = TransparencyLog::new();

        log.record_reading_received();
        log.record_reading_received();
        log.record_reading_dropped();
        log.record_measurements_appended(3);

        let stats = log.stats();
        assert_eq!(stats.readings_received, 2);
        assert_eq!(stats.readings_dropped, 1);
        assert_eq!(stats.measurements_appended, 3);
        assert_eq!(stats.instance_id, log.instance_id());
    }

    #[test]
    fn test_transparency_log_reset() {
        let log = TransparencyLog::new();

        log.record_tick();
        log.record_overflow_resets(4);
        log.record_seed_extracted();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.ticks, 0);
        assert_eq!(stats.overflow_resets, 0);
        assert_eq!(stats.seeds_extracted, 0);
    }

    #[test]
    fn test_summary_format() {
        let log = TransparencyLog::new();
        let summary = log.summary();

        assert!(summary.contains("Readings dropped"));
        assert!(summary.contains("overflow resets"));
        assert!(summary.contains("never written to disk"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_tick();
        log.record_window_opened();
        log.record_window_closed();
        log.record_reading_received();
        log.record_reading_processed();
        log.record_reading_dropped();
        log.record_measurements_appended(3);
        log.record_measurements_rejected(2);
        log.record_overflow_resets(1);
        log.record_seed_extracted();
        log.save().unwrap();

        let reloaded = TransparencyLog::with_persistence(path);
        let stats = reloaded.stats();
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.windows_opened, 1);
        assert_eq!(stats.windows_closed, 1);
        assert_eq!(stats.readings_received, 1);
        assert_eq!(stats.readings_processed, 1);
        assert_eq!(stats.readings_dropped, 1);
        assert_eq!(stats.measurements_appended, 3);
        assert_eq!(stats.measurements_rejected, 2);
        assert_eq!(stats.overflow_resets, 1);
        assert_eq!(stats.seeds_extracted, 1);
        assert_ne!(stats.instance_id, log.instance_id());
    }

    #[test]
    fn test_older_persisted_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transparency.json");
        std::fs::write(
            &path,
            r#"{"ticks":4,"readings_received":2,"readings_processed":2,"readings_dropped":0,
                "overflow_resets":0,"seeds_extracted":1,"last_updated":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let stats = TransparencyLog::with_persistence(path).stats();
        assert_eq!(stats.ticks, 4);
        assert_eq!(stats.windows_opened, 0);
        assert_eq!(stats.measurements_appended, 0);
    }
}
