//! The seed service: one object wiring source, scheduler, worker and buffer.
//!
//! ```text
//! tick ──▶ SampleScheduler ──enable──▶ SampleSource
//!                  ▲                        │ RawReading (source threads)
//!                  │ conversion done        ▼
//!                  └──────────── ConversionWorker ──append──▶ ByteAccumulator
//!                                                                  │
//!                                   get_seed() ◀── SeedExtractor ◀─┘
//! ```

use crate::collector::{CollectorError, RawReading, ReadingListener, SampleSource, SensorKind};
use crate::config::{Config, SeedMode};
use crate::core::accumulator::SharedAccumulator;
use crate::core::conversion::{ConversionError, ConversionWorker};
use crate::core::scheduler::{SampleScheduler, SchedulerHandle};
use crate::core::seed::{Seed, SeedError, SeedExtractor};
use crate::transparency::{SharedTransparencyLog, TransparencyStats};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// How long [`SeedService::sample_now`] waits by default before reading the seed.
pub const DEFAULT_SAMPLE_WAIT: Duration = Duration::from_millis(1500);

/// Long-lived entropy collection service.
///
/// Dropping the service stops the scheduler, disables every channel and
/// shuts the conversion worker down.
pub struct SeedService {
    // Declared first so it is dropped, and its channels disabled, first
    scheduler: SampleScheduler,
    scheduler_handle: SchedulerHandle,
    worker: ConversionWorker,
    accumulator: SharedAccumulator,
    extractor: SeedExtractor,
    seed_mode: SeedMode,
    transparency_log: SharedTransparencyLog,
}

impl SeedService {
    /// Build a stopped service over `source`.
    pub fn new(
        source: Box<dyn SampleSource>,
        config: &Config,
        transparency_log: SharedTransparencyLog,
    ) -> Result<Self, ServiceError> {
        config.scheduler_config().validate()?;

        let accumulator = SharedAccumulator::new();
        let mut scheduler =
            SampleScheduler::new(source, config.scheduler_config(), transparency_log.clone());
        let scheduler_handle = scheduler.handle();

        let completion = scheduler_handle.clone();
        let worker = ConversionWorker::spawn(
            accumulator.clone(),
            config.conversion_options(),
            transparency_log.clone(),
            Arc::new(move || completion.notify_conversion_done()),
        )?;

        let submissions = worker.handle();
        let listener: ReadingListener = Arc::new(move |reading: RawReading| {
            submissions.submit(reading);
        });
        scheduler.set_listener(listener)?;

        Ok(Self {
            scheduler,
            scheduler_handle,
            worker,
            accumulator,
            extractor: SeedExtractor::new(config.digest_algorithm.clone()),
            seed_mode: config.seed_mode,
            transparency_log,
        })
    }

    /// Start periodic sampling. The first window opens immediately.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        self.scheduler.start()
    }

    /// Stop sampling and disable every channel. Idempotent.
    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Open a sampling window now, outside the periodic cadence.
    pub fn trigger_sampling_window(&self) {
        self.scheduler_handle.trigger_sampling_window();
    }

    /// Current seed material.
    ///
    /// In digest mode this hashes the accumulator as it is right now; an append
    /// racing with the call may or may not be included.
    pub fn get_seed(&self) -> Result<Seed, SeedError> {
        let seed = match self.seed_mode {
            SeedMode::Digest => self
                .accumulator
                .with_bytes(|bytes| self.extractor.extract(bytes))?,
            SeedMode::Raw => Seed::raw(self.accumulator.with_bytes(|bytes| bytes.to_vec())),
        };
        self.transparency_log.record_seed_extracted();
        debug!(algorithm = %seed.algorithm, len = seed.len(), "Seed extracted");
        Ok(seed)
    }

    /// Trigger a window, give it `wait` to collect, then return the seed.
    pub fn sample_now(&self, wait: Duration) -> Result<Seed, SeedError> {
        self.trigger_sampling_window();
        thread::sleep(wait);
        self.get_seed()
    }

    pub fn seed_mode(&self) -> SeedMode {
        self.seed_mode
    }

    /// Channels the source supports.
    pub fn supported_channels(&self) -> &[SensorKind] {
        self.scheduler.supported_channels()
    }

    /// Current accumulator length in bytes.
    pub fn accumulator_len(&self) -> usize {
        self.accumulator.len()
    }

    /// Whether a conversion is in flight right now.
    pub fn conversion_in_flight(&self) -> bool {
        self.worker.handle().guard().is_occupied()
    }

    pub fn stats(&self) -> TransparencyStats {
        self.transparency_log.stats()
    }

    pub fn transparency_log(&self) -> &SharedTransparencyLog {
        &self.transparency_log
    }
}

/// Errors raised while assembling a [`SeedService`].
#[derive(Debug)]
pub enum ServiceError {
    Collector(CollectorError),
    Conversion(ConversionError),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Collector(e) => write!(f, "Collector error: {e}"),
            ServiceError::Conversion(e) => write!(f, "Conversion error: {e}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<CollectorError> for ServiceError {
    fn from(e: CollectorError) -> Self {
        ServiceError::Collector(e)
    }
}

impl From<ConversionError> for ServiceError {
    fn from(e: ConversionError) -> Self {
        ServiceError::Conversion(e)
    }
}

impl Drop for SeedService {
    fn drop(&mut self) {
        self.stop();
    }
}
