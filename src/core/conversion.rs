//! Single-flight conversion of sensor readings into accumulator bytes.
//!
//! Readings arrive on whatever thread the sample source uses. Submission
//! claims the [`InFlightGuard`] with a compare-and-swap and hands the reading
//! to a dedicated worker thread; if the guard is already held the reading is
//! dropped on the spot. The guard is released by dropping its permit, which
//! happens on every path out of the worker, including a panic during
//! conversion.

use crate::collector::types::RawReading;
use crate::core::accumulator::{AppendOutcome, SharedAccumulator};
use crate::transparency::SharedTransparencyLog;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

/// Readings with more values than this are rejected as malformed.
pub const MAX_VALUES_PER_READING: usize = 16;

/// Bytes of OS randomness placed on each side of a salted measurement.
pub const SALT_LEN: usize = 8;

/// Serialize one measurement as its IEEE-754 big-endian bytes.
pub fn serialize_measurement(value: f32) -> [u8; 4] {
    value.to_be_bytes()
}

/// The single slot that admits at most one conversion at a time.
#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    occupied: Arc<AtomicBool>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or `None` if a conversion is already in flight.
    pub fn try_acquire(&self) -> Option<InFlightPermit> {
        self.occupied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightPermit {
                occupied: self.occupied.clone(),
            })
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied.load(Ordering::Acquire)
    }
}

/// Proof of holding the in-flight slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct InFlightPermit {
    occupied: Arc<AtomicBool>,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.occupied.store(false, Ordering::Release);
    }
}

/// Per-reading conversion settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversionOptions {
    /// Frame every measurement with OS-random bytes before appending
    pub salt_readings: bool,
}

/// What converting one reading did to the accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionReport {
    /// Measurements that ended up in the buffer
    pub appended: usize,
    /// Measurements skipped as malformed
    pub rejected: usize,
    /// Measurements that overflowed and wiped the buffer back to the sentinel
    pub resets: usize,
}

/// Fold every measurement of `reading` into the accumulator.
///
/// A malformed reading is rejected before anything is appended. A malformed
/// single value is skipped and the rest of the reading still goes in.
pub fn convert_reading(
    reading: &RawReading,
    accumulator: &SharedAccumulator,
    options: ConversionOptions,
) -> Result<ConversionReport, ConversionError> {
    if reading.values.is_empty() {
        return Err(ConversionError::EmptyReading);
    }
    if reading.values.len() > MAX_VALUES_PER_READING {
        return Err(ConversionError::TooManyValues {
            count: reading.values.len(),
            max: MAX_VALUES_PER_READING,
        });
    }

    let mut report = ConversionReport::default();
    for (index, value) in reading.values.iter().copied().enumerate() {
        let frame = match frame_measurement(index, value, options) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(channel = %reading.channel, "Skipping measurement: {e}");
                report.rejected += 1;
                continue;
            }
        };
        match accumulator.append(&frame) {
            AppendOutcome::Appended { .. } => report.appended += 1,
            AppendOutcome::Reset => {
                debug!("Accumulator overflowed, wiped to sentinel");
                report.resets += 1;
            }
        }
    }
    Ok(report)
}

fn frame_measurement(
    index: usize,
    value: f32,
    options: ConversionOptions,
) -> Result<Vec<u8>, ConversionError> {
    if !value.is_finite() {
        return Err(ConversionError::NonFinite { index, value });
    }
    let bytes = serialize_measurement(value);
    if !options.salt_readings {
        return Ok(bytes.to_vec());
    }

    let mut frame = vec![0u8; SALT_LEN * 2 + bytes.len()];
    getrandom::fill(&mut frame[..SALT_LEN])
        .map_err(|e| ConversionError::SaltUnavailable(e.to_string()))?;
    frame[SALT_LEN..SALT_LEN + bytes.len()].copy_from_slice(&bytes);
    getrandom::fill(&mut frame[SALT_LEN + bytes.len()..])
        .map_err(|e| ConversionError::SaltUnavailable(e.to_string()))?;
    Ok(frame)
}

/// Called on the worker thread after each conversion, once the guard is free.
pub type CompletionHook = Arc<dyn Fn() + Send + Sync>;

/// Outcome of offering a reading to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The reading was claimed and queued for conversion
    Accepted,
    /// A conversion was already in flight; the reading was discarded
    Dropped,
    /// The worker has shut down
    WorkerStopped,
}

struct Job {
    reading: RawReading,
    permit: InFlightPermit,
}

/// Cheap, cloneable submission side of the conversion worker.
#[derive(Clone)]
pub struct ConversionHandle {
    guard: InFlightGuard,
    sender: Sender<Job>,
    transparency_log: SharedTransparencyLog,
}

impl ConversionHandle {
    /// Offer a reading. Never blocks the calling thread.
    pub fn submit(&self, reading: RawReading) -> Submission {
        self.transparency_log.record_reading_received();

        let Some(permit) = self.guard.try_acquire() else {
            trace!(channel = %reading.channel, "Conversion in flight, dropping reading");
            self.transparency_log.record_reading_dropped();
            return Submission::Dropped;
        };

        // Holding the permit means the single job slot is empty, so the only
        // way a send fails is a stopped worker. The permit travels back inside
        // the returned job and is dropped here.
        match self.sender.try_send(Job { reading, permit }) {
            Ok(()) => Submission::Accepted,
            Err(TrySendError::Disconnected(_) | TrySendError::Full(_)) => {
                Submission::WorkerStopped
            }
        }
    }

    pub fn guard(&self) -> &InFlightGuard {
        &self.guard
    }
}

/// Background thread that converts claimed readings one at a time.
pub struct ConversionWorker {
    handle: ConversionHandle,
    shutdown: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ConversionWorker {
    /// Spawn the worker thread.
    pub fn spawn(
        accumulator: SharedAccumulator,
        options: ConversionOptions,
        transparency_log: SharedTransparencyLog,
        on_complete: CompletionHook,
    ) -> Result<Self, ConversionError> {
        // The guard keeps at most one job outstanding, so one slot is enough
        let (sender, jobs) = bounded::<Job>(1);
        let (shutdown, shutdown_rx) = bounded::<()>(0);
        let log = transparency_log.clone();

        let thread_handle = thread::Builder::new()
            .name("seed-conversion".to_string())
            .spawn(move || run_worker(jobs, shutdown_rx, accumulator, options, log, on_complete))
            .map_err(|e| ConversionError::WorkerUnavailable(e.to_string()))?;

        Ok(Self {
            handle: ConversionHandle {
                guard: InFlightGuard::new(),
                sender,
                transparency_log,
            },
            shutdown: Some(shutdown),
            thread_handle: Some(thread_handle),
        })
    }

    /// A submission handle that can be moved into a reading listener.
    pub fn handle(&self) -> ConversionHandle {
        self.handle.clone()
    }

    /// Stop the worker, letting an already claimed reading finish first.
    ///
    /// Handles submitting afterwards get [`Submission::WorkerStopped`].
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        // Disconnecting the shutdown channel wakes the worker
        self.shutdown.take();
        if let Some(thread_handle) = self.thread_handle.take() {
            if thread_handle.join().is_err() {
                error!("Conversion worker exited by panic");
            }
        }
    }
}

impl Drop for ConversionWorker {
    fn drop(&mut self) {
        self.join();
    }
}

fn run_worker(
    jobs: Receiver<Job>,
    shutdown: Receiver<()>,
    accumulator: SharedAccumulator,
    options: ConversionOptions,
    transparency_log: SharedTransparencyLog,
    on_complete: CompletionHook,
) {
    let process = |job: Job| {
        let Job { reading, permit } = job;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            convert_reading(&reading, &accumulator, options)
        }));

        match result {
            Ok(Ok(report)) => {
                transparency_log.record_reading_processed();
                transparency_log.record_measurements_appended(report.appended as u64);
                transparency_log.record_measurements_rejected(report.rejected as u64);
                transparency_log.record_overflow_resets(report.resets as u64);
            }
            Ok(Err(e)) => {
                warn!(channel = %reading.channel, "Rejected reading: {e}");
                transparency_log.record_measurements_rejected(reading.values.len() as u64);
            }
            Err(_) => {
                error!(channel = %reading.channel, "Conversion panicked; reading discarded");
            }
        }

        drop(permit);
        on_complete();
    };

    let mut running = true;
    while running {
        select! {
            recv(jobs) -> job => match job {
                Ok(job) => process(job),
                Err(_) => running = false,
            },
            recv(shutdown) -> _ => running = false,
        }
    }

    // A reading claimed before shutdown still gets converted
    while let Ok(job) = jobs.try_recv() {
        process(job);
    }
    debug!("Conversion worker stopped");
}

/// Errors raised while converting a reading. None of them stop the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// The reading carried no values
    EmptyReading,
    /// The reading carried more values than any channel produces
    TooManyValues { count: usize, max: usize },
    /// A value was NaN or infinite
    NonFinite { index: usize, value: f32 },
    /// OS randomness for salting could not be read
    SaltUnavailable(String),
    /// The worker thread could not be started
    WorkerUnavailable(String),
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionError::EmptyReading => write!(f, "Reading has no values"),
            ConversionError::TooManyValues { count, max } => {
                write!(f, "Reading has {count} values, at most {max} allowed")
            }
            ConversionError::NonFinite { index, value } => {
                write!(f, "Value {index} is not finite ({value})")
            }
            ConversionError::SaltUnavailable(e) => write!(f, "OS randomness unavailable: {e}"),
            ConversionError::WorkerUnavailable(e) => {
                write!(f, "Could not start conversion worker: {e}")
            }
        }
    }
}

impl std::error::Error for ConversionError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::SensorKind;
    use crate::transparency::create_shared_log;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::time::{Duration, Instant};

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_serialize_is_big_endian() {
        assert_eq!(serialize_measurement(1.0), [0x3f, 0x80, 0x00, 0x00]);
        assert_eq!(serialize_measurement(-2.5), [0xc0, 0x20, 0x00, 0x00]);
    }

    #[test]
    fn test_guard_is_exclusive() {
        let guard = InFlightGuard::new();
        let permit = guard.try_acquire().expect("free guard");
        assert!(guard.is_occupied());
        assert!(guard.try_acquire().is_none());

        drop(permit);
        assert!(!guard.is_occupied());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_guard_admits_one_of_many_concurrent_claims() {
        let guard = InFlightGuard::new();
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let guard = guard.clone();
                let barrier = barrier.clone();
                let winners = winners.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let permit = guard.try_acquire();
                    if permit.is_some() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                    // Hold any permit until every thread has tried
                    barrier.wait();
                    drop(permit);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(!guard.is_occupied());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let guard = InFlightGuard::new();
        let g = guard.clone();
        let result = thread::spawn(move || {
            let _permit = g.try_acquire().unwrap();
            panic!("conversion failed");
        })
        .join();
        assert!(result.is_err());
        assert!(!guard.is_occupied());
    }

    #[test]
    fn test_convert_reading_appends_big_endian_values() {
        let acc = SharedAccumulator::new();
        let reading = RawReading::new(SensorKind::Gyroscope, vec![1.0, -2.5]);

        let report = convert_reading(&reading, &acc, ConversionOptions::default()).unwrap();
        assert_eq!(report.appended, 2);
        assert_eq!(report.rejected, 0);
        assert_eq!(
            acc.with_bytes(|b| b.to_vec()),
            vec![0x00, 0x3f, 0x80, 0x00, 0x00, 0xc0, 0x20, 0x00, 0x00]
        );
    }

    #[test]
    fn test_malformed_readings_leave_buffer_untouched() {
        let acc = SharedAccumulator::new();

        let empty = RawReading::new(SensorKind::Light, vec![]);
        assert_eq!(
            convert_reading(&empty, &acc, ConversionOptions::default()),
            Err(ConversionError::EmptyReading)
        );

        let oversized = RawReading::new(SensorKind::Pose6Dof, vec![0.5; 17]);
        assert!(matches!(
            convert_reading(&oversized, &acc, ConversionOptions::default()),
            Err(ConversionError::TooManyValues { count: 17, .. })
        ));
        assert!(acc.is_sentinel());
    }

    #[test]
    fn test_non_finite_value_is_skipped() {
        let acc = SharedAccumulator::new();
        let reading = RawReading::new(SensorKind::Accelerometer, vec![f32::NAN, 1.0, f32::INFINITY]);

        let report = convert_reading(&reading, &acc, ConversionOptions::default()).unwrap();
        assert_eq!(report.appended, 1);
        assert_eq!(report.rejected, 2);
        assert_eq!(acc.with_bytes(|b| b.to_vec()), vec![0, 0x3f, 0x80, 0, 0]);
    }

    #[test]
    fn test_salted_measurement_frame() {
        let acc = SharedAccumulator::new();
        let reading = RawReading::new(SensorKind::Light, vec![1.0]);
        let options = ConversionOptions {
            salt_readings: true,
        };

        convert_reading(&reading, &acc, options).unwrap();
        let bytes = acc.with_bytes(|b| b.to_vec());
        assert_eq!(bytes.len(), 1 + SALT_LEN * 2 + 4);
        assert_eq!(&bytes[1 + SALT_LEN..1 + SALT_LEN + 4], &[0x3f, 0x80, 0, 0]);
    }

    #[test]
    fn test_overflow_is_reported() {
        let acc = SharedAccumulator::new();
        acc.append(&[1; 507]);
        let reading = RawReading::new(SensorKind::Gyroscope, vec![1.0, 2.0]);

        // 508 + 4 = 512 fits, the second value overflows
        let report = convert_reading(&reading, &acc, ConversionOptions::default()).unwrap();
        assert_eq!(report.appended, 1);
        assert_eq!(report.resets, 1);
        assert!(acc.is_sentinel());
    }

    #[test]
    fn test_worker_drops_while_in_flight() {
        let acc = SharedAccumulator::new();
        let log = create_shared_log();
        let completions = Arc::new(AtomicUsize::new(0));
        let c = completions.clone();
        let worker = ConversionWorker::spawn(
            acc.clone(),
            ConversionOptions::default(),
            log.clone(),
            Arc::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        let handle = worker.handle();

        // Simulate a conversion already in flight
        let held = handle.guard().try_acquire().unwrap();
        for _ in 0..5 {
            let reading = RawReading::new(SensorKind::Light, vec![3.0]);
            assert_eq!(handle.submit(reading), Submission::Dropped);
        }
        assert!(acc.is_sentinel());
        drop(held);

        let reading = RawReading::new(SensorKind::Light, vec![1.0]);
        assert_eq!(handle.submit(reading), Submission::Accepted);
        wait_until(|| completions.load(Ordering::SeqCst) == 1);
        wait_until(|| !handle.guard().is_occupied());

        assert_eq!(acc.len(), 5);
        let stats = log.stats();
        assert_eq!(stats.readings_received, 6);
        assert_eq!(stats.readings_dropped, 5);
        assert_eq!(stats.readings_processed, 1);
        assert_eq!(stats.measurements_appended, 1);

        worker.shutdown();
    }

    #[test]
    fn test_worker_releases_guard_after_rejected_reading() {
        let acc = SharedAccumulator::new();
        let worker = ConversionWorker::spawn(
            acc.clone(),
            ConversionOptions::default(),
            create_shared_log(),
            Arc::new(|| {}),
        )
        .unwrap();
        let handle = worker.handle();

        let bad = RawReading::new(SensorKind::Light, vec![]);
        assert_eq!(handle.submit(bad), Submission::Accepted);
        wait_until(|| !handle.guard().is_occupied());

        let good = RawReading::new(SensorKind::Light, vec![-2.5]);
        assert_eq!(handle.submit(good), Submission::Accepted);
        wait_until(|| acc.len() == 5);
    }

    #[test]
    fn test_back_to_back_submissions_are_all_accepted() {
        let acc = SharedAccumulator::new();
        let log = create_shared_log();
        let worker = ConversionWorker::spawn(
            acc.clone(),
            ConversionOptions::default(),
            log.clone(),
            Arc::new(|| {}),
        )
        .unwrap();
        let handle = worker.handle();

        // Once the guard is free the job slot is free too
        for i in 0..20 {
            wait_until(|| !handle.guard().is_occupied());
            let reading = RawReading::new(SensorKind::Light, vec![i as f32]);
            assert_eq!(handle.submit(reading), Submission::Accepted);
        }
        wait_until(|| log.stats().readings_processed == 20);

        assert_eq!(log.stats().readings_dropped, 0);
        assert_eq!(acc.len(), 1 + 4 * 20);
        worker.shutdown();
    }

    #[test]
    fn test_submit_after_shutdown() {
        let worker = ConversionWorker::spawn(
            SharedAccumulator::new(),
            ConversionOptions::default(),
            create_shared_log(),
            Arc::new(|| {}),
        )
        .unwrap();
        let handle = worker.handle();
        worker.shutdown();

        let reading = RawReading::new(SensorKind::Light, vec![1.0]);
        assert_eq!(handle.submit(reading), Submission::WorkerStopped);
        assert!(!handle.guard().is_occupied());
    }
}
