//! Periodic sampling scheduler.
//!
//! A dedicated thread owns the sample source while the scheduler runs. On
//! every tick it opens a sampling window by enabling each configured channel
//! the source supports. When the conversion worker reports a finished
//! conversion the window is closed again, either straight away or after
//! `close_delay`. All source calls happen on this one thread, so the source
//! itself needs no locking.

use crate::collector::{CollectorError, ReadingListener, SampleSource, SensorKind};
use crate::transparency::SharedTransparencyLog;
use crossbeam_channel::{after, never, select, tick, unbounded, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Fast tick cadence.
pub const FAST_TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Slow, battery-friendly tick cadence.
pub const SLOW_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// How long a window stays open after a conversion completes.
pub const DEFAULT_CLOSE_DELAY: Duration = Duration::from_secs(2);

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Period between ticks; the first tick fires on start
    pub tick_interval: Duration,
    /// Delay between a completed conversion and the window closing
    pub close_delay: Duration,
    /// Channels to request, in probe order
    pub channels: Vec<SensorKind>,
}

impl SchedulerConfig {
    /// Check that every window can close before the next tick.
    ///
    /// A zero interval would tick continuously, and a tick at or before the
    /// close delay would keep re-arming channels that are about to close.
    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.tick_interval.is_zero() {
            return Err(CollectorError::InvalidSchedule(
                "tick interval must be greater than zero".to_string(),
            ));
        }
        if self.tick_interval <= self.close_delay {
            return Err(CollectorError::InvalidSchedule(format!(
                "tick interval ({:?}) must be longer than the close delay ({:?})",
                self.tick_interval, self.close_delay
            )));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: FAST_TICK_INTERVAL,
            close_delay: DEFAULT_CLOSE_DELAY,
            channels: SensorKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug)]
enum Command {
    Tick,
    ConversionDone,
    Stop,
}

/// Cloneable handle for poking a running scheduler from other threads.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: Sender<Command>,
}

impl SchedulerHandle {
    /// Request an immediate tick outside the periodic cadence.
    ///
    /// Ignored if the scheduler is not running when the request is read.
    pub fn trigger_sampling_window(&self) {
        let _ = self.commands.send(Command::Tick);
    }

    /// Report that a conversion finished, so the window may close.
    pub fn notify_conversion_done(&self) {
        let _ = self.commands.send(Command::ConversionDone);
    }
}

/// Opens and closes sampling windows on a sample source.
pub struct SampleScheduler {
    config: SchedulerConfig,
    supported: Vec<SensorKind>,
    source: Option<Box<dyn SampleSource>>,
    commands: Sender<Command>,
    receiver: Receiver<Command>,
    transparency_log: SharedTransparencyLog,
    thread_handle: Option<JoinHandle<Box<dyn SampleSource>>>,
}

impl SampleScheduler {
    /// Create a stopped scheduler over `source`.
    pub fn new(
        source: Box<dyn SampleSource>,
        config: SchedulerConfig,
        transparency_log: SharedTransparencyLog,
    ) -> Self {
        let (commands, receiver) = unbounded();
        Self {
            supported: source.supported_channels(),
            config,
            source: Some(source),
            commands,
            receiver,
            transparency_log,
            thread_handle: None,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            commands: self.commands.clone(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Channels the underlying source supports.
    pub fn supported_channels(&self) -> &[SensorKind] {
        &self.supported
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Register the reading listener on the source.
    ///
    /// The source is owned by the scheduler thread while running, so the
    /// listener can only be replaced while stopped.
    pub fn set_listener(&mut self, listener: ReadingListener) -> Result<(), CollectorError> {
        match self.source.as_mut() {
            Some(source) => {
                source.set_listener(listener);
                Ok(())
            }
            None => Err(CollectorError::AlreadyRunning),
        }
    }

    /// Start ticking. The first window opens immediately.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.is_running() {
            return Err(CollectorError::AlreadyRunning);
        }
        self.config.validate()?;
        let Some(source) = self.source.take() else {
            return Err(CollectorError::AlreadyRunning);
        };

        // Drop anything left over from a previous run
        while self.receiver.try_recv().is_ok() {}

        let receiver = self.receiver.clone();
        let config = self.config.clone();
        let log = self.transparency_log.clone();
        let handle = thread::Builder::new()
            .name("seed-scheduler".to_string())
            .spawn(move || run_scheduler(source, receiver, config, log))
            .map_err(|e| CollectorError::SchedulerUnavailable(e.to_string()))?;

        info!(
            interval_secs = self.config.tick_interval.as_secs(),
            "Sampling scheduler started"
        );
        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop ticking and disable every channel. Safe to call when stopped.
    pub fn stop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.commands.send(Command::Stop);
            match handle.join() {
                Ok(source) => self.source = Some(source),
                Err(_) => error!("Scheduler thread panicked; sample source lost"),
            }
            info!("Sampling scheduler stopped");
        }
        if let Some(source) = self.source.as_mut() {
            source.disable_all();
        }
    }
}

impl Drop for SampleScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Scheduler thread body. Returns the source so it can be restarted.
fn run_scheduler(
    source: Box<dyn SampleSource>,
    commands: Receiver<Command>,
    config: SchedulerConfig,
    transparency_log: SharedTransparencyLog,
) -> Box<dyn SampleSource> {
    let ticker = tick(config.tick_interval);
    let mut window = Window {
        source,
        channels: config.channels,
        is_open: false,
        transparency_log,
    };
    let mut close_at: Option<Receiver<Instant>> = None;

    window.open();

    let mut running = true;
    while running {
        let close = close_at.clone().unwrap_or_else(never);
        select! {
            recv(ticker) -> _ => {
                if !window.is_open {
                    close_at = None;
                }
                window.open();
            }
            recv(close) -> _ => {
                close_at = None;
                window.close();
            }
            recv(commands) -> command => match command {
                // A pending close still applies to an already open window
                Ok(Command::Tick) => {
                    if !window.is_open {
                        close_at = None;
                    }
                    window.open();
                }
                Ok(Command::ConversionDone) if window.is_open => {
                    if config.close_delay.is_zero() {
                        window.close();
                    } else if close_at.is_none() {
                        close_at = Some(after(config.close_delay));
                    }
                }
                Ok(Command::ConversionDone) => {}
                Ok(Command::Stop) | Err(_) => running = false,
            },
        }
    }

    window.close();
    window.source
}

/// The sampling-window state owned by the scheduler thread.
struct Window {
    source: Box<dyn SampleSource>,
    channels: Vec<SensorKind>,
    is_open: bool,
    transparency_log: SharedTransparencyLog,
}

impl Window {
    fn open(&mut self) {
        self.transparency_log.record_tick();

        let mut enabled = 0usize;
        for kind in &self.channels {
            let kind = *kind;
            if !self.source.supports(kind) {
                debug!(channel = %kind, "Channel not available, skipping");
                continue;
            }
            match self.source.enable(kind, kind.default_rate()) {
                Ok(()) => enabled += 1,
                Err(e) => warn!(channel = %kind, "Could not enable channel: {e}"),
            }
        }

        if enabled == 0 {
            debug!(source = self.source.name(), "Tick enabled no channels");
            return;
        }
        if !self.is_open {
            self.is_open = true;
            self.transparency_log.record_window_opened();
            debug!(channels = enabled, "Sampling window opened");
        }
    }

    fn close(&mut self) {
        if !self.is_open {
            return;
        }
        self.source.disable_all();
        self.is_open = false;
        self.transparency_log.record_window_closed();
        debug!("Sampling window closed");
    }
}
