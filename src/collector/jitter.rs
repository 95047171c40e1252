//! Portable sample source backed by OS timer and scheduling jitter.
//!
//! Each enabled channel gets its own emitter thread. The thread sleeps for the
//! channel's sampling period and turns the measured overshoot, plus a few
//! yield/spin timings, into the channel's measurement values. The numbers are
//! noisy in the same way a physical sensor's low bits are, which is all the
//! accumulator needs.

use crate::collector::types::{RawReading, SamplingRate, SensorKind};
use crate::collector::{CollectorError, ReadingListener, SampleSource};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// A running emitter thread for one channel.
struct ChannelHandle {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            // The thread exits once it observes running == false
            let _ = handle.join();
        }
    }
}

/// Jitter-driven sample source.
pub struct JitterSource {
    capabilities: HashSet<SensorKind>,
    listener: Option<ReadingListener>,
    channels: HashMap<SensorKind, ChannelHandle>,
}

impl JitterSource {
    /// A source that supports every channel.
    pub fn new() -> Self {
        Self::with_channels(&SensorKind::ALL)
    }

    /// A source that only supports the given channels.
    pub fn with_channels(kinds: &[SensorKind]) -> Self {
        Self {
            capabilities: kinds.iter().copied().collect(),
            listener: None,
            channels: HashMap::new(),
        }
    }
}

impl Default for JitterSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for JitterSource {
    fn name(&self) -> &'static str {
        "jitter"
    }

    fn supports(&self, kind: SensorKind) -> bool {
        self.capabilities.contains(&kind)
    }

    fn set_listener(&mut self, listener: ReadingListener) {
        self.listener = Some(listener);
    }

    fn enable(&mut self, kind: SensorKind, rate: SamplingRate) -> Result<(), CollectorError> {
        if !self.supports(kind) {
            return Err(CollectorError::MissingCapability(kind));
        }
        if self.channels.contains_key(&kind) {
            return Ok(());
        }
        let listener = self
            .listener
            .clone()
            .ok_or_else(|| CollectorError::EnableFailed {
                kind,
                reason: "no reading listener registered".to_string(),
            })?;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let handle = thread::Builder::new()
            .name(format!("jitter-{kind}"))
            .spawn(move || run_emitter(kind, rate, listener, thread_running))
            .map_err(|e| CollectorError::EnableFailed {
                kind,
                reason: e.to_string(),
            })?;

        self.channels.insert(
            kind,
            ChannelHandle {
                running,
                thread_handle: Some(handle),
            },
        );
        Ok(())
    }

    fn disable(&mut self, kind: SensorKind) {
        if let Some(mut channel) = self.channels.remove(&kind) {
            channel.stop();
        }
    }

    fn is_enabled(&self, kind: SensorKind) -> bool {
        self.channels.contains_key(&kind)
    }
}

impl Drop for JitterSource {
    fn drop(&mut self) {
        self.disable_all();
    }
}

/// Emit readings for one channel until `running` is cleared.
fn run_emitter(
    kind: SensorKind,
    rate: SamplingRate,
    listener: ReadingListener,
    running: Arc<AtomicBool>,
) {
    let period = rate.period();
    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        thread::sleep(period);
        let overshoot = started.elapsed().saturating_sub(period);

        // Re-check after sleeping so nothing is delivered after disable() returns
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let mut values = Vec::with_capacity(kind.value_count());
        values.push(overshoot.as_nanos() as f32);
        while values.len() < kind.value_count() {
            values.push(yield_timing_nanos());
        }

        listener(RawReading::new(kind, values));
    }
}

/// Time a yield plus a short data-dependent spin, in nanoseconds.
fn yield_timing_nanos() -> f32 {
    let t0 = Instant::now();
    thread::yield_now();
    let mut sink: u64 = t0.elapsed().subsec_nanos() as u64;
    for j in 0..(sink % 64) {
        sink = sink.wrapping_mul(6364136223846793005).wrapping_add(j);
    }
    std::hint::black_box(sink);
    t0.elapsed().as_nanos() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_listener() -> (ReadingListener, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let listener: ReadingListener = Arc::new(move |reading: RawReading| {
            assert_eq!(reading.values.len(), reading.channel.value_count());
            c.fetch_add(1, Ordering::SeqCst);
        });
        (listener, count)
    }

    #[test]
    fn test_enable_requires_capability() {
        let mut source = JitterSource::with_channels(&[SensorKind::Light]);
        let (listener, _) = counting_listener();
        source.set_listener(listener);

        assert_eq!(
            source.enable(SensorKind::Gyroscope, SamplingRate::Fastest),
            Err(CollectorError::MissingCapability(SensorKind::Gyroscope))
        );
        assert!(!source.is_enabled(SensorKind::Gyroscope));
    }

    #[test]
    fn test_enable_without_listener_fails() {
        let mut source = JitterSource::new();
        let result = source.enable(SensorKind::Light, SamplingRate::Fastest);
        assert!(matches!(result, Err(CollectorError::EnableFailed { .. })));
    }

    #[test]
    fn test_emits_until_disabled() {
        let mut source = JitterSource::new();
        let (listener, count) = counting_listener();
        source.set_listener(listener);

        source
            .enable(SensorKind::Gyroscope, SamplingRate::Fastest)
            .unwrap();
        // Re-enabling is a no-op, not a second emitter
        source
            .enable(SensorKind::Gyroscope, SamplingRate::Fastest)
            .unwrap();
        assert!(source.is_enabled(SensorKind::Gyroscope));

        thread::sleep(Duration::from_millis(100));
        source.disable(SensorKind::Gyroscope);
        assert!(!source.is_enabled(SensorKind::Gyroscope));

        let after_disable = count.load(Ordering::SeqCst);
        assert!(after_disable > 0);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after_disable);
    }

    #[test]
    fn test_disable_idle_channel_is_noop() {
        let mut source = JitterSource::new();
        source.disable(SensorKind::Light);
        source.disable_all();
        assert!(!source.is_enabled(SensorKind::Light));
    }
}
