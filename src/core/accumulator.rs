//! Bounded byte accumulator for serialized sensor readings.
//!
//! The buffer starts as the single sentinel byte `[0]` and grows by
//! concatenation. An append that would take it past [`MAX_BUFFER_LEN`] wipes
//! it back to the sentinel instead of storing the oversized value. Nothing is
//! trimmed or kept from before the wipe.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Maximum number of bytes the accumulator may hold.
pub const MAX_BUFFER_LEN: usize = 512;

/// Value of the initial and post-overflow buffer.
pub const SENTINEL: [u8; 1] = [0];

/// What an append did to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The bytes were concatenated; `len` is the new buffer length
    Appended { len: usize },
    /// The concatenation exceeded the cap and the buffer was wiped to the sentinel
    Reset,
}

/// Growing byte buffer with wipe-on-overflow semantics.
#[derive(Debug, Clone)]
pub struct ByteAccumulator {
    buffer: Vec<u8>,
}

impl ByteAccumulator {
    /// Create an accumulator holding only the sentinel.
    pub fn new() -> Self {
        let mut buffer = Vec::with_capacity(MAX_BUFFER_LEN);
        buffer.extend_from_slice(&SENTINEL);
        Self { buffer }
    }

    /// Append `bytes`, or wipe to the sentinel if the result would exceed the cap.
    pub fn append(&mut self, bytes: &[u8]) -> AppendOutcome {
        if self.buffer.len() + bytes.len() > MAX_BUFFER_LEN {
            self.buffer.clear();
            self.buffer.extend_from_slice(&SENTINEL);
            return AppendOutcome::Reset;
        }
        self.buffer.extend_from_slice(bytes);
        AppendOutcome::Appended {
            len: self.buffer.len(),
        }
    }

    /// Current buffer length in bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Always false: the buffer holds at least the sentinel.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether the buffer is exactly the sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.buffer == SENTINEL
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

impl Default for ByteAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulator shared between the conversion worker and seed readers.
///
/// Each append holds the write lock only for its own concatenation, so a
/// reader sees the buffer either before or after a given append, never torn.
#[derive(Debug, Clone, Default)]
pub struct SharedAccumulator {
    inner: Arc<RwLock<ByteAccumulator>>,
}

impl SharedAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, bytes: &[u8]) -> AppendOutcome {
        self.write().append(bytes)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn is_sentinel(&self) -> bool {
        self.read().is_sentinel()
    }

    /// Run `f` against the current buffer contents.
    pub(crate) fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.read().as_bytes())
    }

    // A panic while holding the lock cannot leave the Vec half-written, so
    // poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, ByteAccumulator> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ByteAccumulator> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_sentinel() {
        let acc = ByteAccumulator::new();
        assert_eq!(acc.as_bytes(), &[0]);
        assert!(acc.is_sentinel());
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_appends_concatenate_in_order() {
        let mut acc = ByteAccumulator::new();
        assert_eq!(acc.append(&[1, 2]), AppendOutcome::Appended { len: 3 });
        assert_eq!(acc.append(&[3]), AppendOutcome::Appended { len: 4 });
        assert_eq!(acc.append(&[]), AppendOutcome::Appended { len: 4 });
        assert_eq!(acc.as_bytes(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_fill_to_exact_cap_is_kept() {
        let mut acc = ByteAccumulator::new();
        let chunk = [0xAB; 73];
        for _ in 0..7 {
            acc.append(&chunk);
        }
        assert_eq!(acc.len(), 1 + 7 * 73);
        assert_eq!(acc.len(), MAX_BUFFER_LEN);
        assert_eq!(&acc.as_bytes()[1..], &[0xAB; 511][..]);
    }

    #[test]
    fn test_overflow_wipes_to_sentinel() {
        let mut acc = ByteAccumulator::new();
        acc.append(&[7; 508]);
        assert_eq!(acc.len(), 509);

        // 509 + 4 = 513 > 512
        assert_eq!(acc.append(&[1, 2, 3, 4]), AppendOutcome::Reset);
        assert_eq!(acc.as_bytes(), &SENTINEL);

        // Accumulation resumes from the sentinel
        assert_eq!(acc.append(&[9]), AppendOutcome::Appended { len: 2 });
        assert_eq!(acc.as_bytes(), &[0, 9]);
    }

    #[test]
    fn test_single_oversized_append_resets() {
        let mut acc = ByteAccumulator::new();
        acc.append(&[5, 5]);
        assert_eq!(acc.append(&[1; MAX_BUFFER_LEN]), AppendOutcome::Reset);
        assert!(acc.is_sentinel());
    }

    #[test]
    fn test_shared_accumulator_views() {
        let shared = SharedAccumulator::new();
        let clone = shared.clone();
        clone.append(&[1, 2, 3]);
        assert_eq!(shared.len(), 4);
        assert_eq!(shared.with_bytes(|b| b.to_vec()), vec![0, 1, 2, 3]);
        assert!(!shared.is_sentinel());
    }
}
