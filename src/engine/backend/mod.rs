//! Backend abstractions for microphone capture.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::audio::CaptureThreadChannels;
use crate::error::AudioError;

/// Context provided to capture backends when a recording starts.
///
/// The backend owns the real-time side of the buffer pool for the life of
/// the stream and reports device loss through `fault`.
pub struct CaptureStartContext {
    pub channels: CaptureThreadChannels,
    pub sample_rate: u32,
    pub fault: std::sync::Arc<CaptureFault>,
}

/// Trait implemented by platform-specific capture backends.
///
/// A backend drives at most one input stream at a time; the microphone
/// lease upstream guarantees that.
pub trait CaptureBackend: Send + Sync {
    fn start(&self, ctx: CaptureStartContext) -> Result<(), AudioError>;
    /// Stop the stream. Stopping an idle backend is a no-op.
    fn stop(&self) -> Result<(), AudioError>;
    fn name(&self) -> &'static str;
}

/// Device-loss slot shared between a stream and its analysis worker.
///
/// `raise` is called from the platform error callback, never from the data
/// callback, so the reason mutex is off the real-time path.
#[derive(Debug, Default)]
pub struct CaptureFault {
    raised: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl CaptureFault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the first fault; later ones are ignored
    pub fn raise(&self, reason: impl Into<String>) {
        if self.raised.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut slot) = self.reason.lock() {
            *slot = Some(reason.into());
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        if !self.is_raised() {
            return None;
        }
        let reason = self
            .reason
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| "input device lost".to_string());
        Some(reason)
    }
}

/// Trait representing a monotonic time source used for telemetry timestamps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic time source for tests and CLI runs.
///
/// Each call to `now()` advances by a fixed 10ms.
pub struct StubTimeSource {
    start: Instant,
    offset_ms: AtomicU64,
}

impl StubTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }
}

impl Default for StubTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for StubTimeSource {
    fn now(&self) -> Instant {
        let ms = self.offset_ms.fetch_add(10, Ordering::SeqCst);
        self.start + Duration::from_millis(ms)
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        mod oboe;
        pub use oboe::OboeBackend;
    } else {
        mod cpal;
        pub use cpal::CpalBackend;
    }
}

mod fixture;
pub use fixture::{FixtureBackend, FixturePace};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_keeps_first_reason() {
        let fault = CaptureFault::new();
        assert!(!fault.is_raised());
        assert_eq!(fault.reason(), None);

        fault.raise("phone call");
        fault.raise("unplugged");
        assert!(fault.is_raised());
        assert_eq!(fault.reason().as_deref(), Some("phone call"));
    }

    #[test]
    fn test_stub_time_source_is_monotonic() {
        let source = StubTimeSource::new();
        let a = source.now();
        let b = source.now();
        assert_eq!(b.duration_since(a), Duration::from_millis(10));
    }
}
