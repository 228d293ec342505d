//! Recording lifecycle on top of a capture backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::analysis::{AnalysisWorker, RecordingBuffer, VoiceSample, VoiceSampleSinks};
use crate::audio::{BufferPool, Microphone, MicrophoneLease};
use crate::config::AppConfig;
use crate::engine::backend::{
    CaptureBackend, CaptureFault, CaptureStartContext, SystemTimeSource, TimeSource,
};
use crate::error::{log_audio_error, AudioError, ConfigError};
use crate::telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Recording,
    Stopped,
    Error,
}

/// Factory for recording sessions sharing one backend and one output stream
///
/// The analysis output channels outlive individual sessions so UI
/// subscribers stay attached across takes.
#[derive(Clone)]
pub struct Recorder {
    backend: Arc<dyn CaptureBackend>,
    config: Arc<AppConfig>,
    microphone: Arc<Microphone>,
    sinks: VoiceSampleSinks,
    clock: Arc<dyn TimeSource>,
}

impl Recorder {
    /// Validates the pitch configuration up front so a bad frame size fails
    /// here rather than when the first take starts.
    pub fn new(backend: Arc<dyn CaptureBackend>, config: AppConfig) -> Result<Self, ConfigError> {
        config.pitch.validate()?;
        Ok(Self::from_validated(backend, config))
    }

    /// Caller has already run `PitchConfig::validate`
    pub(crate) fn from_validated(backend: Arc<dyn CaptureBackend>, config: AppConfig) -> Self {
        let sinks = VoiceSampleSinks::new(config.capture.sample_channel_capacity);
        Self {
            backend,
            config: Arc::new(config),
            microphone: Microphone::global(),
            sinks,
            clock: Arc::new(SystemTimeSource::default()),
        }
    }

    /// Measure session elapsed time against another clock
    pub fn with_time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Contend on a private microphone instead of the process-wide one
    pub fn with_microphone(mut self, microphone: Arc<Microphone>) -> Self {
        self.microphone = microphone;
        self
    }

    /// Publish ordered samples into an externally owned broadcast channel
    pub fn with_sample_sender(mut self, sender: broadcast::Sender<VoiceSample>) -> Self {
        self.sinks = VoiceSampleSinks::with_sender(sender);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn microphone(&self) -> &Arc<Microphone> {
        &self.microphone
    }

    /// New idle session
    pub fn session(&self) -> RecordingSession {
        RecordingSession {
            backend: Arc::clone(&self.backend),
            config: Arc::clone(&self.config),
            microphone: Arc::clone(&self.microphone),
            sinks: self.sinks.clone(),
            clock: Arc::clone(&self.clock),
            state: RecordingState::Idle,
            active: None,
        }
    }

    /// Create and start a session in one step
    pub fn start(&self) -> Result<RecordingSession, AudioError> {
        let mut session = self.session();
        session.start()?;
        Ok(session)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VoiceSample> {
        self.sinks.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<Option<VoiceSample>> {
        self.sinks.watch()
    }

    pub fn latest(&self) -> Option<VoiceSample> {
        self.sinks.latest()
    }
}

struct ActiveCapture {
    lease: MicrophoneLease,
    shutdown: Arc<AtomicBool>,
    fault: Arc<CaptureFault>,
    worker: JoinHandle<RecordingBuffer>,
    started_at: Instant,
}

/// One take: holds the microphone from `start` until `stop` or drop
pub struct RecordingSession {
    backend: Arc<dyn CaptureBackend>,
    config: Arc<AppConfig>,
    microphone: Arc<Microphone>,
    sinks: VoiceSampleSinks,
    clock: Arc<dyn TimeSource>,
    state: RecordingState,
    active: Option<ActiveCapture>,
}

impl RecordingSession {
    /// Current state; a capture fault flips a running session to `Error`
    /// before `stop` is called.
    pub fn state(&self) -> RecordingState {
        match &self.active {
            Some(active) if active.fault.is_raised() => RecordingState::Error,
            _ => self.state,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    pub fn elapsed(&self) -> Duration {
        self.active
            .as_ref()
            .map(|active| self.clock.now().saturating_duration_since(active.started_at))
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VoiceSample> {
        self.sinks.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<Option<VoiceSample>> {
        self.sinks.watch()
    }

    /// Latest smoothed value published by the analysis thread
    pub fn latest(&self) -> Option<VoiceSample> {
        self.sinks.latest()
    }

    /// Acquire the microphone and begin capture
    ///
    /// # Errors
    /// - `ResourceBusy` if any recording (including this one) holds the microphone
    /// - `StreamFailure` if this session already finished; sessions are single-use
    /// - backend errors when the platform stream cannot be opened
    pub fn start(&mut self) -> Result<(), AudioError> {
        match self.state() {
            RecordingState::Idle => {}
            RecordingState::Recording => return Err(AudioError::ResourceBusy),
            RecordingState::Stopped | RecordingState::Error => {
                return Err(AudioError::StreamFailure {
                    reason: "recording session already finished".to_string(),
                })
            }
        }

        let lease = self.microphone.acquire()?;
        let (capture, analysis) = BufferPool::new(
            self.config.capture.buffer_pool_size.max(1),
            self.config.capture.buffer_size.max(1),
        )
        .split_for_threads();
        let shutdown = Arc::new(AtomicBool::new(false));
        let fault = Arc::new(CaptureFault::new());

        // A fresh worker means a fresh smoother: no history leaks between takes
        let worker = AnalysisWorker::new(
            analysis,
            &self.config,
            self.sinks.clone(),
            Arc::clone(&shutdown),
            Arc::clone(&fault),
        )
        .map_err(|err| AudioError::StreamOpenFailed {
            reason: err.to_string(),
        })?;
        let worker = worker.spawn()?;

        let sample_rate = self.config.pitch.sample_rate;
        if let Err(err) = self.backend.start(CaptureStartContext {
            channels: capture,
            sample_rate,
            fault: Arc::clone(&fault),
        }) {
            log_audio_error(&err, "RecordingSession::start");
            shutdown.store(true, Ordering::SeqCst);
            let _ = worker.join();
            self.state = RecordingState::Error;
            return Err(err);
        }

        telemetry::hub().record_recording_started(self.backend.name(), sample_rate);
        tracing::info!(
            "[RecordingSession] Recording started on {} backend at {} Hz",
            self.backend.name(),
            sample_rate
        );

        self.active = Some(ActiveCapture {
            lease,
            shutdown,
            fault,
            worker,
            started_at: self.clock.now(),
        });
        self.state = RecordingState::Recording;
        Ok(())
    }

    /// Stop capture and return the finalized take
    ///
    /// Returns `Ok(None)` when the session already stopped, so racing UI and
    /// timer stops are harmless. A take interrupted by the platform is
    /// discarded and reported as `CaptureInterrupted`.
    pub fn stop(&mut self) -> Result<Option<RecordingBuffer>, AudioError> {
        let Some(active) = self.active.take() else {
            return match self.state {
                RecordingState::Idle => Err(AudioError::NotRecording),
                _ => Ok(None),
            };
        };

        let fault = Arc::clone(&active.fault);
        let (backend_result, take) = Self::teardown(self.backend.as_ref(), active);

        if let Some(reason) = fault.reason() {
            self.state = RecordingState::Error;
            let err = AudioError::CaptureInterrupted { reason };
            log_audio_error(&err, "RecordingSession::stop");
            telemetry::hub().record_capture_interrupted(fault.reason().unwrap_or_default());
            return Err(err);
        }

        let take = match backend_result.and(take) {
            Ok(take) => take,
            Err(err) => {
                self.state = RecordingState::Error;
                log_audio_error(&err, "RecordingSession::stop");
                return Err(err);
            }
        };

        self.state = RecordingState::Stopped;
        telemetry::hub().record_recording_stopped(take.duration_ms, take.voiced_frames);
        tracing::info!(
            "[RecordingSession] Recording stopped after {} ms",
            take.duration_ms
        );
        Ok(Some(take))
    }

    /// Stop the stream, let the worker drain, then release the microphone
    fn teardown(
        backend: &dyn CaptureBackend,
        active: ActiveCapture,
    ) -> (Result<(), AudioError>, Result<RecordingBuffer, AudioError>) {
        let ActiveCapture {
            lease,
            shutdown,
            worker,
            ..
        } = active;

        let backend_result = backend.stop();
        shutdown.store(true, Ordering::SeqCst);
        let take = worker.join().map_err(|_| AudioError::StreamFailure {
            reason: "analysis thread panicked".to_string(),
        });
        drop(lease);
        (backend_result, take)
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = Self::teardown(self.backend.as_ref(), active);
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
