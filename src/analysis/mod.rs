// Analysis module - DSP pipeline for live pitch measurement
//
// This module orchestrates the per-recording analysis pipeline, consuming
// captured buffers from the real-time side and publishing smoothed voice
// samples for the UI.
//
// Architecture:
// - AnalysisWorker: dedicated thread that drains DATA_QUEUE in arrival order
// - Pipeline: re-framing → PitchEstimator → PitchSmoother → SettleTracker
// - Output: VoiceSample via tokio watch (latest) + broadcast (ordered),
//   and a RecordingBuffer returned when the thread is joined

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::audio::{AnalysisThreadChannels, AudioFrame};
use crate::config::AppConfig;
use crate::engine::backend::CaptureFault;
use crate::error::{AudioError, ConfigError};
use crate::telemetry;

pub mod classifier;
pub mod history;
pub mod pitch;
pub mod reference;
pub mod settle;
pub mod smoother;

pub use classifier::{classify, VoiceCategory, VoiceProfile};
pub use history::{MeasurementContext, MeasurementHistory, PitchTrend, VoiceMeasurement};
pub use pitch::{PitchEstimate, PitchEstimator};
pub use reference::{
    calculate_projections, hz_to_semitones, is_valid_voice_pitch, nearest_reference,
    PitchProjection, ReferenceVoice, REFERENCE_VOICES,
};
pub use settle::SettleTracker;
pub use smoother::{PitchSmoother, SmoothedSample};

/// Seconds of audio the take buffer reserves up front
const INITIAL_TAKE_SECONDS: usize = 10;

/// Live value published once per analysed frame
///
/// This struct is sent to the Dart UI via flutter_rust_bridge Stream for the
/// pitch meter and level bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSample {
    /// Smoothed pitch, None while no voice is detected
    pub pitch_hz: Option<f32>,
    /// Level above the noise floor (0.0-1.0)
    pub level: f32,
    /// Raw estimator confidence for this frame
    pub confidence: f32,
    /// Settled pitch while the current voiced run qualifies
    pub settled_hz: Option<f32>,
    /// Milliseconds since the recording started
    pub timestamp_ms: u64,
}

/// Finalized take handed back when a recording stops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_ms: u64,
    /// None when no run ever settled (silent input, not an error)
    pub settled_hz: Option<f32>,
    pub pitch_min_hz: Option<f32>,
    pub pitch_max_hz: Option<f32>,
    pub voiced_frames: u32,
    pub total_frames: u32,
}

impl RecordingBuffer {
    pub fn is_silent(&self) -> bool {
        self.voiced_frames == 0
    }
}

/// Output side of the analysis pipeline, shared by every recording
#[derive(Clone)]
pub struct VoiceSampleSinks {
    latest: watch::Sender<Option<VoiceSample>>,
    ordered: broadcast::Sender<VoiceSample>,
}

impl VoiceSampleSinks {
    pub fn new(capacity: usize) -> Self {
        let (ordered, _) = broadcast::channel(capacity.max(1));
        Self::with_sender(ordered)
    }

    /// Publish into an existing broadcast channel
    pub fn with_sender(ordered: broadcast::Sender<VoiceSample>) -> Self {
        let (latest, _) = watch::channel(None);
        Self { latest, ordered }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VoiceSample> {
        self.ordered.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<Option<VoiceSample>> {
        self.latest.subscribe()
    }

    pub fn latest(&self) -> Option<VoiceSample> {
        *self.latest.borrow()
    }

    fn publish(&self, sample: VoiceSample) {
        self.latest.send_replace(Some(sample));
        // No receivers is fine; the watch still holds the value
        let _ = self.ordered.send(sample);
    }

    fn clear(&self) {
        self.latest.send_replace(None);
    }
}

/// Per-recording analysis state
///
/// Owns the analysis end of the buffer pool plus the DSP pipeline. Built on
/// the caller's thread so configuration errors surface before capture opens.
pub struct AnalysisWorker {
    channels: AnalysisThreadChannels,
    estimator: PitchEstimator,
    smoother: PitchSmoother,
    settle: SettleTracker,
    sinks: VoiceSampleSinks,
    shutdown: Arc<AtomicBool>,
    fault: Arc<CaptureFault>,
    sample_rate: u32,
    frame_size: usize,
    hop: usize,
    samples: Vec<f32>,
    next_frame: usize,
    pitch_min_hz: Option<f32>,
    pitch_max_hz: Option<f32>,
    voiced_frames: u32,
    total_frames: u32,
}

impl AnalysisWorker {
    pub fn new(
        channels: AnalysisThreadChannels,
        config: &AppConfig,
        sinks: VoiceSampleSinks,
        shutdown: Arc<AtomicBool>,
        fault: Arc<CaptureFault>,
    ) -> Result<Self, ConfigError> {
        let estimator = PitchEstimator::new(&config.pitch)?;
        let frame_size = estimator.frame_size();
        let sample_rate = config.pitch.sample_rate;

        Ok(Self {
            channels,
            estimator,
            smoother: PitchSmoother::new(config.smoothing.clone()),
            settle: SettleTracker::new(config.smoothing.settle_seconds),
            sinks,
            shutdown,
            fault,
            sample_rate,
            frame_size,
            hop: (frame_size / 2).max(1),
            samples: Vec::with_capacity(sample_rate as usize * INITIAL_TAKE_SECONDS),
            next_frame: 0,
            pitch_min_hz: None,
            pitch_max_hz: None,
            voiced_frames: 0,
            total_frames: 0,
        })
    }

    /// Run on a dedicated thread; joining yields the finalized take
    pub fn spawn(self) -> Result<JoinHandle<RecordingBuffer>, AudioError> {
        let handle = thread::Builder::new()
            .name("voice-analysis".to_string())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// Drain the queue until shutdown or a capture fault, then finalize
    pub fn run(mut self) -> RecordingBuffer {
        tracing::info!(
            "[AnalysisThread] Starting analysis loop (frame {} / hop {} at {} Hz)",
            self.frame_size,
            self.hop,
            self.sample_rate
        );
        self.sinks.clear();

        loop {
            if self.fault.is_raised() {
                tracing::warn!(
                    "[AnalysisThread] Capture fault observed: {}",
                    self.fault.reason().unwrap_or_default()
                );
                break;
            }

            match self.channels.pop() {
                Some(buffer) => {
                    self.samples.extend_from_slice(&buffer);
                    self.channels.recycle(buffer);
                    telemetry::hub().record_backpressure(self.channels.dropped_blocks());
                    self.process_complete_frames();
                }
                None => {
                    // Shutdown is only honoured once queued audio is drained
                    if self.shutdown.load(Ordering::SeqCst) {
                        tracing::info!("[AnalysisThread] Shutdown flag set and queue empty, exiting");
                        break;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }

        self.finish()
    }

    /// Estimate every whole frame available; a partial tail waits for more
    /// audio and is never estimated if none arrives.
    fn process_complete_frames(&mut self) {
        while self.next_frame + self.frame_size <= self.samples.len() {
            let start = self.next_frame;
            let timestamp_ms = start as u64 * 1000 / self.sample_rate.max(1) as u64;
            let frame = AudioFrame::new(
                &self.samples[start..start + self.frame_size],
                self.sample_rate,
                timestamp_ms,
            );
            let rms = frame.rms();
            let estimate = self.estimator.estimate(&frame);
            let smoothed = self.smoother.process(&estimate, rms);
            let settled_hz = self.settle.observe(&smoothed);

            self.total_frames += 1;
            if let Some(hz) = smoothed.pitch_hz {
                self.voiced_frames += 1;
                self.pitch_min_hz = Some(self.pitch_min_hz.map_or(hz, |min| min.min(hz)));
                self.pitch_max_hz = Some(self.pitch_max_hz.map_or(hz, |max| max.max(hz)));
            }

            self.sinks.publish(VoiceSample {
                pitch_hz: smoothed.pitch_hz,
                level: smoothed.level,
                confidence: estimate.confidence,
                settled_hz,
                timestamp_ms,
            });
            self.next_frame += self.hop;
        }
    }

    fn finish(self) -> RecordingBuffer {
        let duration_ms = self.samples.len() as u64 * 1000 / self.sample_rate.max(1) as u64;
        tracing::info!(
            "[AnalysisThread] Take finalized: {} ms, {}/{} voiced frames, settled {:?}",
            duration_ms,
            self.voiced_frames,
            self.total_frames,
            self.settle.last_settled()
        );
        RecordingBuffer {
            samples: self.samples,
            sample_rate: self.sample_rate,
            duration_ms,
            settled_hz: self.settle.last_settled(),
            pitch_min_hz: self.pitch_min_hz,
            pitch_max_hz: self.pitch_max_hz,
            voiced_frames: self.voiced_frames,
            total_frames: self.total_frames,
        }
    }
}

/// Run a whole take through the pipeline without threads or capture
///
/// Used by the CLI `analyze` command and by tests that need the same
/// numbers a live recording would produce.
pub fn analyze_samples(samples: &[f32], config: &AppConfig) -> Result<RecordingBuffer, ConfigError> {
    let (_capture, analysis) =
        crate::audio::BufferPool::new(1, config.capture.buffer_size.max(1)).split_for_threads();
    let mut worker = AnalysisWorker::new(
        analysis,
        config,
        VoiceSampleSinks::new(1),
        Arc::new(AtomicBool::new(true)),
        Arc::new(CaptureFault::new()),
    )?;
    worker.samples.extend_from_slice(samples);
    worker.process_complete_frames();
    Ok(worker.finish())
}
