//! Oboe capture backend for Android.
//!
//! Opens a low-latency exclusive mono input stream whose callback copies
//! each block into the pre-allocated buffer pool.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use oboe::{
    AudioInputCallback, AudioInputStreamSafe, AudioStream, AudioStreamAsync, AudioStreamBuilder,
    DataCallbackResult, Input, Mono, PerformanceMode, SharingMode,
};

use crate::audio::CaptureThreadChannels;
use crate::error::{log_audio_error, AudioError};

use super::{CaptureBackend, CaptureFault, CaptureStartContext};

/// Real-time input callback: no allocation, no locks, no logging
struct CaptureCallback {
    channels: CaptureThreadChannels,
    fault: Arc<CaptureFault>,
}

impl AudioInputCallback for CaptureCallback {
    type FrameType = (f32, Mono);

    fn on_audio_ready(
        &mut self,
        _stream: &mut dyn AudioInputStreamSafe,
        audio_data: &[f32],
    ) -> DataCallbackResult {
        self.channels.push_interleaved(audio_data, 1);
        DataCallbackResult::Continue
    }

    fn on_error_before_close(
        &mut self,
        _stream: &mut dyn AudioInputStreamSafe,
        error: oboe::Error,
    ) {
        self.fault.raise(format!("{:?}", error));
    }
}

/// Android backend driving an Oboe input stream.
#[derive(Default)]
pub struct OboeBackend {
    stream: Mutex<Option<AudioStreamAsync<Input, CaptureCallback>>>,
}

impl OboeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureBackend for OboeBackend {
    fn start(&self, ctx: CaptureStartContext) -> Result<(), AudioError> {
        if !crate::ANDROID_CONTEXT_READY.load(Ordering::SeqCst) {
            return Err(AudioError::ContextNotInitialized);
        }

        let mut guard = self.stream.lock().map_err(|_| AudioError::LockPoisoned {
            component: "OboeBackend".to_string(),
        })?;
        if guard.is_some() {
            return Err(AudioError::ResourceBusy);
        }

        let CaptureStartContext {
            channels,
            sample_rate,
            fault,
        } = ctx;

        let mut stream = AudioStreamBuilder::default()
            .set_performance_mode(PerformanceMode::LowLatency)
            .set_sharing_mode(SharingMode::Exclusive)
            .set_direction::<Input>()
            .set_sample_rate(sample_rate as i32)
            .set_channel_count::<Mono>()
            .set_format::<f32>()
            .set_callback(CaptureCallback { channels, fault })
            .open_stream()
            .map_err(|e| {
                let err = AudioError::open_failed(format!("Input stream: {:?}", e));
                log_audio_error(&err, "OboeBackend::start");
                err
            })?;

        stream.start().map_err(|e| AudioError::HardwareError {
            details: format!("Failed to start input stream: {:?}", e),
        })?;

        *guard = Some(stream);
        tracing::info!("[OboeBackend] Input stream started at {} Hz", sample_rate);
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        let stream = self
            .stream
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "OboeBackend".to_string(),
            })?
            .take();

        if let Some(mut stream) = stream {
            stream.stop().map_err(|e| AudioError::HardwareError {
                details: format!("Failed to stop input stream: {:?}", e),
            })?;
            tracing::info!("[OboeBackend] Input stream stopped");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "oboe"
    }
}
