//! CPAL-based capture backend for desktop platforms (Linux, macOS, Windows)
//!
//! `cpal::Stream` is not `Send`, so each recording gets a small owner
//! thread that builds the stream, plays it, and drops it when told to stop.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::{log_audio_error, AudioError};

use super::{CaptureBackend, CaptureFault, CaptureStartContext};

struct StreamOwner {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Default-input-device capture through cpal
#[derive(Default)]
pub struct CpalBackend {
    owner: Mutex<Option<StreamOwner>>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_input_stream(ctx: CaptureStartContext) -> Result<cpal::Stream, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioError::StreamOpenFailed {
                reason: "No default input device found".to_string(),
            })?;

        let config = device
            .default_input_config()
            .map_err(|e| {
                AudioError::open_failed(format!("Failed to get default input config: {:?}", e))
            })?;

        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(AudioError::StreamOpenFailed {
                reason: "Only F32 sample format is currently supported for input".to_string(),
            });
        }

        let mut stream_config: cpal::StreamConfig = config.into();
        stream_config.sample_rate = cpal::SampleRate(ctx.sample_rate);
        let channel_count = stream_config.channels as usize;

        let CaptureStartContext {
            mut channels,
            fault,
            ..
        } = ctx;
        let error_fault: Arc<CaptureFault> = fault;

        device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    channels.push_interleaved(data, channel_count);
                },
                move |err| error_fault.raise(err.to_string()),
                None,
            )
            .map_err(|e| AudioError::open_failed(format!("{:?}", e)))
    }
}

impl CaptureBackend for CpalBackend {
    fn start(&self, ctx: CaptureStartContext) -> Result<(), AudioError> {
        let mut guard = self.owner.lock().map_err(|_| AudioError::LockPoisoned {
            component: "CpalBackend".to_string(),
        })?;
        if guard.is_some() {
            return Err(AudioError::ResourceBusy);
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("cpal-capture".to_string())
            .spawn(move || {
                let stream = match Self::build_input_stream(ctx) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::HardwareError {
                        details: format!("Input start failed: {}", e),
                    }));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Sender dropped or stop requested: either way the stream goes
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("capture thread: {}", e),
            })?;

        let started = ready_rx.recv().unwrap_or_else(|_| {
            Err(AudioError::StreamFailure {
                reason: "capture thread exited before reporting".to_string(),
            })
        });

        match started {
            Ok(()) => {
                *guard = Some(StreamOwner { stop_tx, handle });
                tracing::info!("[CpalBackend] Input stream started");
                Ok(())
            }
            Err(err) => {
                let _ = handle.join();
                log_audio_error(&err, "CpalBackend::start");
                Err(err)
            }
        }
    }

    fn stop(&self) -> Result<(), AudioError> {
        let owner = self
            .owner
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "CpalBackend".to_string(),
            })?
            .take();

        if let Some(owner) = owner {
            let _ = owner.stop_tx.send(());
            owner.handle.join().map_err(|_| AudioError::StreamFailure {
                reason: "capture thread panicked".to_string(),
            })?;
            tracing::info!("[CpalBackend] Input stream stopped");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}
