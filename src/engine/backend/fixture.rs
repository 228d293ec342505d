use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::AudioError;

use super::{CaptureBackend, CaptureStartContext};

/// How fast the fixture feeder delivers blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixturePace {
    /// One block per block-duration of wall-clock time
    Realtime,
    /// As fast as the analysis thread recycles buffers
    Unthrottled,
}

struct Feeder {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Capture backend that replays a sample vector instead of a microphone.
///
/// Used by tests, the CLI and desktop QA. Unlike a real device, the feeder
/// waits for a free buffer instead of dropping blocks, so every sample
/// reaches the analysis thread.
pub struct FixtureBackend {
    samples: Arc<Vec<f32>>,
    block_size: usize,
    pace: FixturePace,
    fault_after: Option<(usize, String)>,
    open_error: Option<String>,
    feeder: Mutex<Option<Feeder>>,
    finished: Arc<AtomicBool>,
}

impl FixtureBackend {
    pub fn new(samples: Vec<f32>, block_size: usize) -> Self {
        Self {
            samples: Arc::new(samples),
            block_size: block_size.max(1),
            pace: FixturePace::Unthrottled,
            fault_after: None,
            open_error: None,
            feeder: Mutex::new(None),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_pace(mut self, pace: FixturePace) -> Self {
        self.pace = pace;
        self
    }

    /// Simulate the OS revoking the device after `blocks` blocks
    pub fn with_fault_after(mut self, blocks: usize, reason: impl Into<String>) -> Self {
        self.fault_after = Some((blocks, reason.into()));
        self
    }

    /// Fail every start as if the platform refused to open the stream
    pub fn with_open_error(mut self, reason: impl Into<String>) -> Self {
        self.open_error = Some(reason.into());
        self
    }

    /// True once the current replay delivered every block (or faulted)
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Block until the current replay is done, up to `timeout`
    pub fn wait_until_finished(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while !self.is_finished() {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

impl CaptureBackend for FixtureBackend {
    fn start(&self, ctx: CaptureStartContext) -> Result<(), AudioError> {
        let mut guard = self.feeder.lock().map_err(|_| AudioError::LockPoisoned {
            component: "FixtureBackend".to_string(),
        })?;
        if guard.is_some() {
            return Err(AudioError::ResourceBusy);
        }
        if let Some(reason) = &self.open_error {
            return Err(AudioError::open_failed(reason.clone()));
        }

        self.finished.store(false, Ordering::SeqCst);
        let stop = Arc::new(AtomicBool::new(false));
        let samples = Arc::clone(&self.samples);
        let finished = Arc::clone(&self.finished);
        let block_size = self.block_size;
        let pace = self.pace;
        let fault_after = self.fault_after.clone();
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("fixture-capture".to_string())
            .spawn(move || {
                let CaptureStartContext {
                    mut channels,
                    sample_rate,
                    fault,
                } = ctx;
                let block_duration =
                    Duration::from_secs_f64(block_size as f64 / sample_rate.max(1) as f64);

                for (index, block) in samples.chunks(block_size).enumerate() {
                    if let Some((limit, reason)) = &fault_after {
                        if index >= *limit {
                            fault.raise(reason.clone());
                            break;
                        }
                    }
                    while !channels.has_free_buffer() {
                        if stop_flag.load(Ordering::SeqCst) {
                            return;
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                    if stop_flag.load(Ordering::SeqCst) {
                        return;
                    }
                    channels.push_interleaved(block, 1);
                    if pace == FixturePace::Realtime {
                        thread::sleep(block_duration);
                    }
                }
                finished.store(true, Ordering::SeqCst);
            })
            .map_err(|err| AudioError::StreamOpenFailed {
                reason: format!("fixture feeder: {}", err),
            })?;

        *guard = Some(Feeder { stop, handle });
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        let feeder = {
            let mut guard = self.feeder.lock().map_err(|_| AudioError::LockPoisoned {
                component: "FixtureBackend".to_string(),
            })?;
            guard.take()
        };

        if let Some(feeder) = feeder {
            feeder.stop.store(true, Ordering::SeqCst);
            feeder
                .handle
                .join()
                .map_err(|_| AudioError::StreamFailure {
                    reason: "fixture feeder panicked".to_string(),
                })?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
