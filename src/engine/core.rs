//! EngineHandle: process-wide orchestration behind the FFI and CLI.
//!
//! Owns the configuration, the shared `Recorder`, the current measurement
//! and workout, and the progress ledger, which also keeps measurement
//! history. Async work (workout drivers and stream forwarders) runs on a
//! runtime the handle builds on first use, so callers never need a Tokio
//! context of their own.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;

use crate::analysis::{
    classify, MeasurementContext, PitchTrend, RecordingBuffer, VoiceMeasurement, VoiceProfile,
};
use crate::config::AppConfig;
use crate::engine::backend::CaptureBackend;
use crate::error::{log_config_error, log_workout_error, AudioError, ConfigError, WorkoutError};
use crate::managers::BroadcastChannelManager;
use crate::recording::{Recorder, RecordingSession};
use crate::workout::{
    Calendar, ExerciseCatalog, InMemoryProgressStore, JsonFileProgressStore, LocalCalendar,
    ProgressStore, StreakLedger, UserProgress, WorkoutCommand, WorkoutDriver, WorkoutHandle,
    WorkoutServices, WorkoutSnapshot,
};

#[path = "core_subscriptions.rs"]
mod core_subscriptions;

/// Progress is kept for a single local profile
const DEFAULT_PROFILE_ID: &str = "default";

/// Outcome of a stopped measurement
///
/// `profile` is None when the take never settled (silent input).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub settled_hz: Option<f32>,
    pub pitch_min_hz: Option<f32>,
    pub pitch_max_hz: Option<f32>,
    pub duration_ms: u64,
    pub voiced_frames: u32,
    pub profile: Option<VoiceProfile>,
}

impl From<&RecordingBuffer> for MeasurementResult {
    fn from(buffer: &RecordingBuffer) -> Self {
        Self {
            settled_hz: buffer.settled_hz,
            pitch_min_hz: buffer.pitch_min_hz,
            pitch_max_hz: buffer.pitch_max_hz,
            duration_ms: buffer.duration_ms,
            voiced_frames: buffer.voiced_frames,
            profile: buffer.settled_hz.map(classify),
        }
    }
}

/// EngineHandle orchestrates recordings, workouts and shared channels.
pub struct EngineHandle {
    config: Arc<RwLock<AppConfig>>,
    recorder: Recorder,
    pub(crate) broadcasts: BroadcastChannelManager,
    measurement: Mutex<Option<RecordingSession>>,
    workout: Mutex<Option<WorkoutHandle>>,
    ledger: RwLock<Arc<StreakLedger>>,
    calendar: Arc<dyn Calendar>,
    runtime: OnceCell<Runtime>,
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A panic while the workout slot was held leaves its handle unknown
fn lock_workout(
    slot: &Mutex<Option<WorkoutHandle>>,
) -> Result<MutexGuard<'_, Option<WorkoutHandle>>, WorkoutError> {
    slot.lock().map_err(|_| {
        let err = WorkoutError::StatePoisoned;
        log_workout_error(&err, "EngineHandle::workout");
        err
    })
}

impl EngineHandle {
    /// Create a new EngineHandle with platform defaults.
    pub fn new() -> Self {
        Self::from_config(Self::load_platform_config())
    }

    fn from_config(config: AppConfig) -> Self {
        let config = match config.pitch.validate() {
            Ok(()) => config,
            Err(err) => {
                log_config_error(&err, "EngineHandle::from_config");
                tracing::warn!("[EngineHandle] Falling back to default configuration");
                AppConfig::default()
            }
        };
        let recorder = Recorder::from_validated(Self::create_backend(), config.clone());
        Self::assemble(
            config,
            recorder,
            Arc::new(InMemoryProgressStore::new()),
            Arc::new(LocalCalendar),
        )
    }

    /// Assemble a handle from explicit collaborators
    pub fn with_parts(
        config: AppConfig,
        backend: Arc<dyn CaptureBackend>,
        store: Arc<dyn ProgressStore>,
        calendar: Arc<dyn Calendar>,
    ) -> Result<Self, ConfigError> {
        let recorder = Recorder::new(backend, config.clone())?;
        Ok(Self::assemble(config, recorder, store, calendar))
    }

    fn assemble(
        config: AppConfig,
        recorder: Recorder,
        store: Arc<dyn ProgressStore>,
        calendar: Arc<dyn Calendar>,
    ) -> Self {
        let broadcasts = BroadcastChannelManager::new();
        let samples = broadcasts.init_voice_samples(config.capture.sample_channel_capacity);

        Self {
            config: Arc::new(RwLock::new(config)),
            recorder: recorder.with_sample_sender(samples),
            broadcasts,
            measurement: Mutex::new(None),
            workout: Mutex::new(None),
            ledger: RwLock::new(Arc::new(StreakLedger::new(store, DEFAULT_PROFILE_ID))),
            calendar,
            runtime: OnceCell::new(),
        }
    }

    /// Swap in a different recorder, e.g. one holding a private microphone
    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        let sender = self
            .broadcasts
            .init_voice_samples(recorder.config().capture.sample_channel_capacity);
        self.recorder = recorder.with_sample_sender(sender);
        self
    }

    fn load_platform_config() -> AppConfig {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "android")] {
                AppConfig::load_android()
            } else {
                AppConfig::load()
            }
        }
    }

    fn create_backend() -> Arc<dyn CaptureBackend> {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "android")] {
                Arc::new(crate::engine::backend::OboeBackend::new())
            } else {
                Arc::new(crate::engine::backend::CpalBackend::new())
            }
        }
    }

    /// Runtime for workout drivers and stream forwarders
    pub(crate) fn runtime(&self) -> Result<&Runtime, AudioError> {
        self.runtime
            .get_or_try_init(|| {
                tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .thread_name("voice-engine")
                    .enable_all()
                    .build()
            })
            .map_err(AudioError::from)
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    // ========================================================================
    // MEASUREMENT METHODS
    // ========================================================================

    /// Start a standalone pitch measurement
    pub fn start_measurement(&self) -> Result<(), AudioError> {
        let mut slot = lock(&self.measurement);
        if slot.as_ref().is_some_and(|session| session.is_recording()) {
            return Err(AudioError::ResourceBusy);
        }
        *slot = Some(self.recorder.start()?);
        Ok(())
    }

    /// Stop the measurement, classify what was heard and add it to the
    /// stored history under `context`
    pub fn stop_measurement(
        &self,
        context: MeasurementContext,
    ) -> Result<MeasurementResult, AudioError> {
        let mut session = lock(&self.measurement)
            .take()
            .ok_or(AudioError::NotRecording)?;
        let buffer = session.stop()?.ok_or(AudioError::NotRecording)?;
        let result = MeasurementResult::from(&buffer);

        match VoiceMeasurement::from_buffer(&buffer, context) {
            // The result stands even if it could not be stored
            Some(measurement) => {
                if let Err(err) = self.ledger().record_measurement(&measurement) {
                    tracing::error!("[EngineHandle] Failed to store measurement: {}", err);
                }
            }
            None => tracing::info!("[EngineHandle] Measurement ended without a settled pitch"),
        }
        Ok(result)
    }

    pub fn is_measuring(&self) -> bool {
        lock(&self.measurement)
            .as_ref()
            .is_some_and(|session| session.is_recording())
    }

    /// Stored measurements of every context, oldest first
    pub fn measurement_history(&self) -> io::Result<Vec<VoiceMeasurement>> {
        Ok(self.ledger().history()?.measurements().to_vec())
    }

    pub fn pitch_trend(&self) -> io::Result<Option<PitchTrend>> {
        Ok(self.ledger().history()?.trend())
    }

    // ========================================================================
    // WORKOUT METHODS
    // ========================================================================

    /// Start a workout; a previous one must have ended
    pub fn start_workout(
        &self,
        catalog: Option<ExerciseCatalog>,
    ) -> Result<WorkoutSnapshot, WorkoutError> {
        let mut slot = lock_workout(&self.workout)?;
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(WorkoutError::AlreadyStarted);
        }

        let catalog = catalog.unwrap_or_else(ExerciseCatalog::default_workout);
        let workout_config = self.config_snapshot().workout;
        let services = WorkoutServices {
            recorder: self.recorder.clone(),
            ledger: self.ledger(),
            calendar: Arc::clone(&self.calendar),
        };

        let runtime = self.runtime().map_err(WorkoutError::Capture)?;
        let handle = runtime.block_on(WorkoutDriver::spawn(catalog, &workout_config, services))?;
        let snapshot = handle.snapshot();

        self.broadcasts.init_workout_snapshots(handle.subscribe());
        *slot = Some(handle);
        Ok(snapshot)
    }

    /// Run one command against the current workout and wait for its snapshot
    fn with_workout(&self, command: WorkoutCommand) -> Result<WorkoutSnapshot, WorkoutError> {
        let runtime = self.runtime().map_err(WorkoutError::Capture)?;
        let slot = lock_workout(&self.workout)?;
        let handle = slot.as_ref().ok_or(WorkoutError::NotStarted)?;
        runtime.block_on(handle.send(command))
    }

    pub fn advance_workout(&self, epoch: u64) -> Result<WorkoutSnapshot, WorkoutError> {
        self.with_workout(WorkoutCommand::Advance { epoch })
    }

    pub fn skip_rest(&self) -> Result<WorkoutSnapshot, WorkoutError> {
        self.with_workout(WorkoutCommand::SkipRest)
    }

    pub fn start_take(&self) -> Result<WorkoutSnapshot, WorkoutError> {
        self.with_workout(WorkoutCommand::StartTake)
    }

    pub fn finish_take(&self) -> Result<WorkoutSnapshot, WorkoutError> {
        self.with_workout(WorkoutCommand::FinishTake)
    }

    pub fn abandon_workout(&self) -> Result<WorkoutSnapshot, WorkoutError> {
        self.with_workout(WorkoutCommand::Abandon)
    }

    /// Latest snapshot of the current (or last) workout
    pub fn workout_snapshot(&self) -> Option<WorkoutSnapshot> {
        lock_workout(&self.workout)
            .ok()?
            .as_ref()
            .map(|handle| handle.snapshot())
    }

    // ========================================================================
    // PROGRESS METHODS
    // ========================================================================

    fn ledger(&self) -> Arc<StreakLedger> {
        self.ledger
            .read()
            .map(|ledger| Arc::clone(&ledger))
            .unwrap_or_else(|err| Arc::clone(&err.into_inner()))
    }

    /// Persist progress as JSON files under `dir` from now on
    pub fn use_progress_dir(&self, dir: impl Into<std::path::PathBuf>) {
        let store: Arc<dyn ProgressStore> = Arc::new(JsonFileProgressStore::new(dir));
        let ledger = Arc::new(StreakLedger::new(store, DEFAULT_PROFILE_ID));
        match self.ledger.write() {
            Ok(mut slot) => *slot = ledger,
            Err(err) => *err.into_inner() = ledger,
        }
    }

    pub fn progress(&self) -> io::Result<UserProgress> {
        self.ledger().progress()
    }
}


impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}
