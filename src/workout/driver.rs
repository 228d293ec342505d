//! WorkoutDriver: runs a WorkoutMachine against real time and real audio.
//!
//! The driver task owns the machine, ticks it at `tick_millis`, and is the
//! only place that starts or stops recordings for a workout. Commands and
//! timer ticks funnel into the same transition function; commands queued
//! behind a tick are applied before it. Opening and closing streams and
//! writing progress block, so they run on the blocking pool and the driver
//! awaits them before publishing the snapshot they affect.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::analysis::{MeasurementContext, RecordingBuffer, VoiceMeasurement};
use crate::config::WorkoutConfig;
use crate::error::{log_audio_error, log_workout_error, AudioError, ErrorCode, WorkoutError};
use crate::recording::{Recorder, RecordingSession, RecordingState};
use crate::telemetry;

use super::catalog::ExerciseCatalog;
use super::machine::{WorkoutEffect, WorkoutEvent, WorkoutMachine};
use super::state::{WorkoutPhase, WorkoutSnapshot, WorkoutSummary};
use super::streak::{Calendar, StreakLedger};

/// User-facing workout commands
#[derive(Debug, Clone, PartialEq)]
pub enum WorkoutCommand {
    /// Complete early or skip rest, against the snapshot epoch the UI saw
    Advance { epoch: u64 },
    /// Skip whatever rest is current
    SkipRest,
    StartTake,
    FinishTake,
    Abandon,
}

type Reply = oneshot::Sender<Result<WorkoutSnapshot, WorkoutError>>;

struct DriverMessage {
    command: WorkoutCommand,
    reply: Option<Reply>,
}

/// Collaborators a workout needs besides its catalog
#[derive(Clone)]
pub struct WorkoutServices {
    pub recorder: Recorder,
    pub ledger: Arc<StreakLedger>,
    pub calendar: Arc<dyn Calendar>,
}

pub struct WorkoutDriver {
    machine: WorkoutMachine,
    services: WorkoutServices,
    tick: Duration,
    snapshots: watch::Sender<WorkoutSnapshot>,
    commands: mpsc::Receiver<DriverMessage>,
    /// Recording that spans a timer-driven exercise
    recording: Option<RecordingSession>,
    take: Option<RecordingSession>,
    last_sample_ms: Option<u64>,
}

/// Caller side of a running workout
pub struct WorkoutHandle {
    commands: mpsc::Sender<DriverMessage>,
    snapshots: watch::Receiver<WorkoutSnapshot>,
    task: JoinHandle<Option<WorkoutSummary>>,
}

/// Run blocking audio or storage work on the blocking pool
async fn off_thread<T, E, F>(work: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<io::Error> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(err) => Err(E::from(io::Error::from(err))),
    }
}

async fn stop_session(
    mut session: RecordingSession,
) -> Result<Option<RecordingBuffer>, AudioError> {
    off_thread(move || session.stop()).await
}

impl WorkoutDriver {
    /// Start the workout and spawn its driver on the current tokio runtime
    pub async fn spawn(
        catalog: ExerciseCatalog,
        config: &WorkoutConfig,
        services: WorkoutServices,
    ) -> Result<WorkoutHandle, WorkoutError> {
        let machine = WorkoutMachine::new(catalog, config.rest_seconds);
        let (command_tx, command_rx) = mpsc::channel(32);
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());

        let mut driver = Self {
            machine,
            services,
            tick: Duration::from_millis(config.tick_millis.max(1)),
            snapshots: snapshot_tx,
            commands: command_rx,
            recording: None,
            take: None,
            last_sample_ms: None,
        };
        driver.apply(WorkoutEvent::Start { at: Utc::now() }).await?;
        tracing::info!(
            "[WorkoutDriver] Workout started with {} exercises",
            driver.machine.catalog().len()
        );

        let task = tokio::spawn(driver.run());
        Ok(WorkoutHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            task,
        })
    }

    async fn run(mut self) -> Option<WorkoutSummary> {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        interval.tick().await;

        while !self.machine.is_terminal() {
            tokio::select! {
                biased;
                message = self.commands.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => {
                        tracing::info!("[WorkoutDriver] All handles dropped, abandoning");
                        if let Err(err) = self.apply(WorkoutEvent::Abandon).await {
                            log_workout_error(&err, "WorkoutDriver::run");
                        }
                    }
                },
                _ = interval.tick() => self.on_tick().await,
            }
        }

        self.release_microphone().await;
        self.machine.summary().cloned()
    }

    async fn on_tick(&mut self) {
        while let Ok(message) = self.commands.try_recv() {
            self.handle(message).await;
            if self.machine.is_terminal() {
                return;
            }
        }

        self.poll_recordings().await;
        let elapsed_ms = self.tick.as_millis() as u64;
        if let Err(err) = self.apply(WorkoutEvent::Tick { elapsed_ms }).await {
            log_workout_error(&err, "WorkoutDriver::tick");
        }
    }

    async fn handle(&mut self, message: DriverMessage) {
        let result = match message.command {
            WorkoutCommand::Advance { epoch } => self.apply(WorkoutEvent::Advance { epoch }).await,
            WorkoutCommand::SkipRest => match self.machine.phase() {
                WorkoutPhase::Resting { .. } => {
                    let epoch = self.machine.epoch();
                    self.apply(WorkoutEvent::Advance { epoch }).await
                }
                _ => Ok(()),
            },
            WorkoutCommand::StartTake => self.start_take().await,
            WorkoutCommand::FinishTake => self.finish_take().await,
            WorkoutCommand::Abandon => self.apply(WorkoutEvent::Abandon).await,
        }
        .map(|_| self.machine.snapshot());

        if let Err(err) = &result {
            log_workout_error(err, "WorkoutDriver::command");
        }
        if let Some(reply) = message.reply {
            let _ = reply.send(result);
        }
    }

    /// Apply an event, carry out its effects, then publish
    async fn apply(&mut self, event: WorkoutEvent) -> Result<(), WorkoutError> {
        let before = self.machine.phase();
        let effects = self.machine.apply(event)?;
        for effect in effects {
            self.run_effect(effect).await;
        }
        self.publish(before);
        Ok(())
    }

    fn publish(&mut self, before: WorkoutPhase) {
        let snapshot = self.machine.snapshot();
        if snapshot.phase != before {
            tracing::info!(
                "[WorkoutDriver] {} -> {}",
                before.name(),
                snapshot.phase.name()
            );
            telemetry::hub()
                .record_workout_transition(snapshot.phase.name(), snapshot.phase.exercise_index());
        }
        self.snapshots.send_replace(snapshot);
    }

    async fn run_effect(&mut self, effect: WorkoutEffect) {
        match effect {
            WorkoutEffect::StartRecording => {
                let recorder = self.services.recorder.clone();
                match off_thread(move || recorder.start()).await {
                    Ok(session) => {
                        self.last_sample_ms = None;
                        self.recording = Some(session);
                    }
                    // Without a recording the exercise still runs, just unmeasured
                    Err(err) => log_audio_error(&err, "WorkoutDriver::start_recording"),
                }
            }
            WorkoutEffect::FinishRecording { index } => self.finish_recording(index).await,
            WorkoutEffect::DiscardRecording => self.discard_recording().await,
            WorkoutEffect::CancelTake => self.cancel_take().await,
            WorkoutEffect::Completed => {
                self.release_microphone().await;
                self.record_completion().await;
            }
            WorkoutEffect::Abandoned => self.release_microphone().await,
        }
    }

    async fn record_completion(&mut self) {
        let Some(summary) = self.machine.summary().cloned() else {
            return;
        };
        let today = self.services.calendar.today();
        let ledger = Arc::clone(&self.services.ledger);
        let workout_id = summary.id.clone();

        let result = off_thread(move || {
            let progress = ledger.record_completion(&summary, today)?;
            if let Some(measurement) = summary.closing_measurement() {
                ledger.record_measurement(&measurement)?;
            }
            Ok::<_, io::Error>(progress)
        })
        .await;

        match result {
            Ok(progress) => telemetry::hub().record_workout_completed(progress.current_streak),
            Err(err) => tracing::error!(
                "[WorkoutDriver] Failed to persist workout {}: {}",
                workout_id,
                err
            ),
        }
    }

    async fn store_measurement(&mut self, buffer: &RecordingBuffer) {
        let Some(measurement) = VoiceMeasurement::from_buffer(buffer, MeasurementContext::Exercise)
        else {
            return;
        };
        let ledger = Arc::clone(&self.services.ledger);
        if let Err(err) = off_thread(move || ledger.record_measurement(&measurement)).await {
            tracing::error!("[WorkoutDriver] Failed to store measurement: {}", err);
        }
    }

    // ========================================================================
    // RECORDINGS
    // ========================================================================

    async fn start_take(&mut self) -> Result<(), WorkoutError> {
        if self.take.is_some() {
            return Ok(());
        }
        self.apply(WorkoutEvent::TakeStarted).await?;

        let recorder = self.services.recorder.clone();
        match off_thread(move || recorder.start()).await {
            Ok(session) => {
                self.last_sample_ms = None;
                self.take = Some(session);
                Ok(())
            }
            Err(err) => {
                self.apply(WorkoutEvent::TakeFailed {
                    reason: err.message(),
                })
                .await?;
                Err(WorkoutError::Capture(err))
            }
        }
    }

    async fn finish_take(&mut self) -> Result<(), WorkoutError> {
        let Some(session) = self.take.take() else {
            return Err(WorkoutError::NoActiveTake);
        };

        match stop_session(session).await {
            Ok(Some(buffer)) => {
                self.store_measurement(&buffer).await;
                self.apply(WorkoutEvent::TakeRecorded(buffer)).await
            }
            Ok(None) => {
                self.apply(WorkoutEvent::TakeFailed {
                    reason: "take already stopped".to_string(),
                })
                .await
            }
            Err(err) => {
                self.apply(WorkoutEvent::TakeFailed {
                    reason: err.message(),
                })
                .await?;
                Err(WorkoutError::Capture(err))
            }
        }
    }

    async fn cancel_take(&mut self) {
        if let Some(session) = self.take.take() {
            if let Err(err) = stop_session(session).await {
                tracing::debug!("[WorkoutDriver] Cancelled take ended with {}", err);
            }
        }
    }

    /// Hand the exercise recording back to the machine as its reading
    async fn finish_recording(&mut self, index: usize) {
        let Some(session) = self.recording.take() else {
            return;
        };
        match stop_session(session).await {
            Ok(Some(buffer)) => {
                self.store_measurement(&buffer).await;
                if let Err(err) = self
                    .machine
                    .apply(WorkoutEvent::ExerciseRecorded { index, buffer })
                {
                    log_workout_error(&err, "WorkoutDriver::finish_recording");
                }
            }
            Ok(None) => {}
            Err(err) => log_audio_error(&err, "WorkoutDriver::finish_recording"),
        }
    }

    async fn discard_recording(&mut self) {
        if let Some(session) = self.recording.take() {
            if let Err(err) = stop_session(session).await {
                log_audio_error(&err, "WorkoutDriver::discard_recording");
            }
        }
    }

    async fn release_microphone(&mut self) {
        self.discard_recording().await;
        self.cancel_take().await;
    }

    /// Surface capture faults and forward the newest live sample
    async fn poll_recordings(&mut self) {
        let take_failed = self
            .take
            .as_ref()
            .is_some_and(|session| session.state() == RecordingState::Error);
        if take_failed {
            if let Some(session) = self.take.take() {
                let reason = match stop_session(session).await {
                    Err(err) => err.message(),
                    Ok(_) => "capture lost".to_string(),
                };
                if let Err(err) = self.apply(WorkoutEvent::TakeFailed { reason }).await {
                    log_workout_error(&err, "WorkoutDriver::poll_recordings");
                }
            }
        }

        let recording_failed = self
            .recording
            .as_ref()
            .is_some_and(|session| session.state() == RecordingState::Error);
        if recording_failed {
            tracing::warn!("[WorkoutDriver] Exercise recording lost its input, continuing without it");
            self.discard_recording().await;
        }

        if self.recording.is_none() && self.take.is_none() {
            return;
        }
        if let Some(sample) = self.services.recorder.latest() {
            if self.last_sample_ms != Some(sample.timestamp_ms) {
                self.last_sample_ms = Some(sample.timestamp_ms);
                if let Err(err) = self.machine.apply(WorkoutEvent::PitchSample(sample)) {
                    log_workout_error(&err, "WorkoutDriver::pitch_sample");
                }
            }
        }
    }
}

impl WorkoutHandle {
    pub fn snapshot(&self) -> WorkoutSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkoutSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Send a command and wait for the snapshot it produced
    pub async fn send(&self, command: WorkoutCommand) -> Result<WorkoutSnapshot, WorkoutError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(DriverMessage {
                command,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| WorkoutError::Terminal)?;
        reply_rx.await.map_err(|_| WorkoutError::Terminal)?
    }

    pub async fn advance(&self, epoch: u64) -> Result<WorkoutSnapshot, WorkoutError> {
        self.send(WorkoutCommand::Advance { epoch }).await
    }

    pub async fn skip_rest(&self) -> Result<WorkoutSnapshot, WorkoutError> {
        self.send(WorkoutCommand::SkipRest).await
    }

    pub async fn start_take(&self) -> Result<WorkoutSnapshot, WorkoutError> {
        self.send(WorkoutCommand::StartTake).await
    }

    pub async fn finish_take(&self) -> Result<WorkoutSnapshot, WorkoutError> {
        self.send(WorkoutCommand::FinishTake).await
    }

    pub async fn abandon(&self) -> Result<WorkoutSnapshot, WorkoutError> {
        self.send(WorkoutCommand::Abandon).await
    }

    /// Wait for the workout to end; the summary is present on completion
    pub async fn join(self) -> Option<WorkoutSummary> {
        self.task.await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Microphone;
    use crate::config::AppConfig;
    use crate::engine::backend::{FixtureBackend, FixturePace};
    use crate::fixtures;
    use crate::workout::streak::{FixedCalendar, InMemoryProgressStore, ProgressStore};
    use chrono::NaiveDate;

    struct Harness {
        services: WorkoutServices,
        store: Arc<InMemoryProgressStore>,
        backend: Arc<FixtureBackend>,
    }

    fn harness(backend: FixtureBackend) -> Harness {
        let backend = Arc::new(backend);
        let recorder = Recorder::new(backend.clone(), AppConfig::default())
            .unwrap()
            .with_microphone(Arc::new(Microphone::new()));
        let store = Arc::new(InMemoryProgressStore::new());
        let services = WorkoutServices {
            recorder,
            ledger: Arc::new(StreakLedger::new(store.clone(), "tester")),
            calendar: Arc::new(FixedCalendar::new(
                NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            )),
        };
        Harness {
            services,
            store,
            backend,
        }
    }

    fn tone(seconds: f32) -> FixtureBackend {
        let len = (48_000.0 * seconds) as usize;
        FixtureBackend::new(fixtures::sine_wave(100.0, 48_000, len, 0.5), 480)
    }

    fn config() -> WorkoutConfig {
        WorkoutConfig {
            rest_seconds: 10,
            tick_millis: 100,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timers_run_workout_to_completion() {
        let h = harness(tone(0.1));
        let catalog = ExerciseCatalog::from_json(
            r#"[
                {"id": "hum", "type": "timed", "duration": 5},
                {"id": "glides", "type": "reps", "reps": 2, "repDuration": 3}
            ]"#,
        )
        .unwrap();

        let handle = WorkoutDriver::spawn(catalog, &config(), h.services.clone())
            .await
            .unwrap();
        assert_eq!(
            handle.snapshot().phase,
            WorkoutPhase::ExerciseActive {
                index: 0,
                rep: None,
                phrase: None
            }
        );

        let summary = handle.join().await.expect("completed workout");
        assert!((summary.total_elapsed_secs - 21.0).abs() < 0.2);

        let progress = h.store.load_progress("tester").unwrap();
        assert_eq!(progress.current_streak, 1);
        assert_eq!(progress.total_workouts, 1);
        assert_eq!(h.store.summaries("tester").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandon_releases_microphone_first() {
        let h = harness(tone(30.0).with_pace(FixturePace::Realtime));
        let catalog = ExerciseCatalog::from_json(
            r#"[{"id": "hum", "type": "timed", "duration": 30, "showPitchMeter": true}]"#,
        )
        .unwrap();
        let microphone = Arc::clone(h.services.recorder.microphone());

        let handle = WorkoutDriver::spawn(catalog, &config(), h.services.clone())
            .await
            .unwrap();
        assert!(microphone.is_held(), "pitch meter holds the microphone");

        let mut snapshots = handle.subscribe();
        let snapshot = handle.abandon().await.unwrap();
        assert_eq!(snapshot.phase, WorkoutPhase::Abandoned);
        assert!(!microphone.is_held());

        snapshots.changed().await.unwrap();
        assert_eq!(snapshots.borrow().phase, WorkoutPhase::Abandoned);

        assert_eq!(handle.join().await, None);
        assert!(h.store.summaries("tester").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_phrase_take_flow() {
        let h = harness(tone(1.5));
        let catalog = ExerciseCatalog::from_json(
            r#"[{"id": "chest", "type": "phrase", "phrases": ["Good morning everyone"], "showRecordPlayback": true}]"#,
        )
        .unwrap();
        let handle = WorkoutDriver::spawn(catalog, &config(), h.services.clone())
            .await
            .unwrap();

        assert_eq!(
            handle.finish_take().await.unwrap_err(),
            WorkoutError::NoActiveTake
        );
        let snapshot = handle.start_take().await.unwrap();
        assert!(snapshot.take_recording);

        assert!(h.backend.wait_until_finished(Duration::from_secs(5)));
        let snapshot = handle.finish_take().await.unwrap();
        assert_eq!(snapshot.phase, WorkoutPhase::Completed);

        let summary = snapshot.summary.expect("summary in terminal snapshot");
        assert_eq!(summary.profiles.len(), 1);
        assert!((summary.profiles[0].hz - 100).abs() <= 1);
        assert!(!h.services.recorder.microphone().is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_exercise_profiles_its_recording() {
        let h = harness(tone(3.0));
        let catalog = ExerciseCatalog::from_json(
            r#"[{"id": "low", "type": "sustained", "duration": 3, "showRecordPlayback": true}]"#,
        )
        .unwrap();
        let microphone = Arc::clone(h.services.recorder.microphone());

        let handle = WorkoutDriver::spawn(catalog, &config(), h.services.clone())
            .await
            .unwrap();
        assert!(microphone.is_held(), "playback exercises record throughout");
        // Let the whole tone reach the analysis thread before the timer runs out
        assert!(h.backend.wait_until_finished(Duration::from_secs(5)));

        let summary = handle.join().await.expect("completed workout");
        assert!(!microphone.is_held());
        assert_eq!(summary.exercises[0].pitch_readings.len(), 1);
        assert_eq!(summary.profiles.len(), 1);
        assert!((summary.profiles[0].hz - 100).abs() <= 1, "hz {}", summary.profiles[0].hz);
        assert_eq!(h.store.summaries("tester")[0].profiles, summary.profiles);

        let history = h.services.ledger.history().unwrap();
        let mut contexts: Vec<_> = history.measurements().iter().map(|m| m.context).collect();
        contexts.sort_by_key(|context| *context as u8);
        assert_eq!(
            contexts,
            vec![MeasurementContext::Exercise, MeasurementContext::Workout]
        );
        assert!(history
            .measurements()
            .iter()
            .all(|m| (m.pitch_hz - 100.0).abs() < 1.5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_take_reprompts_same_phrase() {
        let h = harness(tone(1.0).with_fault_after(5, "phone call"));
        let catalog = ExerciseCatalog::from_json(
            r#"[{"id": "chest", "type": "phrase", "phrases": ["one", "two"]}]"#,
        )
        .unwrap();
        let handle = WorkoutDriver::spawn(catalog, &config(), h.services.clone())
            .await
            .unwrap();

        handle.start_take().await.unwrap();
        assert!(h.backend.wait_until_finished(Duration::from_secs(5)));
        // Give the driver a few ticks to notice the fault
        tokio::time::sleep(Duration::from_millis(500)).await;

        let snapshot = handle.snapshot();
        assert!(!snapshot.take_recording);
        assert_eq!(snapshot.phrase_text.as_deref(), Some("one"));
        assert_eq!(snapshot.exercises[0].retries, 1);
        assert!(!h.services.recorder.microphone().is_held());

        handle.abandon().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_rest_outside_rest_is_noop() {
        let h = harness(tone(0.1));
        let catalog = ExerciseCatalog::from_json(
            r#"[
                {"id": "a", "type": "timed", "duration": 60},
                {"id": "b", "type": "timed", "duration": 60}
            ]"#,
        )
        .unwrap();
        let handle = WorkoutDriver::spawn(catalog, &config(), h.services.clone())
            .await
            .unwrap();

        let before = handle.snapshot();
        let after = handle.skip_rest().await.unwrap();
        assert_eq!(after.phase, before.phase);

        let resting = handle.advance(after.epoch).await.unwrap();
        assert_eq!(resting.phase, WorkoutPhase::Resting { next_index: 1 });
        let next = handle.skip_rest().await.unwrap();
        assert_eq!(
            next.phase,
            WorkoutPhase::ExerciseActive {
                index: 1,
                rep: None,
                phrase: None
            }
        );
        handle.abandon().await.unwrap();
    }
}
