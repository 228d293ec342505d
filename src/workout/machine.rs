//! WorkoutMachine: the single authoritative transition function.
//!
//! Timers and user input both arrive as `WorkoutEvent`s. The machine never
//! touches audio or storage; it returns `WorkoutEffect`s for the driver to
//! carry out and exposes an immutable `WorkoutSnapshot` after every step.

use chrono::{DateTime, Utc};

use crate::analysis::{classify, RecordingBuffer, VoiceSample};
use crate::error::WorkoutError;

use super::catalog::{ExerciseCatalog, ExerciseDefinition, ExerciseShape};
use super::state::{
    ExerciseRunState, ExerciseStatus, WorkoutPhase, WorkoutSnapshot, WorkoutSummary,
};

/// Inputs to the machine, from timers, the UI and the recording layer
#[derive(Debug, Clone)]
pub enum WorkoutEvent {
    Start { at: DateTime<Utc> },
    Tick { elapsed_ms: u64 },
    /// Complete the current exercise early or skip the rest; ignored when
    /// `epoch` no longer matches
    Advance { epoch: u64 },
    TakeStarted,
    TakeRecorded(RecordingBuffer),
    TakeFailed { reason: String },
    /// Recording that ran through a timer-driven exercise, delivered after
    /// `FinishRecording`; accepted once the workout has completed too
    ExerciseRecorded {
        index: usize,
        buffer: RecordingBuffer,
    },
    PitchSample(VoiceSample),
    Abandon,
}

impl WorkoutEvent {
    fn is_timer(&self) -> bool {
        matches!(self, WorkoutEvent::Tick { .. })
    }
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum WorkoutEffect {
    /// Open the exercise recording that feeds the live meter
    StartRecording,
    /// Stop the exercise recording and answer with `ExerciseRecorded`
    FinishRecording { index: usize },
    /// Stop the exercise recording and drop it
    DiscardRecording,
    CancelTake,
    /// The summary is final once every pending recording has been reported
    Completed,
    Abandoned,
}

/// Result of applying several events at once
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub effects: Vec<WorkoutEffect>,
    pub errors: Vec<WorkoutError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Countdown,
    Rep(u32),
    Phrase { index: usize, recording: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    NotStarted,
    Active {
        index: usize,
        cursor: Cursor,
        remaining_ms: Option<u64>,
    },
    Resting {
        next_index: usize,
        remaining_ms: u64,
    },
    Completed,
    Abandoned,
}

pub struct WorkoutMachine {
    catalog: ExerciseCatalog,
    rest_seconds: u32,
    stage: Stage,
    epoch: u64,
    elapsed_ms: u64,
    exercise_elapsed_ms: u64,
    started_at: Option<DateTime<Utc>>,
    runs: Vec<ExerciseRunState>,
    live: Option<VoiceSample>,
    summary: Option<WorkoutSummary>,
}

impl WorkoutMachine {
    pub fn new(catalog: ExerciseCatalog, rest_seconds: u32) -> Self {
        let runs = catalog
            .exercises()
            .iter()
            .map(|exercise| ExerciseRunState::pending(&exercise.id))
            .collect();
        Self {
            catalog,
            rest_seconds,
            stage: Stage::NotStarted,
            epoch: 0,
            elapsed_ms: 0,
            exercise_elapsed_ms: 0,
            started_at: None,
            runs,
            live: None,
            summary: None,
        }
    }

    pub fn catalog(&self) -> &ExerciseCatalog {
        &self.catalog
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn phase(&self) -> WorkoutPhase {
        match self.stage {
            Stage::NotStarted => WorkoutPhase::NotStarted,
            Stage::Active { index, cursor, .. } => WorkoutPhase::ExerciseActive {
                index,
                rep: match cursor {
                    Cursor::Rep(rep) => Some(rep),
                    _ => None,
                },
                phrase: match cursor {
                    Cursor::Phrase { index, .. } => Some(index),
                    _ => None,
                },
            },
            Stage::Resting { next_index, .. } => WorkoutPhase::Resting { next_index },
            Stage::Completed => WorkoutPhase::Completed,
            Stage::Abandoned => WorkoutPhase::Abandoned,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, Stage::Completed | Stage::Abandoned)
    }

    pub fn summary(&self) -> Option<&WorkoutSummary> {
        self.summary.as_ref()
    }

    /// Apply one event
    pub fn apply(&mut self, event: WorkoutEvent) -> Result<Vec<WorkoutEffect>, WorkoutError> {
        match event {
            WorkoutEvent::Start { at } => return self.start(at),
            WorkoutEvent::Abandon => return self.abandon(),
            WorkoutEvent::ExerciseRecorded { index, buffer } => {
                return self.exercise_recorded(index, &buffer)
            }
            _ => {}
        }

        // Late timer ticks and samples are harmless outside a running workout
        if matches!(self.stage, Stage::NotStarted) {
            return match event {
                WorkoutEvent::Tick { .. } | WorkoutEvent::PitchSample(_) => Ok(Vec::new()),
                _ => Err(WorkoutError::NotStarted),
            };
        }
        if self.is_terminal() {
            return match event {
                WorkoutEvent::Tick { .. } | WorkoutEvent::PitchSample(_) => Ok(Vec::new()),
                _ => Err(WorkoutError::Terminal),
            };
        }

        match event {
            WorkoutEvent::Tick { elapsed_ms } => Ok(self.tick(elapsed_ms)),
            WorkoutEvent::Advance { epoch } => self.advance(epoch),
            WorkoutEvent::TakeStarted => self.take_started(),
            WorkoutEvent::TakeRecorded(buffer) => self.take_recorded(&buffer),
            WorkoutEvent::TakeFailed { reason } => self.take_failed(&reason),
            WorkoutEvent::PitchSample(sample) => {
                if matches!(self.stage, Stage::Active { .. }) {
                    self.live = Some(sample);
                }
                Ok(Vec::new())
            }
            WorkoutEvent::Start { .. }
            | WorkoutEvent::Abandon
            | WorkoutEvent::ExerciseRecorded { .. } => Ok(Vec::new()),
        }
    }

    /// Apply events that arrived in the same tick; user events go before
    /// timer expiry so a simultaneous advance never transitions twice.
    pub fn apply_batch(&mut self, events: Vec<WorkoutEvent>) -> BatchOutcome {
        let (timers, user): (Vec<_>, Vec<_>) = events.into_iter().partition(|e| e.is_timer());
        let mut outcome = BatchOutcome::default();
        for event in user.into_iter().chain(timers) {
            match self.apply(event) {
                Ok(effects) => outcome.effects.extend(effects),
                Err(err) => outcome.errors.push(err),
            }
        }
        outcome
    }

    pub fn snapshot(&self) -> WorkoutSnapshot {
        let (exercise, remaining_ms, rep_count, phrase_text, take_recording) = match self.stage {
            Stage::Active {
                index,
                cursor,
                remaining_ms,
            } => {
                let exercise = self.exercise(index);
                let rep_count = match exercise.shape {
                    ExerciseShape::Reps { reps, .. } => Some(reps),
                    _ => None,
                };
                let (phrase_text, recording) = match (&exercise.shape, cursor) {
                    (ExerciseShape::Phrases { phrases }, Cursor::Phrase { index, recording }) => {
                        (phrases.get(index).cloned(), recording)
                    }
                    _ => (None, false),
                };
                (Some(exercise), remaining_ms, rep_count, phrase_text, recording)
            }
            Stage::Resting {
                next_index,
                remaining_ms,
            } => (
                Some(self.exercise(next_index)),
                Some(remaining_ms),
                None,
                None,
                false,
            ),
            _ => (None, None, None, None, false),
        };

        let breathing_phase = match self.stage {
            Stage::Active { index, .. } => self.breathing_phase(self.exercise(index)),
            _ => None,
        };

        WorkoutSnapshot {
            epoch: self.epoch,
            phase: self.phase(),
            exercise_count: self.catalog.len(),
            exercise_id: exercise.map(|e| e.id.clone()),
            rep_count,
            phrase_text,
            take_recording,
            breathing_phase,
            remaining_secs: remaining_ms.map(|ms| ms as f32 / 1000.0),
            elapsed_secs: self.elapsed_ms as f32 / 1000.0,
            live: self.live,
            exercises: self.runs.clone(),
            summary: self.summary.clone(),
        }
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    fn start(&mut self, at: DateTime<Utc>) -> Result<Vec<WorkoutEffect>, WorkoutError> {
        match self.stage {
            Stage::NotStarted => {}
            Stage::Completed | Stage::Abandoned => return Err(WorkoutError::Terminal),
            _ => return Err(WorkoutError::AlreadyStarted),
        }
        self.started_at = Some(at);
        let mut effects = Vec::new();
        self.enter_exercise(0, &mut effects);
        Ok(effects)
    }

    fn tick(&mut self, elapsed_ms: u64) -> Vec<WorkoutEffect> {
        self.elapsed_ms += elapsed_ms;
        let mut effects = Vec::new();

        match self.stage {
            Stage::Active {
                index,
                cursor,
                remaining_ms,
            } => {
                self.exercise_elapsed_ms += elapsed_ms;
                let Some(remaining) = remaining_ms else {
                    // Phrase exercises wait for takes, never for the clock
                    return effects;
                };
                let left = remaining.saturating_sub(elapsed_ms);
                if left > 0 {
                    self.stage = Stage::Active {
                        index,
                        cursor,
                        remaining_ms: Some(left),
                    };
                    return effects;
                }

                let next_rep = match (cursor, &self.exercise(index).shape) {
                    (
                        Cursor::Rep(rep),
                        ExerciseShape::Reps {
                            reps,
                            rep_duration_secs,
                        },
                    ) if rep + 1 < *reps => Some((rep + 1, *rep_duration_secs)),
                    _ => None,
                };

                match next_rep {
                    Some((rep, rep_duration_secs)) => {
                        self.stage = Stage::Active {
                            index,
                            cursor: Cursor::Rep(rep),
                            remaining_ms: Some(rep_duration_secs as u64 * 1000),
                        };
                        self.bump();
                    }
                    None => self.complete_exercise(index, false, &mut effects),
                }
            }
            Stage::Resting {
                next_index,
                remaining_ms,
            } => {
                let left = remaining_ms.saturating_sub(elapsed_ms);
                if left > 0 {
                    self.stage = Stage::Resting {
                        next_index,
                        remaining_ms: left,
                    };
                } else {
                    self.enter_exercise(next_index, &mut effects);
                }
            }
            _ => {}
        }
        effects
    }

    fn advance(&mut self, epoch: u64) -> Result<Vec<WorkoutEffect>, WorkoutError> {
        if epoch != self.epoch {
            tracing::debug!(
                "[WorkoutMachine] Ignoring stale advance (epoch {} != {})",
                epoch,
                self.epoch
            );
            return Ok(Vec::new());
        }

        let mut effects = Vec::new();
        match self.stage {
            Stage::Active {
                cursor: Cursor::Phrase { .. },
                ..
            } => return Err(WorkoutError::RecordingRequired),
            Stage::Active { index, .. } => self.complete_exercise(index, true, &mut effects),
            Stage::Resting { next_index, .. } => self.enter_exercise(next_index, &mut effects),
            _ => {}
        }
        Ok(effects)
    }

    fn take_started(&mut self) -> Result<Vec<WorkoutEffect>, WorkoutError> {
        match self.stage {
            Stage::Active {
                index,
                cursor: Cursor::Phrase { index: phrase, .. },
                remaining_ms,
            } => {
                self.stage = Stage::Active {
                    index,
                    cursor: Cursor::Phrase {
                        index: phrase,
                        recording: true,
                    },
                    remaining_ms,
                };
                Ok(Vec::new())
            }
            _ => Err(WorkoutError::NoActiveTake),
        }
    }

    fn take_recorded(
        &mut self,
        buffer: &RecordingBuffer,
    ) -> Result<Vec<WorkoutEffect>, WorkoutError> {
        let Stage::Active {
            index,
            cursor:
                Cursor::Phrase {
                    index: phrase,
                    recording: true,
                },
            ..
        } = self.stage
        else {
            return Err(WorkoutError::NoActiveTake);
        };

        let show_playback = self.exercise(index).display.show_record_playback;
        let phrase_count = match &self.exercise(index).shape {
            ExerciseShape::Phrases { phrases } => phrases.len(),
            _ => 0,
        };

        let run = &mut self.runs[index];
        run.takes += 1;
        // A silent take is still a take; it just carries no reading
        if let Some(hz) = buffer.settled_hz {
            run.pitch_readings.push(hz);
            if show_playback {
                run.profile = Some(classify(hz));
            }
        }

        let mut effects = Vec::new();
        if phrase + 1 < phrase_count {
            self.stage = Stage::Active {
                index,
                cursor: Cursor::Phrase {
                    index: phrase + 1,
                    recording: false,
                },
                remaining_ms: None,
            };
            self.live = None;
            self.bump();
        } else {
            self.complete_exercise(index, false, &mut effects);
        }
        Ok(effects)
    }

    fn take_failed(&mut self, reason: &str) -> Result<Vec<WorkoutEffect>, WorkoutError> {
        let Stage::Active {
            index,
            cursor:
                Cursor::Phrase {
                    index: phrase,
                    recording: true,
                },
            remaining_ms,
        } = self.stage
        else {
            return Err(WorkoutError::NoActiveTake);
        };

        tracing::warn!(
            "[WorkoutMachine] Take for phrase {} of exercise {} failed: {}",
            phrase,
            index,
            reason
        );
        self.runs[index].retries += 1;
        self.stage = Stage::Active {
            index,
            cursor: Cursor::Phrase {
                index: phrase,
                recording: false,
            },
            remaining_ms,
        };
        Ok(Vec::new())
    }

    /// Fold a finished exercise recording into its run; a recording that
    /// outlived an abandoned workout is dropped.
    fn exercise_recorded(
        &mut self,
        index: usize,
        buffer: &RecordingBuffer,
    ) -> Result<Vec<WorkoutEffect>, WorkoutError> {
        match self.stage {
            Stage::NotStarted => return Err(WorkoutError::NotStarted),
            Stage::Abandoned => return Ok(Vec::new()),
            _ => {}
        }
        let recorded = self
            .catalog
            .exercises()
            .get(index)
            .filter(|exercise| exercise.wants_recording())
            .is_some_and(|_| self.runs[index].status == ExerciseStatus::Completed);
        if !recorded {
            return Err(WorkoutError::NoActiveTake);
        }

        let show_playback = self.exercise(index).display.show_record_playback;
        if let Some(hz) = buffer.settled_hz {
            let run = &mut self.runs[index];
            run.pitch_readings.push(hz);
            if show_playback {
                run.profile = Some(classify(hz));
            }
        } else {
            tracing::debug!("[WorkoutMachine] Exercise {} recorded no settled pitch", index);
        }

        if self.summary.is_some() {
            self.summary = Some(self.build_summary());
        }
        Ok(Vec::new())
    }

    fn abandon(&mut self) -> Result<Vec<WorkoutEffect>, WorkoutError> {
        let mut effects = Vec::new();
        match self.stage {
            Stage::Completed | Stage::Abandoned => return Err(WorkoutError::Terminal),
            Stage::Active { index, cursor, .. } => {
                if self.exercise(index).wants_recording() {
                    effects.push(WorkoutEffect::DiscardRecording);
                }
                if matches!(
                    cursor,
                    Cursor::Phrase {
                        recording: true,
                        ..
                    }
                ) {
                    effects.push(WorkoutEffect::CancelTake);
                }
            }
            _ => {}
        }
        self.stage = Stage::Abandoned;
        self.live = None;
        self.bump();
        effects.push(WorkoutEffect::Abandoned);
        Ok(effects)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn enter_exercise(&mut self, index: usize, effects: &mut Vec<WorkoutEffect>) {
        let exercise = self.exercise(index);
        let (cursor, remaining_ms) = match &exercise.shape {
            ExerciseShape::Countdown { duration_secs, .. } => {
                (Cursor::Countdown, Some(*duration_secs as u64 * 1000))
            }
            ExerciseShape::Reps {
                rep_duration_secs, ..
            } => (Cursor::Rep(0), Some(*rep_duration_secs as u64 * 1000)),
            ExerciseShape::Phrases { .. } => (
                Cursor::Phrase {
                    index: 0,
                    recording: false,
                },
                None,
            ),
        };
        if exercise.wants_recording() {
            effects.push(WorkoutEffect::StartRecording);
        }

        self.stage = Stage::Active {
            index,
            cursor,
            remaining_ms,
        };
        self.exercise_elapsed_ms = 0;
        self.live = None;
        self.runs[index].status = ExerciseStatus::Active;
        self.bump();
    }

    fn complete_exercise(&mut self, index: usize, early: bool, effects: &mut Vec<WorkoutEffect>) {
        if self.exercise(index).wants_recording() {
            effects.push(WorkoutEffect::FinishRecording { index });
        }

        let run = &mut self.runs[index];
        run.status = ExerciseStatus::Completed;
        run.elapsed_ms = self.exercise_elapsed_ms;
        run.completed_early = early;
        self.live = None;

        if index + 1 >= self.catalog.len() {
            self.stage = Stage::Completed;
            self.summary = Some(self.build_summary());
            self.bump();
            effects.push(WorkoutEffect::Completed);
        } else {
            let rest_ms = self.catalog.rest_after(index, self.rest_seconds) as u64 * 1000;
            self.stage = Stage::Resting {
                next_index: index + 1,
                remaining_ms: rest_ms,
            };
            self.bump();
        }
    }

    fn build_summary(&self) -> WorkoutSummary {
        let started_at = self.started_at.unwrap_or_default();
        let completed_at = started_at + chrono::Duration::milliseconds(self.elapsed_ms as i64);
        WorkoutSummary {
            id: format!("workout-{}", started_at.timestamp_millis()),
            started_at,
            completed_at,
            total_elapsed_secs: self.elapsed_ms as f32 / 1000.0,
            exercises: self.runs.clone(),
            profiles: self.runs.iter().filter_map(|run| run.profile.clone()).collect(),
            pitch_after: self
                .runs
                .iter()
                .rev()
                .find_map(|run| run.pitch_readings.last().copied()),
        }
    }

    fn breathing_phase(&self, exercise: &ExerciseDefinition) -> Option<String> {
        let ExerciseShape::Countdown { phases, .. } = &exercise.shape else {
            return None;
        };
        let cycle_ms: u64 = phases.iter().map(|p| p.seconds as u64 * 1000).sum();
        if cycle_ms == 0 {
            return None;
        }
        let mut position = self.exercise_elapsed_ms % cycle_ms;
        for phase in phases {
            let length = phase.seconds as u64 * 1000;
            if position < length {
                return Some(phase.name.clone());
            }
            position -= length;
        }
        None
    }

    fn exercise(&self, index: usize) -> &ExerciseDefinition {
        &self.catalog.exercises()[index]
    }

    fn bump(&mut self) {
        self.epoch += 1;
        tracing::debug!(
            "[WorkoutMachine] -> {} (epoch {})",
            self.phase().name(),
            self.epoch
        );
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
