//! Immutable views of a workout, emitted on every transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{MeasurementContext, VoiceMeasurement, VoiceProfile, VoiceSample};

/// Where the workout is; consumers diff these rather than observe mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkoutPhase {
    NotStarted,
    ExerciseActive {
        index: usize,
        rep: Option<u32>,
        phrase: Option<usize>,
    },
    Resting {
        next_index: usize,
    },
    Completed,
    Abandoned,
}

impl WorkoutPhase {
    pub fn name(&self) -> &'static str {
        match self {
            WorkoutPhase::NotStarted => "not_started",
            WorkoutPhase::ExerciseActive { .. } => "exercise_active",
            WorkoutPhase::Resting { .. } => "resting",
            WorkoutPhase::Completed => "completed",
            WorkoutPhase::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkoutPhase::Completed | WorkoutPhase::Abandoned)
    }

    pub fn exercise_index(&self) -> Option<usize> {
        match self {
            WorkoutPhase::ExerciseActive { index, .. } => Some(*index),
            WorkoutPhase::Resting { next_index } => Some(*next_index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseStatus {
    Pending,
    Active,
    Completed,
}

/// Per-exercise progress carried through the workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseRunState {
    pub exercise_id: String,
    pub status: ExerciseStatus,
    pub elapsed_ms: u64,
    /// User advanced before the timer ran out
    pub completed_early: bool,
    pub takes: u32,
    pub retries: u32,
    /// Settled pitch readings collected during the exercise
    pub pitch_readings: Vec<f32>,
    /// Set for record-playback exercises once a take settled
    pub profile: Option<VoiceProfile>,
}

impl ExerciseRunState {
    pub fn pending(exercise_id: &str) -> Self {
        Self {
            exercise_id: exercise_id.to_string(),
            status: ExerciseStatus::Pending,
            elapsed_ms: 0,
            completed_early: false,
            takes: 0,
            retries: 0,
            pitch_readings: Vec::new(),
            profile: None,
        }
    }
}

/// Completed-workout record handed to the progress store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSummary {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total_elapsed_secs: f32,
    pub exercises: Vec<ExerciseRunState>,
    pub profiles: Vec<VoiceProfile>,
    /// Most recent settled pitch of the workout
    pub pitch_after: Option<f32>,
}

impl WorkoutSummary {
    pub fn total_minutes(&self) -> u32 {
        (self.total_elapsed_secs / 60.0).round() as u32
    }

    /// Workout-context measurement of `pitch_after`, spanning every reading
    pub fn closing_measurement(&self) -> Option<VoiceMeasurement> {
        let hz = self.pitch_after?;
        let (min, max) = self
            .exercises
            .iter()
            .flat_map(|run| run.pitch_readings.iter().copied())
            .fold((hz, hz), |(min, max), reading| (min.min(reading), max.max(reading)));
        Some(VoiceMeasurement {
            id: format!("{}-after", self.id),
            timestamp: self.completed_at,
            pitch_hz: hz,
            pitch_min_hz: min,
            pitch_max_hz: max,
            duration_secs: self.total_elapsed_secs,
            context: MeasurementContext::Workout,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSnapshot {
    /// Bumped on every position change; Advance commands carry it back
    pub epoch: u64,
    pub phase: WorkoutPhase,
    pub exercise_count: usize,
    pub exercise_id: Option<String>,
    pub rep_count: Option<u32>,
    pub phrase_text: Option<String>,
    pub take_recording: bool,
    pub breathing_phase: Option<String>,
    pub remaining_secs: Option<f32>,
    pub elapsed_secs: f32,
    pub live: Option<VoiceSample>,
    pub exercises: Vec<ExerciseRunState>,
    pub summary: Option<WorkoutSummary>,
}
