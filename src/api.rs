// Public API for flutter_rust_bridge integration
// This module provides FFI functions for Flutter to drive pitch measurement
// and guided workouts.

#![allow(dead_code)] // FFI functions are called from Dart, not detected by Rust analyzer

use anyhow::{Context, Result};
use once_cell::sync::Lazy;

use crate::analysis::{
    calculate_projections, classify, MeasurementContext, PitchProjection, PitchTrend,
    VoiceMeasurement, VoiceProfile,
};
use crate::engine::{EngineHandle, MeasurementResult};
use crate::error::{AudioError, WorkoutError};
use crate::workout::{ExerciseCatalog, UserProgress, WorkoutSnapshot};

mod streams;
mod types;

pub use streams::*;
pub use types::CatalogOverview;

// Re-export error code constants for FFI exposure
pub use crate::error::{AudioErrorCodes, ConfigErrorCodes, WorkoutErrorCodes};

/// Global EngineHandle instance - single dependency injection container
///
/// Owns the recorder, the current measurement and workout, and the
/// progress ledger. Built on first use.
static ENGINE_HANDLE: Lazy<EngineHandle> = Lazy::new(EngineHandle::new);

/// Get the version of the voice engine
#[flutter_rust_bridge::frb(sync)]
pub fn get_version() -> Result<String> {
    Ok(env!("CARGO_PKG_VERSION").to_string())
}

// ============================================================================
// MEASUREMENT
// ============================================================================

/// Start a pitch measurement on the microphone
///
/// Live values arrive on `voice_sample_stream` until `stop_measurement`.
///
/// # Errors
/// - `ResourceBusy` when another recording (measurement or workout) holds
///   the microphone
/// - Stream open / permission failures from the platform backend
#[flutter_rust_bridge::frb]
pub fn start_measurement() -> Result<(), AudioError> {
    ENGINE_HANDLE.start_measurement()
}

/// Stop the measurement and classify the settled pitch
///
/// A take that never settled returns a result with no profile; that is a
/// silent take, not an error. Settled takes join the stored history under
/// `context`.
///
/// # Errors
/// - `NotRecording` when no measurement is running
/// - `CaptureInterrupted` when the OS revoked the microphone mid-take
#[flutter_rust_bridge::frb]
pub fn stop_measurement(context: MeasurementContext) -> Result<MeasurementResult, AudioError> {
    ENGINE_HANDLE.stop_measurement(context)
}

/// Classify a settled pitch into a voice profile
#[flutter_rust_bridge::frb(sync)]
pub fn classify_pitch(hz: f32) -> VoiceProfile {
    classify(hz)
}

/// One- and three-month targets from a baseline pitch
#[flutter_rust_bridge::frb(sync)]
pub fn pitch_projections(baseline_hz: f32) -> PitchProjection {
    calculate_projections(baseline_hz)
}

/// Stored measurements from every context, oldest first
#[flutter_rust_bridge::frb]
pub fn measurement_history() -> Result<Vec<VoiceMeasurement>> {
    ENGINE_HANDLE
        .measurement_history()
        .context("loading measurement history")
}

/// Trend across measurement history; None with fewer than three
#[flutter_rust_bridge::frb]
pub fn pitch_trend() -> Result<Option<PitchTrend>> {
    ENGINE_HANDLE
        .pitch_trend()
        .context("loading measurement history")
}

// ============================================================================
// WORKOUT
// ============================================================================

/// Start a workout from a JSON catalog, or the default workout when None
///
/// # Errors
/// - `Configuration` when the catalog JSON is malformed or empty
/// - `AlreadyStarted` while a previous workout is still running
#[flutter_rust_bridge::frb]
pub fn start_workout(catalog_json: Option<String>) -> Result<WorkoutSnapshot, WorkoutError> {
    let catalog = catalog_json
        .map(|json| ExerciseCatalog::from_json(&json))
        .transpose()?;
    ENGINE_HANDLE.start_workout(catalog)
}

/// Complete the current exercise early, or skip the current rest
///
/// `epoch` is the epoch of the snapshot the user acted on; a stale epoch
/// is ignored and the current snapshot is returned unchanged.
#[flutter_rust_bridge::frb]
pub fn advance_workout(epoch: u64) -> Result<WorkoutSnapshot, WorkoutError> {
    ENGINE_HANDLE.advance_workout(epoch)
}

/// Skip whatever rest is current; a no-op outside rest
#[flutter_rust_bridge::frb]
pub fn skip_rest() -> Result<WorkoutSnapshot, WorkoutError> {
    ENGINE_HANDLE.skip_rest()
}

/// Abandon the workout; the microphone is released before this returns
#[flutter_rust_bridge::frb]
pub fn abandon_workout() -> Result<WorkoutSnapshot, WorkoutError> {
    ENGINE_HANDLE.abandon_workout()
}

/// Begin recording the current phrase
#[flutter_rust_bridge::frb]
pub fn start_take() -> Result<WorkoutSnapshot, WorkoutError> {
    ENGINE_HANDLE.start_take()
}

/// Finish the phrase take and move to the next phrase or exercise
#[flutter_rust_bridge::frb]
pub fn finish_take() -> Result<WorkoutSnapshot, WorkoutError> {
    ENGINE_HANDLE.finish_take()
}

/// Latest snapshot of the current or last workout
#[flutter_rust_bridge::frb(sync)]
pub fn workout_snapshot() -> Option<WorkoutSnapshot> {
    ENGINE_HANDLE.workout_snapshot()
}

/// The built-in workout with its estimated duration
#[flutter_rust_bridge::frb(sync)]
pub fn default_catalog() -> CatalogOverview {
    let rest_seconds = ENGINE_HANDLE.config_snapshot().workout.rest_seconds;
    CatalogOverview::new(&ExerciseCatalog::default_workout(), rest_seconds)
}

// ============================================================================
// PROGRESS
// ============================================================================

/// Persist progress under `dir` (the app documents directory)
#[flutter_rust_bridge::frb(sync)]
pub fn set_progress_dir(dir: String) {
    ENGINE_HANDLE.use_progress_dir(dir);
}

/// Streak and totals for the local profile
#[flutter_rust_bridge::frb]
pub fn get_progress() -> Result<UserProgress> {
    ENGINE_HANDLE.progress().context("loading user progress")
}

// Error code constant accessors for Dart/Flutter

/// Get AudioErrorCodes as a structured object with all error code constants
#[flutter_rust_bridge::frb(sync)]
pub fn get_audio_error_codes() -> AudioErrorCodes {
    AudioErrorCodes {}
}

/// Get WorkoutErrorCodes as a structured object with all error code constants
#[flutter_rust_bridge::frb(sync)]
pub fn get_workout_error_codes() -> WorkoutErrorCodes {
    WorkoutErrorCodes {}
}

/// Get ConfigErrorCodes as a structured object with all error code constants
#[flutter_rust_bridge::frb(sync)]
pub fn get_config_error_codes() -> ConfigErrorCodes {
    ConfigErrorCodes {}
}

#[cfg(test)]
#[path = "api/tests.rs"]
mod tests;
