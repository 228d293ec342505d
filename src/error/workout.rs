// Workout session error types and constants

use crate::error::{AudioError, ConfigError, ErrorCode};
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Workout error code constants exposed to Dart via FFI
///
/// Error code range: 2001-2008
#[frb(unignore)]
pub struct WorkoutErrorCodes {}

#[frb]
impl WorkoutErrorCodes {
    /// Catalog failed validation at workout start
    pub const CONFIGURATION: i32 = 2001;

    /// Command needs a running workout
    pub const NOT_STARTED: i32 = 2002;

    /// Workout already started
    pub const ALREADY_STARTED: i32 = 2003;

    /// Workout is completed or abandoned
    pub const TERMINAL: i32 = 2004;

    /// Phrase exercises advance only on a recorded take
    pub const RECORDING_REQUIRED: i32 = 2005;

    /// No take is being recorded
    pub const NO_ACTIVE_TAKE: i32 = 2006;

    /// Capture failed underneath the workout
    pub const CAPTURE: i32 = 2007;

    /// Shared workout state was poisoned
    pub const STATE_POISONED: i32 = 2008;

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn configuration() -> i32 {
        Self::CONFIGURATION
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn not_started() -> i32 {
        Self::NOT_STARTED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn already_started() -> i32 {
        Self::ALREADY_STARTED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn terminal() -> i32 {
        Self::TERMINAL
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn recording_required() -> i32 {
        Self::RECORDING_REQUIRED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn no_active_take() -> i32 {
        Self::NO_ACTIVE_TAKE
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn capture() -> i32 {
        Self::CAPTURE
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn state_poisoned() -> i32 {
        Self::STATE_POISONED
    }
}

/// Log a workout error with structured context
pub fn log_workout_error(err: &WorkoutError, context: &str) {
    error!(
        "Workout error in {}: code={}, component=WorkoutSessionMachine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Workout session errors
///
/// Error code range: 2001-2008
#[derive(Debug, Clone, PartialEq)]
pub enum WorkoutError {
    /// Catalog failed validation
    Configuration(ConfigError),

    /// Command needs a running workout
    NotStarted,

    /// Workout already started
    AlreadyStarted,

    /// Workout reached completed or abandoned
    Terminal,

    /// Phrase exercise cannot advance without a recorded take
    RecordingRequired,

    /// Finish requested with no take recording
    NoActiveTake,

    /// Capture failed underneath the workout
    Capture(AudioError),

    /// Shared workout state was poisoned
    StatePoisoned,
}

impl ErrorCode for WorkoutError {
    fn code(&self) -> i32 {
        match self {
            WorkoutError::Configuration(_) => WorkoutErrorCodes::CONFIGURATION,
            WorkoutError::NotStarted => WorkoutErrorCodes::NOT_STARTED,
            WorkoutError::AlreadyStarted => WorkoutErrorCodes::ALREADY_STARTED,
            WorkoutError::Terminal => WorkoutErrorCodes::TERMINAL,
            WorkoutError::RecordingRequired => WorkoutErrorCodes::RECORDING_REQUIRED,
            WorkoutError::NoActiveTake => WorkoutErrorCodes::NO_ACTIVE_TAKE,
            WorkoutError::Capture(_) => WorkoutErrorCodes::CAPTURE,
            WorkoutError::StatePoisoned => WorkoutErrorCodes::STATE_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            WorkoutError::Configuration(err) => err.message(),
            WorkoutError::NotStarted => "Workout has not been started.".to_string(),
            WorkoutError::AlreadyStarted => "Workout already started.".to_string(),
            WorkoutError::Terminal => "Workout has already ended.".to_string(),
            WorkoutError::RecordingRequired => {
                "Record the current phrase before moving on.".to_string()
            }
            WorkoutError::NoActiveTake => "No take is being recorded.".to_string(),
            WorkoutError::Capture(err) => err.message(),
            WorkoutError::StatePoisoned => "Workout state lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for WorkoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WorkoutError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for WorkoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkoutError::Configuration(err) => Some(err),
            WorkoutError::Capture(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for WorkoutError {
    fn from(err: ConfigError) -> Self {
        WorkoutError::Configuration(err)
    }
}

impl From<AudioError> for WorkoutError {
    fn from(err: AudioError) -> Self {
        WorkoutError::Capture(err)
    }
}
