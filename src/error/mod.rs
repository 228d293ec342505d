// Error types for the voice trainer engine
//
// Structured errors with numeric codes suitable for FFI communication.
// Pitch estimation and smoothing never fail at runtime; only construction
// validates. Capture and workout layers surface typed failures.

mod audio;
mod config;
mod workout;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use config::{log_config_error, ConfigError, ConfigErrorCodes};
pub use workout::{log_workout_error, WorkoutError, WorkoutErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the FFI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
