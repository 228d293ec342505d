// Configuration error types and constants

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Configuration error code constants exposed to Dart via FFI
///
/// Error code range: 3001-3004
#[frb(unignore)]
pub struct ConfigErrorCodes {}

#[frb]
impl ConfigErrorCodes {
    /// Analysis frame cannot hold one period of the lowest supported pitch
    pub const FRAME_TOO_SHORT: i32 = 3001;

    /// A numeric range (frequency bounds, window size) is invalid
    pub const INVALID_RANGE: i32 = 3002;

    /// Exercise definition has a missing or ambiguous shape
    pub const MALFORMED_EXERCISE: i32 = 3003;

    /// Workout catalog contains no exercises
    pub const EMPTY_CATALOG: i32 = 3004;

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn frame_too_short() -> i32 {
        Self::FRAME_TOO_SHORT
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn invalid_range() -> i32 {
        Self::INVALID_RANGE
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn malformed_exercise() -> i32 {
        Self::MALFORMED_EXERCISE
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn empty_catalog() -> i32 {
        Self::EMPTY_CATALOG
    }
}

/// Log a configuration error with structured context
pub fn log_config_error(err: &ConfigError, context: &str) {
    error!(
        "Config error in {}: code={}, component=Configuration, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Configuration errors
///
/// Raised at construction or catalog load time, never mid-session.
///
/// Error code range: 3001-3004
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Frame size is shorter than two periods of the lowest pitch
    FrameTooShort { frame_size: usize, required: usize },

    /// A numeric parameter is out of range
    InvalidRange { reason: String },

    /// Exercise definition failed structural validation
    MalformedExercise { id: String, reason: String },

    /// Catalog has no exercises
    EmptyCatalog,
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::FrameTooShort { .. } => ConfigErrorCodes::FRAME_TOO_SHORT,
            ConfigError::InvalidRange { .. } => ConfigErrorCodes::INVALID_RANGE,
            ConfigError::MalformedExercise { .. } => ConfigErrorCodes::MALFORMED_EXERCISE,
            ConfigError::EmptyCatalog => ConfigErrorCodes::EMPTY_CATALOG,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::FrameTooShort {
                frame_size,
                required,
            } => format!(
                "Frame size {} is too short for the lowest pitch (need at least {})",
                frame_size, required
            ),
            ConfigError::InvalidRange { reason } => format!("Invalid range: {}", reason),
            ConfigError::MalformedExercise { id, reason } => {
                format!("Exercise '{}' is malformed: {}", id, reason)
            }
            ConfigError::EmptyCatalog => "Workout catalog contains no exercises".to_string(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConfigError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ConfigError {}
