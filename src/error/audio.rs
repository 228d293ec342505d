// Audio capture error types and constants

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Audio error code constants exposed to Dart via FFI
///
/// Error code range: 1001-1009
#[frb(unignore)]
pub struct AudioErrorCodes {}

#[frb]
impl AudioErrorCodes {
    /// Microphone is already held by another recording
    pub const RESOURCE_BUSY: i32 = 1001;

    /// Platform revoked or lost the input device mid-recording
    pub const CAPTURE_INTERRUPTED: i32 = 1002;

    /// No recording is active
    pub const NOT_RECORDING: i32 = 1003;

    /// Hardware error occurred
    pub const HARDWARE_ERROR: i32 = 1004;

    /// Microphone permission denied
    pub const PERMISSION_DENIED: i32 = 1005;

    /// Failed to open audio stream
    pub const STREAM_OPEN_FAILED: i32 = 1006;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1007;

    /// Audio stream disconnected or channel closed unexpectedly
    pub const STREAM_FAILURE: i32 = 1008;

    /// Android context was not initialized before capture start
    pub const CONTEXT_NOT_INITIALIZED: i32 = 1009;

    // Getter methods for FFI exposure (flutter_rust_bridge requires methods not const)

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn resource_busy() -> i32 {
        Self::RESOURCE_BUSY
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn capture_interrupted() -> i32 {
        Self::CAPTURE_INTERRUPTED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn not_recording() -> i32 {
        Self::NOT_RECORDING
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn hardware_error() -> i32 {
        Self::HARDWARE_ERROR
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn permission_denied() -> i32 {
        Self::PERMISSION_DENIED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn stream_open_failed() -> i32 {
        Self::STREAM_OPEN_FAILED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn lock_poisoned() -> i32 {
        Self::LOCK_POISONED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn stream_failure() -> i32 {
        Self::STREAM_FAILURE
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn context_not_initialized() -> i32 {
        Self::CONTEXT_NOT_INITIALIZED
    }
}

/// Log an audio error with structured context
///
/// Emits error_code, component and message on a single line.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=RecordingSession, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio capture errors
///
/// These errors cover the recording lifecycle: acquiring the microphone,
/// opening the platform stream, and faults while capture is running.
///
/// Error code range: 1001-1009
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Another recording already holds the microphone
    ResourceBusy,

    /// The device was lost while recording; the take is discarded
    CaptureInterrupted { reason: String },

    /// No recording is active
    NotRecording,

    /// Hardware error occurred
    HardwareError { details: String },

    /// Microphone permission denied
    PermissionDenied,

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Stream channel disconnected unexpectedly
    StreamFailure { reason: String },

    /// Android context was not initialized before capture start
    ContextNotInitialized,
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::ResourceBusy => AudioErrorCodes::RESOURCE_BUSY,
            AudioError::CaptureInterrupted { .. } => AudioErrorCodes::CAPTURE_INTERRUPTED,
            AudioError::NotRecording => AudioErrorCodes::NOT_RECORDING,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::PermissionDenied => AudioErrorCodes::PERMISSION_DENIED,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::StreamFailure { .. } => AudioErrorCodes::STREAM_FAILURE,
            AudioError::ContextNotInitialized => AudioErrorCodes::CONTEXT_NOT_INITIALIZED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::ResourceBusy => {
                "Microphone is in use by another recording. Stop it first.".to_string()
            }
            AudioError::CaptureInterrupted { reason } => {
                format!("Recording interrupted: {}", reason)
            }
            AudioError::NotRecording => "No recording in progress.".to_string(),
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::PermissionDenied => {
                "Microphone permission denied. Please grant microphone access.".to_string()
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::StreamFailure { reason } => {
                format!("Audio stream failed: {}", reason)
            }
            AudioError::ContextNotInitialized => {
                "Android context not initialized. Load the native library first.".to_string()
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

/// Platform wording for a refused microphone, across cpal hosts and Oboe
const PERMISSION_MARKERS: &[&str] = &[
    "permission",
    "denied",
    "not authorized",
    "unauthorized",
];

impl AudioError {
    /// Stream open failure, recognising a refused microphone permission
    pub fn open_failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let lower = reason.to_lowercase();
        if PERMISSION_MARKERS.iter().any(|marker| lower.contains(marker)) {
            AudioError::PermissionDenied
        } else {
            AudioError::StreamOpenFailed { reason }
        }
    }
}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}
