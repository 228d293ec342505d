//! Core telemetry event types describing recording and workout activity
//! exposed to the CLI and flutter_rust_bridge streams.

use serde::{Deserialize, Serialize};

/// High-level lifecycle stages reported by JNI/engine instrumentation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    LibraryLoaded,
    ContextInitialized,
}

/// Metric events covering the recording lifecycle, capture health and
/// workout progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    RecordingStarted {
        backend: String,
        sample_rate: u32,
    },
    RecordingStopped {
        duration_ms: u64,
        voiced_frames: u32,
    },
    CaptureInterrupted {
        reason: String,
    },
    BufferBackpressure {
        dropped: u64,
    },
    WorkoutTransition {
        phase: String,
        exercise_index: Option<usize>,
    },
    WorkoutCompleted {
        streak: u32,
    },
    JniLifecycle {
        phase: LifecyclePhase,
        timestamp_ms: u64,
    },
}
