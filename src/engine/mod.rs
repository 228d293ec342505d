//! Engine module housing the reusable voice core.
//!
//! This module exposes trait-based capture backends (`backend`) and the
//! `EngineHandle` orchestration layer (`core`) shared by the FFI surface
//! and the CLI.

pub mod backend;
pub mod core;

#[cfg(target_os = "android")]
pub use backend::OboeBackend;
#[cfg(not(target_os = "android"))]
pub use backend::CpalBackend;
pub use backend::{
    CaptureBackend, CaptureFault, FixtureBackend, FixturePace, StubTimeSource, SystemTimeSource,
    TimeSource,
};
pub use core::{EngineHandle, MeasurementResult};
