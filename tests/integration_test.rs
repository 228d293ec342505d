//! Integration tests for the measurement path through EngineHandle
//!
//! These tests validate the full recording lifecycle across the Rust layer,
//! including:
//! - Microphone capture to settled pitch and voice profile
//! - Stream behavior (subscribe, receive, ordering)
//! - Error propagation and typed error handling
//! - Microphone exclusivity between measurements and workouts
//!
//! Every test replays synthetic audio through the fixture backend, so no
//! audio hardware is required.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use voice_trainer::analysis::{MeasurementContext, VoiceCategory};
use voice_trainer::audio::Microphone;
use voice_trainer::config::AppConfig;
use voice_trainer::engine::{EngineHandle, FixtureBackend, FixturePace};
use voice_trainer::error::{AudioError, ErrorCode};
use voice_trainer::fixtures;
use voice_trainer::recording::Recorder;
use voice_trainer::workout::{ExerciseCatalog, FixedCalendar, InMemoryProgressStore, WorkoutPhase};

fn engine(backend: FixtureBackend) -> (EngineHandle, Arc<FixtureBackend>) {
    let backend = Arc::new(backend);
    let recorder = Recorder::new(backend.clone(), AppConfig::default())
        .expect("default config is valid")
        .with_microphone(Arc::new(Microphone::new()));
    let engine = EngineHandle::with_parts(
        AppConfig::default(),
        backend.clone(),
        Arc::new(InMemoryProgressStore::new()),
        Arc::new(FixedCalendar::new(NaiveDate::from_ymd_opt(2026, 5, 4).unwrap())),
    )
    .expect("default config is valid")
    .with_recorder(recorder);
    (engine, backend)
}

fn voiced(hz: f32, seconds: f32) -> Vec<f32> {
    let len = (48_000.0 * seconds) as usize;
    fixtures::harmonic_tone(hz, 48_000, len, &[0.4, 0.25, 0.1])
}

/// A deep harmonic voice settles and lands in the deepest bucket
#[test]
fn test_deep_voice_measurement() {
    let (engine, backend) = engine(FixtureBackend::new(voiced(92.0, 2.0), 480));

    engine.start_measurement().unwrap();
    assert!(backend.wait_until_finished(Duration::from_secs(5)));
    let result = engine.stop_measurement(MeasurementContext::QuickMeasure).unwrap();

    let profile = result.profile.expect("two seconds of voice settles");
    assert_eq!(profile.category, VoiceCategory::VeryDeep);
    assert!((profile.hz - 92).abs() <= 1, "hz {}", profile.hz);
    assert!(result.pitch_min_hz.unwrap() <= result.pitch_max_hz.unwrap());
    assert_eq!(result.duration_ms, 2000);
}

/// A tone shorter than the settle window yields no profile and no error
#[test]
fn test_short_take_does_not_settle() {
    let (engine, backend) = engine(FixtureBackend::new(voiced(120.0, 0.6), 480));

    engine.start_measurement().unwrap();
    assert!(backend.wait_until_finished(Duration::from_secs(5)));
    let result = engine.stop_measurement(MeasurementContext::QuickMeasure).unwrap();

    assert!(result.voiced_frames > 0);
    assert_eq!(result.settled_hz, None);
    assert_eq!(result.profile, None);
}

/// Samples arrive in timestamp order with a half-frame hop
#[test]
fn test_voice_sample_stream_is_ordered() {
    let (engine, backend) = engine(FixtureBackend::new(voiced(140.0, 1.0), 480));
    let mut samples = engine.subscribe_voice_samples();

    engine.start_measurement().unwrap();
    assert!(backend.wait_until_finished(Duration::from_secs(5)));
    let result = engine.stop_measurement(MeasurementContext::QuickMeasure).unwrap();

    let mut timestamps = Vec::new();
    while timestamps.len() < 10 {
        let sample = samples.blocking_recv().expect("stream stays open");
        timestamps.push(sample.timestamp_ms);
    }
    assert!(timestamps.windows(2).all(|pair| pair[1] > pair[0]));
    assert_eq!(timestamps[1] - timestamps[0], 21); // 1024 samples at 48 kHz
    assert!(result.voiced_frames >= 10);
}

/// The OS revoking the device discards the take and frees the microphone
#[test]
fn test_interrupted_measurement() {
    let backend = FixtureBackend::new(voiced(120.0, 2.0), 480).with_fault_after(20, "phone call");
    let (engine, backend) = engine(backend);

    engine.start_measurement().unwrap();
    assert!(backend.wait_until_finished(Duration::from_secs(5)));
    let err = engine.stop_measurement(MeasurementContext::QuickMeasure).unwrap_err();

    assert_eq!(
        err,
        AudioError::CaptureInterrupted {
            reason: "phone call".to_string()
        }
    );
    assert_eq!(err.code(), 1002);
    assert!(!engine.recorder().microphone().is_held());
    assert!(engine.measurement_history().unwrap().is_empty());

    // The next measurement starts cleanly; the fixture faults it again
    engine.start_measurement().unwrap();
    assert!(backend.wait_until_finished(Duration::from_secs(5)));
    assert!(matches!(
        engine.stop_measurement(MeasurementContext::QuickMeasure),
        Err(AudioError::CaptureInterrupted { .. })
    ));
}

/// A measurement holding the microphone leaves a workout's pitch meter dark
/// without failing the workout
#[test]
fn test_workout_pitch_meter_yields_to_measurement() {
    let backend = FixtureBackend::new(voiced(120.0, 30.0), 480).with_pace(FixturePace::Realtime);
    let (engine, _backend) = engine(backend);
    let catalog = ExerciseCatalog::from_json(
        r#"[{"id": "hum", "type": "timed", "duration": 45, "showPitchMeter": true}]"#,
    )
    .unwrap();

    engine.start_measurement().unwrap();
    let snapshot = engine.start_workout(Some(catalog)).unwrap();
    assert_eq!(
        snapshot.phase,
        WorkoutPhase::ExerciseActive {
            index: 0,
            rep: None,
            phrase: None
        }
    );
    assert!(engine.is_measuring());

    engine.abandon_workout().unwrap();
    assert!(engine.recorder().microphone().is_held(), "measurement keeps its lease");
    engine.stop_measurement(MeasurementContext::QuickMeasure).unwrap();
    assert!(!engine.recorder().microphone().is_held());
}

/// Measurements accumulate into a trend once three are recorded
#[test]
fn test_history_trend_after_three_measurements() {
    let (engine, backend) = engine(FixtureBackend::new(voiced(110.0, 1.5), 480));

    for _ in 0..3 {
        engine.start_measurement().unwrap();
        assert!(backend.wait_until_finished(Duration::from_secs(5)));
        engine.stop_measurement(MeasurementContext::QuickMeasure).unwrap();
    }

    assert_eq!(engine.measurement_history().unwrap().len(), 3);
    assert_eq!(
        engine.pitch_trend().unwrap(),
        Some(voice_trainer::analysis::PitchTrend::Stable)
    );
}
