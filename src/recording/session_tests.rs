use super::*;
use crate::engine::backend::{FixtureBackend, FixturePace};
use crate::fixtures;

fn recorder_with(backend: FixtureBackend) -> (Recorder, Arc<FixtureBackend>) {
    let backend = Arc::new(backend);
    let recorder = Recorder::new(backend.clone(), AppConfig::default())
        .expect("default config")
        .with_microphone(Arc::new(Microphone::new()));
    (recorder, backend)
}

fn tone_backend(seconds: f32) -> FixtureBackend {
    let len = (48_000.0 * seconds) as usize;
    FixtureBackend::new(fixtures::sine_wave(110.0, 48_000, len, 0.5), 480)
}

#[test]
fn test_start_stop_returns_take() {
    let (recorder, backend) = recorder_with(tone_backend(1.5));
    let mut session = recorder.start().unwrap();
    assert_eq!(session.state(), RecordingState::Recording);
    assert!(recorder.microphone().is_held());

    assert!(backend.wait_until_finished(Duration::from_secs(5)));
    let take = session.stop().unwrap().expect("first stop yields the take");

    assert_eq!(session.state(), RecordingState::Stopped);
    assert_eq!(take.samples.len(), 72_000);
    let settled = take.settled_hz.expect("tone settles");
    assert!((settled - 110.0).abs() < 1.5, "settled {}", settled);
    assert!(!recorder.microphone().is_held());
}

#[test]
fn test_second_stop_is_a_noop() {
    let (recorder, backend) = recorder_with(tone_backend(0.2));
    let mut session = recorder.start().unwrap();
    backend.wait_until_finished(Duration::from_secs(2));

    assert!(session.stop().unwrap().is_some());
    assert_eq!(session.stop().unwrap(), None);
    assert_eq!(session.state(), RecordingState::Stopped);
    assert!(!recorder.microphone().is_held());
}

#[test]
fn test_stop_before_start_is_not_recording() {
    let (recorder, _backend) = recorder_with(tone_backend(0.1));
    let mut session = recorder.session();
    assert_eq!(session.stop().unwrap_err(), AudioError::NotRecording);
}

#[test]
fn test_second_session_is_busy() {
    let (recorder, _backend) = recorder_with(tone_backend(0.5).with_pace(FixturePace::Realtime));
    let mut first = recorder.start().unwrap();

    let mut second = recorder.session();
    assert_eq!(second.start().unwrap_err(), AudioError::ResourceBusy);
    assert_eq!(second.state(), RecordingState::Idle);

    first.stop().unwrap();
    assert!(second.start().is_ok());
    second.stop().unwrap();
}

#[test]
fn test_finished_session_cannot_restart() {
    let (recorder, _backend) = recorder_with(tone_backend(0.1));
    let mut session = recorder.start().unwrap();
    session.stop().unwrap();

    match session.start() {
        Err(AudioError::StreamFailure { reason }) => assert!(reason.contains("finished")),
        other => panic!("Expected StreamFailure, got {:?}", other),
    }
}

#[test]
fn test_interruption_discards_take() {
    let (recorder, backend) = recorder_with(tone_backend(1.0).with_fault_after(10, "phone call"));
    let mut session = recorder.start().unwrap();
    backend.wait_until_finished(Duration::from_secs(2));

    // The worker notices the fault on its own; state flips before stop
    let deadline = Instant::now() + Duration::from_secs(2);
    while session.state() != RecordingState::Error && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(session.state(), RecordingState::Error);

    match session.stop() {
        Err(AudioError::CaptureInterrupted { reason }) => assert_eq!(reason, "phone call"),
        other => panic!("Expected CaptureInterrupted, got {:?}", other),
    }
    assert_eq!(session.state(), RecordingState::Error);
    assert_eq!(session.stop().unwrap(), None);
    assert!(!recorder.microphone().is_held());
}

#[test]
fn test_drop_releases_microphone() {
    let (recorder, _backend) = recorder_with(tone_backend(0.5).with_pace(FixturePace::Realtime));
    let session = recorder.start().unwrap();
    assert!(recorder.microphone().is_held());
    drop(session);
    assert!(!recorder.microphone().is_held());
}

#[test]
fn test_samples_stream_while_recording() {
    let (recorder, backend) = recorder_with(tone_backend(0.5));
    let mut rx = recorder.subscribe();
    let mut session = recorder.start().unwrap();
    backend.wait_until_finished(Duration::from_secs(2));
    let take = session.stop().unwrap().unwrap();

    let mut count = 0;
    while let Ok(sample) = rx.try_recv() {
        assert!(sample.level >= 0.0 && sample.level <= 1.0);
        count += 1;
    }
    assert_eq!(count, take.total_frames);
    assert!(session.latest().is_some());
}

#[test]
fn test_invalid_frame_size_fails_at_construction() {
    let mut config = AppConfig::default();
    config.pitch.frame_size = 256;
    let result = Recorder::new(Arc::new(tone_backend(0.1)), config);
    assert!(matches!(result, Err(ConfigError::FrameTooShort { .. })));
}

#[test]
fn test_elapsed_follows_time_source() {
    use crate::engine::backend::StubTimeSource;

    let (recorder, _backend) = recorder_with(tone_backend(0.2));
    let recorder = recorder.with_time_source(Arc::new(StubTimeSource::new()));
    let mut idle = recorder.session();
    assert_eq!(idle.elapsed(), Duration::ZERO);

    idle.start().unwrap();
    // Stub clock advances 10 ms per reading
    assert_eq!(idle.elapsed(), Duration::from_millis(10));
    assert_eq!(idle.elapsed(), Duration::from_millis(20));
    idle.stop().unwrap();
}
