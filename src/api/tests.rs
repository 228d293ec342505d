use super::*;

#[test]
fn test_get_version() {
    let result = get_version().unwrap();
    assert_eq!(result, "0.1.0");
}

#[test]
fn test_classify_pitch_matches_classifier() {
    let profile = classify_pitch(118.0);
    assert_eq!(profile, classify(118.0));
    assert_eq!(profile.hz, 118);
}

#[test]
fn test_pitch_projections() {
    let projection = pitch_projections(120.0);
    assert_eq!(projection.baseline_hz, 120);
    assert_eq!(projection.one_month_hz, 114);
}

#[test]
fn test_default_catalog_overview() {
    let overview = default_catalog();
    assert_eq!(overview.exercises.len(), 5);
    assert_eq!(overview.exercises[0].id, "diaphragmatic_breathing");
    assert!(overview.estimated_minutes > 0);
}

#[test]
fn test_malformed_catalog_is_a_configuration_error() {
    let err = start_workout(Some("[]".to_string())).unwrap_err();
    assert!(matches!(err, WorkoutError::Configuration(_)));

    let err = start_workout(Some("not json".to_string())).unwrap_err();
    assert!(matches!(err, WorkoutError::Configuration(_)));
}

#[test]
fn test_error_code_objects() {
    let _ = get_audio_error_codes();
    assert_eq!(AudioErrorCodes::resource_busy(), 1001);
    assert_eq!(WorkoutErrorCodes::not_started(), 2002);
}
