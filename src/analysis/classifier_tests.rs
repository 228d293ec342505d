use super::*;

#[test]
fn test_category_thresholds() {
    assert_eq!(VoiceCategory::from_hz(99.9), VoiceCategory::VeryDeep);
    assert_eq!(VoiceCategory::from_hz(100.0), VoiceCategory::Deep);
    assert_eq!(VoiceCategory::from_hz(129.9), VoiceCategory::Deep);
    assert_eq!(VoiceCategory::from_hz(130.0), VoiceCategory::Average);
    assert_eq!(VoiceCategory::from_hz(164.9), VoiceCategory::Average);
    assert_eq!(VoiceCategory::from_hz(165.0), VoiceCategory::Higher);
}

#[test]
fn test_categories_cover_the_line_without_overlap() {
    // Walk 0..2000 Hz in 0.25 Hz steps; each value must sit in exactly one range
    let mut hz = 0.0_f32;
    let mut previous = VoiceCategory::VeryDeep;
    while hz < 2000.0 {
        let matches: Vec<_> = VoiceCategory::ALL
            .iter()
            .filter(|c| {
                let (lo, hi) = c.range();
                hz >= lo && hz < hi
            })
            .collect();
        assert_eq!(matches.len(), 1, "{} Hz matched {:?}", hz, matches);
        let category = VoiceCategory::from_hz(hz);
        assert_eq!(*matches[0], category);
        assert!(category >= previous, "category went down at {} Hz", hz);
        previous = category;
        hz += 0.25;
    }
}

#[test]
fn test_classification_is_total() {
    for hz in [0.0_f32, 20.0, 59.0, 85.0, 120.0, 400.0, 2000.0, 1.0e9, f32::INFINITY] {
        let profile = classify(hz);
        assert!(profile.percentile <= 100, "{} Hz", hz);
        assert!(!profile.comparison.is_empty());
    }
}

#[test]
fn test_out_of_range_clamps_percentile() {
    assert_eq!(classify(20.0).percentile, 100);
    assert_eq!(classify(20.0).category, VoiceCategory::VeryDeep);
    assert_eq!(classify(2000.0).percentile, 0);
    assert_eq!(classify(2000.0).category, VoiceCategory::Higher);
}

#[test]
fn test_nan_and_negative_clamp_to_zero() {
    let profile = classify(f32::NAN);
    assert_eq!(profile.hz, 0);
    assert_eq!(profile.category, VoiceCategory::VeryDeep);
    assert_eq!(profile.percentile, 100);
    assert_eq!(classify(-50.0), profile);
}

#[test]
fn test_percentile_is_monotonic() {
    let mut previous = 100u8;
    for hz in (40..400).map(|v| v as f32) {
        let pct = percentile_for(hz);
        assert!(pct <= previous, "percentile rose at {} Hz", hz);
        previous = pct;
    }
}

#[test]
fn test_percentile_interpolates_reference_points() {
    assert_eq!(percentile_for(120.0), 50);
    assert_eq!(percentile_for(100.0), 85);
    // Halfway between 120 (50.0) and 130 (29.9)
    assert_eq!(percentile_for(125.0), 40);
}

#[test]
fn test_profile_rounds_hz() {
    let profile = classify(112.6);
    assert_eq!(profile.hz, 113);
    assert_eq!(profile.category, VoiceCategory::Deep);
    assert_eq!(
        profile.comparison,
        format!("Deeper than average: deeper than {}% of speakers", profile.percentile)
    );
}

#[test]
fn test_comparison_bands() {
    assert!(classify(80.0).comparison.starts_with("Deeper than Morgan Freeman"));
    assert!(classify(90.0).comparison.starts_with("Similar to Morgan Freeman"));
    assert!(classify(125.0).comparison.starts_with("Slightly below average"));
    assert!(classify(150.0).comparison.starts_with("Average male range"));
    assert!(classify(190.0).comparison.starts_with("Higher than average"));
}

#[test]
fn test_category_serializes_snake_case() {
    let json = serde_json::to_string(&VoiceCategory::VeryDeep).unwrap();
    assert_eq!(json, "\"very_deep\"");
}
