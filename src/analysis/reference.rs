//! Reference voices and pitch arithmetic used for progress framing.

use serde::{Deserialize, Serialize};

/// A well-known speaker and their typical speaking pitch
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferenceVoice {
    pub name: &'static str,
    pub hz: f32,
}

pub const REFERENCE_VOICES: [ReferenceVoice; 4] = [
    ReferenceVoice {
        name: "James Earl Jones",
        hz: 80.0,
    },
    ReferenceVoice {
        name: "Morgan Freeman",
        hz: 85.0,
    },
    ReferenceVoice {
        name: "Benedict Cumberbatch",
        hz: 110.0,
    },
    ReferenceVoice {
        name: "Average Male",
        hz: 120.0,
    },
];

/// Range accepted as a plausible speaking pitch
pub const VALID_VOICE_RANGE_HZ: (f32, f32) = (50.0, 400.0);

pub fn is_valid_voice_pitch(hz: f32) -> bool {
    hz >= VALID_VOICE_RANGE_HZ.0 && hz <= VALID_VOICE_RANGE_HZ.1
}

/// Reference voice closest to `hz`
pub fn nearest_reference(hz: f32) -> ReferenceVoice {
    let mut best = REFERENCE_VOICES[0];
    for voice in REFERENCE_VOICES.iter().skip(1) {
        if (voice.hz - hz).abs() < (best.hz - hz).abs() {
            best = *voice;
        }
    }
    best
}

/// Signed distance in semitones from `from_hz` to `to_hz`
pub fn hz_to_semitones(from_hz: f32, to_hz: f32) -> f32 {
    if from_hz <= 0.0 || to_hz <= 0.0 {
        return 0.0;
    }
    12.0 * (to_hz / from_hz).log2()
}

/// Expected pitch after consistent training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchProjection {
    pub baseline_hz: i32,
    pub one_month_hz: i32,
    pub three_months_hz: i32,
}

/// Drop of min(5%, 12 Hz) after one month and min(12%, 25 Hz) after three
pub fn calculate_projections(baseline_hz: f32) -> PitchProjection {
    let baseline = baseline_hz.max(0.0);
    let one_month = baseline - (baseline * 0.05).min(12.0);
    let three_months = baseline - (baseline * 0.12).min(25.0);
    PitchProjection {
        baseline_hz: baseline.round() as i32,
        one_month_hz: one_month.round() as i32,
        three_months_hz: three_months.round() as i32,
    }
}
