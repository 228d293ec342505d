// VoiceProfileClassifier - population-relative voice depth
//
// A settled pitch is bucketed by fixed thresholds and placed on a static
// reference distribution of adult speaking pitch. Classification is total:
// any input, including NaN or values far outside the voice range, yields a
// valid profile.

use serde::{Deserialize, Serialize};

/// Upper bounds (exclusive) of the first three categories, in Hz
pub const VERY_DEEP_BELOW_HZ: f32 = 100.0;
pub const DEEP_BELOW_HZ: f32 = 130.0;
pub const AVERAGE_BELOW_HZ: f32 = 165.0;

/// (Hz, percent of speakers with a higher pitch), strictly increasing in Hz
/// and non-increasing in percentile. Below the first point everyone is
/// higher; above the last nobody is.
const REFERENCE_CDF: &[(f32, f32)] = &[
    (60.0, 100.0),
    (70.0, 98.6),
    (80.0, 96.8),
    (90.0, 92.8),
    (100.0, 84.6),
    (110.0, 70.1),
    (120.0, 50.0),
    (130.0, 29.9),
    (140.0, 15.4),
    (150.0, 7.2),
    (165.0, 2.1),
    (180.0, 0.6),
    (200.0, 0.1),
    (240.0, 0.0),
];

/// Voice depth bucket, ordered from lowest to highest pitch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceCategory {
    VeryDeep,
    Deep,
    Average,
    Higher,
}

impl VoiceCategory {
    pub const ALL: [VoiceCategory; 4] = [
        VoiceCategory::VeryDeep,
        VoiceCategory::Deep,
        VoiceCategory::Average,
        VoiceCategory::Higher,
    ];

    /// Bucket for a pitch; NaN and negatives fall into the lowest bucket
    pub fn from_hz(hz: f32) -> Self {
        let hz = sanitize(hz);
        if hz < VERY_DEEP_BELOW_HZ {
            VoiceCategory::VeryDeep
        } else if hz < DEEP_BELOW_HZ {
            VoiceCategory::Deep
        } else if hz < AVERAGE_BELOW_HZ {
            VoiceCategory::Average
        } else {
            VoiceCategory::Higher
        }
    }

    /// Half-open Hz range [lower, upper) covered by the bucket
    pub fn range(&self) -> (f32, f32) {
        match self {
            VoiceCategory::VeryDeep => (0.0, VERY_DEEP_BELOW_HZ),
            VoiceCategory::Deep => (VERY_DEEP_BELOW_HZ, DEEP_BELOW_HZ),
            VoiceCategory::Average => (DEEP_BELOW_HZ, AVERAGE_BELOW_HZ),
            VoiceCategory::Higher => (AVERAGE_BELOW_HZ, f32::INFINITY),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VoiceCategory::VeryDeep => "Very Deep",
            VoiceCategory::Deep => "Deep",
            VoiceCategory::Average => "Average",
            VoiceCategory::Higher => "Higher",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            VoiceCategory::VeryDeep => {
                "Your voice has a rich, commanding bass quality. You're in the top tier for vocal depth."
            }
            VoiceCategory::Deep => {
                "You have a naturally deep voice with good resonance. Keep training to reach your full potential."
            }
            VoiceCategory::Average => {
                "Your voice is in the typical male range. With consistent training, you can develop more depth."
            }
            VoiceCategory::Higher => {
                "Your voice is on the higher side. Training can help you access your lower register."
            }
        }
    }
}

/// Immutable result of one completed measurement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub hz: i32,
    pub category: VoiceCategory,
    /// Percent of reference speakers with a higher pitch, 0..=100
    pub percentile: u8,
    pub comparison: String,
}

/// Classify a settled pitch. Total over every f32.
pub fn classify(settled_hz: f32) -> VoiceProfile {
    let hz = sanitize(settled_hz);
    let percentile = percentile_for(hz);
    VoiceProfile {
        hz: hz.round() as i32,
        category: VoiceCategory::from_hz(hz),
        percentile,
        comparison: comparison_for(hz, percentile),
    }
}

/// Percent of the reference population with a higher pitch
pub fn percentile_for(hz: f32) -> u8 {
    let hz = sanitize(hz);
    let (first_hz, first_pct) = REFERENCE_CDF[0];
    if hz <= first_hz {
        return first_pct.round() as u8;
    }

    for pair in REFERENCE_CDF.windows(2) {
        let (lo_hz, lo_pct) = pair[0];
        let (hi_hz, hi_pct) = pair[1];
        if hz <= hi_hz {
            let t = (hz - lo_hz) / (hi_hz - lo_hz);
            let pct = lo_pct + t * (hi_pct - lo_pct);
            return pct.round().clamp(0.0, 100.0) as u8;
        }
    }

    REFERENCE_CDF[REFERENCE_CDF.len() - 1].1.round() as u8
}

/// Qualitative band plus the percentile phrase
pub fn comparison_for(hz: f32, percentile: u8) -> String {
    let band = if hz < 85.0 {
        "Deeper than Morgan Freeman"
    } else if hz < 100.0 {
        "Similar to Morgan Freeman"
    } else if hz < 115.0 {
        "Deeper than average"
    } else if hz < DEEP_BELOW_HZ {
        "Slightly below average"
    } else if hz < AVERAGE_BELOW_HZ {
        "Average male range"
    } else {
        "Higher than average"
    };
    format!("{}: deeper than {}% of speakers", band, percentile)
}

/// NaN and negative input clamp to zero; +inf stays and lands in Higher
fn sanitize(hz: f32) -> f32 {
    if hz.is_nan() || hz < 0.0 {
        0.0
    } else {
        hz
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
