//! Measurement history and pitch trend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RecordingBuffer;

/// Band within which the first and last measurements count as unchanged
const TREND_BAND_HZ: f32 = 5.0;
/// Measurements averaged at each end of the history
const TREND_SPAN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementContext {
    Onboarding,
    QuickMeasure,
    Exercise,
    Workout,
}

/// One completed pitch measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceMeasurement {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub pitch_hz: f32,
    pub pitch_min_hz: f32,
    pub pitch_max_hz: f32,
    pub duration_secs: f32,
    pub context: MeasurementContext,
}

impl VoiceMeasurement {
    /// Measurement for a recording that settled; None for a silent take
    pub fn from_buffer(buffer: &RecordingBuffer, context: MeasurementContext) -> Option<Self> {
        let hz = buffer.settled_hz?;
        Some(Self {
            id: format!("measure-{:08x}", rand::random::<u32>()),
            timestamp: Utc::now(),
            pitch_hz: hz,
            pitch_min_hz: buffer.pitch_min_hz.unwrap_or(hz),
            pitch_max_hz: buffer.pitch_max_hz.unwrap_or(hz),
            duration_secs: buffer.duration_ms as f32 / 1000.0,
            context,
        })
    }
}

/// Direction of travel; lower pitch is improvement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchTrend {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasurementHistory {
    measurements: Vec<VoiceMeasurement>,
}

impl MeasurementHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored measurements in any order
    pub fn from_measurements(measurements: Vec<VoiceMeasurement>) -> Self {
        let mut history = Self::new();
        for measurement in measurements {
            history.record(measurement);
        }
        history
    }

    /// Insert keeping timestamp order
    pub fn record(&mut self, measurement: VoiceMeasurement) {
        let index = self
            .measurements
            .partition_point(|m| m.timestamp <= measurement.timestamp);
        self.measurements.insert(index, measurement);
    }

    pub fn measurements(&self) -> &[VoiceMeasurement] {
        &self.measurements
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn latest(&self) -> Option<&VoiceMeasurement> {
        self.measurements.last()
    }

    /// Rounded mean pitch, None when empty
    pub fn average_pitch(&self) -> Option<i32> {
        if self.measurements.is_empty() {
            return None;
        }
        let sum: f32 = self.measurements.iter().map(|m| m.pitch_hz).sum();
        Some((sum / self.measurements.len() as f32).round() as i32)
    }

    /// Compare the first and last three measurements; None with fewer than three
    pub fn trend(&self) -> Option<PitchTrend> {
        if self.measurements.len() < TREND_SPAN {
            return None;
        }
        let mean = |slice: &[VoiceMeasurement]| {
            slice.iter().map(|m| m.pitch_hz).sum::<f32>() / slice.len() as f32
        };
        let first = mean(&self.measurements[..TREND_SPAN]);
        let last = mean(&self.measurements[self.measurements.len() - TREND_SPAN..]);
        let delta = last - first;

        Some(if delta < -TREND_BAND_HZ {
            PitchTrend::Improving
        } else if delta > TREND_BAND_HZ {
            PitchTrend::Declining
        } else {
            PitchTrend::Stable
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn measurement(day: u32, hz: f32) -> VoiceMeasurement {
        VoiceMeasurement {
            id: format!("m{}", day),
            timestamp: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap(),
            pitch_hz: hz,
            pitch_min_hz: hz - 5.0,
            pitch_max_hz: hz + 5.0,
            duration_secs: 5.0,
            context: MeasurementContext::QuickMeasure,
        }
    }

    #[test]
    fn test_trend_needs_three_measurements() {
        let mut history = MeasurementHistory::new();
        history.record(measurement(1, 130.0));
        history.record(measurement(2, 120.0));
        assert_eq!(history.trend(), None);
    }

    #[test]
    fn test_lower_pitch_is_improving() {
        let mut history = MeasurementHistory::new();
        for (day, hz) in [(1, 130.0), (2, 128.0), (3, 127.0), (4, 118.0), (5, 116.0), (6, 115.0)] {
            history.record(measurement(day, hz));
        }
        assert_eq!(history.trend(), Some(PitchTrend::Improving));
    }

    #[test]
    fn test_small_drift_is_stable() {
        let mut history = MeasurementHistory::new();
        for (day, hz) in [(1, 120.0), (2, 121.0), (3, 119.0), (4, 122.0)] {
            history.record(measurement(day, hz));
        }
        assert_eq!(history.trend(), Some(PitchTrend::Stable));
    }

    #[test]
    fn test_rising_pitch_is_declining() {
        let mut history = MeasurementHistory::new();
        for (day, hz) in [(1, 110.0), (2, 110.0), (3, 110.0), (4, 125.0), (5, 125.0), (6, 125.0)] {
            history.record(measurement(day, hz));
        }
        assert_eq!(history.trend(), Some(PitchTrend::Declining));
    }

    #[test]
    fn test_out_of_order_records_are_sorted() {
        let mut history = MeasurementHistory::new();
        history.record(measurement(3, 110.0));
        history.record(measurement(1, 130.0));
        history.record(measurement(2, 120.0));
        assert_eq!(history.measurements()[0].id, "m1");
        assert_eq!(history.latest().map(|m| m.id.as_str()), Some("m3"));
        assert_eq!(history.average_pitch(), Some(120));
    }

    #[test]
    fn test_from_buffer_needs_a_settled_pitch() {
        let mut buffer = RecordingBuffer {
            samples: Vec::new(),
            sample_rate: 48_000,
            duration_ms: 2500,
            settled_hz: None,
            pitch_min_hz: None,
            pitch_max_hz: None,
            voiced_frames: 0,
            total_frames: 40,
        };
        assert_eq!(
            VoiceMeasurement::from_buffer(&buffer, MeasurementContext::Exercise),
            None
        );

        buffer.settled_hz = Some(101.0);
        buffer.pitch_min_hz = Some(97.0);
        let measurement =
            VoiceMeasurement::from_buffer(&buffer, MeasurementContext::Exercise).unwrap();
        assert_eq!(measurement.pitch_min_hz, 97.0);
        assert_eq!(measurement.pitch_max_hz, 101.0);
        assert_eq!(measurement.duration_secs, 2.5);
        assert_eq!(measurement.context, MeasurementContext::Exercise);

        let rebuilt = MeasurementHistory::from_measurements(vec![
            self::measurement(4, 110.0),
            self::measurement(2, 120.0),
        ]);
        assert_eq!(rebuilt.measurements()[0].id, "m2");
    }
}
