// PitchSmoother - median smoothing with outlier rejection plus a level meter
//
// One output per input estimate, in arrival order. Pitch and level are
// independent: an estimate rejected as an outlier still moves the level.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::analysis::pitch::PitchEstimate;
use crate::config::SmoothingConfig;

/// Noise floor assumed before any frame has been seen (dBFS)
const INITIAL_NOISE_FLOOR_DB: f32 = -60.0;
/// Floor never tracks below this, so digital silence cannot pin it
const MIN_NOISE_FLOOR_DB: f32 = -90.0;

/// Stabilized value for one visual frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedSample {
    pub pitch_hz: Option<f32>,
    /// Loudness above the noise floor, 0.0..=1.0
    pub level: f32,
    pub timestamp_ms: u64,
}

pub struct PitchSmoother {
    config: SmoothingConfig,
    history: VecDeque<f32>,
    sorted: Vec<f32>,
    unvoiced_run: usize,
    noise_floor_db: f32,
}

impl PitchSmoother {
    pub fn new(config: SmoothingConfig) -> Self {
        let window = config.window.max(1);
        Self {
            config,
            history: VecDeque::with_capacity(window),
            sorted: Vec::with_capacity(window),
            unvoiced_run: 0,
            noise_floor_db: INITIAL_NOISE_FLOOR_DB,
        }
    }

    /// Clear all history; called whenever a new recording begins
    pub fn reset(&mut self) {
        self.history.clear();
        self.unvoiced_run = 0;
        self.noise_floor_db = INITIAL_NOISE_FLOOR_DB;
    }

    /// Fold one estimate and its frame RMS into the smoothed stream
    pub fn process(&mut self, estimate: &PitchEstimate, frame_rms: f32) -> SmoothedSample {
        let level = self.update_level(frame_rms);

        let pitch_hz = match estimate.frequency_hz {
            Some(hz) if estimate.confidence >= self.config.min_confidence => {
                self.unvoiced_run = 0;
                if self.is_outlier(hz, estimate.confidence) {
                    self.median()
                } else {
                    self.accept(hz);
                    self.median()
                }
            }
            // Unvoiced, or too weak to trust
            _ => {
                self.unvoiced_run += 1;
                // A pause as long as the window means the old pitch is stale
                if self.unvoiced_run >= self.window() {
                    self.history.clear();
                }
                None
            }
        };

        SmoothedSample {
            pitch_hz,
            level,
            timestamp_ms: estimate.timestamp_ms,
        }
    }

    pub fn noise_floor_db(&self) -> f32 {
        self.noise_floor_db
    }

    fn window(&self) -> usize {
        self.config.window.max(1)
    }

    fn is_outlier(&mut self, hz: f32, confidence: f32) -> bool {
        if confidence >= self.config.outlier_confidence {
            return false;
        }
        match self.median() {
            Some(median) => {
                let ratio = if hz > median { hz / median } else { median / hz };
                ratio > self.config.outlier_ratio
            }
            None => false,
        }
    }

    fn accept(&mut self, hz: f32) {
        if self.history.len() == self.window() {
            self.history.pop_front();
        }
        self.history.push_back(hz);
    }

    fn median(&mut self) -> Option<f32> {
        if self.history.is_empty() {
            return None;
        }
        self.sorted.clear();
        self.sorted.extend(self.history.iter().copied());
        self.sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = self.sorted.len() / 2;
        if self.sorted.len() % 2 == 0 {
            Some((self.sorted[mid - 1] + self.sorted[mid]) / 2.0)
        } else {
            Some(self.sorted[mid])
        }
    }

    /// Floor drops instantly to quieter frames and creeps up slowly, so a
    /// sustained voice does not become the new floor.
    fn update_level(&mut self, frame_rms: f32) -> f32 {
        let db = 20.0 * frame_rms.max(1e-9).log10();
        if db < self.noise_floor_db {
            self.noise_floor_db = db.max(MIN_NOISE_FLOOR_DB);
        } else {
            self.noise_floor_db += self.config.noise_floor_rise_db;
        }
        let range = self.config.level_range_db.max(1.0);
        ((db - self.noise_floor_db) / range).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voiced(hz: f32, confidence: f32, ts: u64) -> PitchEstimate {
        PitchEstimate {
            frequency_hz: Some(hz),
            confidence,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_one_output_per_input_in_order() {
        let mut smoother = PitchSmoother::new(SmoothingConfig::default());
        let outputs: Vec<u64> = (0..6)
            .map(|i| smoother.process(&voiced(120.0, 0.9, i * 20), 0.1).timestamp_ms)
            .collect();
        assert_eq!(outputs, vec![0, 20, 40, 60, 80, 100]);
    }

    #[test]
    fn test_median_absorbs_jitter() {
        let mut smoother = PitchSmoother::new(SmoothingConfig::default());
        let mut last = None;
        for (i, hz) in [118.0, 122.0, 120.0, 119.0, 121.0].iter().enumerate() {
            last = smoother.process(&voiced(*hz, 0.9, i as u64), 0.1).pitch_hz;
        }
        assert_eq!(last, Some(120.0));
    }

    #[test]
    fn test_low_confidence_outlier_is_excluded() {
        let mut smoother = PitchSmoother::new(SmoothingConfig::default());
        for i in 0..5 {
            smoother.process(&voiced(110.0, 0.9, i), 0.1);
        }
        let out = smoother.process(&voiced(220.0, 0.3, 5), 0.1);
        assert_eq!(out.pitch_hz, Some(110.0));
    }

    #[test]
    fn test_confident_jump_is_accepted() {
        let mut smoother = PitchSmoother::new(SmoothingConfig::default());
        for i in 0..5 {
            smoother.process(&voiced(110.0, 0.9, i), 0.1);
        }
        let mut out = None;
        for i in 5..8 {
            out = smoother.process(&voiced(165.0, 0.95, i), 0.1).pitch_hz;
        }
        assert_eq!(out, Some(165.0));
    }

    #[test]
    fn test_outlier_still_updates_level() {
        let mut smoother = PitchSmoother::new(SmoothingConfig::default());
        for i in 0..5 {
            smoother.process(&voiced(110.0, 0.9, i), 0.001);
        }
        let quiet = smoother.process(&voiced(110.0, 0.9, 5), 0.001).level;
        let loud = smoother.process(&voiced(300.0, 0.2, 6), 0.3).level;
        assert!(loud > quiet);
    }

    #[test]
    fn test_unvoiced_is_null_never_zero() {
        let mut smoother = PitchSmoother::new(SmoothingConfig::default());
        smoother.process(&voiced(100.0, 0.9, 0), 0.1);
        let out = smoother.process(&PitchEstimate::unvoiced(1), 0.0);
        assert_eq!(out.pitch_hz, None);
    }

    #[test]
    fn test_level_is_normalized_against_floor() {
        let mut smoother = PitchSmoother::new(SmoothingConfig::default());
        // Quiet room around -70 dBFS
        for i in 0..10 {
            let out = smoother.process(&PitchEstimate::unvoiced(i), 0.0003);
            assert!(out.level < 0.05);
        }
        // Voice at -20 dBFS sits near the top of a 50 dB range
        let out = smoother.process(&voiced(120.0, 0.9, 10), 0.1);
        assert!(out.level > 0.9, "level {}", out.level);
        assert!(out.level <= 1.0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut smoother = PitchSmoother::new(SmoothingConfig::default());
        for i in 0..5 {
            smoother.process(&voiced(90.0, 0.9, i), 0.1);
        }
        smoother.reset();
        assert_eq!(smoother.noise_floor_db(), INITIAL_NOISE_FLOOR_DB);

        // A low-confidence value is accepted because nothing stale remains
        let out = smoother.process(&voiced(200.0, 0.3, 0), 0.1);
        assert_eq!(out.pitch_hz, Some(200.0));
        // A voiced frame at -20 dBFS only lets the floor creep up
        assert!(smoother.noise_floor_db() > INITIAL_NOISE_FLOOR_DB);
    }

    #[test]
    fn test_weak_estimates_count_as_unvoiced() {
        let mut smoother = PitchSmoother::new(SmoothingConfig::default());
        assert_eq!(smoother.process(&voiced(300.0, 0.1, 0), 0.1).pitch_hz, None);

        for i in 1..6 {
            smoother.process(&voiced(120.0, 0.9, i), 0.1);
        }
        // A run of weak frames as long as the window drops the old pitch
        for i in 6..11 {
            let out = smoother.process(&voiced(120.0, 0.1, i), 0.1);
            assert_eq!(out.pitch_hz, None);
        }
        let out = smoother.process(&voiced(240.0, 0.3, 11), 0.1);
        assert_eq!(out.pitch_hz, Some(240.0));
    }

    #[test]
    fn test_long_pause_drops_stale_history() {
        let mut smoother = PitchSmoother::new(SmoothingConfig::default());
        for i in 0..5 {
            smoother.process(&voiced(90.0, 0.9, i), 0.1);
        }
        for i in 5..10 {
            smoother.process(&PitchEstimate::unvoiced(i), 0.0);
        }
        let out = smoother.process(&voiced(180.0, 0.3, 10), 0.1);
        assert_eq!(out.pitch_hz, Some(180.0));
    }
}
