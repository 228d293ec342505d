//! Settled-pitch detection.
//!
//! Pitch is settled once the smoothed value has been continuously voiced
//! for the configured duration; any unvoiced sample restarts the run.

use super::smoother::SmoothedSample;

/// Only the most recent voiced values feed the settled median
const RUN_CAPACITY: usize = 128;

pub struct SettleTracker {
    settle_ms: u64,
    run_start_ms: Option<u64>,
    run: Vec<f32>,
    scratch: Vec<f32>,
    last_settled: Option<f32>,
}

impl SettleTracker {
    pub fn new(settle_seconds: f32) -> Self {
        Self {
            settle_ms: (settle_seconds.max(0.0) * 1000.0).round() as u64,
            run_start_ms: None,
            run: Vec::with_capacity(RUN_CAPACITY),
            scratch: Vec::with_capacity(RUN_CAPACITY),
            last_settled: None,
        }
    }

    /// Feed one smoothed sample; returns the settled pitch while the
    /// current run qualifies.
    pub fn observe(&mut self, sample: &SmoothedSample) -> Option<f32> {
        let Some(hz) = sample.pitch_hz else {
            self.run_start_ms = None;
            self.run.clear();
            return None;
        };

        let start = *self.run_start_ms.get_or_insert(sample.timestamp_ms);
        if self.run.len() == RUN_CAPACITY {
            self.run.remove(0);
        }
        self.run.push(hz);

        if sample.timestamp_ms.saturating_sub(start) < self.settle_ms {
            return None;
        }

        self.scratch.clear();
        self.scratch.extend_from_slice(&self.run);
        self.scratch.sort_by(|a, b| a.total_cmp(b));
        let settled = self.scratch[self.scratch.len() / 2];
        self.last_settled = Some(settled);
        Some(settled)
    }

    /// Most recent settled value of the recording, if any run qualified
    pub fn last_settled(&self) -> Option<f32> {
        self.last_settled
    }

    pub fn reset(&mut self) {
        self.run_start_ms = None;
        self.run.clear();
        self.last_settled = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(hz: Option<f32>, ts: u64) -> SmoothedSample {
        SmoothedSample {
            pitch_hz: hz,
            level: 0.5,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_settles_after_one_second_of_voicing() {
        let mut tracker = SettleTracker::new(1.0);
        for ts in (0..1000).step_by(20) {
            assert_eq!(tracker.observe(&sample(Some(110.0), ts)), None);
        }
        assert_eq!(tracker.observe(&sample(Some(110.0), 1000)), Some(110.0));
        assert_eq!(tracker.last_settled(), Some(110.0));
    }

    #[test]
    fn test_gap_restarts_the_run() {
        let mut tracker = SettleTracker::new(1.0);
        for ts in (0..900).step_by(20) {
            tracker.observe(&sample(Some(110.0), ts));
        }
        tracker.observe(&sample(None, 900));
        assert_eq!(tracker.observe(&sample(Some(110.0), 1200)), None);
        assert_eq!(tracker.observe(&sample(Some(110.0), 2200)), Some(110.0));
    }

    #[test]
    fn test_settled_value_is_run_median() {
        let mut tracker = SettleTracker::new(0.1);
        tracker.observe(&sample(Some(100.0), 0));
        tracker.observe(&sample(Some(130.0), 50));
        assert_eq!(tracker.observe(&sample(Some(110.0), 100)), Some(110.0));
    }

    #[test]
    fn test_last_settled_survives_later_silence() {
        let mut tracker = SettleTracker::new(0.1);
        tracker.observe(&sample(Some(95.0), 0));
        tracker.observe(&sample(Some(95.0), 200));
        tracker.observe(&sample(None, 300));
        assert_eq!(tracker.last_settled(), Some(95.0));
        tracker.reset();
        assert_eq!(tracker.last_settled(), None);
    }
}
