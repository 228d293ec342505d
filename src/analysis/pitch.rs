// Pitch estimation - YIN over an FFT cross-correlation
//
// The difference function d(tau) = E0 + E(tau) - 2 r(tau) is built from a
// prefix sum of squared samples and one forward/inverse FFT pair, so each
// frame costs O(N log N) instead of O(N * tau_max). All FFT plans and
// buffers are allocated at construction; `estimate` never allocates and
// never takes a lock, so it can run inside a capture callback.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::audio::AudioFrame;
use crate::config::PitchConfig;
use crate::error::ConfigError;

/// Best normalized-difference value still considered voiced when no lag
/// crosses the absolute threshold.
const UNVOICED_CEILING: f32 = 0.45;

/// Two lags within this relative distance of an integer ratio are treated
/// as the same period (harmonics of one another).
const HARMONIC_TOLERANCE: f32 = 0.08;

/// Margin by which the previous-octave lag must beat the first dip before
/// continuity overrides it.
const CONTINUITY_MARGIN: f32 = 0.01;

/// Lags searched past the period of `min_hz`, so a dip at the boundary
/// period is still a local minimum rather than the edge of the search.
const EDGE_SLACK: usize = 2;

/// A dip below `tau_min` this close to the chosen dip means the chosen lag
/// is a multiple of a period too short for the voice range.
const SUBHARMONIC_MARGIN: f32 = 0.05;

/// Relative slack on the configured range for the interpolated frequency
const RANGE_TOLERANCE: f32 = 0.02;

/// Per-frame fundamental frequency estimate
///
/// `frequency_hz` is `None` for silent or unvoiced frames; zero is never
/// used as a "no pitch" marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    pub frequency_hz: Option<f32>,
    /// 0.0..=1.0
    pub confidence: f32,
    pub timestamp_ms: u64,
}

impl PitchEstimate {
    pub fn unvoiced(timestamp_ms: u64) -> Self {
        Self {
            frequency_hz: None,
            confidence: 0.0,
            timestamp_ms,
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency_hz.is_some()
    }
}

/// YIN fundamental-frequency estimator restricted to the voice range
pub struct PitchEstimator {
    sample_rate: f32,
    min_hz: f32,
    max_hz: f32,
    frame_size: usize,
    tau_min: usize,
    tau_max: usize,
    /// Integration window; frame_size - tau_max
    window: usize,
    threshold: f32,
    silence_rms: f32,

    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    fft_len: usize,
    signal: Vec<Complex<f32>>,
    reference: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    energy: Vec<f32>,
    diff: Vec<f32>,
    cmnd: Vec<f32>,

    previous_hz: Option<f32>,
}

impl PitchEstimator {
    /// Build an estimator, rejecting frames too short for `min_hz`
    pub fn new(config: &PitchConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let sample_rate = config.sample_rate as f32;
        let frame_size = config.frame_size;
        let tau_max = (sample_rate / config.min_hz).ceil() as usize + EDGE_SLACK;
        let tau_min = ((sample_rate / config.max_hz).floor() as usize).max(2);
        let window = frame_size - tau_max;

        let fft_len = frame_size.next_power_of_two();
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        Ok(Self {
            sample_rate,
            min_hz: config.min_hz,
            max_hz: config.max_hz,
            frame_size,
            tau_min,
            tau_max,
            window,
            threshold: config.yin_threshold,
            silence_rms: config.silence_rms,
            forward,
            inverse,
            fft_len,
            signal: vec![Complex::new(0.0, 0.0); fft_len],
            reference: vec![Complex::new(0.0, 0.0); fft_len],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            energy: vec![0.0; frame_size + 1],
            diff: vec![0.0; tau_max + 1],
            cmnd: vec![1.0; tau_max + 1],
            previous_hz: None,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Forget the lag state carried between frames
    pub fn reset(&mut self) {
        self.previous_hz = None;
    }

    /// Estimate the fundamental of one frame
    pub fn estimate(&mut self, frame: &AudioFrame<'_>) -> PitchEstimate {
        let timestamp_ms = frame.timestamp_ms();
        let samples = frame.samples();
        if samples.len() < self.frame_size {
            self.previous_hz = None;
            return PitchEstimate::unvoiced(timestamp_ms);
        }
        let x = &samples[..self.frame_size];

        let sum_sq: f32 = x.iter().map(|s| s * s).sum();
        let rms = (sum_sq / self.frame_size as f32).sqrt();
        // Written so NaN input also counts as silence
        if !(rms >= self.silence_rms) {
            self.previous_hz = None;
            return PitchEstimate::unvoiced(timestamp_ms);
        }

        self.difference(x);
        self.normalize();

        let tau = match self.first_dip().map(|tau| self.keep_octave(tau)) {
            Some(tau) if self.in_range(tau) => tau,
            _ => {
                self.previous_hz = None;
                return PitchEstimate::unvoiced(timestamp_ms);
            }
        };

        let period = self.interpolate(tau);
        let frequency = self.sample_rate / period;
        if !frequency.is_finite()
            || frequency < self.min_hz * (1.0 - RANGE_TOLERANCE)
            || frequency > self.max_hz * (1.0 + RANGE_TOLERANCE)
        {
            self.previous_hz = None;
            return PitchEstimate::unvoiced(timestamp_ms);
        }

        let confidence = self.confidence(tau);
        self.previous_hz = Some(frequency);

        PitchEstimate {
            frequency_hz: Some(frequency),
            confidence,
            timestamp_ms,
        }
    }

    fn difference(&mut self, x: &[f32]) {
        self.energy[0] = 0.0;
        for (i, &sample) in x.iter().enumerate() {
            self.energy[i + 1] = self.energy[i] + sample * sample;
        }

        for (i, slot) in self.signal.iter_mut().enumerate() {
            *slot = Complex::new(x.get(i).copied().unwrap_or(0.0), 0.0);
        }
        for (i, slot) in self.reference.iter_mut().enumerate() {
            let value = if i < self.window { x[i] } else { 0.0 };
            *slot = Complex::new(value, 0.0);
        }

        self.forward
            .process_with_scratch(&mut self.signal, &mut self.scratch);
        self.forward
            .process_with_scratch(&mut self.reference, &mut self.scratch);
        for (s, r) in self.signal.iter_mut().zip(self.reference.iter()) {
            *s *= r.conj();
        }
        self.inverse
            .process_with_scratch(&mut self.signal, &mut self.scratch);

        // Reference only spans the window, so lags up to tau_max never wrap
        let scale = 1.0 / self.fft_len as f32;
        let e0 = self.energy[self.window];
        for tau in 0..=self.tau_max {
            let r = self.signal[tau].re * scale;
            let e_tau = self.energy[tau + self.window] - self.energy[tau];
            self.diff[tau] = (e0 + e_tau - 2.0 * r).max(0.0);
        }
    }

    /// Cumulative mean normalized difference
    fn normalize(&mut self) {
        self.cmnd[0] = 1.0;
        let mut running = 0.0_f32;
        for tau in 1..=self.tau_max {
            running += self.diff[tau];
            self.cmnd[tau] = if running > f32::EPSILON {
                self.diff[tau] * tau as f32 / running
            } else {
                1.0
            };
        }
    }

    /// First lag under the absolute threshold, walked down to its local
    /// minimum; falls back to the global minimum when it is clear enough.
    fn first_dip(&self) -> Option<usize> {
        let mut tau = self.tau_min;
        while tau <= self.tau_max {
            if self.cmnd[tau] < self.threshold {
                while tau < self.tau_max && self.cmnd[tau + 1] < self.cmnd[tau] {
                    tau += 1;
                }
                return Some(tau);
            }
            tau += 1;
        }

        let (best_tau, best) = (self.tau_min..=self.tau_max)
            .map(|t| (t, self.cmnd[t]))
            .fold((self.tau_min, f32::MAX), |acc, next| {
                if next.1 < acc.1 {
                    next
                } else {
                    acc
                }
            });
        (best < UNVOICED_CEILING).then_some(best_tau)
    }

    /// Reject dips that only exist because the true period lies outside
    /// the search: pinned to either edge, or a multiple of a shorter period.
    fn in_range(&self, tau: usize) -> bool {
        if tau >= self.tau_max {
            return false;
        }
        if tau == self.tau_min && self.cmnd[tau - 1] < self.cmnd[tau] {
            return false;
        }
        !self.has_short_period(tau)
    }

    /// Whether some `tau / k` below `tau_min` fits as well as `tau` itself.
    /// Lags under `tau_min` are still in `cmnd`, so a 600 Hz tone whose
    /// double period lands in range shows its real dip there.
    fn has_short_period(&self, tau: usize) -> bool {
        let ceiling = (self.cmnd[tau] + SUBHARMONIC_MARGIN).min(self.threshold);
        for k in 2..=tau / 2 {
            let center = tau as f32 / k as f32;
            if center >= self.tau_min as f32 {
                continue;
            }
            if center < 2.0 {
                break;
            }
            let lo = ((center * (1.0 - HARMONIC_TOLERANCE)) as usize).max(1);
            let hi = ((center * (1.0 + HARMONIC_TOLERANCE)).ceil() as usize).min(self.tau_min - 1);
            if (lo..=hi).any(|t| self.cmnd[t] <= ceiling) {
                return true;
            }
        }
        false
    }

    /// Prefer the previous frame's octave when the first dip jumped up an
    /// octave but the old period is still the better fit.
    fn keep_octave(&self, tau: usize) -> usize {
        let Some(previous_hz) = self.previous_hz else {
            return tau;
        };
        let previous_lag = self.sample_rate / previous_hz;
        let ratio = previous_lag / tau as f32;
        if (ratio - 2.0).abs() > 2.0 * HARMONIC_TOLERANCE {
            return tau;
        }

        let center = (2 * tau) as f32;
        let lo = ((center * (1.0 - HARMONIC_TOLERANCE)) as usize).max(self.tau_min);
        let hi = ((center * (1.0 + HARMONIC_TOLERANCE)).ceil() as usize).min(self.tau_max);
        if lo > hi {
            return tau;
        }
        let candidate = (lo..=hi).fold(lo, |best, t| {
            if self.cmnd[t] < self.cmnd[best] {
                t
            } else {
                best
            }
        });

        if self.cmnd[candidate] + CONTINUITY_MARGIN < self.cmnd[tau]
            && self.cmnd[candidate] < 2.0 * self.threshold
        {
            candidate
        } else {
            tau
        }
    }

    /// Parabolic interpolation of the dip around `tau`
    fn interpolate(&self, tau: usize) -> f32 {
        if tau <= 1 || tau >= self.tau_max {
            return tau as f32;
        }
        let s0 = self.cmnd[tau - 1];
        let s1 = self.cmnd[tau];
        let s2 = self.cmnd[tau + 1];
        let denom = s0 - 2.0 * s1 + s2;
        if denom.abs() < f32::EPSILON {
            return tau as f32;
        }
        let offset = 0.5 * (s0 - s2) / denom;
        tau as f32 + offset.clamp(-0.5, 0.5)
    }

    /// Depth of the chosen dip scaled by how far it stands below the best
    /// dip that is not a multiple or divisor of it.
    fn confidence(&self, tau: usize) -> f32 {
        let best = self.cmnd[tau].clamp(0.0, 1.0);
        let mut runner_up = 1.0_f32;
        for t in (self.tau_min + 1)..self.tau_max {
            let is_local_min = self.cmnd[t] < self.cmnd[t - 1] && self.cmnd[t] <= self.cmnd[t + 1];
            if is_local_min && !harmonically_related(t, tau) {
                runner_up = runner_up.min(self.cmnd[t]);
            }
        }

        let sharpness = if runner_up <= best {
            0.0
        } else {
            (runner_up - best) / runner_up.max(f32::EPSILON)
        };
        ((1.0 - best) * sharpness).clamp(0.0, 1.0)
    }
}

fn harmonically_related(a: usize, b: usize) -> bool {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if lo == 0 {
        return false;
    }
    let ratio = hi as f32 / lo as f32;
    let nearest = ratio.round();
    nearest >= 1.0 && (ratio - nearest).abs() <= HARMONIC_TOLERANCE * nearest
}
