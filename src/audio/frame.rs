//! Fixed-length analysis frames.

/// A fixed-length window of mono samples at a known sample rate.
///
/// Frames borrow their samples, so a frame cannot be mutated once built and
/// the analysis thread can slide over its accumulator without copying.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    samples: &'a [f32],
    sample_rate: u32,
    timestamp_ms: u64,
}

impl<'a> AudioFrame<'a> {
    pub fn new(samples: &'a [f32], sample_rate: u32, timestamp_ms: u64) -> Self {
        Self {
            samples,
            sample_rate,
            timestamp_ms,
        }
    }

    pub fn samples(&self) -> &'a [f32] {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Milliseconds since the start of the recording
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Root mean square amplitude
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum / self.samples.len() as f32).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_silence_is_zero() {
        let samples = [0.0_f32; 256];
        let frame = AudioFrame::new(&samples, 48_000, 0);
        assert_eq!(frame.rms(), 0.0);
    }

    #[test]
    fn test_rms_of_constant_signal() {
        let samples = [0.5_f32; 128];
        let frame = AudioFrame::new(&samples, 48_000, 10);
        assert!((frame.rms() - 0.5).abs() < 1e-6);
        assert_eq!(frame.timestamp_ms(), 10);
        assert_eq!(frame.len(), 128);
    }

    #[test]
    fn test_empty_frame() {
        let frame = AudioFrame::new(&[], 48_000, 0);
        assert!(frame.is_empty());
        assert_eq!(frame.rms(), 0.0);
    }
}
