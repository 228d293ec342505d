//! Deterministic audio sources for tests, the CLI and desktop QA.
//!
//! Synthetic generators (tones, glides, silence, noise) stand in for a
//! singer; `load_wav` decodes recorded takes from disk.

use std::f32::consts::PI;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Decoded PCM take, channel 0 only
#[derive(Debug, Clone)]
pub struct WavClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl WavClip {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate.max(1) as f32
    }
}

/// Pure sine of `len` samples
pub fn sine_wave(frequency_hz: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
    let step = 2.0 * PI * frequency_hz / sample_rate as f32;
    (0..len)
        .map(|i| amplitude * (step * i as f32).sin())
        .collect()
}

/// Fundamental plus overtones; `amplitudes[k]` drives harmonic k + 1
pub fn harmonic_tone(
    fundamental_hz: f32,
    sample_rate: u32,
    len: usize,
    amplitudes: &[f32],
) -> Vec<f32> {
    let step = 2.0 * PI * fundamental_hz / sample_rate as f32;
    (0..len)
        .map(|i| {
            amplitudes
                .iter()
                .enumerate()
                .map(|(k, a)| a * (step * (k + 1) as f32 * i as f32).sin())
                .sum()
        })
        .collect()
}

/// Exponential pitch glide from `start_hz` to `end_hz`
pub fn glide(start_hz: f32, end_hz: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
    let mut phase = 0.0_f32;
    let ratio = end_hz / start_hz;
    (0..len)
        .map(|i| {
            let t = i as f32 / len.max(1) as f32;
            let hz = start_hz * ratio.powf(t);
            phase = (phase + 2.0 * PI * hz / sample_rate as f32) % (2.0 * PI);
            amplitude * phase.sin()
        })
        .collect()
}

pub fn silence(len: usize) -> Vec<f32> {
    vec![0.0; len]
}

/// Seeded uniform noise in [-amplitude, amplitude]
pub fn white_noise(len: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| rng.gen_range(-amplitude..=amplitude))
        .collect()
}

/// Load a WAV file, keeping the first channel
pub fn load_wav(path: &Path) -> Result<WavClip> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|sample| sample.map_err(|err| anyhow!(err)))
            .collect::<Result<Vec<f32>>>()?,
        hound::SampleFormat::Int => {
            let max = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            match spec.bits_per_sample {
                16 => reader
                    .samples::<i16>()
                    .map(|sample| {
                        sample
                            .map(|value| value as f32 / max)
                            .map_err(|err| anyhow!(err))
                    })
                    .collect::<Result<Vec<f32>>>()?,
                24 | 32 => reader
                    .samples::<i32>()
                    .map(|sample| {
                        sample
                            .map(|value| value as f32 / max)
                            .map_err(|err| anyhow!(err))
                    })
                    .collect::<Result<Vec<f32>>>()?,
                other => {
                    return Err(anyhow!(
                        "Unsupported bits per sample {} in {}",
                        other,
                        path.display()
                    ))
                }
            }
        }
    };

    let samples = interleaved.into_iter().step_by(channels).collect();
    Ok(WavClip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Write a mono 16-bit WAV; used to produce takes for the CLI
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).with_context(|| format!("creating {}", path.display()))?;
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(())
}
