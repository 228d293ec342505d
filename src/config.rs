//! Configuration management for pitch analysis and workout pacing
//!
//! Runtime configuration is loaded from JSON so thresholds can be tuned
//! without recompilation. Every section has defaults matching the shipped
//! app, and a missing or malformed file falls back to them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pitch: PitchConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub workout: WorkoutConfig,
}

/// Pitch estimator parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitchConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Analysis frame length in samples
    pub frame_size: usize,
    /// Lowest reported fundamental
    pub min_hz: f32,
    /// Highest reported fundamental
    pub max_hz: f32,
    /// Frames with RMS below this are silent and skip the pitch search
    pub silence_rms: f32,
    /// Absolute threshold on the normalized difference function
    pub yin_threshold: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            frame_size: 2048,
            min_hz: 60.0,
            max_hz: 500.0,
            silence_rms: 0.005,
            yin_threshold: 0.15,
        }
    }
}

impl PitchConfig {
    /// Shortest frame that still holds two periods of `min_hz`
    pub fn min_frame_size(&self) -> usize {
        2 * (self.sample_rate as f32 / self.min_hz).ceil() as usize
    }

    /// Structural validation, run once at estimator construction
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidRange {
                reason: "sample_rate must be greater than 0".to_string(),
            });
        }
        if !(self.min_hz > 0.0 && self.min_hz < self.max_hz) {
            return Err(ConfigError::InvalidRange {
                reason: format!(
                    "min_hz ({}) must be positive and below max_hz ({})",
                    self.min_hz, self.max_hz
                ),
            });
        }
        if self.max_hz * 2.0 > self.sample_rate as f32 {
            return Err(ConfigError::InvalidRange {
                reason: format!(
                    "max_hz ({}) must be below Nyquist for {} Hz",
                    self.max_hz, self.sample_rate
                ),
            });
        }
        let required = self.min_frame_size();
        if self.frame_size < required {
            return Err(ConfigError::FrameTooShort {
                frame_size: self.frame_size,
                required,
            });
        }
        Ok(())
    }
}

/// Smoother and settle-detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Number of trailing accepted estimates in the median window
    pub window: usize,
    /// Ratio from the running median beyond which a low-confidence estimate is an outlier
    pub outlier_ratio: f32,
    /// Estimates at or above this confidence are never treated as outliers
    pub outlier_confidence: f32,
    /// Estimates below this confidence count as unvoiced
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Dynamic range above the noise floor mapped onto 0..1
    pub level_range_db: f32,
    /// How fast the noise floor creeps upward per frame (dB)
    pub noise_floor_rise_db: f32,
    /// Continuous voiced duration before pitch counts as settled
    pub settle_seconds: f32,
}

fn default_min_confidence() -> f32 {
    0.25
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window: 5,
            outlier_ratio: 1.25,
            outlier_confidence: 0.6,
            min_confidence: default_min_confidence(),
            level_range_db: 50.0,
            noise_floor_rise_db: 0.05,
            settle_seconds: 1.0,
        }
    }
}

/// Capture pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Size of buffer pool for real-time audio transfer
    pub buffer_pool_size: usize,
    /// Size of each audio buffer in samples
    pub buffer_size: usize,
    /// Capacity of the ordered voice sample broadcast channel
    pub sample_channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: 16,
            buffer_size: 2048,
            sample_channel_capacity: 64,
        }
    }
}

/// Workout pacing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutConfig {
    /// Rest between exercises unless an exercise overrides it
    pub rest_seconds: u32,
    /// Driver tick period
    pub tick_millis: u64,
}

impl Default for WorkoutConfig {
    fn default() -> Self {
        Self {
            rest_seconds: 10,
            tick_millis: 100,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// Returns defaults when the file doesn't exist or the JSON is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Android builds ship with defaults; assets are not reachable without AssetManager
    #[cfg(target_os = "android")]
    pub fn load_android() -> Self {
        log::info!("[Config] Using default configuration on Android");
        Self::default()
    }

    /// Load configuration for non-Android platforms
    #[cfg(not(target_os = "android"))]
    pub fn load() -> Self {
        Self::load_from_file("assets/voice_config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.pitch.sample_rate, 48_000);
        assert_eq!(config.pitch.min_hz, 60.0);
        assert_eq!(config.smoothing.window, 5);
        assert_eq!(config.workout.rest_seconds, 10);
        assert!(config.pitch.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.pitch.frame_size, config.pitch.frame_size);
        assert_eq!(parsed.workout.tick_millis, config.workout.tick_millis);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"workout": {"rest_seconds": 20, "tick_millis": 50}}"#)
                .unwrap();
        assert_eq!(parsed.workout.rest_seconds, 20);
        assert_eq!(parsed.pitch.frame_size, 2048);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/voice_config.json");
        assert_eq!(config.capture.buffer_pool_size, 16);
    }

    #[test]
    fn test_frame_too_short_is_rejected() {
        let config = PitchConfig {
            frame_size: 1024,
            ..PitchConfig::default()
        };
        // 48 kHz / 60 Hz = 800 samples per period, two periods needed
        assert_eq!(
            config.validate(),
            Err(ConfigError::FrameTooShort {
                frame_size: 1024,
                required: 1600
            })
        );
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let config = PitchConfig {
            min_hz: 400.0,
            max_hz: 100.0,
            ..PitchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRange { .. })
        ));
    }
}
