use futures::Stream;

use crate::analysis::VoiceSample;
use crate::telemetry::MetricEvent;
use crate::workout::WorkoutSnapshot;

use super::ENGINE_HANDLE;

/// Stream of live voice samples
///
/// Yields one `VoiceSample` per analysed frame of every recording, in
/// order: measurements, pitch-meter exercises and phrase takes alike.
///
/// # Usage
/// ```dart
/// final stream = await voiceSampleStream();
/// await for (final sample in stream) {
///   meter.update(sample.pitchHz, sample.level);
/// }
/// ```
#[flutter_rust_bridge::frb(ignore)]
pub async fn voice_sample_stream() -> impl Stream<Item = VoiceSample> {
    ENGINE_HANDLE.voice_sample_stream()
}

/// Stream of workout snapshots
///
/// Starts with the current snapshot and ends after the completed or
/// abandoned one.
#[flutter_rust_bridge::frb(ignore)]
pub async fn workout_snapshot_stream() -> impl Stream<Item = WorkoutSnapshot> {
    ENGINE_HANDLE.workout_snapshot_stream()
}

/// Stream of diagnostic metrics aggregated by the telemetry hub
#[flutter_rust_bridge::frb(ignore)]
pub async fn telemetry_stream() -> impl Stream<Item = MetricEvent> {
    ENGINE_HANDLE.telemetry_stream()
}
