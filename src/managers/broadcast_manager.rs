// BroadcastChannelManager: Centralized tokio channel management
// Single Responsibility: channel lifecycle and subscription

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};

use crate::analysis::VoiceSample;
use crate::workout::WorkoutSnapshot;

/// Manages the channels the FFI streams read from
///
/// # Channel Types
/// - Voice samples: ordered live pitch/level values from every recording
/// - Workout snapshots: latest snapshot of the current workout, replaced
///   whenever a new workout starts
pub struct BroadcastChannelManager {
    voice_samples: Arc<Mutex<Option<broadcast::Sender<VoiceSample>>>>,
    workout_snapshots: Arc<Mutex<Option<watch::Receiver<WorkoutSnapshot>>>>,
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    // Slots only hold channel handles; a poisoned guard is still consistent
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BroadcastChannelManager {
    /// Create a manager with every channel uninitialized
    pub fn new() -> Self {
        Self {
            voice_samples: Arc::new(Mutex::new(None)),
            workout_snapshots: Arc::new(Mutex::new(None)),
        }
    }

    // ========================================================================
    // VOICE SAMPLE CHANNEL
    // ========================================================================

    /// Initialize the voice sample channel, or return the existing sender
    ///
    /// Recordings publish into this sender for their whole lifetime, so it
    /// is created once and shared.
    pub fn init_voice_samples(&self, capacity: usize) -> broadcast::Sender<VoiceSample> {
        let mut slot = lock(&self.voice_samples);
        if let Some(tx) = slot.as_ref() {
            return tx.clone();
        }
        let (tx, _) = broadcast::channel(capacity.max(1));
        *slot = Some(tx.clone());
        tx
    }

    /// Subscribe to voice samples; None until `init_voice_samples`
    pub fn subscribe_voice_samples(&self) -> Option<broadcast::Receiver<VoiceSample>> {
        lock(&self.voice_samples).as_ref().map(|tx| tx.subscribe())
    }

    // ========================================================================
    // WORKOUT SNAPSHOT CHANNEL
    // ========================================================================

    /// Point the snapshot stream at a newly started workout
    pub fn init_workout_snapshots(&self, receiver: watch::Receiver<WorkoutSnapshot>) {
        *lock(&self.workout_snapshots) = Some(receiver);
    }

    /// Subscribe to snapshots of the current workout; None before the first
    pub fn subscribe_workout_snapshots(&self) -> Option<watch::Receiver<WorkoutSnapshot>> {
        lock(&self.workout_snapshots).clone()
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp_ms: u64) -> VoiceSample {
        VoiceSample {
            pitch_hz: Some(110.0),
            level: 0.5,
            confidence: 0.9,
            settled_hz: None,
            timestamp_ms,
        }
    }

    #[test]
    fn test_voice_sample_channel_lifecycle() {
        let manager = BroadcastChannelManager::new();
        assert!(manager.subscribe_voice_samples().is_none());

        let _tx = manager.init_voice_samples(8);
        assert!(manager.subscribe_voice_samples().is_some());
    }

    #[test]
    fn test_voice_sample_sender_is_shared() {
        let manager = BroadcastChannelManager::new();
        let first = manager.init_voice_samples(8);
        let second = manager.init_voice_samples(8);

        let mut rx1 = manager.subscribe_voice_samples().unwrap();
        let mut rx2 = manager.subscribe_voice_samples().unwrap();
        first.send(sample(1)).unwrap();
        second.send(sample(2)).unwrap();

        assert_eq!(rx1.try_recv().unwrap().timestamp_ms, 1);
        assert_eq!(rx1.try_recv().unwrap().timestamp_ms, 2);
        assert_eq!(rx2.try_recv().unwrap().timestamp_ms, 1);
    }

    #[test]
    fn test_workout_snapshot_channel_is_replaced() {
        use crate::workout::{ExerciseCatalog, WorkoutMachine};

        let manager = BroadcastChannelManager::default();
        assert!(manager.subscribe_workout_snapshots().is_none());

        let machine = WorkoutMachine::new(ExerciseCatalog::default_workout(), 10);
        let (tx, rx) = watch::channel(machine.snapshot());
        manager.init_workout_snapshots(rx);

        let subscribed = manager.subscribe_workout_snapshots().unwrap();
        assert_eq!(subscribed.borrow().epoch, tx.borrow().epoch);

        let (_tx2, rx2) = watch::channel(machine.snapshot());
        manager.init_workout_snapshots(rx2);
        drop(tx);
        assert!(manager.subscribe_workout_snapshots().unwrap().has_changed().is_ok());
    }
}
