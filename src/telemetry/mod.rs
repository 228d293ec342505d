//! Diagnostics telemetry collector and helpers.
//!
//! The collector multiplexes recording lifecycle, capture backpressure and
//! workout transitions into a bounded history plus async broadcast stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

pub mod events;

pub use events::{LifecyclePhase, MetricEvent};

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut history) = self.history.lock() {
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            if self.history_capacity > 0 {
                history.push_back(event.clone());
            }
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let recent = self
            .history
            .lock()
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default();
        TelemetrySnapshot {
            recent,
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Top-level hub wrapping the collector plus the backpressure gauge.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    last_dropped: AtomicU64,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            last_dropped: AtomicU64::new(0),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.collector.snapshot()
    }

    pub fn record_recording_started(&self, backend: &str, sample_rate: u32) {
        self.last_dropped.store(0, Ordering::Relaxed);
        self.collector.publish(MetricEvent::RecordingStarted {
            backend: backend.to_string(),
            sample_rate,
        });
    }

    pub fn record_recording_stopped(&self, duration_ms: u64, voiced_frames: u32) {
        self.collector.publish(MetricEvent::RecordingStopped {
            duration_ms,
            voiced_frames,
        });
    }

    pub fn record_capture_interrupted(&self, reason: impl Into<String>) {
        self.collector.publish(MetricEvent::CaptureInterrupted {
            reason: reason.into(),
        });
    }

    /// Publish only when the running drop count has grown since the last report
    pub fn record_backpressure(&self, dropped: u64) {
        let previous = self.last_dropped.fetch_max(dropped, Ordering::Relaxed);
        if dropped > previous {
            self.collector
                .publish(MetricEvent::BufferBackpressure { dropped });
        }
    }

    pub fn record_workout_transition(&self, phase: &str, exercise_index: Option<usize>) {
        self.collector.publish(MetricEvent::WorkoutTransition {
            phase: phase.to_string(),
            exercise_index,
        });
    }

    pub fn record_workout_completed(&self, streak: u32) {
        self.collector
            .publish(MetricEvent::WorkoutCompleted { streak });
    }

    pub fn record_jni_phase(&self, phase: LifecyclePhase) {
        self.collector.publish(MetricEvent::JniLifecycle {
            phase,
            timestamp_ms: now_timestamp_ms(),
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_preserves_order_within_history() {
        let collector = TelemetryCollector::new(8, 3);
        collector.publish(MetricEvent::RecordingStarted {
            backend: "fixture".to_string(),
            sample_rate: 48_000,
        });
        collector.publish(MetricEvent::BufferBackpressure { dropped: 1 });
        collector.publish(MetricEvent::RecordingStopped {
            duration_ms: 1000,
            voiced_frames: 40,
        });

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 3);
        assert!(matches!(
            snapshot.recent[0],
            MetricEvent::RecordingStarted { .. }
        ));
        assert!(matches!(
            snapshot.recent[2],
            MetricEvent::RecordingStopped { voiced_frames: 40, .. }
        ));
    }

    #[test]
    fn collector_drops_history_when_full() {
        let collector = TelemetryCollector::new(8, 2);
        for streak in 1..=3 {
            collector.publish(MetricEvent::WorkoutCompleted { streak });
        }

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.dropped_events, 1);
        assert_eq!(snapshot.total_events, 3);
        assert!(matches!(
            snapshot.recent[0],
            MetricEvent::WorkoutCompleted { streak: 2 }
        ));
    }

    #[test]
    fn backpressure_reports_only_growth() {
        let hub = TelemetryHub::new(8, 8);
        hub.record_recording_started("fixture", 48_000);
        hub.record_backpressure(0);
        hub.record_backpressure(2);
        hub.record_backpressure(2);
        hub.record_backpressure(5);

        let reported: Vec<u64> = hub
            .snapshot()
            .recent
            .iter()
            .filter_map(|event| match event {
                MetricEvent::BufferBackpressure { dropped } => Some(*dropped),
                _ => None,
            })
            .collect();
        assert_eq!(reported, vec![2, 5]);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let hub = TelemetryHub::new(8, 8);
        let mut rx = hub.collector().subscribe();
        hub.record_workout_transition("resting", Some(0));

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            MetricEvent::WorkoutTransition {
                phase: "resting".to_string(),
                exercise_index: Some(0),
            }
        );
    }
}
