use futures::Stream;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::analysis::VoiceSample;
use crate::config::AppConfig;
use crate::error::log_audio_error;
use crate::telemetry::{self, MetricEvent};
use crate::workout::WorkoutSnapshot;

use super::EngineHandle;

impl EngineHandle {
    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================

    /// Forward a broadcast receiver into an unbounded channel on the engine
    /// runtime. A lagging subscriber skips ahead instead of ending the stream.
    fn forward_broadcast<T>(&self, mut receiver: broadcast::Receiver<T>) -> mpsc::UnboundedReceiver<T>
    where
        T: Clone + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.runtime() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    loop {
                        match receiver.recv().await {
                            Ok(item) => {
                                if tx.send(item).is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!("[EngineHandle] Stream subscriber lagged by {}", skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                });
            }
            Err(err) => log_audio_error(&err, "EngineHandle::forward_broadcast"),
        }
        rx
    }

    /// Ordered live samples from every recording, measurement or workout
    pub fn subscribe_voice_samples(&self) -> mpsc::UnboundedReceiver<VoiceSample> {
        match self.broadcasts.subscribe_voice_samples() {
            Some(receiver) => self.forward_broadcast(receiver),
            None => mpsc::unbounded_channel().1,
        }
    }

    /// Snapshots of the current workout, starting with the latest one
    ///
    /// The stream ends when the workout reaches a terminal state.
    pub fn subscribe_workout_snapshots(&self) -> mpsc::UnboundedReceiver<WorkoutSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        let Some(mut snapshots) = self.broadcasts.subscribe_workout_snapshots() else {
            return rx;
        };

        match self.runtime() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    loop {
                        let snapshot = snapshots.borrow_and_update().clone();
                        let terminal = snapshot.phase.is_terminal();
                        if tx.send(snapshot).is_err() || terminal {
                            break;
                        }
                        if snapshots.changed().await.is_err() {
                            break;
                        }
                    }
                });
            }
            Err(err) => log_audio_error(&err, "EngineHandle::subscribe_workout_snapshots"),
        }
        rx
    }

    pub fn subscribe_telemetry(&self) -> mpsc::UnboundedReceiver<MetricEvent> {
        self.forward_broadcast(telemetry::hub().collector().subscribe())
    }

    // ========================================================================
    // ASYNC STREAM ADAPTERS
    // ========================================================================

    pub fn voice_sample_stream(&self) -> impl Stream<Item = VoiceSample> + Unpin {
        UnboundedReceiverStream::new(self.subscribe_voice_samples())
    }

    pub fn workout_snapshot_stream(&self) -> impl Stream<Item = WorkoutSnapshot> + Unpin {
        UnboundedReceiverStream::new(self.subscribe_workout_snapshots())
    }

    pub fn telemetry_stream(&self) -> impl Stream<Item = MetricEvent> + Unpin {
        UnboundedReceiverStream::new(self.subscribe_telemetry())
    }

    // ========================================================================
    // STATE ACCESSORS
    // ========================================================================

    /// Most recent live sample, for callers that poll instead of stream
    pub fn latest_voice_sample(&self) -> Option<VoiceSample> {
        self.recorder.latest()
    }

    /// Snapshot the current app configuration (tooling helper).
    pub fn config_snapshot(&self) -> AppConfig {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .unwrap_or_else(|err| err.into_inner().clone())
    }
}
