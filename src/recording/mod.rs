// Recording module - microphone sessions feeding the analysis pipeline
//
// A RecordingSession owns the exclusive microphone lease, the platform
// capture stream and the analysis thread for one take:
//
//   idle → recording → (stopped | error)

pub mod session;

pub use session::{Recorder, RecordingSession, RecordingState};
