// Audio capture primitives shared by the platform backends and the
// analysis thread.

pub mod buffer_pool;
pub mod frame;
pub mod microphone;

pub use buffer_pool::{
    AnalysisThreadChannels, AudioBuffer, BufferPool, BufferPoolChannels, CaptureThreadChannels,
};
pub use frame::AudioFrame;
pub use microphone::{Microphone, MicrophoneLease};
