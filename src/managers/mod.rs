// Managers Module
//
// Focused managers owned by EngineHandle:
// - BroadcastChannelManager: channels behind the FFI streams

pub mod broadcast_manager;

pub use broadcast_manager::BroadcastChannelManager;
