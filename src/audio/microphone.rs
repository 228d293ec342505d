//! Exclusive ownership of the input device.
//!
//! Only one recording may hold the microphone at a time. A second
//! acquisition fails with `ResourceBusy` instead of queuing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::AudioError;

static GLOBAL_MICROPHONE: Lazy<Arc<Microphone>> = Lazy::new(|| Arc::new(Microphone::new()));

/// Process-wide microphone token
#[derive(Debug, Default)]
pub struct Microphone {
    held: AtomicBool,
}

impl Microphone {
    pub fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// The microphone shared by every recording in this process
    pub fn global() -> Arc<Microphone> {
        Arc::clone(&GLOBAL_MICROPHONE)
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Take the microphone, failing if another lease is outstanding
    pub fn acquire(self: &Arc<Self>) -> Result<MicrophoneLease, AudioError> {
        if self
            .held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AudioError::ResourceBusy);
        }
        Ok(MicrophoneLease {
            microphone: Arc::clone(self),
        })
    }
}

/// RAII lease; dropping it releases the microphone exactly once
#[derive(Debug)]
pub struct MicrophoneLease {
    microphone: Arc<Microphone>,
}

impl Drop for MicrophoneLease {
    fn drop(&mut self) {
        self.microphone.held.store(false, Ordering::SeqCst);
    }
}
