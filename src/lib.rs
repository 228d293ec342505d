// Voice Trainer Core - Rust voice measurement and workout engine
// Real-time pitch analysis with a lock-free capture pipeline

// Module declarations
pub mod analysis;
pub mod api;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod fixtures;
pub mod managers;
pub mod recording;
pub mod telemetry;
pub mod workout;

// Re-exports for convenience
pub use api::*;

/// Set once JNI_OnLoad has handed the JavaVM to ndk-context
#[cfg(target_os = "android")]
pub(crate) static ANDROID_CONTEXT_READY: std::sync::atomic::AtomicBool =
    std::sync::atomic::AtomicBool::new(false);

/// Initialize logging; later calls are no-ops
#[cfg(target_os = "android")]
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let Ok(layer) = tracing_android::layer("VoiceTrainer") else {
        return;
    };
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with(layer)
        .try_init();
}

/// Initialize logging; later calls are no-ops
#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// JNI_OnLoad is called when the native library is loaded by Android
/// This function initializes the Android context required by oboe-rs
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(
    vm: jni::JavaVM,
    _reserved: *mut std::ffi::c_void,
) -> jni::sys::jint {
    use std::sync::atomic::Ordering;
    use telemetry::LifecyclePhase;

    init_logging();
    telemetry::hub().record_jni_phase(LifecyclePhase::LibraryLoaded);
    tracing::info!("JNI_OnLoad called - initializing Android context");

    // SAFETY: the JavaVM pointer is valid for the life of the process and
    // this runs before any Oboe stream is opened
    unsafe {
        ndk_context::initialize_android_context(
            vm.get_java_vm_pointer() as *mut std::ffi::c_void,
            std::ptr::null_mut(),
        );
    }
    ANDROID_CONTEXT_READY.store(true, Ordering::SeqCst);
    telemetry::hub().record_jni_phase(LifecyclePhase::ContextInitialized);
    tracing::info!("Android context initialized successfully");

    jni::sys::JNI_VERSION_1_6
}
