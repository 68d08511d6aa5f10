use once_cell::sync::OnceCell;

/// Process-wide engine platform. The engine accepts exactly one.
static V8_PLATFORM: OnceCell<v8::SharedRef<v8::Platform>> = OnceCell::new();

/// Initializes the platform on first use; later calls are no-ops.
pub fn initialize_platform_once() {
    V8_PLATFORM.get_or_init(|| {
        tracing::debug!(version = v8::V8::get_version(), "Initializing V8 platform");
        let platform = v8::new_default_platform(0, false).make_shared();
        v8::V8::initialize_platform(platform.clone());
        v8::V8::initialize();
        platform
    });
}

pub fn is_platform_initialized() -> bool {
    V8_PLATFORM.get().is_some()
}

/// Runs platform tasks the engine queued for `isolate` without blocking.
pub(crate) fn pump_platform_tasks(isolate: &mut v8::Isolate) {
    if let Some(platform) = V8_PLATFORM.get() {
        while v8::Platform::pump_message_loop(platform, isolate, false) {}
    }
}
