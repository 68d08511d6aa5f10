// Various default functions to be used by serde

pub(crate) const DEFAULT_DEBUG_PORT: u16 = 9222;

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_isolate_name() -> String {
    "v8host".into()
}

pub(crate) fn default_context_name() -> String {
    "main".into()
}

pub(crate) fn default_heap_expansion_multiplier() -> f64 {
    1.0
}

pub(crate) fn default_heap_size_sample_interval_ms() -> u64 {
    50
}

pub(crate) fn default_debug_port() -> i32 {
    i32::from(DEFAULT_DEBUG_PORT)
}

pub(crate) fn default_thread_stack_size() -> usize {
    8 * 1024 * 1024
}
