use serde::{Deserialize, Serialize};

use crate::debugger::DebuggerConfig;

/// Resource constraints and engine flags for a single isolate.
///
/// All sizes are in bytes. A size of zero disables the corresponding ceiling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IsolateConfig {
    #[serde(default = "crate::defaults::default_isolate_name")]
    pub name: String,

    /// Young generation size handed to the engine at isolate creation
    #[serde(default)]
    pub max_new_space_size: usize,

    /// Old generation size handed to the engine at isolate creation
    #[serde(default)]
    pub max_old_space_size: usize,

    /// Factor applied to the engine heap limit when the engine itself is
    /// about to run out of room. Values at or below 1.0 disable expansion.
    #[serde(default = "crate::defaults::default_heap_expansion_multiplier")]
    pub heap_expansion_multiplier: f64,

    /// Ceiling for live array buffer backing stores
    #[serde(default)]
    pub max_array_buffer_allocation: usize,

    /// Soft heap ceiling enforced by the heap watchdog
    #[serde(default)]
    pub max_heap_size: usize,

    #[serde(default = "crate::defaults::default_heap_size_sample_interval_ms")]
    pub heap_size_sample_interval_ms: u64,

    /// Maximum native stack consumed by nested script execution
    #[serde(default)]
    pub max_stack_usage: usize,

    /// Throw a `RangeError` into running script instead of terminating it
    /// when the heap ceiling is exceeded
    #[serde(default)]
    pub disable_heap_size_violation_interrupt: bool,

    /// Register the dynamic `import()` hook for this isolate
    #[serde(default)]
    pub enable_dynamic_module_imports: bool,

    /// Stack size of the engine thread
    #[serde(default = "crate::defaults::default_thread_stack_size")]
    pub thread_stack_size: usize,

    #[serde(default)]
    pub debugger: DebuggerConfig,
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            name: crate::defaults::default_isolate_name(),
            max_new_space_size: 0,
            max_old_space_size: 0,
            heap_expansion_multiplier: crate::defaults::default_heap_expansion_multiplier(),
            max_array_buffer_allocation: 0,
            max_heap_size: 0,
            heap_size_sample_interval_ms: crate::defaults::default_heap_size_sample_interval_ms(),
            max_stack_usage: 0,
            disable_heap_size_violation_interrupt: false,
            enable_dynamic_module_imports: false,
            thread_stack_size: crate::defaults::default_thread_stack_size(),
            debugger: DebuggerConfig::default(),
        }
    }
}

impl IsolateConfig {
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_max_heap_size(mut self, bytes: usize) -> Self {
        self.max_heap_size = bytes;
        self
    }

    #[must_use]
    pub fn with_heap_size_sample_interval_ms(mut self, interval_ms: u64) -> Self {
        self.heap_size_sample_interval_ms = interval_ms;
        self
    }

    #[must_use]
    pub fn with_max_stack_usage(mut self, bytes: usize) -> Self {
        self.max_stack_usage = bytes;
        self
    }

    #[must_use]
    pub fn with_max_array_buffer_allocation(mut self, bytes: usize) -> Self {
        self.max_array_buffer_allocation = bytes;
        self
    }

    #[must_use]
    pub fn with_heap_expansion_multiplier(mut self, multiplier: f64) -> Self {
        self.heap_expansion_multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn with_disable_heap_size_violation_interrupt(mut self, disable: bool) -> Self {
        self.disable_heap_size_violation_interrupt = disable;
        self
    }

    #[must_use]
    pub fn with_dynamic_module_imports(mut self, enable: bool) -> Self {
        self.enable_dynamic_module_imports = enable;
        self
    }

    #[must_use]
    pub fn with_debugger(mut self, debugger: DebuggerConfig) -> Self {
        self.debugger = debugger;
        self
    }

    /// Engine thread stack size, never smaller than what the configured stack
    /// ceiling needs plus room for the engine's own frames.
    pub fn effective_thread_stack_size(&self) -> usize {
        self.thread_stack_size
            .max(self.max_stack_usage.saturating_add(2 * 1024 * 1024))
    }
}
