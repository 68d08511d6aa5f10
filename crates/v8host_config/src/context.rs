use serde::{Deserialize, Serialize};

/// Per-context behaviour flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextConfig {
    #[serde(default = "crate::defaults::default_context_name")]
    pub name: String,

    /// Export script `Date` objects as host date-time values
    #[serde(default)]
    pub enable_date_time_conversion: bool,

    /// Do not attach host exceptions to the script errors raised from them
    #[serde(default)]
    pub hide_host_exceptions: bool,

    /// Keep termination alive past nested scope exits so outer callers
    /// observe the interrupt as well
    #[serde(default)]
    pub enable_interrupt_propagation: bool,

    #[serde(default)]
    pub enable_dynamic_module_imports: bool,

    /// Expose this context to the inspector as the default context
    #[serde(default)]
    pub enable_debugging: bool,

    /// Flush microtasks after promise resolutions observed outside script
    #[serde(default)]
    pub enable_task_promise_conversion: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            name: crate::defaults::default_context_name(),
            enable_date_time_conversion: false,
            hide_host_exceptions: false,
            enable_interrupt_propagation: false,
            enable_dynamic_module_imports: false,
            enable_debugging: false,
            enable_task_promise_conversion: false,
        }
    }
}

impl ContextConfig {
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_date_time_conversion(mut self, enable: bool) -> Self {
        self.enable_date_time_conversion = enable;
        self
    }

    #[must_use]
    pub fn with_hide_host_exceptions(mut self, hide: bool) -> Self {
        self.hide_host_exceptions = hide;
        self
    }

    #[must_use]
    pub fn with_interrupt_propagation(mut self, enable: bool) -> Self {
        self.enable_interrupt_propagation = enable;
        self
    }

    #[must_use]
    pub fn with_dynamic_module_imports(mut self, enable: bool) -> Self {
        self.enable_dynamic_module_imports = enable;
        self
    }

    #[must_use]
    pub fn with_debugging(mut self, enable: bool) -> Self {
        self.enable_debugging = enable;
        self
    }

    #[must_use]
    pub fn with_task_promise_conversion(mut self, enable: bool) -> Self {
        self.enable_task_promise_conversion = enable;
        self
    }
}
