use serde::{Deserialize, Serialize};

use crate::defaults::DEFAULT_DEBUG_PORT;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebuggerConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Listen on all interfaces instead of loopback only
    #[serde(default)]
    pub remote: bool,

    /// Non-positive values select the default port
    #[serde(default = "crate::defaults::default_debug_port")]
    pub port: i32,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remote: false,
            port: crate::defaults::default_debug_port(),
        }
    }
}

impl DebuggerConfig {
    pub fn enabled_on(port: i32) -> Self {
        Self {
            enabled: true,
            remote: false,
            port,
        }
    }

    /// Port the debug agent should bind, mapping non-positive values to 9222
    pub fn effective_port(&self) -> u16 {
        u16::try_from(self.port)
            .ok()
            .filter(|port| *port > 0)
            .unwrap_or(DEFAULT_DEBUG_PORT)
    }
}
