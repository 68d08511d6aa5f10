use std::sync::Arc;

use v8host_runtime::{
    DebugAgent, DebugCallback, DocumentInfo, HostEnvironment, HostResult, LoadedModule,
    NativeCallback, Value,
};

use crate::server::{AgentOptions, DebugAgentServer};

/// Host wrapper that answers debug agent requests with a
/// [`DebugAgentServer`] and delegates everything else to `inner`.
pub struct DebuggingHost<H> {
    inner: H,
}

impl<H: HostEnvironment> DebuggingHost<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: HostEnvironment> HostEnvironment for DebuggingHost<H> {
    fn load_module(&self, referrer: Option<&DocumentInfo>, specifier: &str) -> HostResult<LoadedModule> {
        self.inner.load_module(referrer, specifier)
    }

    fn create_module_context(&self, document: &DocumentInfo) -> HostResult<Vec<(String, Value)>> {
        self.inner.create_module_context(document)
    }

    fn max_script_cache_size(&self) -> usize {
        self.inner.max_script_cache_size()
    }

    fn max_module_cache_size(&self) -> usize {
        self.inner.max_module_cache_size()
    }

    fn create_debug_agent(
        &self,
        name: &str,
        version: &str,
        port: u16,
        remote: bool,
        callback: DebugCallback,
    ) -> Option<Arc<dyn DebugAgent>> {
        let options = AgentOptions {
            name: name.to_string(),
            version: version.to_string(),
            port,
            remote,
        };
        match DebugAgentServer::start(options, Arc::new(callback)) {
            Ok(server) => Some(Arc::new(server)),
            Err(err) => {
                tracing::error!(error = %err, isolate = name, "Debug agent unavailable");
                None
            }
        }
    }

    fn queue_native_callback(&self, callback: NativeCallback) {
        self.inner.queue_native_callback(callback);
    }
}
