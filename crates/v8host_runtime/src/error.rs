use thiserror::Error;

use crate::host::HostException;
use crate::value::Value;

pub const ENGINE_NAME: &str = "V8";

pub type Result<T> = std::result::Result<T, V8Exception>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V8ExceptionKind {
    /// Script or runtime error
    General,
    /// The isolate is unusable, currently only after running out of memory
    Fatal,
    /// Execution was terminated by the host or by the heap watchdog
    Interrupt,
}

/// Error surfaced by every fallible engine operation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct V8Exception {
    pub kind: V8ExceptionKind,
    pub engine_name: String,
    pub message: String,
    pub stack_trace: Option<String>,
    /// Set once the engine actually dispatched into script code
    pub execution_started: bool,
    /// The thrown script value, `Undefined` for host-side failures
    pub script_exception: Value,
    #[source]
    pub inner_exception: Option<HostException>,
}

impl V8Exception {
    pub fn new(kind: V8ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            engine_name: ENGINE_NAME.to_string(),
            message: message.into(),
            stack_trace: None,
            execution_started: false,
            script_exception: Value::Undefined,
            inner_exception: None,
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::new(V8ExceptionKind::General, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(V8ExceptionKind::Fatal, message)
    }

    pub fn interrupt(message: impl Into<String>) -> Self {
        Self::new(V8ExceptionKind::Interrupt, message)
    }

    #[must_use]
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    #[must_use]
    pub fn with_execution_started(mut self, started: bool) -> Self {
        self.execution_started = started;
        self
    }

    #[must_use]
    pub fn with_script_exception(mut self, exception: Value) -> Self {
        self.script_exception = exception;
        self
    }

    #[must_use]
    pub fn with_inner_exception(mut self, inner: HostException) -> Self {
        self.inner_exception = Some(inner);
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == V8ExceptionKind::Fatal
    }

    pub fn is_interrupt(&self) -> bool {
        self.kind == V8ExceptionKind::Interrupt
    }
}

pub(crate) const OUT_OF_MEMORY_MESSAGE: &str = "The V8 runtime has exceeded its memory limit";
pub(crate) const INTERRUPTED_MESSAGE: &str = "Script execution interrupted by host";
pub(crate) const STACK_LIMIT_MESSAGE: &str = "Script stack usage limit exceeded";
pub(crate) const ISOLATE_RELEASED_MESSAGE: &str = "The V8 runtime has been released";
pub(crate) const CONTEXT_DESTROYED_MESSAGE: &str = "The script context has been destroyed";

/// Failure inside an engine scope before it is turned into a [`V8Exception`].
///
/// `Pending` means an engine call returned nothing and the enclosing
/// `TryCatch` holds the reason.
#[derive(Debug)]
pub(crate) enum ScopeFailure {
    Pending,
    Host(V8Exception),
}

impl From<V8Exception> for ScopeFailure {
    fn from(value: V8Exception) -> Self {
        Self::Host(value)
    }
}

pub(crate) type ScopeResult<T> = std::result::Result<T, ScopeFailure>;

pub(crate) trait OrPending<T> {
    fn or_pending(self) -> ScopeResult<T>;
}

impl<T> OrPending<T> for Option<T> {
    fn or_pending(self) -> ScopeResult<T> {
        self.ok_or(ScopeFailure::Pending)
    }
}
