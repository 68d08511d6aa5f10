//! Conversion of engine exceptions into [`V8Exception`]s and of host
//! failures into script errors.

use std::sync::Arc;

use super::ContextImpl;
use crate::error::{INTERRUPTED_MESSAGE, OUT_OF_MEMORY_MESSAGE, ScopeFailure, V8Exception};
use crate::holder::HostObjectHolder;
use crate::host::{HostException, HostExceptionObject};
use crate::isolate::engine::Engine;

const UNKNOWN_ERROR_MESSAGE: &str = "Unknown script error";

/// Wraps a host failure so that it reaches script as an `Error` carrying
/// the original exception.
pub(crate) fn host_error(err: HostException) -> ScopeFailure {
    ScopeFailure::Host(V8Exception::general(err.message()).with_inner_exception(err))
}

impl ContextImpl {
    /// Builds the exception for whatever `tc` caught, telling termination
    /// apart from ordinary throws.
    pub(crate) fn exception_from_try_catch(
        &self,
        engine: &Engine,
        tc: &mut v8::TryCatch<'_, v8::HandleScope<'_>>,
    ) -> V8Exception {
        let started = engine.execution_started();
        let exception = tc.exception();

        if tc.has_terminated() || (exception.is_none() && engine.core.is_terminating()) {
            let err = if engine.core.is_out_of_memory() {
                V8Exception::fatal(OUT_OF_MEMORY_MESSAGE)
            } else {
                V8Exception::interrupt(INTERRUPTED_MESSAGE)
            };
            return err.with_execution_started(started);
        }

        let Some(exception) = exception else {
            return V8Exception::general(UNKNOWN_ERROR_MESSAGE).with_execution_started(started);
        };

        let message = exception
            .to_string(tc)
            .map(|text| text.to_rust_string_lossy(tc))
            .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string());
        let stack_trace = self.stack_trace_of(tc, exception, &message);
        let inner = self.host_exception_of(tc, exception);
        let script_exception = self.export_value(engine, tc, exception);

        let mut err = V8Exception::general(message)
            .with_execution_started(started)
            .with_script_exception(script_exception);
        if let Some(stack_trace) = stack_trace {
            err = err.with_stack_trace(stack_trace);
        }
        if let Some(inner) = inner {
            err = err.with_inner_exception(inner);
        }
        err
    }

    /// The error's own `stack` when it has one; otherwise a trace rebuilt
    /// from the constructor name and the failing source line.
    fn stack_trace_of(
        &self,
        tc: &mut v8::TryCatch<'_, v8::HandleScope<'_>>,
        exception: v8::Local<'_, v8::Value>,
        message: &str,
    ) -> Option<String> {
        if let Ok(object) = v8::Local::<v8::Object>::try_from(exception) {
            let key = v8::String::new(tc, "stack")?;
            if let Some(stack) = object.get(tc, key.into())
                && stack.is_string()
            {
                let stack = stack.to_rust_string_lossy(tc);
                if !stack.is_empty() {
                    return Some(stack);
                }
            }
        }

        let details = tc.message()?;
        let mut trace = match v8::Local::<v8::Object>::try_from(exception) {
            Ok(object) => {
                let constructor = object.get_constructor_name().to_rust_string_lossy(tc);
                if message.starts_with(&constructor) {
                    message.to_string()
                } else {
                    format!("{constructor}: {message}")
                }
            }
            Err(_) => message.to_string(),
        };
        let resource = details
            .get_script_resource_name(tc)
            .map(|name| name.to_rust_string_lossy(tc))
            .unwrap_or_default();
        let line = details.get_line_number(tc).unwrap_or(0);
        let column = details.get_start_column() + 1;
        trace.push_str(&format!("\n    at {resource}:{line}:{column}"));
        if let Some(source_line) = details.get_source_line(tc) {
            let source_line = source_line.to_rust_string_lossy(tc);
            let source_line = source_line.trim();
            if !source_line.is_empty() {
                trace.push_str(&format!(" -> {source_line}"));
            }
        }
        Some(trace)
    }

    /// The host exception a proxy callback attached to a script error.
    fn host_exception_of(
        &self,
        scope: &mut v8::HandleScope<'_>,
        exception: v8::Local<'_, v8::Value>,
    ) -> Option<HostException> {
        let error = v8::Local::<v8::Object>::try_from(exception).ok()?;
        if let Some(thrown) = self.host_object_of(scope, error) {
            return thrown.object().as_host_exception();
        }
        let key = v8::Local::new(scope, &self.keys.host_exception);
        let attached = error.get_private(scope, key)?;
        let attached = v8::Local::<v8::Object>::try_from(attached).ok()?;
        self.host_object_of(scope, attached)?
            .object()
            .as_host_exception()
    }

    /// Raises `failure` in script. A pending failure is already thrown.
    pub(crate) fn throw_failure(&self, scope: &mut v8::HandleScope<'_>, failure: ScopeFailure) {
        let ScopeFailure::Host(err) = failure else {
            return;
        };
        match err.inner_exception {
            Some(inner) => self.throw_host_exception(scope, &err.message, inner),
            None => self.throw_error(scope, &err.message),
        }
    }

    /// Throws an `Error` for a host exception, carrying the exception itself
    /// under a private key unless the context hides host exceptions.
    pub(crate) fn throw_host_exception(
        &self,
        scope: &mut v8::HandleScope<'_>,
        message: &str,
        exception: HostException,
    ) {
        let text = v8::String::new(scope, message).unwrap_or_else(|| v8::String::empty(scope));
        let error = v8::Exception::error(scope, text);
        if !self.config.hide_host_exceptions
            && let Ok(error_object) = v8::Local::<v8::Object>::try_from(error)
        {
            let holder = HostObjectHolder::new(Arc::new(HostExceptionObject::new(exception)));
            if let Ok(attached) = self.proxy_for(scope, &holder) {
                let key = v8::Local::new(scope, &self.keys.host_exception);
                error_object.set_private(scope, key, attached.into());
            }
        }
        scope.throw_exception(error);
    }
}
