//! Process setup from serialized configuration: logging and isolates
//! described by a config file.

use std::sync::Arc;

use camino::Utf8PathBuf;
use v8host_config::Config;
use v8host_config::logger::{LoggerConfig, init_logger};
use v8host_runtime::{V8Exception, V8Isolate};

use crate::context::V8ContextHandle;
use crate::exception::guard;
use crate::handle::Handle;
use crate::host::FfiHost;
use crate::isolate::V8IsolateHandle;
use crate::vector::read_utf8;

/// Installs the process-wide log subscriber from a JSON logger config, for
/// example `{"level": "debug", "file": "engine.jsonl"}`. Empty input selects
/// the defaults. Returns false after scheduling an exception when the config
/// is malformed, the log file cannot be opened or a subscriber is already
/// installed.
///
/// # Safety
/// `config_json` points to `config_json_length` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Host_InitLogger(config_json: *const u8, config_json_length: usize) -> bool {
    let json = unsafe { read_utf8(config_json, config_json_length) };
    guard(false, || {
        let config: LoggerConfig = if json.trim().is_empty() {
            LoggerConfig::default()
        } else {
            serde_json::from_str(&json)
                .map_err(|err| V8Exception::general(format!("Invalid logger config: {err}")))?
        };
        init_logger(&config).map_err(|err| V8Exception::general(format!("{err:#}")))?;
        Ok(true)
    })
}

/// Loads a config file, installs its logger and creates its isolate with
/// one context built from the file's context settings.
///
/// A logger that cannot be installed is reported through `tracing` and does
/// not fail the call. Returns false after scheduling an exception when the
/// file cannot be loaded or the isolate cannot be created; the out-params
/// are left untouched in that case.
///
/// # Safety
/// `path` points to `path_length` readable bytes; `isolate` and `context`
/// are valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn V8Host_CreateFromConfigFile(
    path: *const u8,
    path_length: usize,
    isolate: *mut *mut V8IsolateHandle,
    context: *mut *mut V8ContextHandle,
) -> bool {
    let path = Utf8PathBuf::from(unsafe { read_utf8(path, path_length) });
    guard(false, || {
        if isolate.is_null() || context.is_null() {
            return Err(V8Exception::general("Missing isolate or context out-param"));
        }
        let config = Config::load(&path).map_err(|err| V8Exception::general(format!("{err:#}")))?;
        if let Err(err) = init_logger(&config.logger) {
            let reason = format!("{err:#}");
            tracing::warn!(%path, error = %reason, "Logger from config not installed");
        }

        let engine = V8Isolate::new(config.isolate, Arc::new(FfiHost))?;
        let main = engine.create_context(config.context)?;
        tracing::debug!(%path, isolate = engine.name(), "Created isolate from config");
        unsafe {
            *isolate = Handle::into_raw(engine);
            *context = Handle::into_raw(main);
        }
        Ok(true)
    })
}
