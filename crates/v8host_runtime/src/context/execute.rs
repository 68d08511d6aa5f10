use super::ContextImpl;
use super::convert::v8_string;
use super::modules::script_origin;
use crate::cache::{
    CacheEntry, CacheKey, CacheOutcome, V8CacheKind, V8CacheResult, cache_hit_outcome,
    cache_miss_outcome, needs_code_cache,
};
use crate::document::{DocumentInfo, DocumentKind};
use crate::error::{OrPending, ScopeResult, V8Exception};
use crate::isolate::engine::Engine;
use crate::script::{CompiledUnit, V8Script};
use crate::value::Value;

fn script_code_cache(script: v8::Local<'_, v8::UnboundScript>) -> Option<Vec<u8>> {
    script.create_code_cache().map(|bytes| bytes.to_vec())
}

impl ContextImpl {
    #[tracing::instrument(skip_all, fields(context = %self.config.name, document = document.resource_name()))]
    pub(crate) fn execute_code(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        document: &DocumentInfo,
        code: &str,
        evaluate: bool,
    ) -> ScopeResult<Value> {
        match document.kind() {
            DocumentKind::Script => {
                let (script, _) =
                    self.compile_script(engine, scope, document, code, V8CacheKind::None, &[])?;
                self.run_script(engine, scope, &script, evaluate)
            }
            DocumentKind::Module => {
                let (artifact, _) =
                    self.compile_module(engine, scope, document, code, V8CacheKind::None, &[])?;
                self.evaluate_module(engine, scope, &artifact, evaluate)
            }
            DocumentKind::Json => {
                let text = v8_string(scope, code)?;
                engine.mark_execution_started();
                let value = v8::json::parse(scope, text).or_pending()?;
                Ok(if evaluate {
                    self.export_value(engine, scope, value)
                } else {
                    Value::Undefined
                })
            }
            DocumentKind::Text => Ok(if evaluate {
                Value::String(code.to_string())
            } else {
                Value::Undefined
            }),
        }
    }

    /// Compiles a script through the isolate-wide script cache.
    fn compile_script(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        document: &DocumentInfo,
        code: &str,
        kind: V8CacheKind,
        supplied: &[u8],
    ) -> ScopeResult<(v8::Global<v8::UnboundScript>, CacheOutcome)> {
        let key = CacheKey::new(document, code);
        let hit = engine
            .scripts
            .borrow_mut()
            .find(key)
            .map(|entry| (entry.artifact.clone(), entry.cache_bytes.clone()));

        if let Some((script, mut stored)) = hit {
            if needs_code_cache(kind) && stored.is_none() {
                stored = script_code_cache(v8::Local::new(scope, &script));
                if let Some(bytes) = &stored {
                    engine.scripts.borrow_mut().set_cache_bytes(key, bytes.clone());
                }
            }
            let outcome = cache_hit_outcome(kind, supplied, stored.as_deref());
            tracing::trace!(result = ?outcome.result, "Script cache hit");
            return Ok((script, outcome));
        }

        let origin = script_origin(scope, document).or_pending()?;
        let source_text = v8_string(scope, code)?;
        let consume = matches!(kind, V8CacheKind::Consume | V8CacheKind::Update) && !supplied.is_empty();
        let (script, consumed) = if consume {
            let cached = v8::script_compiler::CachedData::new(supplied);
            let mut source =
                v8::script_compiler::Source::new_with_cached_data(source_text, Some(&origin), cached);
            let script = v8::script_compiler::compile_unbound_script(
                scope,
                &mut source,
                v8::script_compiler::CompileOptions::ConsumeCodeCache,
                v8::script_compiler::NoCacheReason::NoReason,
            )
            .or_pending()?;
            let rejected = source.get_cached_data().is_none_or(|data| data.rejected());
            (script, Some(!rejected))
        } else {
            let mut source = v8::script_compiler::Source::new(source_text, Some(&origin));
            let script = v8::script_compiler::compile_unbound_script(
                scope,
                &mut source,
                v8::script_compiler::CompileOptions::NoCompileOptions,
                v8::script_compiler::NoCacheReason::NoReason,
            )
            .or_pending()?;
            (script, None)
        };

        let produce = kind == V8CacheKind::Produce
            || (consume && consumed != Some(true))
            || (kind == V8CacheKind::Update && !consume);
        let produced = if produce { script_code_cache(script) } else { None };
        let outcome = cache_miss_outcome(kind, supplied, consumed, produced);
        if outcome.result == V8CacheResult::UpdateFailed {
            tracing::warn!(document = document.resource_name(), "Engine produced no code cache");
        }

        let script = v8::Global::new(scope, script);
        let mut entry = CacheEntry::new(document.clone(), key, script.clone());
        entry.cache_bytes = outcome.store.clone();
        let max_size = engine.core.host.max_script_cache_size();
        engine.scripts.borrow_mut().insert(entry, max_size);
        Ok((script, outcome))
    }

    fn run_script(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        script: &v8::Global<v8::UnboundScript>,
        evaluate: bool,
    ) -> ScopeResult<Value> {
        let script = v8::Local::new(scope, script).bind_to_current_context(scope);
        engine.mark_execution_started();
        let result = script.run(scope).or_pending()?;
        Ok(if evaluate {
            self.export_value(engine, scope, result)
        } else {
            Value::Undefined
        })
    }

    /// Compiles `code` into a reusable [`V8Script`]. Modules stay bound to
    /// this context; scripts run in any context of the isolate.
    pub(crate) fn compile(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        document: &DocumentInfo,
        code: &str,
        kind: V8CacheKind,
        supplied: &[u8],
    ) -> ScopeResult<(V8Script, V8CacheResult, Option<Vec<u8>>)> {
        let (unit, outcome) = match document.kind() {
            DocumentKind::Script => {
                let (script, outcome) = self.compile_script(engine, scope, document, code, kind, supplied)?;
                let unit = CompiledUnit::Script {
                    document: document.clone(),
                    script,
                };
                (unit, outcome)
            }
            DocumentKind::Module => {
                let (artifact, outcome) = self.compile_module(engine, scope, document, code, kind, supplied)?;
                let unit = CompiledUnit::Module {
                    document: document.clone(),
                    context_id: self.id,
                    artifact,
                };
                (unit, outcome)
            }
            other => {
                return Err(V8Exception::general(format!("Documents of kind {other:?} cannot be compiled")).into());
            }
        };
        let id = engine.register_compiled(unit);
        let script = V8Script::new(engine.core.weak(), id, document.clone());
        Ok((script, outcome.result, outcome.returned))
    }

    pub(crate) fn execute_compiled(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        script: &V8Script,
        evaluate: bool,
    ) -> ScopeResult<Value> {
        if script.is_released() {
            return Err(V8Exception::general("The compiled script has been released").into());
        }
        if !script.belongs_to(&engine.core) {
            return Err(V8Exception::general("The compiled script belongs to another runtime").into());
        }
        let unit = engine
            .compiled(script.id())
            .ok_or_else(|| V8Exception::general("The compiled script is no longer available"))?;
        match unit {
            CompiledUnit::Script { script, .. } => self.run_script(engine, scope, &script, evaluate),
            CompiledUnit::Module {
                context_id, artifact, ..
            } => {
                if context_id != self.id {
                    return Err(V8Exception::general(
                        "The compiled module belongs to another script context",
                    )
                    .into());
                }
                self.evaluate_module(engine, scope, &artifact, evaluate)
            }
        }
    }
}
