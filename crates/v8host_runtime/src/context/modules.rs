//! ES modules: compilation through the per-context cache, resolution via
//! the host loader, synthetic JSON/text modules, `import.meta` and dynamic
//! `import()`.

use super::ContextImpl;
use super::convert::v8_string;
use super::verify::host_error;
use crate::cache::{
    CacheEntry, CacheKey, CacheOutcome, V8CacheKind, cache_hit_outcome, cache_miss_outcome,
    needs_code_cache,
};
use crate::document::{DocumentInfo, DocumentKind, code_digest};
use crate::error::{OrPending, ScopeFailure, ScopeResult, V8Exception};
use crate::host::LoadedModule;
use crate::isolate::engine::Engine;
use crate::value::Value;

const DEFAULT_EXPORT: &str = "default";

/// A compiled module plus the one-slot array its `import.meta` lands in.
#[derive(Clone)]
pub(crate) struct ModuleArtifact {
    pub(crate) module: v8::Global<v8::Module>,
    pub(crate) meta_holder: v8::Global<v8::Array>,
}

/// Export values of a synthetic module awaiting its evaluation steps.
pub(crate) struct SyntheticExports {
    module: v8::Global<v8::Module>,
    exports: Vec<(String, v8::Global<v8::Value>)>,
}

/// Origin for a compiled unit. The document's unique id travels in the
/// host-defined options so dynamic `import()` can find its referrer.
pub(crate) fn script_origin<'s>(
    scope: &mut v8::HandleScope<'s>,
    document: &DocumentInfo,
) -> Option<v8::ScriptOrigin<'s>> {
    let name = v8::String::new(scope, document.resource_name())?;
    let source_map_url = match document.source_map_url() {
        Some(url) => Some(v8::String::new(scope, url)?.into()),
        None => None,
    };
    let options = v8::PrimitiveArray::new(scope, 1);
    let unique_id = v8::BigInt::new_from_u64(scope, document.unique_id());
    options.set(scope, 0, unique_id.into());
    Some(v8::ScriptOrigin::new(
        scope,
        name.into(),
        0,
        0,
        false,
        0,
        source_map_url,
        false,
        false,
        document.is_module(),
        Some(options.into()),
    ))
}

/// Reads back the unique id stored by [`script_origin`].
pub(crate) fn unique_id_from_options(
    scope: &mut v8::HandleScope<'_>,
    options: v8::Local<'_, v8::Data>,
) -> Option<u64> {
    // SAFETY: host-defined options are a fixed array, either empty or the
    // one-element primitive array built by `script_origin`
    let options = unsafe { v8::Local::<v8::PrimitiveArray>::cast_unchecked(options) };
    if options.length() != 1 {
        return None;
    }
    let slot: v8::Local<v8::Value> = options.get(scope, 0).into();
    let unique_id = v8::Local::<v8::BigInt>::try_from(slot).ok()?;
    Some(unique_id.u64_value().0)
}

fn module_code_cache(scope: &mut v8::HandleScope<'_>, module: v8::Local<'_, v8::Module>) -> Option<Vec<u8>> {
    let unbound = module.get_unbound_module_script(scope);
    unbound.create_code_cache().map(|bytes| bytes.to_vec())
}

impl ContextImpl {
    /// Compiles a module through the context's module cache.
    pub(crate) fn compile_module(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        document: &DocumentInfo,
        code: &str,
        kind: V8CacheKind,
        supplied: &[u8],
    ) -> ScopeResult<(ModuleArtifact, CacheOutcome)> {
        let key = CacheKey::new(document, code);
        let hit = self
            .modules
            .borrow_mut()
            .find(key)
            .map(|entry| (entry.artifact.clone(), entry.cache_bytes.clone()));

        if let Some((artifact, mut stored)) = hit {
            if needs_code_cache(kind) && stored.is_none() {
                let module = v8::Local::new(scope, &artifact.module);
                stored = module_code_cache(scope, module);
                if let Some(bytes) = &stored {
                    self.modules.borrow_mut().set_cache_bytes(key, bytes.clone());
                }
            }
            let outcome = cache_hit_outcome(kind, supplied, stored.as_deref());
            return Ok((artifact, outcome));
        }

        let origin = script_origin(scope, document).or_pending()?;
        let source_text = v8_string(scope, code)?;
        let consume = matches!(kind, V8CacheKind::Consume | V8CacheKind::Update) && !supplied.is_empty();
        let (module, consumed) = if consume {
            let cached = v8::script_compiler::CachedData::new(supplied);
            let mut source =
                v8::script_compiler::Source::new_with_cached_data(source_text, Some(&origin), cached);
            let module = v8::script_compiler::compile_module2(
                scope,
                &mut source,
                v8::script_compiler::CompileOptions::ConsumeCodeCache,
                v8::script_compiler::NoCacheReason::NoReason,
            )
            .or_pending()?;
            let rejected = source.get_cached_data().is_none_or(|data| data.rejected());
            (module, Some(!rejected))
        } else {
            let mut source = v8::script_compiler::Source::new(source_text, Some(&origin));
            let module = v8::script_compiler::compile_module(scope, &mut source).or_pending()?;
            (module, None)
        };

        let produce = kind == V8CacheKind::Produce || (consume && consumed != Some(true)) || (kind == V8CacheKind::Update && !consume);
        let produced = produce.then(|| module_code_cache(scope, module)).flatten();
        let outcome = cache_miss_outcome(kind, supplied, consumed, produced);

        let meta_holder = v8::Array::new(scope, 1);
        let artifact = ModuleArtifact {
            module: v8::Global::new(scope, module),
            meta_holder: v8::Global::new(scope, meta_holder),
        };
        self.cache_module(engine, document, key, artifact.clone(), outcome.store.clone());
        Ok((artifact, outcome))
    }

    fn cache_module(
        &self,
        engine: &Engine,
        document: &DocumentInfo,
        key: CacheKey,
        artifact: ModuleArtifact,
        bytes: Option<Vec<u8>>,
    ) {
        let mut entry = CacheEntry::new(document.clone(), key, artifact);
        entry.cache_bytes = bytes;
        let max_size = engine.core.host.max_module_cache_size();
        if !self.modules.borrow_mut().insert(entry, max_size) {
            tracing::debug!(document = document.resource_name(), "Module cache disabled by host");
        }
    }

    /// Document and artifact of a module compiled in this context, looked up
    /// in the cache first and then among modules held by the host.
    pub(crate) fn module_entry(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        module: v8::Local<'_, v8::Module>,
    ) -> Option<(DocumentInfo, ModuleArtifact)> {
        let mut candidates: Vec<(DocumentInfo, ModuleArtifact)> = self
            .modules
            .borrow()
            .iter()
            .map(|entry| (entry.document.clone(), entry.artifact.clone()))
            .collect();
        candidates.extend(engine.module_units(self.id));
        candidates
            .into_iter()
            .find(|(_, artifact)| v8::Local::new(scope, &artifact.module) == module)
    }

    /// Referrer lookup for dynamic imports: modules, then scripts.
    pub(crate) fn document_by_unique_id(&self, engine: &Engine, unique_id: u64) -> Option<DocumentInfo> {
        if let Some(entry) = self.modules.borrow().find_by_unique_id(unique_id) {
            return Some(entry.document.clone());
        }
        engine.document_by_unique_id(unique_id)
    }

    /// Loads `specifier` through the host and returns its module, compiling
    /// it or synthesizing one for JSON and text documents.
    pub(crate) fn resolve_module<'s>(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'s>,
        referrer: Option<&DocumentInfo>,
        specifier: &str,
    ) -> ScopeResult<v8::Local<'s, v8::Module>> {
        let loaded = engine
            .core
            .host
            .load_module(referrer, specifier)
            .map_err(host_error)?;
        let loaded = self.known_document(loaded);
        tracing::debug!(
            context = %self.config.name,
            specifier,
            document = loaded.document.resource_name(),
            kind = ?loaded.document.kind(),
            "Resolved module"
        );
        let artifact = match loaded.document.kind() {
            DocumentKind::Module | DocumentKind::Script => {
                self.compile_module(engine, scope, &loaded.document, &loaded.code, V8CacheKind::None, &[])?
                    .0
            }
            DocumentKind::Json | DocumentKind::Text => self.synthetic_module(engine, scope, &loaded)?,
        };
        Ok(v8::Local::new(scope, &artifact.module))
    }

    /// Swaps in the document of a module already compiled from the same
    /// resource and source, so a module shared by several importers keeps a
    /// single instance even when the host mints a fresh id per load.
    fn known_document(&self, loaded: LoadedModule) -> LoadedModule {
        let digest = code_digest(&loaded.code);
        let known = self
            .modules
            .borrow_mut()
            .find_document(&loaded.document, digest)
            .map(|entry| entry.document.clone());
        match known {
            Some(document) if document.unique_id() != loaded.document.unique_id() => {
                tracing::trace!(
                    document = document.resource_name(),
                    unique_id = document.unique_id(),
                    "Reusing module instance"
                );
                LoadedModule { document, ..loaded }
            }
            _ => loaded,
        }
    }

    fn synthetic_module(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        loaded: &LoadedModule,
    ) -> ScopeResult<ModuleArtifact> {
        let document = &loaded.document;
        let key = CacheKey::new(document, &loaded.code);
        if let Some(entry) = self.modules.borrow_mut().find(key) {
            return Ok(entry.artifact.clone());
        }

        let exports = self.synthetic_export_value(engine, scope, loaded)?;
        let mut values = Vec::new();
        match v8::Local::<v8::Object>::try_from(exports) {
            Ok(object) if document.kind() != DocumentKind::Json => {
                let names = object
                    .get_own_property_names(scope, v8::GetPropertyNamesArgs::default())
                    .or_pending()?;
                for index in 0..names.length() {
                    let name = names.get_index(scope, index).or_pending()?;
                    let value = object.get(scope, name).or_pending()?;
                    values.push((name.to_rust_string_lossy(scope), v8::Global::new(scope, value)));
                }
            }
            _ => values.push((DEFAULT_EXPORT.to_string(), v8::Global::new(scope, exports))),
        }

        let name = v8_string(scope, document.resource_name())?;
        let export_names = values
            .iter()
            .map(|(name, _)| v8_string(scope, name))
            .collect::<ScopeResult<Vec<_>>>()?;
        let module = v8::Module::create_synthetic_module(scope, name, &export_names, synthetic_steps);
        let meta_holder = v8::Array::new(scope, 1);
        let artifact = ModuleArtifact {
            module: v8::Global::new(scope, module),
            meta_holder: v8::Global::new(scope, meta_holder),
        };
        self.synthetic_exports.borrow_mut().push(SyntheticExports {
            module: artifact.module.clone(),
            exports: values,
        });
        self.cache_module(engine, document, key, artifact.clone(), None);
        Ok(artifact)
    }

    /// JSON documents parse their code unless the host supplied exports;
    /// text documents export their code as a string.
    fn synthetic_export_value<'s>(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'s>,
        loaded: &LoadedModule,
    ) -> ScopeResult<v8::Local<'s, v8::Value>> {
        if !loaded.exports.is_nonexistent() {
            return self.import_value(engine, scope, &loaded.exports);
        }
        let code = v8_string(scope, &loaded.code)?;
        match loaded.document.kind() {
            DocumentKind::Json => v8::json::parse(scope, code).or_pending(),
            _ => Ok(code.into()),
        }
    }

    fn take_synthetic_exports(
        &self,
        scope: &mut v8::HandleScope<'_>,
        module: v8::Local<'_, v8::Module>,
    ) -> Option<Vec<(String, v8::Global<v8::Value>)>> {
        let pending = std::mem::take(&mut *self.synthetic_exports.borrow_mut());
        let mut found = None;
        let mut remaining = Vec::with_capacity(pending.len());
        for entry in pending {
            if found.is_none() && v8::Local::new(scope, &entry.module) == module {
                found = Some(entry.exports);
            } else {
                remaining.push(entry);
            }
        }
        self.synthetic_exports.borrow_mut().extend(remaining);
        found
    }

    /// Instantiates and evaluates a module.
    ///
    /// A settled evaluation yields the module result published through
    /// `import.meta.setResult` when `evaluate` is set. Evaluation still
    /// pending after a microtask flush yields a promise for that result.
    pub(crate) fn evaluate_module(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'_>,
        artifact: &ModuleArtifact,
        evaluate: bool,
    ) -> ScopeResult<Value> {
        let module = v8::Local::new(scope, &artifact.module);
        if module.get_status() == v8::ModuleStatus::Uninstantiated {
            module
                .instantiate_module(scope, resolve_module_callback)
                .or_pending()?;
        }
        if module.get_status() == v8::ModuleStatus::Errored {
            let exception = module.get_exception();
            scope.throw_exception(exception);
            return Err(ScopeFailure::Pending);
        }

        engine.mark_execution_started();
        let result = module.evaluate(scope).or_pending()?;
        let Ok(promise) = v8::Local::<v8::Promise>::try_from(result) else {
            return Ok(if evaluate {
                self.export_value(engine, scope, result)
            } else {
                Value::Undefined
            });
        };

        if promise.state() == v8::PromiseState::Pending {
            scope.perform_microtask_checkpoint();
        }
        let holder = v8::Local::new(scope, &artifact.meta_holder);
        match promise.state() {
            v8::PromiseState::Rejected => {
                promise.mark_as_handled();
                let exception = promise.result(scope);
                scope.throw_exception(exception);
                Err(ScopeFailure::Pending)
            }
            v8::PromiseState::Fulfilled if evaluate => {
                let value = promise.result(scope);
                let value = if value.is_undefined() {
                    self.call_internal(scope, "readModuleResult", &[holder.into()])?
                } else {
                    value
                };
                Ok(self.export_value(engine, scope, value))
            }
            v8::PromiseState::Pending if evaluate => {
                let result = self.call_internal(scope, "getModuleResult", &[promise.into(), holder.into()])?;
                Ok(self.export_value(engine, scope, result))
            }
            _ => Ok(Value::Undefined),
        }
    }

    /// Populates `import.meta` with `setResult` and the host's pairs.
    fn initialize_import_meta<'a>(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'a>,
        module: v8::Local<'_, v8::Module>,
        meta: v8::Local<'a, v8::Object>,
    ) -> ScopeResult<()> {
        let Some((document, artifact)) = self.module_entry(engine, scope, module) else {
            return Ok(());
        };
        let holder = v8::Local::new(scope, &artifact.meta_holder);
        self.call_internal(scope, "initializeImportMeta", &[meta.into(), holder.into()])?;
        let pairs = engine
            .core
            .host
            .create_module_context(&document)
            .map_err(host_error)?;
        for (name, value) in pairs {
            let key = v8_string(scope, &name)?;
            let value = self.import_value(engine, scope, &value)?;
            meta.create_data_property(scope, key.into(), value).or_pending()?;
        }
        Ok(())
    }

    /// Resolves and evaluates a dynamically imported module, returning a
    /// promise for its namespace.
    fn import_dynamic<'s>(
        &self,
        engine: &Engine,
        scope: &mut v8::HandleScope<'s>,
        referrer: Option<&DocumentInfo>,
        specifier: &str,
    ) -> ScopeResult<v8::Local<'s, v8::Value>> {
        let module = self.resolve_module(engine, scope, referrer, specifier)?;
        if module.get_status() == v8::ModuleStatus::Uninstantiated {
            module
                .instantiate_module(scope, resolve_module_callback)
                .or_pending()?;
        }
        let evaluation: v8::Local<v8::Value> = match module.get_status() {
            v8::ModuleStatus::Errored => {
                let exception = module.get_exception();
                scope.throw_exception(exception);
                return Err(ScopeFailure::Pending);
            }
            v8::ModuleStatus::Evaluating => v8::undefined(scope).into(),
            _ => module.evaluate(scope).or_pending()?,
        };
        let namespace = module.get_module_namespace();
        self.call_internal(scope, "awaitNamespace", &[evaluation, namespace])
    }
}

fn resolve_module_callback<'a>(
    context: v8::Local<'a, v8::Context>,
    specifier: v8::Local<'a, v8::String>,
    _import_attributes: v8::Local<'a, v8::FixedArray>,
    referrer: v8::Local<'a, v8::Module>,
) -> Option<v8::Local<'a, v8::Module>> {
    // SAFETY: the engine is inside module instantiation for `context`
    let scope = &mut unsafe { v8::CallbackScope::new(context) };
    let engine = Engine::current()?;
    let owner = engine.context_for(scope, context)?;
    let referrer = owner.module_entry(&engine, scope, referrer).map(|(document, _)| document);
    let specifier = specifier.to_rust_string_lossy(scope);
    match owner.resolve_module(&engine, scope, referrer.as_ref(), &specifier) {
        Ok(module) => Some(module),
        Err(failure) => {
            owner.throw_failure(scope, failure);
            None
        }
    }
}

fn synthetic_steps<'a>(
    context: v8::Local<'a, v8::Context>,
    module: v8::Local<'a, v8::Module>,
) -> Option<v8::Local<'a, v8::Value>> {
    // SAFETY: the engine is evaluating `module` in `context`
    let scope = &mut unsafe { v8::CallbackScope::new(context) };
    let engine = Engine::current()?;
    let owner = engine.context_for(scope, context)?;
    for (name, value) in owner.take_synthetic_exports(scope, module).unwrap_or_default() {
        let name = v8::String::new(scope, &name)?;
        let value = v8::Local::new(scope, value);
        module.set_synthetic_module_export(scope, name, value)?;
    }
    let resolver = v8::PromiseResolver::new(scope)?;
    let undefined = v8::undefined(scope);
    resolver.resolve(scope, undefined.into())?;
    Some(resolver.get_promise(scope).into())
}

pub(crate) extern "C" fn import_meta_callback(
    context: v8::Local<v8::Context>,
    module: v8::Local<v8::Module>,
    meta: v8::Local<v8::Object>,
) {
    // SAFETY: the engine is initializing `import.meta` in `context`
    let scope = &mut unsafe { v8::CallbackScope::new(context) };
    let Some(engine) = Engine::current() else {
        return;
    };
    let Some(owner) = engine.context_for(scope, context) else {
        return;
    };
    if let Err(failure) = owner.initialize_import_meta(&engine, scope, module, meta) {
        owner.throw_failure(scope, failure);
    }
}

pub(crate) fn dynamic_import_callback<'s>(
    scope: &mut v8::HandleScope<'s>,
    host_defined_options: v8::Local<'s, v8::Data>,
    _resource_name: v8::Local<'s, v8::Value>,
    specifier: v8::Local<'s, v8::String>,
    _import_attributes: v8::Local<'s, v8::FixedArray>,
) -> Option<v8::Local<'s, v8::Promise>> {
    let engine = Engine::current()?;
    let current = scope.get_current_context();
    let owner = engine.context_for(scope, current)?;
    let resolver = v8::PromiseResolver::new(scope)?;
    let promise = resolver.get_promise(scope);

    let specifier = specifier.to_rust_string_lossy(scope);
    let referrer = unique_id_from_options(scope, host_defined_options)
        .and_then(|unique_id| owner.document_by_unique_id(&engine, unique_id));
    if referrer.is_none() {
        tracing::debug!(specifier, "Dynamic import without a known referrer");
    }

    let tc = &mut v8::TryCatch::new(scope);
    // The callback is isolate-wide once any context asks for it; each
    // context still only serves imports it was configured for.
    let enabled = owner.config.enable_dynamic_module_imports || engine.core.config.enable_dynamic_module_imports;
    let outcome = if enabled {
        owner.import_dynamic(&engine, tc, referrer.as_ref(), &specifier)
    } else {
        Err(ScopeFailure::Host(V8Exception::general(
            "Dynamic module import is not enabled",
        )))
    };
    match outcome {
        Ok(namespace) => {
            resolver.resolve(tc, namespace)?;
        }
        Err(failure) => {
            owner.throw_failure(tc, failure);
            if tc.has_terminated() {
                return None;
            }
            let exception = tc
                .exception()
                .unwrap_or_else(|| v8::undefined(tc).into());
            tc.reset();
            resolver.reject(tc, exception)?;
        }
    }
    Some(promise)
}
