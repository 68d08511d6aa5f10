use std::collections::VecDeque;

use crate::document::{DocumentInfo, code_digest};

/// Code cache handling requested for a compile call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V8CacheKind {
    None,
    /// Compile and return engine cache bytes
    Produce,
    /// Compile with caller bytes as a hint
    Consume,
    /// Reconcile caller bytes with the cached entry
    Update,
}

/// Outcome of a compile call with respect to the caller's cache bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V8CacheResult {
    Disabled,
    Accepted,
    Verified,
    Updated,
    UpdateFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub unique_id: u64,
    pub code_digest: u64,
}

impl CacheKey {
    pub fn new(document: &DocumentInfo, code: &str) -> Self {
        Self {
            unique_id: document.unique_id(),
            code_digest: code_digest(code),
        }
    }
}

pub(crate) struct CacheEntry<T> {
    pub(crate) document: DocumentInfo,
    pub(crate) key: CacheKey,
    pub(crate) artifact: T,
    pub(crate) cache_bytes: Option<Vec<u8>>,
}

impl<T> CacheEntry<T> {
    pub(crate) fn new(document: DocumentInfo, key: CacheKey, artifact: T) -> Self {
        Self {
            document,
            key,
            artifact,
            cache_bytes: None,
        }
    }
}

/// Most-recently-used-first list of compiled artifacts.
///
/// Lookups are linear. Evicted artifacts are dropped immediately, which for
/// engine handles releases the compiled code.
pub(crate) struct CompiledCache<T> {
    entries: VecDeque<CacheEntry<T>>,
}

impl<T> Default for CompiledCache<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<T> CompiledCache<T> {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds an entry and moves it to the front.
    pub(crate) fn find(&mut self, key: CacheKey) -> Option<&mut CacheEntry<T>> {
        let position = self.entries.iter().position(|entry| entry.key == key)?;
        if position > 0 {
            let entry = self.entries.remove(position)?;
            self.entries.push_front(entry);
        }
        self.entries.front_mut()
    }

    /// Finds an entry without touching the recency order.
    pub(crate) fn peek_where(&self, predicate: impl Fn(&CacheEntry<T>) -> bool) -> Option<&CacheEntry<T>> {
        self.entries.iter().find(|entry| predicate(entry))
    }

    /// Finds an entry compiled from the same resource and source text under
    /// any unique id and moves it to the front.
    pub(crate) fn find_document(&mut self, document: &DocumentInfo, code_digest: u64) -> Option<&mut CacheEntry<T>> {
        let position = self.entries.iter().position(|entry| {
            entry.key.code_digest == code_digest
                && entry.document.kind() == document.kind()
                && entry.document.resource_name() == document.resource_name()
        })?;
        if position > 0 {
            let entry = self.entries.remove(position)?;
            self.entries.push_front(entry);
        }
        self.entries.front_mut()
    }

    pub(crate) fn find_by_unique_id(&self, unique_id: u64) -> Option<&CacheEntry<T>> {
        self.peek_where(|entry| entry.key.unique_id == unique_id)
    }

    /// Inserts at the front, evicting from the tail so the cache never holds
    /// more than `max_size` entries. A zero `max_size` disables caching.
    /// Returns false when the entry was not retained.
    pub(crate) fn insert(&mut self, entry: CacheEntry<T>, max_size: usize) -> bool {
        if let Some(position) = self.entries.iter().position(|e| e.key == entry.key) {
            self.entries.remove(position);
        }
        self.trim(max_size.saturating_sub(1));
        if max_size == 0 {
            return false;
        }
        self.entries.push_front(entry);
        true
    }

    /// Evicts from the tail until at most `max_size` entries remain.
    pub(crate) fn trim(&mut self, max_size: usize) {
        while self.entries.len() > max_size {
            if let Some(evicted) = self.entries.pop_back() {
                tracing::trace!(
                    document = evicted.document.resource_name(),
                    "Evicting compiled artifact"
                );
            }
        }
    }

    pub(crate) fn set_cache_bytes(&mut self, key: CacheKey, bytes: Vec<u8>) -> bool {
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                entry.cache_bytes = Some(bytes);
                true
            }
            None => false,
        }
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = CacheKey> + '_ {
        self.entries.iter().map(|entry| entry.key)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &CacheEntry<T>> {
        self.entries.iter()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Reconciles caller-supplied bytes against the cached entry's bytes when
/// updating a cache. Returns the result and the bytes to hand back.
pub(crate) fn reconcile_cache_bytes(
    supplied: Option<&[u8]>,
    cached: Option<&[u8]>,
) -> (V8CacheResult, Option<Vec<u8>>) {
    let Some(cached) = cached else {
        return (V8CacheResult::UpdateFailed, None);
    };
    match supplied {
        Some(supplied) if !supplied.is_empty() && supplied == cached => {
            (V8CacheResult::Verified, None)
        }
        _ => (V8CacheResult::Updated, Some(cached.to_vec())),
    }
}

/// What a compile call reports and which code-cache bytes it hands back or
/// keeps with the cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CacheOutcome {
    pub(crate) result: V8CacheResult,
    pub(crate) returned: Option<Vec<u8>>,
    pub(crate) store: Option<Vec<u8>>,
}

impl CacheOutcome {
    fn new(result: V8CacheResult) -> Self {
        Self {
            result,
            returned: None,
            store: None,
        }
    }
}

/// Whether a cache hit of `kind` needs engine bytes on the entry first.
pub(crate) fn needs_code_cache(kind: V8CacheKind) -> bool {
    matches!(kind, V8CacheKind::Produce | V8CacheKind::Update)
}

/// Outcome when the artifact came from the cache. `stored` are the bytes
/// kept with the entry.
pub(crate) fn cache_hit_outcome(kind: V8CacheKind, supplied: &[u8], stored: Option<&[u8]>) -> CacheOutcome {
    match kind {
        V8CacheKind::None => CacheOutcome::new(V8CacheResult::Disabled),
        V8CacheKind::Produce => match stored {
            Some(stored) if !stored.is_empty() => CacheOutcome {
                returned: Some(stored.to_vec()),
                ..CacheOutcome::new(V8CacheResult::Updated)
            },
            _ => CacheOutcome::new(V8CacheResult::UpdateFailed),
        },
        V8CacheKind::Consume => CacheOutcome::new(V8CacheResult::Accepted),
        V8CacheKind::Update => {
            let supplied = (!supplied.is_empty()).then_some(supplied);
            let (result, returned) = reconcile_cache_bytes(supplied, stored);
            CacheOutcome {
                returned,
                ..CacheOutcome::new(result)
            }
        }
    }
}

/// Outcome of a fresh compile. `consumed` is the engine's verdict on the
/// supplied bytes when it was offered them; `produced` are bytes the engine
/// generated for the new artifact.
pub(crate) fn cache_miss_outcome(
    kind: V8CacheKind,
    supplied: &[u8],
    consumed: Option<bool>,
    produced: Option<Vec<u8>>,
) -> CacheOutcome {
    let produced = produced.filter(|bytes| !bytes.is_empty());
    match (kind, consumed) {
        (V8CacheKind::None, _) => CacheOutcome::new(V8CacheResult::Disabled),
        (V8CacheKind::Consume, Some(true)) => CacheOutcome {
            store: Some(supplied.to_vec()),
            ..CacheOutcome::new(V8CacheResult::Accepted)
        },
        (V8CacheKind::Update, Some(true)) => CacheOutcome {
            store: Some(supplied.to_vec()),
            ..CacheOutcome::new(V8CacheResult::Verified)
        },
        (_, _) => match produced {
            Some(bytes) => CacheOutcome {
                result: V8CacheResult::Updated,
                returned: Some(bytes.clone()),
                store: Some(bytes),
            },
            None => CacheOutcome::new(V8CacheResult::UpdateFailed),
        },
    }
}
