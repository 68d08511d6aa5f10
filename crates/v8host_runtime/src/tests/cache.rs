use crate::cache::{
    CacheEntry, CacheKey, CompiledCache, V8CacheKind, V8CacheResult, cache_hit_outcome,
    cache_miss_outcome, reconcile_cache_bytes,
};
use crate::document::{DocumentInfo, code_digest};

fn entry(document: &DocumentInfo, code: &str) -> CacheEntry<String> {
    CacheEntry::new(document.clone(), CacheKey::new(document, code), code.to_string())
}

#[test]
fn test_cache_keeps_most_recent_entries() {
    let mut cache = CompiledCache::default();
    let documents: Vec<_> = (0..5).map(|i| DocumentInfo::script(format!("doc{i}.js"))).collect();
    for document in &documents {
        assert!(cache.insert(entry(document, "1 + 1"), 3));
        assert!(cache.len() <= 3);
    }

    let resident: Vec<_> = cache.keys().collect();
    let expected: Vec<_> = documents[2..]
        .iter()
        .rev()
        .map(|document| CacheKey::new(document, "1 + 1"))
        .collect();
    assert_eq!(resident, expected);
}

#[test]
fn test_cache_find_refreshes_recency() {
    let mut cache = CompiledCache::default();
    let a = DocumentInfo::script("a.js");
    let b = DocumentInfo::script("b.js");
    let c = DocumentInfo::script("c.js");
    cache.insert(entry(&a, "a"), 2);
    cache.insert(entry(&b, "b"), 2);

    assert!(cache.find(CacheKey::new(&a, "a")).is_some());
    cache.insert(entry(&c, "c"), 2);

    assert!(cache.find(CacheKey::new(&a, "a")).is_some());
    assert!(cache.find(CacheKey::new(&b, "b")).is_none());
}

#[test]
fn test_cache_distinguishes_code_of_same_document() {
    let mut cache = CompiledCache::default();
    let document = DocumentInfo::script("same.js");
    cache.insert(entry(&document, "1"), 8);
    cache.insert(entry(&document, "2"), 8);

    assert_eq!(cache.len(), 2);
    assert_eq!(
        cache.find(CacheKey::new(&document, "2")).map(|e| e.artifact.clone()),
        Some("2".to_string())
    );
}

#[test]
fn test_zero_max_size_disables_cache() {
    let mut cache = CompiledCache::default();
    let document = DocumentInfo::script("a.js");
    cache.insert(entry(&document, "a"), 4);

    assert!(!cache.insert(entry(&DocumentInfo::script("b.js"), "b"), 0));
    assert!(cache.is_empty());
}

#[test]
fn test_find_by_unique_id() {
    let mut cache = CompiledCache::default();
    let document = DocumentInfo::module("lib.mjs");
    cache.insert(entry(&document, "export {}"), 4);

    let found = cache.find_by_unique_id(document.unique_id());
    assert_eq!(found.map(|e| e.document.resource_name()), Some("lib.mjs"));
    assert!(cache.find_by_unique_id(document.unique_id() + 1_000_000).is_none());
}

#[test]
fn test_find_document_matches_name_and_code_across_ids() {
    let mut cache = CompiledCache::default();
    let first = DocumentInfo::module("shared.mjs");
    cache.insert(entry(&first, "export const x = 1;"), 4);
    cache.insert(entry(&DocumentInfo::module("other.mjs"), "export {}"), 4);

    let reloaded = DocumentInfo::module("shared.mjs");
    assert_ne!(reloaded.unique_id(), first.unique_id());
    let found = cache
        .find_document(&reloaded, code_digest("export const x = 1;"))
        .map(|e| e.document.unique_id());
    assert_eq!(found, Some(first.unique_id()));
    assert_eq!(cache.keys().next(), Some(CacheKey::new(&first, "export const x = 1;")));

    assert!(cache.find_document(&reloaded, code_digest("export const x = 2;")).is_none());
    assert!(cache.find_document(&DocumentInfo::script("shared.mjs"), code_digest("export const x = 1;")).is_none());
}

#[test]
fn test_reconcile_cache_bytes() {
    assert_eq!(
        reconcile_cache_bytes(Some(&[1, 2, 3]), Some(&[1, 2, 3])),
        (V8CacheResult::Verified, None)
    );
    assert_eq!(
        reconcile_cache_bytes(Some(&[1, 2, 4]), Some(&[1, 2, 3])),
        (V8CacheResult::Updated, Some(vec![1, 2, 3]))
    );
    assert_eq!(
        reconcile_cache_bytes(None, Some(&[9])),
        (V8CacheResult::Updated, Some(vec![9]))
    );
    assert_eq!(reconcile_cache_bytes(Some(&[1]), None), (V8CacheResult::UpdateFailed, None));
}

#[test]
fn test_cache_miss_outcomes() {
    let produced = Some(vec![7, 7, 7]);

    let disabled = cache_miss_outcome(V8CacheKind::None, &[], None, None);
    assert_eq!(disabled.result, V8CacheResult::Disabled);

    let update = cache_miss_outcome(V8CacheKind::Update, &[], None, produced.clone());
    assert_eq!(update.result, V8CacheResult::Updated);
    assert_eq!(update.returned, produced);
    assert_eq!(update.store, produced);

    let verified = cache_miss_outcome(V8CacheKind::Update, &[1], Some(true), None);
    assert_eq!(verified.result, V8CacheResult::Verified);
    assert_eq!(verified.store, Some(vec![1]));
    assert!(verified.returned.is_none());

    let accepted = cache_miss_outcome(V8CacheKind::Consume, &[1], Some(true), None);
    assert_eq!(accepted.result, V8CacheResult::Accepted);

    let rejected = cache_miss_outcome(V8CacheKind::Consume, &[1], Some(false), None);
    assert_eq!(rejected.result, V8CacheResult::UpdateFailed);

    let empty = cache_miss_outcome(V8CacheKind::Produce, &[], None, Some(Vec::new()));
    assert_eq!(empty.result, V8CacheResult::UpdateFailed);
}

#[test]
fn test_cache_hit_outcomes() {
    let stored = [4u8, 5, 6];

    let produce = cache_hit_outcome(V8CacheKind::Produce, &[], Some(&stored));
    assert_eq!(produce.result, V8CacheResult::Updated);
    assert_eq!(produce.returned.as_deref(), Some(&stored[..]));

    let consume = cache_hit_outcome(V8CacheKind::Consume, &[1], Some(&stored));
    assert_eq!(consume.result, V8CacheResult::Accepted);

    let verified = cache_hit_outcome(V8CacheKind::Update, &stored, Some(&stored));
    assert_eq!(verified.result, V8CacheResult::Verified);

    let mutated = cache_hit_outcome(V8CacheKind::Update, &[4, 5, 7], Some(&stored));
    assert_eq!(mutated.result, V8CacheResult::Updated);
    assert_eq!(mutated.returned.as_deref(), Some(&stored[..]));
}
