use std::any::Any;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-wide document id; ids are never reused.
pub fn next_unique_id() -> u64 {
    NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed)
}

/// 64-bit digest of source text distinguishing recompiles of one document.
pub fn code_digest(code: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    code.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Script,
    Module,
    Json,
    Text,
}

struct DocumentData {
    resource_name: String,
    source_map_url: Option<String>,
    unique_id: u64,
    kind: DocumentKind,
    host_document: Option<Arc<dyn Any + Send + Sync>>,
}

/// Immutable descriptor of a source unit. Cheap to clone.
#[derive(Clone)]
pub struct DocumentInfo(Arc<DocumentData>);

impl DocumentInfo {
    pub fn new(resource_name: impl Into<String>, kind: DocumentKind) -> Self {
        Self(Arc::new(DocumentData {
            resource_name: resource_name.into(),
            source_map_url: None,
            unique_id: next_unique_id(),
            kind,
            host_document: None,
        }))
    }

    pub fn script(resource_name: impl Into<String>) -> Self {
        Self::new(resource_name, DocumentKind::Script)
    }

    pub fn module(resource_name: impl Into<String>) -> Self {
        Self::new(resource_name, DocumentKind::Module)
    }

    #[must_use]
    pub fn with_source_map_url(self, url: impl Into<String>) -> Self {
        self.rebuild(|data| data.source_map_url = Some(url.into()))
    }

    /// Attaches the host's own document object, returned untouched by
    /// [`DocumentInfo::host_document`].
    #[must_use]
    pub fn with_host_document(self, document: impl Any + Send + Sync) -> Self {
        self.rebuild(|data| data.host_document = Some(Arc::new(document)))
    }

    /// Replaces the generated id, for hosts that track their own.
    #[must_use]
    pub fn with_unique_id(self, unique_id: u64) -> Self {
        self.rebuild(|data| data.unique_id = unique_id)
    }

    pub fn resource_name(&self) -> &str {
        &self.0.resource_name
    }

    pub fn source_map_url(&self) -> Option<&str> {
        self.0.source_map_url.as_deref()
    }

    pub fn unique_id(&self) -> u64 {
        self.0.unique_id
    }

    pub fn kind(&self) -> DocumentKind {
        self.0.kind
    }

    pub fn is_module(&self) -> bool {
        self.0.kind == DocumentKind::Module
    }

    pub fn host_document<T: Any>(&self) -> Option<&T> {
        self.0.host_document.as_deref().and_then(|d| d.downcast_ref::<T>())
    }

    fn rebuild(self, apply: impl FnOnce(&mut DocumentData)) -> Self {
        let mut data = DocumentData {
            resource_name: self.0.resource_name.clone(),
            source_map_url: self.0.source_map_url.clone(),
            unique_id: self.0.unique_id,
            kind: self.0.kind,
            host_document: self.0.host_document.clone(),
        };
        apply(&mut data);
        Self(Arc::new(data))
    }
}

impl fmt::Debug for DocumentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentInfo")
            .field("resource_name", &self.0.resource_name)
            .field("unique_id", &self.0.unique_id)
            .field("kind", &self.0.kind)
            .finish_non_exhaustive()
    }
}
