use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::context::modules::ModuleArtifact;
use crate::document::DocumentInfo;
use crate::isolate::core::IsolateCore;

/// Engine-side artifact behind a [`V8Script`].
#[derive(Clone)]
pub(crate) enum CompiledUnit {
    /// Context-independent; bound to the executing context on each run
    Script {
        document: DocumentInfo,
        script: v8::Global<v8::UnboundScript>,
    },
    /// Only runnable in the context that compiled it
    Module {
        document: DocumentInfo,
        context_id: u64,
        artifact: ModuleArtifact,
    },
}

impl CompiledUnit {
    pub(crate) fn context_id(&self) -> Option<u64> {
        match self {
            Self::Script { .. } => None,
            Self::Module { context_id, .. } => Some(*context_id),
        }
    }
}

struct ScriptEntry {
    owner: Weak<IsolateCore>,
    id: u64,
    document: DocumentInfo,
    released: AtomicBool,
}

impl ScriptEntry {
    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(core) = self.owner.upgrade() {
            core.release_compiled(self.id);
        }
    }
}

impl Drop for ScriptEntry {
    fn drop(&mut self) {
        self.release();
    }
}

/// A compiled script or module that can be executed repeatedly.
#[derive(Clone)]
pub struct V8Script(Arc<ScriptEntry>);

impl V8Script {
    pub(crate) fn new(owner: Weak<IsolateCore>, id: u64, document: DocumentInfo) -> Self {
        Self(Arc::new(ScriptEntry {
            owner,
            id,
            document,
            released: AtomicBool::new(false),
        }))
    }

    pub fn document(&self) -> &DocumentInfo {
        &self.0.document
    }

    pub fn is_released(&self) -> bool {
        self.0.released.load(Ordering::Acquire)
    }

    pub fn release(&self) {
        self.0.release();
    }

    pub(crate) fn id(&self) -> u64 {
        self.0.id
    }

    pub(crate) fn belongs_to(&self, core: &Arc<IsolateCore>) -> bool {
        std::ptr::eq(self.0.owner.as_ptr(), Arc::as_ptr(core))
    }
}

impl fmt::Debug for V8Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("V8Script")
            .field("document", &self.0.document)
            .field("released", &self.is_released())
            .finish()
    }
}
