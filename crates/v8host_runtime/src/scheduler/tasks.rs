use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};

use super::{LockCallback, TaskKind};

/// A one-shot body shared between its queue entry and the isolate's pending
/// list. Whoever runs it first wins.
pub(crate) struct WorkerTask {
    kind: TaskKind,
    body: Mutex<Option<LockCallback>>,
}

impl WorkerTask {
    pub(crate) fn new(kind: TaskKind, body: LockCallback) -> Arc<Self> {
        Arc::new(Self {
            kind,
            body: Mutex::new(Some(body)),
        })
    }

    pub(crate) fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Returns false if the body already ran.
    pub(crate) fn run(&self) -> bool {
        let body = self.body.lock().take();
        match body {
            Some(body) => {
                body();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.body.lock().is_none()
    }
}

/// Shared runtime driving delayed-task timers for every isolate.
pub(crate) fn timer_runtime() -> std::io::Result<&'static Runtime> {
    static RUNTIME: OnceCell<Runtime> = OnceCell::new();
    RUNTIME.get_or_try_init(|| {
        Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("v8host-timer")
            .enable_time()
            .build()
    })
}
