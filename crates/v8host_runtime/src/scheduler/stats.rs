use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Worker,
    DelayedWorker,
    Foreground,
    NonNestableForeground,
    DelayedForeground,
    NonNestableDelayedForeground,
}

impl TaskKind {
    pub const ALL: [Self; 6] = [
        Self::Worker,
        Self::DelayedWorker,
        Self::Foreground,
        Self::NonNestableForeground,
        Self::DelayedForeground,
        Self::NonNestableDelayedForeground,
    ];

    pub fn foreground(allow_nesting: bool, delayed: bool) -> Self {
        match (allow_nesting, delayed) {
            (true, false) => Self::Foreground,
            (false, false) => Self::NonNestableForeground,
            (true, true) => Self::DelayedForeground,
            (false, true) => Self::NonNestableDelayedForeground,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCount {
    pub posted: u64,
    pub invoked: u64,
}

#[derive(Debug, Default)]
pub(crate) struct TaskCounters {
    posted: [AtomicU64; 6],
    invoked: [AtomicU64; 6],
}

impl TaskCounters {
    pub(crate) fn posted(&self, kind: TaskKind) {
        self.posted[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invoked(&self, kind: TaskKind) {
        self.invoked[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, kind: TaskKind) -> TaskCount {
        TaskCount {
            posted: self.posted[kind.index()].load(Ordering::Relaxed),
            invoked: self.invoked[kind.index()].load(Ordering::Relaxed),
        }
    }
}
