use bitflags::bitflags;

bitflags! {
    /// Isolate options passed to `V8Isolate_Create`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct IsolateFlags: u32 {
        const ENABLE_DEBUGGING = 1;
        const ENABLE_REMOTE_DEBUGGING = 1 << 1;
        const ENABLE_DYNAMIC_MODULE_IMPORTS = 1 << 2;
        const DISABLE_HEAP_SIZE_VIOLATION_INTERRUPT = 1 << 3;
    }
}

bitflags! {
    /// Context options passed to `V8Isolate_CreateContext`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct ContextFlags: u32 {
        const ENABLE_DEBUGGING = 1;
        const ENABLE_DYNAMIC_MODULE_IMPORTS = 1 << 1;
        const ENABLE_DATE_TIME_CONVERSION = 1 << 2;
        const HIDE_HOST_EXCEPTIONS = 1 << 3;
        const ENABLE_INTERRUPT_PROPAGATION = 1 << 4;
        const ENABLE_TASK_PROMISE_CONVERSION = 1 << 5;
    }
}
