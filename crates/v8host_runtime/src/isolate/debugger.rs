use std::cell::{Cell, RefCell, UnsafeCell};
use std::fmt;
use std::sync::{Arc, Weak};

use v8::inspector::{
    ChannelBase, ChannelImpl, StringBuffer, StringView, V8Inspector, V8InspectorClientBase,
    V8InspectorClientImpl, V8InspectorClientTrustLevel, V8InspectorSession,
};
use v8::{UniquePtr, UniqueRef};

use super::core::IsolateCore;
use super::engine::Engine;
use crate::host::DebugAgent;
use crate::scheduler::{ExitMessageLoopReason, RunMessageLoopReason};

const CONTEXT_GROUP_ID: i32 = 1;

/// Handed to the host's debug agent so it can drive the inspector session.
///
/// Every directive is posted to the isolate as a nestable task, so it is
/// served even while script is paused in the debugger.
#[derive(Clone)]
pub struct DebugCallback {
    core: Weak<IsolateCore>,
}

impl DebugCallback {
    pub(crate) fn new(core: Weak<IsolateCore>) -> Self {
        Self { core }
    }

    pub fn connect_client(&self) {
        self.post(DebugDirective::Connect);
    }

    /// Forwards one protocol message from the front-end.
    pub fn send_command(&self, message: impl Into<String>) {
        self.post(DebugDirective::Command(message.into()));
    }

    pub fn disconnect_client(&self) {
        self.post(DebugDirective::Disconnect);
    }

    /// False once the isolate is gone.
    pub fn is_alive(&self) -> bool {
        self.core.upgrade().is_some_and(|core| !core.is_released())
    }

    fn post(&self, directive: DebugDirective) {
        let Some(core) = self.core.upgrade() else {
            tracing::debug!("Dropping debugger directive for a released isolate");
            return;
        };
        core.enqueue(
            true,
            Box::new(move || {
                if let Some(engine) = Engine::current() {
                    engine.on_debug_directive(directive);
                }
            }),
        );
    }
}

impl fmt::Debug for DebugCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugCallback")
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[derive(Debug)]
pub(crate) enum DebugDirective {
    Connect,
    Command(String),
    Disconnect,
}

struct InspectorClient {
    base: V8InspectorClientBase,
    core: Weak<IsolateCore>,
}

impl InspectorClient {
    fn new(core: Weak<IsolateCore>) -> Box<Self> {
        Box::new(Self {
            base: V8InspectorClientBase::new::<Self>(),
            core,
        })
    }
}

impl V8InspectorClientImpl for InspectorClient {
    fn base(&self) -> &V8InspectorClientBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut V8InspectorClientBase {
        &mut self.base
    }

    unsafe fn base_ptr(this: *const Self) -> *const V8InspectorClientBase
    where
        Self: Sized,
    {
        // SAFETY: `this` points at a live client
        unsafe { std::ptr::addr_of!((*this).base) }
    }

    fn run_message_loop_on_pause(&mut self, _context_group_id: i32) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        let exit = core
            .scheduler
            .run_message_loop(RunMessageLoopReason::PausedInDebugger);
        tracing::debug!(?exit, "Debugger pause ended");
    }

    fn quit_message_loop_on_pause(&mut self) {
        if let Some(core) = self.core.upgrade() {
            core.scheduler
                .exit_message_loop(ExitMessageLoopReason::ResumedExecution);
        }
    }

    fn run_if_waiting_for_debugger(&mut self, _context_group_id: i32) {
        if let Some(core) = self.core.upgrade()
            && core.scheduler.message_loop_reason() == Some(RunMessageLoopReason::AwaitingDebugger)
        {
            core.scheduler
                .exit_message_loop(ExitMessageLoopReason::ResumedExecution);
        }
    }
}

struct InspectorChannel {
    base: ChannelBase,
    agent: Arc<dyn DebugAgent>,
}

impl InspectorChannel {
    fn new(agent: Arc<dyn DebugAgent>) -> Box<Self> {
        Box::new(Self {
            base: ChannelBase::new::<Self>(),
            agent,
        })
    }

    fn forward(&self, mut message: UniquePtr<StringBuffer>) {
        if let Some(buffer) = message.as_mut() {
            self.agent.send_message(&buffer.string().to_string());
        }
    }
}

impl ChannelImpl for InspectorChannel {
    fn base(&self) -> &ChannelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ChannelBase {
        &mut self.base
    }

    unsafe fn base_ptr(this: *const Self) -> *const ChannelBase
    where
        Self: Sized,
    {
        // SAFETY: `this` points at a live channel
        unsafe { std::ptr::addr_of!((*this).base) }
    }

    fn send_response(&mut self, _call_id: i32, message: UniquePtr<StringBuffer>) {
        self.forward(message);
    }

    fn send_notification(&mut self, message: UniquePtr<StringBuffer>) {
        self.forward(message);
    }

    fn flush_protocol_notifications(&mut self) {}
}

// Field order is drop order: the session goes before its channel.
struct Session {
    v8_session: UniqueRef<V8InspectorSession>,
    _channel: Box<InspectorChannel>,
}

/// Inspector bound to one isolate with at most one client session.
///
/// Protocol dispatch re-enters the engine (a pause runs a nested message
/// loop that dispatches more commands), so the session is reached through a
/// raw pointer and a disconnect requested mid-dispatch is deferred until the
/// outermost dispatch returns.
pub(crate) struct Inspector {
    session: RefCell<Option<Box<Session>>>,
    v8_inspector: UnsafeCell<UniqueRef<V8Inspector>>,
    _client: Box<InspectorClient>,
    agent: RefCell<Option<Arc<dyn DebugAgent>>>,
    dispatch_depth: Cell<usize>,
    disconnect_pending: Cell<bool>,
}

impl Inspector {
    pub(crate) fn new(isolate: &mut v8::Isolate, core: Weak<IsolateCore>) -> Box<Self> {
        let mut client = InspectorClient::new(core);
        let v8_inspector = V8Inspector::create(isolate, &mut *client);
        Box::new(Self {
            session: RefCell::new(None),
            v8_inspector: UnsafeCell::new(v8_inspector),
            _client: client,
            agent: RefCell::new(None),
            dispatch_depth: Cell::new(0),
            disconnect_pending: Cell::new(false),
        })
    }

    #[allow(clippy::mut_from_ref)]
    fn v8_inspector(&self) -> &mut V8Inspector {
        // SAFETY: engine-thread only, and no caller keeps the borrow across
        // a call that could re-enter the inspector
        unsafe { &mut *self.v8_inspector.get() }
    }

    pub(crate) fn set_agent(&self, agent: Arc<dyn DebugAgent>) {
        *self.agent.borrow_mut() = Some(agent);
    }

    pub(crate) fn context_created(&self, context: v8::Local<'_, v8::Context>, name: &str, is_default: bool) {
        let aux_data = serde_json::json!({ "isDefault": is_default }).to_string();
        self.v8_inspector().context_created(
            context,
            CONTEXT_GROUP_ID,
            StringView::from(name.as_bytes()),
            StringView::from(aux_data.as_bytes()),
        );
    }

    pub(crate) fn context_destroyed(&self, context: v8::Local<'_, v8::Context>) {
        self.v8_inspector().context_destroyed(context);
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.session.borrow().is_some()
    }

    /// Opens a session for the attached agent. False if one is already open
    /// or there is no agent.
    pub(crate) fn connect(&self) -> bool {
        if self.is_connected() {
            return false;
        }
        let Some(agent) = self.agent.borrow().clone() else {
            return false;
        };
        self.disconnect_pending.set(false);
        let mut channel = InspectorChannel::new(agent);
        let v8_session = self.v8_inspector().connect(
            CONTEXT_GROUP_ID,
            &mut *channel,
            StringView::empty(),
            V8InspectorClientTrustLevel::FullyTrusted,
        );
        *self.session.borrow_mut() = Some(Box::new(Session {
            v8_session,
            _channel: channel,
        }));
        true
    }

    fn session_ptr(&self) -> Option<*mut Session> {
        self.session
            .borrow_mut()
            .as_mut()
            .map(|session| &mut **session as *mut Session)
    }

    pub(crate) fn dispatch(&self, message: &str) {
        let Some(session) = self.session_ptr() else {
            tracing::debug!("Dropping debugger command without a session");
            return;
        };
        self.dispatch_depth.set(self.dispatch_depth.get() + 1);
        // SAFETY: the session box is only dropped by disconnect, which is
        // deferred while any dispatch is in progress
        unsafe {
            (*session)
                .v8_session
                .dispatch_protocol_message(StringView::from(message.as_bytes()));
        }
        let depth = self.dispatch_depth.get() - 1;
        self.dispatch_depth.set(depth);
        if depth == 0 && self.disconnect_pending.replace(false) {
            self.session.borrow_mut().take();
        }
    }

    pub(crate) fn disconnect(&self) {
        if self.dispatch_depth.get() > 0 {
            self.disconnect_pending.set(true);
            return;
        }
        self.session.borrow_mut().take();
    }

    pub(crate) fn schedule_pause(&self) {
        let Some(session) = self.session_ptr() else {
            return;
        };
        // SAFETY: as in dispatch
        unsafe {
            (*session).v8_session.schedule_pause_on_next_statement(
                StringView::from(&b"Break on start"[..]),
                StringView::empty(),
            );
        }
    }
}
