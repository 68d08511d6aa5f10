use super::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMessageLoopReason {
    AwaitingDebugger,
    PausedInDebugger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitMessageLoopReason {
    ResumedExecution,
    CanceledAwaitDebugger,
    TerminatedExecution,
    /// A loop was already running on this thread
    NestedInvocation,
}

impl Scheduler {
    /// Pumps the queue on the current thread until
    /// [`Scheduler::exit_message_loop`] supplies a reason.
    ///
    /// Only one loop runs at a time; a nested request returns
    /// [`ExitMessageLoopReason::NestedInvocation`] immediately.
    pub fn run_message_loop(&self, reason: RunMessageLoopReason) -> ExitMessageLoopReason {
        {
            let mut state = self.state.lock();
            if state.run_reason.is_some() {
                return ExitMessageLoopReason::NestedInvocation;
            }
            state.run_reason = Some(reason);
            state.exit_reason = None;
        }
        tracing::debug!(?reason, "Entering message loop");

        self.drain();

        let mut state = self.state.lock();
        let exit = loop {
            if let Some(exit) = state.exit_reason.take() {
                break exit;
            }
            if !state.has_runnable() {
                self.changed.wait(&mut state);
                continue;
            }
            drop(state);
            self.drain();
            state = self.state.lock();
        };
        state.run_reason = None;
        drop(state);

        tracing::debug!(?exit, "Exited message loop");
        exit
    }

    /// Ends the running message loop, if any. The first reason wins.
    pub fn exit_message_loop(&self, reason: ExitMessageLoopReason) -> bool {
        let mut state = self.state.lock();
        if state.run_reason.is_none() || state.exit_reason.is_some() {
            return false;
        }
        state.exit_reason = Some(reason);
        self.changed.notify_all();
        true
    }

    pub fn message_loop_reason(&self) -> Option<RunMessageLoopReason> {
        self.state.lock().run_reason
    }
}
