use statig::{blocking::IntoStateMachineExt as _, prelude::*};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketPhase {
    Unbound,
    Binding,
    Bound,
    ListenPending,
    Listening,
    Connecting,
    Connected,
    Closed,
}

impl SocketPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unbound => "unbound",
            Self::Binding => "binding",
            Self::Bound => "bound",
            Self::ListenPending => "listen_pending",
            Self::Listening => "listening",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SocketCommand {
    Bind,
    BindDone { ok: bool },
    Listen,
    ListenDone { ok: bool },
    Connect,
    ConnectDone { ok: bool },
    Accepted,
    Close,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LifecycleStatus {
    Applied,
    Unchanged,
    InvalidTransition,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct LifecycleResult {
    pub(crate) before: SocketPhase,
    pub(crate) after: SocketPhase,
    pub(crate) status: LifecycleStatus,
}

impl LifecycleResult {
    pub(crate) fn rejected(self) -> bool {
        matches!(self.status, LifecycleStatus::InvalidTransition)
    }
}

struct DispatchContext {
    status: LifecycleStatus,
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self {
            status: LifecycleStatus::Unchanged,
        }
    }
}

struct LifecycleMachine {
    phase: SocketPhase,
}

impl LifecycleMachine {
    fn enter(&mut self, context: &mut DispatchContext, phase: SocketPhase) {
        self.phase = phase;
        context.status = LifecycleStatus::Applied;
    }

    fn reject(context: &mut DispatchContext) -> Outcome<State> {
        context.status = LifecycleStatus::InvalidTransition;
        Handled
    }
}

#[state_machine(initial = "State::unbound()")]
impl LifecycleMachine {
    #[state]
    fn unbound(&mut self, context: &mut DispatchContext, event: &SocketCommand) -> Outcome<State> {
        match event {
            SocketCommand::Bind => {
                self.enter(context, SocketPhase::Binding);
                Transition(State::binding())
            }
            SocketCommand::Connect => {
                self.enter(context, SocketPhase::Connecting);
                Transition(State::connecting())
            }
            SocketCommand::Accepted => {
                self.enter(context, SocketPhase::Connected);
                Transition(State::connected())
            }
            SocketCommand::Close => {
                self.enter(context, SocketPhase::Closed);
                Transition(State::closed())
            }
            _ => Self::reject(context),
        }
    }

    #[state]
    fn binding(&mut self, context: &mut DispatchContext, event: &SocketCommand) -> Outcome<State> {
        match event {
            SocketCommand::BindDone { ok: true } => {
                self.enter(context, SocketPhase::Bound);
                Transition(State::bound())
            }
            SocketCommand::BindDone { ok: false } => {
                self.enter(context, SocketPhase::Unbound);
                Transition(State::unbound())
            }
            SocketCommand::Close => {
                self.enter(context, SocketPhase::Closed);
                Transition(State::closed())
            }
            _ => Self::reject(context),
        }
    }

    #[state]
    fn bound(&mut self, context: &mut DispatchContext, event: &SocketCommand) -> Outcome<State> {
        match event {
            SocketCommand::Listen => {
                self.enter(context, SocketPhase::ListenPending);
                Transition(State::listen_pending())
            }
            SocketCommand::Connect => {
                self.enter(context, SocketPhase::Connecting);
                Transition(State::connecting())
            }
            SocketCommand::Close => {
                self.enter(context, SocketPhase::Closed);
                Transition(State::closed())
            }
            _ => Self::reject(context),
        }
    }

    #[state]
    fn listen_pending(
        &mut self,
        context: &mut DispatchContext,
        event: &SocketCommand,
    ) -> Outcome<State> {
        match event {
            SocketCommand::ListenDone { ok: true } => {
                self.enter(context, SocketPhase::Listening);
                Transition(State::listening())
            }
            SocketCommand::ListenDone { ok: false } => {
                self.enter(context, SocketPhase::Bound);
                Transition(State::bound())
            }
            SocketCommand::Close => {
                self.enter(context, SocketPhase::Closed);
                Transition(State::closed())
            }
            _ => Self::reject(context),
        }
    }

    #[state]
    fn listening(&mut self, context: &mut DispatchContext, event: &SocketCommand) -> Outcome<State> {
        match event {
            SocketCommand::Close => {
                self.enter(context, SocketPhase::Closed);
                Transition(State::closed())
            }
            _ => Self::reject(context),
        }
    }

    #[state]
    fn connecting(
        &mut self,
        context: &mut DispatchContext,
        event: &SocketCommand,
    ) -> Outcome<State> {
        match event {
            SocketCommand::ConnectDone { ok: true } => {
                self.enter(context, SocketPhase::Connected);
                Transition(State::connected())
            }
            SocketCommand::ConnectDone { ok: false } => {
                self.enter(context, SocketPhase::Unbound);
                Transition(State::unbound())
            }
            SocketCommand::Close => {
                self.enter(context, SocketPhase::Closed);
                Transition(State::closed())
            }
            _ => Self::reject(context),
        }
    }

    #[state]
    fn connected(&mut self, context: &mut DispatchContext, event: &SocketCommand) -> Outcome<State> {
        match event {
            SocketCommand::Close => {
                self.enter(context, SocketPhase::Closed);
                Transition(State::closed())
            }
            _ => Self::reject(context),
        }
    }

    #[state]
    fn closed(&mut self, context: &mut DispatchContext, event: &SocketCommand) -> Outcome<State> {
        match event {
            SocketCommand::Close => {
                context.status = LifecycleStatus::Unchanged;
                Handled
            }
            _ => Self::reject(context),
        }
    }
}

/// Per-socket phase tracking for the operations provider.
pub(crate) struct SocketLifecycle {
    machine: statig::blocking::StateMachine<LifecycleMachine>,
}

impl SocketLifecycle {
    pub(crate) fn new() -> Self {
        Self {
            machine: LifecycleMachine {
                phase: SocketPhase::Unbound,
            }
            .state_machine(),
        }
    }

    pub(crate) fn phase(&self) -> SocketPhase {
        self.machine.inner().phase
    }

    pub(crate) fn apply(&mut self, command: SocketCommand) -> LifecycleResult {
        let before = self.phase();
        let mut context = DispatchContext::default();
        self.machine.handle_with_context(&command, &mut context);
        LifecycleResult {
            before,
            after: self.phase(),
            status: context.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_listen_reaches_listening() {
        let mut lifecycle = SocketLifecycle::new();
        assert_eq!(lifecycle.apply(SocketCommand::Bind).after, SocketPhase::Binding);
        lifecycle.apply(SocketCommand::BindDone { ok: true });
        lifecycle.apply(SocketCommand::Listen);
        let result = lifecycle.apply(SocketCommand::ListenDone { ok: true });
        assert!(matches!(result.status, LifecycleStatus::Applied));
        assert_eq!(result.before, SocketPhase::ListenPending);
        assert_eq!(lifecycle.phase(), SocketPhase::Listening);
    }

    #[test]
    fn failed_bind_returns_to_unbound() {
        let mut lifecycle = SocketLifecycle::new();
        lifecycle.apply(SocketCommand::Bind);
        lifecycle.apply(SocketCommand::BindDone { ok: false });
        assert_eq!(lifecycle.phase(), SocketPhase::Unbound);
    }

    #[test]
    fn listen_requires_bound_socket() {
        let mut lifecycle = SocketLifecycle::new();
        assert!(lifecycle.apply(SocketCommand::Listen).rejected());
        assert_eq!(lifecycle.phase(), SocketPhase::Unbound);
    }

    #[test]
    fn second_bind_while_binding_is_rejected() {
        let mut lifecycle = SocketLifecycle::new();
        lifecycle.apply(SocketCommand::Bind);
        assert!(lifecycle.apply(SocketCommand::Bind).rejected());
        assert_eq!(lifecycle.phase(), SocketPhase::Binding);
    }

    #[test]
    fn late_completion_after_revert_is_rejected() {
        let mut lifecycle = SocketLifecycle::new();
        lifecycle.apply(SocketCommand::Bind);
        lifecycle.apply(SocketCommand::BindDone { ok: false });
        assert!(lifecycle.apply(SocketCommand::BindDone { ok: true }).rejected());
    }

    #[test]
    fn close_is_terminal_and_idempotent() {
        let mut lifecycle = SocketLifecycle::new();
        lifecycle.apply(SocketCommand::Connect);
        assert!(matches!(
            lifecycle.apply(SocketCommand::Close).status,
            LifecycleStatus::Applied
        ));
        assert!(matches!(
            lifecycle.apply(SocketCommand::Close).status,
            LifecycleStatus::Unchanged
        ));
        assert!(lifecycle.apply(SocketCommand::Bind).rejected());
        assert_eq!(lifecycle.phase(), SocketPhase::Closed);
    }
}
