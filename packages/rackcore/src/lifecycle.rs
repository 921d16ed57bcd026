//! Boot lifecycle state machine.
//!
//! Tracks the externally visible phase of a boot session together with the
//! link and broker sub-states. Events come only from the orchestrator; the
//! machine decides which transitions are legal and what the status sink
//! should show.

use statig::blocking::IntoStateMachineExt as _;
use statig::prelude::*;

use crate::session::{BrokerState, LinkState};

/// What a status sink can show. One value per boot phase, stable names for
/// serial diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusPhase {
    Initializing,
    SelfTestFailed,
    Connecting,
    Online,
    WifiFailed,
    BrokerFailed,
}

impl StatusPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::SelfTestFailed => "selftest_failed",
            Self::Connecting => "connecting",
            Self::Online => "online",
            Self::WifiFailed => "wifi_failed",
            Self::BrokerFailed => "broker_failed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    SelfTestFailed,
    LinkConnecting,
    LinkJoined,
    LinkFailed,
    BrokerConnecting,
    BrokerActive,
    BrokerFailed,
    BrokerLost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub phase: StatusPhase,
    pub link: LinkState,
    pub broker: BrokerState,
}

impl Default for LifecycleSnapshot {
    fn default() -> Self {
        Self {
            phase: StatusPhase::Initializing,
            link: LinkState::Idle,
            broker: BrokerState::Idle,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleApplyStatus {
    Applied,
    Unchanged,
    InvalidTransition,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct DispatchContext {
    pub(crate) status: LifecycleApplyStatus,
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self {
            status: LifecycleApplyStatus::Unchanged,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct LifecycleMachine {
    pub(crate) snapshot: LifecycleSnapshot,
}

impl LifecycleMachine {
    fn note_change(&mut self, context: &mut DispatchContext, before: LifecycleSnapshot) {
        context.status = if before == self.snapshot {
            LifecycleApplyStatus::Unchanged
        } else {
            LifecycleApplyStatus::Applied
        };
    }
}

#[state_machine(initial = "State::initializing()")]
impl LifecycleMachine {
    #[state]
    fn initializing(
        &mut self,
        context: &mut DispatchContext,
        event: &LifecycleEvent,
    ) -> Outcome<State> {
        let before = self.snapshot;
        match event {
            LifecycleEvent::SelfTestFailed => {
                self.snapshot.phase = StatusPhase::SelfTestFailed;
                self.note_change(context, before);
                Transition(State::self_test_failed())
            }
            LifecycleEvent::LinkConnecting => {
                self.snapshot.phase = StatusPhase::Connecting;
                self.snapshot.link = LinkState::Connecting;
                self.note_change(context, before);
                Transition(State::connecting())
            }
            _ => {
                context.status = LifecycleApplyStatus::InvalidTransition;
                Handled
            }
        }
    }

    #[state]
    fn self_test_failed(
        &mut self,
        context: &mut DispatchContext,
        event: &LifecycleEvent,
    ) -> Outcome<State> {
        let before = self.snapshot;
        match event {
            LifecycleEvent::LinkConnecting => {
                self.snapshot.phase = StatusPhase::Connecting;
                self.snapshot.link = LinkState::Connecting;
                self.note_change(context, before);
                Transition(State::connecting())
            }
            _ => {
                context.status = LifecycleApplyStatus::InvalidTransition;
                Handled
            }
        }
    }

    #[state]
    fn connecting(
        &mut self,
        context: &mut DispatchContext,
        event: &LifecycleEvent,
    ) -> Outcome<State> {
        let before = self.snapshot;
        match event {
            LifecycleEvent::LinkJoined => {
                self.snapshot.link = LinkState::Joined;
                self.note_change(context, before);
                Handled
            }
            LifecycleEvent::LinkFailed => {
                self.snapshot.link = LinkState::Failed;
                self.snapshot.phase = StatusPhase::WifiFailed;
                self.note_change(context, before);
                Transition(State::wifi_failed())
            }
            LifecycleEvent::BrokerConnecting => {
                self.snapshot.broker = BrokerState::Connecting;
                self.note_change(context, before);
                Handled
            }
            LifecycleEvent::BrokerActive => {
                self.snapshot.broker = BrokerState::Active;
                self.snapshot.phase = StatusPhase::Online;
                self.note_change(context, before);
                Transition(State::online())
            }
            LifecycleEvent::BrokerFailed => {
                self.snapshot.broker = BrokerState::Failed;
                self.snapshot.phase = StatusPhase::BrokerFailed;
                self.note_change(context, before);
                Transition(State::broker_failed())
            }
            _ => {
                context.status = LifecycleApplyStatus::InvalidTransition;
                Handled
            }
        }
    }

    #[state]
    fn online(
        &mut self,
        context: &mut DispatchContext,
        event: &LifecycleEvent,
    ) -> Outcome<State> {
        let before = self.snapshot;
        match event {
            LifecycleEvent::BrokerLost => {
                self.snapshot.broker = BrokerState::Idle;
                self.snapshot.phase = StatusPhase::Connecting;
                self.note_change(context, before);
                Transition(State::connecting())
            }
            _ => {
                context.status = LifecycleApplyStatus::InvalidTransition;
                Handled
            }
        }
    }

    // Link failure is terminal for the session; only a reboot recovers it.
    #[state]
    fn wifi_failed(
        &mut self,
        context: &mut DispatchContext,
        event: &LifecycleEvent,
    ) -> Outcome<State> {
        let _ = event;
        context.status = LifecycleApplyStatus::InvalidTransition;
        Handled
    }

    #[state]
    fn broker_failed(
        &mut self,
        context: &mut DispatchContext,
        event: &LifecycleEvent,
    ) -> Outcome<State> {
        let before = self.snapshot;
        match event {
            LifecycleEvent::BrokerConnecting => {
                self.snapshot.broker = BrokerState::Connecting;
                self.snapshot.phase = StatusPhase::Connecting;
                self.note_change(context, before);
                Transition(State::connecting())
            }
            _ => {
                context.status = LifecycleApplyStatus::InvalidTransition;
                Handled
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LifecycleApplyResult {
    pub before: LifecycleSnapshot,
    pub after: LifecycleSnapshot,
    pub status: LifecycleApplyStatus,
}

impl LifecycleApplyResult {
    pub fn changed(self) -> bool {
        matches!(self.status, LifecycleApplyStatus::Applied)
    }

    pub fn phase_changed(self) -> bool {
        self.before.phase != self.after.phase
    }
}

pub struct LifecycleEngine {
    machine: statig::blocking::StateMachine<LifecycleMachine>,
}

impl LifecycleEngine {
    pub fn new() -> Self {
        Self {
            machine: LifecycleMachine {
                snapshot: LifecycleSnapshot::default(),
            }
            .state_machine(),
        }
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.machine.inner().snapshot
    }

    pub fn apply(&mut self, event: LifecycleEvent) -> LifecycleApplyResult {
        let before = self.snapshot();
        let mut context = DispatchContext::default();
        self.machine.handle_with_context(&event, &mut context);
        let after = self.snapshot();
        LifecycleApplyResult {
            before,
            after,
            status: context.status,
        }
    }
}

impl Default for LifecycleEngine {
    fn default() -> Self {
        Self::new()
    }
}
