//! Transition events and the phases they run in.
//!
//! Every hook is registered for one [`TransitionEvent`]. The event fixes the
//! phase the hook runs in, its order inside that phase, which path of the
//! Tree Change Set its criteria are matched against, and how its result and
//! errors are handled.

use serde::Serialize;
use std::fmt;

/// The phases of a transition, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookPhase {
    /// While the transition is being constructed. Synchronous.
    Create,
    Before,
    Run,
    Success,
    Error,
}

/// The paths of a Tree Change Set that hook criteria can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    To,
    From,
    Exiting,
    Retained,
    Entering,
}

impl PathType {
    pub const ALL: [PathType; 5] = [
        PathType::To,
        PathType::From,
        PathType::Exiting,
        PathType::Retained,
        PathType::Entering,
    ];

    /// Transition-scoped paths are matched by their last node only; a hook on
    /// a state-scoped path runs once per matching node.
    pub fn is_state_scoped(&self) -> bool {
        matches!(
            self,
            PathType::Exiting | PathType::Retained | PathType::Entering
        )
    }
}

/// What happens to a hook's return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultHandling {
    /// Abort and redirect results steer the transition.
    Handle,
    /// The transition is already settled; failures are only logged.
    Log,
}

/// What happens when a hook fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorHandling {
    /// The failure rejects the transition.
    Reject,
    Log,
    /// The failure propagates out of transition construction.
    Throw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionEvent {
    OnCreate,
    OnBefore,
    OnStart,
    OnExit,
    OnRetain,
    OnEnter,
    OnFinish,
    OnSuccess,
    OnError,
}

impl TransitionEvent {
    pub const ALL: [TransitionEvent; 9] = [
        TransitionEvent::OnCreate,
        TransitionEvent::OnBefore,
        TransitionEvent::OnStart,
        TransitionEvent::OnExit,
        TransitionEvent::OnRetain,
        TransitionEvent::OnEnter,
        TransitionEvent::OnFinish,
        TransitionEvent::OnSuccess,
        TransitionEvent::OnError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransitionEvent::OnCreate => "on_create",
            TransitionEvent::OnBefore => "on_before",
            TransitionEvent::OnStart => "on_start",
            TransitionEvent::OnExit => "on_exit",
            TransitionEvent::OnRetain => "on_retain",
            TransitionEvent::OnEnter => "on_enter",
            TransitionEvent::OnFinish => "on_finish",
            TransitionEvent::OnSuccess => "on_success",
            TransitionEvent::OnError => "on_error",
        }
    }

    pub fn phase(&self) -> HookPhase {
        match self {
            TransitionEvent::OnCreate => HookPhase::Create,
            TransitionEvent::OnBefore => HookPhase::Before,
            TransitionEvent::OnStart
            | TransitionEvent::OnExit
            | TransitionEvent::OnRetain
            | TransitionEvent::OnEnter
            | TransitionEvent::OnFinish => HookPhase::Run,
            TransitionEvent::OnSuccess => HookPhase::Success,
            TransitionEvent::OnError => HookPhase::Error,
        }
    }

    /// Order of this event's hooks inside its phase.
    pub fn hook_order(&self) -> u32 {
        match self {
            TransitionEvent::OnExit => 100,
            TransitionEvent::OnRetain => 200,
            TransitionEvent::OnEnter => 300,
            TransitionEvent::OnFinish => 400,
            _ => 0,
        }
    }

    /// The path whose nodes this event's hooks are built for.
    pub fn criteria_path(&self) -> PathType {
        match self {
            TransitionEvent::OnExit => PathType::Exiting,
            TransitionEvent::OnRetain => PathType::Retained,
            TransitionEvent::OnEnter => PathType::Entering,
            _ => PathType::To,
        }
    }

    /// Exit hooks run leaf first.
    pub fn reverse_sort(&self) -> bool {
        matches!(self, TransitionEvent::OnExit)
    }

    pub fn synchronous(&self) -> bool {
        matches!(self.phase(), HookPhase::Create)
    }

    pub fn result_handling(&self) -> ResultHandling {
        match self.phase() {
            HookPhase::Create | HookPhase::Success | HookPhase::Error => ResultHandling::Log,
            HookPhase::Before | HookPhase::Run => ResultHandling::Handle,
        }
    }

    pub fn error_handling(&self) -> ErrorHandling {
        match self.phase() {
            HookPhase::Create => ErrorHandling::Throw,
            HookPhase::Success | HookPhase::Error => ErrorHandling::Log,
            HookPhase::Before | HookPhase::Run => ErrorHandling::Reject,
        }
    }

    /// The events of `phase`, in running order.
    pub fn for_phase(phase: HookPhase) -> Vec<TransitionEvent> {
        let mut events: Vec<TransitionEvent> = Self::ALL
            .into_iter()
            .filter(|event| event.phase() == phase)
            .collect();
        events.sort_by_key(|event| event.hook_order());
        events
    }
}

impl fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
