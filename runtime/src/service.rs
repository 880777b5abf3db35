//! The global hook registry and transition numbering.

use crate::event::TransitionEvent;
use crate::hook::{HookHandle, HookMatchCriteria, HookOptions, HookRegistry, HookResult};
use crate::transition::Transition;
use arbor_core::state::State;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! hook_registrations {
    ($($(#[$doc:meta])* $name:ident => $event:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name<F>(&self, criteria: HookMatchCriteria, callback: F, options: HookOptions) -> HookHandle
            where
                F: Fn(&Arc<Transition>, Option<&Arc<State>>) -> anyhow::Result<HookResult>
                    + Send
                    + Sync
                    + 'static,
            {
                self.hooks.register(TransitionEvent::$event, criteria, callback, options)
            }
        )*
    };
}
pub(crate) use hook_registrations;

#[derive(Debug, Default)]
pub struct TransitionService {
    hooks: HookRegistry,
    transition_count: AtomicU64,
}

impl TransitionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub(crate) fn next_transition_id(&self) -> u64 {
        self.transition_count.fetch_add(1, Ordering::SeqCst)
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count.load(Ordering::SeqCst)
    }

    hook_registrations! {
        /// Runs synchronously while a transition is constructed.
        on_create => OnCreate;
        on_before => OnBefore;
        on_start => OnStart;
        /// Runs once per exiting state, leaf first.
        on_exit => OnExit;
        on_retain => OnRetain;
        on_enter => OnEnter;
        on_finish => OnFinish;
        on_success => OnSuccess;
        on_error => OnError;
    }
}
