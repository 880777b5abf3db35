//! Callbacks declared on a state itself.
//!
//! They ride on the declaration's [`Extensions`](arbor_core::Extensions) and
//! are picked up by the built-in enter, exit, retain and redirect hooks.

use crate::hook::HookResult;
use crate::transition::Transition;
use arbor_core::state::{State, StateDeclaration};
use arbor_core::target::TargetState;
use std::sync::Arc;

pub type StateCallback =
    Arc<dyn Fn(&Arc<Transition>, &Arc<State>) -> anyhow::Result<HookResult> + Send + Sync>;

/// Computes a redirect when the state is targeted. `None` means no redirect.
pub type RedirectFn =
    Arc<dyn Fn(&Arc<Transition>) -> anyhow::Result<Option<TargetState>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct StateHooks {
    pub on_enter: Option<StateCallback>,
    pub on_exit: Option<StateCallback>,
    pub on_retain: Option<StateCallback>,
    pub redirect: Option<RedirectFn>,
}

/// Attach state callbacks while declaring a state.
pub trait StateDeclarationExt: Sized {
    fn on_enter<F>(self, callback: F) -> Self
    where
        F: Fn(&Arc<Transition>, &Arc<State>) -> anyhow::Result<HookResult> + Send + Sync + 'static;

    fn on_exit<F>(self, callback: F) -> Self
    where
        F: Fn(&Arc<Transition>, &Arc<State>) -> anyhow::Result<HookResult> + Send + Sync + 'static;

    fn on_retain<F>(self, callback: F) -> Self
    where
        F: Fn(&Arc<Transition>, &Arc<State>) -> anyhow::Result<HookResult> + Send + Sync + 'static;

    fn redirect_with<F>(self, redirect: F) -> Self
    where
        F: Fn(&Arc<Transition>) -> anyhow::Result<Option<TargetState>> + Send + Sync + 'static;
}

impl StateDeclarationExt for StateDeclaration {
    fn on_enter<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Arc<Transition>, &Arc<State>) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.extensions.get_or_default::<StateHooks>().on_enter = Some(Arc::new(callback));
        self
    }

    fn on_exit<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Arc<Transition>, &Arc<State>) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.extensions.get_or_default::<StateHooks>().on_exit = Some(Arc::new(callback));
        self
    }

    fn on_retain<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Arc<Transition>, &Arc<State>) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.extensions.get_or_default::<StateHooks>().on_retain = Some(Arc::new(callback));
        self
    }

    fn redirect_with<F>(mut self, redirect: F) -> Self
    where
        F: Fn(&Arc<Transition>) -> anyhow::Result<Option<TargetState>> + Send + Sync + 'static,
    {
        self.extensions.get_or_default::<StateHooks>().redirect = Some(Arc::new(redirect));
        self
    }
}

pub fn state_hooks(state: &State) -> Option<&StateHooks> {
    state.extension::<StateHooks>()
}
