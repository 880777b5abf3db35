//! Hooks bound to one transition and one path node, and how they run.

use crate::event::{ErrorHandling, HookPhase, ResultHandling, TransitionEvent};
use crate::hook::{HookResult, RegisteredHook};
use crate::transition::Transition;
use arbor_core::rejection::{Rejection, RejectionDetail, RejectionKind};
use arbor_core::state::State;
use arbor_core::trace::TraceEvent;
use std::fmt;
use std::sync::Arc;

/// A registered hook, ready to run for one node of one transition.
pub struct TransitionHook {
    transition: Arc<Transition>,
    state: Option<Arc<State>>,
    hook: Arc<RegisteredHook>,
    event: TransitionEvent,
    depth: usize,
}

/// Every hook of `phase`, in running order.
///
/// Events run in their sub-phase order; inside an event, hooks run by node
/// depth (leaf first for exits) and then by priority, highest first.
pub fn build_hooks_for_phase(transition: &Arc<Transition>, phase: HookPhase) -> Vec<TransitionHook> {
    TransitionEvent::for_phase(phase)
        .into_iter()
        .flat_map(|event| build_hooks(transition, event))
        .collect()
}

fn build_hooks(transition: &Arc<Transition>, event: TransitionEvent) -> Vec<TransitionHook> {
    let changes = transition.tree_changes();
    let mut registered = Vec::new();
    if event.phase() != HookPhase::Create {
        registered.extend(transition.hooks().hooks(event));
    }
    if let Some(router) = transition.router() {
        registered.extend(router.transition_service().hooks().hooks(event));
    }

    let path_type = event.criteria_path();
    let mut hooks = Vec::new();
    for hook in registered {
        let Some(mut matched) = hook.matches(&changes, transition) else {
            continue;
        };
        for node in matched.remove(&path_type).unwrap_or_default() {
            hooks.push(TransitionHook {
                transition: Arc::clone(transition),
                state: path_type.is_state_scoped().then(|| Arc::clone(&node.state)),
                hook: Arc::clone(&hook),
                event,
                depth: node.state.depth(),
            });
        }
    }

    hooks.sort_by(|a, b| {
        let depth = if event.reverse_sort() {
            b.depth.cmp(&a.depth)
        } else {
            a.depth.cmp(&b.depth)
        };
        depth.then_with(|| b.hook.priority().cmp(&a.hook.priority()))
    });
    hooks
}

/// Run `hooks` in order, stopping at the first rejection.
pub async fn invoke_hooks(hooks: Vec<TransitionHook>) -> Result<(), Rejection> {
    for hook in hooks {
        hook.invoke().await?;
    }
    Ok(())
}

/// Run every hook; failures are logged.
pub async fn run_all_hooks(hooks: Vec<TransitionHook>) {
    for hook in hooks {
        match hook.invoke().await {
            Ok(()) => {}
            Err(rejection) if is_cancellation(&rejection) => {
                tracing::debug!(%rejection, hook = %hook, "Hook skipped");
            }
            Err(rejection) => {
                tracing::error!(%rejection, hook = %hook, "Hook failed");
            }
        }
    }
}

/// Rejections raised because the transition was aborted or replaced.
fn is_cancellation(rejection: &Rejection) -> bool {
    matches!(rejection.kind, RejectionKind::Aborted | RejectionKind::Superseded)
}

impl TransitionHook {
    pub fn event(&self) -> TransitionEvent {
        self.event
    }

    pub fn state(&self) -> Option<&Arc<State>> {
        self.state.as_ref()
    }

    pub fn priority(&self) -> i32 {
        self.hook.priority()
    }

    /// Why this hook must not run anymore.
    fn not_current(&self) -> Option<Rejection> {
        let Some(router) = self.transition.router() else {
            return Some(Rejection::aborted("The router has been dropped"));
        };
        if router.is_disposed() {
            return Some(Rejection::aborted(format!(
                "Router instance {} has been stopped (disposed)",
                router.instance_id()
            )));
        }
        if self.transition.is_aborted() {
            return Some(Rejection::aborted("The transition has been aborted"));
        }
        if self.event.phase() == HookPhase::Run && !self.transition.is_active() {
            let detail = router
                .globals()
                .transition()
                .map(|current| RejectionDetail::Message(current.to_string()))
                .unwrap_or_default();
            return Some(Rejection::superseded(detail));
        }
        None
    }

    fn call(&self) -> anyhow::Result<HookResult> {
        self.transition.trace(TraceEvent::HookInvoked {
            transition_id: self.transition.id(),
            event: self.event.name().to_string(),
            state: self.state.as_ref().map(|s| s.name().to_string()),
            priority: self.hook.priority(),
        });
        let result = (self.hook.callback())(&self.transition, self.state.as_ref());
        self.hook.record_invocation();
        result
    }

    fn returned(&self, result: String) {
        self.transition.trace(TraceEvent::HookReturned {
            transition_id: self.transition.id(),
            event: self.event.name().to_string(),
            result,
        });
    }

    /// Run the hook, waiting for a pending result.
    pub async fn invoke(&self) -> Result<(), Rejection> {
        if self.hook.is_deregistered() {
            return Ok(());
        }
        if let Some(rejection) = self.not_current() {
            return Err(rejection);
        }
        let result = self.call();
        match self.event.result_handling() {
            ResultHandling::Handle => self.handle(result).await,
            ResultHandling::Log => {
                self.log(result).await;
                Ok(())
            }
        }
    }

    /// Run a synchronous hook. A pending result cannot be waited for and is dropped.
    pub fn invoke_sync(&self) -> Result<(), Rejection> {
        if self.hook.is_deregistered() {
            return Ok(());
        }
        if let Some(rejection) = self.not_current() {
            return Err(rejection);
        }
        match self.call() {
            Ok(HookResult::Pending(_)) => {
                tracing::warn!(hook = %self, "Synchronous hook returned a pending result; ignoring it");
                self.returned("Pending".to_string());
                Ok(())
            }
            Ok(result) => {
                self.returned(format!("{result:?}"));
                Ok(())
            }
            Err(err) => self.handle_error(Rejection::normalize(err)),
        }
    }

    async fn handle(&self, mut result: anyhow::Result<HookResult>) -> Result<(), Rejection> {
        loop {
            let value = match result {
                Ok(value) => value,
                Err(err) => return self.handle_error(Rejection::normalize(err)),
            };
            if let Some(rejection) = self.not_current() {
                return Err(rejection);
            }
            match value {
                HookResult::Pending(future) => result = future.await,
                HookResult::Continue => {
                    self.returned("Continue".to_string());
                    return Ok(());
                }
                HookResult::Abort => {
                    self.returned("Abort".to_string());
                    return Err(Rejection::aborted("Hook aborted transition"));
                }
                HookResult::Redirect(target) => {
                    self.returned(format!("Redirect({target})"));
                    return Err(Rejection::redirected(target));
                }
            }
        }
    }

    async fn log(&self, mut result: anyhow::Result<HookResult>) {
        loop {
            match result {
                Ok(HookResult::Pending(future)) => result = future.await,
                Ok(value) => {
                    self.returned(format!("{value:?}"));
                    return;
                }
                Err(err) => {
                    let _ = self.handle_error(Rejection::normalize(err));
                    return;
                }
            }
        }
    }

    fn handle_error(&self, rejection: Rejection) -> Result<(), Rejection> {
        self.returned(rejection.to_string());
        match self.event.error_handling() {
            ErrorHandling::Reject | ErrorHandling::Throw => Err(rejection),
            ErrorHandling::Log => {
                tracing::error!(%rejection, hook = %self, "Hook error");
                Ok(())
            }
        }
    }
}

impl fmt::Display for TransitionHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} ({}) on Transition#{}",
            self.event,
            self.hook.id(),
            self.state.as_ref().map(|s| s.name()).unwrap_or("-"),
            self.transition.id()
        )
    }
}
