//! # Transition: one attempt to move between states
//!
//! A `Transition` is built once from the current path and a [`TargetState`];
//! its Tree Change Set never changes afterwards. Running it walks the phases
//!
//! `BEFORE` → `RUN` (start, exit, retain, enter, finish) → `SUCCESS` | `ERROR`
//!
//! and settles exactly once. A redirect never mutates a transition: it builds
//! a new one that remembers where it was redirected from.

use crate::event::{HookPhase, PathType, TransitionEvent};
use crate::hook::{HookHandle, HookMatchCriteria, HookOptions, HookRegistry, HookResult, path_of};
use crate::router::Router;
use crate::service::hook_registrations;
use crate::transition_hook::{build_hooks_for_phase, invoke_hooks, run_all_hooks};
use arbor_core::param::{Param, ParamValues, changed_params};
use arbor_core::path::{
    ParamFilter, PathNode, TreeChanges, build_to_path, matching, path_param_values, sub_path,
    tree_changes,
};
use arbor_core::rejection::{Rejection, RejectionDetail, RejectionKind};
use arbor_core::resolvable::Resolvable;
use arbor_core::resolve_context::ResolveContext;
use arbor_core::state::State;
use arbor_core::target::{LocationMode, ReloadOption, TargetState, TransitionOptions, TransitionSource};
use arbor_core::trace::TraceEvent;
use arbor_core::view::ViewConfig;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::Instrument;

/// Token of the root resolvable holding a [`TransitionRef`].
pub const TRANSITION_TOKEN: &str = "$transition$";
/// Token of the root resolvable holding the target [`ParamValues`].
pub const STATE_PARAMS_TOKEN: &str = "$stateParams";

/// The value of the `$transition$` resolvable.
#[derive(Debug, Clone)]
pub struct TransitionRef(Weak<Transition>);

impl TransitionRef {
    pub fn upgrade(&self) -> Option<Arc<Transition>> {
        self.0.upgrade()
    }
}

/// Why a transition would change nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
    /// The target is where the router already is.
    SameAsCurrent,
    /// The target is where the running transition is already going.
    SameAsPending,
}

impl IgnoredReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoredReason::SameAsCurrent => "SameAsCurrent",
            IgnoredReason::SameAsPending => "SameAsPending",
        }
    }
}

type Outcome = Option<Result<Arc<State>, Rejection>>;

pub struct Transition {
    id: u64,
    router: Weak<Router>,
    target: TargetState,
    options: TransitionOptions,
    tree_changes: RwLock<TreeChanges>,
    hooks: HookRegistry,
    redirected_from: Option<Arc<Transition>>,
    aborted: AtomicBool,
    ran: AtomicBool,
    outcome: watch::Sender<Outcome>,
    created_at: DateTime<Utc>,
}

impl Transition {
    /// Build a transition from `from` to `target` and run its CREATE hooks.
    pub(crate) fn create(
        router: &Arc<Router>,
        from: Vec<PathNode>,
        target: TargetState,
        redirected_from: Option<Arc<Transition>>,
    ) -> Result<Arc<Self>, Rejection> {
        if let Some(error) = target.error() {
            return Err(Rejection::invalid(error));
        }
        let to_state = target
            .state()
            .cloned()
            .ok_or_else(|| Rejection::invalid(format!("No such state '{}'", target.name())))?;

        let options = target.options().clone();
        let to_path = build_to_path(&from, &to_state, target.params(), options.inherit);
        let changes = tree_changes(&from, &to_path, options.reload_state.as_ref());
        let (outcome, _) = watch::channel(None);

        let transition = Arc::new(Self {
            id: router.transition_service().next_transition_id(),
            router: Arc::downgrade(router),
            target,
            options,
            tree_changes: RwLock::new(changes),
            hooks: HookRegistry::new(),
            redirected_from,
            aborted: AtomicBool::new(false),
            ran: AtomicBool::new(false),
            outcome,
            created_at: Utc::now(),
        });
        transition.add_root_resolvables();

        for hook in build_hooks_for_phase(&transition, HookPhase::Create) {
            hook.invoke_sync()?;
        }
        transition.apply_view_configs(router)?;

        tracing::debug!(transition = %transition, "Transition created");
        Ok(transition)
    }

    fn add_root_resolvables(self: &Arc<Self>) {
        let params = self.params();
        let mut changes = self.tree_changes.write();
        if let Some(root) = changes.to.first_mut() {
            let tokens = [TRANSITION_TOKEN, STATE_PARAMS_TOKEN];
            root.resolvables.retain(|r| !tokens.contains(&r.token()));
            root.resolvables.push(Arc::new(Resolvable::from_value(
                TRANSITION_TOKEN,
                Arc::new(TransitionRef(Arc::downgrade(self))),
            )));
            root.resolvables.push(Arc::new(Resolvable::from_value(
                STATE_PARAMS_TOKEN,
                Arc::new(params),
            )));
        }
    }

    fn apply_view_configs(&self, router: &Router) -> Result<(), Rejection> {
        let mut guard = self.tree_changes.write();
        let changes = &mut *guard;
        let entering: Vec<Arc<State>> = changes.entering.iter().map(|n| Arc::clone(&n.state)).collect();
        let to_path = changes.to.clone();

        let mut configured: Vec<(Arc<State>, Vec<Arc<dyn ViewConfig>>)> = Vec::new();
        for state in &entering {
            let path = sub_path(&to_path, |n| Arc::ptr_eq(&n.state, state)).unwrap_or_default();
            let mut views = Vec::new();
            for decl in state.views() {
                views.extend(
                    router
                        .views()
                        .create_view_configs(&path, decl)
                        .map_err(Rejection::from_cause)?,
                );
            }
            configured.push((Arc::clone(state), views));
        }

        for (state, views) in configured {
            for node in changes
                .to
                .iter_mut()
                .chain(changes.entering.iter_mut())
                .filter(|n| Arc::ptr_eq(&n.state, &state))
            {
                node.views = views.clone();
            }
        }
        Ok(())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The owning router, unless it has been dropped.
    pub fn router(&self) -> Option<Arc<Router>> {
        self.router.upgrade()
    }

    pub fn target(&self) -> &TargetState {
        &self.target
    }

    pub fn options(&self) -> &TransitionOptions {
        &self.options
    }

    /// A snapshot of the Tree Change Set.
    pub fn tree_changes(&self) -> TreeChanges {
        self.tree_changes.read().clone()
    }

    /// One path of the Tree Change Set.
    pub fn path(&self, path_type: PathType) -> Vec<PathNode> {
        path_of(&self.tree_changes.read(), path_type).to_vec()
    }

    /// The instance hook registry.
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn from_state(&self) -> Arc<State> {
        self.tree_changes
            .read()
            .from
            .last()
            .map(|n| Arc::clone(&n.state))
            .unwrap_or_else(|| self.root_state())
    }

    pub fn to_state(&self) -> Arc<State> {
        self.tree_changes
            .read()
            .to
            .last()
            .map(|n| Arc::clone(&n.state))
            .unwrap_or_else(|| self.root_state())
    }

    fn root_state(&self) -> Arc<State> {
        match self.target.state() {
            Some(state) => state.path().remove(0),
            None => Arc::new(State::root()),
        }
    }

    /// The target parameter values.
    pub fn params(&self) -> ParamValues {
        path_param_values(&self.tree_changes.read().to)
    }

    pub fn params_of(&self, path_type: PathType) -> ParamValues {
        path_param_values(path_of(&self.tree_changes.read(), path_type))
    }

    /// States exited by this transition, leaf first.
    pub fn exiting(&self) -> Vec<Arc<State>> {
        let mut states = self.states_of(PathType::Exiting);
        states.reverse();
        states
    }

    pub fn entering(&self) -> Vec<Arc<State>> {
        self.states_of(PathType::Entering)
    }

    pub fn retained(&self) -> Vec<Arc<State>> {
        self.states_of(PathType::Retained)
    }

    fn states_of(&self, path_type: PathType) -> Vec<Arc<State>> {
        path_of(&self.tree_changes.read(), path_type)
            .iter()
            .map(|n| Arc::clone(&n.state))
            .collect()
    }

    /// View configs of `path_type`, optionally only those of `state`.
    pub fn views(&self, path_type: PathType, state: Option<&Arc<State>>) -> Vec<Arc<dyn ViewConfig>> {
        path_of(&self.tree_changes.read(), path_type)
            .iter()
            .filter(|n| state.is_none_or(|s| Arc::ptr_eq(&n.state, s)))
            .flat_map(|n| n.views.iter().cloned())
            .collect()
    }

    /// Parameters whose values change, when no state is exited or entered.
    fn changed_params(&self) -> Option<Vec<Param>> {
        if self.options.reload != ReloadOption::No {
            return None;
        }
        let changes = self.tree_changes.read();
        if !changes.exiting.is_empty()
            || !changes.entering.is_empty()
            || changes.to.len() != changes.from.len()
        {
            return None;
        }
        if changes
            .to
            .iter()
            .zip(&changes.from)
            .any(|(to, from)| !Arc::ptr_eq(&to.state, &from.state))
        {
            return None;
        }
        Some(
            changes
                .to
                .iter()
                .zip(&changes.from)
                .flat_map(|(to, from)| {
                    changed_params(to.param_schema(), &to.param_values, &from.param_values)
                        .into_iter()
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .collect(),
        )
    }

    /// New values of the parameters that change while every state is retained.
    pub fn params_changed(&self) -> ParamValues {
        let params = self.params();
        self.changed_params()
            .unwrap_or_default()
            .into_iter()
            .map(|p| {
                let value = params.get(&p.id).cloned().unwrap_or_default();
                (p.id, value)
            })
            .collect()
    }

    /// Whether only dynamic parameters change.
    pub fn dynamic(&self) -> bool {
        self.changed_params()
            .is_some_and(|changes| changes.iter().any(|p| p.dynamic))
    }

    /// Why this transition would change nothing, if it would not.
    pub fn ignored_reason(&self) -> Option<IgnoredReason> {
        let router = self.router()?;
        let reload_state = self.options.reload_state.clone();
        let same = |a: &[PathNode], b: &[PathNode]| {
            if a.len() != b.len() {
                return false;
            }
            let kept = matching(a, b, ParamFilter::All)
                .iter()
                .filter(|n| {
                    reload_state
                        .as_ref()
                        .is_none_or(|reload| !n.state.includes(reload.name()))
                })
                .count();
            a.len() == kept
        };

        let changes = self.tree_changes();
        let pending = router.globals().transition().filter(|p| p.id != self.id);
        if let Some(pending) = pending {
            let pending_changes = pending.tree_changes();
            if same(&pending_changes.to, &changes.to)
                && same(&pending_changes.exiting, &changes.exiting)
            {
                return Some(IgnoredReason::SameAsPending);
            }
        }
        if changes.exiting.is_empty() && changes.entering.is_empty() && same(&changes.from, &changes.to) {
            return Some(IgnoredReason::SameAsCurrent);
        }
        None
    }

    pub fn ignored(&self) -> bool {
        self.ignored_reason().is_some()
    }

    /// Whether this is the transition the router is running.
    pub fn is_active(&self) -> bool {
        self.router().is_some_and(|router| router.globals().is_active(self))
    }

    /// Stop this transition at its next hook.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Why this transition cannot succeed, if that is already known.
    pub fn error(&self) -> Option<Rejection> {
        let Some(state) = self.target.state() else {
            return Some(Rejection::invalid(
                self.target.error().unwrap_or_else(|| "No target state".to_string()),
            ));
        };
        if state.is_abstract() {
            return Some(Rejection::invalid(format!(
                "Cannot transition to abstract state '{}'",
                state.name()
            )));
        }

        let values = self.params();
        let invalid: Vec<String> = state
            .inherited_params()
            .iter()
            .filter_map(|param| {
                let value = values.get(&param.id).cloned().unwrap_or_default();
                (!param.validates(&value)).then(|| format!("[{}:{}]", param.id, value))
            })
            .collect();
        if !invalid.is_empty() {
            return Some(Rejection::invalid(format!(
                "The following parameter values are not valid for state '{}': {}",
                state.name(),
                invalid.join(", ")
            )));
        }

        match &*self.outcome.borrow() {
            Some(Err(rejection)) => Some(rejection.clone()),
            _ => None,
        }
    }

    pub fn valid(&self) -> bool {
        self.error().is_none()
    }

    /// `None` while running.
    pub fn success(&self) -> Option<bool> {
        self.outcome.borrow().as_ref().map(|outcome| outcome.is_ok())
    }

    pub fn redirected_from(&self) -> Option<&Arc<Transition>> {
        self.redirected_from.as_ref()
    }

    /// The first transition of the redirect chain this one belongs to.
    pub fn original_transition(self: &Arc<Self>) -> Arc<Transition> {
        let mut current = Arc::clone(self);
        while let Some(previous) = current.redirected_from.clone() {
            current = previous;
        }
        current
    }

    /// Add `resolvable` to the target path node of `state_name`.
    ///
    /// Returns `false` when no such node exists.
    pub fn add_resolvable(&self, resolvable: Resolvable, state_name: &str) -> bool {
        let mut changes = self.tree_changes.write();
        let Some(node) = changes.to.iter_mut().find(|n| n.state.name() == state_name) else {
            return false;
        };
        node.resolvables.retain(|r| r.token() != resolvable.token());
        node.resolvables.push(Arc::new(resolvable));
        true
    }

    /// A resolve context over the target path.
    pub fn resolve_context(&self) -> ResolveContext {
        let mut context = ResolveContext::new(self.tree_changes.read().to.clone());
        if let Some(router) = self.router() {
            if let Some(injector) = router.injector() {
                context = context.with_injector(Arc::clone(injector));
            }
            context = context.with_trace(Arc::clone(router.trace()), Some(self.id));
        }
        context
    }

    /// A new transition to `target`, replacing this one.
    ///
    /// Resolvables already fetched for entering states that the redirect
    /// enters unchanged are reused.
    pub fn redirect(self: &Arc<Self>, target: TargetState) -> Result<Arc<Transition>, Rejection> {
        let router = self
            .router()
            .ok_or_else(|| Rejection::aborted("The router has been dropped"))?;

        let max = router.max_redirects();
        let mut redirects = 1;
        let mut previous = self.redirected_from.clone();
        while let Some(transition) = previous {
            redirects += 1;
            if redirects > max {
                return Err(Rejection::errored(RejectionDetail::Message(format!(
                    "Too many consecutive Transition redirects ({max}+)"
                ))));
            }
            previous = transition.redirected_from.clone();
        }

        let requested = target.options().clone();
        let mut options = self.options.clone();
        if requested.reload != ReloadOption::No {
            options.reload = requested.reload;
            options.reload_state = requested.reload_state;
        }
        if !requested.custom.is_null() {
            options.custom = requested.custom;
        }
        if self.options.source == TransitionSource::Url && requested.location != LocationMode::No {
            options.location = LocationMode::Replace;
        }
        options.source = TransitionSource::Redirect;

        let from = self.tree_changes.read().from.clone();
        let original_entering = self.tree_changes.read().entering.clone();
        let redirect = Transition::create(
            &router,
            from,
            target.with_options(options),
            Some(Arc::clone(self)),
        )?;

        {
            let reload_state = redirect.options.reload_state.clone();
            let mut changes = redirect.tree_changes.write();
            let offset = changes.retained_with_to_params.len();
            let reusable = matching(&changes.entering, &original_entering, ParamFilter::NonDynamic).len();
            for idx in 0..reusable {
                let reloading = reload_state
                    .as_ref()
                    .is_some_and(|reload| changes.entering[idx].state.includes(reload.name()));
                if reloading {
                    continue;
                }
                let resolvables = original_entering[idx].resolvables.clone();
                changes.entering[idx].resolvables = resolvables.clone();
                if let Some(node) = changes.to.get_mut(offset + idx) {
                    node.resolvables = resolvables;
                }
            }
        }

        tracing::debug!(from = %self, to = %redirect, "Transition redirected");
        Ok(redirect)
    }

    /// Run every phase and settle.
    ///
    /// A transition runs at most once. Later calls run no hooks and return
    /// the outcome of the first run once it settles.
    pub async fn run(self: &Arc<Self>) -> Result<Arc<State>, Rejection> {
        if self.ran.swap(true, Ordering::AcqRel) {
            tracing::debug!(transition = %self, "Transition already ran");
            return self.wait().await;
        }
        let transition = Arc::clone(self);
        let span = tracing::info_span!(
            "Transition",
            arbor.transition = self.id,
            from = %self.from_state().name(),
            to = %self.to_state().name(),
        );

        async move {
            let mut result = invoke_hooks(build_hooks_for_phase(&transition, HookPhase::Before)).await;
            if result.is_ok() {
                transition.start();
                result = invoke_hooks(build_hooks_for_phase(&transition, HookPhase::Run)).await;
            }

            let outcome = match result {
                Ok(()) => {
                    let to = transition.to_state();
                    transition.trace(TraceEvent::TransitionSucceeded {
                        transition_id: transition.id,
                        to: to.name().to_string(),
                    });
                    transition.outcome.send_replace(Some(Ok(Arc::clone(&to))));
                    run_all_hooks(build_hooks_for_phase(&transition, HookPhase::Success)).await;
                    Ok(to)
                }
                Err(rejection) => {
                    if rejection.kind != RejectionKind::Ignored {
                        transition.trace(TraceEvent::TransitionErrored {
                            transition_id: transition.id,
                            rejection: rejection.to_string(),
                        });
                    }
                    transition.outcome.send_replace(Some(Err(rejection.clone())));
                    run_all_hooks(build_hooks_for_phase(&transition, HookPhase::Error)).await;
                    Err(rejection)
                }
            };

            if let Some(router) = transition.router() {
                router.globals().settled(&transition);
            }
            outcome
        }
        .instrument(span)
        .await
    }

    fn start(self: &Arc<Self>) {
        if let Some(router) = self.router() {
            router.globals().started(self);
        }
        self.trace(TraceEvent::TransitionStarted {
            transition_id: self.id,
            from: self.from_state().name().to_string(),
            to: self.to_state().name().to_string(),
        });
    }

    /// Wait for the transition to settle.
    pub async fn wait(&self) -> Result<Arc<State>, Rejection> {
        let mut outcome = self.outcome.subscribe();
        loop {
            if let Some(settled) = outcome.borrow_and_update().clone() {
                return settled;
            }
            if outcome.changed().await.is_err() {
                return Err(Rejection::aborted("The transition was dropped before settling"));
            }
        }
    }

    pub(crate) fn trace(&self, event: TraceEvent) {
        if let Some(router) = self.router() {
            router.trace().emit(event);
        }
    }

    hook_registrations! {
        on_before => OnBefore;
        on_start => OnStart;
        on_exit => OnExit;
        on_retain => OnRetain;
        on_enter => OnEnter;
        on_finish => OnFinish;
        on_success => OnSuccess;
        on_error => OnError;
    }
}

fn describe(path: &[PathNode]) -> (String, String) {
    let name = path.last().map(|n| n.state.name().to_string()).unwrap_or_default();
    let params = serde_json::to_string(&path_param_values(path)).unwrap_or_default();
    (name, params)
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let changes = self.tree_changes.read();
        let (from, from_params) = describe(&changes.from);
        let (to, to_params) = describe(&changes.to);
        let marker = if self.target.valid() { "" } else { "(X) " };
        write!(
            f,
            "Transition#{}( '{from}'{from_params} -> {marker}'{to}'{to_params} )",
            self.id
        )
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("aborted", &self.is_aborted())
            .field("redirected_from", &self.redirected_from.as_ref().map(|t| t.id))
            .field("created_at", &self.created_at)
            .finish()
    }
}
