//! # Hooks: registration, match criteria and results
//!
//! A hook is a callback registered for one [`TransitionEvent`] with
//! [`HookMatchCriteria`] over the paths of a transition. Registries exist
//! globally (on the [`TransitionService`](crate::service::TransitionService))
//! and per [`Transition`].

use crate::event::{PathType, TransitionEvent};
use crate::transition::Transition;
use arbor_core::glob::name_matches;
use arbor_core::path::{PathNode, TreeChanges};
use arbor_core::state::State;
use arbor_core::target::TargetState;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

static HOOK_IDS: AtomicU64 = AtomicU64::new(0);

/// What a hook tells the transition.
pub enum HookResult {
    Continue,
    /// Veto the transition.
    Abort,
    /// Replace the transition with one to another target.
    Redirect(TargetState),
    /// The answer is not known yet; later hooks wait for it.
    Pending(BoxFuture<'static, anyhow::Result<HookResult>>),
}

impl HookResult {
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<HookResult>> + Send + 'static,
    {
        HookResult::Pending(Box::pin(future))
    }
}

impl From<()> for HookResult {
    fn from(_: ()) -> Self {
        HookResult::Continue
    }
}

impl From<bool> for HookResult {
    fn from(proceed: bool) -> Self {
        if proceed {
            HookResult::Continue
        } else {
            HookResult::Abort
        }
    }
}

impl From<TargetState> for HookResult {
    fn from(target: TargetState) -> Self {
        HookResult::Redirect(target)
    }
}

impl fmt::Debug for HookResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookResult::Continue => write!(f, "Continue"),
            HookResult::Abort => write!(f, "Abort"),
            HookResult::Redirect(target) => write!(f, "Redirect({target})"),
            HookResult::Pending(_) => write!(f, "Pending"),
        }
    }
}

/// A hook callback. State-scoped events pass the state the hook runs for.
pub type HookFn =
    Arc<dyn Fn(&Arc<Transition>, Option<&Arc<State>>) -> anyhow::Result<HookResult> + Send + Sync>;

pub type StatePredicate = Arc<dyn Fn(&Arc<State>, &Transition) -> bool + Send + Sync>;

/// Which states of one path a hook cares about.
#[derive(Clone, Default)]
pub enum HookMatchCriterion {
    /// Every node, and satisfied even when the path is empty.
    #[default]
    Any,
    /// Exact names or globs. An empty list behaves like `Any`.
    Names(Vec<String>),
    Predicate(StatePredicate),
}

impl HookMatchCriterion {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HookMatchCriterion::Names(names.into_iter().map(Into::into).collect())
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Arc<State>, &Transition) -> bool + Send + Sync + 'static,
    {
        HookMatchCriterion::Predicate(Arc::new(predicate))
    }

    fn matches_state(&self, state: &Arc<State>, transition: &Transition) -> bool {
        match self {
            HookMatchCriterion::Any => true,
            HookMatchCriterion::Names(names) => {
                names.iter().any(|pattern| name_matches(pattern, state.name()))
            }
            HookMatchCriterion::Predicate(predicate) => predicate(state, transition),
        }
    }

    fn is_any(&self) -> bool {
        match self {
            HookMatchCriterion::Any => true,
            HookMatchCriterion::Names(names) => names.is_empty(),
            HookMatchCriterion::Predicate(_) => false,
        }
    }

    /// The candidate nodes this criterion accepts, or `None` if it fails.
    fn matching_nodes(&self, nodes: Vec<PathNode>, transition: &Transition) -> Option<Vec<PathNode>> {
        if self.is_any() {
            return Some(nodes);
        }
        let matching: Vec<PathNode> = nodes
            .into_iter()
            .filter(|node| self.matches_state(&node.state, transition))
            .collect();
        (!matching.is_empty()).then_some(matching)
    }
}

impl From<&str> for HookMatchCriterion {
    fn from(name: &str) -> Self {
        HookMatchCriterion::Names(vec![name.to_string()])
    }
}

impl fmt::Debug for HookMatchCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookMatchCriterion::Any => write!(f, "Any"),
            HookMatchCriterion::Names(names) => write!(f, "Names({names:?})"),
            HookMatchCriterion::Predicate(_) => write!(f, "Predicate"),
        }
    }
}

/// Criteria over the paths of a transition; every one must be satisfied.
#[derive(Debug, Clone, Default)]
pub struct HookMatchCriteria {
    pub to: HookMatchCriterion,
    pub from: HookMatchCriterion,
    pub exiting: HookMatchCriterion,
    pub retained: HookMatchCriterion,
    pub entering: HookMatchCriterion,
}

impl HookMatchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(mut self, criterion: impl Into<HookMatchCriterion>) -> Self {
        self.to = criterion.into();
        self
    }

    pub fn from(mut self, criterion: impl Into<HookMatchCriterion>) -> Self {
        self.from = criterion.into();
        self
    }

    pub fn exiting(mut self, criterion: impl Into<HookMatchCriterion>) -> Self {
        self.exiting = criterion.into();
        self
    }

    pub fn retained(mut self, criterion: impl Into<HookMatchCriterion>) -> Self {
        self.retained = criterion.into();
        self
    }

    pub fn entering(mut self, criterion: impl Into<HookMatchCriterion>) -> Self {
        self.entering = criterion.into();
        self
    }

    fn criterion(&self, path: PathType) -> &HookMatchCriterion {
        match path {
            PathType::To => &self.to,
            PathType::From => &self.from,
            PathType::Exiting => &self.exiting,
            PathType::Retained => &self.retained,
            PathType::Entering => &self.entering,
        }
    }

    /// The matching nodes of every path, or `None` if any criterion fails.
    pub fn matches(
        &self,
        changes: &TreeChanges,
        transition: &Transition,
    ) -> Option<HashMap<PathType, Vec<PathNode>>> {
        let mut matched = HashMap::new();
        for path_type in PathType::ALL {
            let path = path_of(changes, path_type);
            let nodes: Vec<PathNode> = if path_type.is_state_scoped() {
                path.to_vec()
            } else {
                path.last().cloned().into_iter().collect()
            };
            let nodes = self.criterion(path_type).matching_nodes(nodes, transition)?;
            matched.insert(path_type, nodes);
        }
        Some(matched)
    }
}

pub(crate) fn path_of(changes: &TreeChanges, path_type: PathType) -> &[PathNode] {
    match path_type {
        PathType::To => &changes.to,
        PathType::From => &changes.from,
        PathType::Exiting => &changes.exiting,
        PathType::Retained => &changes.retained,
        PathType::Entering => &changes.entering,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HookOptions {
    /// Higher runs earlier among hooks for the same node.
    pub priority: i32,
    /// Deregister after this many invocations.
    pub invoke_limit: Option<usize>,
}

impl HookOptions {
    pub fn priority(priority: i32) -> Self {
        Self {
            priority,
            invoke_limit: None,
        }
    }

    pub fn invoke_limit(mut self, limit: usize) -> Self {
        self.invoke_limit = Some(limit);
        self
    }
}

pub struct RegisteredHook {
    id: u64,
    event: TransitionEvent,
    criteria: HookMatchCriteria,
    callback: HookFn,
    options: HookOptions,
    invoke_count: AtomicUsize,
    deregistered: AtomicBool,
}

impl RegisteredHook {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn event(&self) -> TransitionEvent {
        self.event
    }

    pub fn priority(&self) -> i32 {
        self.options.priority
    }

    pub fn criteria(&self) -> &HookMatchCriteria {
        &self.criteria
    }

    pub fn callback(&self) -> &HookFn {
        &self.callback
    }

    pub fn invoke_count(&self) -> usize {
        self.invoke_count.load(Ordering::SeqCst)
    }

    pub fn is_deregistered(&self) -> bool {
        self.deregistered.load(Ordering::SeqCst)
    }

    pub fn deregister(&self) {
        self.deregistered.store(true, Ordering::SeqCst);
    }

    /// Count one invocation, deregistering at the invoke limit.
    pub(crate) fn record_invocation(&self) {
        let count = self.invoke_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.options.invoke_limit.is_some_and(|limit| count >= limit) {
            self.deregister();
        }
    }

    pub fn matches(
        &self,
        changes: &TreeChanges,
        transition: &Transition,
    ) -> Option<HashMap<PathType, Vec<PathNode>>> {
        if self.is_deregistered() {
            return None;
        }
        self.criteria.matches(changes, transition)
    }
}

impl fmt::Debug for RegisteredHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHook")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("criteria", &self.criteria)
            .field("options", &self.options)
            .field("invoke_count", &self.invoke_count())
            .field("deregistered", &self.is_deregistered())
            .finish()
    }
}

type HookTable = RwLock<HashMap<TransitionEvent, Vec<Arc<RegisteredHook>>>>;

/// Hooks by event, in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Arc<HookTable>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(
        &self,
        event: TransitionEvent,
        criteria: HookMatchCriteria,
        callback: F,
        options: HookOptions,
    ) -> HookHandle
    where
        F: Fn(&Arc<Transition>, Option<&Arc<State>>) -> anyhow::Result<HookResult>
            + Send
            + Sync
            + 'static,
    {
        let hook = Arc::new(RegisteredHook {
            id: HOOK_IDS.fetch_add(1, Ordering::Relaxed),
            event,
            criteria,
            callback: Arc::new(callback),
            options,
            invoke_count: AtomicUsize::new(0),
            deregistered: AtomicBool::new(false),
        });
        let mut hooks = self.hooks.write();
        let list = hooks.entry(event).or_default();
        list.retain(|h| !h.is_deregistered());
        list.push(Arc::clone(&hook));

        HookHandle {
            hook,
            table: Arc::downgrade(&self.hooks),
        }
    }

    /// The live hooks for `event`.
    pub fn hooks(&self, event: TransitionEvent) -> Vec<Arc<RegisteredHook>> {
        self.hooks
            .read()
            .get(&event)
            .map(|list| list.iter().filter(|h| !h.is_deregistered()).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.hooks
            .read()
            .values()
            .flat_map(|list| list.iter())
            .filter(|h| !h.is_deregistered())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry").field("hooks", &self.len()).finish()
    }
}

/// Returned by every hook registration.
#[derive(Debug, Clone)]
pub struct HookHandle {
    hook: Arc<RegisteredHook>,
    table: Weak<HookTable>,
}

impl HookHandle {
    /// Remove the hook. It is never selected again, even by a phase already
    /// being built.
    pub fn deregister(&self) {
        self.hook.deregister();
        if let Some(table) = self.table.upgrade() {
            if let Some(list) = table.write().get_mut(&self.hook.event) {
                list.retain(|h| h.id != self.hook.id);
            }
        }
    }

    pub fn is_deregistered(&self) -> bool {
        self.hook.is_deregistered()
    }

    pub fn invoke_count(&self) -> usize {
        self.hook.invoke_count()
    }
}
