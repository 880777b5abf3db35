//! # Path: activation paths and the Tree Change Set
//!
//! A path is a root-first `Vec<PathNode>`, one node per tree level. Each node
//! owns fresh clones of its state's resolvables, so nothing resolved for one
//! transition leaks into another unless a node is deliberately carried over.

use crate::param::{Param, ParamValues, changed_params, param_values};
use crate::resolvable::Resolvable;
use crate::state::State;
use crate::view::ViewConfig;
use std::fmt;
use std::sync::Arc;

/// Which parameters take part in a node comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamFilter {
    All,
    /// Only parameters not declared dynamic.
    NonDynamic,
}

impl ParamFilter {
    fn admits(&self, param: &Param) -> bool {
        match self {
            ParamFilter::All => true,
            ParamFilter::NonDynamic => !param.dynamic,
        }
    }
}

/// One level of a concrete activation path.
///
/// `Clone` is shallow: the clone shares the resolvables (and their cached
/// results) of the original. Use [`PathNode::clone_fresh`] for a node that
/// resolves again.
#[derive(Clone)]
pub struct PathNode {
    pub state: Arc<State>,
    pub param_values: ParamValues,
    pub resolvables: Vec<Arc<Resolvable>>,
    pub views: Vec<Arc<dyn ViewConfig>>,
}

impl PathNode {
    /// A node for `state` with default parameter values and unresolved resolvables.
    pub fn new(state: &Arc<State>) -> Self {
        Self {
            state: Arc::clone(state),
            param_values: param_values(state.params(), &ParamValues::new()),
            resolvables: state
                .resolvables()
                .iter()
                .map(|r| Arc::new(r.clone_fresh()))
                .collect(),
            views: Vec::new(),
        }
    }

    /// Take this node's parameter values from `raw`; parameters missing from
    /// `raw` get their defaults.
    pub fn apply_raw_params(mut self, raw: &ParamValues) -> Self {
        self.param_values = param_values(self.state.params(), raw);
        self
    }

    pub fn param_schema(&self) -> &[Param] {
        self.state.params()
    }

    /// Same state and no differing parameter under `filter`.
    pub fn equals(&self, other: &PathNode, filter: ParamFilter) -> bool {
        Arc::ptr_eq(&self.state, &other.state) && self.diff(other, filter).is_empty()
    }

    /// The parameters admitted by `filter` whose values differ from `other`'s.
    pub fn diff(&self, other: &PathNode, filter: ParamFilter) -> Vec<&Param> {
        let schema = self.param_schema().iter().filter(|p| filter.admits(p));
        changed_params(schema, &self.param_values, &other.param_values)
    }

    /// A copy with the same parameter values and views, but resolvables that
    /// resolve again.
    pub fn clone_fresh(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            param_values: self.param_values.clone(),
            resolvables: self
                .resolvables
                .iter()
                .map(|r| Arc::new(r.clone_fresh()))
                .collect(),
            views: self.views.clone(),
        }
    }
}

impl fmt::Debug for PathNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathNode")
            .field("state", &self.state.name())
            .field("params", &self.param_values)
            .field(
                "resolvables",
                &self.resolvables.iter().map(|r| r.token()).collect::<Vec<_>>(),
            )
            .field("views", &self.views.len())
            .finish()
    }
}

/// The retained / exiting / entering decomposition of two paths.
#[derive(Debug, Clone, Default)]
pub struct TreeChanges {
    pub from: Vec<PathNode>,
    pub to: Vec<PathNode>,
    pub retained: Vec<PathNode>,
    /// `retained`, carrying the target's parameter values.
    pub retained_with_to_params: Vec<PathNode>,
    pub exiting: Vec<PathNode>,
    pub entering: Vec<PathNode>,
}

/// The path from the root to `state`, with parameter values taken from `params`.
pub fn build_path(state: &Arc<State>, params: &ParamValues) -> Vec<PathNode> {
    state
        .path()
        .iter()
        .map(|s| PathNode::new(s).apply_raw_params(params))
        .collect()
}

/// The target path of a transition leaving `from`.
///
/// With `inherit`, values for parameters not in `params` are carried over
/// from the matching nodes of `from`.
pub fn build_to_path(
    from: &[PathNode],
    state: &Arc<State>,
    params: &ParamValues,
    inherit: bool,
) -> Vec<PathNode> {
    let to = build_path(state, params);
    if !inherit {
        return to;
    }
    let explicit: Vec<&str> = params.keys().map(String::as_str).collect();
    inherit_params(from, &to, &explicit)
}

/// Merge inheritable parameter values of `from` into `to`.
///
/// For every node of `to`: its own values, overridden by the values of the
/// node for the same state in `from` (only parameters with `inherit` set),
/// overridden again by the explicitly supplied `explicit` keys.
pub fn inherit_params(from: &[PathNode], to: &[PathNode], explicit: &[&str]) -> Vec<PathNode> {
    to.iter()
        .map(|to_node| {
            let mut values = to_node.param_values.clone();
            let incoming: ParamValues = to_node
                .param_values
                .iter()
                .filter(|(key, _)| explicit.contains(&key.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();

            if let Some(from_node) = from
                .iter()
                .find(|node| Arc::ptr_eq(&node.state, &to_node.state))
            {
                for param in from_node.state.params().iter().filter(|p| p.inherit) {
                    if let Some(value) = from_node.param_values.get(&param.id) {
                        values.insert(param.id.clone(), value.clone());
                    }
                }
            }
            values.extend(incoming);

            PathNode::new(&to_node.state).apply_raw_params(&values)
        })
        .collect()
}

/// Diff `from` against `to`.
///
/// The retained prefix ends at the first level whose state differs, whose
/// non-dynamic parameter values differ, or whose state is `reload_state`.
pub fn tree_changes(
    from: &[PathNode],
    to: &[PathNode],
    reload_state: Option<&Arc<State>>,
) -> TreeChanges {
    let max = from.len().min(to.len());
    let mut keep = 0;
    while keep < max
        && !reload_state.is_some_and(|reload| Arc::ptr_eq(&from[keep].state, reload))
        && from[keep].equals(&to[keep], ParamFilter::NonDynamic)
    {
        keep += 1;
    }

    let retained = from[..keep].to_vec();
    let retained_with_to_params: Vec<PathNode> = retained
        .iter()
        .zip(to)
        .map(|(node, target)| {
            let mut carried = node.clone();
            carried.param_values = target.param_values.clone();
            carried
        })
        .collect();
    let exiting = from[keep..].to_vec();
    let entering = to[keep..].to_vec();

    let mut to_path = retained_with_to_params.clone();
    to_path.extend(entering.iter().cloned());

    TreeChanges {
        from: from.to_vec(),
        to: to_path,
        retained,
        retained_with_to_params,
        exiting,
        entering,
    }
}

/// The longest common prefix of `a` and `b`, as nodes of `a`.
pub fn matching(a: &[PathNode], b: &[PathNode], filter: ParamFilter) -> Vec<PathNode> {
    a.iter()
        .zip(b)
        .take_while(|(x, y)| x.equals(y, filter))
        .map(|(x, _)| x.clone())
        .collect()
}

/// `path` up to and including the first node accepted by `predicate`.
pub fn sub_path(path: &[PathNode], predicate: impl Fn(&PathNode) -> bool) -> Option<Vec<PathNode>> {
    path.iter()
        .position(predicate)
        .map(|idx| path[..=idx].to_vec())
}

/// The ids of the non-dynamic parameters of `node`.
pub fn non_dynamic_params(node: &PathNode) -> Vec<&Param> {
    node.param_schema().iter().filter(|p| !p.dynamic).collect()
}

/// Every parameter value along `path`, deeper nodes winning.
pub fn path_param_values(path: &[PathNode]) -> ParamValues {
    path.iter().fold(ParamValues::new(), |mut acc, node| {
        acc.extend(node.param_values.iter().map(|(k, v)| (k.clone(), v.clone())));
        acc
    })
}

/// The state names of `path`, root first.
pub fn state_names(path: &[PathNode]) -> Vec<String> {
    path.iter().map(|n| n.state.name().to_string()).collect()
}
