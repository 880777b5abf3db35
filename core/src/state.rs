//! State declarations and the built, immutable [`State`] tree nodes.
//!
//! A [`StateDeclaration`] is the plain description a caller registers. Once its
//! parent is available, [`StateBuilder::build`] turns it into a [`State`] that
//! links to that parent. Built states are never mutated; deregistering a state
//! drops it from the registry and newly created paths stop referring to it.

use crate::error::StateError;
use crate::extensions::Extensions;
use crate::glob::Glob;
use crate::param::{Param, ParamDeclaration};
use crate::resolvable::{Resolvable, ResolvePolicy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A view this state contributes, handed to the view layer untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDeclaration {
    /// The view slot this declaration targets.
    pub name: String,
    /// Selects the view-config factory.
    #[serde(default = "default_view_kind")]
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

fn default_view_kind() -> String {
    "default".to_string()
}

/// The plain description of a state.
///
/// The serializable part can come from configuration; resolvables and
/// extensions are attached in code.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StateDeclaration {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub params: Vec<ParamDeclaration>,
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Name of a state to redirect to whenever this state is targeted.
    #[serde(default)]
    pub redirect_to: Option<String>,
    #[serde(default)]
    pub resolve_policy: ResolvePolicy,
    #[serde(default)]
    pub views: Vec<ViewDeclaration>,
    #[serde(skip)]
    pub resolvables: Vec<Resolvable>,
    #[serde(skip)]
    pub extensions: Extensions,
}

impl StateDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn abstract_state(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn param(mut self, param: ParamDeclaration) -> Self {
        self.params.push(param);
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn redirect_to(mut self, target: impl Into<String>) -> Self {
        self.redirect_to = Some(target.into());
        self
    }

    pub fn resolve(mut self, resolvable: Resolvable) -> Self {
        self.resolvables.push(resolvable);
        self
    }

    pub fn resolve_policy(mut self, policy: ResolvePolicy) -> Self {
        self.resolve_policy = policy;
        self
    }

    pub fn view(mut self, view: ViewDeclaration) -> Self {
        self.views.push(view);
        self
    }

    pub fn extension<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    /// The fully qualified name: `parent.name` when a parent is given separately.
    pub fn full_name(&self) -> Result<String, StateError> {
        match &self.parent {
            Some(parent) if !self.name.contains('.') && !parent.is_empty() => {
                Ok(format!("{parent}.{}", self.name))
            }
            Some(parent) if self.name.contains('.') && !parent.is_empty() => {
                Err(StateError::DottedNameWithParent(self.name.clone()))
            }
            _ => Ok(self.name.clone()),
        }
    }

    /// The name of the state this declaration must be attached to.
    pub fn parent_name(&self) -> Result<String, StateError> {
        let mut segments: Vec<&str> = self.name.split('.').collect();
        if segments.last() == Some(&"**") {
            segments.pop();
        }
        segments.pop();
        if !segments.is_empty() {
            if self.parent.as_deref().is_some_and(|p| !p.is_empty()) {
                return Err(StateError::DottedNameWithParent(self.name.clone()));
            }
            return Ok(segments.join("."));
        }
        Ok(self.parent.clone().unwrap_or_default())
    }
}

/// A node of the state tree.
pub struct State {
    name: String,
    parent: Option<Arc<State>>,
    depth: usize,
    is_abstract: bool,
    url: Option<String>,
    params: Vec<Param>,
    data: Map<String, Value>,
    redirect_to: Option<String>,
    resolve_policy: ResolvePolicy,
    resolvables: Vec<Arc<Resolvable>>,
    views: Vec<ViewDeclaration>,
    extensions: Extensions,
    name_glob: Option<Glob>,
}

impl State {
    /// The implicit root of every tree: abstract, unnamed, parameterless.
    pub fn root() -> Self {
        Self {
            name: String::new(),
            parent: None,
            depth: 0,
            is_abstract: true,
            url: None,
            params: Vec::new(),
            data: Map::new(),
            redirect_to: None,
            resolve_policy: ResolvePolicy::default(),
            resolvables: Vec::new(),
            views: Vec::new(),
            extensions: Extensions::new(),
            name_glob: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<State>> {
        self.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Number of ancestors; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Parameters declared by this state itself.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param(&self, id: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.id == id)
    }

    /// Parameters of this state and all of its ancestors, root first.
    pub fn inherited_params(self: &Arc<Self>) -> Vec<Param> {
        self.path()
            .iter()
            .flat_map(|state| state.params.iter().cloned())
            .collect()
    }

    /// Own data merged over the parent's.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn redirect_to(&self) -> Option<&str> {
        self.redirect_to.as_deref()
    }

    pub fn resolve_policy(&self) -> ResolvePolicy {
        self.resolve_policy
    }

    /// The declared dependency templates. Paths clone these per node.
    pub fn resolvables(&self) -> &[Arc<Resolvable>] {
        &self.resolvables
    }

    pub fn views(&self) -> &[ViewDeclaration] {
        &self.views
    }

    pub fn extension<T: 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    /// Set when the state name is itself a glob pattern.
    pub fn name_glob(&self) -> Option<&Glob> {
        self.name_glob.as_ref()
    }

    /// The states from the root down to this one.
    pub fn path(self: &Arc<Self>) -> Vec<Arc<State>> {
        let mut path = vec![Arc::clone(self)];
        let mut current = self.parent.clone();
        while let Some(state) = current {
            current = state.parent.clone();
            path.push(state);
        }
        path.reverse();
        path
    }

    /// Whether this state is `name` or a descendant of it.
    pub fn includes(&self, name: &str) -> bool {
        let mut current = Some(self);
        while let Some(state) = current {
            if state.name == name {
                return true;
            }
            current = state.parent.as_deref();
        }
        false
    }

    pub fn same(a: &Arc<State>, b: &Arc<State>) -> bool {
        Arc::ptr_eq(a, b)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("depth", &self.depth)
            .field("abstract", &self.is_abstract)
            .field("params", &self.params.iter().map(|p| &p.id).collect::<Vec<_>>())
            .field("resolvables", &self.resolvables.len())
            .finish()
    }
}

/// Pure construction of a [`State`] from a declaration and its parent.
pub struct StateBuilder;

impl StateBuilder {
    pub fn build(decl: StateDeclaration, parent: Arc<State>) -> Result<State, StateError> {
        let name = decl.full_name()?;
        if name.is_empty() {
            return Err(StateError::InvalidName);
        }

        let mut data = parent.data.clone();
        data.extend(decl.data);

        let name_glob = if Glob::is_glob(&name) {
            Some(Glob::new(&name)?)
        } else {
            None
        };

        Ok(State {
            depth: parent.depth + 1,
            parent: Some(parent),
            is_abstract: decl.is_abstract,
            url: decl.url,
            params: decl.params.iter().map(Param::from_declaration).collect(),
            data,
            redirect_to: decl.redirect_to,
            resolve_policy: decl.resolve_policy,
            resolvables: decl.resolvables.into_iter().map(Arc::new).collect(),
            views: decl.views,
            extensions: decl.extensions,
            name_glob,
            name,
        })
    }
}
