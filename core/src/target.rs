//! Target states and transition options.
//!
//! A [`TargetState`] is where a caller wants to go: an identifier, the state it
//! resolved to (if any), raw parameter values, and [`TransitionOptions`]. It is
//! a plain value. An unresolvable identifier still produces a target; it is
//! simply not [`valid`](TargetState::valid).

use crate::param::ParamValues;
use crate::state::State;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A state given by name or by reference.
#[derive(Clone)]
pub enum StateOrName {
    Name(String),
    State(Arc<State>),
}

impl StateOrName {
    pub fn name(&self) -> &str {
        match self {
            StateOrName::Name(name) => name,
            StateOrName::State(state) => state.name(),
        }
    }
}

impl fmt::Debug for StateOrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateOrName::Name(name) => write!(f, "Name({name:?})"),
            StateOrName::State(state) => write!(f, "State({:?})", state.name()),
        }
    }
}

impl From<&str> for StateOrName {
    fn from(name: &str) -> Self {
        StateOrName::Name(name.to_string())
    }
}

impl From<String> for StateOrName {
    fn from(name: String) -> Self {
        StateOrName::Name(name)
    }
}

impl From<Arc<State>> for StateOrName {
    fn from(state: Arc<State>) -> Self {
        StateOrName::State(state)
    }
}

impl From<&Arc<State>> for StateOrName {
    fn from(state: &Arc<State>) -> Self {
        StateOrName::State(Arc::clone(state))
    }
}

/// How the location layer should record a successful transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocationMode {
    /// Leave the location alone.
    No,
    #[default]
    Push,
    Replace,
}

/// Which states are exited and re-entered even if unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReloadOption {
    #[default]
    No,
    /// Everything below the root.
    All,
    /// The named state and its descendants.
    State(String),
}

/// What started a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionSource {
    #[default]
    Unknown,
    Url,
    Sref,
    Redirect,
}

#[derive(Debug, Clone)]
pub struct TransitionOptions {
    pub location: LocationMode,
    /// Base state for relative identifiers (`^`, `.child`).
    pub relative: Option<String>,
    /// Carry over parameter values from the current path.
    pub inherit: bool,
    /// Whether the default error handler hears about rejections.
    pub notify: bool,
    pub reload: ReloadOption,
    /// Set from `reload` when the transition is created.
    pub reload_state: Option<Arc<State>>,
    /// Whether this transition may replace one already running.
    pub supersede: bool,
    pub source: TransitionSource,
    /// Caller data, untouched by the engine.
    pub custom: Value,
}

impl Default for TransitionOptions {
    fn default() -> Self {
        Self {
            location: LocationMode::Push,
            relative: None,
            inherit: false,
            notify: true,
            reload: ReloadOption::No,
            reload_state: None,
            supersede: true,
            source: TransitionSource::Unknown,
            custom: Value::Null,
        }
    }
}

impl TransitionOptions {
    pub fn relative(mut self, base: impl Into<String>) -> Self {
        self.relative = Some(base.into());
        self
    }

    pub fn inherit(mut self, inherit: bool) -> Self {
        self.inherit = inherit;
        self
    }

    pub fn location(mut self, location: LocationMode) -> Self {
        self.location = location;
        self
    }

    pub fn reload(mut self, reload: ReloadOption) -> Self {
        self.reload = reload;
        self
    }

    pub fn supersede(mut self, supersede: bool) -> Self {
        self.supersede = supersede;
        self
    }

    pub fn source(mut self, source: TransitionSource) -> Self {
        self.source = source;
        self
    }

    pub fn custom(mut self, custom: Value) -> Self {
        self.custom = custom;
        self
    }
}

/// A requested destination.
#[derive(Clone)]
pub struct TargetState {
    identifier: StateOrName,
    definition: Option<Arc<State>>,
    params: ParamValues,
    options: TransitionOptions,
    resolution_error: Option<String>,
}

impl TargetState {
    /// A target for `definition`, the state `identifier` resolved to.
    pub fn new(
        identifier: StateOrName,
        definition: Option<Arc<State>>,
        params: ParamValues,
        options: TransitionOptions,
    ) -> Self {
        Self {
            identifier,
            definition,
            params,
            options,
            resolution_error: None,
        }
    }

    /// A target whose identifier could not be looked up at all.
    pub fn unresolvable(
        identifier: StateOrName,
        params: ParamValues,
        options: TransitionOptions,
        error: impl Into<String>,
    ) -> Self {
        Self {
            identifier,
            definition: None,
            params,
            options,
            resolution_error: Some(error.into()),
        }
    }

    /// The resolved state name, or the identifier as given.
    pub fn name(&self) -> &str {
        match &self.definition {
            Some(state) => state.name(),
            None => self.identifier.name(),
        }
    }

    pub fn identifier(&self) -> &StateOrName {
        &self.identifier
    }

    pub fn params(&self) -> &ParamValues {
        &self.params
    }

    pub fn state(&self) -> Option<&Arc<State>> {
        self.definition.as_ref()
    }

    pub fn options(&self) -> &TransitionOptions {
        &self.options
    }

    pub fn exists(&self) -> bool {
        self.definition.is_some()
    }

    pub fn valid(&self) -> bool {
        self.error().is_none()
    }

    /// Why this target cannot be transitioned to, if it cannot.
    pub fn error(&self) -> Option<String> {
        if let Some(error) = &self.resolution_error {
            return Some(error.clone());
        }
        if self.definition.is_some() {
            return None;
        }
        match &self.options.relative {
            Some(base) => Some(format!(
                "Could not resolve '{}' from state '{base}'",
                self.name()
            )),
            None => Some(format!("No such state '{}'", self.name())),
        }
    }

    /// A copy with `params` merged over the current values, or replacing them.
    pub fn with_params(&self, params: ParamValues, replace: bool) -> Self {
        let params = if replace {
            params
        } else {
            let mut merged = self.params.clone();
            merged.extend(params);
            merged
        };
        Self {
            params,
            ..self.clone()
        }
    }

    pub fn with_options(&self, options: TransitionOptions) -> Self {
        Self {
            options,
            ..self.clone()
        }
    }

    /// A copy pointing at another, already resolved, state.
    pub fn with_definition(&self, identifier: StateOrName, definition: Option<Arc<State>>) -> Self {
        Self {
            identifier,
            definition,
            resolution_error: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = serde_json::to_string(&self.params).unwrap_or_default();
        write!(f, "'{}'{params}", self.name())
    }
}

impl fmt::Debug for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetState")
            .field("identifier", &self.identifier)
            .field("exists", &self.exists())
            .field("params", &self.params)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{StateBuilder, StateDeclaration};
    use serde_json::json;

    #[test]
    fn missing_definition_explains_itself() {
        let target = TargetState::new("nope".into(), None, ParamValues::new(), TransitionOptions::default());
        assert!(!target.valid());
        assert_eq!(target.error().as_deref(), Some("No such state 'nope'"));

        let relative = target.with_options(TransitionOptions::default().relative("home"));
        assert_eq!(
            relative.error().as_deref(),
            Some("Could not resolve 'nope' from state 'home'")
        );
    }

    #[test]
    fn params_merge_or_replace() {
        let state = Arc::new(
            StateBuilder::build(StateDeclaration::new("home"), Arc::new(State::root())).unwrap(),
        );
        let target = TargetState::new(
            (&state).into(),
            Some(state.clone()),
            [("a".to_string(), json!(1))].into(),
            TransitionOptions::default(),
        );
        assert!(target.valid());

        let merged = target.with_params([("b".to_string(), json!(2))].into(), false);
        assert_eq!(merged.params().len(), 2);
        let replaced = target.with_params([("b".to_string(), json!(2))].into(), true);
        assert_eq!(replaced.params().len(), 1);
        assert_eq!(replaced.to_string(), r#"'home'{"b":2}"#);
    }

    #[test]
    fn option_defaults() {
        let options = TransitionOptions::default();
        assert_eq!(options.location, LocationMode::Push);
        assert!(!options.inherit);
        assert!(options.notify);
        assert!(options.supersede);
        assert_eq!(options.reload, ReloadOption::No);
    }
}
