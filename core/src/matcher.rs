//! Name lookup over the registered states.
//!
//! Identifiers are exact names, relative paths (`^` for the parent, a leading
//! `.` for the base state itself), or names matched by a glob-named state
//! such as `app.**`.

use crate::error::StateError;
use crate::state::State;
use crate::target::StateOrName;
use ahash::AHashMap;
use std::sync::Arc;

pub struct StateMatcher<'a> {
    states: &'a AHashMap<String, Arc<State>>,
}

impl<'a> StateMatcher<'a> {
    pub fn new(states: &'a AHashMap<String, Arc<State>>) -> Self {
        Self { states }
    }

    pub fn is_relative(name: &str) -> bool {
        name.starts_with('.') || name.starts_with('^')
    }

    /// Find the registered state for `identifier`.
    ///
    /// A state given by reference is only found if it is the registered
    /// state of that name. Relative names need a `base`.
    pub fn find(
        &self,
        identifier: &StateOrName,
        base: Option<&str>,
        match_glob: bool,
    ) -> Result<Option<Arc<State>>, StateError> {
        let mut name = identifier.name().to_string();
        if Self::is_relative(&name) {
            name = self.resolve_path(&name, base)?;
        }

        if let Some(state) = self.states.get(&name) {
            return Ok(match identifier {
                StateOrName::Name(_) => Some(Arc::clone(state)),
                StateOrName::State(given) if Arc::ptr_eq(given, state) => Some(Arc::clone(state)),
                StateOrName::State(_) => None,
            });
        }

        if matches!(identifier, StateOrName::Name(_)) && match_glob {
            let mut matches = self
                .states
                .values()
                .filter(|s| s.name_glob().is_some_and(|g| g.matches(&name)));
            let found = matches.next().cloned();
            if matches.next().is_some() {
                tracing::warn!(%name, "Name matched more than one glob-named state");
            }
            return Ok(found);
        }
        Ok(None)
    }

    /// Turn a relative name into an absolute one, starting from `base`.
    pub fn resolve_path(&self, name: &str, base: Option<&str>) -> Result<String, StateError> {
        let base_name = base.ok_or_else(|| StateError::NoReferencePoint(name.to_string()))?;
        let base_state = self
            .find(&StateOrName::from(base_name), None, true)?
            .ok_or_else(|| StateError::InvalidRelativePath {
                path: name.to_string(),
                base: base_name.to_string(),
            })?;

        let segments: Vec<&str> = name.split('.').collect();
        let mut current = Arc::clone(&base_state);
        let mut consumed = 0;
        for (idx, segment) in segments.iter().enumerate() {
            if segment.is_empty() && idx == 0 {
                consumed += 1;
                continue;
            }
            if *segment == "^" {
                let parent = current.parent().cloned().ok_or_else(|| {
                    StateError::InvalidRelativePath {
                        path: name.to_string(),
                        base: base_state.name().to_string(),
                    }
                })?;
                current = parent;
                consumed += 1;
                continue;
            }
            break;
        }

        let rel_name = segments[consumed..].join(".");
        let separator = if !current.name().is_empty() && !rel_name.is_empty() {
            "."
        } else {
            ""
        };
        Ok(format!("{}{separator}{rel_name}", current.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{StateBuilder, StateDeclaration};

    fn states() -> AHashMap<String, Arc<State>> {
        let root = Arc::new(State::root());
        let mut map = AHashMap::new();
        map.insert(String::new(), Arc::clone(&root));
        let mut add = |name: &str, parent: &Arc<State>| {
            let state = Arc::new(
                StateBuilder::build(StateDeclaration::new(name), Arc::clone(parent)).unwrap(),
            );
            map.insert(name.to_string(), Arc::clone(&state));
            state
        };
        let user = add("user", &root);
        add("user.detail", &user);
        add("user.list", &user);
        add("docs.**", &root);
        map
    }

    #[test]
    fn exact_and_relative_names() {
        let map = states();
        let matcher = StateMatcher::new(&map);

        let found = matcher.find(&"user.detail".into(), None, true).unwrap();
        assert_eq!(found.unwrap().name(), "user.detail");

        let sibling = matcher.find(&"^.list".into(), Some("user.detail"), true).unwrap();
        assert_eq!(sibling.unwrap().name(), "user.list");

        let child = matcher.find(&".detail".into(), Some("user"), true).unwrap();
        assert_eq!(child.unwrap().name(), "user.detail");

        assert_eq!(matcher.resolve_path("^", Some("user")).unwrap(), "");
        assert_eq!(matcher.resolve_path("^.^", Some("user.detail")).unwrap(), "");
    }

    #[test]
    fn relative_paths_need_a_valid_base() {
        let map = states();
        let matcher = StateMatcher::new(&map);

        assert_eq!(
            matcher.find(&"^.list".into(), None, true).unwrap_err(),
            StateError::NoReferencePoint("^.list".into())
        );
        assert!(matches!(
            matcher.resolve_path("^.^", Some("user")),
            Err(StateError::InvalidRelativePath { .. })
        ));
    }

    #[test]
    fn glob_named_states_catch_matching_names() {
        let map = states();
        let matcher = StateMatcher::new(&map);

        let found = matcher.find(&"docs.guide.intro".into(), None, true).unwrap();
        assert_eq!(found.unwrap().name(), "docs.**");
        assert!(matcher.find(&"docs.guide".into(), None, false).unwrap().is_none());
        assert!(matcher.find(&"nothing".into(), None, true).unwrap().is_none());
    }

    #[test]
    fn foreign_state_references_are_not_found() {
        let map = states();
        let matcher = StateMatcher::new(&map);
        let stranger = Arc::new(
            StateBuilder::build(StateDeclaration::new("user"), Arc::new(State::root())).unwrap(),
        );

        assert!(matcher.find(&StateOrName::State(stranger), None, true).unwrap().is_none());
        let registered = map.get("user").cloned().unwrap();
        assert!(matcher.find(&StateOrName::State(registered), None, true).unwrap().is_some());
    }
}
