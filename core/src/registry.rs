//! # StateRegistry: the state tree and its registration queue
//!
//! Declarations are queued and built once their parent exists, so children
//! may be registered before their parents. A declaration whose parent never
//! shows up stays queued; flushing stops quietly once a full pass over the
//! queue makes no progress.

use crate::error::StateError;
use crate::matcher::StateMatcher;
use crate::param::ParamValues;
use crate::state::{State, StateBuilder, StateDeclaration};
use crate::target::{StateOrName, TargetState, TransitionOptions};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// What happened to the states handed to a registry listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatesChanged {
    Registered,
    Deregistered,
}

pub type StatesListener = Arc<dyn Fn(StatesChanged, &[Arc<State>]) + Send + Sync>;

/// Identifies a registry listener for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Inner {
    states: AHashMap<String, Arc<State>>,
    queue: VecDeque<StateDeclaration>,
    listeners: Vec<(ListenerId, StatesListener)>,
    next_listener: u64,
}

pub struct StateRegistry {
    root: Arc<State>,
    inner: Mutex<Inner>,
}

impl StateRegistry {
    pub fn new() -> Self {
        let root = Arc::new(State::root());
        let mut states = AHashMap::new();
        states.insert(String::new(), Arc::clone(&root));
        Self {
            root,
            inner: Mutex::new(Inner {
                states,
                queue: VecDeque::new(),
                listeners: Vec::new(),
                next_listener: 0,
            }),
        }
    }

    /// The implicit root state.
    pub fn root(&self) -> &Arc<State> {
        &self.root
    }

    /// Queue `decl` and build whatever the queue allows.
    ///
    /// Returns the built state, or `None` while its parent is missing.
    /// Listeners hear about every state built on the way, even when a queued
    /// declaration fails.
    pub fn register(&self, decl: StateDeclaration) -> Result<Option<Arc<State>>, StateError> {
        let name = decl.full_name()?;
        if name.is_empty() {
            return Err(StateError::InvalidName);
        }
        decl.parent_name()?;

        let (built, failure, listeners) = {
            let mut inner = self.inner.lock();
            let queued = inner
                .queue
                .iter()
                .any(|d| d.full_name().is_ok_and(|n| n == name));
            if inner.states.contains_key(&name) || queued {
                return Err(StateError::AlreadyDefined(name));
            }
            inner.queue.push_back(decl);
            let (built, failure) = inner.flush();
            (built, failure, inner.listeners.clone())
        };

        if !built.is_empty() {
            tracing::debug!(
                states = ?built.iter().map(|s| s.name()).collect::<Vec<_>>(),
                "States registered"
            );
            notify(&listeners, StatesChanged::Registered, &built);
        }
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(built.into_iter().find(|s| s.name() == name))
    }

    /// Remove a state and all of its descendants, leaves first.
    pub fn deregister(&self, state: impl Into<StateOrName>) -> Result<Vec<Arc<State>>, StateError> {
        let state = state.into();
        let (removed, listeners) = {
            let mut inner = self.inner.lock();
            let target = StateMatcher::new(&inner.states)
                .find(&state, None, false)?
                .ok_or_else(|| StateError::NotFound(state.name().to_string()))?;
            if target.is_root() {
                return Err(StateError::RootState);
            }

            let all: Vec<Arc<State>> = inner.states.values().cloned().collect();
            let mut removed = vec![Arc::clone(&target)];
            let mut generation = vec![target];
            loop {
                let children: Vec<Arc<State>> = all
                    .iter()
                    .filter(|s| {
                        s.parent()
                            .is_some_and(|p| generation.iter().any(|g| Arc::ptr_eq(g, p)))
                    })
                    .cloned()
                    .collect();
                if children.is_empty() {
                    break;
                }
                removed.extend(children.iter().cloned());
                generation = children;
            }
            removed.reverse();

            for state in &removed {
                inner.states.remove(state.name());
            }
            (removed, inner.listeners.clone())
        };

        tracing::debug!(
            states = ?removed.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "States deregistered"
        );
        notify(&listeners, StatesChanged::Deregistered, &removed);
        Ok(removed)
    }

    /// Look up a state, resolving relative names against `base`.
    pub fn get(
        &self,
        state: impl Into<StateOrName>,
        base: Option<&str>,
    ) -> Result<Option<Arc<State>>, StateError> {
        let inner = self.inner.lock();
        StateMatcher::new(&inner.states).find(&state.into(), base, true)
    }

    /// Every registered state, the root included.
    pub fn get_all(&self) -> Vec<Arc<State>> {
        let mut states: Vec<Arc<State>> = self.inner.lock().states.values().cloned().collect();
        states.sort_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.name().cmp(b.name())));
        states
    }

    /// Names still waiting for their parent.
    pub fn queued(&self) -> Vec<String> {
        self.inner
            .lock()
            .queue
            .iter()
            .map(|d| d.full_name().unwrap_or_else(|_| d.name.clone()))
            .collect()
    }

    /// Build a [`TargetState`] for `identifier`.
    ///
    /// Lookup failures produce an invalid target rather than an error.
    pub fn target(
        &self,
        identifier: impl Into<StateOrName>,
        params: ParamValues,
        options: TransitionOptions,
    ) -> TargetState {
        let identifier = identifier.into();
        match self.get(identifier.clone(), options.relative.as_deref()) {
            Ok(definition) => TargetState::new(identifier, definition, params, options),
            Err(err) => TargetState::unresolvable(identifier, params, options, err.to_string()),
        }
    }

    pub fn on_states_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(StatesChanged, &[Arc<State>]) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = ListenerId(inner.next_listener);
        inner.next_listener += 1;
        inner.listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(listener, _)| *listener != id);
        inner.listeners.len() != before
    }
}

/// One queued declaration after a build attempt.
enum Attempt {
    Built(Arc<State>),
    Waiting(String, StateDeclaration),
}

impl Inner {
    fn attempt(&mut self, decl: StateDeclaration) -> Result<Attempt, StateError> {
        let name = decl.full_name()?;
        let parent_name = decl.parent_name()?;
        let parent = StateMatcher::new(&self.states).find(
            &StateOrName::Name(parent_name),
            None,
            false,
        )?;
        let Some(parent) = parent else {
            return Ok(Attempt::Waiting(name, decl));
        };
        if self.states.contains_key(&name) {
            return Err(StateError::AlreadyDefined(name));
        }
        let state = Arc::new(StateBuilder::build(decl, parent)?);
        self.states.insert(name, Arc::clone(&state));
        Ok(Attempt::Built(state))
    }

    /// Build every queued declaration whose parent exists.
    ///
    /// A declaration that fails to build leaves the queue; the first such
    /// error comes back alongside everything built in the same pass.
    fn flush(&mut self) -> (Vec<Arc<State>>, Option<StateError>) {
        let mut built = Vec::new();
        let mut failure = None;
        let mut orphans: Vec<String> = Vec::new();
        let mut previous_queue_length: AHashMap<String, usize> = AHashMap::new();

        while let Some(decl) = self.queue.pop_front() {
            let (name, decl) = match self.attempt(decl) {
                Ok(Attempt::Built(state)) => {
                    orphans.retain(|orphan| orphan != state.name());
                    built.push(state);
                    continue;
                }
                Ok(Attempt::Waiting(name, decl)) => (name, decl),
                Err(err) => {
                    tracing::warn!(error = %err, "State declaration dropped from the queue");
                    failure.get_or_insert(err);
                    continue;
                }
            };

            let orphan = orphans.contains(&name);
            let previous = previous_queue_length.insert(name.clone(), self.queue.len());
            if orphan && previous == Some(self.queue.len()) {
                self.queue.push_back(decl);
                break;
            }
            if !orphan {
                orphans.push(name);
            }
            self.queue.push_back(decl);
        }
        (built, failure)
    }
}

fn notify(listeners: &[(ListenerId, StatesListener)], change: StatesChanged, states: &[Arc<State>]) {
    for (_, listener) in listeners {
        listener(change, states);
    }
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StateRegistry")
            .field("states", &inner.states.len())
            .field("queued", &inner.queue.len())
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn names(states: &[Arc<State>]) -> Vec<String> {
        states.iter().map(|s| s.name().to_string()).collect()
    }

    #[test]
    fn children_wait_for_their_parents() {
        let registry = StateRegistry::new();

        let child = registry.register(StateDeclaration::new("x.y")).unwrap();
        assert!(child.is_none());
        assert_eq!(registry.queued(), vec!["x.y"]);

        let parent = registry
            .register(StateDeclaration::new("x").url("/x"))
            .unwrap()
            .unwrap();
        assert!(registry.queued().is_empty());

        let y = registry.get("x.y", None).unwrap().unwrap();
        assert!(Arc::ptr_eq(y.parent().unwrap(), &parent));
    }

    #[test]
    fn stalled_queue_is_left_alone() {
        let registry = StateRegistry::new();
        registry.register(StateDeclaration::new("a.b")).unwrap();
        registry.register(StateDeclaration::new("c.d")).unwrap();

        assert_eq!(registry.queued().len(), 2);
        assert_eq!(registry.get_all().len(), 1);
    }

    #[test]
    fn duplicates_are_rejected() {
        let registry = StateRegistry::new();
        registry.register(StateDeclaration::new("home")).unwrap();
        assert_eq!(
            registry.register(StateDeclaration::new("home")).unwrap_err(),
            StateError::AlreadyDefined("home".into())
        );

        registry.register(StateDeclaration::new("ghost.child")).unwrap();
        assert_eq!(
            registry.register(StateDeclaration::new("child").parent("ghost")).unwrap_err(),
            StateError::AlreadyDefined("ghost.child".into())
        );
    }

    #[test]
    fn deregister_removes_subtree_leaves_first() {
        let registry = StateRegistry::new();
        for name in ["a", "a.b", "a.b.c", "a.d", "e"] {
            registry.register(StateDeclaration::new(name)).unwrap();
        }

        let removed = registry.deregister("a").unwrap();
        assert_eq!(removed.len(), 4);
        assert_eq!(removed.last().unwrap().name(), "a");
        assert_eq!(removed[0].name(), "a.b.c");
        assert_eq!(names(&registry.get_all()), vec!["", "e"]);

        assert_eq!(
            registry.deregister("a").unwrap_err(),
            StateError::NotFound("a".into())
        );
        assert_eq!(registry.deregister("").unwrap_err(), StateError::RootState);
    }

    #[test]
    fn listeners_hear_changes_until_removed() {
        let registry = StateRegistry::new();
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = seen.clone();
        let id = registry.on_states_changed(move |change, states| {
            sink.lock().push((change, names(states)));
        });

        registry.register(StateDeclaration::new("a.b")).unwrap();
        registry.register(StateDeclaration::new("a")).unwrap();
        registry.deregister("a.b").unwrap();
        assert!(registry.remove_listener(id));
        registry.register(StateDeclaration::new("z")).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (StatesChanged::Registered, vec!["a".to_string(), "a.b".to_string()]));
        assert_eq!(seen[1], (StatesChanged::Deregistered, vec!["a.b".to_string()]));
    }

    #[test]
    fn failed_declarations_leave_the_rest_of_the_queue_building() {
        let registry = StateRegistry::new();
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = seen.clone();
        registry.on_states_changed(move |_, states| sink.lock().extend(names(states)));

        registry.register(StateDeclaration::new("x.y")).unwrap();
        assert_eq!(
            registry.register(StateDeclaration::new("z").parent("^")).unwrap_err(),
            StateError::NoReferencePoint("^".into())
        );
        assert_eq!(registry.queued(), vec!["x.y"]);

        {
            let mut inner = registry.inner.lock();
            inner.queue.push_back(StateDeclaration::new("w").parent("^"));
        }
        assert_eq!(
            registry.register(StateDeclaration::new("x")).unwrap_err(),
            StateError::NoReferencePoint("^".into())
        );

        assert!(registry.queued().is_empty());
        assert!(registry.get("x.y", None).unwrap().is_some());
        assert_eq!(*seen.lock(), vec!["x".to_string(), "x.y".to_string()]);
    }

    #[test]
    fn targets_report_lookup_failures() {
        let registry = StateRegistry::new();
        registry.register(StateDeclaration::new("home")).unwrap();

        let ok = registry.target("home", ParamValues::new(), TransitionOptions::default());
        assert!(ok.valid());

        let relative = registry.target("^.x", ParamValues::new(), TransitionOptions::default());
        assert_eq!(
            relative.error().as_deref(),
            Some("No reference point given for path '^.x'")
        );
    }
}
