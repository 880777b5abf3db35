//! # ResolveContext: dependency lookup scoped to a path
//!
//! A context wraps a path. A resolvable on node `n` sees the resolvables of
//! the nodes up to and including `n` (the nearest node wins on duplicate
//! tokens) and, failing that, the host [`Injector`].

use crate::path::{PathNode, state_names, sub_path};
use crate::rejection::{Rejection, RejectionDetail};
use crate::resolvable::{
    Injector, PolicyAsync, PolicyWhen, Resolvable, ResolvePolicy, Resolved, Token,
};
use crate::state::State;
use crate::trace::{Trace, TraceEvent};
use futures_util::future::try_join_all;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ResolveContext {
    path: Vec<PathNode>,
    injector: Option<Arc<dyn Injector>>,
    trace: Option<Arc<Trace>>,
    transition_id: Option<u64>,
}

impl ResolveContext {
    pub fn new(path: Vec<PathNode>) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }

    pub fn with_injector(mut self, injector: Arc<dyn Injector>) -> Self {
        self.injector = Some(injector);
        self
    }

    /// Report resolve events to `trace`, tagged with `transition_id`.
    pub fn with_trace(mut self, trace: Arc<Trace>, transition_id: Option<u64>) -> Self {
        self.trace = Some(trace);
        self.transition_id = transition_id;
        self
    }

    pub fn path(&self) -> &[PathNode] {
        &self.path
    }

    pub fn transition_id(&self) -> Option<u64> {
        self.transition_id
    }

    /// Every token available on the path, without duplicates.
    pub fn tokens(&self) -> Vec<Token> {
        let mut tokens: Vec<Token> = Vec::new();
        for resolvable in self.path.iter().flat_map(|n| n.resolvables.iter()) {
            if !tokens.iter().any(|t| t == resolvable.token()) {
                tokens.push(resolvable.token().to_string());
            }
        }
        tokens
    }

    /// The deepest resolvable for `token`.
    pub fn get_resolvable(&self, token: &str) -> Option<Arc<Resolvable>> {
        self.path
            .iter()
            .flat_map(|n| n.resolvables.iter())
            .filter(|r| r.token() == token)
            .last()
            .cloned()
    }

    /// The node holding `resolvable`.
    pub fn find_node(&self, resolvable: &Arc<Resolvable>) -> Option<&PathNode> {
        self.path
            .iter()
            .find(|n| n.resolvables.iter().any(|r| Arc::ptr_eq(r, resolvable)))
    }

    /// The effective policy: the resolvable's own, then its state's, then the defaults.
    pub fn policy_for(&self, resolvable: &Arc<Resolvable>) -> ResolvePolicy {
        match self.find_node(resolvable) {
            Some(node) => resolvable.policy().or(node.state.resolve_policy()),
            None => resolvable.policy(),
        }
    }

    /// A context limited to the path up to and including `state`.
    pub fn sub_context(&self, state: &Arc<State>) -> Self {
        let path = sub_path(&self.path, |n| Arc::ptr_eq(&n.state, state)).unwrap_or_default();
        Self {
            path,
            injector: self.injector.clone(),
            trace: self.trace.clone(),
            transition_id: self.transition_id,
        }
    }

    /// Add `resolvables` to the node of `state`, replacing any with the same token.
    ///
    /// Returns `false` when `state` is not on the path.
    pub fn add_resolvables(&mut self, resolvables: Vec<Arc<Resolvable>>, state: &Arc<State>) -> bool {
        let Some(node) = self
            .path
            .iter_mut()
            .find(|n| Arc::ptr_eq(&n.state, state))
        else {
            return false;
        };
        node.resolvables
            .retain(|r| !resolvables.iter().any(|added| added.token() == r.token()));
        node.resolvables.extend(resolvables);
        true
    }

    /// Resolve every resolvable on the path selected by `when`.
    ///
    /// `Eager` selects only eager resolvables, `Lazy` selects eager and lazy
    /// ones. `NOWAIT` resolvables are started but not waited for. Each node's
    /// resolvables resolve against the sub-path ending at that node.
    pub async fn resolve_path(&self, when: PolicyWhen) -> Result<Vec<(Token, Resolved)>, Rejection> {
        self.trace_event(TraceEvent::ResolvePath {
            transition_id: self.transition_id,
            path: state_names(&self.path),
            when,
        });

        let mut waits = Vec::new();
        for node in &self.path {
            let sub_context = self.sub_context(&node.state);
            for resolvable in &node.resolvables {
                let policy = self.policy_for(resolvable);
                let selected = match when {
                    PolicyWhen::Eager => policy.when() == PolicyWhen::Eager,
                    PolicyWhen::Lazy => true,
                };
                if !selected {
                    continue;
                }

                let token = resolvable.token().to_string();
                let pending = resolvable.get(&sub_context);
                if policy.async_policy() == PolicyAsync::NoWait {
                    tokio::spawn(async move {
                        if let Err(rejection) = pending.await {
                            tracing::debug!(%token, %rejection, "NOWAIT resolvable failed");
                        }
                    });
                } else {
                    waits.push(async move { pending.await.map(|value| (token, value)) });
                }
            }
        }

        try_join_all(waits).await
    }

    /// The resolvables `resolvable` depends on, in declaration order.
    ///
    /// Tokens not on the visible path come from the injector; a token found
    /// in neither place is an Error-kind rejection.
    pub fn get_dependencies(
        &self,
        resolvable: &Arc<Resolvable>,
    ) -> Result<Vec<Arc<Resolvable>>, Rejection> {
        let visible: Vec<PathNode> = match self.find_node(resolvable) {
            Some(node) => {
                let state = Arc::clone(&node.state);
                sub_path(&self.path, |n| Arc::ptr_eq(&n.state, &state))
                    .unwrap_or_else(|| self.path.clone())
            }
            None => self.path.clone(),
        };
        let available: Vec<&Arc<Resolvable>> = visible
            .iter()
            .flat_map(|n| n.resolvables.iter())
            .filter(|r| !Arc::ptr_eq(r, resolvable))
            .collect();

        resolvable
            .deps()
            .iter()
            .map(|token| {
                if let Some(found) = available.iter().filter(|r| r.token() == token).last() {
                    return Ok(Arc::clone(found));
                }
                self.from_injector(token).ok_or_else(|| not_found(token))
            })
            .collect()
    }

    /// The resolved value for `token`, if it is already available.
    pub fn get(&self, token: &str) -> Option<Resolved> {
        match self.get_resolvable(token) {
            Some(resolvable) => resolvable.data(),
            None => self.injector.as_ref().and_then(|i| i.get(token)),
        }
    }

    /// The value for `token`, resolving it if needed.
    pub async fn get_async(&self, token: &str) -> Result<Resolved, Rejection> {
        let resolvable = match self.get_resolvable(token) {
            Some(resolvable) => resolvable,
            None => self.from_injector(token).ok_or_else(|| not_found(token))?,
        };
        let scoped = match self.find_node(&resolvable) {
            Some(node) => self.sub_context(&Arc::clone(&node.state)),
            None => self.clone(),
        };
        resolvable.get(&scoped).await
    }

    pub fn trace_event(&self, event: TraceEvent) {
        if let Some(trace) = &self.trace {
            trace.emit(event);
        }
    }

    fn from_injector(&self, token: &str) -> Option<Arc<Resolvable>> {
        let value = self.injector.as_ref()?.get(token)?;
        Some(Arc::new(Resolvable::from_value(token, value)))
    }
}

fn not_found(token: &str) -> Rejection {
    Rejection::errored(RejectionDetail::Message(format!(
        "Could not find Dependency Injection token: \"{token}\""
    )))
}

impl fmt::Debug for ResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("path", &state_names(&self.path))
            .field("injector", &self.injector.is_some())
            .field("transition_id", &self.transition_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::ParamValues;
    use crate::path::build_path;
    use crate::rejection::RejectionKind;
    use crate::resolvable::{HostContainer, ResolveOutput, downcast};
    use crate::state::{StateBuilder, StateDeclaration};
    use crate::trace::{Category, RecordingSink};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn child(parent: &Arc<State>, decl: StateDeclaration) -> Arc<State> {
        Arc::new(StateBuilder::build(decl, Arc::clone(parent)).unwrap())
    }

    fn value<T: Send + Sync + 'static>(
        v: T,
    ) -> impl Fn(Vec<Resolved>) -> anyhow::Result<ResolveOutput> + Send + Sync + 'static {
        let v = Arc::new(v);
        move |_| Ok(ResolveOutput::Ready(v.clone()))
    }

    #[tokio::test]
    async fn nearest_node_wins_and_children_see_ancestors() {
        let root = Arc::new(State::root());
        let parent = child(
            &root,
            StateDeclaration::new("p")
                .resolve(Resolvable::new("name", &[], value("parent".to_string())))
                .resolve(Resolvable::new("greeting", &["name"], |args| {
                    let name = downcast::<String>(&args[0]).cloned().unwrap_or_default();
                    Ok(ResolveOutput::ready(format!("hello {name}")))
                })),
        );
        let leaf = child(
            &parent,
            StateDeclaration::new("p.c")
                .resolve(Resolvable::new("name", &[], value("child".to_string())))
                .resolve(Resolvable::new("shout", &["name"], |args| {
                    let name = downcast::<String>(&args[0]).cloned().unwrap_or_default();
                    Ok(ResolveOutput::ready(name.to_uppercase()))
                })),
        );
        let ctx = ResolveContext::new(build_path(&leaf, &ParamValues::new()));

        let greeting = ctx.get_async("greeting").await.unwrap();
        let shout = ctx.get_async("shout").await.unwrap();

        assert_eq!(downcast::<String>(&greeting).unwrap(), "hello parent");
        assert_eq!(downcast::<String>(&shout).unwrap(), "CHILD");
        assert_eq!(ctx.tokens(), vec!["name", "greeting", "shout"]);
    }

    #[tokio::test]
    async fn missing_tokens_fall_back_to_the_injector() {
        let root = Arc::new(State::root());
        let home = child(
            &root,
            StateDeclaration::new("home").resolve(Resolvable::new("user", &["api"], |args| {
                let api = downcast::<&'static str>(&args[0]).copied().unwrap_or("none");
                Ok(ResolveOutput::ready(format!("user from {api}")))
            })),
        );
        let path = build_path(&home, &ParamValues::new());

        let without = ResolveContext::new(path.clone());
        let rejection = without.get_async("user").await.unwrap_err();
        assert_eq!(rejection.kind, RejectionKind::Error);
        assert!(rejection.to_string().contains("Could not find Dependency Injection token: \"api\""));

        let injector = Arc::new(HostContainer::new().with("api", "http"));
        let with = ResolveContext::new(build_path(&home, &ParamValues::new())).with_injector(injector);
        let user = with.get_async("user").await.unwrap();
        assert_eq!(downcast::<String>(&user).unwrap(), "user from http");
    }

    #[tokio::test]
    async fn eager_failure_rejects_without_touching_lazy() {
        let lazy_calls = Arc::new(AtomicUsize::new(0));
        let counter = lazy_calls.clone();
        let root = Arc::new(State::root());
        let home = child(
            &root,
            StateDeclaration::new("home")
                .resolve(
                    Resolvable::new("boom", &[], |_| Err(anyhow::anyhow!("thrown")))
                        .with_policy(ResolvePolicy::eager()),
                )
                .resolve(Resolvable::new("later", &[], move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(ResolveOutput::ready(()))
                })),
        );
        let ctx = ResolveContext::new(build_path(&home, &ParamValues::new()));

        let rejection = ctx.resolve_path(PolicyWhen::Eager).await.unwrap_err();
        assert_eq!(rejection.kind, RejectionKind::Error);
        assert_eq!(rejection.cause().map(|c| c.to_string()), Some("thrown".into()));
        assert_eq!(lazy_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lazy_resolves_everything_and_state_policy_applies() {
        let root = Arc::new(State::root());
        let home = child(
            &root,
            StateDeclaration::new("home")
                .resolve_policy(ResolvePolicy::eager())
                .resolve(Resolvable::new("a", &[], value(1u8)))
                .resolve(Resolvable::new("b", &[], value(2u8)).with_policy(ResolvePolicy::lazy())),
        );
        let ctx = ResolveContext::new(build_path(&home, &ParamValues::new()));

        let eager = ctx.resolve_path(PolicyWhen::Eager).await.unwrap();
        assert_eq!(eager.iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>(), vec!["a"]);

        let all = ctx.resolve_path(PolicyWhen::Lazy).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(ctx.get("b").is_some());
    }

    #[tokio::test]
    async fn nowait_is_not_waited_for() {
        let root = Arc::new(State::root());
        let home = child(
            &root,
            StateDeclaration::new("home").resolve(
                Resolvable::new("slow", &[], |_| {
                    Ok(ResolveOutput::deferred(futures_util::future::pending::<anyhow::Result<u8>>()))
                })
                .with_policy(ResolvePolicy::default().with_async(PolicyAsync::NoWait)),
            ),
        );
        let ctx = ResolveContext::new(build_path(&home, &ParamValues::new()));

        let waited = ctx.resolve_path(PolicyWhen::Lazy).await.unwrap();
        assert!(waited.is_empty());
        assert!(ctx.get("slow").is_none());
    }

    #[tokio::test]
    async fn resolve_events_are_traced() {
        let sink = Arc::new(RecordingSink::new());
        let trace = Arc::new(Trace::with_sink(sink.clone()));
        trace.enable([Category::Resolve]);

        let root = Arc::new(State::root());
        let home = child(
            &root,
            StateDeclaration::new("home").resolve(Resolvable::new("a", &[], value(1u8))),
        );
        let ctx = ResolveContext::new(build_path(&home, &ParamValues::new())).with_trace(trace, Some(9));
        ctx.resolve_path(PolicyWhen::Lazy).await.unwrap();

        let events = sink.events();
        assert!(matches!(
            &events[0],
            TraceEvent::ResolvePath { transition_id: Some(9), when: PolicyWhen::Lazy, .. }
        ));
        assert!(matches!(&events[1], TraceEvent::Resolved { token, .. } if token == "a"));
    }

    #[test]
    fn added_resolvables_replace_same_token() {
        let root = Arc::new(State::root());
        let home = child(
            &root,
            StateDeclaration::new("home").resolve(Resolvable::from_value("a", Arc::new(1u8))),
        );
        let mut ctx = ResolveContext::new(build_path(&home, &ParamValues::new()));

        assert!(ctx.add_resolvables(vec![Arc::new(Resolvable::from_value("a", Arc::new(2u8)))], &home));
        assert_eq!(ctx.path()[1].resolvables.len(), 1);
        assert_eq!(downcast::<u8>(&ctx.get("a").unwrap()), Some(&2));
    }
}
