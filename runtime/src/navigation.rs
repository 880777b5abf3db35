//! Navigation: `go`, `transition_to`, `reload` and the current-state queries.

use crate::router::{ErrorHandler, InvalidCallback, Router};
use crate::transition::Transition;
use arbor_core::glob::Glob;
use arbor_core::param::{ParamValues, params_equal};
use arbor_core::path::path_param_values;
use arbor_core::rejection::{Rejection, RejectionDetail, RejectionKind};
use arbor_core::state::State;
use arbor_core::target::{ReloadOption, StateOrName, TargetState, TransitionOptions};
use std::sync::Arc;

impl Router {
    /// Build a [`TargetState`], resolving `options.reload` to a state.
    ///
    /// Lookup failures produce an invalid target.
    pub fn target(
        &self,
        identifier: impl Into<StateOrName>,
        params: ParamValues,
        mut options: TransitionOptions,
    ) -> TargetState {
        let identifier = identifier.into();
        match options.reload.clone() {
            ReloadOption::No => options.reload_state = None,
            ReloadOption::All => options.reload_state = Some(Arc::clone(self.registry().root())),
            ReloadOption::State(name) => {
                match self.registry().get(name.as_str(), options.relative.as_deref()) {
                    Ok(Some(state)) => options.reload_state = Some(state),
                    _ => {
                        return TargetState::unresolvable(
                            identifier,
                            params,
                            options,
                            format!("No such reload state '{name}'"),
                        );
                    }
                }
            }
        }
        self.registry().target(identifier, params, options)
    }

    /// Transition relative to the current state, inheriting its parameters.
    ///
    /// Explicit `options` keep their own `inherit`; a missing `relative`
    /// base defaults to the current state.
    pub async fn go(
        &self,
        to: impl Into<StateOrName>,
        params: ParamValues,
        options: Option<TransitionOptions>,
    ) -> Result<Arc<State>, Rejection> {
        let current = self.globals().current().name().to_string();
        let options = match options {
            Some(mut options) => {
                options.relative.get_or_insert(current);
                options
            }
            None => TransitionOptions::default().relative(current).inherit(true),
        };
        self.transition_to(to, params, options).await
    }

    /// Create and run a transition, following redirects until it settles.
    ///
    /// Ignored transitions resolve to the current state. When the target is
    /// the one the running transition is already heading to, that is the
    /// state before the running transition settles: await the running
    /// transition (see [`Globals::transition`](crate::Globals::transition))
    /// to observe where it lands.
    pub async fn transition_to(
        &self,
        to: impl Into<StateOrName>,
        params: ParamValues,
        options: TransitionOptions,
    ) -> Result<Arc<State>, Rejection> {
        let router = self.arc()?;
        let mut target = self.target(to, params, options);

        if !target.exists() {
            target = self.handle_invalid_target(target)?;
        }
        if let Some(error) = target.error() {
            return Err(Rejection::invalid(error));
        }
        if !target.options().supersede && self.globals().transition().is_some() {
            return Err(Rejection::ignored(RejectionDetail::Message(
                "Another transition is in progress and supersede has been set to false".into(),
            )));
        }

        let notify = target.options().notify;
        let mut transition = Transition::create(&router, self.globals().current_path(), target, None)
            .map_err(|rejection| self.report(rejection, notify))?;

        loop {
            let rejection = match transition.run().await {
                Ok(state) => return Ok(state),
                Err(rejection) => rejection,
            };
            match rejection.kind {
                RejectionKind::Ignored => return Ok(self.globals().current()),
                RejectionKind::Aborted => return Err(rejection),
                RejectionKind::Superseded if rejection.is_redirect() => {
                    let Some(target) = rejection.redirect_target().cloned() else {
                        return Err(rejection);
                    };
                    transition = transition
                        .redirect(target)
                        .map_err(|rejection| self.report(rejection, notify))?;
                }
                _ => return Err(self.report(rejection, notify)),
            }
        }
    }

    /// Ask the invalid-target callbacks for a replacement target.
    fn handle_invalid_target(&self, target: TargetState) -> Result<TargetState, Rejection> {
        let from = TargetState::new(
            StateOrName::State(self.globals().current()),
            Some(self.globals().current()),
            self.globals().params(),
            TransitionOptions::default(),
        );
        let callbacks = self.invalid_callbacks.read().clone();
        for callback in callbacks {
            let Some(replacement) = callback(&target, &from) else {
                continue;
            };
            tracing::debug!(from = %target, to = %replacement, "Invalid target replaced");
            return Ok(self.target(
                replacement.identifier().clone(),
                replacement.params().clone(),
                replacement.options().clone(),
            ));
        }
        Err(Rejection::invalid(
            target.error().unwrap_or_else(|| format!("No such state '{}'", target.name())),
        ))
    }

    fn report(&self, rejection: Rejection, notify: bool) -> Rejection {
        if notify {
            let handler = Arc::clone(&self.error_handler.read());
            handler(&rejection);
        }
        rejection
    }

    /// Re-run the current state, re-entering `state` and its descendants
    /// (everything when `None`).
    pub async fn reload(&self, state: Option<StateOrName>) -> Result<Arc<State>, Rejection> {
        let reload = match state {
            Some(state) => ReloadOption::State(state.name().to_string()),
            None => ReloadOption::All,
        };
        let mut options = TransitionOptions::default().reload(reload).inherit(false);
        options.notify = false;
        self.transition_to(self.globals().current(), self.globals().params(), options)
            .await
    }

    pub fn current(&self) -> Arc<State> {
        self.globals().current()
    }

    pub fn params(&self) -> ParamValues {
        self.globals().params()
    }

    /// Whether the current state is exactly `state`, with `params` if given.
    ///
    /// `None` when `state` does not resolve.
    pub fn is(
        &self,
        state: impl Into<StateOrName>,
        params: Option<&ParamValues>,
        relative: Option<&str>,
    ) -> Option<bool> {
        let current = self.globals().current();
        let base = relative.unwrap_or_else(|| current.name());
        let state = self.registry().get(state, Some(base)).ok().flatten()?;
        if !Arc::ptr_eq(&state, &current) {
            return Some(false);
        }
        Some(params.is_none_or(|params| self.params_match(&state, params)))
    }

    /// Whether the current state is `state` or one of its descendants.
    ///
    /// A glob name is matched against the current state's name.
    pub fn includes(
        &self,
        state: impl Into<StateOrName>,
        params: Option<&ParamValues>,
        relative: Option<&str>,
    ) -> Option<bool> {
        let current = self.globals().current();
        let mut identifier = state.into();
        let glob = match &identifier {
            StateOrName::Name(name) => Glob::from_glob_str(name),
            StateOrName::State(_) => None,
        };
        if let Some(glob) = glob {
            if !glob.matches(current.name()) {
                return Some(false);
            }
            identifier = StateOrName::State(Arc::clone(&current));
        }

        let base = relative.unwrap_or_else(|| current.name());
        let state = self.registry().get(identifier, Some(base)).ok().flatten()?;
        if !current.includes(state.name()) {
            return Some(false);
        }
        Some(params.is_none_or(|params| self.params_match(&state, params)))
    }

    fn params_match(&self, state: &Arc<State>, params: &ParamValues) -> bool {
        let schema: Vec<_> = state
            .inherited_params()
            .into_iter()
            .filter(|p| params.contains_key(&p.id))
            .collect();
        let normalized: ParamValues = schema
            .iter()
            .map(|p| (p.id.clone(), p.value(params.get(&p.id))))
            .collect();
        let current = path_param_values(&self.globals().current_path());
        params_equal(&schema, &normalized, &current)
    }

    /// Called, in registration order, when a target state does not exist.
    pub fn on_invalid<F>(&self, callback: F)
    where
        F: Fn(&TargetState, &TargetState) -> Option<TargetState> + Send + Sync + 'static,
    {
        let callback: InvalidCallback = Arc::new(callback);
        self.invalid_callbacks.write().push(callback);
    }

    pub fn default_error_handler(&self) -> ErrorHandler {
        Arc::clone(&self.error_handler.read())
    }

    pub fn set_default_error_handler<F>(&self, handler: F)
    where
        F: Fn(&Rejection) + Send + Sync + 'static,
    {
        *self.error_handler.write() = Arc::new(handler);
    }
}
