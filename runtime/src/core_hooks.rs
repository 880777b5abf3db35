//! The hooks every router registers on itself.
//!
//! | event       | priority | hook                                   |
//! |-------------|----------|----------------------------------------|
//! | on_before   | MAX      | reject invalid targets and params      |
//! | on_before   | -9999    | ignore transitions that change nothing |
//! | on_start    | 1000     | resolve EAGER dependencies             |
//! | on_start    | 0        | follow state redirects                 |
//! | on_exit     | 0        | state `on_exit` callbacks              |
//! | on_retain   | 0        | state `on_retain` callbacks            |
//! | on_enter    | 1000     | resolve LAZY dependencies of the state |
//! | on_enter    | 0        | state `on_enter` callbacks             |
//! | on_finish   | 1000     | resolve whatever is left               |
//! | on_create   | 0        | publish globals on success (10000)     |
//! | on_success  | 0        | sync views, then update the location   |

use crate::event::PathType;
use crate::hook::{HookMatchCriteria, HookMatchCriterion, HookOptions, HookResult};
use crate::location::navigable;
use crate::router::Router;
use crate::state_hooks::{StateCallback, StateHooks, state_hooks};
use crate::transition::{IgnoredReason, Transition};
use arbor_core::rejection::{Rejection, RejectionDetail};
use arbor_core::resolvable::PolicyWhen;
use arbor_core::state::State;
use arbor_core::target::{LocationMode, TransitionSource};
use arbor_core::trace::TraceEvent;
use std::sync::Arc;

const RESOLVE_PRIORITY: i32 = 1000;
const GLOBALS_PRIORITY: i32 = 10000;
const IGNORED_PRIORITY: i32 = -9999;

pub(crate) fn register_all(router: &Router) {
    register_invalid_check(router);
    register_ignored_check(router);
    register_redirect_to(router);
    register_state_callbacks(router);
    register_resolve_hooks(router);
    register_update_globals(router);
    register_view_sync(router);
    register_location_update(router);
}

fn register_invalid_check(router: &Router) {
    router.transition_service().on_before(
        HookMatchCriteria::new(),
        |transition, _| match transition.error() {
            Some(rejection) => Err(rejection.into()),
            None => Ok(HookResult::Continue),
        },
        HookOptions::priority(i32::MAX),
    );
}

fn register_ignored_check(router: &Router) {
    router.transition_service().on_before(
        HookMatchCriteria::new(),
        |transition, _| {
            let Some(reason) = transition.ignored_reason() else {
                return Ok(HookResult::Continue);
            };
            tracing::debug!(transition = %transition, reason = reason.as_str(), "Transition ignored");
            transition.trace(TraceEvent::TransitionIgnored {
                transition_id: transition.id(),
                reason: reason.as_str().to_string(),
            });
            if reason == IgnoredReason::SameAsCurrent {
                if let Some(pending) = transition.router().and_then(|r| r.globals().transition()) {
                    pending.abort();
                }
            }
            Err(Rejection::ignored(RejectionDetail::Message(reason.as_str().to_string())).into())
        },
        HookOptions::priority(IGNORED_PRIORITY),
    );
}

fn redirects(state: &Arc<State>, _: &Transition) -> bool {
    state.redirect_to().is_some() || state_hooks(state).is_some_and(|hooks| hooks.redirect.is_some())
}

fn register_redirect_to(router: &Router) {
    router.transition_service().on_start(
        HookMatchCriteria::new().to(HookMatchCriterion::predicate(redirects)),
        |transition, _| {
            let to = transition.to_state();
            if let Some(redirect) = state_hooks(&to).and_then(|hooks| hooks.redirect.clone()) {
                return Ok(match redirect(transition)? {
                    Some(target) => HookResult::Redirect(target),
                    None => HookResult::Continue,
                });
            }
            let (Some(name), Some(router)) = (to.redirect_to(), transition.router()) else {
                return Ok(HookResult::Continue);
            };
            Ok(HookResult::Redirect(router.target(
                name,
                transition.params(),
                transition.options().clone(),
            )))
        },
        HookOptions::default(),
    );
}

fn register_state_callbacks(router: &Router) {
    fn callback_of(pick: fn(&StateHooks) -> Option<&StateCallback>) -> HookMatchCriterion {
        HookMatchCriterion::predicate(move |state: &Arc<State>, _: &Transition| {
            state_hooks(state).and_then(pick).is_some()
        })
    }

    fn invoke(
        pick: fn(&StateHooks) -> Option<&StateCallback>,
    ) -> impl Fn(&Arc<Transition>, Option<&Arc<State>>) -> anyhow::Result<HookResult> + Send + Sync + 'static
    {
        move |transition: &Arc<Transition>, state: Option<&Arc<State>>| {
            let Some(state) = state else {
                return Ok(HookResult::Continue);
            };
            match state_hooks(state).and_then(pick) {
                Some(callback) => callback(transition, state),
                None => Ok(HookResult::Continue),
            }
        }
    }

    let exit: fn(&StateHooks) -> Option<&StateCallback> = |hooks| hooks.on_exit.as_ref();
    let retain: fn(&StateHooks) -> Option<&StateCallback> = |hooks| hooks.on_retain.as_ref();
    let enter: fn(&StateHooks) -> Option<&StateCallback> = |hooks| hooks.on_enter.as_ref();

    let service = router.transition_service();
    service.on_exit(
        HookMatchCriteria::new().exiting(callback_of(exit)),
        invoke(exit),
        HookOptions::default(),
    );
    service.on_retain(
        HookMatchCriteria::new().retained(callback_of(retain)),
        invoke(retain),
        HookOptions::default(),
    );
    service.on_enter(
        HookMatchCriteria::new().entering(callback_of(enter)),
        invoke(enter),
        HookOptions::default(),
    );
}

fn register_resolve_hooks(router: &Router) {
    let service = router.transition_service();

    service.on_start(
        HookMatchCriteria::new(),
        |transition, _| {
            let context = transition.resolve_context();
            Ok(HookResult::pending(async move {
                context.resolve_path(PolicyWhen::Eager).await?;
                Ok(HookResult::Continue)
            }))
        },
        HookOptions::priority(RESOLVE_PRIORITY),
    );

    service.on_enter(
        HookMatchCriteria::new().entering(HookMatchCriterion::Any),
        |transition, state| {
            let Some(state) = state else {
                return Ok(HookResult::Continue);
            };
            let context = transition.resolve_context().sub_context(state);
            Ok(HookResult::pending(async move {
                context.resolve_path(PolicyWhen::Lazy).await?;
                Ok(HookResult::Continue)
            }))
        },
        HookOptions::priority(RESOLVE_PRIORITY),
    );

    service.on_finish(
        HookMatchCriteria::new(),
        |transition, _| {
            let context = transition.resolve_context();
            Ok(HookResult::pending(async move {
                context.resolve_path(PolicyWhen::Lazy).await?;
                Ok(HookResult::Continue)
            }))
        },
        HookOptions::priority(RESOLVE_PRIORITY),
    );
}

fn register_update_globals(router: &Router) {
    router.transition_service().on_create(
        HookMatchCriteria::new(),
        |transition, _| {
            transition.on_success(
                HookMatchCriteria::new(),
                |transition, _| {
                    if let Some(router) = transition.router() {
                        if !router.globals().succeeded(transition) {
                            tracing::debug!(transition = %transition, "Newer transition already succeeded");
                        }
                    }
                    Ok(HookResult::Continue)
                },
                HookOptions::priority(GLOBALS_PRIORITY),
            );
            Ok(HookResult::Continue)
        },
        HookOptions::default(),
    );
}

fn register_view_sync(router: &Router) {
    router.transition_service().on_success(
        HookMatchCriteria::new(),
        |transition, _| {
            let Some(router) = transition.router() else {
                return Ok(HookResult::Continue);
            };
            let exiting = transition.views(PathType::Exiting, None);
            let entering = transition.views(PathType::Entering, None);
            for config in &exiting {
                router.views().deactivate(config);
            }
            for config in &entering {
                router.views().activate(config);
            }
            router.views().sync();
            transition.trace(TraceEvent::ViewsSynced {
                transition_id: transition.id(),
                activated: entering.len(),
                deactivated: exiting.len(),
            });
            Ok(HookResult::Continue)
        },
        HookOptions::default(),
    );
}

fn register_location_update(router: &Router) {
    router.transition_service().on_success(
        HookMatchCriteria::new(),
        |transition, _| {
            let options = transition.options();
            if options.source == TransitionSource::Url || options.location == LocationMode::No {
                return Ok(HookResult::Continue);
            }
            let Some(router) = transition.router() else {
                return Ok(HookResult::Continue);
            };
            let (Some(sink), Some(state)) = (router.location().cloned(), navigable(&transition.to_state()))
            else {
                return Ok(HookResult::Continue);
            };
            let params = transition.params();
            let replace = options.location == LocationMode::Replace;
            Ok(HookResult::pending(async move {
                sink.update(state, params, replace).await?;
                Ok(HookResult::Continue)
            }))
        },
        HookOptions::default(),
    );
}
