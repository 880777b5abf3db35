use arbor_core::config::{RouterConfig, TraceConfig};
use arbor_core::resolvable::downcast;
use arbor_core::trace::RecordingSink;
use arbor_runtime::prelude::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

fn router(states: Vec<StateDeclaration>) -> Arc<Router> {
    arbor_core::trace::init_stdout_tracing();
    states
        .into_iter()
        .fold(Router::builder(), |builder, state| builder.state(state))
        .build()
        .unwrap()
}

fn params(value: serde_json::Value) -> ParamValues {
    serde_json::from_value(value).unwrap()
}

fn none() -> ParamValues {
    ParamValues::new()
}

type Log = Arc<Mutex<Vec<String>>>;

fn record_states(
    log: &Log,
) -> impl Fn(&Arc<Transition>, Option<&Arc<State>>) -> anyhow::Result<HookResult> + Send + Sync + 'static
{
    let log = Arc::clone(log);
    move |_: &Arc<Transition>, state: Option<&Arc<State>>| {
        log.lock().push(state.map(|s| s.name().to_string()).unwrap_or_default());
        Ok(HookResult::Continue)
    }
}

#[tokio::test]
async fn go_updates_globals() {
    let router = router(vec![
        StateDeclaration::new("home"),
        StateDeclaration::new("user").param(ParamDeclaration::new("id").of_type(ParamType::Int)),
    ]);

    let state = router.go("user", params(json!({ "id": "42" })), None).await.unwrap();

    assert_eq!(state.name(), "user");
    assert_eq!(router.current().name(), "user");
    assert_eq!(router.params().get("id"), Some(&json!(42)));
    assert!(router.globals().transition().is_none());
    assert_eq!(router.is("user", Some(&params(json!({ "id": 42 }))), None), Some(true));
    assert_eq!(router.is("user", Some(&params(json!({ "id": 7 }))), None), Some(false));
    assert_eq!(router.is("nope", None, None), None);
}

#[tokio::test]
async fn before_hook_abort_skips_run_phase() {
    let router = router(vec![
        StateDeclaration::new("users"),
        StateDeclaration::new("users.detail"),
    ]);
    let started = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&started);

    router.transition_service().on_before(
        HookMatchCriteria::new().to("*.detail"),
        |_, _| Ok(HookResult::Abort),
        HookOptions::default(),
    );
    router.transition_service().on_start(
        HookMatchCriteria::new(),
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HookResult::Continue)
        },
        HookOptions::default(),
    );

    let rejection = router.go("users.detail", none(), None).await.unwrap_err();
    assert_eq!(rejection.kind, RejectionKind::Aborted);
    assert_eq!(started.load(Ordering::SeqCst), 0);
    assert!(router.current().is_root());

    router.go("users", none(), None).await.unwrap();
    assert_eq!(started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exits_run_leaf_first_and_enters_root_first() {
    let router = router(vec![
        StateDeclaration::new("a"),
        StateDeclaration::new("a.b"),
        StateDeclaration::new("a.b.c"),
        StateDeclaration::new("home"),
    ]);
    let exited: Log = Arc::default();
    let entered: Log = Arc::default();
    router
        .transition_service()
        .on_exit(HookMatchCriteria::new(), record_states(&exited), HookOptions::default());
    router
        .transition_service()
        .on_enter(HookMatchCriteria::new(), record_states(&entered), HookOptions::default());

    router.go("a.b.c", none(), None).await.unwrap();
    router.go("home", none(), None).await.unwrap();

    assert_eq!(*entered.lock(), vec!["a", "a.b", "a.b.c", "home"]);
    assert_eq!(*exited.lock(), vec!["a.b.c", "a.b", "a"]);
}

#[tokio::test]
async fn priority_orders_hooks_on_the_same_node() {
    let router = router(vec![StateDeclaration::new("home")]);
    let log: Log = Arc::default();
    for (name, priority) in [("low", -5), ("high", 50), ("default", 0)] {
        let log = Arc::clone(&log);
        router.transition_service().on_start(
            HookMatchCriteria::new(),
            move |_, _| {
                log.lock().push(name.to_string());
                Ok(HookResult::Continue)
            },
            HookOptions::priority(priority),
        );
    }

    router.go("home", none(), None).await.unwrap();
    assert_eq!(*log.lock(), vec!["high", "default", "low"]);
}

#[tokio::test]
async fn repeated_navigation_is_ignored() {
    let router = router(vec![StateDeclaration::new("home")]);
    let entered: Log = Arc::default();
    let exited: Log = Arc::default();
    router
        .transition_service()
        .on_enter(HookMatchCriteria::new(), record_states(&entered), HookOptions::default());
    router
        .transition_service()
        .on_exit(HookMatchCriteria::new(), record_states(&exited), HookOptions::default());

    router.go("home", none(), None).await.unwrap();
    let state = router.go("home", none(), None).await.unwrap();

    assert_eq!(state.name(), "home");
    assert_eq!(*entered.lock(), vec!["home"]);
    assert!(exited.lock().is_empty());
    assert_eq!(router.globals().last_successful_id(), Some(0));
}

#[tokio::test]
async fn dynamic_params_retain_the_state() {
    let router = router(vec![
        StateDeclaration::new("search").param(ParamDeclaration::new("q").dynamic()),
    ]);
    let entered: Log = Arc::default();
    let retained: Log = Arc::default();
    let observed: Log = Arc::default();
    router
        .transition_service()
        .on_enter(HookMatchCriteria::new(), record_states(&entered), HookOptions::default());
    router
        .transition_service()
        .on_retain(HookMatchCriteria::new(), record_states(&retained), HookOptions::default());
    let sink = Arc::clone(&observed);
    router.transition_service().on_success(
        HookMatchCriteria::new(),
        move |transition, _| {
            if transition.dynamic() {
                let changed = transition.params_changed();
                sink.lock().push(changed["q"].to_string());
            }
            Ok(HookResult::Continue)
        },
        HookOptions::default(),
    );

    router.go("search", params(json!({ "q": "rust" })), None).await.unwrap();
    router.go("search", params(json!({ "q": "trees" })), None).await.unwrap();

    assert_eq!(*entered.lock(), vec!["search"]);
    assert!(retained.lock().contains(&"search".to_string()));
    assert_eq!(*observed.lock(), vec!["\"trees\""]);
    assert_eq!(router.params().get("q"), Some(&json!("trees")));
}

fn redirect_chain(length: usize) -> Vec<StateDeclaration> {
    (0..=length)
        .map(|idx| {
            let state = StateDeclaration::new(format!("s{idx}"));
            if idx < length {
                state.redirect_to(format!("s{}", idx + 1))
            } else {
                state
            }
        })
        .collect()
}

#[tokio::test]
async fn twenty_redirects_are_followed() {
    let router = router(redirect_chain(20));
    let state = router.go("s0", none(), None).await.unwrap();
    assert_eq!(state.name(), "s20");
}

#[tokio::test]
async fn twenty_one_redirects_are_too_many() {
    let router = router(redirect_chain(21));
    let rejection = router.go("s0", none(), None).await.unwrap_err();
    assert_eq!(rejection.kind, RejectionKind::Error);
    assert!(
        rejection
            .to_string()
            .contains("Too many consecutive Transition redirects (20+)")
    );
    assert!(router.current().is_root());
}

#[tokio::test]
async fn hook_redirects_replace_the_transition() {
    let router = router(vec![
        StateDeclaration::new("admin"),
        StateDeclaration::new("login"),
    ]);
    let weak = Arc::downgrade(&router);
    router.transition_service().on_before(
        HookMatchCriteria::new().to("admin"),
        move |transition, _| {
            let router = weak.upgrade().unwrap();
            Ok(router
                .target("login", none(), transition.options().clone())
                .into())
        },
        HookOptions::default(),
    );

    let state = router.go("admin", none(), None).await.unwrap();
    assert_eq!(state.name(), "login");
    let last = router.globals().last_successful().unwrap();
    let original = last.original_transition();
    assert_eq!(original.target().name(), "admin");
    assert_eq!(last.options().source, TransitionSource::Redirect);
}

#[tokio::test]
async fn newer_transition_supersedes_a_pending_one() {
    let router = router(vec![
        StateDeclaration::new("slow"),
        StateDeclaration::new("fast"),
    ]);
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (on_entered, on_release) = (Arc::clone(&entered), Arc::clone(&release));
    router.transition_service().on_enter(
        HookMatchCriteria::new().entering("slow"),
        move |_, _| {
            let (entered, release) = (Arc::clone(&on_entered), Arc::clone(&on_release));
            Ok(HookResult::pending(async move {
                entered.notify_one();
                release.notified().await;
                Ok(HookResult::Continue)
            }))
        },
        HookOptions::default(),
    );

    let slow = router.go("slow", none(), None);
    let fast = async {
        entered.notified().await;
        let result = router.go("fast", none(), None).await;
        release.notify_one();
        result
    };
    let (slow, fast) = tokio::join!(slow, fast);

    assert_eq!(fast.unwrap().name(), "fast");
    assert_eq!(slow.unwrap_err().kind, RejectionKind::Superseded);
    assert_eq!(router.current().name(), "fast");
}

#[tokio::test]
async fn supersede_false_is_ignored_while_running() {
    let router = router(vec![
        StateDeclaration::new("slow"),
        StateDeclaration::new("other"),
    ]);
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (on_entered, on_release) = (Arc::clone(&entered), Arc::clone(&release));
    router.transition_service().on_enter(
        HookMatchCriteria::new().entering("slow"),
        move |_, _| {
            let (entered, release) = (Arc::clone(&on_entered), Arc::clone(&on_release));
            Ok(HookResult::pending(async move {
                entered.notify_one();
                release.notified().await;
                Ok(HookResult::Continue)
            }))
        },
        HookOptions::default(),
    );

    let slow = router.go("slow", none(), None);
    let other = async {
        entered.notified().await;
        let options = TransitionOptions::default().supersede(false);
        let result = router.transition_to("other", none(), options).await;
        release.notify_one();
        result
    };
    let (slow, other) = tokio::join!(slow, other);

    assert_eq!(other.unwrap_err().kind, RejectionKind::Ignored);
    assert_eq!(slow.unwrap().name(), "slow");
}

#[tokio::test]
async fn invalid_targets() {
    let router = router(vec![
        StateDeclaration::new("home"),
        StateDeclaration::new("users").abstract_state(),
        StateDeclaration::new("user").param(ParamDeclaration::new("id").of_type(ParamType::Int)),
    ]);

    let missing = router.go("nope", none(), None).await.unwrap_err();
    assert_eq!(missing.kind, RejectionKind::Invalid);

    let abstract_target = router.go("users", none(), None).await.unwrap_err();
    assert_eq!(abstract_target.kind, RejectionKind::Invalid);
    assert!(
        abstract_target
            .to_string()
            .contains("Cannot transition to abstract state 'users'")
    );

    let bad_param = router
        .go("user", params(json!({ "id": "abc" })), None)
        .await
        .unwrap_err();
    assert!(bad_param.to_string().contains("[id:"));

    let weak = Arc::downgrade(&router);
    router.on_invalid(move |_, _| {
        let router = weak.upgrade()?;
        Some(router.target("home", ParamValues::new(), TransitionOptions::default()))
    });
    let state = router.go("nope", none(), None).await.unwrap();
    assert_eq!(state.name(), "home");
}

#[tokio::test]
async fn hook_errors_reject_and_reach_the_error_handler() {
    let router = router(vec![StateDeclaration::new("home")]);
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&handled);
    router.set_default_error_handler(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let errored = Arc::new(AtomicUsize::new(0));
    let error_hooks = Arc::clone(&errored);
    router.transition_service().on_error(
        HookMatchCriteria::new(),
        move |_, _| {
            error_hooks.fetch_add(1, Ordering::SeqCst);
            Ok(HookResult::Continue)
        },
        HookOptions::default(),
    );
    router.transition_service().on_finish(
        HookMatchCriteria::new(),
        |_, _| Err(anyhow::anyhow!("database unavailable")),
        HookOptions::default(),
    );

    let rejection = router.go("home", none(), None).await.unwrap_err();
    assert_eq!(rejection.kind, RejectionKind::Error);
    assert!(rejection.cause().is_some());
    assert_eq!(handled.load(Ordering::SeqCst), 1);
    assert_eq!(errored.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invoke_limit_and_deregistration() {
    let router = router(vec![StateDeclaration::new("a"), StateDeclaration::new("b")]);
    let once = router.transition_service().on_start(
        HookMatchCriteria::new(),
        |_, _| Ok(HookResult::Continue),
        HookOptions::default().invoke_limit(1),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let always = router.transition_service().on_start(
        HookMatchCriteria::new(),
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HookResult::Continue)
        },
        HookOptions::default(),
    );

    router.go("a", none(), None).await.unwrap();
    assert!(once.is_deregistered());
    assert_eq!(once.invoke_count(), 1);

    always.deregister();
    router.go("b", none(), None).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(once.invoke_count(), 1);
}

#[tokio::test]
async fn resolvables_are_fetched_in_their_phase() {
    let router = router(vec![
        StateDeclaration::new("user")
            .resolve(
                Resolvable::new("user", &[], |_| Ok(ResolveOutput::ready("alice".to_string())))
                    .with_policy(ResolvePolicy::eager()),
            )
            .resolve(Resolvable::new("greeting", &["user"], |deps| {
                let user = downcast::<String>(&deps[0]).cloned().unwrap_or_default();
                Ok(ResolveOutput::deferred(async move { Ok(format!("hello {user}")) }))
            })),
    ]);
    let seen: Log = Arc::default();
    let sink = Arc::clone(&seen);
    router.transition_service().on_success(
        HookMatchCriteria::new(),
        move |transition, _| {
            let context = transition.resolve_context();
            let greeting = context.get("greeting").unwrap();
            sink.lock().push(downcast::<String>(&greeting).unwrap().clone());

            let handle = context.get("$transition$").unwrap();
            let same = downcast::<TransitionRef>(&handle)
                .and_then(TransitionRef::upgrade)
                .is_some_and(|t| t.id() == transition.id());
            sink.lock().push(same.to_string());
            Ok(HookResult::Continue)
        },
        HookOptions::default(),
    );

    router.go("user", none(), None).await.unwrap();
    assert_eq!(*seen.lock(), vec!["hello alice", "true"]);
}

#[tokio::test]
async fn resolver_failures_become_rejections() {
    let router = router(vec![StateDeclaration::new("broken").resolve(Resolvable::new(
        "data",
        &[],
        |_| Err(anyhow::anyhow!("backend down")),
    ))]);

    let rejection = router.go("broken", none(), None).await.unwrap_err();
    assert_eq!(rejection.kind, RejectionKind::Error);
    assert!(router.current().is_root());
}

#[tokio::test]
async fn state_callbacks_run() {
    let log: Log = Arc::default();
    let (on_enter, on_exit) = (Arc::clone(&log), Arc::clone(&log));
    let router = router(vec![
        StateDeclaration::new("home")
            .on_enter(move |_, state| {
                on_enter.lock().push(format!("enter {}", state.name()));
                Ok(HookResult::Continue)
            })
            .on_exit(move |_, state| {
                on_exit.lock().push(format!("exit {}", state.name()));
                Ok(HookResult::Continue)
            }),
        StateDeclaration::new("away"),
        StateDeclaration::new("guarded").redirect_with(|transition| {
            let router = transition.router().unwrap();
            Ok(Some(router.target("away", ParamValues::new(), TransitionOptions::default())))
        }),
    ]);

    router.go("home", none(), None).await.unwrap();
    let state = router.go("guarded", none(), None).await.unwrap();

    assert_eq!(state.name(), "away");
    assert_eq!(*log.lock(), vec!["enter home", "exit home"]);
}

#[derive(Debug, Default)]
struct RecordingLocation {
    updates: Mutex<Vec<(String, bool)>>,
}

#[async_trait]
impl LocationSink for RecordingLocation {
    async fn update(&self, state: Arc<State>, _params: ParamValues, replace: bool) -> anyhow::Result<()> {
        self.updates.lock().push((state.name().to_string(), replace));
        Ok(())
    }
}

#[tokio::test]
async fn location_follows_successful_transitions() {
    let location = Arc::new(RecordingLocation::default());
    let router = Router::builder()
        .location(location.clone())
        .state(StateDeclaration::new("users").url("/users"))
        .state(StateDeclaration::new("users.detail"))
        .state(StateDeclaration::new("about").url("/about"))
        .build()
        .unwrap();

    router.go("users.detail", none(), None).await.unwrap();
    let from_url = TransitionOptions::default().source(TransitionSource::Url);
    router.transition_to("about", none(), from_url).await.unwrap();
    let replace = TransitionOptions::default().location(LocationMode::Replace);
    router.transition_to("users", none(), replace).await.unwrap();

    assert_eq!(
        *location.updates.lock(),
        vec![("users".to_string(), false), ("users".to_string(), true)]
    );
}

#[tokio::test]
async fn views_follow_entering_and_exiting_states() {
    let router = router(vec![
        StateDeclaration::new("home").view(ViewDeclaration {
            name: "main".into(),
            kind: "default".into(),
            config: json!({ "component": "Home" }),
        }),
        StateDeclaration::new("about"),
    ]);

    router.go("home", none(), None).await.unwrap();
    let active = router.views().active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].state_name(), "home");

    router.go("about", none(), None).await.unwrap();
    assert!(router.views().active().is_empty());
}

#[tokio::test]
async fn reload_reenters_states() {
    let router = router(vec![
        StateDeclaration::new("app"),
        StateDeclaration::new("app.page"),
    ]);
    let entered: Log = Arc::default();
    router
        .transition_service()
        .on_enter(HookMatchCriteria::new(), record_states(&entered), HookOptions::default());

    router.go("app.page", none(), None).await.unwrap();
    router.reload(Some("app.page".into())).await.unwrap();
    router.reload(None).await.unwrap();

    assert_eq!(
        *entered.lock(),
        vec!["app", "app.page", "app.page", "", "app", "app.page"]
    );
    assert_eq!(router.includes("app.*", None, None), Some(true));
    assert_eq!(router.includes("app", None, None), Some(true));
    assert_eq!(router.includes("other.*", None, None), Some(false));
}

#[tokio::test]
async fn traces_are_recorded_per_category() {
    let sink = Arc::new(RecordingSink::new());
    let config = RouterConfig {
        trace: TraceConfig {
            categories: vec![Category::Transition],
        },
        ..RouterConfig::default()
    };
    let router = Router::builder()
        .config(config)
        .trace_sink(sink.clone())
        .state(StateDeclaration::new("home"))
        .build()
        .unwrap();

    router.go("home", none(), None).await.unwrap();
    let events = sink.events();
    assert!(matches!(events.first(), Some(TraceEvent::TransitionStarted { .. })));
    assert!(matches!(events.last(), Some(TraceEvent::TransitionSucceeded { .. })));
    assert!(events.iter().all(|e| e.category() == Category::Transition));
}

#[tokio::test]
async fn disposed_routers_abort_transitions() {
    let router = router(vec![StateDeclaration::new("home")]);
    router.dispose();

    let rejection = router.go("home", none(), None).await.unwrap_err();
    assert_eq!(rejection.kind, RejectionKind::Aborted);
    assert!(rejection.to_string().contains("has been stopped (disposed)"));
}

#[tokio::test]
async fn transitions_settle_once_and_can_be_awaited() {
    let router = router(vec![StateDeclaration::new("home")]);
    let target = router.target("home", none(), TransitionOptions::default());
    let transition = router
        .create_transition(router.globals().current_path(), target)
        .unwrap();

    assert_eq!(transition.success(), None);
    assert_eq!(transition.entering().len(), 1);
    assert!(transition.to_string().starts_with("Transition#0( ''{} -> 'home'{}"));

    let (ran, waited) = tokio::join!(transition.run(), transition.wait());
    assert_eq!(ran.unwrap().name(), "home");
    assert_eq!(waited.unwrap().name(), "home");
    assert_eq!(transition.success(), Some(true));
}

#[tokio::test]
async fn a_transition_runs_its_hooks_only_once() {
    let router = router(vec![StateDeclaration::new("home")]);
    let entered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&entered);
    router.transition_service().on_enter(
        HookMatchCriteria::new().entering("home"),
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HookResult::Continue)
        },
        HookOptions::default(),
    );
    let target = router.target("home", none(), TransitionOptions::default());
    let transition = router
        .create_transition(router.globals().current_path(), target)
        .unwrap();

    let first = transition.run().await.unwrap();
    let second = transition.run().await.unwrap();

    assert_eq!(first.name(), "home");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(entered.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn redirects_reuse_resolved_parent_data() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let router = router(vec![
        StateDeclaration::new("account").resolve(Resolvable::new("profile", &[], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ResolveOutput::ready("alice".to_string()))
        })),
        StateDeclaration::new("account.legacy"),
        StateDeclaration::new("account.settings"),
    ]);
    let weak = Arc::downgrade(&router);
    router.transition_service().on_enter(
        HookMatchCriteria::new().entering("account.legacy"),
        move |transition, _| {
            let router = weak.upgrade().unwrap();
            Ok(router
                .target("account.settings", none(), transition.options().clone())
                .into())
        },
        HookOptions::default(),
    );

    let state = router.go("account.legacy", none(), None).await.unwrap();

    assert_eq!(state.name(), "account.settings");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let last = router.globals().last_successful().unwrap();
    assert_eq!(last.original_transition().target().name(), "account.legacy");
}

#[tokio::test]
async fn older_transition_cannot_overwrite_a_newer_success() {
    let router = router(vec![StateDeclaration::new("inbox"), StateDeclaration::new("outbox")]);
    let from = router.globals().current_path();
    let older = router
        .create_transition(
            from.clone(),
            router.target("inbox", none(), TransitionOptions::default()),
        )
        .unwrap();
    let newer = router
        .create_transition(from, router.target("outbox", none(), TransitionOptions::default()))
        .unwrap();
    assert!(older.id() < newer.id());

    newer.run().await.unwrap();
    assert_eq!(older.run().await.unwrap().name(), "inbox");

    assert_eq!(router.current().name(), "outbox");
    assert_eq!(router.globals().last_successful_id(), Some(newer.id()));
    assert_eq!(router.globals().last_successful().unwrap().id(), newer.id());
}

#[tokio::test]
async fn same_target_as_pending_transition_is_ignored() {
    let sink = Arc::new(RecordingSink::new());
    let config = RouterConfig {
        trace: TraceConfig {
            categories: vec![Category::Transition],
        },
        ..RouterConfig::default()
    };
    let router = Router::builder()
        .config(config)
        .trace_sink(sink.clone())
        .state(StateDeclaration::new("slow"))
        .build()
        .unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (on_entered, on_release) = (Arc::clone(&entered), Arc::clone(&release));
    router.transition_service().on_enter(
        HookMatchCriteria::new().entering("slow"),
        move |_, _| {
            let (entered, release) = (Arc::clone(&on_entered), Arc::clone(&on_release));
            Ok(HookResult::pending(async move {
                entered.notify_one();
                release.notified().await;
                Ok(HookResult::Continue)
            }))
        },
        HookOptions::default(),
    );

    let first = router.go("slow", none(), None);
    let second = async {
        entered.notified().await;
        let result = router.go("slow", none(), None).await;
        release.notify_one();
        result
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap().name(), "slow");
    assert!(second.unwrap().is_root());
    assert_eq!(router.current().name(), "slow");
    assert!(sink.events().iter().any(|event| matches!(
        event,
        TraceEvent::TransitionIgnored { reason, .. } if reason == "SameAsPending"
    )));
}

#[derive(Debug)]
struct RequiresLogin;

#[tokio::test]
async fn predicate_criteria_match_on_state_extensions() {
    let router = router(vec![
        StateDeclaration::new("public"),
        StateDeclaration::new("account").extension(RequiresLogin),
        StateDeclaration::new("account.settings"),
    ]);
    let guarded: Log = Arc::default();
    router.transition_service().on_enter(
        HookMatchCriteria::new().entering(HookMatchCriterion::predicate(
            |state: &Arc<State>, _: &Transition| state.extension::<RequiresLogin>().is_some(),
        )),
        record_states(&guarded),
        HookOptions::default(),
    );

    router.go("public", none(), None).await.unwrap();
    router.go("account.settings", none(), None).await.unwrap();

    assert_eq!(*guarded.lock(), vec!["account"]);
}
