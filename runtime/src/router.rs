//! # Router: the instance that owns a state tree and runs its transitions
//!
//! A [`Router`] ties together the [`StateRegistry`], the global hook
//! registry, the [`Globals`] and the view and location collaborators.
//! Build one with [`RouterBuilder`]; the built-in hooks are registered
//! before `build` returns.

use crate::core_hooks;
use crate::globals::Globals;
use crate::location::LocationSink;
use crate::service::TransitionService;
use crate::transition::Transition;
use crate::view::{ViewLayer, ViewService};
use arbor_core::config::RouterConfig;
use arbor_core::error::{ConfigError, StateError};
use arbor_core::path::PathNode;
use arbor_core::registry::StateRegistry;
use arbor_core::rejection::Rejection;
use arbor_core::resolvable::Injector;
use arbor_core::state::{State, StateDeclaration};
use arbor_core::target::{StateOrName, TargetState};
use arbor_core::trace::{Trace, TraceSink, TracingSink};
use parking_lot::RwLock;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Hears about rejected transitions that were not ignored or aborted.
pub type ErrorHandler = Arc<dyn Fn(&Rejection) + Send + Sync>;

/// Consulted when a target state does not exist: `(to, from)`.
///
/// Returning a target navigates there instead.
pub type InvalidCallback = Arc<dyn Fn(&TargetState, &TargetState) -> Option<TargetState> + Send + Sync>;

pub struct Router {
    instance_id: Uuid,
    pub(crate) this: Weak<Router>,
    max_redirects: usize,
    registry: StateRegistry,
    transitions: TransitionService,
    globals: Globals,
    trace: Arc<Trace>,
    injector: Option<Arc<dyn Injector>>,
    views: ViewService,
    location: Option<Arc<dyn LocationSink>>,
    disposed: AtomicBool,
    pub(crate) error_handler: RwLock<ErrorHandler>,
    pub(crate) invalid_callbacks: RwLock<Vec<InvalidCallback>>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    pub fn transition_service(&self) -> &TransitionService {
        &self.transitions
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn trace(&self) -> &Arc<Trace> {
        &self.trace
    }

    pub fn injector(&self) -> Option<&Arc<dyn Injector>> {
        self.injector.as_ref()
    }

    pub fn views(&self) -> &ViewService {
        &self.views
    }

    pub fn location(&self) -> Option<&Arc<dyn LocationSink>> {
        self.location.as_ref()
    }

    pub fn register_state(&self, decl: StateDeclaration) -> Result<Option<Arc<State>>, StateError> {
        self.registry.register(decl)
    }

    pub fn deregister_state(&self, state: impl Into<StateOrName>) -> Result<Vec<Arc<State>>, StateError> {
        self.registry.deregister(state)
    }

    /// Build a transition from `from` to `target` without running it.
    pub fn create_transition(
        &self,
        from: Vec<PathNode>,
        target: TargetState,
    ) -> Result<Arc<Transition>, Rejection> {
        let router = self.arc()?;
        Transition::create(&router, from, target, None)
    }

    /// Stop this router. Hooks of any transition still running reject as aborted.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(transition) = self.globals.transition() {
            transition.abort();
        }
        self.globals.reset(self.registry.root());
        tracing::info!(router = %self.instance_id, "Router disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn arc(&self) -> Result<Arc<Router>, Rejection> {
        self.this
            .upgrade()
            .ok_or_else(|| Rejection::aborted("The router has been dropped"))
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("instance_id", &self.instance_id)
            .field("max_redirects", &self.max_redirects)
            .field("registry", &self.registry)
            .field("globals", &self.globals)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

pub struct RouterBuilder {
    config: RouterConfig,
    injector: Option<Arc<dyn Injector>>,
    trace_sink: Option<Arc<dyn TraceSink>>,
    view_layer: Option<Arc<dyn ViewLayer>>,
    location: Option<Arc<dyn LocationSink>>,
    states: Vec<StateDeclaration>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            config: RouterConfig::default(),
            injector: None,
            trace_sink: None,
            view_layer: None,
            location: None,
            states: Vec::new(),
        }
    }

    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the router configuration from a TOML file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        self.config = RouterConfig::from_file(path)?;
        Ok(self)
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Host container consulted for tokens no path node provides.
    pub fn injector(mut self, injector: Arc<dyn Injector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    pub fn view_layer(mut self, layer: Arc<dyn ViewLayer>) -> Self {
        self.view_layer = Some(layer);
        self
    }

    pub fn location(mut self, location: Arc<dyn LocationSink>) -> Self {
        self.location = Some(location);
        self
    }

    pub fn state(mut self, decl: StateDeclaration) -> Self {
        self.states.push(decl);
        self
    }

    pub fn build(self) -> Result<Arc<Router>, StateError> {
        let RouterBuilder {
            config,
            injector,
            trace_sink,
            view_layer,
            location,
            states,
        } = self;

        let trace = Arc::new(Trace::with_sink(
            trace_sink.unwrap_or_else(|| Arc::new(TracingSink)),
        ));
        trace.enable(config.trace.categories.iter().copied());

        let log_rejections = config.log_rejections;
        let error_handler: ErrorHandler = Arc::new(move |rejection: &Rejection| {
            if log_rejections {
                tracing::error!(%rejection, "Transition rejection");
            }
        });

        let registry = StateRegistry::new();
        let globals = Globals::new(registry.root());
        let router = Arc::new_cyclic(|this| Router {
            instance_id: Uuid::new_v4(),
            this: this.clone(),
            max_redirects: config.max_redirects,
            registry,
            transitions: TransitionService::new(),
            globals,
            trace,
            injector,
            views: ViewService::new(view_layer),
            location,
            disposed: AtomicBool::new(false),
            error_handler: RwLock::new(error_handler),
            invalid_callbacks: RwLock::new(Vec::new()),
        });

        core_hooks::register_all(&router);
        for decl in config.states.into_iter().chain(states) {
            router.register_state(decl)?;
        }

        tracing::info!(
            router = %router.instance_id,
            states = router.registry.get_all().len(),
            "Router started"
        );
        Ok(router)
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
