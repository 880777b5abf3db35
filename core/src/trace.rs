//! # Trace: Structured transition diagnostics
//!
//! The engine reports what it does as [`TraceEvent`]s. A [`Trace`] gates the
//! events by [`Category`] and forwards the enabled ones to a [`TraceSink`].
//! Nothing in the engine depends on what a sink does with them.

use crate::resolvable::PolicyWhen;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Transition,
    Hook,
    Resolve,
    View,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Transition,
        Category::Hook,
        Category::Resolve,
        Category::View,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    TransitionStarted {
        transition_id: u64,
        from: String,
        to: String,
    },
    TransitionIgnored {
        transition_id: u64,
        reason: String,
    },
    TransitionSucceeded {
        transition_id: u64,
        to: String,
    },
    TransitionErrored {
        transition_id: u64,
        rejection: String,
    },
    HookInvoked {
        transition_id: u64,
        event: String,
        state: Option<String>,
        priority: i32,
    },
    HookReturned {
        transition_id: u64,
        event: String,
        result: String,
    },
    ResolvePath {
        transition_id: Option<u64>,
        path: Vec<String>,
        when: PolicyWhen,
    },
    Resolved {
        transition_id: Option<u64>,
        token: String,
    },
    ViewsSynced {
        transition_id: u64,
        activated: usize,
        deactivated: usize,
    },
}

impl TraceEvent {
    pub fn category(&self) -> Category {
        match self {
            TraceEvent::TransitionStarted { .. }
            | TraceEvent::TransitionIgnored { .. }
            | TraceEvent::TransitionSucceeded { .. }
            | TraceEvent::TransitionErrored { .. } => Category::Transition,
            TraceEvent::HookInvoked { .. } | TraceEvent::HookReturned { .. } => Category::Hook,
            TraceEvent::ResolvePath { .. } | TraceEvent::Resolved { .. } => Category::Resolve,
            TraceEvent::ViewsSynced { .. } => Category::View,
        }
    }
}

/// Receives enabled trace events.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: &TraceEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn record(&self, event: &TraceEvent) {
        match event {
            TraceEvent::TransitionErrored {
                transition_id,
                rejection,
            } => {
                tracing::warn!(transition_id, %rejection, "Transition errored");
            }
            TraceEvent::TransitionStarted {
                transition_id,
                from,
                to,
            } => {
                tracing::info!(transition_id, %from, %to, "Transition started");
            }
            TraceEvent::TransitionSucceeded { transition_id, to } => {
                tracing::info!(transition_id, %to, "Transition succeeded");
            }
            other => {
                tracing::debug!(category = ?other.category(), event = ?other, "arbor trace");
            }
        }
    }
}

/// Keeps every event in memory, with the time it was recorded.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(DateTime<Utc>, TraceEvent)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TraceSink for RecordingSink {
    fn record(&self, event: &TraceEvent) {
        self.events.lock().push((Utc::now(), event.clone()));
    }
}

/// Category gate in front of a sink. All categories start disabled.
pub struct Trace {
    enabled: RwLock<HashSet<Category>>,
    sink: Arc<dyn TraceSink>,
}

impl Trace {
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    pub fn with_sink(sink: Arc<dyn TraceSink>) -> Self {
        Self {
            enabled: RwLock::new(HashSet::new()),
            sink,
        }
    }

    pub fn enable(&self, categories: impl IntoIterator<Item = Category>) {
        self.enabled.write().extend(categories);
    }

    pub fn disable(&self, categories: impl IntoIterator<Item = Category>) {
        let mut enabled = self.enabled.write();
        for category in categories {
            enabled.remove(&category);
        }
    }

    pub fn enabled(&self, category: Category) -> bool {
        self.enabled.read().contains(&category)
    }

    pub fn emit(&self, event: TraceEvent) {
        if self.enabled(event.category()) {
            self.sink.record(&event);
        }
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trace")
            .field("enabled", &*self.enabled.read())
            .finish()
    }
}

/// Install a stdout subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Does nothing if a global subscriber is already set.
pub fn init_stdout_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
