//! The location collaborator seam.

use arbor_core::param::ParamValues;
use arbor_core::state::State;
use async_trait::async_trait;
use std::sync::Arc;

/// Told where the router ended up after a successful transition.
#[async_trait]
pub trait LocationSink: Send + Sync {
    /// `state` is the nearest state on the new path that has a url.
    async fn update(&self, state: Arc<State>, params: ParamValues, replace: bool) -> anyhow::Result<()>;
}

/// The nearest state at or above `state` that declares a url.
pub fn navigable(state: &Arc<State>) -> Option<Arc<State>> {
    state.path().into_iter().rev().find(|s| s.url().is_some())
}
