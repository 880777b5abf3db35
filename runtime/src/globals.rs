//! Router-wide state: the current state and parameters, the running
//! transition, and short transition histories.
//!
//! Only the transition lifecycle writes here. Writes from a transition that
//! is older than the newest successful one are dropped.

use crate::transition::Transition;
use arbor_core::param::ParamValues;
use arbor_core::path::PathNode;
use arbor_core::state::State;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// A FIFO queue that drops its oldest entry when full.
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add `item`, returning the entry evicted to make room.
    pub fn enqueue(&mut self, item: T) -> Option<T> {
        self.items.push_back(item);
        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
    }

    pub fn peek_tail(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn peek_head(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

struct Inner {
    current: Arc<State>,
    current_path: Vec<PathNode>,
    params: ParamValues,
    transition: Option<Arc<Transition>>,
    last_started_id: Option<u64>,
    last_successful_id: Option<u64>,
    history: BoundedQueue<Arc<Transition>>,
    successful: BoundedQueue<Arc<Transition>>,
}

pub struct Globals {
    inner: RwLock<Inner>,
}

impl Globals {
    pub fn new(root: &Arc<State>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                current: Arc::clone(root),
                current_path: vec![PathNode::new(root)],
                params: ParamValues::new(),
                transition: None,
                last_started_id: None,
                last_successful_id: None,
                history: BoundedQueue::new(1),
                successful: BoundedQueue::new(1),
            }),
        }
    }

    pub fn current(&self) -> Arc<State> {
        Arc::clone(&self.inner.read().current)
    }

    /// The path of the last successful transition, or just the root.
    pub fn current_path(&self) -> Vec<PathNode> {
        self.inner.read().current_path.clone()
    }

    pub fn params(&self) -> ParamValues {
        self.inner.read().params.clone()
    }

    /// The transition currently running, if any.
    pub fn transition(&self) -> Option<Arc<Transition>> {
        self.inner.read().transition.clone()
    }

    pub fn last_started_id(&self) -> Option<u64> {
        self.inner.read().last_started_id
    }

    pub fn last_successful_id(&self) -> Option<u64> {
        self.inner.read().last_successful_id
    }

    pub fn last_started(&self) -> Option<Arc<Transition>> {
        self.inner.read().history.peek_tail().cloned()
    }

    pub fn last_successful(&self) -> Option<Arc<Transition>> {
        self.inner.read().successful.peek_tail().cloned()
    }

    pub fn is_active(&self, transition: &Transition) -> bool {
        self.inner
            .read()
            .transition
            .as_ref()
            .is_some_and(|running| running.id() == transition.id())
    }

    /// Record `transition` as the running one.
    pub(crate) fn started(&self, transition: &Arc<Transition>) {
        let mut inner = self.inner.write();
        inner.last_started_id = Some(transition.id());
        inner.transition = Some(Arc::clone(transition));
        inner.history.enqueue(Arc::clone(transition));
    }

    /// Publish the result of a successful transition.
    ///
    /// Returns `false` when a newer transition already succeeded.
    pub(crate) fn succeeded(&self, transition: &Arc<Transition>) -> bool {
        let mut inner = self.inner.write();
        if inner
            .last_successful_id
            .is_some_and(|newest| newest > transition.id())
        {
            return false;
        }
        let path = transition.tree_changes().to;
        let Some(leaf) = path.last() else {
            return false;
        };
        inner.current = Arc::clone(&leaf.state);
        inner.params = transition.params();
        inner.current_path = path;
        inner.last_successful_id = Some(transition.id());
        inner.successful.enqueue(Arc::clone(transition));
        true
    }

    /// Empty the running slot if it still holds `transition`.
    pub(crate) fn settled(&self, transition: &Transition) {
        let mut inner = self.inner.write();
        if inner
            .transition
            .as_ref()
            .is_some_and(|running| running.id() == transition.id())
        {
            inner.transition = None;
        }
    }

    /// Forget everything, back to the root.
    pub(crate) fn reset(&self, root: &Arc<State>) {
        let mut inner = self.inner.write();
        inner.current = Arc::clone(root);
        inner.current_path = vec![PathNode::new(root)];
        inner.params.clear();
        inner.transition = None;
        inner.history.clear();
        inner.successful.clear();
    }
}

impl std::fmt::Debug for Globals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Globals")
            .field("current", &inner.current.name())
            .field("params", &inner.params)
            .field("transition", &inner.transition.as_ref().map(|t| t.id()))
            .field("last_started_id", &inner.last_started_id)
            .field("last_successful_id", &inner.last_successful_id)
            .finish()
    }
}
