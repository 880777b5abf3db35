//! # Arbor runtime
//!
//! The transition engine over the `arbor-core` state tree: hook registries,
//! the transition lifecycle, router globals and navigation.
//!
//! ```no_run
//! use arbor_runtime::prelude::*;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let router = Router::builder()
//!     .state(StateDeclaration::new("home"))
//!     .state(StateDeclaration::new("users.detail").url("/users/:id"))
//!     .state(StateDeclaration::new("users").abstract_state())
//!     .build()?;
//!
//! router.transition_service().on_before(
//!     HookMatchCriteria::new().to("users.*"),
//!     |_, _| Ok(HookResult::Continue),
//!     HookOptions::default(),
//! );
//!
//! router.go("home", ParamValues::new(), None).await?;
//! # Ok(())
//! # }
//! ```

mod core_hooks;
pub mod event;
pub mod globals;
pub mod hook;
pub mod location;
mod navigation;
pub mod router;
pub mod service;
pub mod state_hooks;
pub mod transition;
pub mod transition_hook;
pub mod view;

pub mod prelude {
    pub use crate::event::{HookPhase, PathType, TransitionEvent};
    pub use crate::globals::Globals;
    pub use crate::hook::{HookHandle, HookMatchCriteria, HookMatchCriterion, HookOptions, HookResult};
    pub use crate::location::LocationSink;
    pub use crate::router::{Router, RouterBuilder};
    pub use crate::service::TransitionService;
    pub use crate::state_hooks::StateDeclarationExt;
    pub use crate::transition::{Transition, TransitionRef};
    pub use crate::view::{ViewLayer, ViewService};
    pub use arbor_core::prelude::*;
}

pub use globals::Globals;
pub use hook::{HookHandle, HookMatchCriteria, HookMatchCriterion, HookOptions, HookResult};
pub use router::{Router, RouterBuilder};
pub use service::TransitionService;
pub use transition::{IgnoredReason, Transition, TransitionRef};
