pub mod config;
pub mod error;
pub mod extensions;
pub mod glob;
pub mod matcher;
pub mod param;
pub mod path;
pub mod registry;
pub mod rejection;
pub mod resolvable;
pub mod resolve_context;
pub mod state;
pub mod target;
pub mod trace;
pub mod view;

pub mod prelude {
    pub use crate::config::RouterConfig;
    pub use crate::error::{ConfigError, StateError};
    pub use crate::param::{ParamDeclaration, ParamType, ParamValues};
    pub use crate::path::{PathNode, TreeChanges};
    pub use crate::registry::StateRegistry;
    pub use crate::rejection::{Rejection, RejectionDetail, RejectionKind};
    pub use crate::resolvable::{
        HostContainer, Injector, PolicyAsync, PolicyWhen, Resolvable, ResolveOutput,
        ResolvePolicy, Resolved, downcast,
    };
    pub use crate::resolve_context::ResolveContext;
    pub use crate::state::{State, StateDeclaration, ViewDeclaration};
    pub use crate::target::{
        LocationMode, ReloadOption, StateOrName, TargetState, TransitionOptions,
        TransitionSource,
    };
    pub use crate::trace::{Category, Trace, TraceEvent, TraceSink};
}

pub use config::RouterConfig;
pub use error::{ConfigError, StateError};
pub use extensions::Extensions;
pub use glob::Glob;
pub use param::{Param, ParamDeclaration, ParamType, ParamValues};
pub use path::{PathNode, TreeChanges};
pub use registry::{StateRegistry, StatesChanged};
pub use rejection::{Rejection, RejectionDetail, RejectionKind};
pub use resolvable::{Resolvable, ResolveOutput, ResolvePolicy, Resolved, Token};
pub use resolve_context::ResolveContext;
pub use state::{State, StateBuilder, StateDeclaration, ViewDeclaration};
pub use target::{StateOrName, TargetState, TransitionOptions};
pub use trace::{Trace, TraceEvent};
pub use view::ViewConfig;
