use std::fmt::Debug;

/// An opaque view configuration attached to a path node.
///
/// Produced by the runtime's view-config factories from a state's
/// [`ViewDeclaration`](crate::state::ViewDeclaration)s and handed to the view
/// layer on success. The engine only stores and forwards them.
pub trait ViewConfig: Debug + Send + Sync {
    /// The view slot this config fills.
    fn view_name(&self) -> &str;

    /// The state that declared this view.
    fn state_name(&self) -> &str;
}
