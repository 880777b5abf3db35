//! The view collaborator seam.
//!
//! States declare views; factories keyed by declaration `kind` turn them into
//! [`ViewConfig`]s when a transition is created. After a successful
//! transition the configs of exiting states are deactivated, those of
//! entering states activated, and the [`ViewLayer`] is asked to sync.

use arbor_core::path::PathNode;
use arbor_core::state::ViewDeclaration;
use arbor_core::view::ViewConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds view configs for one declaration. `path` ends at the declaring state.
pub type ViewConfigFactory =
    Arc<dyn Fn(&[PathNode], &ViewDeclaration) -> Vec<Arc<dyn ViewConfig>> + Send + Sync>;

/// Whatever renders views.
pub trait ViewLayer: Send + Sync {
    fn activate(&self, config: &Arc<dyn ViewConfig>);
    fn deactivate(&self, config: &Arc<dyn ViewConfig>);
    fn sync(&self, active: &[Arc<dyn ViewConfig>]);
}

/// The view config produced by the built-in `default` factory.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultViewConfig {
    pub view_name: String,
    pub state_name: String,
    pub config: serde_json::Value,
}

impl ViewConfig for DefaultViewConfig {
    fn view_name(&self) -> &str {
        &self.view_name
    }

    fn state_name(&self) -> &str {
        &self.state_name
    }
}

pub struct ViewService {
    factories: RwLock<HashMap<String, ViewConfigFactory>>,
    active: RwLock<Vec<Arc<dyn ViewConfig>>>,
    layer: Option<Arc<dyn ViewLayer>>,
}

impl ViewService {
    pub fn new(layer: Option<Arc<dyn ViewLayer>>) -> Self {
        let service = Self {
            factories: RwLock::new(HashMap::new()),
            active: RwLock::new(Vec::new()),
            layer,
        };
        service.register_factory("default", |path, decl| {
            let state_name = path
                .last()
                .map(|node| node.state.name().to_string())
                .unwrap_or_default();
            vec![Arc::new(DefaultViewConfig {
                view_name: decl.name.clone(),
                state_name,
                config: decl.config.clone(),
            }) as Arc<dyn ViewConfig>]
        });
        service
    }

    pub fn register_factory<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&[PathNode], &ViewDeclaration) -> Vec<Arc<dyn ViewConfig>> + Send + Sync + 'static,
    {
        self.factories.write().insert(kind.into(), Arc::new(factory));
    }

    pub fn create_view_configs(
        &self,
        path: &[PathNode],
        decl: &ViewDeclaration,
    ) -> anyhow::Result<Vec<Arc<dyn ViewConfig>>> {
        let factory = self.factories.read().get(&decl.kind).cloned().ok_or_else(|| {
            anyhow::anyhow!(
                "ViewService: No view config factory registered for type {}",
                decl.kind
            )
        })?;
        Ok(factory(path, decl))
    }

    pub fn activate(&self, config: &Arc<dyn ViewConfig>) {
        if let Some(layer) = &self.layer {
            layer.activate(config);
        }
        self.active.write().push(Arc::clone(config));
    }

    pub fn deactivate(&self, config: &Arc<dyn ViewConfig>) {
        if let Some(layer) = &self.layer {
            layer.deactivate(config);
        }
        self.active.write().retain(|active| !Arc::ptr_eq(active, config));
    }

    pub fn sync(&self) {
        let active = self.active.read().clone();
        if let Some(layer) = &self.layer {
            layer.sync(&active);
        }
    }

    pub fn active(&self) -> Vec<Arc<dyn ViewConfig>> {
        self.active.read().clone()
    }
}

impl fmt::Debug for ViewService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewService")
            .field("factories", &self.factories.read().keys().collect::<Vec<_>>())
            .field("active", &self.active.read().len())
            .field("layer", &self.layer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::state::{State, StateBuilder, StateDeclaration};

    #[test]
    fn default_factory_and_unknown_kinds() {
        let service = ViewService::new(None);
        let state = Arc::new(
            StateBuilder::build(StateDeclaration::new("home"), Arc::new(State::root())).unwrap(),
        );
        let path = vec![PathNode::new(&state)];
        let decl = ViewDeclaration {
            name: "main".into(),
            kind: "default".into(),
            config: serde_json::json!({ "component": "Home" }),
        };

        let configs = service.create_view_configs(&path, &decl).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].view_name(), "main");
        assert_eq!(configs[0].state_name(), "home");

        service.activate(&configs[0]);
        assert_eq!(service.active().len(), 1);
        service.deactivate(&configs[0]);
        assert!(service.active().is_empty());

        let unknown = ViewDeclaration {
            kind: "canvas".into(),
            ..decl
        };
        let err = service.create_view_configs(&path, &unknown).unwrap_err();
        assert!(err.to_string().contains("canvas"));
    }
}
