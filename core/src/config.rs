//! Router configuration, loadable from TOML.
//!
//! ```toml
//! max_redirects = 20
//! log_rejections = true
//!
//! [trace]
//! categories = ["transition", "hook"]
//!
//! [[states]]
//! name = "home"
//! url = "/home"
//! ```

use crate::error::ConfigError;
use crate::state::StateDeclaration;
use crate::trace::Category;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_MAX_REDIRECTS: usize = 20;

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Categories enabled when the router starts.
    pub categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Longest chain of redirects a transition may follow.
    pub max_redirects: usize,
    pub trace: TraceConfig,
    /// Whether the default error handler logs rejections.
    pub log_rejections: bool,
    /// States registered when the router is built.
    pub states: Vec<StateDeclaration>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            trace: TraceConfig::default(),
            log_rejections: true,
            states: Vec::new(),
        }
    }
}

impl RouterConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
