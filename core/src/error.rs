use thiserror::Error;

/// Failures raised while registering, finding or removing states.
///
/// These are structural errors in the state tree itself. Failures of a
/// transition attempt are [`Rejection`](crate::rejection::Rejection)s instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("State must have a valid name")]
    InvalidName,
    #[error("State '{0}' is already defined")]
    AlreadyDefined(String),
    #[error("States that specify the 'parent:' property should not have a '.' in their name ({0})")]
    DottedNameWithParent(String),
    #[error("Can't deregister state; not found: {0}")]
    NotFound(String),
    #[error("The root state cannot be deregistered")]
    RootState,
    #[error("No reference point given for path '{0}'")]
    NoReferencePoint(String),
    #[error("Path '{path}' not valid for state '{base}'")]
    InvalidRelativePath { path: String, base: String },
    #[error("Invalid glob pattern '{0}'")]
    InvalidGlob(String),
}

/// Failures while loading a [`RouterConfig`](crate::config::RouterConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
