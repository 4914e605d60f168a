use thiserror::Error;

/// Errors raised while resolving attribute paths to providing plugins.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No plugin provides the requested attribute, nor any ancestor prefix of
    /// it when hierarchical fallback applies. Always carries the originally
    /// requested path, never a truncated prefix.
    #[error("no plugin provides attribute '{0}'")]
    AttributeNotFound(String),

    /// A plugin was reached a second time while still pending resolution on
    /// the work stack. Carries the plugin names along the cycle, in stack
    /// order, from the first pending occurrence to the point of detection.
    #[error("dependency cycle detected between plugins: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
}

/// Errors raised while running a plugin and its unmet dependencies.
#[derive(Debug, Error)]
pub enum RunError {
    /// The handle passed to the runner is not registered in the provider
    /// directory it was built over. This is a usage error, no resolution work
    /// is performed.
    #[error("plugin '{0}' is not registered in the provider directory")]
    UnknownPlugin(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A plugin's collection body failed in normal mode.
    #[error("plugin '{0}':\n{1}")]
    Collect(String, anyhow::Error),
}
