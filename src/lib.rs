#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod error;
mod facts;
mod plugin;
mod provides;
mod runner;
mod system;

pub use crate::error::{ResolveError, RunError};
pub use crate::facts::{Facts, Value};
pub use crate::plugin::{Dialect, Plugin, PluginBuilder};
pub use crate::provides::ProvidesMap;
pub use crate::runner::Runner;
pub use crate::system::System;

/// Installs a default `tracing` subscriber reading the `RUST_LOG` filter
/// from the environment. Call once, early, from binaries that want to see
/// plugin diagnostics.
#[cfg(feature = "logging")]
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
