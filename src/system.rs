//! Session orchestration: one fact tree, one provider directory, one runner
//! configuration.

use std::sync::Arc;

use crate::error::RunError;
use crate::facts::Facts;
use crate::plugin::Plugin;
use crate::provides::ProvidesMap;
use crate::runner::Runner;

/// A single fact-collection session.
///
/// Plugins are registered first, which populates the provider directory;
/// running starts only afterwards, so resolution always sees a complete,
/// read-only directory. A new session is built from scratch rather than
/// mutating an old one.
pub struct System {
    facts: Facts,
    provides: ProvidesMap,
    safe_run: bool,
}

impl System {
    /// Creates a session that propagates plugin failures to the caller.
    pub fn new() -> Self {
        Self::with_safe_run(false)
    }

    /// Creates a session with the given failure containment mode. With
    /// `safe_run`, a failing plugin is attempted once and skipped, and the
    /// collection continues past it.
    pub fn with_safe_run(safe_run: bool) -> Self {
        Self {
            facts: Facts::new(),
            provides: ProvidesMap::new(),
            safe_run,
        }
    }

    /// Registers a plugin under every attribute path it provides.
    pub fn register(&mut self, plugin: Arc<Plugin>) {
        self.provides
            .register(&plugin, plugin.provides().iter().cloned());
    }

    /// Runs every registered plugin, dependencies first. The first error is
    /// logged and returned; with `force` even already-run plugins execute
    /// again.
    pub fn run_all(&mut self, force: bool) -> Result<(), RunError> {
        let runner = Runner::new(&self.provides, self.safe_run);
        let plugins = self.provides.all_plugins();
        tracing::info!("running {} plugins", plugins.len());

        for plugin in plugins {
            if let Err(err) = runner.run_plugin(&plugin, &mut self.facts, force) {
                tracing::error!("encountered error while running plugins: {err}");
                return Err(err);
            }
        }

        Ok(())
    }

    /// Runs exactly the plugins providing the requested attributes (and
    /// their dependencies), with fallback to the nearest ancestor path for
    /// attributes that have no exact provider.
    pub fn collect<I, S>(&mut self, attributes: I, force: bool) -> Result<(), RunError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let attributes: Vec<String> = attributes
            .into_iter()
            .map(|attribute| attribute.as_ref().to_string())
            .collect();

        let runner = Runner::new(&self.provides, self.safe_run);
        let providers = runner.fetch_providers(&attributes)?;

        for plugin in providers {
            runner.run_plugin(&plugin, &mut self.facts, force)?;
        }

        Ok(())
    }

    /// The facts gathered so far.
    pub fn facts(&self) -> &Facts {
        &self.facts
    }

    /// Consumes the session, keeping only the gathered facts.
    pub fn into_facts(self) -> Facts {
        self.facts
    }

    /// The provider directory, for introspection.
    pub fn provides_map(&self) -> &ProvidesMap {
        &self.provides
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}
