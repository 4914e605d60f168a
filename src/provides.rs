//! The provider directory: an index from attribute path to providing plugins.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ResolveError;
use crate::plugin::Plugin;

/// Appends the plugin unless an identical handle is already present,
/// preserving first-seen order.
pub(crate) fn push_unique(plugins: &mut Vec<Arc<Plugin>>, plugin: &Arc<Plugin>) {
    if !plugins.iter().any(|known| Arc::ptr_eq(known, plugin)) {
        plugins.push(Arc::clone(plugin));
    }
}

/// Maps attribute paths to the plugins providing them.
///
/// The directory is populated once, before any resolution begins, and is
/// read-only afterwards; a new session rebuilds it from scratch. A plugin may
/// be registered under many paths and, across repeated loading passes, more
/// than once under the same path, so lookups that must be unique deduplicate
/// by handle identity.
#[derive(Debug, Default)]
pub struct ProvidesMap {
    map: HashMap<String, Vec<Arc<Plugin>>>,
}

impl ProvidesMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `plugin` as a provider of every path in `attributes`,
    /// appending in registration order.
    pub fn register<I, S>(&mut self, plugin: &Arc<Plugin>, attributes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for attribute in attributes {
            self.map
                .entry(attribute.into())
                .or_default()
                .push(Arc::clone(plugin));
        }
    }

    /// Providers registered at exactly this path; empty when none.
    pub(crate) fn providers_at(&self, attribute: &str) -> &[Arc<Plugin>] {
        self.map.get(attribute).map(Vec::as_slice).unwrap_or_default()
    }

    /// Looks up the plugins providing the requested attributes, concatenated
    /// in request order and deduplicated by handle identity.
    ///
    /// Without `inherit` only exact paths match. With `inherit`, a path with
    /// no exact provider falls back to its nearest ancestor prefix that has
    /// one: `top/middle/bottom` is retried as `top/middle`, then `top`.
    /// Sibling paths are never considered. Either way, a path for which no
    /// provider exists fails with [`ResolveError::AttributeNotFound`] naming
    /// the originally requested path.
    pub fn find_providers<I, S>(
        &self,
        attributes: I,
        inherit: bool,
    ) -> Result<Vec<Arc<Plugin>>, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut providers = Vec::new();

        for attribute in attributes {
            let attribute = attribute.as_ref();
            let mut partial = attribute;

            loop {
                let found = self.providers_at(partial);
                if !found.is_empty() {
                    for plugin in found {
                        push_unique(&mut providers, plugin);
                    }
                    break;
                }

                match partial.rsplit_once('/') {
                    Some((prefix, _)) if inherit => partial = prefix,
                    _ => return Err(ResolveError::AttributeNotFound(attribute.to_string())),
                }
            }
        }

        Ok(providers)
    }

    /// Every plugin registered under any path, deduplicated by identity.
    pub fn all_plugins(&self) -> Vec<Arc<Plugin>> {
        let mut plugins = Vec::new();

        for providers in self.map.values() {
            for plugin in providers {
                push_unique(&mut plugins, plugin);
            }
        }

        plugins
    }

    /// Whether this exact handle is registered under any path.
    pub fn contains(&self, plugin: &Arc<Plugin>) -> bool {
        self.map
            .values()
            .flatten()
            .any(|known| Arc::ptr_eq(known, plugin))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
