//! Fact-collection plugins and their builder.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::facts::Facts;

/// Marks which declaration dialect a plugin was authored in. The resolution
/// core never branches on this; it only records how the loading layer
/// obtained the provides/depends lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Old-style plugins with file-scoped, implicit declarations.
    Legacy,
    /// Current plugins with explicit declarations.
    #[default]
    Modern,
}

/// Collection body provided by the userland. It receives the shared fact
/// tree and writes whatever it gathered into it.
type CollectFn = Box<dyn Fn(&mut Facts) -> anyhow::Result<()> + Send + Sync>;

/// A named, independently executable fact-collection task.
///
/// A plugin declares the attribute paths it *provides* and the attribute
/// paths it *depends* on; the runner uses those two lists to decide when the
/// plugin must execute. Identity is the `Arc` allocation, names are unique
/// within a session and used for diagnostics.
pub struct Plugin {
    name: Box<str>,
    dialect: Dialect,
    provides: Vec<String>,
    depends: Vec<String>,
    has_run: AtomicBool,
    collect: CollectFn,
}

impl Plugin {
    /// Starts building a new plugin with the given name.
    pub fn build(name: impl Into<Box<str>>) -> PluginBuilder {
        PluginBuilder {
            name: name.into(),
            dialect: Dialect::default(),
            provides: Vec::new(),
            depends: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Attribute paths this plugin provides, in declaration order.
    pub fn provides(&self) -> &[String] {
        &self.provides
    }

    /// Attribute paths this plugin depends on, in declaration order.
    pub fn depends(&self) -> &[String] {
        &self.depends
    }

    /// Whether this plugin already ran during the current session.
    pub fn has_run(&self) -> bool {
        self.has_run.load(Ordering::Acquire)
    }

    /// Executes the collection body. The run flag is set only when the body
    /// succeeds; a failure propagates to the caller and leaves the flag
    /// untouched.
    pub fn run(&self, facts: &mut Facts) -> anyhow::Result<()> {
        (self.collect)(facts)?;
        self.has_run.store(true, Ordering::Release);
        Ok(())
    }

    /// Executes the collection body, containing any failure. The plugin
    /// counts as run either way, so a broken plugin is attempted once and
    /// never blocks the rest of the resolution.
    pub fn safe_run(&self, facts: &mut Facts) {
        if let Err(err) = (self.collect)(facts) {
            tracing::warn!("plugin '{}' failed: {err:#}", self.name);
        }

        self.has_run.store(true, Ordering::Release);
    }
}

impl Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("dialect", &self.dialect)
            .field("provides", &self.provides)
            .field("depends", &self.depends)
            .field("has_run", &self.has_run())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Plugin`], replacing a declaration DSL with explicit calls.
///
/// ```rust
/// use hostfacts::Plugin;
///
/// let plugin = Plugin::build("uptime")
///     .provides(["uptime", "uptime_seconds"])
///     .depends(["kernel"])
///     .collect(|facts| {
///         facts.set("uptime_seconds", 1234i64);
///         Ok(())
///     });
/// ```
pub struct PluginBuilder {
    name: Box<str>,
    dialect: Dialect,
    provides: Vec<String>,
    depends: Vec<String>,
}

impl PluginBuilder {
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Declares provided attribute paths. Additive across calls.
    pub fn provides<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provides.extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Declares required attribute paths. Additive across calls.
    pub fn depends<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends.extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Attaches the collection body and finishes the plugin.
    pub fn collect<F>(self, collect: F) -> Arc<Plugin>
    where
        F: Fn(&mut Facts) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Arc::new(Plugin {
            name: self.name,
            dialect: self.dialect,
            provides: self.provides,
            depends: self.depends,
            has_run: AtomicBool::new(false),
            collect: Box::new(collect),
        })
    }

    /// Finishes the plugin with a no-op collection body.
    pub fn finish(self) -> Arc<Plugin> {
        self.collect(|_| Ok(()))
    }
}
