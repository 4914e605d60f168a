//! On-demand dependency resolution and execution.
//!
//! The runner does not precompute a topological order of the whole plugin
//! set. It resolves lazily, with an explicit work stack, visiting only the
//! dependency frontier actually needed for the requested plugin. Cycles are
//! therefore a runtime condition detected on the stack, not a stack
//! overflow, and plugins unrelated to the request are never touched.

use std::sync::Arc;

use crate::error::{ResolveError, RunError};
use crate::facts::Facts;
use crate::plugin::Plugin;
use crate::provides::{ProvidesMap, push_unique};

/// Executes plugins and their unmet dependencies against a populated
/// provider directory.
///
/// The runner borrows the directory, so the directory is necessarily
/// complete before any resolution can start. In safe mode a failing plugin
/// is contained and the resolution continues past it; in normal mode the
/// failure aborts the whole call.
pub struct Runner<'a> {
    provides: &'a ProvidesMap,
    safe_run: bool,
}

impl<'a> Runner<'a> {
    pub fn new(provides: &'a ProvidesMap, safe_run: bool) -> Self {
        Self { provides, safe_run }
    }

    /// Runs `plugin` and, before it, every not-yet-run plugin it transitively
    /// depends on. With `force`, already-run plugins are re-executed, though
    /// still at most once per call.
    ///
    /// Dependencies are resolved depth-first: the first unresolved provider
    /// of the current plugin is always processed next, and ties between
    /// providers of one attribute are broken by registration order.
    pub fn run_plugin(
        &self,
        plugin: &Arc<Plugin>,
        facts: &mut Facts,
        force: bool,
    ) -> Result<(), RunError> {
        if !self.provides.contains(plugin) {
            return Err(RunError::UnknownPlugin(plugin.name().to_string()));
        }

        // Plugins executed during this call. Under `force` the session-wide
        // run flag cannot tell a stale run from one we just performed, so
        // "satisfied" means executed within this call instead.
        let mut ran: Vec<Arc<Plugin>> = Vec::new();
        let satisfied = |plugin: &Arc<Plugin>, ran: &[Arc<Plugin>]| match force {
            true => ran.iter().any(|done| Arc::ptr_eq(done, plugin)),
            false => plugin.has_run(),
        };

        let mut stack = vec![Arc::clone(plugin)];

        while let Some(current) = stack.pop() {
            if satisfied(&current, &ran) {
                continue;
            }

            // Still pending deeper in the stack means the chain closed back
            // on itself.
            if stack.iter().any(|pending| Arc::ptr_eq(pending, &current)) {
                let cycle = cycle_names(&stack, &current);
                return Err(ResolveError::DependencyCycle(cycle).into());
            }

            let mut providers = self.fetch_providers(current.depends())?;
            providers.retain(|provider| {
                // A plugin listed as its own provider is legal and inert.
                !satisfied(provider, &ran) && !Arc::ptr_eq(provider, &current)
            });

            match providers.into_iter().next() {
                None => {
                    self.execute(&current, facts)?;
                    ran.push(current);
                }
                Some(next) => {
                    stack.push(current);
                    stack.push(next);
                }
            }
        }

        Ok(())
    }

    /// Resolves a list of attribute paths to their providing plugins,
    /// deduplicated across the batch.
    ///
    /// Each attribute is looked up exactly first; on a miss the last
    /// `/`-delimited segment is stripped and the shorter prefix retried,
    /// until a provider is found or no segment remains, in which case the
    /// whole lookup fails naming the original path. This is the same
    /// fallback [`ProvidesMap::find_providers`] performs with `inherit`, run
    /// here attribute by attribute against exact lookups.
    pub fn fetch_providers(&self, attributes: &[String]) -> Result<Vec<Arc<Plugin>>, ResolveError> {
        let mut providers = Vec::new();

        for attribute in attributes {
            let mut partial = attribute.as_str();

            loop {
                let found = self.provides.providers_at(partial);
                if !found.is_empty() {
                    for plugin in found {
                        push_unique(&mut providers, plugin);
                    }
                    break;
                }

                match partial.rsplit_once('/') {
                    Some((prefix, _)) => partial = prefix,
                    None => {
                        return Err(ResolveError::AttributeNotFound(attribute.clone()));
                    }
                }
            }
        }

        Ok(providers)
    }

    fn execute(&self, plugin: &Arc<Plugin>, facts: &mut Facts) -> Result<(), RunError> {
        match self.safe_run {
            true => {
                plugin.safe_run(facts);
                Ok(())
            }
            false => plugin
                .run(facts)
                .map_err(|err| RunError::Collect(plugin.name().to_string(), err)),
        }
    }
}

/// The sub-sequence of the remaining stack from the first occurrence of the
/// revisited plugin to the top: exactly the chain that closed back on
/// itself, in stack order.
fn cycle_names(stack: &[Arc<Plugin>], current: &Arc<Plugin>) -> Vec<String> {
    stack
        .iter()
        .skip_while(|pending| !Arc::ptr_eq(pending, current))
        .map(|pending| pending.name().to_string())
        .collect()
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// A plugin whose body appends its own name to a shared log.
    fn logged(
        name: &str,
        provides: &[&str],
        depends: &[&str],
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<Plugin> {
        let log = Arc::clone(log);
        let id = name.to_string();

        Plugin::build(name)
            .provides(provides.iter().copied())
            .depends(depends.iter().copied())
            .collect(move |_| {
                log.lock().unwrap().push(id.clone());
                Ok(())
            })
    }

    fn counted(
        name: &str,
        provides: &[&str],
        depends: &[&str],
        count: &Arc<AtomicUsize>,
    ) -> Arc<Plugin> {
        let count = Arc::clone(count);

        Plugin::build(name)
            .provides(provides.iter().copied())
            .depends(depends.iter().copied())
            .collect(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
    }

    #[test]
    fn runs_dependencies_before_dependents() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let zoo = logged("zoo", &["zoo"], &[], &log);
        let park = logged("park", &["park"], &["zoo"], &log);

        let mut map = ProvidesMap::new();
        map.register(&zoo, ["zoo"]);
        map.register(&park, ["park"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);
        runner.run_plugin(&park, &mut facts, false).unwrap();

        assert!(zoo.has_run());
        assert!(park.has_run());
        assert_eq!(*log.lock().unwrap(), ["zoo", "park"]);
    }

    #[test]
    fn untouched_plugins_never_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let zoo = logged("zoo", &["zoo"], &[], &log);
        let park = logged("park", &["park"], &["zoo"], &log);
        let lake = logged("lake", &["lake"], &[], &log);

        let mut map = ProvidesMap::new();
        map.register(&zoo, ["zoo"]);
        map.register(&park, ["park"]);
        map.register(&lake, ["lake"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);
        runner.run_plugin(&park, &mut facts, false).unwrap();

        assert!(!lake.has_run());
    }

    #[test]
    fn second_run_is_a_no_op() {
        let count = Arc::new(AtomicUsize::new(0));
        let zoo = counted("zoo", &["zoo"], &[], &count);
        let park = counted("park", &["park"], &["zoo"], &count);

        let mut map = ProvidesMap::new();
        map.register(&zoo, ["zoo"]);
        map.register(&park, ["park"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);
        runner.run_plugin(&park, &mut facts, false).unwrap();
        runner.run_plugin(&park, &mut facts, false).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn force_reruns_whole_chain_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let zoo = counted("zoo", &["zoo"], &[], &count);
        let park = counted("park", &["park"], &["zoo"], &count);

        let mut map = ProvidesMap::new();
        map.register(&zoo, ["zoo"]);
        map.register(&park, ["park"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);
        runner.run_plugin(&park, &mut facts, false).unwrap();
        runner.run_plugin(&park, &mut facts, true).unwrap();

        // zoo and park twice each
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn force_on_diamond_reruns_each_plugin_exactly_once() {
        let counts: Vec<_> = (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let base = counted("base", &["base"], &[], &counts[0]);
        let left = counted("left", &["left"], &["base"], &counts[1]);
        let right = counted("right", &["right"], &["base"], &counts[2]);
        let top = counted("top", &["top"], &["left", "right"], &counts[3]);

        let mut map = ProvidesMap::new();
        map.register(&base, ["base"]);
        map.register(&left, ["left"]);
        map.register(&right, ["right"]);
        map.register(&top, ["top"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);

        runner.run_plugin(&top, &mut facts, false).unwrap();
        for count in &counts {
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }

        runner.run_plugin(&top, &mut facts, true).unwrap();
        for count in &counts {
            assert_eq!(count.load(Ordering::SeqCst), 2);
        }
    }

    #[test]
    fn self_dependency_is_inert() {
        let count = Arc::new(AtomicUsize::new(0));
        let loner = counted("loner", &["loner"], &["loner"], &count);

        let mut map = ProvidesMap::new();
        map.register(&loner, ["loner"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);
        runner.run_plugin(&loner, &mut facts, false).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cycle_reports_exact_chain() {
        let a = Plugin::build("a").provides(["a"]).depends(["b"]).finish();
        let b = Plugin::build("b").provides(["b"]).depends(["a"]).finish();

        let mut map = ProvidesMap::new();
        map.register(&a, ["a"]);
        map.register(&b, ["b"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);
        let err = runner.run_plugin(&a, &mut facts, false).unwrap_err();

        match err {
            RunError::Resolve(ResolveError::DependencyCycle(chain)) => {
                assert_eq!(chain, ["a", "b"]);
            }
            other => panic!("expected dependency cycle, got {other:?}"),
        }
    }

    #[test]
    fn three_plugin_cycle_is_detected() {
        let a = Plugin::build("a").provides(["a"]).depends(["b"]).finish();
        let b = Plugin::build("b").provides(["b"]).depends(["c"]).finish();
        let c = Plugin::build("c").provides(["c"]).depends(["a"]).finish();

        let mut map = ProvidesMap::new();
        map.register(&a, ["a"]);
        map.register(&b, ["b"]);
        map.register(&c, ["c"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);
        let err = runner.run_plugin(&a, &mut facts, false).unwrap_err();

        match err {
            RunError::Resolve(ResolveError::DependencyCycle(chain)) => {
                assert_eq!(chain, ["a", "b", "c"]);
            }
            other => panic!("expected dependency cycle, got {other:?}"),
        }
    }

    #[test]
    fn shared_provider_runs_once_for_two_attributes() {
        let count = Arc::new(AtomicUsize::new(0));
        let both = counted("both", &["one", "two"], &[], &count);
        let needy = counted("needy", &["needy"], &["one", "two"], &count);

        let mut map = ProvidesMap::new();
        map.register(&both, ["one", "two"]);
        map.register(&needy, ["needy"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);
        runner.run_plugin(&needy, &mut facts, false).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dependency_falls_back_to_ancestor_provider() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let network = logged("network", &["network"], &[], &log);
        let probe = logged(
            "probe",
            &["probe"],
            &["network/default_interface"],
            &log,
        );

        let mut map = ProvidesMap::new();
        map.register(&network, ["network"]);
        map.register(&probe, ["probe"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);
        runner.run_plugin(&probe, &mut facts, false).unwrap();

        assert_eq!(*log.lock().unwrap(), ["network", "probe"]);
    }

    #[test]
    fn missing_dependency_names_original_path() {
        let probe = Plugin::build("probe")
            .provides(["probe"])
            .depends(["nosuch/deep/attr"])
            .finish();

        let mut map = ProvidesMap::new();
        map.register(&probe, ["probe"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);
        let err = runner.run_plugin(&probe, &mut facts, false).unwrap_err();

        assert!(matches!(
            err,
            RunError::Resolve(ResolveError::AttributeNotFound(path))
                if path == "nosuch/deep/attr"
        ));
    }

    #[test]
    fn unregistered_plugin_is_rejected() {
        let map = ProvidesMap::new();
        let stray = Plugin::build("stray").provides(["stray"]).finish();

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);
        let err = runner.run_plugin(&stray, &mut facts, false).unwrap_err();

        assert!(matches!(err, RunError::UnknownPlugin(name) if name == "stray"));
    }

    #[test]
    fn normal_mode_propagates_collect_failure() {
        let bad = Plugin::build("bad")
            .provides(["bad"])
            .collect(|_| anyhow::bail!("probe exploded"));

        let mut map = ProvidesMap::new();
        map.register(&bad, ["bad"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);
        let err = runner.run_plugin(&bad, &mut facts, false).unwrap_err();

        assert!(matches!(err, RunError::Collect(name, _) if name == "bad"));
        assert!(!bad.has_run());
    }

    #[test]
    fn safe_mode_continues_past_failing_dependency() {
        let bad = Plugin::build("bad")
            .provides(["bad"])
            .collect(|_| anyhow::bail!("probe exploded"));
        let dependent = Plugin::build("dependent")
            .provides(["dependent"])
            .depends(["bad"])
            .collect(|facts| {
                facts.set("dependent", true);
                Ok(())
            });

        let mut map = ProvidesMap::new();
        map.register(&bad, ["bad"]);
        map.register(&dependent, ["dependent"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, true);
        runner.run_plugin(&dependent, &mut facts, false).unwrap();

        assert!(bad.has_run());
        assert!(dependent.has_run());
        assert_eq!(facts.get("dependent"), Some(&crate::Value::Bool(true)));
    }

    #[test]
    fn registration_order_breaks_provider_ties() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = logged("first", &["attr"], &[], &log);
        let second = logged("second", &["attr"], &[], &log);
        let needy = logged("needy", &["needy"], &["attr"], &log);

        let mut map = ProvidesMap::new();
        map.register(&first, ["attr"]);
        map.register(&second, ["attr"]);
        map.register(&needy, ["needy"]);

        let mut facts = Facts::new();
        let runner = Runner::new(&map, false);
        runner.run_plugin(&needy, &mut facts, false).unwrap();

        assert_eq!(*log.lock().unwrap(), ["first", "second", "needy"]);
    }

    #[test]
    fn fallback_matches_directory_inherit() {
        let net = Plugin::build("net").provides(["network"]).finish();
        let cpu = Plugin::build("cpu").provides(["cpu/cores"]).finish();

        let mut map = ProvidesMap::new();
        map.register(&net, ["network"]);
        map.register(&cpu, ["cpu/cores"]);

        let runner = Runner::new(&map, false);
        let attributes = [
            "network/default_interface".to_string(),
            "cpu/cores".to_string(),
        ];

        let from_runner = runner.fetch_providers(&attributes).unwrap();
        let from_map = map.find_providers(&attributes, true).unwrap();

        let names = |plugins: &[Arc<Plugin>]| -> Vec<String> {
            plugins.iter().map(|p| p.name().to_string()).collect()
        };
        assert_eq!(names(&from_runner), names(&from_map));
    }
}
