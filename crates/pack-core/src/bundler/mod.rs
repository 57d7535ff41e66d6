//! Source-to-source bundler.
//!
//! ## Usage
//!
//! ```ignore
//! use pack_core::{Build, BuildConfig};
//!
//! let config = BuildConfig::discover(root)?;
//! let mut build = Build::new(config)?.with_default_loaders()?.with_config_plugins();
//! let report = build.run()?;
//! println!("wrote {} files", report.written.len());
//! ```
//!
//! ## Architecture
//!
//! 1. **Resolve** - scan the entry, resolve its imports, recurse ([`graph`])
//! 2. **Load** - run pattern-matched loaders over every module ([`loader`])
//! 3. **Split** - one chunk per project file, one registry chunk for package scripts ([`chunks`])
//! 4. **Write** - finalize names (content hashes) dependencies first, then write
//!
//! In watch mode [`Build::rebuild`] re-enters the same stages for the
//! modules an edit touched and reports the hot update to send.

pub mod chunks;
pub mod graph;
pub mod loader;
pub mod loaders;
pub mod module;
pub mod package;
pub mod plugin;
pub mod plugins;
mod rebuild;
pub mod runtime;

pub use chunks::{Chunk, ChunkBody, ChunkPlan};
pub use graph::{ModuleGraph, ResolveTarget};
pub use loader::{Loader, LoaderContext, LoaderError};
pub use module::{Module, ModuleContent, ModuleId, ModuleKind};
pub use package::PackageRegistry;
pub use plugin::{ChunkInfo, EventBus, EventContext, EventKind, Plugin, PluginError, SharedState, Subject};
pub use plugins::{CopyPlugin, HtmlPlugin};
pub use rebuild::{RebuildOutcome, RebuildReport};

use graph::ResolveContext;

use crate::config::BuildConfig;
use crate::error::Result;
use crate::resolver::Resolver;

/// Summary of a full build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Entry module.
    pub root: ModuleId,
    /// Modules in the graph, synthetic ones included.
    pub modules: usize,
    /// Files written, relative to the output directory, in write order.
    pub written: Vec<String>,
    /// Package lookups answered from the cache.
    pub package_hits: usize,
    /// Package lookups that had to touch the filesystem.
    pub package_probes: usize,
}

/// One build: the graph and everything threaded through the stages.
///
/// The graph outlives [`Build::run`] so that [`Build::rebuild`] can patch it.
pub struct Build {
    config: BuildConfig,
    resolver: Resolver,
    loaders: Vec<Loader>,
    events: EventBus,
    shared: SharedState,
    graph: ModuleGraph,
    registry: PackageRegistry,
}

impl Build {
    /// Create a build; `config` is normalized first.
    pub fn new(config: BuildConfig) -> Result<Self> {
        let config = config.normalize()?;
        Ok(Self {
            resolver: Resolver::new(&config),
            config,
            loaders: Vec::new(),
            events: EventBus::new(),
            shared: SharedState::new(),
            graph: ModuleGraph::new(),
            registry: PackageRegistry::new(),
        })
    }

    /// Append a loader. Loaders are tried in registration order.
    pub fn loader(mut self, loader: Loader) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Let `plugin` subscribe to the build's events.
    pub fn plugin(mut self, plugin: &dyn Plugin) -> Self {
        plugin.apply(&mut self.events);
        self
    }

    /// Install the built-in loaders for the configured mode.
    pub fn with_default_loaders(mut self) -> Result<Self> {
        self.loaders.extend(loaders::default_loaders(&self.config)?);
        Ok(self)
    }

    /// Install the plugins the config asks for (`html`, `copy`).
    pub fn with_config_plugins(mut self) -> Self {
        if let Some(html) = self.config.html.clone() {
            self = self.plugin(&HtmlPlugin::new(html));
        }
        if !self.config.copy.is_empty() {
            let copy = CopyPlugin::new(self.config.copy.clone());
            self = self.plugin(&copy);
        }
        self
    }

    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    #[must_use]
    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    #[must_use]
    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    #[must_use]
    pub fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    /// Build everything reachable from the entry and write it out.
    ///
    /// Meant to run once per `Build`; later edits go through
    /// [`Build::rebuild`].
    pub fn run(&mut self) -> Result<BuildReport> {
        self.emit_build(EventKind::Start)?;

        let entry = self
            .resolver
            .guess_file(&self.config.entry)
            .unwrap_or_else(|| self.config.entry.clone());
        let mut added = Vec::new();
        let root = {
            let mut cx = ResolveContext {
                resolver: &self.resolver,
                events: &self.events,
                shared: &mut self.shared,
                config: &self.config,
                added: &mut added,
            };
            self.graph.resolve(ResolveTarget::Path(entry), &mut cx)?
        };
        self.graph.set_root(root);

        let ids = self.graph.ids();
        loader::apply_loaders(&mut self.graph, &self.loaders, &ids, &mut self.shared, &self.config)?;
        runtime::inject_global(&mut self.graph, root, &self.config);

        let plan = chunks::split_chunks(&self.graph, root, None, &self.registry);
        let written = self.emit_chunks(&plan)?;

        self.emit_build(EventKind::End)?;
        self.graph.settle();

        Ok(BuildReport {
            root,
            modules: self.graph.len(),
            written,
            package_hits: self.graph.packages.hits(),
            package_probes: self.graph.packages.probes(),
        })
    }

    /// Finalize and write the planned chunks.
    fn emit_chunks(&mut self, plan: &ChunkPlan) -> Result<Vec<String>> {
        let chunks = chunks::finalize_chunks(&mut self.graph, plan, &mut self.registry, &self.config)?;
        chunks::write_chunks(&mut self.graph, &chunks, &self.events, &mut self.shared, &self.config)
    }

    fn emit_build(&mut self, kind: EventKind) -> Result<()> {
        self.events.emit(
            kind,
            &mut EventContext {
                graph: &mut self.graph,
                shared: &mut self.shared,
                config: &self.config,
                subject: Subject::Build,
            },
        )
    }
}

impl std::fmt::Debug for Build {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Build")
            .field("root", &self.config.root)
            .field("loaders", &self.loaders)
            .field("events", &self.events)
            .field("modules", &self.graph.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn config(root: &Path) -> BuildConfig {
        let mut config = BuildConfig::new(root);
        config.hash = Some(false);
        config
    }

    #[test]
    fn test_run_writes_entry_and_global() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.js", "import { add } from './math';\nconsole.log(add(1, 2));\n");
        write(dir.path(), "src/math.js", "export const add = (a, b) => a + b;\n");

        let mut build = Build::new(config(dir.path())).unwrap().with_default_loaders().unwrap();
        let report = build.run().unwrap();

        assert!(report.written.contains(&"src/main.js".to_string()));
        assert!(report.written.contains(&"src/math.js".to_string()));
        assert!(report.written.iter().any(|p| runtime::is_global_outpath(p)));
        // Dependencies are written before their importers
        let pos = |name: &str| report.written.iter().position(|p| p == name).unwrap();
        assert!(pos("src/math.js") < pos("src/main.js"));

        let out = build.config().output.clone();
        let main = fs::read_to_string(out.join("src/main.js")).unwrap();
        assert!(main.starts_with("import \"./___pack_global___"));
        assert!(main.contains("import { add } from './math.js';"));
    }

    #[test]
    fn test_events_fire_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.js", "console.log(1);\n");

        struct Recorder(Arc<Mutex<Vec<&'static str>>>);
        impl Plugin for Recorder {
            fn name(&self) -> &str {
                "recorder"
            }
            fn apply(&self, events: &mut EventBus) {
                for kind in [EventKind::Start, EventKind::ModuleCreated, EventKind::ChunkWrited, EventKind::End] {
                    let log = Arc::clone(&self.0);
                    events.on(kind, "recorder", move |_| {
                        log.lock().unwrap().push(kind.as_str());
                        Ok(())
                    });
                }
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut build = Build::new(config(dir.path())).unwrap().plugin(&Recorder(Arc::clone(&log)));
        build.run().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.first(), Some(&"start"));
        assert_eq!(log.get(1), Some(&"moduleCreated"));
        assert_eq!(log.last(), Some(&"end"));
        // Entry and global module chunks
        assert_eq!(log.iter().filter(|k| **k == "chunkWrited").count(), 2);
    }

    #[test]
    fn test_missing_entry_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut build = Build::new(config(dir.path())).unwrap();
        assert!(matches!(build.run(), Err(crate::Error::Io { .. })));
    }
}
