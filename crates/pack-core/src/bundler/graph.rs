//! Module dependency graph.
//!
//! Modules live in an arena and refer to each other by [`ModuleId`], so
//! resetting or evicting one node never leaves a dangling reference. Every
//! edge is stored twice (`dependencies` on the importer, `parents` on the
//! imported module) and every mutation updates both sides.

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::module::{Module, ModuleContent, ModuleId, ModuleKind};
use super::plugin::{EventBus, EventContext, EventKind, SharedState, Subject};
use crate::config::{BuildConfig, Target};
use crate::error::{Error, Result};
use crate::imports::{scan_module, wrap_commonjs, Fragment};
use crate::paths;
use crate::resolver::{PackageCache, PackageInfo, Resolution, Resolver};

/// Starting point of a resolve pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveTarget {
    /// A file not known to the graph yet (or known under this path).
    Path(PathBuf),
    /// An evicted module, re-resolved in place under its old id.
    Existing(ModuleId),
}

/// Collaborators a resolve pass needs besides the graph itself.
pub struct ResolveContext<'a> {
    pub resolver: &'a Resolver,
    pub events: &'a EventBus,
    pub shared: &'a mut SharedState,
    pub config: &'a BuildConfig,
    /// Every module (re)created during the pass, in creation order.
    pub added: &'a mut Vec<ModuleId>,
}

/// One import fragment in a parent that points at a given child.
pub struct ImportSite<'a> {
    pub parent: ModuleId,
    pub parent_outpath: &'a str,
    /// Index of the fragment inside the parent.
    pub index: usize,
    pub fragment: &'a mut Fragment,
}

/// The module dependency graph.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// All modules ever created, indexed by ID. Evicted modules keep their slot.
    modules: Vec<Module>,
    /// Absolute path to ID, for modules currently in the graph.
    index: HashMap<PathBuf, ModuleId>,
    root: Option<ModuleId>,
    /// Package resolutions and manifests, shared by every pass.
    pub packages: PackageCache,
}

impl ModuleGraph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of modules currently in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn root(&self) -> Option<ModuleId> {
        self.root
    }

    pub fn set_root(&mut self, id: ModuleId) {
        if let Some(old) = self.root.and_then(|old| self.modules.get_mut(old)) {
            old.is_root = false;
        }
        self.modules[id].is_root = true;
        self.root = Some(id);
    }

    /// Get a module by ID.
    #[must_use]
    pub fn get(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    pub fn get_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id)
    }

    /// ID of the module currently registered under `path`.
    #[must_use]
    pub fn lookup(&self, path: &Path) -> Option<ModuleId> {
        self.index.get(path).copied()
    }

    #[must_use]
    pub fn contains(&self, id: ModuleId) -> bool {
        self.modules
            .get(id)
            .is_some_and(|m| self.index.get(&m.id) == Some(&id))
    }

    /// IDs of every module in the graph, in creation order.
    #[must_use]
    pub fn ids(&self) -> Vec<ModuleId> {
        self.iter().map(|m| m.uid).collect()
    }

    /// Modules in the graph, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules
            .iter()
            .filter(|m| self.index.get(&m.id) == Some(&m.uid))
    }

    /// Create and register a module for `path`.
    pub fn create(&mut self, path: PathBuf) -> ModuleId {
        let id = self.modules.len();
        self.index.insert(path.clone(), id);
        self.modules.push(Module::new(id, path));
        id
    }

    /// Register an in-memory module, or return the one already under `path`.
    pub fn insert_synthetic(&mut self, path: PathBuf, outpath: String, code: String) -> ModuleId {
        if let Some(existing) = self.lookup(&path) {
            return existing;
        }
        let id = self.modules.len();
        self.index.insert(path.clone(), id);
        self.modules.push(Module::synthetic(id, path, outpath, code));
        id
    }

    /// Drop `id` from the path index; edges and slot are kept.
    pub fn evict(&mut self, id: ModuleId) {
        let path = &self.modules[id].id;
        if self.index.get(path) == Some(&id) {
            self.index.remove(path);
        }
    }

    /// Put an evicted module back under its id.
    pub fn reinsert(&mut self, id: ModuleId) {
        self.index.insert(self.modules[id].id.clone(), id);
    }

    /// Add the edge `parent -> child` unless it exists.
    pub fn link(&mut self, parent: ModuleId, child: ModuleId) {
        if !self.modules[parent].dependencies.contains(&child) {
            self.modules[parent].dependencies.push(child);
        }
        if !self.modules[child].parents.contains(&parent) {
            self.modules[child].parents.push(parent);
        }
    }

    /// Remove the edge `parent -> child`.
    pub fn unlink(&mut self, parent: ModuleId, child: ModuleId) {
        self.modules[parent].dependencies.retain(|&d| d != child);
        self.modules[child].parents.retain(|&p| p != parent);
    }

    /// Clear a module's forward edges and derived state. Back edges stay so
    /// importers keep pointing at it.
    pub fn reset(&mut self, id: ModuleId) {
        for dep in std::mem::take(&mut self.modules[id].dependencies) {
            self.modules[dep].parents.retain(|&p| p != id);
        }
        self.modules[id].reset();
    }

    /// Unlink a module in both directions and drop it from the graph.
    pub fn remove(&mut self, id: ModuleId) {
        for dep in std::mem::take(&mut self.modules[id].dependencies) {
            self.modules[dep].parents.retain(|&p| p != id);
        }
        for parent in std::mem::take(&mut self.modules[id].parents) {
            self.modules[parent].dependencies.retain(|&d| d != id);
        }
        self.evict(id);
        if self.root == Some(id) {
            self.root = None;
        }
    }

    /// Every module that transitively imports `id`, nearest first.
    #[must_use]
    pub fn ancestors(&self, id: ModuleId) -> Vec<ModuleId> {
        let mut seen = HashSet::default();
        seen.insert(id);
        let mut out = Vec::new();
        let mut cursor = 0;
        let mut queue = vec![id];
        while cursor < queue.len() {
            let current = queue[cursor];
            cursor += 1;
            for &parent in &self.modules[current].parents {
                if seen.insert(parent) {
                    out.push(parent);
                    queue.push(parent);
                }
            }
        }
        out
    }

    /// Clear the `changing` flag on every module.
    pub fn settle(&mut self) {
        for module in &mut self.modules {
            module.changing = false;
        }
    }

    /// Literal a parent should use to import `child`.
    ///
    /// Assets are referenced by URL from the output root; everything else by
    /// a path relative to the parent's output file.
    #[must_use]
    pub fn literal_for(&self, parent: ModuleId, child: ModuleId) -> String {
        let child = &self.modules[child];
        if child.kind == ModuleKind::Asset {
            paths::ensure_root_prefix(child.final_outpath())
        } else {
            paths::relative_literal(&self.modules[parent].outpath, child.final_outpath())
        }
    }

    /// Rewrite every parent literal that targets `child` to its current path.
    ///
    /// Returns the parents whose fragments changed.
    pub fn sync_parent_literals(&mut self, child: ModuleId) -> Vec<ModuleId> {
        let target = self.modules[child].id.clone();
        let mut touched = Vec::new();
        for parent in self.modules[child].parents.clone() {
            let literal = self.literal_for(parent, child);
            let Some(fragments) = self.modules[parent].fragments_mut() else {
                continue;
            };
            let mut changed = false;
            for node in fragments.iter_mut().filter_map(Fragment::as_import_mut) {
                if node.resolved.as_deref() == Some(target.as_path()) && node.path != literal {
                    changed |= node.set_path(&literal);
                }
            }
            if changed {
                touched.push(parent);
            }
        }
        touched
    }

    /// Visit import fragments targeting `child` in parents that are being
    /// rebuilt and pass `filter`.
    pub fn rewrite_parent_imports<P, F>(&mut self, child: ModuleId, filter: P, mut f: F) -> Result<()>
    where
        P: Fn(&Module) -> bool,
        F: FnMut(ImportSite<'_>) -> Result<()>,
    {
        let target = self.modules[child].id.clone();
        for parent in self.modules[child].parents.clone() {
            let module = &mut self.modules[parent];
            if !module.changing || !filter(module) {
                continue;
            }
            let parent_outpath = module.outpath.clone();
            let ModuleContent::Fragments(fragments) = &mut module.content else {
                continue;
            };
            for (index, fragment) in fragments.iter_mut().enumerate() {
                let hit = fragment
                    .as_import()
                    .is_some_and(|node| node.resolved.as_deref() == Some(target.as_path()));
                if hit {
                    f(ImportSite {
                        parent,
                        parent_outpath: &parent_outpath,
                        index,
                        fragment,
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Resolve `target` and everything it imports.
    ///
    /// Modules are registered before their imports are walked, so cycles
    /// terminate. Errors leave already-created modules in place.
    pub fn resolve(&mut self, target: ResolveTarget, cx: &mut ResolveContext<'_>) -> Result<ModuleId> {
        self.resolve_module(target, None, None, cx)
    }

    fn resolve_module(
        &mut self,
        target: ResolveTarget,
        parent: Option<ModuleId>,
        package: Option<Arc<PackageInfo>>,
        cx: &mut ResolveContext<'_>,
    ) -> Result<ModuleId> {
        let cached = match &target {
            ResolveTarget::Path(path) => self.lookup(path),
            ResolveTarget::Existing(id) => self.lookup(&self.modules[*id].id),
        };
        if let Some(cached) = cached {
            if let Some(parent) = parent {
                self.link(parent, cached);
            }
            return Ok(cached);
        }

        let id = match target {
            ResolveTarget::Path(path) => self.create(path),
            ResolveTarget::Existing(id) => {
                self.reinsert(id);
                id
            }
        };
        if let Some(parent) = parent {
            self.link(parent, id);
        }
        cx.added.push(id);

        let path = self.modules[id].id.clone();
        let raw = std::fs::read(&path).map_err(|e| Error::io(&path, e))?;
        {
            let root = &cx.config.root;
            let target = cx.config.target;
            let module = &mut self.modules[id];
            if module.package.is_none() {
                module.package = package;
            }
            module.hash = pack_util::hash::blake3_bytes(&raw);
            let outpath = match &module.package {
                Some(pkg) => pkg.outpath_for(&path),
                None => paths::to_slash(&paths::relative(root, &path)),
            };
            let outpath = if module.kind == ModuleKind::Script {
                normalize_script_outpath(&outpath, target)
            } else {
                outpath
            };
            module.set_outpath(outpath);
        }
        self.emit(EventKind::ModuleCreated, id, cx)?;

        match self.modules[id].kind {
            ModuleKind::Script => {
                self.modules[id].content =
                    ModuleContent::Text(String::from_utf8_lossy(&raw).into_owned());
                self.emit(EventKind::BeforeModuleResolve, id, cx)?;

                let source = match std::mem::take(&mut self.modules[id].content) {
                    ModuleContent::Text(text) => text,
                    _ => String::from_utf8_lossy(&raw).into_owned(),
                };
                let mut scan = scan_module(&source);
                let module = &mut self.modules[id];
                if scan.is_commonjs() {
                    module.is_cjs = true;
                    // Package code runs inside the registry's own CommonJS scope
                    if !module.is_package() {
                        wrap_commonjs(&mut scan);
                    }
                }
                module.content = ModuleContent::Fragments(scan.fragments);

                self.resolve_imports(id, cx)?;
                self.emit(EventKind::ModuleResolved, id, cx)?;
            }
            ModuleKind::Style | ModuleKind::Json => {
                self.modules[id].content =
                    ModuleContent::Text(String::from_utf8_lossy(&raw).into_owned());
            }
            ModuleKind::Asset => self.modules[id].content = ModuleContent::File,
            ModuleKind::Synthetic => {}
        }

        Ok(id)
    }

    fn resolve_imports(&mut self, id: ModuleId, cx: &mut ResolveContext<'_>) -> Result<()> {
        let count = self.modules[id].fragments().map_or(0, <[Fragment]>::len);
        for index in 0..count {
            let Some(mut node) = self.modules[id]
                .fragments()
                .and_then(|f| f[index].as_import())
                .cloned()
            else {
                continue;
            };
            let importer = self.modules[id].id.clone();
            let importer_pkg = self.modules[id].package.clone();

            let resolution =
                cx.resolver
                    .resolve(&mut node, &importer, importer_pkg.as_ref(), &mut self.packages)?;
            if let Resolution::Module { path, package } = resolution {
                node.resolved = Some(path.clone());
                let dep = self.resolve_module(ResolveTarget::Path(path), Some(id), package, cx)?;
                node.set_path(&self.literal_for(id, dep));
            }

            if let Some(slot) = self.modules[id].fragments_mut().and_then(|f| f.get_mut(index)) {
                *slot = Fragment::Import(node);
            }
        }
        Ok(())
    }

    fn emit(&mut self, kind: EventKind, id: ModuleId, cx: &mut ResolveContext<'_>) -> Result<()> {
        cx.events.emit(
            kind,
            &mut EventContext {
                graph: self,
                shared: &mut *cx.shared,
                config: cx.config,
                subject: Subject::Module(id),
            },
        )
    }
}

impl Index<ModuleId> for ModuleGraph {
    type Output = Module;

    fn index(&self, id: ModuleId) -> &Module {
        &self.modules[id]
    }
}

impl IndexMut<ModuleId> for ModuleGraph {
    fn index_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id]
    }
}

/// Output extension for a script: everything the browser loads becomes `.js`.
fn normalize_script_outpath(outpath: &str, target: Target) -> String {
    match paths::extension(outpath) {
        ".jsx" | ".ts" | ".tsx" => paths::replace_extension(outpath, ".js"),
        ".mjs" | ".cjs" if target == Target::Web => paths::replace_extension(outpath, ".js"),
        _ => outpath.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn project(files: &[(&str, &str)]) -> (TempDir, BuildConfig) {
        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        for (path, body) in files {
            let file = root.join(path);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, body).unwrap();
        }
        let config = BuildConfig::new(&root).normalize().unwrap();
        (dir, config)
    }

    fn resolve_entry(graph: &mut ModuleGraph, config: &BuildConfig) -> Result<(ModuleId, Vec<ModuleId>)> {
        let resolver = Resolver::new(config);
        let events = EventBus::new();
        let mut shared = SharedState::new();
        let mut added = Vec::new();
        let root = graph.resolve(
            ResolveTarget::Path(config.entry.clone()),
            &mut ResolveContext {
                resolver: &resolver,
                events: &events,
                shared: &mut shared,
                config,
                added: &mut added,
            },
        )?;
        Ok((root, added))
    }

    #[test]
    fn test_diamond_shares_one_module() {
        let (_dir, config) = project(&[
            ("src/main.js", "import a from './a';\nimport b from './b';\n"),
            ("src/a.js", "import { x } from './shared';\nexport default x;\n"),
            ("src/b.js", "import { x } from './shared.js';\nexport default x;\n"),
            ("src/shared.js", "export const x = 1;\n"),
        ]);
        let mut graph = ModuleGraph::new();
        let (root, added) = resolve_entry(&mut graph, &config).unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(added.len(), 4);
        let shared = graph.lookup(&config.root.join("src/shared.js")).unwrap();
        let a = graph.lookup(&config.root.join("src/a.js")).unwrap();
        let b = graph.lookup(&config.root.join("src/b.js")).unwrap();
        assert_eq!(graph[shared].parents, vec![a, b]);
        assert_eq!(graph[root].dependencies, vec![a, b]);
    }

    #[test]
    fn test_literals_point_at_output_paths() {
        let (_dir, config) = project(&[
            ("src/main.js", "import util from './util';\nimport C from './ui/card.tsx';\n"),
            ("src/util.js", "export default 1;\n"),
            ("src/ui/card.tsx", "export default 2;\n"),
        ]);
        let mut graph = ModuleGraph::new();
        let (root, _) = resolve_entry(&mut graph, &config).unwrap();

        let code = graph[root].text().unwrap();
        assert!(code.contains("import util from './util.js';"));
        assert!(code.contains("import C from './ui/card.js';"));
        let card = graph.lookup(&config.root.join("src/ui/card.tsx")).unwrap();
        assert_eq!(graph[card].outpath, "src/ui/card.js");
        assert_eq!(graph[card].current_path(), paths::to_slash(&config.root.join("src/ui/card.tsx")));
    }

    #[test]
    fn test_cycle_terminates() {
        let (_dir, config) = project(&[
            ("src/main.js", "import './a';\n"),
            ("src/a.js", "import { b } from './b';\nexport const a = 1;\n"),
            ("src/b.js", "import { a } from './a';\nexport const b = 2;\n"),
        ]);
        let mut graph = ModuleGraph::new();
        resolve_entry(&mut graph, &config).unwrap();

        let a = graph.lookup(&config.root.join("src/a.js")).unwrap();
        let b = graph.lookup(&config.root.join("src/b.js")).unwrap();
        assert!(graph[a].dependencies.contains(&b));
        assert!(graph[b].dependencies.contains(&a));
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_missing_import_fails_after_partial_graph() {
        let (_dir, config) = project(&[("src/main.js", "import './ok';\nimport './gone';\n"), ("src/ok.js", "")]);
        let mut graph = ModuleGraph::new();
        let err = resolve_entry(&mut graph, &config).unwrap_err();
        assert!(matches!(err, Error::Resolve(_)));
        assert!(graph.lookup(&config.root.join("src/ok.js")).is_some());
    }

    #[test]
    fn test_reset_and_remove_unlink_both_sides() {
        let (_dir, config) = project(&[
            ("src/main.js", "import './a';\n"),
            ("src/a.js", "import './b';\n"),
            ("src/b.js", ""),
        ]);
        let mut graph = ModuleGraph::new();
        let (root, _) = resolve_entry(&mut graph, &config).unwrap();
        let a = graph.lookup(&config.root.join("src/a.js")).unwrap();
        let b = graph.lookup(&config.root.join("src/b.js")).unwrap();

        graph.reset(a);
        assert!(graph[a].dependencies.is_empty());
        assert!(graph[b].parents.is_empty());
        assert_eq!(graph[a].parents, vec![root]);
        assert!(graph[a].changing);

        graph.remove(a);
        assert!(graph[root].dependencies.is_empty());
        assert!(graph.lookup(&config.root.join("src/a.js")).is_none());
        assert!(!graph.contains(a));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_existing_target_reuses_slot() {
        let (_dir, config) = project(&[("src/main.js", "import './a';\n"), ("src/a.js", "")]);
        let mut graph = ModuleGraph::new();
        let (root, _) = resolve_entry(&mut graph, &config).unwrap();

        fs::write(config.root.join("src/a.js"), "import './c';\n").unwrap();
        fs::write(config.root.join("src/c.js"), "").unwrap();
        let a = graph.lookup(&config.root.join("src/a.js")).unwrap();
        graph.reset(a);
        graph.evict(a);

        let resolver = Resolver::new(&config);
        let events = EventBus::new();
        let mut shared = SharedState::new();
        let mut added = Vec::new();
        let again = graph
            .resolve(
                ResolveTarget::Existing(a),
                &mut ResolveContext {
                    resolver: &resolver,
                    events: &events,
                    shared: &mut shared,
                    config: &config,
                    added: &mut added,
                },
            )
            .unwrap();

        assert_eq!(again, a);
        assert_eq!(graph[a].parents, vec![root]);
        let c = graph.lookup(&config.root.join("src/c.js")).unwrap();
        assert_eq!(added, vec![a, c]);
        assert_eq!(graph.ancestors(c), vec![a, root]);
    }

    #[test]
    fn test_resolve_events_fire_per_module() {
        let (_dir, config) = project(&[("src/main.js", "import './a';\n"), ("src/a.js", "")]);
        let mut events = EventBus::new();
        events.on(EventKind::ModuleCreated, "count", |cx| {
            cx.shared.append("created", "+");
            Ok(())
        });
        events.on(EventKind::BeforeModuleResolve, "banner", |cx| {
            if let Some(ModuleContent::Text(text)) = cx.module_mut().map(|m| &mut m.content) {
                text.insert_str(0, "// banner\n");
            }
            Ok(())
        });

        let mut graph = ModuleGraph::new();
        let resolver = Resolver::new(&config);
        let mut shared = SharedState::new();
        let mut added = Vec::new();
        let root = graph
            .resolve(
                ResolveTarget::Path(config.entry.clone()),
                &mut ResolveContext {
                    resolver: &resolver,
                    events: &events,
                    shared: &mut shared,
                    config: &config,
                    added: &mut added,
                },
            )
            .unwrap();

        assert_eq!(shared.get("created"), Some("++"));
        assert!(graph[root].text().unwrap().starts_with("// banner\n"));
    }

    #[test]
    fn test_normalize_script_outpath() {
        assert_eq!(normalize_script_outpath("src/a.ts", Target::Web), "src/a.js");
        assert_eq!(normalize_script_outpath("src/a.mjs", Target::Web), "src/a.js");
        assert_eq!(normalize_script_outpath("src/a.mjs", Target::Node), "src/a.mjs");
        assert_eq!(normalize_script_outpath("src/a.vue", Target::Web), "src/a.vue");
    }
}
