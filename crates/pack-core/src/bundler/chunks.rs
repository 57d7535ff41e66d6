//! Splitting the graph into chunks and writing them out.
//!
//! Project files and package files that are not scripts each become their
//! own chunk, named after their output path. Package scripts added in the
//! same pass share one package chunk (see [`super::package`]).
//!
//! Chunks are finalized dependencies first, so by the time a file is hashed
//! every literal it contains already names its dependencies' final files.

use rustc_hash::FxHashSet as HashSet;
use std::path::PathBuf;

use super::graph::ModuleGraph;
use super::module::ModuleId;
use super::package::{self, PackageRegistry};
use super::plugin::{ChunkInfo, EventBus, EventContext, EventKind, SharedState, Subject};
use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::imports::Fragment;
use crate::paths;

/// Where a chunk's bytes come from at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkBody {
    /// Rendered package registry.
    Registry(String),
    /// The module's rendered text.
    Module(ModuleId),
    /// The module's file, copied as is.
    Copy(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub modules: Vec<ModuleId>,
    /// Output path relative to the output directory.
    pub outpath: String,
    pub body: ChunkBody,
}

impl Chunk {
    #[must_use]
    pub fn is_package(&self) -> bool {
        matches!(self.body, ChunkBody::Registry(_))
    }

    #[must_use]
    pub fn info(&self) -> ChunkInfo {
        ChunkInfo {
            outpath: self.outpath.clone(),
            modules: self.modules.clone(),
            is_package: self.is_package(),
        }
    }
}

/// Modules to emit in one pass, grouped by how they are emitted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Package scripts for a new package chunk.
    pub package: Vec<ModuleId>,
    /// Package scripts owned by an earlier package chunk. Their importers
    /// may have been rebuilt and need rewriting again.
    pub registered: Vec<ModuleId>,
    /// Package files emitted on their own.
    pub standalone: Vec<ModuleId>,
    /// Project files, dependencies before dependents.
    pub local: Vec<ModuleId>,
}

impl ChunkPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.package.is_empty() && self.standalone.is_empty() && self.local.is_empty()
    }
}

/// Walk the graph from `root` and plan the chunks for modules in `scope`
/// (every module when `scope` is `None`).
#[must_use]
pub fn split_chunks(
    graph: &ModuleGraph,
    root: ModuleId,
    scope: Option<&HashSet<ModuleId>>,
    registry: &PackageRegistry,
) -> ChunkPlan {
    let mut walk = Walk {
        graph,
        scope,
        registry,
        seen: HashSet::default(),
        plan: ChunkPlan::default(),
    };
    walk.visit(root);
    walk.plan
}

struct Walk<'a> {
    graph: &'a ModuleGraph,
    scope: Option<&'a HashSet<ModuleId>>,
    registry: &'a PackageRegistry,
    seen: HashSet<ModuleId>,
    plan: ChunkPlan,
}

impl Walk<'_> {
    fn visit(&mut self, id: ModuleId) {
        if !self.seen.insert(id) {
            return;
        }
        let graph = self.graph;
        let module = &graph[id];
        let in_scope = self.scope.map_or(true, |scope| scope.contains(&id));

        if module.is_package_script() {
            if !in_scope {
                if self.registry.contains(id) {
                    self.plan.registered.push(id);
                }
                return;
            }
            self.plan.package.push(id);
        }

        for &dep in &module.dependencies {
            self.visit(dep);
        }

        if module.is_package_script() || !in_scope || module.skip_write {
            return;
        }
        if module.is_package() {
            self.plan.standalone.push(id);
        } else {
            self.plan.local.push(id);
        }
    }
}

/// Name every planned chunk and point importers at the final names.
///
/// Standalone package files go first, then the package chunk, then project
/// files in dependency order.
pub fn finalize_chunks(
    graph: &mut ModuleGraph,
    plan: &ChunkPlan,
    registry: &mut PackageRegistry,
    config: &BuildConfig,
) -> Result<Vec<Chunk>> {
    let append_hash = config.append_hash();
    let mut chunks = Vec::new();

    for &id in &plan.standalone {
        chunks.push(finalize_module(graph, id, append_hash));
    }

    if !plan.package.is_empty() {
        let index = registry.next_index();
        let text = package::render_chunk(graph, &plan.package, index, registry)?;
        let mut outpath = package::base_outpath(index);
        if append_hash {
            outpath = paths::append_hash(&outpath, &pack_util::hash::short_hash(text.as_bytes()));
        }
        let info = registry.register(outpath, &plan.package);
        for &id in &plan.package {
            graph[id].set_chunk_outpath(info.outpath.clone());
        }
        chunks.push(Chunk {
            modules: plan.package.clone(),
            outpath: info.outpath,
            body: ChunkBody::Registry(text),
        });
    }
    for &id in plan.package.iter().chain(&plan.registered) {
        rewrite_importers(graph, id, registry)?;
    }

    for &id in &plan.local {
        chunks.push(finalize_module(graph, id, append_hash));
    }
    Ok(chunks)
}

fn finalize_module(graph: &mut ModuleGraph, id: ModuleId, append_hash: bool) -> Chunk {
    let module = &graph[id];
    let (body, hash) = match module.text() {
        Some(text) => (
            ChunkBody::Module(id),
            pack_util::hash::short_hash(text.as_bytes()),
        ),
        None => (
            ChunkBody::Copy(module.id.clone()),
            pack_util::hash::shorten(&module.hash).to_string(),
        ),
    };
    let outpath = if append_hash {
        paths::append_hash(&module.outpath, &hash)
    } else {
        module.outpath.clone()
    };

    graph[id].set_chunk_outpath(outpath.clone());
    graph.sync_parent_literals(id);
    Chunk {
        modules: vec![id],
        outpath,
        body,
    }
}

/// Point project-file imports of package module `id` at its chunk's loader.
fn rewrite_importers(graph: &mut ModuleGraph, id: ModuleId, registry: &PackageRegistry) -> Result<()> {
    let Some(chunk) = registry.owner(id).cloned() else {
        return Ok(());
    };
    let importers: Vec<(ModuleId, PathBuf)> = graph[id]
        .parents
        .iter()
        .map(|&p| (p, graph[p].id.clone()))
        .collect();

    let owner = format!("pkg-require:{id}");
    let mut touched = Vec::new();
    graph.rewrite_parent_imports(
        id,
        |parent| !parent.is_package_script(),
        |site| {
            let Fragment::Import(node) = &*site.fragment else {
                return Ok(());
            };
            let importer = importers
                .iter()
                .find(|(p, _)| *p == site.parent)
                .map(|(_, path)| path.clone())
                .unwrap_or_default();
            let code = package::lower_importer(&importer, node, id, &chunk.loader, site.index)?;
            *site.fragment = Fragment::injected(owner.clone(), code);
            if !touched.contains(&site.parent) {
                touched.push(site.parent);
            }
            Ok(())
        },
    )?;

    for parent in touched {
        package::ensure_loader_import(&mut graph[parent], &chunk);
    }
    Ok(())
}

/// Write `chunks` under the output directory, emitting the write events.
///
/// Module chunks are rendered at write time, so edits made by
/// `beforeModuleWrite` handlers land in the file; the file name keeps the
/// hash computed when the chunk was finalized.
pub fn write_chunks(
    graph: &mut ModuleGraph,
    chunks: &[Chunk],
    events: &EventBus,
    shared: &mut SharedState,
    config: &BuildConfig,
) -> Result<Vec<String>> {
    let mut written = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let info = chunk.info();
        emit(events, EventKind::BeforeChunkWrite, Subject::Chunk(&info), graph, shared, config)?;
        for &id in &chunk.modules {
            emit(events, EventKind::BeforeModuleWrite, Subject::Module(id), graph, shared, config)?;
        }

        let dest = config.output.join(&chunk.outpath);
        match &chunk.body {
            ChunkBody::Registry(text) => pack_util::fs::atomic_write(&dest, text.as_bytes()),
            ChunkBody::Module(id) => {
                let text = graph[*id].text().unwrap_or_default();
                pack_util::fs::atomic_write(&dest, text.as_bytes())
            }
            ChunkBody::Copy(from) => pack_util::fs::copy_creating_dirs(from, &dest),
        }
        .map_err(|e| Error::io(&dest, e))?;

        for &id in &chunk.modules {
            emit(events, EventKind::ModuleWrited, Subject::Module(id), graph, shared, config)?;
        }
        emit(events, EventKind::ChunkWrited, Subject::Chunk(&info), graph, shared, config)?;
        written.push(chunk.outpath.clone());
    }
    Ok(written)
}

fn emit(
    events: &EventBus,
    kind: EventKind,
    subject: Subject<'_>,
    graph: &mut ModuleGraph,
    shared: &mut SharedState,
    config: &BuildConfig,
) -> Result<()> {
    events.emit(
        kind,
        &mut EventContext {
            graph,
            shared,
            config,
            subject,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::module::ModuleContent;
    use crate::imports::{ImportKind, ImportNode};
    use crate::resolver::PackageInfo;
    use std::sync::Arc;

    fn local(graph: &mut ModuleGraph, path: &str, code: &str) -> ModuleId {
        let id = graph.create(PathBuf::from(format!("/p/{path}")));
        graph[id].set_outpath(path.to_string());
        graph[id].content = ModuleContent::Fragments(vec![Fragment::code(code)]);
        id
    }

    fn import(graph: &mut ModuleGraph, parent: ModuleId, child: ModuleId, code: &str, literal: &str) {
        let mut node = ImportNode::new(ImportKind::Static, code, literal);
        node.resolved = Some(graph[child].id.clone());
        if let Some(fragments) = graph[parent].fragments_mut() {
            fragments.insert(0, Fragment::Import(node));
        }
        graph.link(parent, child);
    }

    fn package_info() -> Arc<PackageInfo> {
        Arc::new(PackageInfo {
            name: "lib".into(),
            version: "1.0.0".into(),
            root: PathBuf::from("/p/node_modules/lib"),
            manifest: serde_json::json!({}),
            out_root: ".pack/lib@1.0.0".into(),
        })
    }

    #[test]
    fn test_plan_orders_dependencies_first() {
        let mut graph = ModuleGraph::new();
        let main = local(&mut graph, "main.js", "\n");
        let a = local(&mut graph, "a.js", "\n");
        let b = local(&mut graph, "b.js", "\n");
        let lib = local(&mut graph, ".pack/lib@1.0.0/index.js", "export default 1;\n");
        graph[lib].package = Some(package_info());
        import(&mut graph, main, a, "import './a.js';", "./a.js");
        import(&mut graph, a, b, "import './b.js';", "./b.js");
        import(&mut graph, main, lib, "import lib from 'lib';", "lib");
        graph[b].skip_write();

        let plan = split_chunks(&graph, main, None, &PackageRegistry::new());
        assert_eq!(plan.local, vec![a, main]);
        assert_eq!(plan.package, vec![lib]);
        assert!(plan.standalone.is_empty());

        let scope: HashSet<ModuleId> = [a].into_iter().collect();
        let plan = split_chunks(&graph, main, Some(&scope), &PackageRegistry::new());
        assert_eq!(plan.local, vec![a]);
        assert!(plan.package.is_empty());
        assert!(plan.registered.is_empty());
    }

    #[test]
    fn test_finalize_hashes_and_rewrites_literals() {
        let mut graph = ModuleGraph::new();
        let main = local(&mut graph, "main.js", "\nrun();\n");
        let util = local(&mut graph, "util.js", "export const x = 1;\n");
        import(&mut graph, main, util, "import { x } from './util.js';", "./util.js");

        let mut config = BuildConfig::new("/p");
        config.hash = Some(true);
        let mut registry = PackageRegistry::new();
        let plan = split_chunks(&graph, main, None, &registry);
        let chunks = finalize_chunks(&mut graph, &plan, &mut registry, &config).unwrap();

        let util_hash = pack_util::hash::short_hash(b"export const x = 1;\n");
        let util_out = format!("util_{util_hash}.js");
        assert_eq!(chunks[0].outpath, util_out);
        assert_eq!(graph[util].final_outpath(), util_out);
        let main_text = graph[main].text().unwrap();
        assert!(main_text.starts_with(&format!("import {{ x }} from './{util_out}';")));
        let main_hash = pack_util::hash::short_hash(main_text.as_bytes());
        assert_eq!(chunks[1].outpath, format!("main_{main_hash}.js"));
    }

    #[test]
    fn test_package_members_share_a_chunk() {
        let mut graph = ModuleGraph::new();
        let main = local(&mut graph, "src/main.js", "\nconsole.log(lib);\n");
        let lib = local(&mut graph, ".pack/lib@1.0.0/index.js", "");
        graph[lib].package = Some(package_info());
        if let Some(fragments) = graph[lib].fragments_mut() {
            fragments.clear();
            fragments.push(Fragment::code("module.exports = 42;\n"));
        }
        graph[lib].is_cjs = true;
        let mut node = ImportNode::new(ImportKind::Static, "import lib from 'lib';", "lib")
            .with_bindings(vec![crate::imports::Binding::new(
                crate::imports::BindingKind::Default,
                "lib",
                None,
            )]);
        node.resolved = Some(graph[lib].id.clone());
        if let Some(fragments) = graph[main].fragments_mut() {
            fragments.insert(0, Fragment::Import(node));
        }
        graph.link(main, lib);

        let mut config = BuildConfig::new("/p");
        config.hash = Some(false);
        let mut registry = PackageRegistry::new();
        let plan = split_chunks(&graph, main, None, &registry);
        let chunks = finalize_chunks(&mut graph, &plan, &mut registry, &config).unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_package());
        assert_eq!(chunks[0].outpath, ".pack/pkg_chunk0.js");
        assert_eq!(registry.owner(lib).map(|c| c.index), Some(0));
        assert_eq!(
            graph[main].text().unwrap(),
            format!(
                "import __pkgRequire0__ from \"../.pack/pkg_chunk0.js\";\nconst {{ \"default\": lib }} = __pkgRequire0__({lib});\nconsole.log(lib);\n"
            )
        );

        // A rebuilt importer is rewritten against the existing chunk
        graph.settle();
        graph[main].changing = true;
        let mut node = ImportNode::new(ImportKind::Static, "import 'lib';", "lib");
        node.resolved = Some(graph[lib].id.clone());
        graph[main].content = ModuleContent::Fragments(vec![Fragment::Import(node)]);
        let scope: HashSet<ModuleId> = [main].into_iter().collect();
        let plan = split_chunks(&graph, main, Some(&scope), &registry);
        assert_eq!(plan.registered, vec![lib]);
        assert!(plan.package.is_empty());
        finalize_chunks(&mut graph, &plan, &mut registry, &config).unwrap();
        assert_eq!(
            graph[main].text().unwrap(),
            format!("import __pkgRequire0__ from \"../.pack/pkg_chunk0.js\";\n__pkgRequire0__({lib});")
        );
    }
}
