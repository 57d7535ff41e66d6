//! Package chunks.
//!
//! Every package script added in one pass is bundled into a single registry
//! file, `.pack/pkg_chunk<N>.js`. Each member becomes a factory
//! `(exports, module, require) => {..}` keyed by its module id; the file's
//! default export is the loader `__pkgRequire<N>__(id, raw)`.
//!
//! Project files import a package module through the loader of the chunk
//! that owns it:
//!
//! ```text
//! import React, { useState } from 'react';
//! // becomes
//! import __pkgRequire0__ from './.pack/pkg_chunk0_1a2b3c4d.js';
//! const { "default": React, "useState": useState } = __pkgRequire0__(4);
//! ```

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::path::Path;

use super::graph::ModuleGraph;
use super::module::{Module, ModuleId, ModuleKind};
use crate::error::{Error, Result};
use crate::imports::{BindingKind, ExportKind, Fragment, ImportKind, ImportNode};
use crate::paths;
use crate::resolver::PACKAGE_OUT_DIR;

/// Loader and registry helpers appended to every package chunk.
const RUNTIME: &str = r#"const __packCache__ = {};
function __packRequire__(id) {
  const cached = __packCache__[id];
  if (cached) return cached.exports;
  const factory = __packModules__[id];
  if (!factory) throw new Error("pack: module " + id + " is not registered in this chunk");
  const module = { exports: {} };
  __packCache__[id] = module;
  factory(module.exports, module, __packRequire__);
  return module.exports;
}
function __packExport__(exports, getters) {
  Object.defineProperty(exports, "__esModule", { value: true });
  for (const name in getters) {
    Object.defineProperty(exports, name, { enumerable: true, get: getters[name] });
  }
}
function __packNamespace__(m) {
  if (m && m.__esModule) return m;
  const ns = { default: m, __packCjs: true };
  if (m && (typeof m === "object" || typeof m === "function")) {
    for (const name in m) {
      if (name !== "default") ns[name] = m[name];
    }
  }
  return ns;
}
function __packReexport__(exports, source) {
  for (const name in source) {
    if (name === "default" || name === "__packCjs" || Object.prototype.hasOwnProperty.call(exports, name)) continue;
    Object.defineProperty(exports, name, { enumerable: true, get: () => source[name] });
  }
}
export default function (id, raw) {
  const exports = __packRequire__(id);
  return raw ? exports : __packNamespace__(exports);
}
"#;

/// A written package chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageChunkInfo {
    pub index: usize,
    /// Name the loader is imported under.
    pub loader: String,
    /// Final output path, relative to the output directory.
    pub outpath: String,
}

/// Which package chunk owns which package module, across every pass.
#[derive(Debug, Default)]
pub struct PackageRegistry {
    chunks: Vec<PackageChunkInfo>,
    owners: HashMap<ModuleId, usize>,
}

impl PackageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next registered chunk will get.
    #[must_use]
    pub fn next_index(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn chunks(&self) -> &[PackageChunkInfo] {
        &self.chunks
    }

    /// Chunk that currently owns `id`.
    #[must_use]
    pub fn owner(&self, id: ModuleId) -> Option<&PackageChunkInfo> {
        self.owners.get(&id).map(|&index| &self.chunks[index])
    }

    #[must_use]
    pub fn contains(&self, id: ModuleId) -> bool {
        self.owners.contains_key(&id)
    }

    /// Record a new chunk; its members move to it.
    pub fn register(&mut self, outpath: String, members: &[ModuleId]) -> PackageChunkInfo {
        let index = self.chunks.len();
        let info = PackageChunkInfo {
            index,
            loader: loader_name(index),
            outpath,
        };
        for &id in members {
            self.owners.insert(id, index);
        }
        self.chunks.push(info.clone());
        info
    }
}

#[must_use]
pub fn loader_name(index: usize) -> String {
    format!("__pkgRequire{index}__")
}

/// Output path of chunk `index` before hashing.
#[must_use]
pub fn base_outpath(index: usize) -> String {
    format!("{PACKAGE_OUT_DIR}/pkg_chunk{index}.js")
}

/// Render package chunk `index` holding `members`.
///
/// Members may import each other, modules of earlier package chunks, host
/// built-ins, or files emitted as their own chunks.
pub fn render_chunk(
    graph: &ModuleGraph,
    members: &[ModuleId],
    index: usize,
    registry: &PackageRegistry,
) -> Result<String> {
    let own: HashSet<ModuleId> = members.iter().copied().collect();
    let mut header = ChunkHeader::new(base_outpath(index));
    let mut registry_body = String::new();

    for &id in members {
        let body = lower_module(graph, id, &own, registry, &mut header)?;
        registry_body.push_str(&format!("{id}: (exports, module, require) => {{\n{body}\n}},\n"));
    }

    let mut out = header.lines.concat();
    out.push_str("const __packModules__ = {\n");
    out.push_str(&registry_body);
    out.push_str("};\n");
    out.push_str(RUNTIME);
    Ok(out)
}

/// Imports hoisted to the top of a package chunk.
struct ChunkHeader {
    outpath: String,
    lines: Vec<String>,
    names: HashMap<String, String>,
}

impl ChunkHeader {
    fn new(outpath: String) -> Self {
        Self {
            outpath,
            lines: Vec::new(),
            names: HashMap::default(),
        }
    }

    /// Default-import another chunk's loader.
    fn loader(&mut self, chunk: &PackageChunkInfo) -> String {
        let literal = paths::relative_literal(&self.outpath, &chunk.outpath);
        if !self.names.contains_key(&literal) {
            self.lines
                .push(format!("import {} from {};\n", chunk.loader, quote(&literal)));
            self.names.insert(literal, chunk.loader.clone());
        }
        chunk.loader.clone()
    }

    /// Namespace-import a module that lives outside the registry.
    fn external(&mut self, specifier: &str) -> String {
        if let Some(name) = self.names.get(specifier) {
            return name.clone();
        }
        let name = format!("__packExternal{}__", self.names.len());
        self.lines
            .push(format!("import * as {name} from {};\n", quote(specifier)));
        self.names.insert(specifier.to_string(), name.clone());
        name
    }
}

/// How lowered code reaches a dependency.
struct DepRef {
    /// Expression for the dependency's `module.exports`.
    raw: String,
    /// Expression for its namespace object.
    namespace: String,
}

fn lower_module(
    graph: &ModuleGraph,
    id: ModuleId,
    own: &HashSet<ModuleId>,
    registry: &PackageRegistry,
    header: &mut ChunkHeader,
) -> Result<String> {
    let module = &graph[id];
    let Some(fragments) = module.fragments() else {
        let text = module.text().unwrap_or_default();
        return Ok(if module.kind == ModuleKind::Json {
            format!("module.exports = {};", text.trim())
        } else {
            text
        });
    };

    let mut getters: Vec<(String, String)> = Vec::new();
    let mut body = String::new();
    let mut reexports = 0;

    for fragment in fragments {
        match fragment {
            Fragment::Import(node) => {
                let dep = node.resolved.as_deref().and_then(|p| graph.lookup(p));
                if dep.is_some_and(|dep| graph[dep].kind == ModuleKind::Asset) {
                    // Already lowered to a URL constant by the asset loader
                    body.push_str(&node.code);
                    continue;
                }
                let target = dep_ref(graph, dep, node, own, registry, header);
                body.push_str(&lower_import(module, node, &target, &mut getters, &mut reexports)?);
            }
            Fragment::Export(node) => match &node.kind {
                ExportKind::DefaultExpression => {
                    body.push_str("const __packDefault__ = ");
                    getters.push(("default".to_string(), "__packDefault__".to_string()));
                }
                _ => getters.extend(node.exported_names()),
            },
            other => body.push_str(other.text()),
        }
    }

    if module.is_cjs {
        return Ok(body);
    }
    let getters: Vec<String> = getters
        .iter()
        .map(|(name, expr)| format!("{}: () => {expr}", quote(name)))
        .collect();
    Ok(format!(
        "__packExport__(exports, {{ {} }});\n{body}",
        getters.join(", ")
    ))
}

fn dep_ref(
    graph: &ModuleGraph,
    dep: Option<ModuleId>,
    node: &ImportNode,
    own: &HashSet<ModuleId>,
    registry: &PackageRegistry,
    header: &mut ChunkHeader,
) -> DepRef {
    if let Some(dep) = dep {
        if own.contains(&dep) {
            return DepRef {
                raw: format!("require({dep})"),
                namespace: format!("__packNamespace__(require({dep}))"),
            };
        }
        if let Some(chunk) = registry.owner(dep) {
            let loader = header.loader(chunk);
            return DepRef {
                raw: format!("{loader}({dep}, true)"),
                namespace: format!("{loader}({dep})"),
            };
        }
    }

    // Host built-in, or a file emitted as its own chunk
    let specifier = match dep {
        Some(dep) => paths::relative_literal(&header.outpath, graph[dep].final_outpath()),
        None => node.path.clone(),
    };
    let ns = header.external(&specifier);
    DepRef {
        raw: format!("({ns}.default ?? {ns})"),
        namespace: ns,
    }
}

fn lower_import(
    module: &Module,
    node: &ImportNode,
    dep: &DepRef,
    getters: &mut Vec<(String, String)>,
    reexports: &mut usize,
) -> Result<String> {
    Ok(match node.kind {
        ImportKind::Require => dep.raw.clone(),
        ImportKind::Dynamic => format!("Promise.resolve().then(() => {})", dep.namespace),
        ImportKind::Static => bind_statement(node, &dep.namespace, "const")
            .unwrap_or_else(|| format!("{};", dep.raw)),
        ImportKind::ReExport => {
            if node.bindings.iter().any(|b| b.kind == BindingKind::Namespace && b.alias.is_none()) {
                return Ok(format!("__packReexport__(exports, {});", dep.namespace));
            }
            if node.bindings.is_empty() {
                return Err(Error::unsupported(&module.id, format!("empty re-export of '{}'", node.raw_path)));
            }
            let local = format!("__packReexport{reexports}__");
            *reexports += 1;
            for binding in &node.bindings {
                let expr = if binding.kind == BindingKind::Namespace {
                    local.clone()
                } else {
                    format!("{local}[{}]", quote(binding.imported()))
                };
                getters.push((binding.local().to_string(), expr));
            }
            format!("const {local} = {};", dep.namespace)
        }
    })
}

/// `const { "a": b } = ns;` and `const ns = ..;` for an import's bindings.
fn bind_statement(node: &ImportNode, namespace: &str, keyword: &str) -> Option<String> {
    if node.bindings.is_empty() {
        return None;
    }
    let mut statements = Vec::new();
    let mut pattern = Vec::new();
    for binding in &node.bindings {
        match binding.kind {
            BindingKind::Namespace => {
                statements.push(format!("{keyword} {} = {namespace};", binding.local()));
            }
            BindingKind::Default | BindingKind::Named => {
                pattern.push(format!("{}: {}", quote(binding.imported()), binding.local()));
            }
        }
    }
    if !pattern.is_empty() {
        statements.insert(
            0,
            format!("{keyword} {{ {} }} = {namespace};", pattern.join(", ")),
        );
    }
    Some(statements.join(" "))
}

/// Code that replaces a project file's import of package module `uid`.
///
/// `site` distinguishes the temporaries of several re-exports in one file.
pub fn lower_importer(
    importer: &Path,
    node: &ImportNode,
    uid: ModuleId,
    loader: &str,
    site: usize,
) -> Result<String> {
    let call = format!("{loader}({uid})");
    Ok(match node.kind {
        ImportKind::Require => format!("{loader}({uid}, true)"),
        ImportKind::Dynamic => format!("Promise.resolve().then(() => {call})"),
        ImportKind::Static => {
            bind_statement(node, &call, "const").unwrap_or_else(|| format!("{call};"))
        }
        ImportKind::ReExport => {
            if node.bindings.iter().any(|b| b.kind == BindingKind::Namespace && b.alias.is_none()) {
                return Err(Error::unsupported(
                    importer,
                    format!("`export *` from package module '{}'", node.raw_path),
                ));
            }
            let local = format!("__packImport{uid}_{site}__");
            let mut out = format!("const {local} = {call};");
            let mut pattern = Vec::new();
            for binding in &node.bindings {
                match (binding.kind, binding.local()) {
                    (BindingKind::Namespace, alias) => {
                        out.push_str(&format!(" export const {alias} = {local};"));
                    }
                    (_, "default") => {
                        out.push_str(&format!(" export default {local}[{}];", quote(binding.imported())));
                    }
                    (_, exported) => {
                        pattern.push(format!("{}: {exported}", quote(binding.imported())));
                    }
                }
            }
            if !pattern.is_empty() {
                out.push_str(&format!(" export const {{ {} }} = {local};", pattern.join(", ")));
            }
            out
        }
    })
}

/// Owner tag of the fragment that imports chunk `index`'s loader.
#[must_use]
pub fn loader_import_owner(index: usize) -> String {
    format!("pkg-chunk:{index}")
}

/// Make sure `module` imports the loader of `chunk`, at the top of the file.
pub fn ensure_loader_import(module: &mut Module, chunk: &PackageChunkInfo) {
    let literal = paths::relative_literal(&module.outpath, &chunk.outpath);
    let code = format!("import {} from {};\n", chunk.loader, quote(&literal));
    let owner = loader_import_owner(chunk.index);
    let Some(fragments) = module.fragments_mut() else {
        return;
    };
    match fragments.iter_mut().find(|f| f.is_owned_by(&owner)) {
        Some(Fragment::Injected { code: existing, .. }) => *existing = code,
        _ => fragments.insert(0, Fragment::injected(owner, code)),
    }
}

/// JavaScript string literal.
pub(crate) fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imports::{scan_module, Binding};
    use crate::bundler::module::ModuleContent;
    use std::path::PathBuf;

    fn static_import(code: &str, path: &str, bindings: Vec<Binding>) -> ImportNode {
        ImportNode::new(ImportKind::Static, code, path).with_bindings(bindings)
    }

    #[test]
    fn test_importer_default_and_named() {
        let node = static_import(
            "import React, { useState as us } from 'react';",
            "react",
            vec![
                Binding::new(BindingKind::Default, "React", None),
                Binding::new(BindingKind::Named, "useState", Some("us".into())),
            ],
        );
        let code = lower_importer(Path::new("/p/main.js"), &node, 4, "__pkgRequire0__", 0).unwrap();
        assert_eq!(code, r#"const { "default": React, "useState": us } = __pkgRequire0__(4);"#);
    }

    #[test]
    fn test_importer_namespace_side_effect_and_require() {
        let ns = static_import(
            "import * as R from 'react';",
            "react",
            vec![Binding::new(BindingKind::Namespace, "*", Some("R".into()))],
        );
        let path = Path::new("/p/main.js");
        assert_eq!(lower_importer(path, &ns, 2, "__pkgRequire1__", 0).unwrap(), "const R = __pkgRequire1__(2);");

        let bare = static_import("import 'polyfill';", "polyfill", vec![]);
        assert_eq!(lower_importer(path, &bare, 3, "__pkgRequire1__", 0).unwrap(), "__pkgRequire1__(3);");

        let req = ImportNode::new(ImportKind::Require, "require('x')", "x");
        assert_eq!(lower_importer(path, &req, 5, "__pkgRequire1__", 0).unwrap(), "__pkgRequire1__(5, true)");

        let dynamic = ImportNode::new(ImportKind::Dynamic, "import('x')", "x");
        assert_eq!(
            lower_importer(path, &dynamic, 5, "__pkgRequire1__", 0).unwrap(),
            "Promise.resolve().then(() => __pkgRequire1__(5))"
        );
    }

    #[test]
    fn test_importer_reexports() {
        let node = ImportNode::new(ImportKind::ReExport, "export { default, a as b } from 'x';", "x")
            .with_bindings(vec![
                Binding::new(BindingKind::Default, "default", None),
                Binding::new(BindingKind::Named, "a", Some("b".into())),
            ]);
        let code = lower_importer(Path::new("/p/m.js"), &node, 7, "__pkgRequire0__", 3).unwrap();
        assert_eq!(
            code,
            r#"const __packImport7_3__ = __pkgRequire0__(7); export default __packImport7_3__["default"]; export const { "a": b } = __packImport7_3__;"#
        );

        let star = ImportNode::new(ImportKind::ReExport, "export * from 'x';", "x")
            .with_bindings(vec![Binding::new(BindingKind::Namespace, "*", None)]);
        let err = lower_importer(Path::new("/p/m.js"), &star, 7, "__pkgRequire0__", 0).unwrap_err();
        assert_eq!(err.code(), "E_UNSUPPORTED");
    }

    fn package_module(graph: &mut ModuleGraph, path: &str, source: &str) -> ModuleId {
        let id = graph.create(PathBuf::from(path));
        let scan = scan_module(source);
        graph[id].is_cjs = scan.is_commonjs();
        graph[id].content = ModuleContent::Fragments(scan.fragments);
        graph[id].set_outpath(path.trim_start_matches("/p/").to_string());
        id
    }

    #[test]
    fn test_render_chunk_lowers_members() {
        let mut graph = ModuleGraph::new();
        let index = package_module(
            &mut graph,
            "/p/node_modules/lib/index.js",
            "import { helper } from './helper.js';\nexport default function lib() { return helper(); }\nexport const version = 1;\n",
        );
        let helper = package_module(
            &mut graph,
            "/p/node_modules/lib/helper.js",
            "module.exports.helper = () => require('fs');\n",
        );
        graph.link(index, helper);
        if let Some(Fragment::Import(node)) = graph[index].fragments_mut().and_then(|f| f.first_mut()) {
            node.resolved = Some(PathBuf::from("/p/node_modules/lib/helper.js"));
        }

        let registry = PackageRegistry::new();
        let code = render_chunk(&graph, &[index, helper], 0, &registry).unwrap();

        assert!(code.contains(&format!("{index}: (exports, module, require) => {{\n")));
        assert!(code.contains(r#"__packExport__(exports, { "default": () => lib, "version": () => version });"#));
        assert!(code.contains(&format!(
            r#"const {{ "helper": helper }} = __packNamespace__(require({helper}));"#
        )));
        assert!(code.contains("function lib() { return helper(); }"));
        assert!(code.starts_with("import * as __packExternal0__ from \"fs\";\n"));
        assert!(code.contains("module.exports.helper = () => (__packExternal0__.default ?? __packExternal0__);"));
        assert!(code.contains("export default function (id, raw)"));
    }

    #[test]
    fn test_cross_chunk_members_use_owner_loader() {
        let mut graph = ModuleGraph::new();
        let old = package_module(&mut graph, "/p/node_modules/a/index.js", "exports.a = 1;\n");
        let new = package_module(&mut graph, "/p/node_modules/b/index.js", "export * from 'a';\n");
        if let Some(Fragment::Import(node)) = graph[new].fragments_mut().and_then(|f| f.first_mut()) {
            node.resolved = Some(PathBuf::from("/p/node_modules/a/index.js"));
        }

        let mut registry = PackageRegistry::new();
        registry.register(".pack/pkg_chunk0_00000000.js".into(), &[old]);
        assert_eq!(registry.owner(old).map(|c| c.loader.as_str()), Some("__pkgRequire0__"));

        let code = render_chunk(&graph, &[new], registry.next_index(), &registry).unwrap();
        assert!(code.starts_with("import __pkgRequire0__ from \"./pkg_chunk0_00000000.js\";\n"));
        assert!(code.contains(&format!("__packReexport__(exports, __pkgRequire0__({old}));")));
    }

    #[test]
    fn test_ensure_loader_import_once() {
        let mut module = Module::new(0, PathBuf::from("/p/src/main.js"));
        module.set_outpath("src/main.js".into());
        module.content = ModuleContent::Fragments(vec![Fragment::code("run();\n")]);
        let chunk = PackageChunkInfo {
            index: 1,
            loader: loader_name(1),
            outpath: ".pack/pkg_chunk1.js".into(),
        };
        ensure_loader_import(&mut module, &chunk);
        ensure_loader_import(&mut module, &chunk);
        assert_eq!(
            module.text().unwrap(),
            "import __pkgRequire1__ from \"../.pack/pkg_chunk1.js\";\nrun();\n"
        );
    }
}
