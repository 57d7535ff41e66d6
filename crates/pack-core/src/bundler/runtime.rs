//! The global runtime module.
//!
//! A small synthetic module imported first by the entry. It defines
//! `process.env` (with `NODE_ENV` and every `define` entry) on the global
//! object so browser bundles can read it like Node code does.

use serde_json::{Map, Value};

use super::graph::ModuleGraph;
use super::module::ModuleId;
use crate::config::BuildConfig;
use crate::imports::{Fragment, ImportKind, ImportNode};

/// File name prefix of the global module.
pub const GLOBAL_PREFIX: &str = "___pack_global___";

/// Source of the global module for `config`.
#[must_use]
pub fn global_code(config: &BuildConfig) -> String {
    let mut env = Map::new();
    env.insert("NODE_ENV".to_string(), Value::String(config.node_env().to_string()));
    for (key, value) in &config.define {
        env.insert(key.clone(), value.clone());
    }
    let env = Value::Object(env);
    format!(
        "const __packGlobal__ = typeof globalThis !== \"undefined\" ? globalThis : typeof self !== \"undefined\" ? self : typeof window !== \"undefined\" ? window : {{}};\n\
         __packGlobal__.process = __packGlobal__.process || {{}};\n\
         __packGlobal__.process.env = Object.assign(__packGlobal__.process.env || {{}}, {env});\n"
    )
}

/// Create the global module (or reuse it) and make `root` import it first.
///
/// Safe to call again after the root has been rebuilt.
pub fn inject_global(graph: &mut ModuleGraph, root: ModuleId, config: &BuildConfig) -> ModuleId {
    let code = global_code(config);
    let name = format!(
        "{GLOBAL_PREFIX}{}.js",
        pack_util::hash::short_hash(code.as_bytes())
    );
    let root_out = graph[root].outpath.clone();
    let outpath = match root_out.rfind('/') {
        Some(slash) => format!("{}/{name}", &root_out[..slash]),
        None => name.clone(),
    };
    let path = config.root.join(&name);
    let global = graph.insert_synthetic(path.clone(), outpath, code);
    graph.link(root, global);

    let literal = graph.literal_for(root, global);
    let Some(fragments) = graph[root].fragments_mut() else {
        return global;
    };
    let already = fragments
        .iter()
        .filter_map(Fragment::as_import)
        .any(|node| node.resolved.as_deref() == Some(path.as_path()));
    if !already {
        let mut node = ImportNode::new(
            ImportKind::Static,
            format!("import {};\n", crate::bundler::package::quote(&literal)),
            literal,
        );
        node.resolved = Some(path);
        fragments.insert(0, Fragment::Import(node));
    }
    global
}

/// Whether `outpath` names a global module.
#[must_use]
pub fn is_global_outpath(outpath: &str) -> bool {
    outpath
        .rsplit('/')
        .next()
        .is_some_and(|name| name.starts_with(GLOBAL_PREFIX))
}
