//! CommonJS to ES module wrapping for project files.
//!
//! A local module with no `import`/`export` syntax is wrapped so it can be
//! loaded as an ES module: `require('x')` calls become hoisted namespace
//! imports, and `module.exports` becomes the default export. Names assigned
//! through `exports.x =` are also exported by name.

use super::fragment::{Binding, BindingKind, Fragment, ImportKind, ImportNode};
use super::scan::ScanResult;

const PRELUDE: &str = "const module = { exports: {} };\nlet exports = module.exports;\nconst __packInterop__ = (m) => (m && m.__packCjs ? m.default : m);\n";

/// Rewrite a scanned CommonJS module into ES module fragments.
///
/// Each distinct required specifier is imported once at the top; the
/// original `require(..)` call sites keep working through an interop helper
/// that unwraps other wrapped modules back to their `module.exports`.
pub fn wrap_commonjs(scan: &mut ScanResult) {
    let body = std::mem::take(&mut scan.fragments);
    let mut hoisted: Vec<ImportNode> = Vec::new();
    let mut fragments = Vec::with_capacity(body.len() + 4);

    fragments.push(Fragment::code(PRELUDE));
    let mut rewritten = Vec::with_capacity(body.len());

    for fragment in body {
        match fragment {
            Fragment::Import(node) if node.kind == ImportKind::Require => {
                let index = match hoisted.iter().position(|h| h.path == node.path) {
                    Some(index) => index,
                    None => {
                        hoisted.push(hoisted_import(&node, hoisted.len()));
                        hoisted.len() - 1
                    }
                };
                rewritten.push(Fragment::Code(format!(
                    "__packInterop__({})",
                    require_binding(index)
                )));
            }
            other => rewritten.push(other),
        }
    }

    fragments.extend(hoisted.into_iter().map(Fragment::Import));
    fragments.extend(rewritten);
    fragments.push(Fragment::Code(epilogue(&scan.cjs_exports)));
    scan.fragments = fragments;
}

fn require_binding(index: usize) -> String {
    format!("__packRequire{index}__")
}

fn hoisted_import(require: &ImportNode, index: usize) -> ImportNode {
    let local = require_binding(index);
    let mut node = ImportNode::new(
        ImportKind::Static,
        format!("import * as {local} from '{}';\n", require.path),
        require.path.clone(),
    )
    .with_bindings(vec![Binding::new(BindingKind::Namespace, "*", Some(local))]);
    node.raw_path.clone_from(&require.raw_path);
    node
}

fn epilogue(names: &[String]) -> String {
    let mut out = String::from("\nexport default module.exports;\nexport const __packCjs = true;\n");
    let names: Vec<&String> = names
        .iter()
        .filter(|n| n.as_str() != "default" && n.as_str() != "__packCjs")
        .collect();
    if names.is_empty() {
        return out;
    }

    let locals: Vec<String> = (0..names.len()).map(|i| format!("__packExport{i}__")).collect();
    let pattern: Vec<String> = names
        .iter()
        .zip(&locals)
        .map(|(name, local)| format!("{name}: {local}"))
        .collect();
    let list: Vec<String> = names
        .iter()
        .zip(&locals)
        .map(|(name, local)| format!("{local} as {name}"))
        .collect();

    out.push_str(&format!("const {{ {} }} = module.exports;\n", pattern.join(", ")));
    out.push_str(&format!("export {{ {} }};\n", list.join(", ")));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imports::{render, scan_module};

    #[test]
    fn test_wrap_hoists_requires_once() {
        let mut scan = scan_module("const a = require('./a');\nconst b = require('./a');\nmodule.exports = a + b;\n");
        wrap_commonjs(&mut scan);

        let imports: Vec<_> = scan.imports().collect();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].kind, ImportKind::Static);
        assert_eq!(imports[0].path, "./a");
        assert_eq!(imports[0].bindings[0].local(), "__packRequire0__");

        let code = render(&scan.fragments);
        assert!(code.starts_with(PRELUDE));
        assert!(code.contains("const a = __packInterop__(__packRequire0__);"));
        assert!(code.contains("const b = __packInterop__(__packRequire0__);"));
        assert!(code.contains("export default module.exports;"));
    }

    #[test]
    fn test_wrap_exports_assigned_names() {
        let mut scan = scan_module("exports.foo = 1;\nmodule.exports.bar = 2;\n");
        wrap_commonjs(&mut scan);
        let code = render(&scan.fragments);
        assert!(code.contains("const { foo: __packExport0__, bar: __packExport1__ } = module.exports;"));
        assert!(code.contains("export { __packExport0__ as foo, __packExport1__ as bar };"));
    }

    #[test]
    fn test_hoisted_import_keeps_raw_path() {
        let mut scan = scan_module("require('lodash');");
        wrap_commonjs(&mut scan);
        let node = scan.imports().next().unwrap();
        assert_eq!(node.raw_path, "lodash");
        assert!(node.code.starts_with("import * as __packRequire0__ from 'lodash';"));
    }
}
