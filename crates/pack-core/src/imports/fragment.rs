//! Fragments: the pieces a scanned module is split into.
//!
//! Concatenating every fragment's code reproduces the source exactly until a
//! fragment is rewritten. Import and export statements become their own
//! fragments so the resolver, loaders and chunk writer can change them in
//! place without re-scanning.

use std::path::PathBuf;

/// How an import fragment pulls in its dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import x from 'a'`, `import 'a'`
    Static,
    /// `export { x } from 'a'`, `export * from 'a'`
    ReExport,
    /// `require('a')`
    Require,
    /// `import('a')`
    Dynamic,
}

/// What a binding takes from the imported module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Default,
    Namespace,
    Named,
}

/// One name bound by an import or re-export.
///
/// For `import React from 'react'` the name is `React`. For
/// `import { default as R }` the name is `default` and the alias `R`.
/// For `* as ns` the name is `*` and the alias `ns`; a bare
/// `export * from` has no alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub kind: BindingKind,
    pub name: String,
    pub alias: Option<String>,
}

impl Binding {
    #[must_use]
    pub fn new(kind: BindingKind, name: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            alias,
        }
    }

    /// Name the binding is visible under locally (or exported under).
    #[must_use]
    pub fn local(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Export name read from the dependency.
    #[must_use]
    pub fn imported(&self) -> &str {
        match self.kind {
            BindingKind::Default if self.alias.is_none() => "default",
            BindingKind::Namespace => "*",
            _ => &self.name,
        }
    }
}

/// An import-like statement or expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportNode {
    pub kind: ImportKind,
    /// Exact source text of the statement.
    pub code: String,
    /// Specifier as first written in the source.
    pub raw_path: String,
    /// Specifier currently inside `code`.
    pub path: String,
    /// Absolute path of the module this resolved to.
    pub resolved: Option<PathBuf>,
    pub bindings: Vec<Binding>,
}

impl ImportNode {
    #[must_use]
    pub fn new(kind: ImportKind, code: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            kind,
            code: code.into(),
            raw_path: path.clone(),
            path,
            resolved: None,
            bindings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_bindings(mut self, bindings: Vec<Binding>) -> Self {
        self.bindings = bindings;
        self
    }

    /// Replace the quoted specifier inside `code`.
    ///
    /// Only the exact quoted literal is touched, so other occurrences of the
    /// same text in the statement survive. Returns `false` when the literal
    /// could not be found.
    pub fn set_path(&mut self, path: &str) -> bool {
        if path == self.path {
            return true;
        }
        for quote in ['\'', '"', '`'] {
            let needle = format!("{quote}{}{quote}", self.path);
            if let Some(pos) = self.code.find(&needle) {
                let replacement = format!("{quote}{path}{quote}");
                self.code.replace_range(pos..pos + needle.len(), &replacement);
                self.path = path.to_string();
                return true;
            }
        }
        false
    }

    /// Swap the extension of the current specifier.
    pub fn change_extension(&mut self, ext: &str) -> bool {
        let next = crate::paths::replace_extension(&self.path, ext);
        self.set_path(&next)
    }

    /// Whether the statement only runs the dependency for its side effects.
    #[must_use]
    pub fn is_side_effect_only(&self) -> bool {
        self.kind == ImportKind::Static && self.bindings.is_empty()
    }
}

/// Shape of an export statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportKind {
    /// `export default <expression>`; `code` is the `export default ` prefix.
    DefaultExpression,
    /// `export default function f` / `class C`; `code` is the `export default ` prefix.
    DefaultDeclaration(String),
    /// `export const a = ..`, `export function f`; `code` is the `export ` prefix.
    Declaration(Vec<String>),
    /// `export { a, b as c }`; pairs are `(local, exported)` and `code` is the whole statement.
    List(Vec<(String, String)>),
}

/// A local export statement (re-exports are [`ImportNode`]s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportNode {
    pub kind: ExportKind,
    pub code: String,
}

impl ExportNode {
    /// `(exported, local)` pairs this statement publishes.
    #[must_use]
    pub fn exported_names(&self) -> Vec<(String, String)> {
        match &self.kind {
            ExportKind::DefaultExpression => Vec::new(),
            ExportKind::DefaultDeclaration(local) => vec![("default".to_string(), local.clone())],
            ExportKind::Declaration(names) => {
                names.iter().map(|n| (n.clone(), n.clone())).collect()
            }
            ExportKind::List(pairs) => pairs
                .iter()
                .map(|(local, exported)| (exported.clone(), local.clone()))
                .collect(),
        }
    }
}

/// A piece of a module's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Code(String),
    Comment(String),
    Import(ImportNode),
    Export(ExportNode),
    /// Code another module placed here; `owner` identifies who, so it can be
    /// found and refreshed later.
    Injected { owner: String, code: String },
}

impl Fragment {
    #[must_use]
    pub fn code(code: impl Into<String>) -> Self {
        Self::Code(code.into())
    }

    #[must_use]
    pub fn injected(owner: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Injected {
            owner: owner.into(),
            code: code.into(),
        }
    }

    /// Source text of this fragment.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Code(code) | Self::Comment(code) | Self::Injected { code, .. } => code,
            Self::Import(node) => &node.code,
            Self::Export(node) => &node.code,
        }
    }

    #[must_use]
    pub fn as_import(&self) -> Option<&ImportNode> {
        match self {
            Self::Import(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_import_mut(&mut self) -> Option<&mut ImportNode> {
        match self {
            Self::Import(node) => Some(node),
            _ => None,
        }
    }

    /// Whether this fragment is injected code owned by `owner`.
    #[must_use]
    pub fn is_owned_by(&self, owner: &str) -> bool {
        matches!(self, Self::Injected { owner: o, .. } if o == owner)
    }
}

/// Concatenate fragments back into source text.
#[must_use]
pub fn render(fragments: &[Fragment]) -> String {
    let len = fragments.iter().map(|f| f.text().len()).sum();
    let mut out = String::with_capacity(len);
    for fragment in fragments {
        out.push_str(fragment.text());
    }
    out
}
