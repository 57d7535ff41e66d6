//! Alias rules: literal import-path rewrites applied before resolution.
//!
//! A key ending in `$` matches only the whole specifier and beats every
//! prefix rule. Other keys match the specifier itself or a `/`-separated
//! prefix of it, longest key first.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::paths;

#[derive(Debug, Clone)]
struct AliasRule {
    key: String,
    target: String,
}

/// Compiled alias table.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    exact: Vec<AliasRule>,
    prefix: Vec<AliasRule>,
}

impl AliasTable {
    /// Compile configured aliases. Relative targets are made absolute against `root`.
    #[must_use]
    pub fn new(aliases: &BTreeMap<String, String>, root: &Path) -> Self {
        let mut table = Self::default();
        for (key, target) in aliases {
            let target = if target.starts_with("./") || target.starts_with("../") {
                paths::to_slash(&paths::clean(&root.join(target)))
            } else {
                target.clone()
            };
            match key.strip_suffix('$') {
                Some(exact) => table.exact.push(AliasRule {
                    key: exact.to_string(),
                    target,
                }),
                None => table.prefix.push(AliasRule {
                    key: key.clone(),
                    target,
                }),
            }
        }
        // Longest prefix wins
        table.prefix.sort_by(|a, b| b.key.len().cmp(&a.key.len()).then(a.key.cmp(&b.key)));
        table
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefix.is_empty()
    }

    /// Rewrite `spec` if a rule matches.
    ///
    /// Absolute targets come back relative to `importer_dir` so the result is
    /// still a valid import literal.
    #[must_use]
    pub fn apply(&self, spec: &str, importer_dir: &Path) -> Option<String> {
        if let Some(rule) = self.exact.iter().find(|r| r.key == spec) {
            return Some(localize(&rule.target, importer_dir));
        }

        let rule = self.prefix.iter().find(|r| {
            spec == r.key
                || (spec.starts_with(&r.key)
                    && (r.key.ends_with('/') || spec.as_bytes().get(r.key.len()) == Some(&b'/')))
        })?;
        let rewritten = format!("{}{}", rule.target, &spec[rule.key.len()..]);
        Some(localize(&rewritten, importer_dir))
    }
}

fn localize(target: &str, importer_dir: &Path) -> String {
    if Path::new(target).is_absolute() {
        paths::ensure_dot_prefix(&paths::to_slash(&paths::relative(
            importer_dir,
            &PathBuf::from(target),
        )))
    } else {
        target.to_string()
    }
}
