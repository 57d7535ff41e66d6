//! Import path resolution.
//!
//! Turns an import literal into an absolute file, in this order:
//! 1. alias rewriting (full-match `$` keys first, then longest prefix)
//! 2. `#` subpath imports, only from inside a package
//! 3. relative and absolute paths, with extension and `index` guessing
//! 4. package specifiers, through `node_modules` and `package.json`
//!
//! Built-in modules (`node:*`, URLs, and bare Node built-ins when targeting
//! Node) resolve to [`Resolution::Builtin`] and are left alone.

mod alias;
mod exports;
mod package;

pub use alias::AliasTable;
pub use exports::{resolve_exports, resolve_imports_map};
pub use package::{
    find_package_root, split_specifier, PackageCache, PackageInfo, PACKAGE_OUT_DIR,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{BuildConfig, Target};
use crate::error::{Error, Result};
use crate::imports::ImportNode;
use crate::paths;

/// Node built-in module names.
const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "fs/promises",
    "http", "http2", "https", "inspector", "module", "net", "os", "path", "path/posix",
    "path/win32", "perf_hooks", "process", "punycode", "querystring", "readline", "repl",
    "stream", "stream/promises", "stream/web", "string_decoder", "timers", "timers/promises",
    "tls", "trace_events", "tty", "url", "util", "util/types", "v8", "vm", "wasi",
    "worker_threads", "zlib",
];

/// Why an import could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveReasonCode {
    /// No file matched after extension and `index` guessing.
    NotFound,
    /// `#` specifier missing from the package's `imports` map, or used outside a package.
    ImportsNotFound,
}

impl std::fmt::Display for ResolveReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "NOT_FOUND",
            Self::ImportsNotFound => "IMPORTS_NOT_FOUND",
        };
        write!(f, "{s}")
    }
}

/// A literal import path that maps to no file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
    pub specifier: String,
    pub importer: PathBuf,
    pub reason: ResolveReasonCode,
    /// Path probed last, if any.
    pub tried: Option<PathBuf>,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.reason, &self.tried) {
            (ResolveReasonCode::NotFound, Some(tried)) => write!(
                f,
                "File {} not found (imported as '{}' from {})",
                tried.display(),
                self.specifier,
                self.importer.display()
            ),
            _ => write!(
                f,
                "Cannot resolve '{}' from {} [{}]",
                self.specifier,
                self.importer.display(),
                self.reason
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Outcome of resolving one import.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Host built-in; no module is created.
    Builtin,
    /// A file, and the package it belongs to if any.
    Module {
        path: PathBuf,
        package: Option<Arc<PackageInfo>>,
    },
}

/// Resolver configured for one build.
#[derive(Debug, Clone)]
pub struct Resolver {
    extensions: Vec<String>,
    aliases: AliasTable,
    target: Target,
}

impl Resolver {
    #[must_use]
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            extensions: config.resolve.extensions.clone(),
            aliases: AliasTable::new(&config.resolve.alias, &config.root),
            target: config.target,
        }
    }

    /// Resolve `node` as imported from the file `importer`.
    ///
    /// Alias and `#` rewrites are written back into the node's literal.
    pub fn resolve(
        &self,
        node: &mut ImportNode,
        importer: &Path,
        importer_pkg: Option<&Arc<PackageInfo>>,
        cache: &mut PackageCache,
    ) -> Result<Resolution> {
        let importer_dir = importer.parent().unwrap_or(Path::new("/"));

        if let Some(aliased) = self.aliases.apply(&node.path, importer_dir) {
            node.set_path(&aliased);
        }
        let mut spec = node.path.clone();

        if self.is_builtin(&spec) {
            return Ok(Resolution::Builtin);
        }

        if spec.starts_with('#') {
            let missing = || resolve_error(&spec, importer, ResolveReasonCode::ImportsNotFound, None);
            let pkg = importer_pkg.ok_or_else(missing)?;
            let target = resolve_imports_map(&pkg.manifest, &spec, self.target.conditions())
                .ok_or_else(missing)?;
            if !target.starts_with("./") {
                // Mapped onto another package
                spec = target;
            } else {
                let abs = paths::clean(&pkg.root.join(&target));
                let path = self.guess_file(&abs).ok_or_else(|| {
                    resolve_error(&spec, importer, ResolveReasonCode::NotFound, Some(abs.clone()))
                })?;
                node.set_path(&paths::ensure_dot_prefix(&paths::to_slash(&paths::relative(
                    importer_dir,
                    &path,
                ))));
                return Ok(Resolution::Module {
                    path,
                    package: Some(Arc::clone(pkg)),
                });
            }
        }

        if is_path_like(&spec) {
            let abs = if Path::new(&spec).is_absolute() {
                paths::clean(Path::new(&spec))
            } else {
                paths::clean(&importer_dir.join(&spec))
            };
            let path = self.guess_file(&abs).ok_or_else(|| {
                resolve_error(&spec, importer, ResolveReasonCode::NotFound, Some(abs.clone()))
            })?;
            return Ok(Resolution::Module {
                path,
                package: importer_pkg.cloned(),
            });
        }

        self.resolve_package(&spec, importer, importer_pkg, cache)
    }

    fn resolve_package(
        &self,
        spec: &str,
        importer: &Path,
        importer_pkg: Option<&Arc<PackageInfo>>,
        cache: &mut PackageCache,
    ) -> Result<Resolution> {
        let key = PackageCache::key(importer_pkg.map(|p| &**p), spec);
        if let Some((path, package)) = cache.get(&key) {
            return Ok(Resolution::Module {
                path,
                package: Some(package),
            });
        }

        let lookup_error = |message: String| Error::PackageLookup {
            specifier: spec.to_string(),
            importer: importer.to_path_buf(),
            message,
        };

        let (name, subpath) = split_specifier(spec);
        let importer_dir = importer.parent().unwrap_or(Path::new("/"));
        let root = find_package_root(importer_dir, name)
            .ok_or_else(|| lookup_error(format!("no package.json found for '{name}'")))?;
        let info = cache.manifest(&root)?;

        let conditions = self.target.conditions();
        let entry = match subpath {
            None => resolve_exports(&info.manifest, None, conditions)
                .or_else(|| info.main_field(self.target == Target::Web).map(ToString::to_string))
                .unwrap_or_else(|| "index.js".to_string()),
            Some(sub) => resolve_exports(&info.manifest, Some(&format!("./{sub}")), conditions)
                .unwrap_or_else(|| sub.to_string()),
        };

        let candidate = paths::clean(&root.join(&entry));
        let path = self
            .guess_file(&candidate)
            .ok_or_else(|| lookup_error(format!("entry {} not found", candidate.display())))?;

        cache.insert(key, path.clone(), Arc::clone(&info));
        Ok(Resolution::Module {
            path,
            package: Some(info),
        })
    }

    /// Find the file `path` refers to: itself, with an extension appended,
    /// or its directory's `index` file.
    #[must_use]
    pub fn guess_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        let with_ext = |base: &Path| {
            self.extensions.iter().find_map(|ext| {
                let mut candidate = base.as_os_str().to_os_string();
                candidate.push(ext);
                let candidate = PathBuf::from(candidate);
                candidate.is_file().then_some(candidate)
            })
        };

        if let Some(found) = with_ext(path) {
            return Some(found);
        }
        if path.is_dir() {
            return with_ext(&path.join("index"));
        }
        None
    }

    /// Whether `spec` names a host built-in.
    #[must_use]
    pub fn is_builtin(&self, spec: &str) -> bool {
        if spec.starts_with("node:") || spec.starts_with("data:") || spec.contains("://") {
            return true;
        }
        self.target == Target::Node && NODE_BUILTINS.contains(&spec)
    }
}

fn resolve_error(
    spec: &str,
    importer: &Path,
    reason: ResolveReasonCode,
    tried: Option<PathBuf>,
) -> Error {
    Error::Resolve(ResolveError {
        specifier: spec.to_string(),
        importer: importer.to_path_buf(),
        reason,
        tried,
    })
}

fn is_path_like(spec: &str) -> bool {
    spec == "."
        || spec == ".."
        || spec.starts_with("./")
        || spec.starts_with("../")
        || Path::new(spec).is_absolute()
}
