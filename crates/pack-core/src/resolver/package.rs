//! Installed package metadata and the graph-level package cache.

use rustc_hash::FxHashMap as HashMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::paths;

/// Reserved output directory for package files and package chunks.
pub const PACKAGE_OUT_DIR: &str = ".pack";

/// An installed package a module was resolved into.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    /// Directory holding `package.json`.
    pub root: PathBuf,
    /// Parsed `package.json`.
    pub manifest: Value,
    /// Output root for this package's files: `.pack/<name>@<version>`.
    pub out_root: String,
}

impl PackageInfo {
    /// Read `package.json` from `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let manifest_path = root.join("package.json");
        let source = std::fs::read_to_string(&manifest_path)
            .map_err(|e| Error::io(&manifest_path, e))?;
        let manifest: Value =
            serde_json::from_str(&source).map_err(|e| Error::PackageLookup {
                specifier: root.display().to_string(),
                importer: manifest_path.clone(),
                message: format!("invalid package.json: {e}"),
            })?;

        let name = manifest
            .get("name")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .or_else(|| root.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();
        let version = manifest
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("0.0.0")
            .to_string();
        let out_root = format!("{PACKAGE_OUT_DIR}/{name}@{version}");

        Ok(Self {
            name,
            version,
            root: root.to_path_buf(),
            manifest,
            out_root,
        })
    }

    /// `name@version`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Output path for a file inside this package.
    #[must_use]
    pub fn outpath_for(&self, file: &Path) -> String {
        let rel = paths::to_slash(&paths::relative(&self.root, file));
        format!("{}/{rel}", self.out_root)
    }

    /// Entry field declared for the package root, in lookup order.
    #[must_use]
    pub fn main_field(&self, browser: bool) -> Option<&str> {
        let fields: &[&str] = if browser {
            &["browser", "module", "main"]
        } else {
            &["module", "main"]
        };
        fields
            .iter()
            .find_map(|f| self.manifest.get(*f).and_then(Value::as_str))
    }
}

/// Split `@scope/name/sub/path` into `("@scope/name", Some("sub/path"))`.
#[must_use]
pub fn split_specifier(spec: &str) -> (&str, Option<&str>) {
    let name_segments = if spec.starts_with('@') { 2 } else { 1 };
    let mut idx = 0;
    for _ in 0..name_segments {
        match spec[idx..].find('/') {
            Some(slash) => idx += slash + 1,
            None => return (spec, None),
        }
    }
    let name = &spec[..idx - 1];
    let sub = &spec[idx..];
    (name, (!sub.is_empty()).then_some(sub))
}

/// Find `node_modules/<name>` walking up from `from`.
#[must_use]
pub fn find_package_root(from: &Path, name: &str) -> Option<PathBuf> {
    from.ancestors()
        .map(|dir| dir.join("node_modules").join(name))
        .find(|candidate| candidate.join("package.json").is_file())
}

/// Package resolutions keyed by package identity plus specifier, and parsed
/// manifests keyed by package root.
#[derive(Debug, Default)]
pub struct PackageCache {
    resolved: HashMap<String, (PathBuf, Arc<PackageInfo>)>,
    manifests: HashMap<PathBuf, Arc<PackageInfo>>,
    hits: usize,
    probes: usize,
}

impl PackageCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for `spec` imported from inside `importer` (or from a local module).
    #[must_use]
    pub fn key(importer: Option<&PackageInfo>, spec: &str) -> String {
        match importer {
            Some(pkg) => format!("{}/{spec}", pkg.key()),
            None => spec.to_string(),
        }
    }

    /// Look up a previous resolution, counting the hit.
    pub fn get(&mut self, key: &str) -> Option<(PathBuf, Arc<PackageInfo>)> {
        let found = self.resolved.get(key).cloned();
        if found.is_some() {
            self.hits += 1;
        }
        found
    }

    pub fn insert(&mut self, key: String, path: PathBuf, info: Arc<PackageInfo>) {
        self.resolved.insert(key, (path, info));
    }

    /// Parsed manifest for a package root, read once.
    pub fn manifest(&mut self, root: &Path) -> Result<Arc<PackageInfo>> {
        if let Some(info) = self.manifests.get(root) {
            return Ok(Arc::clone(info));
        }
        self.probes += 1;
        let info = Arc::new(PackageInfo::load(root)?);
        self.manifests.insert(root.to_path_buf(), Arc::clone(&info));
        Ok(info)
    }

    /// Number of lookups answered from the cache.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Number of manifests read from disk.
    #[must_use]
    pub fn probes(&self) -> usize {
        self.probes
    }
}
