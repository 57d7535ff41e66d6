//! A resolved file and its transformed state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::imports::{render, Fragment, ImportNode};
use crate::paths;
use crate::resolver::PackageInfo;

/// Index of a module in the graph arena. Doubles as the synthetic id
/// package registries key their members by.
pub type ModuleId = usize;

/// Extensions scanned for imports.
const SCRIPT_EXTENSIONS: &[&str] = &[".js", ".jsx", ".ts", ".tsx", ".vue", ".mjs", ".cjs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Script,
    Style,
    Json,
    Asset,
    /// Generated in memory, never read from disk.
    Synthetic,
}

impl ModuleKind {
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_default();
        if SCRIPT_EXTENSIONS.contains(&ext.as_str()) {
            Self::Script
        } else if matches!(ext.as_str(), ".css" | ".scss" | ".sass" | ".less") {
            Self::Style
        } else if ext == ".json" {
            Self::Json
        } else {
            Self::Asset
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Style => "style",
            Self::Json => "json",
            Self::Asset => "asset",
            Self::Synthetic => "synthetic",
        }
    }
}

/// What a module currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ModuleContent {
    #[default]
    Empty,
    /// Raw text, for modules that are not scanned (or not yet).
    Text(String),
    /// Scanned fragments.
    Fragments(Vec<Fragment>),
    /// Copied byte for byte from its id at write time.
    File,
}

/// One resolved file.
#[derive(Debug, Clone)]
pub struct Module {
    /// Arena index.
    pub uid: ModuleId,
    /// Absolute path; unique within the graph.
    pub id: PathBuf,
    pub kind: ModuleKind,
    pub content: ModuleContent,
    /// Output path relative to the output directory, `/`-separated.
    pub outpath: String,
    /// Output path before loaders changed its extension.
    base_outpath: String,
    /// Name the module's chunk was written under, once hashed.
    chunk_outpath: Option<String>,
    /// Path loaders are matched against; follows extension changes.
    current_path: String,
    extension_changed: bool,
    /// BLAKE3 hex digest of the source file.
    pub hash: String,
    pub package: Option<Arc<PackageInfo>>,
    pub skip_write: bool,
    /// Set while the module is being (re)built; parents' fragments may only
    /// be walked through modules with this flag set.
    pub changing: bool,
    /// Scanned as CommonJS.
    pub is_cjs: bool,
    pub injected_hmr: bool,
    /// Entry module of the build.
    pub is_root: bool,
    pub parents: Vec<ModuleId>,
    pub dependencies: Vec<ModuleId>,
}

impl Module {
    #[must_use]
    pub fn new(uid: ModuleId, id: PathBuf) -> Self {
        let current_path = paths::to_slash(&id);
        Self {
            uid,
            kind: ModuleKind::from_path(&id),
            id,
            content: ModuleContent::Empty,
            outpath: String::new(),
            base_outpath: String::new(),
            chunk_outpath: None,
            current_path,
            extension_changed: false,
            hash: String::new(),
            package: None,
            skip_write: false,
            changing: true,
            is_cjs: false,
            injected_hmr: false,
            is_root: false,
            parents: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// A module that lives only in memory.
    #[must_use]
    pub fn synthetic(uid: ModuleId, id: PathBuf, outpath: String, code: String) -> Self {
        let mut module = Self::new(uid, id);
        module.kind = ModuleKind::Synthetic;
        module.hash = pack_util::hash::blake3_bytes(code.as_bytes());
        module.content = ModuleContent::Fragments(vec![Fragment::Code(code)]);
        module.set_outpath(outpath);
        module
    }

    #[must_use]
    pub fn is_package(&self) -> bool {
        self.package.is_some()
    }

    /// Package-origin code: bundled into a package chunk's registry.
    #[must_use]
    pub fn is_package_script(&self) -> bool {
        self.is_package() && matches!(self.kind, ModuleKind::Script | ModuleKind::Json)
    }

    /// Path loaders test against.
    #[must_use]
    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    /// Set the initial output path.
    pub fn set_outpath(&mut self, outpath: String) {
        self.base_outpath.clone_from(&outpath);
        self.outpath = outpath;
        self.chunk_outpath = None;
    }

    /// Path other files reach this module under: the chunk name once the
    /// chunk has been finalized, the plain output path before that.
    #[must_use]
    pub fn final_outpath(&self) -> &str {
        self.chunk_outpath.as_deref().unwrap_or(&self.outpath)
    }

    pub fn set_chunk_outpath(&mut self, outpath: String) {
        self.chunk_outpath = Some(outpath);
    }

    /// Switch the module to a new extension (including the dot).
    ///
    /// The output path is always derived from the pre-loader output path, so
    /// applying the same extension twice is a no-op, and re-applying it after
    /// [`Module::reset_current_path`] keeps the finalized chunk name. An asset
    /// takes the kind of its new extension. Returns whether the loader path
    /// changed. Parent literals are updated by the graph.
    pub fn change_extension(&mut self, ext: &str) -> bool {
        let next = paths::replace_extension(&paths::to_slash(&self.id), ext);
        if next == self.current_path {
            return false;
        }
        self.current_path = next;
        self.extension_changed = true;
        let outpath = paths::replace_extension(&self.base_outpath, ext);
        if outpath != self.outpath {
            self.outpath = outpath;
            self.chunk_outpath = None;
        }
        if self.kind == ModuleKind::Asset {
            // An asset turned into code is imported like code
            self.kind = ModuleKind::from_path(Path::new(&self.outpath));
        }
        true
    }

    /// Consume the extension-changed mark.
    pub fn take_extension_changed(&mut self) -> bool {
        std::mem::take(&mut self.extension_changed)
    }

    /// Point loader matching back at the id after a pipeline run.
    pub fn reset_current_path(&mut self) {
        self.current_path = paths::to_slash(&self.id);
    }

    pub fn skip_write(&mut self) {
        self.skip_write = true;
    }

    /// Clear derived state ahead of a rebuild. Edges are cleared by the graph.
    pub fn reset(&mut self) {
        self.kind = ModuleKind::from_path(&self.id);
        self.content = ModuleContent::Empty;
        self.outpath.clear();
        self.base_outpath.clear();
        self.chunk_outpath = None;
        self.reset_current_path();
        self.extension_changed = false;
        self.hash.clear();
        self.skip_write = false;
        self.changing = true;
        self.is_cjs = false;
        self.injected_hmr = false;
    }

    #[must_use]
    pub fn fragments(&self) -> Option<&[Fragment]> {
        match &self.content {
            ModuleContent::Fragments(fragments) => Some(fragments),
            _ => None,
        }
    }

    pub fn fragments_mut(&mut self) -> Option<&mut Vec<Fragment>> {
        match &mut self.content {
            ModuleContent::Fragments(fragments) => Some(fragments),
            _ => None,
        }
    }

    /// Import fragments that resolved to `target`.
    pub fn imports_of<'a>(&'a self, target: &'a Path) -> impl Iterator<Item = &'a ImportNode> {
        self.fragments()
            .unwrap_or_default()
            .iter()
            .filter_map(Fragment::as_import)
            .filter(move |node| node.resolved.as_deref() == Some(target))
    }

    /// Rendered text content; `None` for modules copied from disk.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        match &self.content {
            ModuleContent::Empty => Some(String::new()),
            ModuleContent::Text(text) => Some(text.clone()),
            ModuleContent::Fragments(fragments) => Some(render(fragments)),
            ModuleContent::File => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(ModuleKind::from_path(Path::new("/a/b.tsx")), ModuleKind::Script);
        assert_eq!(ModuleKind::from_path(Path::new("/a/b.CSS")), ModuleKind::Style);
        assert_eq!(ModuleKind::from_path(Path::new("/a/b.json")), ModuleKind::Json);
        assert_eq!(ModuleKind::from_path(Path::new("/a/logo.png")), ModuleKind::Asset);
    }

    #[test]
    fn test_change_extension_is_idempotent() {
        let mut module = Module::new(0, PathBuf::from("/p/src/data.json"));
        module.set_outpath("src/data.json".into());

        assert!(module.change_extension(".json.js"));
        assert_eq!(module.outpath, "src/data.json.js");
        assert_eq!(module.current_path(), "/p/src/data.json.js");
        assert!(module.take_extension_changed());

        assert!(!module.change_extension(".json.js"));
        assert!(!module.take_extension_changed());
        assert_eq!(module.outpath, "src/data.json.js");

        module.set_chunk_outpath("src/data.json_0badf00d.js".into());
        assert_eq!(module.final_outpath(), "src/data.json_0badf00d.js");

        module.reset_current_path();
        assert_eq!(module.current_path(), "/p/src/data.json");

        // Re-running the loader on an unchanged module keeps its chunk name
        assert!(module.change_extension(".json.js"));
        assert_eq!(module.final_outpath(), "src/data.json_0badf00d.js");
    }

    #[test]
    fn test_reset_clears_derived_state() {
        let mut module = Module::new(3, PathBuf::from("/p/a.js"));
        module.set_outpath("a.js".into());
        module.hash = "abc".into();
        module.skip_write();
        module.changing = false;
        module.parents.push(1);

        module.reset();
        assert!(module.outpath.is_empty());
        assert!(module.hash.is_empty());
        assert!(!module.skip_write);
        assert!(module.changing);
        assert_eq!(module.parents, vec![1]);
    }

    #[test]
    fn test_package_script() {
        let mut module = Module::new(0, PathBuf::from("/p/node_modules/x/index.js"));
        assert!(!module.is_package_script());
        module.package = Some(Arc::new(PackageInfo {
            name: "x".into(),
            version: "1.0.0".into(),
            root: PathBuf::from("/p/node_modules/x"),
            manifest: serde_json::json!({}),
            out_root: ".pack/x@1.0.0".into(),
        }));
        assert!(module.is_package_script());
    }

    #[test]
    fn test_asset_turned_into_script_changes_kind() {
        let mut module = Module::new(0, PathBuf::from("/p/src/doc.md"));
        module.set_outpath("src/doc.md".into());
        assert_eq!(module.kind, ModuleKind::Asset);

        module.change_extension(".html");
        assert_eq!(module.kind, ModuleKind::Asset);
        module.change_extension(".html.js");
        assert_eq!(module.kind, ModuleKind::Script);
    }

    #[test]
    fn test_code_keeps_kind_across_extension_change() {
        let mut module = Module::new(0, PathBuf::from("/p/src/style.css"));
        module.set_outpath("src/style.css".into());
        module.change_extension(".css.js");
        assert_eq!(module.kind, ModuleKind::Style);
    }
}
