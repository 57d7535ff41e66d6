//! Build configuration.
//!
//! Loaded from `pack.config.json` (camelCase keys, every field optional) and
//! then overridden by CLI flags. Loaders and plugins are not part of the file;
//! they are registered on [`crate::Build`] in code.
//!
//! ```json
//! {
//!   "entry": "./src/main.js",
//!   "output": "./dist",
//!   "target": "web",
//!   "resolve": { "alias": { "@": "./src", "vue$": "vue/dist/vue.esm.js" } },
//!   "define": { "API_URL": "https://example.com" },
//!   "html": { "title": "My app" },
//!   "copy": [{ "from": "./public" }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Config file looked up in the project root when none is given.
pub const CONFIG_FILE: &str = "pack.config.json";

/// Extensions tried, in order, when an import omits one.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".js", ".jsx", ".ts", ".tsx", ".vue", ".json", ".mjs", ".cjs",
];

/// Environment the output is meant to run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    Web,
    Node,
}

impl Target {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Node => "node",
        }
    }

    /// `exports`/`imports` conditions honored for this target, in priority order.
    #[must_use]
    pub fn conditions(&self) -> &'static [&'static str] {
        match self {
            Self::Web => &["browser", "import", "module", "default"],
            Self::Node => &["node", "import", "module", "default"],
        }
    }
}

/// Resolution options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolveConfig {
    /// Extension candidates for extension-less imports.
    pub extensions: Vec<String>,
    /// Alias rules. A key ending in `$` only matches the whole specifier.
    pub alias: BTreeMap<String, String>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            alias: BTreeMap::new(),
        }
    }
}

/// Options for the HTML entry plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HtmlConfig {
    /// Template file; `<!-- pack:scripts -->` or `</body>` marks where the script tag goes.
    pub template: Option<PathBuf>,
    /// Output file name, relative to the output directory.
    pub filename: String,
    /// Document title used by the built-in template.
    pub title: String,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            template: None,
            filename: "index.html".to_string(),
            title: "pack".to_string(),
        }
    }
}

/// One static copy rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRule {
    /// File or directory to copy, relative to the root.
    pub from: PathBuf,
    /// Destination relative to the output directory. Defaults to the top.
    #[serde(default)]
    pub to: Option<PathBuf>,
}

/// Full build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildConfig {
    /// Project root. Relative paths below are resolved against it.
    pub root: PathBuf,
    /// Entry module.
    pub entry: PathBuf,
    /// Output directory.
    pub output: PathBuf,
    pub resolve: ResolveConfig,
    pub target: Target,
    /// Development mode: hot-update client injection and no hashed names.
    pub watch: bool,
    /// Content-hash output names. Defaults to `!watch`.
    pub hash: Option<bool>,
    /// Values exposed on `process.env` by the global runtime module.
    pub define: BTreeMap<String, Value>,
    /// Quiet period for coalescing file changes, in milliseconds.
    pub debounce_ms: u64,
    pub html: Option<HtmlConfig>,
    pub copy: Vec<CopyRule>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            entry: PathBuf::from("./src/main.js"),
            output: PathBuf::from("./dist"),
            resolve: ResolveConfig::default(),
            target: Target::default(),
            watch: false,
            hash: None,
            define: BTreeMap::new(),
            debounce_ms: 100,
            html: None,
            copy: Vec::new(),
        }
    }
}

impl BuildConfig {
    /// Create a config rooted at `root` with every other field defaulted.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Read a config file. The root defaults to the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_err = |source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        };
        let value: Value = serde_json::from_str(&source).map_err(parse_err)?;
        let has_root = value.get("root").is_some();
        let mut config: Self = serde_json::from_value(value).map_err(parse_err)?;

        if !has_root {
            if let Some(dir) = path.parent() {
                config.root = dir.to_path_buf();
            }
        }
        Ok(config)
    }

    /// Load `pack.config.json` from `root` if present, defaults otherwise.
    pub fn discover(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::new(root))
        }
    }

    /// Make the root absolute and every other path absolute against it.
    pub fn normalize(mut self) -> Result<Self> {
        let root = if self.root.is_absolute() {
            self.root.clone()
        } else {
            std::env::current_dir()
                .map_err(|e| Error::io(&self.root, e))?
                .join(&self.root)
        };
        self.root = dunce::canonicalize(&root).map_err(|e| Error::io(&root, e))?;
        self.entry = crate::paths::clean(&self.root.join(&self.entry));
        self.output = crate::paths::clean(&self.root.join(&self.output));
        if let Some(html) = &mut self.html {
            if let Some(template) = &html.template {
                html.template = Some(crate::paths::clean(&self.root.join(template)));
            }
        }
        for rule in &mut self.copy {
            rule.from = crate::paths::clean(&self.root.join(&rule.from));
        }
        Ok(self)
    }

    /// Whether output names carry a content hash.
    #[must_use]
    pub fn append_hash(&self) -> bool {
        self.hash.unwrap_or(!self.watch)
    }

    /// `NODE_ENV` value baked into the global runtime module.
    #[must_use]
    pub fn node_env(&self) -> &'static str {
        if self.watch {
            "development"
        } else {
            "production"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = BuildConfig::new("/project");
        assert_eq!(config.entry, PathBuf::from("./src/main.js"));
        assert_eq!(config.target, Target::Web);
        assert!(config.append_hash());
        assert_eq!(config.node_env(), "production");
        assert_eq!(config.resolve.extensions[0], ".js");
    }

    #[test]
    fn test_watch_disables_hash_by_default() {
        let config = BuildConfig {
            watch: true,
            ..BuildConfig::new("/project")
        };
        assert!(!config.append_hash());

        let forced = BuildConfig {
            hash: Some(true),
            ..config
        };
        assert!(forced.append_hash());
    }

    #[test]
    fn test_load_camel_case_and_root_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{ "entry": "./app.js", "debounceMs": 20, "target": "node",
                 "resolve": { "alias": { "@": "./src" } } }"#,
        )
        .unwrap();

        let config = BuildConfig::load(&path).unwrap();
        assert_eq!(config.root, dir.path());
        assert_eq!(config.entry, PathBuf::from("./app.js"));
        assert_eq!(config.debounce_ms, 20);
        assert_eq!(config.target, Target::Node);
        assert_eq!(config.resolve.alias["@"], "./src");
        assert_eq!(config.resolve.extensions.len(), DEFAULT_EXTENSIONS.len());
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            BuildConfig::load(&path),
            Err(Error::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_discover_without_file() {
        let dir = tempdir().unwrap();
        let config = BuildConfig::discover(dir.path()).unwrap();
        assert_eq!(config.root, dir.path());
    }

    #[test]
    fn test_normalize_makes_paths_absolute() {
        let dir = tempdir().unwrap();
        let config = BuildConfig::new(dir.path()).normalize().unwrap();
        assert!(config.entry.is_absolute());
        assert!(config.entry.ends_with("src/main.js"));
        assert!(config.output.ends_with("dist"));
    }

    #[test]
    #[serial]
    fn test_normalize_resolves_relative_root_against_cwd() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("app")).unwrap();
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let result = BuildConfig::new("app").normalize();
        std::env::set_current_dir(previous).unwrap();

        let config = result.unwrap();
        let expected = dunce::canonicalize(dir.path()).unwrap().join("app");
        assert_eq!(config.root, expected);
        assert_eq!(config.entry, expected.join("src/main.js"));
        assert!(config.output.starts_with(&expected));
    }

    #[test]
    #[serial]
    fn test_normalize_reports_missing_relative_root() {
        let dir = tempdir().unwrap();
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let result = BuildConfig::new("nowhere").normalize();
        std::env::set_current_dir(previous).unwrap();

        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
