use std::path::PathBuf;
use thiserror::Error;

use crate::bundler::plugin::PluginError;
use crate::resolver::ResolveError;

/// Result alias used throughout the bundler.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Core error type for pack operations.
///
/// Every failure aborts the build or rebuild pass that produced it. Nothing
/// is rolled back: modules touched before the failure keep whatever state
/// they reached.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Package lookup failed for '{specifier}' from {importer}: {message}")]
    PackageLookup {
        specifier: String,
        importer: PathBuf,
        message: String,
    },

    #[error("Loader '{loader}' failed on {module}: {message}")]
    Loader {
        loader: String,
        module: PathBuf,
        message: String,
    },

    #[error("Invalid pattern in loader '{loader}': {source}")]
    LoaderPattern {
        loader: String,
        #[source]
        source: regex_lite::Error,
    },

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported construct in {module}: {message}")]
    Unsupported { module: PathBuf, message: String },
}

impl Error {
    /// Attach a path to an IO error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn unsupported(module: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Unsupported {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable code, used by the CLI's JSON output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Resolve(_) => "E_RESOLVE",
            Self::PackageLookup { .. } => "E_PACKAGE",
            Self::Loader { .. } | Self::LoaderPattern { .. } => "E_LOADER",
            Self::Plugin(_) => "E_PLUGIN",
            Self::Io { .. } => "E_IO",
            Self::ConfigRead { .. } | Self::ConfigParse { .. } => "E_CONFIG",
            Self::Unsupported { .. } => "E_UNSUPPORTED",
        }
    }
}
