//! Command implementations.

pub mod build;
pub mod dev;

use crate::BuildArgs;
use pack_core::BuildConfig;
use std::path::{Path, PathBuf};

/// Config inputs gathered from the command line.
#[derive(Debug, Clone)]
pub struct BuildAction {
    pub cwd: PathBuf,
    pub entry: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub no_hash: bool,
}

impl BuildAction {
    pub(crate) fn new(cwd: &Path, args: BuildArgs) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            entry: args.entry,
            out_dir: args.out_dir,
            config: args.config,
            no_hash: args.no_hash,
        }
    }

    /// Load the config file (explicit or discovered) and apply flag overrides.
    ///
    /// Paths given on the command line are relative to the working directory,
    /// not to the config file.
    pub fn load_config(&self) -> miette::Result<BuildConfig> {
        let mut config = match &self.config {
            Some(path) => BuildConfig::load(&self.cwd.join(path)),
            None => BuildConfig::discover(&self.cwd),
        }
        .map_err(report)?;

        if let Some(entry) = &self.entry {
            config.entry = self.cwd.join(entry);
        }
        if let Some(out_dir) = &self.out_dir {
            config.output = self.cwd.join(out_dir);
        }
        if self.no_hash {
            config.hash = Some(false);
        }
        Ok(config)
    }
}

/// Turn a bundler error into a diagnostic carrying its stable code.
pub fn report(e: pack_core::Error) -> miette::Report {
    miette::miette!(code = e.code(), "{e}")
}
