#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod bundler;
pub mod config;
pub mod dev;
pub mod error;
pub mod imports;
pub mod paths;
pub mod resolver;

pub use bundler::{
    Build, BuildReport, Loader, LoaderContext, LoaderError, ModuleGraph, ModuleId, Plugin,
    RebuildOutcome, RebuildReport,
};
pub use config::BuildConfig;
pub use dev::{HmrMessage, HotUpdate, HotUpdateSink};
pub use error::{Error, Result};
pub use imports::{scan_module, Fragment, ImportNode};
pub use resolver::{Resolution, ResolveError, Resolver};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
