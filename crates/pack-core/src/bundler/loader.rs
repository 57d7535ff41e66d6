//! Loaders: pattern-matched transforms run over every module.
//!
//! A loader matches a module by its current path. Its transforms run last
//! declared first. A transform that changes the module's extension schedules
//! another pass over that module, since the new extension may match other
//! loaders; passes repeat until no extension changes.

use regex_lite::Regex;
use serde_json::Value;
use std::sync::Arc;

use super::graph::ModuleGraph;
use super::module::{Module, ModuleId};
use super::plugin::SharedState;
use crate::config::BuildConfig;
use crate::error::{Error, Result};

/// Fewest passes the pipeline allows before giving up on a module.
///
/// The real limit is [`pass_limit`], which grows with the loader count so
/// that every loader in a chain can fire once.
pub const MAX_EXTENSION_PASSES: usize = 8;

/// Passes allowed over one module for the given loader list.
#[must_use]
pub fn pass_limit(loaders: &[Loader]) -> usize {
    MAX_EXTENSION_PASSES.max(loaders.len() + 1)
}

/// Failure inside a transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderError {
    pub message: String,
}

impl LoaderError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LoaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for LoaderError {}

impl From<std::io::Error> for LoaderError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<Error> for LoaderError {
    fn from(e: Error) -> Self {
        Self::new(e.to_string())
    }
}

/// What a transform gets to work with.
pub struct LoaderContext<'a> {
    pub graph: &'a mut ModuleGraph,
    /// The module being transformed.
    pub id: ModuleId,
    pub shared: &'a mut SharedState,
    pub config: &'a BuildConfig,
}

impl LoaderContext<'_> {
    #[must_use]
    pub fn module(&self) -> &Module {
        &self.graph[self.id]
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.graph[self.id]
    }

    /// Switch the module's extension and retarget every parent literal.
    pub fn change_extension(&mut self, ext: &str) {
        if self.graph[self.id].change_extension(ext) {
            self.graph.sync_parent_literals(self.id);
        }
    }

    /// Keep the module in the graph but never emit it.
    pub fn skip_write(&mut self) {
        self.graph[self.id].skip_write();
    }

    /// Read the module's file from disk.
    pub fn read_source(&self) -> Result<String, LoaderError> {
        Ok(pack_util::fs::read_to_string_lossy(&self.module().id)?)
    }
}

/// Transform function: mutates the module through the context.
pub type TransformFn =
    Arc<dyn Fn(&mut LoaderContext<'_>, &Value) -> Result<(), LoaderError> + Send + Sync>;

/// A loader rule.
#[derive(Clone)]
pub struct Loader {
    name: String,
    test: Regex,
    exclude: Option<Regex>,
    include: Option<Regex>,
    uses: Vec<(TransformFn, Value)>,
}

impl Loader {
    /// New loader matching paths against `test`.
    pub fn new(name: &str, test: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            test: compile(name, test)?,
            exclude: None,
            include: None,
            uses: Vec::new(),
        })
    }

    /// Skip paths matching `pattern`.
    pub fn exclude(mut self, pattern: &str) -> Result<Self> {
        self.exclude = Some(compile(&self.name, pattern)?);
        Ok(self)
    }

    /// Re-admit excluded paths matching `pattern`.
    pub fn include(mut self, pattern: &str) -> Result<Self> {
        self.include = Some(compile(&self.name, pattern)?);
        Ok(self)
    }

    /// Append a transform without options.
    pub fn transform<F>(self, f: F) -> Self
    where
        F: Fn(&mut LoaderContext<'_>, &Value) -> Result<(), LoaderError> + Send + Sync + 'static,
    {
        self.transform_with(f, Value::Null)
    }

    /// Append a transform with options.
    pub fn transform_with<F>(mut self, f: F, options: Value) -> Self
    where
        F: Fn(&mut LoaderContext<'_>, &Value) -> Result<(), LoaderError> + Send + Sync + 'static,
    {
        self.uses.push((Arc::new(f), options));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this loader applies to `path`.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        if self.uses.is_empty() || !self.test.is_match(path) {
            return false;
        }
        let excluded = self.exclude.as_ref().is_some_and(|re| re.is_match(path));
        let included = self.include.as_ref().is_some_and(|re| re.is_match(path));
        !excluded || included
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("name", &self.name)
            .field("test", &self.test.as_str())
            .field("uses", &self.uses.len())
            .finish_non_exhaustive()
    }
}

fn compile(loader: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::LoaderPattern {
        loader: loader.to_string(),
        source,
    })
}

/// Run `loaders` over `modules` until no module changes extension.
pub fn apply_loaders(
    graph: &mut ModuleGraph,
    loaders: &[Loader],
    modules: &[ModuleId],
    shared: &mut SharedState,
    config: &BuildConfig,
) -> Result<()> {
    if loaders.is_empty() {
        return Ok(());
    }

    let limit = pass_limit(loaders);
    let mut pending = modules.to_vec();
    let mut moved = Vec::new();
    let mut pass = 0;
    while !pending.is_empty() {
        pass += 1;
        if pass > limit {
            let module = &graph[pending[0]];
            return Err(Error::Loader {
                loader: "pipeline".to_string(),
                module: module.id.clone(),
                message: format!(
                    "extension still changing after {limit} passes (now {})",
                    module.current_path()
                ),
            });
        }

        let mut changed = Vec::new();
        for &id in &pending {
            for loader in loaders {
                if !loader.matches(graph[id].current_path()) {
                    continue;
                }
                for (transform, options) in loader.uses.iter().rev() {
                    let mut cx = LoaderContext {
                        graph: &mut *graph,
                        id,
                        shared: &mut *shared,
                        config,
                    };
                    transform(&mut cx, options).map_err(|e| Error::Loader {
                        loader: loader.name.clone(),
                        module: graph[id].id.clone(),
                        message: e.message,
                    })?;
                }
                if graph[id].take_extension_changed() && !changed.contains(&id) {
                    changed.push(id);
                }
            }
        }
        moved.extend(changed.iter().copied());
        pending = changed;
    }

    for id in moved {
        graph[id].reset_current_path();
    }
    Ok(())
}
