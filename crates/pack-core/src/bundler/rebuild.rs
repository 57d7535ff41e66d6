//! Incremental rebuilds after file edits.
//!
//! A changed file is reset and resolved again in place (same id, same
//! importers). Loaders run over whatever the pass created plus the module's
//! dependencies, and only the affected chunks are finalized and written.

use rustc_hash::FxHashSet as HashSet;
use std::path::{Path, PathBuf};

use super::graph::{ResolveContext, ResolveTarget};
use super::module::ModuleId;
use super::{chunks, loader, runtime, Build, EventKind};
use crate::dev::hmr::{compute_updates, HmrMessage};
use crate::error::{Error, Result};

/// What happened to one changed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// Content hash matches the last build; nothing to do.
    Unchanged(PathBuf),
    /// Not part of the graph.
    Untracked(PathBuf),
    /// Tracked but gone from disk. The module stays as it was.
    Missing(PathBuf),
    Rebuilt { path: PathBuf, written: Vec<String> },
}

/// Result of one rebuild pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    pub outcomes: Vec<RebuildOutcome>,
    /// Message for connected clients; `None` when nothing was rebuilt.
    pub message: Option<HmrMessage>,
}

impl RebuildReport {
    /// Whether any file was written.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o, RebuildOutcome::Rebuilt { .. }))
    }
}

impl Build {
    /// Bring the output up to date with edits to `paths`.
    ///
    /// Paths are handled in order. The first error aborts the pass; modules
    /// already rebuilt keep their new state and the failing one is left as
    /// far as it got.
    pub fn rebuild(&mut self, paths: &[PathBuf]) -> Result<RebuildReport> {
        let mut outcomes = Vec::with_capacity(paths.len());
        let mut message: Option<HmrMessage> = None;

        for path in paths {
            let Some(id) = self.lookup_changed(path) else {
                outcomes.push(RebuildOutcome::Untracked(path.clone()));
                continue;
            };
            let file = self.graph[id].id.clone();
            let hash = match pack_util::hash::blake3_file(&file) {
                Ok(hash) => hash,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    outcomes.push(RebuildOutcome::Missing(file));
                    continue;
                }
                Err(e) => return Err(Error::io(&file, e)),
            };
            if hash == self.graph[id].hash {
                outcomes.push(RebuildOutcome::Unchanged(file));
                continue;
            }

            let written = self.rebuild_module(id)?;
            message = Some(merge(message, compute_updates(&self.graph, id)));
            outcomes.push(RebuildOutcome::Rebuilt { path: file, written });
        }

        Ok(RebuildReport { outcomes, message })
    }

    fn lookup_changed(&self, path: &Path) -> Option<ModuleId> {
        self.graph.lookup(path).or_else(|| {
            dunce::canonicalize(path)
                .ok()
                .and_then(|canonical| self.graph.lookup(&canonical))
        })
    }

    fn rebuild_module(&mut self, id: ModuleId) -> Result<Vec<String>> {
        self.graph.reset(id);
        self.graph.evict(id);

        let mut added = Vec::new();
        {
            let mut cx = ResolveContext {
                resolver: &self.resolver,
                events: &self.events,
                shared: &mut self.shared,
                config: &self.config,
                added: &mut added,
            };
            self.graph.resolve(ResolveTarget::Existing(id), &mut cx)?;
        }

        let mut targets = added.clone();
        for &dep in &self.graph[id].dependencies {
            if !targets.contains(&dep) {
                targets.push(dep);
            }
        }
        loader::apply_loaders(&mut self.graph, &self.loaders, &targets, &mut self.shared, &self.config)?;

        let root = self.graph.root().unwrap_or(id);
        if root == id {
            runtime::inject_global(&mut self.graph, root, &self.config);
        }

        let mut scope: HashSet<ModuleId> = added.iter().copied().collect();
        if self.graph[id].skip_write {
            // Importers carry this module's output inline
            scope.extend(self.graph[id].parents.iter().copied());
        }
        if self.config.append_hash() {
            let from: Vec<ModuleId> = scope.iter().copied().collect();
            for module in from {
                scope.extend(self.graph.ancestors(module));
            }
        }

        let plan = chunks::split_chunks(&self.graph, root, Some(&scope), &self.registry);
        let written = self.emit_chunks(&plan)?;
        if plan.local.contains(&root) {
            // The page has to point at the entry's new name
            self.emit_build(EventKind::End)?;
        }
        self.graph.settle();
        Ok(written)
    }
}

/// Combine the messages of several rebuilt files into one.
fn merge(current: Option<HmrMessage>, next: HmrMessage) -> HmrMessage {
    match (current, next) {
        (None, next) => next,
        (Some(HmrMessage::Update { mut updates }), HmrMessage::Update { updates: more }) => {
            updates.extend(more);
            HmrMessage::Update { updates }
        }
        (Some(HmrMessage::Reload), _) | (Some(_), HmrMessage::Reload) => HmrMessage::Reload,
        (Some(current), _) => current,
    }
}
