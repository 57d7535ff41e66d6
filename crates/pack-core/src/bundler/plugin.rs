//! Plugin system for the bundler.
//!
//! Plugins never see modules directly. They subscribe handlers to lifecycle
//! events on an [`EventBus`]; each handler receives an [`EventContext`] with
//! the module graph, the shared build store and the build config.
//!
//! ## Example
//!
//! ```ignore
//! use pack_core::bundler::{EventBus, EventKind, Plugin};
//!
//! struct Banner;
//!
//! impl Plugin for Banner {
//!     fn name(&self) -> &str { "banner" }
//!
//!     fn apply(&self, events: &mut EventBus) {
//!         events.on(EventKind::End, self.name(), |cx| {
//!             cx.shared.set("banner", "built by pack");
//!             Ok(())
//!         });
//!     }
//! }
//! ```

use rustc_hash::FxHashMap as HashMap;

use super::graph::ModuleGraph;
use super::module::{Module, ModuleId};
use crate::config::BuildConfig;
use crate::error::{Error, Result};

/// Lifecycle points plugins can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    ModuleCreated,
    BeforeModuleResolve,
    ModuleResolved,
    BeforeModuleWrite,
    ModuleWrited,
    BeforeChunkWrite,
    ChunkWrited,
    End,
}

impl EventKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ModuleCreated => "moduleCreated",
            Self::BeforeModuleResolve => "beforeModuleResolve",
            Self::ModuleResolved => "moduleResolved",
            Self::BeforeModuleWrite => "beforeModuleWrite",
            Self::ModuleWrited => "moduleWrited",
            Self::BeforeChunkWrite => "beforeChunkWrite",
            Self::ChunkWrited => "chunkWrited",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a plugin handler.
#[derive(Debug)]
pub struct PluginError {
    /// Plugin name that caused the error.
    pub plugin: String,
    /// Event being handled.
    pub event: EventKind,
    /// Error message.
    pub message: String,
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.plugin, self.event, self.message)
    }
}

impl std::error::Error for PluginError {}

/// Build-scoped key-value store shared by loaders and plugins.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    values: HashMap<String, String>,
}

impl SharedState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Append to a value, creating it if needed.
    pub fn append(&mut self, key: &str, value: &str) {
        self.values.entry(key.to_string()).or_default().push_str(value);
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }
}

/// A written chunk, as seen by chunk events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Final output path, relative to the output directory.
    pub outpath: String,
    /// Member modules.
    pub modules: Vec<ModuleId>,
    /// Whether this is a package registry chunk.
    pub is_package: bool,
}

/// What an event is about.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    Build,
    Module(ModuleId),
    Chunk(&'a ChunkInfo),
}

/// Payload handed to event handlers.
pub struct EventContext<'a> {
    pub graph: &'a mut ModuleGraph,
    pub shared: &'a mut SharedState,
    pub config: &'a BuildConfig,
    pub subject: Subject<'a>,
}

impl EventContext<'_> {
    /// The module this event is about, if any.
    #[must_use]
    pub fn module(&self) -> Option<&Module> {
        match self.subject {
            Subject::Module(id) => self.graph.get(id),
            _ => None,
        }
    }

    pub fn module_mut(&mut self) -> Option<&mut Module> {
        match self.subject {
            Subject::Module(id) => self.graph.get_mut(id),
            _ => None,
        }
    }

    #[must_use]
    pub fn chunk(&self) -> Option<&ChunkInfo> {
        match self.subject {
            Subject::Chunk(chunk) => Some(chunk),
            _ => None,
        }
    }
}

type Handler = Box<dyn Fn(&mut EventContext<'_>) -> Result<()> + Send + Sync>;

/// Listener registry with a closed set of event kinds.
///
/// Handlers run in subscription order; the first error stops the emit.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<EventKind, Vec<(String, Handler)>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `kind` on behalf of `plugin`.
    pub fn on<F>(&mut self, kind: EventKind, plugin: &str, handler: F)
    where
        F: Fn(&mut EventContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers
            .entry(kind)
            .or_default()
            .push((plugin.to_string(), Box::new(handler)));
    }

    #[must_use]
    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.handlers.get(&kind).is_some_and(|h| !h.is_empty())
    }

    /// Run every handler subscribed to `kind`.
    ///
    /// Errors other than [`Error::Plugin`] are wrapped with the plugin name.
    pub fn emit(&self, kind: EventKind, cx: &mut EventContext<'_>) -> Result<()> {
        let Some(handlers) = self.handlers.get(&kind) else {
            return Ok(());
        };
        for (plugin, handler) in handlers {
            handler(&mut *cx).map_err(|e| match e {
                Error::Plugin(inner) => Error::Plugin(inner),
                other => Error::Plugin(PluginError {
                    plugin: plugin.clone(),
                    event: kind,
                    message: other.to_string(),
                }),
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut counts: Vec<_> = self
            .handlers
            .iter()
            .map(|(kind, handlers)| (kind.as_str(), handlers.len()))
            .collect();
        counts.sort_unstable();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

/// A bundler plugin: subscribes handlers when the build is assembled.
pub trait Plugin: Send + Sync {
    /// Plugin name, used in error messages.
    fn name(&self) -> &str;

    /// Register event handlers.
    fn apply(&self, events: &mut EventBus);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn emit(bus: &EventBus, kind: EventKind, graph: &mut ModuleGraph, shared: &mut SharedState) -> Result<()> {
        let config = BuildConfig::new("/p");
        let mut cx = EventContext {
            graph,
            shared,
            config: &config,
            subject: Subject::Build,
        };
        bus.emit(kind, &mut cx)
    }

    #[test]
    fn test_handlers_run_in_order() {
        let mut bus = EventBus::new();
        bus.on(EventKind::End, "a", |cx| {
            cx.shared.append("log", "a");
            Ok(())
        });
        bus.on(EventKind::End, "b", |cx| {
            cx.shared.append("log", "b");
            Ok(())
        });
        assert!(bus.has_listeners(EventKind::End));
        assert!(!bus.has_listeners(EventKind::Start));

        let mut graph = ModuleGraph::new();
        let mut shared = SharedState::new();
        emit(&bus, EventKind::End, &mut graph, &mut shared).unwrap();
        emit(&bus, EventKind::Start, &mut graph, &mut shared).unwrap();
        assert_eq!(shared.get("log"), Some("ab"));
    }

    #[test]
    fn test_error_stops_emit_and_names_plugin() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();
        bus.on(EventKind::Start, "broken", |_| {
            Err(Error::unsupported(PathBuf::from("/x.js"), "nope"))
        });
        let counter = Arc::clone(&calls);
        bus.on(EventKind::Start, "after", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut graph = ModuleGraph::new();
        let err = emit(&bus, EventKind::Start, &mut graph, &mut SharedState::new()).unwrap_err();
        match err {
            Error::Plugin(e) => {
                assert_eq!(e.plugin, "broken");
                assert_eq!(e.event, EventKind::Start);
                assert!(e.to_string().starts_with("[broken] start:"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shared_state() {
        let mut shared = SharedState::new();
        shared.append("css", "a{}");
        shared.append("css", "b{}");
        assert_eq!(shared.get("css"), Some("a{}b{}"));
        shared.set("css", "");
        assert_eq!(shared.remove("css").as_deref(), Some(""));
        assert_eq!(shared.get("css"), None);
    }
}
