//! Hot module replacement: the wire protocol, update propagation and the
//! browser client runtime.
//!
//! After a rebuild, [`compute_updates`] turns the changed module into one
//! message:
//! - a stylesheet yields a `style` update carrying its new text;
//! - a script or JSON module yields a self update, then one entry per
//!   importer walking up the parent edges, each naming the literal the
//!   importer used so `hot.accept(dep, cb)` handlers can be matched;
//! - anything else, including the entry itself, asks for a full reload.

use std::path::Path;

use rustc_hash::FxHashSet as HashSet;
use serde::{Deserialize, Serialize};

use crate::bundler::graph::ModuleGraph;
use crate::bundler::module::{Module, ModuleId, ModuleKind};
use crate::paths;

/// Message pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HmrMessage {
    /// Greeting sent when a socket opens.
    Connected,
    Update { updates: Vec<HotUpdate> },
    Reload,
    /// A rebuild failed; the page keeps running the previous code.
    Error { message: String },
}

/// One entry of an `update` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HotUpdate {
    Style {
        id: String,
        content: String,
    },
    Js {
        id: String,
        #[serde(rename = "isSelfUpdate")]
        is_self_update: bool,
        #[serde(rename = "rawPathname", default, skip_serializing_if = "Option::is_none")]
        raw_pathname: Option<String>,
        /// URL to re-import, with a `?hash=` cache buster.
        outpath: String,
    },
}

/// Receiver of hot-update messages. Delivery is fire-and-forget.
pub trait HotUpdateSink {
    fn send(&self, message: &HmrMessage);
}

impl<F> HotUpdateSink for F
where
    F: Fn(&HmrMessage),
{
    fn send(&self, message: &HmrMessage) {
        self(message);
    }
}

/// Id a module registers its hot context under.
#[must_use]
pub fn hot_id(module: &Module) -> String {
    paths::to_slash(&module.id)
}

/// Cache-busted URL of a module's current output.
#[must_use]
pub fn versioned_url(module: &Module) -> String {
    format!(
        "{}?hash={}",
        paths::ensure_root_prefix(module.final_outpath()),
        pack_util::hash::shorten(&module.hash)
    )
}

/// Build the message announcing that `changed` was rebuilt.
#[must_use]
pub fn compute_updates(graph: &ModuleGraph, changed: ModuleId) -> HmrMessage {
    let module = &graph[changed];
    if module.is_root || graph.root() == Some(changed) {
        return HmrMessage::Reload;
    }

    let mut updates = Vec::new();
    match module.kind {
        ModuleKind::Style => {
            let content = style_source(&module.id);
            updates.push(HotUpdate::Style {
                id: hot_id(module),
                content,
            });
        }
        ModuleKind::Script | ModuleKind::Json => {
            updates.push(HotUpdate::Js {
                id: hot_id(module),
                is_self_update: true,
                raw_pathname: None,
                outpath: versioned_url(module),
            });
            let mut visited = HashSet::default();
            propagate(graph, changed, &mut visited, &mut updates);
        }
        ModuleKind::Asset | ModuleKind::Synthetic => {}
    }

    if updates.is_empty() {
        HmrMessage::Reload
    } else {
        HmrMessage::Update { updates }
    }
}

/// Walk importer edges upward. Each (importer, imported) edge is reported
/// once, so an importer reached along two paths still hears about both.
fn propagate(
    graph: &ModuleGraph,
    child: ModuleId,
    visited: &mut HashSet<(ModuleId, ModuleId)>,
    updates: &mut Vec<HotUpdate>,
) {
    let module = &graph[child];
    let outpath = versioned_url(module);
    for &parent in &module.parents {
        if !visited.insert((parent, child)) {
            continue;
        }
        let importer = &graph[parent];
        let raw_pathname = importer.imports_of(&module.id).next().map(|node| node.raw_path.clone());
        updates.push(HotUpdate::Js {
            id: hot_id(importer),
            is_self_update: false,
            raw_pathname,
            outpath: outpath.clone(),
        });
        propagate(graph, parent, visited, updates);
    }
}

fn style_source(path: &Path) -> String {
    pack_util::fs::read_to_string_lossy(path).unwrap_or_default()
}

/// Browser side of the protocol, emitted as the `__pack_client__.js` module.
///
/// Exports `createHotContext(id)`, which returns the `import.meta.hot`
/// object, and `updateStyle(id, css)`.
pub const CLIENT_RUNTIME: &str = r"// pack HMR client
const hotModulesMap = new Map();
const env = (globalThis.process && globalThis.process.env) || {};
const socketUrl = env.SOCKET_ORIGIN || `ws://${location.host}/__hmr`;

let ws;

function connect() {
  ws = new WebSocket(socketUrl, 'pack-hmr');

  ws.addEventListener('open', () => {
    console.log('[pack] connected.');
  }, { once: true });

  ws.addEventListener('message', ({ data }) => {
    handleMessage(JSON.parse(data));
  });

  ws.addEventListener('close', () => {
    console.log('[pack] server connection lost.');
  });

  ws.addEventListener('error', (err) => {
    console.error('[pack] websocket error:', err);
  });
}

function handleMessage(msg) {
  switch (msg.type) {
    case 'connected':
      break;

    case 'update':
      hideErrorOverlay();
      for (const update of msg.updates) {
        if (update.type === 'js') {
          queueUpdate(fetchUpdate(update));
        } else {
          updateStyle(update.id, update.content);
        }
      }
      break;

    case 'reload':
      location.reload();
      break;

    case 'error':
      console.error('[pack] build error:', msg.message);
      showErrorOverlay(msg.message);
      break;
  }
}

let queued = [];
let pending = false;

function queueUpdate(p) {
  queued.push(p);
  if (pending) {
    return;
  }
  pending = true;
  Promise.resolve().then(() => {
    const loading = queued;
    queued = [];
    pending = false;
    Promise.all(loading).then((fns) => {
      for (const fn of fns) {
        fn && fn();
      }
    });
  });
}

async function fetchUpdate({ id, isSelfUpdate, rawPathname, outpath }) {
  const mod = hotModulesMap.get(id);
  if (!mod) {
    return;
  }

  const toUpdate = new Set();
  if (isSelfUpdate) {
    toUpdate.add(id);
  } else {
    for (const { deps } of mod.callbacks) {
      for (const dep of deps) {
        if (dep === rawPathname) {
          toUpdate.add(dep);
        }
      }
    }
  }

  const callbacks = mod.callbacks.filter(({ deps }) => deps.some((dep) => toUpdate.has(dep)));
  const fresh = new Map();
  await Promise.all(
    Array.from(toUpdate).map(async (dep) => {
      try {
        fresh.set(dep, await import(outpath));
      } catch (err) {
        console.error(`[pack] hot update failed for ${dep}:`, err);
      }
    })
  );

  return () => {
    for (const { deps, fn } of callbacks) {
      fn(deps.map((dep) => fresh.get(dep)));
    }
  };
}

function showErrorOverlay(message) {
  let overlay = document.getElementById('__pack_error_overlay');
  if (!overlay) {
    overlay = document.createElement('div');
    overlay.id = '__pack_error_overlay';
    overlay.style.cssText = `
      position: fixed; top: 0; left: 0; right: 0; bottom: 0;
      background: rgba(0,0,0,0.9); color: #ff5555;
      padding: 32px; font-family: monospace; font-size: 16px;
      white-space: pre-wrap; overflow: auto; z-index: 999999;
    `;
    document.body.appendChild(overlay);
  }
  overlay.textContent = 'Build Error:\n\n' + message;
  overlay.style.display = 'block';
}

function hideErrorOverlay() {
  const overlay = document.getElementById('__pack_error_overlay');
  if (overlay) overlay.style.display = 'none';
}

export function updateStyle(id, css) {
  let el = document.querySelector(`style[data-pack-id=${JSON.stringify(id)}]`);
  if (!el) {
    el = document.createElement('style');
    el.setAttribute('data-pack-id', id);
    document.head.appendChild(el);
  }
  el.textContent = css;
}

export function createHotContext(hostPath) {
  const existing = hotModulesMap.get(hostPath);
  if (existing) {
    existing.callbacks = [];
  }

  return {
    accept(deps, cb) {
      if (!cb) {
        cb = deps;
        deps = [hostPath];
      }
      if (!Array.isArray(deps)) {
        deps = [deps];
      }

      let mod = hotModulesMap.get(hostPath);
      if (!mod) {
        mod = { id: hostPath, callbacks: [] };
        hotModulesMap.set(hostPath, mod);
      }
      mod.callbacks.push({
        deps,
        fn: (mods) => (mods.length > 1 ? cb(mods) : cb(mods[0])),
      });
    },
  };
}

connect();
";
