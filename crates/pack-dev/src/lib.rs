#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! Watch mode for pack.
//!
//! [`DevServer`] owns a [`Build`] that has already run once. It watches the
//! project root, feeds debounced batches of changed paths to
//! [`Build::rebuild`] and broadcasts the resulting hot-update messages to
//! every client connected on `/__hmr`.
//!
//! A failed rebuild is reported to clients as an `error` message and logged;
//! the watcher keeps running so the next save can fix it.

pub mod hub;
pub mod server;
pub mod watch;

pub use hub::HmrHub;
pub use server::{router, HMR_PATH, HMR_PROTOCOL};
pub use watch::{next_batch, ProjectWatcher, WatchError, WatchEvent, WatchEventKind};

use pack_core::{Build, HmrMessage, HotUpdateSink, RebuildOutcome, RebuildReport};
use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info};

/// Dev server options.
#[derive(Debug, Clone)]
pub struct DevOptions {
    /// Address the WebSocket endpoint listens on.
    pub addr: SocketAddr,
}

impl Default for DevOptions {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

/// Apply one batch of edits and tell clients what changed.
///
/// Returns the report on success. On failure the error goes to the log and,
/// as an `error` message, to `sink`.
pub fn apply_changes(
    build: &mut Build,
    paths: &[PathBuf],
    sink: &dyn HotUpdateSink,
) -> Option<RebuildReport> {
    match build.rebuild(paths) {
        Ok(report) => {
            for outcome in &report.outcomes {
                match outcome {
                    RebuildOutcome::Rebuilt { path, written } => {
                        info!(path = %path.display(), files = written.len(), "rebuilt");
                    }
                    RebuildOutcome::Missing(path) => {
                        debug!(path = %path.display(), "tracked file removed, keeping last build");
                    }
                    RebuildOutcome::Unchanged(path) | RebuildOutcome::Untracked(path) => {
                        debug!(path = %path.display(), "skipped");
                    }
                }
            }
            if let Some(message) = &report.message {
                sink.send(message);
            }
            Some(report)
        }
        Err(e) => {
            error!(code = e.code(), error = %e, "rebuild failed");
            sink.send(&HmrMessage::Error {
                message: e.to_string(),
            });
            None
        }
    }
}

/// Long-running watch session.
pub struct DevServer {
    build: Build,
    options: DevOptions,
    hub: HmrHub,
}

impl std::fmt::Debug for DevServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServer")
            .field("root", &self.build.config().root)
            .field("addr", &self.options.addr)
            .finish_non_exhaustive()
    }
}

impl DevServer {
    /// `build` should have completed [`Build::run`] already.
    pub fn new(build: Build, options: DevOptions) -> Self {
        Self {
            build,
            options,
            hub: HmrHub::new(),
        }
    }

    #[must_use]
    pub fn hub(&self) -> &HmrHub {
        &self.hub
    }

    /// Serve `/__hmr` and rebuild on every change until the server stops.
    pub async fn run(self) -> io::Result<()> {
        let Self {
            mut build,
            options,
            hub,
        } = self;
        let config = build.config().clone();

        let (watcher, mut rx) = ProjectWatcher::start(&config.root, vec![config.output.clone()])
            .map_err(io::Error::other)?;

        let listener = tokio::net::TcpListener::bind(options.addr).await?;
        info!(addr = %listener.local_addr()?, "hmr server listening");
        let server = axum::serve(listener, router(hub.clone())).into_future();

        let window = Duration::from_millis(config.debounce_ms);
        let worker = async move {
            let _watcher = watcher;
            while let Some(paths) = next_batch(&mut rx, window).await {
                let sink = hub.clone();
                // Rebuilds do blocking file IO
                let joined = tokio::task::spawn_blocking(move || {
                    let report = apply_changes(&mut build, &paths, &sink);
                    (build, report)
                })
                .await;
                match joined {
                    Ok((returned, _)) => build = returned,
                    Err(e) => {
                        error!(error = %e, "rebuild worker panicked");
                        return Err(io::Error::other(e));
                    }
                }
            }
            info!("watcher closed");
            Ok(())
        };

        tokio::select! {
            res = server => res,
            res = worker => res,
        }
    }
}
