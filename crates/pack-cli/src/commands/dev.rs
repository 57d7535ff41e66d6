//! `pack dev` command implementation.
//!
//! Runs a development build, then hands it to the watch session, which
//! rebuilds on every save and pushes updates over the `/__hmr` socket.

use super::{report, BuildAction};
use miette::{IntoDiagnostic, Result};
use pack_core::Build;
use pack_dev::{DevOptions, DevServer, HMR_PATH};
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};

/// Dev server action.
#[derive(Debug, Clone)]
pub struct DevAction {
    pub build: BuildAction,
    /// Port the hot update socket listens on.
    pub port: u16,
    /// Host to bind to.
    pub host: String,
}

/// Run the dev session until interrupted.
pub async fn run(action: DevAction) -> Result<()> {
    let ip: IpAddr = if action.host == "localhost" {
        IpAddr::from([127, 0, 0, 1])
    } else {
        action.host.parse().into_diagnostic()?
    };
    let addr = SocketAddr::new(ip, action.port);

    let mut config = action.build.load_config()?;
    config.watch = true;
    // The page may be served from elsewhere; point the client at this socket
    config
        .define
        .entry("SOCKET_ORIGIN".to_string())
        .or_insert_with(|| Value::String(format!("ws://{}:{}{HMR_PATH}", action.host, action.port)));

    let mut build = Build::new(config)
        .and_then(Build::with_default_loaders)
        .map(Build::with_config_plugins)
        .map_err(report)?;
    let summary = build.run().map_err(report)?;

    println!();
    println!(
        "  Built {} modules into {}",
        summary.modules,
        build.config().output.display()
    );
    println!("  Hot updates on ws://{}:{}{HMR_PATH}", action.host, action.port);
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    let server = DevServer::new(build, DevOptions { addr });
    tokio::select! {
        res = server.run() => res.into_diagnostic(),
        _ = tokio::signal::ctrl_c() => Ok(()),
    }
}
