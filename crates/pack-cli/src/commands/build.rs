//! `pack build` command implementation.

use super::{report, BuildAction};
use pack_core::{Build, BuildReport};
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// Build result for JSON output.
#[derive(Serialize)]
struct BuildResultJson {
    ok: bool,
    output: String,
    modules: usize,
    written: Vec<String>,
    package_hits: usize,
    package_probes: usize,
    duration_ms: u64,
}

/// Run a one-shot build.
pub fn run(action: &BuildAction, json: bool) -> miette::Result<()> {
    let config = action.load_config()?;
    let started = Instant::now();

    let mut build = Build::new(config)
        .and_then(Build::with_default_loaders)
        .map(Build::with_config_plugins)
        .map_err(report)?;

    let summary = match build.run() {
        Ok(summary) => summary,
        Err(e) => {
            if json {
                print_error_json(&e);
            }
            return Err(report(e));
        }
    };

    #[allow(clippy::cast_possible_truncation)]
    let duration_ms = started.elapsed().as_millis() as u64;
    let output = build.config().output.display().to_string();
    info!(
        modules = summary.modules,
        files = summary.written.len(),
        duration_ms,
        "build finished"
    );

    if json {
        print_json(&output, &summary, duration_ms);
    } else {
        print_human(&output, &summary, duration_ms);
    }
    Ok(())
}

fn print_json(output: &str, summary: &BuildReport, duration_ms: u64) {
    let result = BuildResultJson {
        ok: true,
        output: output.to_string(),
        modules: summary.modules,
        written: summary.written.clone(),
        package_hits: summary.package_hits,
        package_probes: summary.package_probes,
        duration_ms,
    };
    if let Ok(text) = serde_json::to_string_pretty(&result) {
        println!("{text}");
    }
}

fn print_error_json(e: &pack_core::Error) {
    let value = serde_json::json!({
        "ok": false,
        "error": { "code": e.code(), "message": e.to_string() },
    });
    println!("{value}");
}

fn print_human(output: &str, summary: &BuildReport, duration_ms: u64) {
    println!();
    for file in &summary.written {
        println!("  {output}/{file}");
    }
    println!();
    println!(
        "  {} modules, {} files written in {duration_ms}ms",
        summary.modules,
        summary.written.len()
    );
}
