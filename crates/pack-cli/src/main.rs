#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pack")]
#[command(author, version, about = "A source-to-source JavaScript bundler", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that builds.
#[derive(clap::Args, Debug, Clone)]
struct BuildArgs {
    /// Entry module (overrides the config file)
    #[arg(long, short = 'e', value_name = "FILE")]
    entry: Option<PathBuf>,

    /// Output directory (overrides the config file)
    #[arg(long, short = 'o', value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Path to config file (default: pack.config.json in the working directory)
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keep output names free of content hashes
    #[arg(long)]
    no_hash: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Build the project once
    Build {
        #[command(flatten)]
        args: BuildArgs,
    },

    /// Build, then rebuild on change and push hot updates
    Dev {
        #[command(flatten)]
        args: BuildArgs,

        /// Port for the hot update socket
        #[arg(long, short = 'p', default_value = "8080")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose, cli.json);

    match cli.command {
        Commands::Build { args } => {
            commands::build::run(&commands::BuildAction::new(&cwd, args), cli.json)
        }
        Commands::Dev { args, port, host } => {
            let action = commands::dev::DevAction {
                build: commands::BuildAction::new(&cwd, args),
                port,
                host,
            };
            let rt = tokio::runtime::Runtime::new().into_diagnostic()?;
            rt.block_on(commands::dev::run(action))
        }
    }
}
