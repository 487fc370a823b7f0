//! # notaria
//!
//! Command-line interface for the notaria case tracker.
//!
//! - `notaria case create/list/show/update/delete/...`: manage cases
//! - `notaria protocolist add/list/update/remove`: manage handlers
//! - `notaria feed check`: fetch the document feed once and show readiness
//! - `notaria dispatch one/ready`: send notifications, finishing cases
//! - `notaria watch`: poll the feed and print changes until Ctrl+C

mod commands;
mod context;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nt_lifecycle::NotariaConfig;
use tracing_subscriber::EnvFilter;

/// Notarial case tracker: cases, radicados, document readiness and dispatch.
#[derive(Parser)]
#[command(name = "notaria", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, global = true, default_value = ".")]
    project_root: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage cases.
    Case {
        #[command(subcommand)]
        command: commands::case::CaseCommands,
    },
    /// Manage protocolists.
    Protocolist {
        #[command(subcommand)]
        command: commands::protocolist::ProtocolistCommands,
    },
    /// Inspect the document feed.
    Feed {
        #[command(subcommand)]
        command: commands::feed::FeedCommands,
    },
    /// Send notifications and finish cases.
    Dispatch {
        #[command(subcommand)]
        command: commands::dispatch::DispatchCommands,
    },
    /// Poll the feed and print case events until Ctrl+C.
    Watch {
        /// Dispatch every case as soon as it becomes document-ready.
        #[arg(long)]
        auto_dispatch: bool,
    },
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("nt_lifecycle=info".parse()?)
        .add_directive("nt_feed=info".parse()?)
        .add_directive("notaria=info".parse()?);
    // Logs go to stderr so they don't mix with command output.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config = NotariaConfig::load(&project_root)?;

    match &cli.command {
        Commands::Case { command } => commands::case::execute(command, &config),
        Commands::Protocolist { command } => commands::protocolist::execute(command, &config),
        Commands::Feed { command } => commands::feed::execute(command, &config),
        Commands::Dispatch { command } => commands::dispatch::execute(command, &config),
        Commands::Watch { auto_dispatch } => commands::watch::execute(&config, *auto_dispatch),
    }
}
