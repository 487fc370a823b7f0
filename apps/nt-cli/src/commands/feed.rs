// feed.rs - Feed subcommands: fetch once and show which cases are ready.

use clap::Subcommand;
use nt_feed::{DocumentFeedEntry, ReadinessSet};
use nt_lifecycle::NotariaConfig;

use super::case::{radicado_of, truncate};
use crate::context::Context;

#[derive(Subcommand)]
pub enum FeedCommands {
    /// Fetch the feed once and print the readiness of every pending case.
    Check {
        /// Also list the feed entries themselves.
        #[arg(long)]
        entries: bool,
    },
}

pub fn execute(cmd: &FeedCommands, config: &NotariaConfig) -> anyhow::Result<()> {
    match cmd {
        FeedCommands::Check { entries } => check(config, *entries),
    }
}

/// One fetch of the configured feed.
pub(crate) fn fetch_once(config: &NotariaConfig) -> anyhow::Result<Vec<DocumentFeedEntry>> {
    let feed = config.build_feed()?;
    let rt = tokio::runtime::Runtime::new()?;
    let entries = rt.block_on(feed.fetch())?;
    tracing::info!("fetched {} entr(ies) from {}", entries.len(), feed.describe());
    Ok(entries)
}

fn check(config: &NotariaConfig, show_entries: bool) -> anyhow::Result<()> {
    let ctx = Context::open(config)?;
    let feed = fetch_once(config)?;
    let pending = ctx.manager.list_pending();
    let ready = ReadinessSet::evaluate(pending.iter(), &feed);

    if show_entries {
        println!("{:<24} {:<40}", "RADICADO", "FILENAME");
        println!("{}", "-".repeat(64));
        for e in &feed {
            println!(
                "{:<24} {:<40}",
                e.normalized_radicado().unwrap_or("-"),
                e.filename.as_deref().unwrap_or("-")
            );
        }
        println!();
    }

    if pending.is_empty() {
        println!("No pending cases.");
        return Ok(());
    }
    println!(
        "{:<38} {:<16} {:<14} {:<6}",
        "ID", "RADICADO", "PROTOCOLISTA", "READY"
    );
    println!("{}", "-".repeat(76));
    for c in &pending {
        println!(
            "{:<38} {:<16} {:<14} {:<6}",
            c.case_id,
            truncate(radicado_of(c), 16),
            truncate(&c.protocolista, 14),
            if ready.is_ready(c.case_id) { "yes" } else { "no" },
        );
    }
    println!(
        "\n{} of {} pending case(s) document-ready ({} feed entries).",
        ready.len(),
        pending.len(),
        feed.len()
    );
    Ok(())
}
