// dispatch.rs - Dispatch subcommands: send one case, or every ready case.

use clap::Subcommand;
use nt_feed::ReadinessSet;
use nt_lifecycle::{DispatchReport, NotariaConfig, NotificationDispatcher};

use super::feed::fetch_once;
use crate::context::Context;

#[derive(Subcommand)]
pub enum DispatchCommands {
    /// Notify about one pending case and finish it.
    One {
        /// Case ID.
        id: String,
        /// Recorded as the sender (defaults to `[dispatch] sent_by`).
        #[arg(long)]
        sent_by: Option<String>,
    },
    /// Notify about every document-ready case.
    Ready {
        #[arg(long)]
        sent_by: Option<String>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

pub fn execute(cmd: &DispatchCommands, config: &NotariaConfig) -> anyhow::Result<()> {
    let ctx = Context::open(config)?;
    let settings = &config.settings.dispatch;
    let dispatcher = NotificationDispatcher::new(ctx.manager.clone(), config.build_notifier()?)
        .with_timeout(settings.timeout());
    let rt = tokio::runtime::Runtime::new()?;

    match cmd {
        DispatchCommands::One { id, sent_by } => {
            let case_id = uuid::Uuid::parse_str(id)?;
            let sent_by = sent_by.as_deref().unwrap_or(&settings.sent_by);
            let case = rt.block_on(dispatcher.dispatch_one(case_id, sent_by))?;
            let to = case
                .last_dispatch
                .as_ref()
                .map(|d| d.correo_enviado_a.as_str())
                .unwrap_or("-");
            println!(
                "Dispatched case {} to {} (envios {})",
                case.case_id, to, case.envios
            );
            Ok(())
        }
        DispatchCommands::Ready { sent_by, json } => {
            let sent_by = sent_by.as_deref().unwrap_or(&settings.sent_by);
            let feed = fetch_once(config)?;
            let pending = ctx.manager.list_pending();
            let ready = ReadinessSet::evaluate(pending.iter(), &feed);
            if ready.is_empty() {
                println!("No document-ready cases.");
                return Ok(());
            }
            let report = rt.block_on(dispatcher.dispatch_all_ready(&ready, sent_by));
            if *json {
                println!("{}", serde_json::to_string_pretty(&report.summary())?);
            } else {
                print_report(&report);
            }
            if !report.is_clean() {
                anyhow::bail!(
                    "{} of {} dispatch(es) failed",
                    report.failed.len(),
                    report.total()
                );
            }
            Ok(())
        }
    }
}

fn print_report(report: &DispatchReport) {
    for case in &report.succeeded {
        println!(
            "  sent    {}  radicado {}",
            case.case_id,
            super::case::radicado_of(case)
        );
    }
    for failure in &report.failed {
        let retry = if failure.error.is_retryable() {
            " (retryable)"
        } else {
            ""
        };
        println!(
            "  FAILED  {}  radicado {}: {}{}",
            failure.case_id, failure.radicado, failure.error, retry
        );
    }
    println!(
        "\n{} sent, {} failed.",
        report.succeeded.len(),
        report.failed.len()
    );
}
