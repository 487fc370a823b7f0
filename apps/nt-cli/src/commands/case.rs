// case.rs - Case subcommands: create, list, show, update, delete, radicados, return.

use chrono::NaiveDate;
use clap::Subcommand;
use nt_case::{Case, CaseUpdate, NewCase};
use nt_lifecycle::NotariaConfig;

use crate::context::Context;

#[derive(Subcommand)]
pub enum CaseCommands {
    /// Open a new pending case.
    Create {
        /// Deed number (numeric).
        #[arg(long)]
        escritura: String,
        /// Initial tracking number.
        #[arg(long)]
        radicado: String,
        /// Assigned protocolist (must be registered).
        #[arg(long)]
        protocolista: String,
        /// Case date, YYYY-MM-DD (defaults to today).
        #[arg(long)]
        fecha: Option<NaiveDate>,
        /// Date the document was signed, YYYY-MM-DD.
        #[arg(long)]
        fecha_documento: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        observaciones: String,
    },
    /// List cases.
    List {
        /// Filter by state ("pending" or "finished").
        #[arg(long)]
        state: Option<String>,
    },
    /// Show one case.
    Show {
        /// Case ID.
        id: String,
    },
    /// Edit a pending case. Only the given fields change.
    Update {
        /// Case ID.
        id: String,
        #[arg(long)]
        escritura: Option<String>,
        /// New tracking number; appended to the history.
        #[arg(long)]
        radicado: Option<String>,
        #[arg(long)]
        protocolista: Option<String>,
        #[arg(long)]
        fecha: Option<NaiveDate>,
        #[arg(long, conflicts_with = "clear_fecha_documento")]
        fecha_documento: Option<NaiveDate>,
        /// Remove the document date.
        #[arg(long)]
        clear_fecha_documento: bool,
        #[arg(long)]
        observaciones: Option<String>,
    },
    /// Delete a case and its radicado history.
    Delete {
        /// Case ID.
        id: String,
    },
    /// Append a tracking number, making it the active one.
    AddRadicado {
        /// Case ID.
        id: String,
        value: String,
    },
    /// Show every tracking number a case has had.
    History {
        /// Case ID.
        id: String,
    },
    /// Move a finished case back to pending.
    Return {
        /// Case ID.
        id: String,
    },
    /// Look a case up by tracking number.
    Info { radicado: String },
}

pub fn execute(cmd: &CaseCommands, config: &NotariaConfig) -> anyhow::Result<()> {
    let ctx = Context::open(config)?;

    match cmd {
        CaseCommands::Create {
            escritura,
            radicado,
            protocolista,
            fecha,
            fecha_documento,
            observaciones,
        } => {
            let case = ctx.manager.create_case(NewCase {
                fecha: fecha.unwrap_or_else(|| chrono::Local::now().date_naive()),
                escritura: escritura.clone(),
                fecha_documento: *fecha_documento,
                radicado: radicado.clone(),
                protocolista: protocolista.clone(),
                observaciones: observaciones.clone(),
            })?;
            println!("Case created: {}", case.case_id);
            println!("  Radicado:  {}", radicado_of(&case));
            println!("  Escritura: {}", case.escritura);
            Ok(())
        }
        CaseCommands::List { state } => list_cases(&ctx, state.as_deref()),
        CaseCommands::Show { id } => {
            let case_id = uuid::Uuid::parse_str(id)?;
            match ctx.manager.get(case_id) {
                Some(case) => {
                    print_case(&case);
                    Ok(())
                }
                None => anyhow::bail!("Case not found: {}", id),
            }
        }
        CaseCommands::Update {
            id,
            escritura,
            radicado,
            protocolista,
            fecha,
            fecha_documento,
            clear_fecha_documento,
            observaciones,
        } => {
            let case_id = uuid::Uuid::parse_str(id)?;
            let update = CaseUpdate {
                fecha: *fecha,
                escritura: escritura.clone(),
                fecha_documento: if *clear_fecha_documento {
                    Some(None)
                } else {
                    fecha_documento.map(Some)
                },
                radicado: radicado.clone(),
                protocolista: protocolista.clone(),
                observaciones: observaciones.clone(),
            };
            if update.is_empty() {
                println!("Nothing to update.");
                return Ok(());
            }
            let case = ctx.manager.update_case(case_id, &update)?;
            println!("Case updated: {}", case.case_id);
            Ok(())
        }
        CaseCommands::Delete { id } => {
            let case_id = uuid::Uuid::parse_str(id)?;
            let case = ctx.manager.delete_case(case_id)?;
            println!("Deleted case: {} (radicado {})", case_id, radicado_of(&case));
            Ok(())
        }
        CaseCommands::AddRadicado { id, value } => {
            let case_id = uuid::Uuid::parse_str(id)?;
            let case = ctx.manager.add_radicado(case_id, value)?;
            println!(
                "Active radicado for {}: {} ({} in history)",
                case_id,
                radicado_of(&case),
                case.radicados.len()
            );
            Ok(())
        }
        CaseCommands::History { id } => {
            let case_id = uuid::Uuid::parse_str(id)?;
            let history = ctx.manager.radicado_history(case_id)?;
            println!("{:<4} {:<24} {:<26}", "#", "RADICADO", "ADDED");
            println!("{}", "-".repeat(56));
            for (i, r) in history.iter().enumerate() {
                let marker = if i + 1 == history.len() { " (active)" } else { "" };
                println!(
                    "{:<4} {:<24} {:<26}{}",
                    i + 1,
                    r.value,
                    r.added_at.to_rfc3339(),
                    marker
                );
            }
            Ok(())
        }
        CaseCommands::Return { id } => {
            let case_id = uuid::Uuid::parse_str(id)?;
            let case = ctx.manager.return_to_pending(case_id)?;
            println!("Case {} returned to pending (envios {})", case_id, case.envios);
            Ok(())
        }
        CaseCommands::Info { radicado } => match ctx.manager.case_info(radicado) {
            Some(case) => {
                print_case(&case);
                Ok(())
            }
            None => anyhow::bail!("No case with radicado {}", radicado.trim()),
        },
    }
}

fn list_cases(ctx: &Context, state: Option<&str>) -> anyhow::Result<()> {
    match state {
        Some("finished") => {
            let finished = ctx.manager.list_finished();
            if finished.is_empty() {
                println!("No finished cases.");
                return Ok(());
            }
            println!(
                "{:<38} {:<16} {:<10} {:<14} {:<6} {:<26}",
                "ID", "RADICADO", "ESCRITURA", "PROTOCOLISTA", "ENVIOS", "ENVIADO"
            );
            println!("{}", "-".repeat(114));
            for f in &finished {
                println!(
                    "{:<38} {:<16} {:<10} {:<14} {:<6} {:<26}",
                    f.case.case_id,
                    truncate(radicado_of(&f.case), 16),
                    truncate(&f.case.escritura, 10),
                    truncate(&f.case.protocolista, 14),
                    f.case.envios,
                    f.hora_envio.to_rfc3339(),
                );
            }
            println!("\n{} finished case(s).", finished.len());
        }
        Some("pending") | None => {
            let cases = if state.is_some() {
                ctx.manager.list_pending()
            } else {
                ctx.manager.store().list()
            };
            if cases.is_empty() {
                println!("No cases found.");
                return Ok(());
            }
            println!(
                "{:<38} {:<16} {:<10} {:<14} {:<10} {:<6}",
                "ID", "RADICADO", "ESCRITURA", "PROTOCOLISTA", "STATE", "ENVIOS"
            );
            println!("{}", "-".repeat(98));
            for c in &cases {
                println!(
                    "{:<38} {:<16} {:<10} {:<14} {:<10} {:<6}",
                    c.case_id,
                    truncate(radicado_of(c), 16),
                    truncate(&c.escritura, 10),
                    truncate(&c.protocolista, 14),
                    c.state.to_string(),
                    c.envios,
                );
            }
            println!("\n{} case(s) total.", cases.len());
        }
        Some(other) => anyhow::bail!("Unknown state '{}': use pending or finished", other),
    }
    Ok(())
}

fn print_case(case: &Case) {
    println!("Case:         {}", case.case_id);
    println!("State:        {}", case.state);
    println!("Radicado:     {}", radicado_of(case));
    println!("Escritura:    {}", case.escritura);
    println!("Fecha:        {}", case.fecha);
    if let Some(fecha_documento) = case.fecha_documento {
        println!("Fecha doc.:   {}", fecha_documento);
    }
    println!("Protocolista: {}", case.protocolista);
    println!("Envios:       {}", case.envios);
    if !case.observaciones.is_empty() {
        println!("Observaciones: {}", case.observaciones);
    }
    if let Some(ref d) = case.last_dispatch {
        println!(
            "Last sent:    {} to {} by {}",
            d.hora_envio.to_rfc3339(),
            d.correo_enviado_a,
            d.enviado_por
        );
    }
    if case.radicados.len() > 1 {
        println!("History:      {} radicado(s)", case.radicados.len());
    }
    println!("Created:      {}", case.created_at.to_rfc3339());
    println!("Updated:      {}", case.updated_at.to_rfc3339());
}

pub(crate) fn radicado_of(case: &Case) -> &str {
    case.active_radicado().unwrap_or("-")
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project() -> (TempDir, NotariaConfig) {
        let dir = TempDir::new().unwrap();
        let config = NotariaConfig::for_project(dir.path());
        Context::open(&config)
            .unwrap()
            .manager
            .protocolists()
            .add("Ana", "ana@notaria.test")
            .unwrap();
        (dir, config)
    }

    fn create(config: &NotariaConfig, escritura: &str, radicado: &str) -> anyhow::Result<()> {
        execute(
            &CaseCommands::Create {
                escritura: escritura.to_string(),
                radicado: radicado.to_string(),
                protocolista: "Ana".to_string(),
                fecha: None,
                fecha_documento: None,
                observaciones: String::new(),
            },
            config,
        )
    }

    #[test]
    fn create_persists_across_invocations() {
        let (_dir, config) = project();
        create(&config, "10", "R-1").unwrap();

        let ctx = Context::open(&config).unwrap();
        let pending = ctx.manager.list_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].active_radicado(), Some("R-1"));
        assert!(config.events_log.exists());
    }

    #[test]
    fn duplicate_radicado_is_reported() {
        let (_dir, config) = project();
        create(&config, "10", "R-1").unwrap();
        let err = create(&config, "11", " R-1 ").unwrap_err();
        assert!(err.to_string().contains("protocolista: Ana"));
    }

    #[test]
    fn add_radicado_then_history() {
        let (_dir, config) = project();
        create(&config, "10", "R-1").unwrap();
        let id = Context::open(&config).unwrap().manager.list_pending()[0].case_id;

        execute(
            &CaseCommands::AddRadicado {
                id: id.to_string(),
                value: "R-2".to_string(),
            },
            &config,
        )
        .unwrap();
        execute(&CaseCommands::History { id: id.to_string() }, &config).unwrap();

        let ctx = Context::open(&config).unwrap();
        assert_eq!(ctx.manager.radicado_history(id).unwrap().len(), 2);
        assert_eq!(ctx.manager.case_info("R-1").unwrap().case_id, id);
    }

    #[test]
    fn update_can_clear_the_document_date() {
        let (_dir, config) = project();
        execute(
            &CaseCommands::Create {
                escritura: "10".to_string(),
                radicado: "R-1".to_string(),
                protocolista: "Ana".to_string(),
                fecha: None,
                fecha_documento: NaiveDate::from_ymd_opt(2024, 1, 15),
                observaciones: String::new(),
            },
            &config,
        )
        .unwrap();
        let id = Context::open(&config).unwrap().manager.list_pending()[0].case_id;

        execute(
            &CaseCommands::Update {
                id: id.to_string(),
                escritura: None,
                radicado: None,
                protocolista: None,
                fecha: None,
                fecha_documento: None,
                clear_fecha_documento: true,
                observaciones: Some("sin fecha".to_string()),
            },
            &config,
        )
        .unwrap();

        let case = Context::open(&config).unwrap().manager.get(id).unwrap();
        assert_eq!(case.fecha_documento, None);
        assert_eq!(case.observaciones, "sin fecha");
    }

    #[test]
    fn unknown_state_filter_is_an_error() {
        let (_dir, config) = project();
        assert!(execute(
            &CaseCommands::List {
                state: Some("archived".to_string())
            },
            &config
        )
        .is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("Notaría Quince", 10), "Notaría...");
        assert_eq!(truncate("corto", 10), "corto");
    }
}
