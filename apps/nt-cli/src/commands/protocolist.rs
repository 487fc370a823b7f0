// protocolist.rs - Protocolist subcommands: add, list, update, remove.

use clap::Subcommand;
use nt_case::ProtocolistRegistry;
use nt_lifecycle::NotariaConfig;

#[derive(Subcommand)]
pub enum ProtocolistCommands {
    /// Register a protocolist.
    Add {
        nombre: String,
        /// Address dispatch notifications are sent to.
        correo_electronico: String,
    },
    /// List protocolists by name.
    List,
    /// Change a protocolist's name and address.
    Update {
        /// Protocolist ID.
        id: String,
        nombre: String,
        correo_electronico: String,
    },
    /// Remove a protocolist. Cases keep the name they were assigned.
    Remove {
        /// Protocolist ID.
        id: String,
    },
}

pub fn execute(cmd: &ProtocolistCommands, config: &NotariaConfig) -> anyhow::Result<()> {
    let registry = ProtocolistRegistry::open(&config.protocolists_file)?;

    match cmd {
        ProtocolistCommands::Add {
            nombre,
            correo_electronico,
        } => {
            let p = registry.add(nombre.as_str(), correo_electronico.as_str())?;
            println!("Protocolist added: {} ({})", p.nombre, p.id);
        }
        ProtocolistCommands::List => {
            let all = registry.list();
            if all.is_empty() {
                println!("No protocolists registered.");
                return Ok(());
            }
            println!("{:<38} {:<24} {:<30}", "ID", "NOMBRE", "CORREO");
            println!("{}", "-".repeat(92));
            for p in &all {
                println!(
                    "{:<38} {:<24} {:<30}",
                    p.id,
                    super::case::truncate(&p.nombre, 24),
                    p.correo_electronico
                );
            }
            println!("\n{} protocolist(s).", all.len());
        }
        ProtocolistCommands::Update {
            id,
            nombre,
            correo_electronico,
        } => {
            let id = uuid::Uuid::parse_str(id)?;
            let p = registry.update(id, nombre.as_str(), correo_electronico.as_str())?;
            println!("Protocolist updated: {} <{}>", p.nombre, p.correo_electronico);
        }
        ProtocolistCommands::Remove { id } => {
            let parsed = uuid::Uuid::parse_str(id)?;
            if !registry.remove(parsed)? {
                anyhow::bail!("Protocolist not found: {}", id);
            }
            println!("Removed protocolist: {}", id);
        }
    }
    Ok(())
}
