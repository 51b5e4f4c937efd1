use crate::{gate, print_progress, Confirm};
use anyhow::{anyhow, Result};
use clap::Subcommand;
use janus_backup::{BackupScope, BackupSection};
use janus_core::RiskLevel;
use janus_engine::{spawn_backup, FingerprintService};
use std::sync::Arc;

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Snapshot the current fingerprint
    Create {
        /// Sections to store (system_info, network_config, hardware_info); all when omitted
        #[arg(long, value_delimiter = ',')]
        sections: Vec<String>,

        #[arg(long, default_value = "")]
        description: String,
    },
    List,
    Show { id: String },
    /// Recompute item checksums
    Verify { id: String },
    Restore {
        id: String,
        /// network_config and/or machine_guid; everything when omitted
        #[arg(long, value_delimiter = ',')]
        items: Vec<String>,
        #[command(flatten)]
        confirm: Confirm,
    },
    Delete {
        id: String,
        #[command(flatten)]
        confirm: Confirm,
    },
    /// Keep only the newest backups
    Cleanup {
        /// Defaults to security.max_backup_count
        #[arg(long)]
        keep: Option<usize>,
    },
}

#[derive(Subcommand)]
pub enum RegistryCommands {
    List,
    Restore {
        id: String,
        #[command(flatten)]
        confirm: Confirm,
    },
    Delete { id: String },
    Cleanup {
        #[arg(long, default_value_t = 10)]
        keep: usize,
    },
}

pub fn run(cmd: BackupCommands, service: &Arc<FingerprintService>) -> Result<()> {
    let backups = service.backups();
    match cmd {
        BackupCommands::Create {
            sections,
            description,
        } => {
            let scope = if sections.is_empty() {
                BackupScope::Full
            } else {
                BackupScope::Selective(
                    sections
                        .iter()
                        .map(|s| s.parse::<BackupSection>())
                        .collect::<janus_core::Result<_>>()?,
                )
            };
            let info = spawn_backup(service.clone(), scope, description)?.wait_with(print_progress)?;
            println!("{} ({} bytes)", info.backup_id, info.total_size);
        }
        BackupCommands::List => {
            for info in backups.list_backups()? {
                println!(
                    "{:<42} {:<20} {:<9} {:>8}  {}",
                    info.backup_id,
                    info.timestamp_readable,
                    info.backup_type.as_str(),
                    info.total_size,
                    info.description
                );
            }
        }
        BackupCommands::Show { id } => {
            println!("{}", serde_json::to_string_pretty(&backups.get_backup(&id)?)?);
        }
        BackupCommands::Verify { id } => {
            if backups.verify_backup(&id)? {
                println!("{id}: intact");
            } else {
                return Err(anyhow!("{id}: checksum mismatch"));
            }
        }
        BackupCommands::Restore { id, items, confirm } => {
            gate::require(service, confirm, RiskLevel::Medium)?;
            let items = (!items.is_empty()).then_some(items);
            match service.restore_backup(&id, items.as_deref()) {
                Ok(_) => println!("{id} restored"),
                Err(err) => {
                    gate::report_rejection(RiskLevel::Medium, &[err.to_string()], err.guidance());
                    return Err(err.into());
                }
            }
        }
        BackupCommands::Delete { id, confirm } => {
            gate::require(service, confirm, RiskLevel::Low)?;
            if backups.delete_backup(&id)? {
                println!("{id} deleted");
            } else {
                return Err(anyhow!("no backup named {id}"));
            }
        }
        BackupCommands::Cleanup { keep } => {
            let keep = keep.unwrap_or(service.security().max_backup_count);
            println!("{} backups removed", backups.cleanup_old(keep)?);
        }
    }
    Ok(())
}

pub fn run_registry(cmd: RegistryCommands, service: &FingerprintService) -> Result<()> {
    let store = service
        .registry_backups()
        .ok_or_else(|| anyhow!("registry backups exist only on Windows"))?;
    match cmd {
        RegistryCommands::List => {
            for summary in store.list()? {
                println!(
                    "{:<36} {:<26} {:>3} values  {}",
                    summary.backup_id, summary.timestamp, summary.value_count, summary.registry_path
                );
            }
        }
        RegistryCommands::Restore { id, confirm } => {
            gate::require(service, confirm, RiskLevel::High)?;
            let restored = service.restore_registry_backup(&id)?;
            println!("{restored} values restored from {id}");
        }
        RegistryCommands::Delete { id } => {
            if !service.delete_registry_backup(&id)? {
                return Err(anyhow!("no registry backup named {id}"));
            }
            println!("{id} deleted");
        }
        RegistryCommands::Cleanup { keep } => {
            println!("{} registry backups removed", store.cleanup(keep)?);
        }
    }
    Ok(())
}
