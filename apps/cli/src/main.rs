//! janus command-line front end.

mod audit;
mod backup;
mod gate;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use janus_config::Config;
use janus_core::mac;
use janus_core::{ChangeSet, RiskLevel};
use janus_engine::{spawn_apply, spawn_snapshot, FingerprintService};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "janus")]
#[command(author, version, about = "Inspect and change machine fingerprint attributes", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// User configuration file (defaults to config/user_config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy, Default)]
pub struct Confirm {
    /// Confirm the change
    #[arg(short, long)]
    yes: bool,

    /// Accept high-risk changes
    #[arg(long)]
    force: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Platform, system and capability summary
    Info,

    /// List network adapters
    Adapters {
        #[arg(long)]
        json: bool,
    },

    /// Print a random locally administered unicast MAC
    RandomMac {
        /// Vendor prefix, e.g. 00:1A:2B
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Set an adapter's MAC address (`random` picks one)
    ModifyMac {
        adapter: String,
        mac: String,
        #[command(flatten)]
        confirm: Confirm,
    },

    /// Clear an adapter's MAC override
    RestoreMac {
        adapter: String,
        #[command(flatten)]
        confirm: Confirm,
    },

    /// Machine GUID / hardware UUID
    #[command(subcommand)]
    Guid(GuidCommands),

    /// Volume serials / filesystem ids
    Volumes,

    /// Full fingerprint as JSON
    Snapshot,

    /// Validate a change set without applying it
    Validate { changes: PathBuf },

    /// Validate, back up and apply a change set
    Apply {
        changes: PathBuf,
        #[command(flatten)]
        confirm: Confirm,
    },

    /// Fingerprint backups
    #[command(subcommand)]
    Backup(backup::BackupCommands),

    /// Registry key snapshots (Windows)
    #[command(subcommand)]
    RegistryBackup(backup::RegistryCommands),

    /// Audit trail
    #[command(subcommand)]
    Audit(audit::AuditCommands),

    /// Read or change configuration values
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum GuidCommands {
    Get,
    /// Set the machine GUID (`random` generates one)
    Set {
        value: String,
        #[command(flatten)]
        confirm: Confirm,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    Get { key: String },
    /// Values are parsed as JSON when possible, otherwise stored as text
    Set { key: String, value: String },
}

fn init_logging(verbose: bool, configured: &str) {
    let level = if verbose {
        "debug".to_string()
    } else {
        configured.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load_standard(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.log_level());
    if let Err(err) = config.validate() {
        tracing::warn!(error = %err, "configuration incomplete; defaults apply");
    }

    match cli.command {
        Commands::Config(cmd) => run_config(cmd, &mut config),
        Commands::RandomMac { prefix } => {
            println!("{}", mac::generate_random_mac(prefix.as_deref())?);
            Ok(())
        }
        command => {
            let binding = janus_engine::select(&config.backup().backup_directory)?;
            let service = Arc::new(FingerprintService::new(binding, &config)?);
            run(command, service)
        }
    }
}

fn run(command: Commands, service: Arc<FingerprintService>) -> Result<()> {
    match command {
        Commands::Info => info(&service),
        Commands::Adapters { json } => adapters(&service, json),
        Commands::ModifyMac {
            adapter,
            mac: new_mac,
            confirm,
        } => {
            let new_mac = if new_mac.eq_ignore_ascii_case("random") {
                mac::generate_random_mac(None)?
            } else {
                new_mac
            };
            let changes = ChangeSet {
                mac_changes: BTreeMap::from([(adapter, new_mac)]),
                ..ChangeSet::default()
            };
            apply(service, changes, confirm)
        }
        Commands::RestoreMac { adapter, confirm } => {
            gate::require(&service, confirm, RiskLevel::Medium)?;
            service.restore_mac(&adapter)?;
            println!("MAC override cleared for {adapter}");
            Ok(())
        }
        Commands::Guid(GuidCommands::Get) => {
            let identity = service.engine().get_machine_identity()?;
            println!("{}", identity.value);
            if !identity.mutable {
                println!("(read-only on {})", service.platform());
            }
            Ok(())
        }
        Commands::Guid(GuidCommands::Set { value, confirm }) => {
            let value = if value.eq_ignore_ascii_case("random") {
                uuid::Uuid::new_v4().to_string()
            } else {
                value
            };
            let changes = ChangeSet {
                machine_identity: Some(value),
                ..ChangeSet::default()
            };
            apply(service, changes, confirm)
        }
        Commands::Volumes => {
            let volumes = service.engine().get_volume_identities()?;
            for (volume, serial) in &volumes.volumes {
                println!("{volume:<24} {serial}");
            }
            Ok(())
        }
        Commands::Snapshot => {
            let snapshot = spawn_snapshot(service)?.wait_with(print_progress)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        Commands::Validate { changes } => {
            let changes = load_changes(&changes)?;
            let result = service.validate(&changes);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::Apply { changes, confirm } => apply(service, load_changes(&changes)?, confirm),
        Commands::Backup(cmd) => backup::run(cmd, &service),
        Commands::RegistryBackup(cmd) => backup::run_registry(cmd, &service),
        Commands::Audit(cmd) => audit::run(cmd, &service),
        // both run in `main` without a platform engine
        Commands::RandomMac { .. } | Commands::Config(_) => Ok(()),
    }
}

fn info(service: &FingerprintService) -> Result<()> {
    let system = service.engine().system_info();
    let permissions = service.permissions();
    let mut summary = serde_json::json!({
        "platform": service.platform(),
        "system_info": system,
        "capabilities": service.capabilities().as_map(),
        "user": permissions.current_user(),
        "has_admin": permissions.has_admin(),
        "can_elevate": permissions.can_elevate(),
    });
    for (mechanism, status) in permissions.protection_status() {
        summary[mechanism.as_str()] = status;
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn adapters(service: &FingerprintService, json: bool) -> Result<()> {
    let adapters = service.list_adapters()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&adapters)?);
        return Ok(());
    }
    for adapter in adapters {
        println!(
            "{:<40} {:<17} {:<9} {:<9} {}{}",
            adapter.id,
            adapter.mac_address,
            adapter.adapter_type.as_str(),
            adapter.status,
            adapter.name,
            if adapter.can_modify { "" } else { " (read-only)" }
        );
    }
    Ok(())
}

fn load_changes(path: &PathBuf) -> Result<ChangeSet> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_progress(percent: u8, message: &str) {
    eprintln!("[{percent:>3}%] {message}");
}

fn apply(service: Arc<FingerprintService>, changes: ChangeSet, confirm: Confirm) -> Result<()> {
    let validation = service.validate(&changes);
    if !validation.is_valid {
        gate::report_rejection(validation.risk_level, &validation.errors, None);
        return Err(anyhow!("change set rejected"));
    }
    for warning in &validation.warnings {
        eprintln!("warning: {warning}");
    }
    gate::require(&service, confirm, validation.risk_level)?;

    let job = spawn_apply(service, changes)?;
    let outcome = match job.wait_with(print_progress) {
        Ok(outcome) => outcome,
        Err(err) => {
            let errors = match &err {
                janus_core::Error::Validation { errors, .. } => errors.clone(),
                other => vec![other.to_string()],
            };
            gate::report_rejection(validation.risk_level, &errors, err.guidance());
            return Err(err.into());
        }
    };

    println!("backup: {}", outcome.backup_id);
    for (item, result) in &outcome.results {
        match &result.error {
            None => println!("{item}: ok"),
            Some(error) => println!("{item}: FAILED ({error})"),
        }
    }
    if outcome.all_succeeded() {
        Ok(())
    } else {
        Err(anyhow!(
            "some changes failed; restore with `janus backup restore {}`",
            outcome.backup_id
        ))
    }
}

fn run_config(cmd: ConfigCommands, config: &mut Config) -> Result<()> {
    match cmd {
        ConfigCommands::Get { key } => {
            let value = config
                .get_value(&key)
                .ok_or_else(|| anyhow!("no such key: {key}"))?;
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            let parsed = serde_json::from_str::<serde_json::Value>(&value)
                .unwrap_or(serde_json::Value::String(value));
            config.set(&key, parsed)?;
            config.save()?;
            println!("{key} updated");
            Ok(())
        }
    }
}
