use anyhow::{anyhow, Result};
use clap::Subcommand;
use janus_audit::AuditEntry;
use janus_engine::FingerprintService;
use time::OffsetDateTime;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Most recent operations first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Case-insensitive search over records and security events
    Search {
        query: String,
        /// RFC 3339 lower bound
        #[arg(long)]
        since: Option<String>,
        /// RFC 3339 upper bound
        #[arg(long)]
        until: Option<String>,
    },
    /// Drop entries older than the retention period
    Cleanup {
        /// Defaults to logging.log_retention_days
        #[arg(long)]
        days: Option<u32>,
    },
}

fn parse_bound(value: Option<&str>) -> Result<Option<OffsetDateTime>> {
    value
        .map(|v| janus_core::parse_rfc3339(v).ok_or_else(|| anyhow!("not an RFC 3339 timestamp: {v}")))
        .transpose()
}

pub fn run(cmd: AuditCommands, service: &FingerprintService) -> Result<()> {
    let audit = service.audit();
    match cmd {
        AuditCommands::History { limit } => {
            for record in audit.history(limit) {
                println!(
                    "{}  {:<7} {:<8} {:<40} {}",
                    record.timestamp,
                    record.operation_type.as_str(),
                    record.risk_level.as_str(),
                    record.target,
                    record.result
                );
            }
        }
        AuditCommands::Search {
            query,
            since,
            until,
        } => {
            let start = parse_bound(since.as_deref())?;
            let end = parse_bound(until.as_deref())?;
            for entry in audit.search(&query, start, end) {
                match entry {
                    AuditEntry::Operation(record) => println!(
                        "{}  {:<7} {} {}",
                        record.timestamp,
                        record.operation_type.as_str(),
                        record.target,
                        record.result
                    ),
                    AuditEntry::Security(event) => println!(
                        "{}  security {} {}",
                        event.timestamp, event.security_event_type, event.details
                    ),
                }
            }
        }
        AuditCommands::Cleanup { days } => {
            let days = days.unwrap_or(service.logging().log_retention_days);
            println!("{} entries removed", audit.cleanup_old_logs(days)?);
        }
    }
    Ok(())
}
