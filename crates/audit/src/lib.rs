//! Append-only audit trail in JSON Lines, one record per line.
//!
//! Writes never fail the caller: an I/O problem is reported through
//! `tracing::error!` and the record is dropped.

use janus_core::{format_rfc3339, parse_rfc3339, OperationRecord, OperationType, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use time::{Duration, OffsetDateTime};

pub const AUDIT_FILE: &str = "audit.log";

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub log_dir: PathBuf,
    pub max_log_size: u64,
    pub max_log_files: usize,
    pub enabled: bool,
}

impl AuditConfig {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            max_log_size: 10 * 1024 * 1024,
            max_log_files: 5,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Always `security_event`.
    pub event_type: String,
    pub security_event_type: String,
    pub timestamp: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub details: Value,
}

/// One parsed line of the trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuditEntry {
    Security(SecurityEvent),
    Operation(OperationRecord),
}

impl AuditEntry {
    pub fn timestamp(&self) -> &str {
        match self {
            AuditEntry::Security(event) => &event.timestamp,
            AuditEntry::Operation(record) => &record.timestamp,
        }
    }
}

pub struct AuditLogger {
    config: AuditConfig,
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLogger {
    pub fn new(config: AuditConfig) -> Result<Self> {
        fs::create_dir_all(&config.log_dir)?;
        let path = config.log_dir.join(AUDIT_FILE);
        Ok(Self {
            config,
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_operation(&self, record: &OperationRecord) {
        self.append(record, "operation");
    }

    pub fn log_security_event(&self, kind: &str, details: Value) {
        let event = SecurityEvent {
            event_type: "security_event".to_string(),
            security_event_type: kind.to_string(),
            timestamp: janus_core::now_utc_rfc3339(),
            user: janus_core::current_user(),
            details,
        };
        self.append(&event, "security event");
    }

    fn append<T: Serialize>(&self, entry: &T, what: &str) {
        if !self.config.enabled {
            return;
        }
        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(err) => {
                tracing::error!(error = %err, "audit {what} not serializable");
                return;
            }
        };
        let _guard = self.lock.lock();
        if let Err(err) = self.write_line(&line) {
            tracing::error!(error = %err, file = %self.path.display(), "audit {what} not written");
        }
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let current = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if current > 0 && current + line.len() as u64 + 1 > self.config.max_log_size {
            self.rotate()?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }

    /// `audit.log` -> `audit.log.1` -> ... -> `audit.log.<max_log_files>`; the
    /// oldest file falls off the end.
    fn rotate(&self) -> std::io::Result<()> {
        let max = self.config.max_log_files.max(1);
        let rotated = |n: usize| self.config.log_dir.join(format!("{AUDIT_FILE}.{n}"));
        let oldest = rotated(max);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..max).rev() {
            let from = rotated(n);
            if from.exists() {
                fs::rename(&from, rotated(n + 1))?;
            }
        }
        fs::rename(&self.path, rotated(1))?;
        tracing::debug!(file = %self.path.display(), "audit log rotated");
        Ok(())
    }

    /// Oldest file first, the active file last.
    fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = (1..=self.config.max_log_files.max(1))
            .rev()
            .map(|n| self.config.log_dir.join(format!("{AUDIT_FILE}.{n}")))
            .filter(|p| p.exists())
            .collect();
        if self.path.exists() {
            files.push(self.path.clone());
        }
        files
    }

    /// Raw lines in write order. Unreadable files are skipped.
    fn lines(&self) -> Vec<String> {
        let _guard = self.lock.lock();
        let mut lines = Vec::new();
        for path in self.files() {
            match File::open(&path) {
                Ok(file) => lines.extend(read_lines(BufReader::new(file), &path)),
                Err(err) => {
                    tracing::warn!(file = %path.display(), error = %err, "audit file unreadable")
                }
            }
        }
        lines
    }

    /// Operation records, newest first.
    pub fn history(&self, limit: usize) -> Vec<OperationRecord> {
        self.lines()
            .iter()
            .rev()
            .filter_map(|line| match serde_json::from_str::<AuditEntry>(line) {
                Ok(AuditEntry::Operation(record)) => Some(record),
                _ => None,
            })
            .take(limit)
            .collect()
    }

    /// Case-insensitive substring match on the raw line, optionally bounded in
    /// time. Results are in write order.
    pub fn search(
        &self,
        query: &str,
        start: Option<OffsetDateTime>,
        end: Option<OffsetDateTime>,
    ) -> Vec<AuditEntry> {
        let needle = query.to_lowercase();
        self.lines()
            .iter()
            .filter(|line| line.to_lowercase().contains(&needle))
            .filter_map(|line| serde_json::from_str::<AuditEntry>(line).ok())
            .filter(|entry| {
                let Some(at) = parse_rfc3339(entry.timestamp()) else {
                    return start.is_none() && end.is_none();
                };
                start.map_or(true, |s| at >= s) && end.map_or(true, |e| at <= e)
            })
            .collect()
    }

    /// Drops active-file entries older than `retention_days`. Lines without a
    /// readable timestamp are kept. Returns how many entries were removed.
    pub fn cleanup_old_logs(&self, retention_days: u32) -> Result<usize> {
        let started = Instant::now();
        let cutoff = OffsetDateTime::now_utc() - Duration::days(i64::from(retention_days));

        let removed = {
            let _guard = self.lock.lock();
            if !self.path.exists() {
                0
            } else {
                let file = File::open(&self.path)?;
                let mut kept = String::new();
                let mut removed = 0;
                for line in read_lines(BufReader::new(file), &self.path) {
                    if line_timestamp(&line).is_some_and(|at| at < cutoff) {
                        removed += 1;
                    } else {
                        kept.push_str(&line);
                        kept.push('\n');
                    }
                }
                fs::write(&self.path, kept)?;
                removed
            }
        };

        tracing::info!(removed, retention_days, "audit log cleaned");
        let record = OperationRecord::new(OperationType::Delete, self.path.display().to_string())
            .with_parameter("retention_days", retention_days)
            .with_parameter("cutoff", format_rfc3339(cutoff))
            .with_parameter("removed_entries", removed)
            .finish("success", started);
        self.log_operation(&record);
        Ok(removed)
    }
}

/// Splits on `\n` without requiring UTF-8; invalid bytes are replaced so one
/// damaged line never hides the records after it.
fn read_lines(reader: impl BufRead, path: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for chunk in reader.split(b'\n') {
        match chunk {
            Ok(mut bytes) => {
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
                lines.push(String::from_utf8_lossy(&bytes).into_owned());
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "audit file read interrupted");
                break;
            }
        }
    }
    lines
}

fn line_timestamp(line: &str) -> Option<OffsetDateTime> {
    let value: Value = serde_json::from_str(line).ok()?;
    parse_rfc3339(value.get("timestamp")?.as_str()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn logger(dir: &Path) -> AuditLogger {
        AuditLogger::new(AuditConfig::new(dir)).unwrap()
    }

    fn record(target: &str) -> OperationRecord {
        OperationRecord::new(OperationType::Modify, target).finish("success", Instant::now())
    }

    #[test]
    fn history_is_newest_first_and_skips_events() {
        let tmp = tempfile::tempdir().unwrap();
        let log = logger(tmp.path());
        log.log_operation(&record("first"));
        log.log_security_event("permission_denied", json!({"operation": "modify_mac"}));
        log.log_operation(&record("second"));

        let history = log.history(10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].target, "second");
        assert_eq!(log.history(1).len(), 1);
    }

    #[test]
    fn malformed_lines_are_tolerated() {
        let tmp = tempfile::tempdir().unwrap();
        let log = logger(tmp.path());
        log.log_operation(&record("ok"));
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        writeln!(file, "{{not json").unwrap();
        log.log_operation(&record("ok again"));

        assert_eq!(log.history(10).len(), 2);
        assert_eq!(log.search("ok", None, None).len(), 2);
    }

    #[test]
    fn invalid_utf8_line_does_not_hide_later_records() {
        let tmp = tempfile::tempdir().unwrap();
        let log = logger(tmp.path());
        log.log_operation(&record("before"));
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(b"\xff\xfe garbage\n").unwrap();
        log.log_operation(&record("after"));

        let history = log.history(10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].target, "after");
        assert_eq!(log.search("after", None, None).len(), 1);

        assert_eq!(log.cleanup_old_logs(30).unwrap(), 0);
        assert_eq!(log.history(10).len(), 3);
    }

    #[test]
    fn concurrent_appends_stay_whole() {
        let tmp = tempfile::tempdir().unwrap();
        let log = std::sync::Arc::new(logger(tmp.path()));
        let threads = 8;
        let per_thread = 50;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for n in 0..per_thread {
                        log.log_operation(&record(&format!("t{t}-{n}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), threads * per_thread);
        for line in lines {
            assert!(matches!(
                serde_json::from_str::<AuditEntry>(line),
                Ok(AuditEntry::Operation(_))
            ));
        }
    }

    #[test]
    fn search_matches_events_and_respects_time_range() {
        let tmp = tempfile::tempdir().unwrap();
        let log = logger(tmp.path());
        log.log_security_event("backup_deleted", json!({"backup_id": "fingerprint_x"}));
        log.log_operation(&record("eth0"));

        let hits = log.search("BACKUP_DELETED", None, None);
        assert_eq!(hits.len(), 1);
        assert!(matches!(&hits[0], AuditEntry::Security(e) if e.security_event_type == "backup_deleted"));

        let future = OffsetDateTime::now_utc() + Duration::hours(1);
        assert!(log.search("", Some(future), None).is_empty());
        assert_eq!(log.search("", None, Some(future)).len(), 2);
    }

    #[test]
    fn disabled_logger_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AuditConfig::new(tmp.path());
        config.enabled = false;
        let log = AuditLogger::new(config).unwrap();
        log.log_operation(&record("eth0"));
        assert!(!log.path().exists());
    }

    #[test]
    fn rotates_at_size_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AuditConfig::new(tmp.path());
        config.max_log_size = 600;
        config.max_log_files = 2;
        let log = AuditLogger::new(config).unwrap();
        for n in 0..12 {
            log.log_operation(&record(&format!("target-{n}")));
        }
        assert!(tmp.path().join("audit.log.1").exists());
        assert!(!tmp.path().join("audit.log.3").exists());
        assert_eq!(log.history(1)[0].target, "target-11");
    }

    #[test]
    fn cleanup_drops_old_entries_and_logs_itself() {
        let tmp = tempfile::tempdir().unwrap();
        let log = logger(tmp.path());
        let mut old = record("ancient");
        old.timestamp = "2001-01-01T00:00:00Z".to_string();
        log.log_operation(&old);
        log.log_operation(&record("recent"));
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        writeln!(file, "garbage line").unwrap();

        assert_eq!(log.cleanup_old_logs(30).unwrap(), 1);
        let content = fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("garbage line"));
        assert!(!content.contains("ancient"));
        let history = log.history(10);
        assert_eq!(history[0].operation_type, OperationType::Delete);
        assert_eq!(history[1].target, "recent");
    }
}
