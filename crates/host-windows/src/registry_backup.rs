//! JSON snapshots of single registry keys, taken before a key is edited.

use crate::registry::{RegistryAccess, RegistryValue};
use janus_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryBackup {
    pub backup_id: String,
    pub timestamp: String,
    pub registry_path: String,
    pub values: Vec<RegistryValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryBackupSummary {
    pub backup_id: String,
    pub timestamp: String,
    pub registry_path: String,
    pub value_count: usize,
    pub file_size: u64,
}

#[derive(Clone)]
pub struct RegistryBackupStore {
    dir: PathBuf,
    registry: Arc<dyn RegistryAccess>,
}

fn backup_err(context: &str, err: impl std::fmt::Display) -> Error {
    Error::Backup(format!("{context}: {err}"))
}

impl RegistryBackupStore {
    /// Files go to `<backup_dir>/registry/`.
    pub fn new(backup_dir: impl AsRef<Path>, registry: Arc<dyn RegistryAccess>) -> Result<Self> {
        let dir = backup_dir.as_ref().join("registry");
        fs::create_dir_all(&dir).map_err(|e| backup_err("create registry backup dir", e))?;
        Ok(Self { dir, registry })
    }

    fn file_for(&self, backup_id: &str) -> PathBuf {
        self.dir.join(format!("{backup_id}.json"))
    }

    /// Ids look like `registry_<YYYYmmdd>_<HHMMSS>_<hex8>`.
    pub fn is_valid_id(backup_id: &str) -> bool {
        let Some(rest) = backup_id.strip_prefix("registry_") else {
            return false;
        };
        let parts: Vec<&str> = rest.split('_').collect();
        match parts.as_slice() {
            [date, clock, suffix] => {
                date.len() == 8
                    && clock.len() == 6
                    && !suffix.is_empty()
                    && date.chars().chain(clock.chars()).all(|c| c.is_ascii_digit())
                    && suffix.chars().all(|c| c.is_ascii_hexdigit())
            }
            _ => false,
        }
    }

    pub fn backup_key(&self, registry_path: &str) -> Result<String> {
        let now = OffsetDateTime::now_utc();
        let backup_id = format!(
            "registry_{}_{}",
            janus_core::compact_stamp(now),
            janus_core::short_id()
        );
        let values = self
            .registry
            .enumerate_values(registry_path)
            .map_err(|e| backup_err(registry_path, e))?;

        let backup = RegistryBackup {
            backup_id: backup_id.clone(),
            timestamp: janus_core::format_rfc3339(now),
            registry_path: registry_path.to_string(),
            values,
        };
        let json = serde_json::to_vec_pretty(&backup)?;
        fs::write(self.file_for(&backup_id), json)
            .map_err(|e| backup_err("write registry backup", e))?;

        tracing::info!(
            backup_id = %backup_id,
            path = registry_path,
            values = backup.values.len(),
            "registry key backed up"
        );
        Ok(backup_id)
    }

    pub fn load(&self, backup_id: &str) -> Result<RegistryBackup> {
        if !Self::is_valid_id(backup_id) {
            return Err(Error::Restore(format!("invalid registry backup id: {backup_id}")));
        }
        let path = self.file_for(backup_id);
        let raw = fs::read(&path)
            .map_err(|e| Error::Restore(format!("registry backup {backup_id}: {e}")))?;
        serde_json::from_slice(&raw)
            .map_err(|e| Error::Restore(format!("registry backup {backup_id} unreadable: {e}")))
    }

    /// Writes every captured value back and returns how many were restored.
    /// Any value that cannot be written turns the whole call into a `Restore`
    /// error naming the failed values; the others are still attempted.
    pub fn restore(&self, backup_id: &str) -> Result<usize> {
        let backup = self.load(backup_id)?;
        let mut restored = 0;
        let mut failed = Vec::new();
        for value in &backup.values {
            match self.registry.write_value(&backup.registry_path, value) {
                Ok(()) => restored += 1,
                Err(err) => {
                    tracing::warn!(name = %value.name, error = %err, "registry value not restored");
                    failed.push(format!("{} ({err})", value.name));
                }
            }
        }
        if !failed.is_empty() {
            return Err(Error::Restore(format!(
                "registry backup {backup_id}: {restored} of {} values restored; failed: {}",
                backup.values.len(),
                failed.join(", ")
            )));
        }
        tracing::info!(backup_id, restored, "registry backup restored");
        Ok(restored)
    }

    /// Newest first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<RegistryBackupSummary>> {
        let mut summaries = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| backup_err("list registry backups", e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| {
                    serde_json::from_slice::<RegistryBackup>(&raw).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(backup) => summaries.push(RegistryBackupSummary {
                    backup_id: backup.backup_id,
                    timestamp: backup.timestamp,
                    registry_path: backup.registry_path,
                    value_count: backup.values.len(),
                    file_size: entry.metadata().map(|m| m.len()).unwrap_or(0),
                }),
                Err(err) => {
                    tracing::warn!(file = %path.display(), error = %err, "skipping registry backup")
                }
            }
        }
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }

    /// `Ok(false)` when the id is malformed or no such backup exists.
    pub fn delete(&self, backup_id: &str) -> Result<bool> {
        if !Self::is_valid_id(backup_id) {
            tracing::warn!(backup_id, "refusing malformed registry backup id");
            return Ok(false);
        }
        let path = self.file_for(backup_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| backup_err("delete registry backup", e))?;
        tracing::info!(backup_id, "registry backup deleted");
        Ok(true)
    }

    /// Keeps the newest `max_backups`; returns how many were removed.
    pub fn cleanup(&self, max_backups: usize) -> Result<usize> {
        let mut removed = 0;
        for stale in self.list()?.into_iter().skip(max_backups) {
            if self.delete(&stale.backup_id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
