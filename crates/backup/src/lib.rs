//! Fingerprint backups: one JSON artifact per backup under the backup
//! directory, plus restore of the recorded values.

pub mod artifact;

pub use artifact::{
    AdapterRecord, BackupInfo, BackupItem, BackupScope, BackupSection, BackupType, HardwareInfo,
    NetworkConfig,
};

use janus_audit::AuditLogger;
use janus_core::mac::same_mac;
use janus_core::{
    Capabilities, Error, FingerprintEngine, OperationRecord, OperationType, Result, RiskLevel,
};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

/// Restorable item names accepted by `restore_backup`.
pub const RESTORE_NETWORK: &str = "network_config";
pub const RESTORE_MACHINE_GUID: &str = "machine_guid";

pub struct BackupManager {
    dir: PathBuf,
    max_backup_size: u64,
    engine: Arc<dyn FingerprintEngine>,
    capabilities: Capabilities,
    audit: Arc<AuditLogger>,
}

fn backup_io(context: &str, err: impl std::fmt::Display) -> Error {
    Error::Backup(format!("{context}: {err}"))
}

fn valid_id(backup_id: &str) -> bool {
    !backup_id.is_empty()
        && backup_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl BackupManager {
    pub fn new(
        dir: impl Into<PathBuf>,
        max_backup_size: u64,
        engine: Arc<dyn FingerprintEngine>,
        capabilities: Capabilities,
        audit: Arc<AuditLogger>,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| backup_io("create backup dir", e))?;
        Ok(Self {
            dir,
            max_backup_size,
            engine,
            capabilities,
            audit,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, backup_id: &str) -> PathBuf {
        self.dir.join(format!("{backup_id}.json"))
    }

    pub fn create_backup(&self, scope: &BackupScope, description: &str) -> Result<BackupInfo> {
        self.create_backup_with(scope, description, &mut |_, _| {})
    }

    /// `progress` receives `(percent, message)` in increasing order.
    pub fn create_backup_with(
        &self,
        scope: &BackupScope,
        description: &str,
        progress: &mut dyn FnMut(u8, &str),
    ) -> Result<BackupInfo> {
        let started = Instant::now();
        let now = OffsetDateTime::now_utc();
        let backup_id = format!(
            "fingerprint_{}_{}",
            janus_core::compact_stamp(now),
            janus_core::short_id()
        );

        progress(10, "collecting system information");
        let mut info = BackupInfo {
            backup_id: backup_id.clone(),
            timestamp: janus_core::format_rfc3339(now),
            timestamp_readable: janus_core::readable_stamp(now),
            backup_type: scope.kind(),
            schema_version: janus_core::BACKUP_SCHEMA_VERSION.to_string(),
            platform: self.engine.platform(),
            description: description.to_string(),
            system_info: self.engine.system_info(),
            network_config: None,
            hardware_info: None,
            items: Vec::new(),
            total_size: 0,
        };

        if scope.includes(BackupSection::NetworkConfig) {
            progress(30, "reading network adapters");
            let adapters = self
                .engine
                .list_adapters()
                .map_err(|e| backup_io("read network adapters", e))?;
            info.network_config = Some(NetworkConfig {
                adapters: adapters.iter().map(AdapterRecord::from).collect(),
            });
        }

        if scope.includes(BackupSection::HardwareInfo) {
            progress(55, "reading hardware identifiers");
            info.hardware_info = Some(self.collect_hardware());
        }

        progress(80, "writing backup");
        info.seal()?;
        if info.total_size > self.max_backup_size {
            return Err(Error::Backup(format!(
                "backup of {} bytes exceeds the {} byte limit",
                info.total_size, self.max_backup_size
            )));
        }
        let json = serde_json::to_vec_pretty(&info)?;
        fs::write(self.file_for(&backup_id), json).map_err(|e| backup_io("write backup", e))?;

        tracing::info!(backup_id = %backup_id, total_size = info.total_size, "backup created");
        let record = OperationRecord::new(OperationType::Backup, "fingerprint")
            .with_parameter("backup_type", json!(info.backup_type))
            .with_parameter("total_size", info.total_size)
            .with_backup(Some(backup_id.as_str()))
            .finish("success", started);
        self.audit.log_operation(&record);
        progress(100, "backup complete");
        Ok(info)
    }

    fn collect_hardware(&self) -> HardwareInfo {
        let machine_guid = match self.engine.get_machine_identity() {
            Ok(identity) => Some(identity.value),
            Err(err) => {
                tracing::warn!(error = %err, "machine identity not backed up");
                None
            }
        };
        let volume_serials = match self.engine.get_volume_identities() {
            Ok(volumes) => volumes.volumes,
            Err(err) => {
                tracing::warn!(error = %err, "volume identities not backed up");
                Default::default()
            }
        };
        let hardware_details = self.engine.hardware_info().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "hardware details not backed up");
            Value::Null
        });
        HardwareInfo {
            machine_guid,
            volume_serials,
            hardware_details,
        }
    }

    pub fn get_backup(&self, backup_id: &str) -> Result<BackupInfo> {
        if !valid_id(backup_id) {
            return Err(Error::Backup(format!("invalid backup id: {backup_id}")));
        }
        let path = self.file_for(backup_id);
        let raw = fs::read(&path).map_err(|e| backup_io(&format!("backup {backup_id}"), e))?;
        serde_json::from_slice(&raw)
            .map_err(|e| Error::Backup(format!("backup {backup_id} unreadable: {e}")))
    }

    /// True when every item checksum still matches its section.
    pub fn verify_backup(&self, backup_id: &str) -> Result<bool> {
        let info = self.get_backup(backup_id)?;
        let corrupted = info.corrupted_items()?;
        if corrupted.is_empty() {
            Ok(true)
        } else {
            tracing::warn!(backup_id, ?corrupted, "backup checksum mismatch");
            Ok(false)
        }
    }

    /// Newest first. Files that fail to parse are skipped.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| backup_io("list backups", e))?;
        let mut backups = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_slice::<BackupInfo>(&raw).map_err(|e| e.to_string()));
            match parsed {
                Ok(info) => backups.push(info),
                Err(err) => tracing::warn!(file = %path.display(), error = %err, "skipping backup file"),
            }
        }
        backups.sort_by_key(|info| std::cmp::Reverse(janus_core::parse_rfc3339(&info.timestamp)));
        Ok(backups)
    }

    /// `Ok(false)` when no such backup exists.
    pub fn delete_backup(&self, backup_id: &str) -> Result<bool> {
        if !valid_id(backup_id) {
            return Ok(false);
        }
        let path = self.file_for(backup_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| backup_io("delete backup", e))?;
        tracing::info!(backup_id, "backup deleted");
        self.audit.log_security_event(
            "backup_deleted",
            json!({ "backup_id": backup_id, "user": janus_core::current_user() }),
        );
        Ok(true)
    }

    /// Keeps the newest `retain`; returns how many were deleted.
    pub fn cleanup_old(&self, retain: usize) -> Result<usize> {
        let mut removed = 0;
        for stale in self.list_backups()?.into_iter().skip(retain) {
            if self.delete_backup(&stale.backup_id)? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, retain, "old backups removed");
        }
        Ok(removed)
    }

    /// Replays recorded values. `items` narrows the restore to
    /// `network_config` and/or `machine_guid`; any other name is rejected
    /// before anything is touched.
    pub fn restore_backup(&self, backup_id: &str, items: Option<&[String]>) -> Result<bool> {
        let started = Instant::now();
        let unknown: Vec<&str> = items
            .unwrap_or_default()
            .iter()
            .map(String::as_str)
            .filter(|item| ![RESTORE_NETWORK, RESTORE_MACHINE_GUID].contains(item))
            .collect();
        if !unknown.is_empty() {
            return Err(Error::Restore(format!(
                "unknown restore item(s): {} (expected {RESTORE_NETWORK} or {RESTORE_MACHINE_GUID})",
                unknown.join(", ")
            )));
        }
        let info = self
            .get_backup(backup_id)
            .map_err(|e| Error::Restore(e.to_string()))?;
        let wants = |name: &str| items.map_or(true, |list| list.iter().any(|i| i == name));

        let outcome = self.replay(&info, &wants);
        let mut record = OperationRecord::new(OperationType::Restore, "fingerprint")
            .with_backup(Some(backup_id))
            .with_risk(RiskLevel::Medium);
        if let Some(items) = items {
            record = record.with_parameter("items", json!(items));
        }

        match outcome {
            Ok(summary) => {
                tracing::info!(backup_id, ?summary, "backup restored");
                let record = record
                    .with_parameter("restored", json!(summary))
                    .finish("success", started);
                self.audit.log_operation(&record);
                Ok(true)
            }
            Err(err) => {
                let record = record.finish(format!("failed: {err}"), started);
                self.audit.log_operation(&record);
                Err(err)
            }
        }
    }

    fn replay(&self, info: &BackupInfo, wants: &dyn Fn(&str) -> bool) -> Result<Vec<String>> {
        let mut restored = Vec::new();

        if wants(RESTORE_NETWORK) {
            if let Some(network) = &info.network_config {
                let current = self
                    .engine
                    .list_adapters()
                    .map_err(|e| Error::Restore(format!("read network adapters: {e}")))?;
                for recorded in &network.adapters {
                    let live = current
                        .iter()
                        .find(|a| !recorded.id.is_empty() && a.id == recorded.id)
                        .or_else(|| current.iter().find(|a| a.name == recorded.name));
                    let Some(live) = live else {
                        tracing::warn!(adapter = %recorded.name, "recorded adapter no longer present");
                        continue;
                    };
                    if same_mac(&live.mac_address, &recorded.mac_address) {
                        continue;
                    }
                    self.engine
                        .restore_original_mac(&live.id)
                        .map_err(|e| Error::Restore(format!("adapter {}: {e}", live.name)))?;
                    restored.push(format!("mac_{}", live.id));
                }
            }
        }

        if wants(RESTORE_MACHINE_GUID) {
            let recorded = info
                .hardware_info
                .as_ref()
                .and_then(|hw| hw.machine_guid.as_deref());
            match recorded {
                Some(guid) if self.capabilities.modify_machine_guid => {
                    let current = self
                        .engine
                        .get_machine_identity()
                        .map_err(|e| Error::Restore(format!("read machine identity: {e}")))?;
                    if !current.value.eq_ignore_ascii_case(guid) {
                        self.engine
                            .modify_machine_identity(guid)
                            .map_err(|e| Error::Restore(format!("machine identity: {e}")))?;
                        restored.push(RESTORE_MACHINE_GUID.to_string());
                    }
                }
                Some(_) => tracing::debug!("machine identity is read-only here; not restored"),
                None => {}
            }
        }

        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_audit::AuditConfig;
    use janus_core::testing::{adapter, FakeEngine};
    use janus_core::{CancelToken, Platform};

    struct Fixture {
        _tmp: tempfile::TempDir,
        engine: Arc<FakeEngine>,
        audit: Arc<AuditLogger>,
        manager: BackupManager,
    }

    fn fixture(platform: Platform) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let engine = Arc::new(FakeEngine::new(
            platform,
            vec![
                adapter("eth0", "00:1A:2B:3C:4D:5E", true),
                adapter("wlan0", "A4:83:E7:12:34:56", true),
            ],
        ));
        let audit = Arc::new(AuditLogger::new(AuditConfig::new(tmp.path().join("logs"))).unwrap());
        let manager = BackupManager::new(
            tmp.path().join("backups"),
            1 << 30,
            engine.clone(),
            Capabilities::for_platform(platform),
            audit.clone(),
        )
        .unwrap();
        Fixture {
            _tmp: tmp,
            engine,
            audit,
            manager,
        }
    }

    #[test]
    fn create_adds_exactly_one_listed_backup() {
        let f = fixture(Platform::Windows);
        let before = f.manager.list_backups().unwrap().len();
        let info = f.manager.create_backup(&BackupScope::Full, "before change").unwrap();
        let listed = f.manager.list_backups().unwrap();

        assert_eq!(listed.len(), before + 1);
        assert_eq!(listed[0].backup_id, info.backup_id);
        assert_eq!(info.items.len(), 3);
        assert_eq!(info.total_size, info.items.iter().map(|i| i.size).sum::<u64>());
        assert!(info.backup_id.starts_with("fingerprint_"));
        assert!(f.manager.verify_backup(&info.backup_id).unwrap());

        let history = f.audit.history(10);
        assert_eq!(history[0].operation_type, OperationType::Backup);
        assert_eq!(history[0].backup_id.as_deref(), Some(info.backup_id.as_str()));
    }

    #[test]
    fn deleting_missing_backup_changes_nothing() {
        let f = fixture(Platform::Windows);
        f.manager.create_backup(&BackupScope::Full, "").unwrap();
        let before = f.manager.list_backups().unwrap();
        assert!(!f.manager.delete_backup("fingerprint_19700101_000000_00000000").unwrap());
        assert!(!f.manager.delete_backup("../escape").unwrap());
        assert_eq!(f.manager.list_backups().unwrap(), before);
    }

    #[test]
    fn delete_is_a_security_event() {
        let f = fixture(Platform::Windows);
        let info = f.manager.create_backup(&BackupScope::Full, "").unwrap();
        assert!(f.manager.delete_backup(&info.backup_id).unwrap());
        assert!(f.manager.list_backups().unwrap().is_empty());
        assert_eq!(f.audit.search("backup_deleted", None, None).len(), 1);
    }

    #[test]
    fn selective_backup_and_size_limit() {
        let f = fixture(Platform::MacOs);
        let scope = BackupScope::Selective(vec![BackupSection::NetworkConfig]);
        let info = f.manager.create_backup(&scope, "").unwrap();
        assert_eq!(info.backup_type, BackupType::Selective);
        assert!(info.hardware_info.is_none());
        assert_eq!(info.items.len(), 2);

        let tiny = BackupManager::new(
            f.manager.dir(),
            16,
            f.engine.clone(),
            Capabilities::for_platform(Platform::MacOs),
            f.audit.clone(),
        )
        .unwrap();
        let before = tiny.list_backups().unwrap().len();
        assert!(matches!(
            tiny.create_backup(&BackupScope::Full, ""),
            Err(Error::Backup(_))
        ));
        assert_eq!(tiny.list_backups().unwrap().len(), before);
    }

    #[test]
    fn cleanup_keeps_newest() {
        let f = fixture(Platform::Windows);
        for _ in 0..3 {
            f.manager.create_backup(&BackupScope::Full, "").unwrap();
        }
        assert_eq!(f.manager.cleanup_old(1).unwrap(), 2);
        assert_eq!(f.manager.list_backups().unwrap().len(), 1);
    }

    #[test]
    fn restore_clears_changed_macs_and_rewrites_guid() {
        let f = fixture(Platform::Windows);
        let info = f.manager.create_backup(&BackupScope::Full, "").unwrap();

        f.engine
            .modify_mac("eth0", "02:11:22:33:44:55", &CancelToken::new())
            .unwrap();
        f.engine
            .modify_machine_identity("6f9619ff-8b86-d011-b42d-00c04fc964ff")
            .unwrap();

        assert!(f.manager.restore_backup(&info.backup_id, None).unwrap());
        assert_eq!(f.engine.restores(), 1);
        assert_eq!(
            f.engine.get_machine_identity().unwrap().value,
            "3f2504e0-4f89-11d3-9a0c-0305e82c3301"
        );
        assert_eq!(f.audit.history(1)[0].operation_type, OperationType::Restore);
    }

    #[test]
    fn restore_honors_item_filter_and_missing_ids() {
        let f = fixture(Platform::Windows);
        let info = f.manager.create_backup(&BackupScope::Full, "").unwrap();
        f.engine.set_mac("eth0", "02:11:22:33:44:55");

        let only_guid = vec![RESTORE_MACHINE_GUID.to_string()];
        f.manager
            .restore_backup(&info.backup_id, Some(&only_guid))
            .unwrap();
        assert_eq!(f.engine.restores(), 0);

        assert!(matches!(
            f.manager.restore_backup("fingerprint_missing", None),
            Err(Error::Restore(_))
        ));
    }

    #[test]
    fn misspelled_restore_item_is_rejected_without_changes() {
        let f = fixture(Platform::Windows);
        let info = f.manager.create_backup(&BackupScope::Full, "").unwrap();
        f.engine.set_mac("eth0", "02:11:22:33:44:55");

        let typo = vec!["network_confg".to_string()];
        let err = f
            .manager
            .restore_backup(&info.backup_id, Some(&typo))
            .unwrap_err();
        assert!(matches!(&err, Error::Restore(msg) if msg.contains("network_confg")));
        assert_eq!(f.engine.restores(), 0);
        assert_eq!(f.engine.writes(), 0);
    }
}
