//! Wires the platform engine, validation, backups and the audit trail into
//! one service. Every mutation goes validate -> lock -> backup -> write ->
//! audit.

pub mod locks;
pub mod registry;
pub mod worker;

pub use locks::{LockTable, ResourceGuard};
pub use registry::{bind, select, Binding};
pub use worker::{spawn_apply, spawn_backup, spawn_snapshot, Job};

use janus_audit::{AuditConfig, AuditLogger};
use janus_backup::{BackupManager, BackupScope};
use janus_config::{Config, LoggingSettings, SecuritySettings};
use janus_core::{
    CancelToken, Capabilities, ChangeSet, Error, FingerprintEngine, FingerprintSnapshot,
    NetworkAdapter, Operation, OperationRecord, OperationType, PermissionChecker, Platform, Result,
    RiskLevel, ValidationResult,
};
use janus_host_windows::RegistryBackupStore;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

pub const MACHINE_GUID_RESULT: &str = "machine_guid";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemResult {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(err: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub backup_id: String,
    pub validation: ValidationResult,
    /// `mac_<adapter_id>` and `machine_guid`.
    pub results: BTreeMap<String, ItemResult>,
}

impl ApplyOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.results.values().all(|r| r.success)
    }
}

pub struct FingerprintService {
    binding: Binding,
    backups: BackupManager,
    audit: Arc<AuditLogger>,
    locks: LockTable,
    security: SecuritySettings,
    logging: LoggingSettings,
}

impl FingerprintService {
    pub fn new(binding: Binding, config: &Config) -> Result<Self> {
        let logging = config.logging();
        let security = config.security();
        let backup = config.backup();

        let mut audit_config = AuditConfig::new(&logging.log_directory);
        audit_config.max_log_size = logging.max_log_size;
        audit_config.max_log_files = logging.max_log_files;
        audit_config.enabled = security.enable_audit_log;
        let audit = Arc::new(AuditLogger::new(audit_config)?);

        if backup.compression_enabled {
            tracing::warn!("backup.compression_enabled is set; backups are stored uncompressed");
        }
        let backups = BackupManager::new(
            &backup.backup_directory,
            backup.max_backup_size,
            binding.engine.clone(),
            binding.capabilities,
            audit.clone(),
        )?;

        tracing::debug!(platform = %binding.platform, "fingerprint service ready");
        Ok(Self {
            binding,
            backups,
            audit,
            locks: LockTable::new(),
            security,
            logging,
        })
    }

    pub fn platform(&self) -> Platform {
        self.binding.platform
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.binding.capabilities
    }

    pub fn engine(&self) -> &dyn FingerprintEngine {
        self.binding.engine.as_ref()
    }

    pub fn permissions(&self) -> &dyn PermissionChecker {
        self.binding.permissions.as_ref()
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn registry_backups(&self) -> Option<&RegistryBackupStore> {
        self.binding.registry_backups.as_ref()
    }

    pub fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub fn logging(&self) -> &LoggingSettings {
        &self.logging
    }

    pub fn list_adapters(&self) -> Result<Vec<NetworkAdapter>> {
        self.engine().list_adapters()
    }

    pub fn snapshot(&self) -> Result<FingerprintSnapshot> {
        self.engine().snapshot_fingerprint()
    }

    /// Read-only. High and critical rejections are also security events.
    pub fn validate(&self, changes: &ChangeSet) -> ValidationResult {
        let result = janus_safety::validate(
            changes,
            self.engine(),
            self.permissions(),
            self.capabilities(),
        );
        if !result.is_valid && result.risk_level >= RiskLevel::High {
            self.audit.log_security_event(
                "validation_rejected",
                json!({
                    "risk_level": result.risk_level,
                    "errors": result.errors,
                    "changes": changes,
                }),
            );
        }
        result
    }

    /// Validates, takes a full backup, then writes each change. Per-item
    /// failures land in `results`; validation, lock, cancel-before-backup and
    /// backup failures abort before anything is written.
    pub fn apply_changes(
        &self,
        changes: &ChangeSet,
        cancel: &CancelToken,
        progress: &mut dyn FnMut(u8, &str),
    ) -> Result<ApplyOutcome> {
        progress(5, "validating changes");
        let validation = self.validate(changes);
        if !validation.is_valid {
            if !self.permissions_ok(changes) {
                self.audit.log_security_event(
                    "permission_denied",
                    json!({
                        "user": self.permissions().current_user(),
                        "required": validation.required_permissions,
                    }),
                );
            }
            return Err(Error::Validation {
                risk_level: validation.risk_level,
                errors: validation.errors,
            });
        }
        if changes.is_empty() {
            return Err(Error::Validation {
                risk_level: RiskLevel::Low,
                errors: vec!["no changes requested".to_string()],
            });
        }

        let mut resources: Vec<String> = changes
            .mac_changes
            .keys()
            .map(|id| locks::mac_resource(id))
            .collect();
        if changes.machine_identity.is_some() {
            resources.push(locks::MACHINE_IDENTITY_RESOURCE.to_string());
        }
        let _guard = self.locks.acquire(&resources)?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        progress(15, "creating backup");
        if !self.security.backup_before_modify {
            tracing::warn!("security.backup_before_modify is off; a backup is taken regardless");
        }
        let backup = self.backups.create_backup_with(
            &BackupScope::Full,
            "automatic backup before fingerprint change",
            &mut |percent: u8, message: &str| {
                progress((15 + u32::from(percent) * 35 / 100) as u8, message)
            },
        )?;
        let backup_id = backup.backup_id;
        if let Err(err) = self.backups.cleanup_old(self.security.max_backup_count.max(1)) {
            tracing::warn!(error = %err, "backup retention cleanup failed");
        }

        let total = resources.len().max(1);
        let mut done = 0usize;
        let mut step = |done: usize, message: &str| {
            let percent = 50 + (done * 45 / total) as u8;
            progress(percent, message);
        };

        let mut results = BTreeMap::new();
        for (adapter_id, new_mac) in &changes.mac_changes {
            let key = format!("mac_{adapter_id}");
            if cancel.is_cancelled() {
                results.insert(key, ItemResult::failed(Error::Cancelled));
                continue;
            }
            step(done, &format!("changing MAC of {adapter_id}"));
            let started = Instant::now();
            let old_mac = self.engine().get_mac(adapter_id).ok().flatten();
            let outcome = self.engine().modify_mac(adapter_id, new_mac, cancel);
            let record = OperationRecord::new(OperationType::Modify, key.as_str())
                .with_parameter("adapter_id", adapter_id.as_str())
                .with_parameter("old_mac", json!(old_mac))
                .with_parameter("new_mac", new_mac.as_str())
                .with_backup(Some(backup_id.as_str()))
                .with_risk(validation.risk_level);
            results.insert(key, self.record_outcome(record, outcome, started));
            done += 1;
        }

        if let Some(identity) = &changes.machine_identity {
            if cancel.is_cancelled() {
                results.insert(MACHINE_GUID_RESULT.to_string(), ItemResult::failed(Error::Cancelled));
            } else {
                step(done, "changing machine identity");
                let started = Instant::now();
                let old_value = self.engine().get_machine_identity().ok().map(|i| i.value);
                let outcome = self.engine().modify_machine_identity(identity);
                let record = OperationRecord::new(OperationType::Modify, MACHINE_GUID_RESULT)
                    .with_parameter("old_value", json!(old_value))
                    .with_parameter("new_value", identity.as_str())
                    .with_backup(Some(backup_id.as_str()))
                    .with_risk(validation.risk_level);
                results.insert(
                    MACHINE_GUID_RESULT.to_string(),
                    self.record_outcome(record, outcome, started),
                );
            }
        }

        progress(100, "changes applied");
        let outcome = ApplyOutcome {
            backup_id,
            validation,
            results,
        };
        tracing::info!(
            backup_id = %outcome.backup_id,
            succeeded = outcome.all_succeeded(),
            "change set applied"
        );
        Ok(outcome)
    }

    fn permissions_ok(&self, changes: &ChangeSet) -> bool {
        let mut needed = Vec::new();
        if !changes.mac_changes.is_empty() {
            needed.push(Operation::ModifyMac);
        }
        if changes.machine_identity.is_some() {
            needed.push(Operation::ModifyMachineGuid);
        }
        if !changes.volume_changes.is_empty() {
            needed.push(Operation::ModifyVolumeSerial);
        }
        needed.into_iter().all(|op| self.permissions().ensure(op))
    }

    fn record_outcome(
        &self,
        record: OperationRecord,
        outcome: Result<bool>,
        started: Instant,
    ) -> ItemResult {
        match outcome {
            Ok(true) => {
                self.audit.log_operation(&record.finish("success", started));
                ItemResult::ok()
            }
            Ok(false) => {
                self.audit.log_operation(&record.finish("failed", started));
                ItemResult::failed("native write reported failure")
            }
            Err(err) => {
                tracing::warn!(target = %record.target, error = %err, "change failed");
                if matches!(err, Error::Permission(_)) {
                    self.audit.log_security_event(
                        "permission_denied",
                        json!({ "target": record.target, "error": err.to_string() }),
                    );
                }
                self.audit
                    .log_operation(&record.finish(format!("failed: {err}"), started));
                ItemResult::failed(err)
            }
        }
    }

    /// Restores a fingerprint backup; see `BackupManager::restore_backup`.
    pub fn restore_backup(&self, backup_id: &str, items: Option<&[String]>) -> Result<bool> {
        let mut resources = Vec::new();
        if let Ok(adapters) = self.list_adapters() {
            resources.extend(adapters.iter().map(|a| locks::mac_resource(&a.id)));
        }
        resources.push(locks::MACHINE_IDENTITY_RESOURCE.to_string());
        let _guard = self.locks.acquire(&resources)?;
        self.backups.restore_backup(backup_id, items)
    }

    fn registry_store(&self) -> Result<&RegistryBackupStore> {
        self.registry_backups().ok_or_else(|| {
            Error::PlatformNotSupported(format!("registry backups on {}", self.platform()))
        })
    }

    /// Writes a registry key snapshot back and records the attempt.
    pub fn restore_registry_backup(&self, backup_id: &str) -> Result<usize> {
        let store = self.registry_store()?;
        let started = Instant::now();
        let record = OperationRecord::new(OperationType::Restore, "registry")
            .with_backup(Some(backup_id))
            .with_risk(RiskLevel::High);
        let outcome = store.restore(backup_id);
        match &outcome {
            Ok(restored) => self.audit.log_operation(
                &record
                    .with_parameter("restored_values", *restored)
                    .finish("success", started),
            ),
            Err(err) => self
                .audit
                .log_operation(&record.finish(format!("failed: {err}"), started)),
        }
        outcome
    }

    /// `Ok(false)` for malformed or unknown ids. Deletions are security events.
    pub fn delete_registry_backup(&self, backup_id: &str) -> Result<bool> {
        let deleted = self.registry_store()?.delete(backup_id)?;
        if deleted {
            self.audit.log_security_event(
                "backup_deleted",
                json!({
                    "backup_id": backup_id,
                    "kind": "registry",
                    "user": janus_core::current_user(),
                }),
            );
        }
        Ok(deleted)
    }

    /// Clears one adapter's MAC override outside of a backup restore.
    pub fn restore_mac(&self, adapter_id: &str) -> Result<bool> {
        let _guard = self.locks.acquire(&[locks::mac_resource(adapter_id)])?;
        let started = Instant::now();
        let record = OperationRecord::new(OperationType::Restore, format!("mac_{adapter_id}"))
            .with_parameter("adapter_id", adapter_id)
            .with_risk(RiskLevel::Medium);
        let outcome = self.engine().restore_original_mac(adapter_id);
        match &outcome {
            Ok(_) => self.audit.log_operation(&record.finish("success", started)),
            Err(err) => self
                .audit
                .log_operation(&record.finish(format!("failed: {err}"), started)),
        }
        outcome
    }
}
