use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterType {
    Ethernet,
    Wireless,
    Virtual,
    Bluetooth,
    Other,
}

impl AdapterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterType::Ethernet => "ethernet",
            AdapterType::Wireless => "wireless",
            AdapterType::Virtual => "virtual",
            AdapterType::Bluetooth => "bluetooth",
            AdapterType::Other => "other",
        }
    }
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the OS keeps the adapter's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PlatformHandle {
    RegistryPath(String),
    InterfaceName(String),
    None,
}

/// Point-in-time view of one adapter. Re-enumerated on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAdapter {
    pub id: String,
    pub name: String,
    pub description: String,
    pub mac_address: String,
    pub status: String,
    pub adapter_type: AdapterType,
    pub can_modify: bool,
    pub handle: PlatformHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineIdentity {
    pub value: String,
    pub mutable: bool,
}

/// Drive letter or mount point -> serial number / filesystem id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeIdentity {
    pub volumes: BTreeMap<String, String>,
    pub mutable: bool,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict over a proposed change set. Errors force `is_valid=false` and the
/// risk level can only go up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub risk_level: RiskLevel,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub required_permissions: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            risk_level: RiskLevel::Low,
            errors: Vec::new(),
            warnings: Vec::new(),
            required_permissions: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn escalate(&mut self, level: RiskLevel) {
        self.risk_level = self.risk_level.max(level);
    }

    pub fn require_permission(&mut self, permission: &str) {
        if !self.required_permissions.iter().any(|p| p == permission) {
            self.required_permissions.push(permission.to_string());
        }
    }
}

/// Proposed mutations keyed by attribute kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// adapter id -> new MAC
    #[serde(default)]
    pub mac_changes: BTreeMap<String, String>,
    #[serde(default, alias = "machine_guid", alias = "hardware_uuid")]
    pub machine_identity: Option<String>,
    /// drive -> new serial
    #[serde(default, alias = "volume_serial_changes")]
    pub volume_changes: BTreeMap<String, String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.mac_changes.is_empty()
            && self.machine_identity.is_none()
            && self.volume_changes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Read,
    Modify,
    Delete,
    Backup,
    Restore,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Read => "read",
            OperationType::Modify => "modify",
            OperationType::Delete => "delete",
            OperationType::Backup => "backup",
            OperationType::Restore => "restore",
        }
    }
}

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation_id: String,
    pub timestamp: String,
    pub operation_type: OperationType,
    pub target: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    pub result: String,
    #[serde(default)]
    pub backup_id: Option<String>,
    pub risk_level: RiskLevel,
    pub user: String,
    /// Seconds.
    pub duration: f64,
}

impl OperationRecord {
    pub fn new(operation_type: OperationType, target: impl Into<String>) -> Self {
        Self {
            operation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: crate::now_utc_rfc3339(),
            operation_type,
            target: target.into(),
            parameters: BTreeMap::new(),
            result: String::new(),
            backup_id: None,
            risk_level: RiskLevel::Low,
            user: crate::current_user(),
            duration: 0.0,
        }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_backup(mut self, backup_id: Option<&str>) -> Self {
        self.backup_id = backup_id.map(str::to_string);
        self
    }

    pub fn with_risk(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    /// Stamps the record at completion time.
    pub fn finish(mut self, result: impl Into<String>, started: std::time::Instant) -> Self {
        self.result = result.into();
        self.duration = started.elapsed().as_secs_f64();
        self.timestamp = crate::now_utc_rfc3339();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os_name: String,
    pub os_version: String,
    pub architecture: String,
}

impl SystemInfo {
    pub fn with_version(os_version: impl Into<String>) -> Self {
        let os_name = match std::env::consts::OS {
            "windows" => "Windows",
            "macos" => "Darwin",
            "linux" => "Linux",
            other => other,
        };
        Self {
            os_name: os_name.to_string(),
            os_version: os_version.into(),
            architecture: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Everything the engine can read, assembled at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintSnapshot {
    pub timestamp: String,
    pub platform: Platform,
    pub system_info: SystemInfo,
    pub adapters: Vec<NetworkAdapter>,
    pub machine_identity: Option<MachineIdentity>,
    pub volumes: VolumeIdentity,
    pub hardware: Value,
}
