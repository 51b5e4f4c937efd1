//! On-disk backup format. Optional sections default so older or partial
//! artifacts still load.

use janus_core::{Error, NetworkAdapter, Platform, Result, SystemInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupSection {
    SystemInfo,
    NetworkConfig,
    HardwareInfo,
}

impl BackupSection {
    pub const ALL: [BackupSection; 3] = [
        BackupSection::SystemInfo,
        BackupSection::NetworkConfig,
        BackupSection::HardwareInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupSection::SystemInfo => "system_info",
            BackupSection::NetworkConfig => "network_config",
            BackupSection::HardwareInfo => "hardware_info",
        }
    }
}

impl fmt::Display for BackupSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupSection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BackupSection::ALL
            .into_iter()
            .find(|section| section.as_str() == s)
            .ok_or_else(|| Error::Backup(format!("unknown backup section: {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupScope {
    Full,
    /// `system_info` is stored regardless.
    Selective(Vec<BackupSection>),
}

impl BackupScope {
    pub fn includes(&self, section: BackupSection) -> bool {
        match self {
            BackupScope::Full => true,
            BackupScope::Selective(sections) => {
                section == BackupSection::SystemInfo || sections.contains(&section)
            }
        }
    }

    pub fn kind(&self) -> BackupType {
        match self {
            BackupScope::Full => BackupType::Full,
            BackupScope::Selective(_) => BackupType::Selective,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Full,
    Selective,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Selective => "selective",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub mac_address: String,
    pub adapter_type: String,
    pub status: String,
}

impl From<&NetworkAdapter> for AdapterRecord {
    fn from(adapter: &NetworkAdapter) -> Self {
        Self {
            id: adapter.id.clone(),
            name: adapter.name.clone(),
            mac_address: adapter.mac_address.clone(),
            adapter_type: adapter.adapter_type.to_string(),
            status: adapter.status.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub adapters: Vec<AdapterRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareInfo {
    #[serde(default)]
    pub machine_guid: Option<String>,
    #[serde(default)]
    pub volume_serials: BTreeMap<String, String>,
    #[serde(default)]
    pub hardware_details: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupItem {
    pub item_type: String,
    pub source_path: String,
    pub stored_path: String,
    pub size: u64,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub backup_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub timestamp_readable: String,
    pub backup_type: BackupType,
    #[serde(default)]
    pub schema_version: String,
    pub platform: Platform,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_info: SystemInfo,
    #[serde(default)]
    pub network_config: Option<NetworkConfig>,
    #[serde(default)]
    pub hardware_info: Option<HardwareInfo>,
    #[serde(default)]
    pub items: Vec<BackupItem>,
    #[serde(default)]
    pub total_size: u64,
}

impl BackupInfo {
    /// Canonical bytes of a stored section, the input to size and checksum.
    pub fn section_bytes(&self, section: BackupSection) -> Result<Option<Vec<u8>>> {
        let bytes = match section {
            BackupSection::SystemInfo => Some(serde_json::to_vec(&self.system_info)?),
            BackupSection::NetworkConfig => self
                .network_config
                .as_ref()
                .map(serde_json::to_vec)
                .transpose()?,
            BackupSection::HardwareInfo => self
                .hardware_info
                .as_ref()
                .map(serde_json::to_vec)
                .transpose()?,
        };
        Ok(bytes)
    }

    /// One item per stored section; also sets `total_size`.
    pub fn seal(&mut self) -> Result<()> {
        let mut items = Vec::new();
        for section in BackupSection::ALL {
            if let Some(bytes) = self.section_bytes(section)? {
                items.push(BackupItem {
                    item_type: section.as_str().to_string(),
                    source_path: format!("live://{section}"),
                    stored_path: format!("{}.json#{section}", self.backup_id),
                    size: bytes.len() as u64,
                    checksum: sha256_hex(&bytes),
                });
            }
        }
        self.total_size = items.iter().map(|item| item.size).sum();
        self.items = items;
        Ok(())
    }

    /// Items whose recomputed checksum no longer matches.
    pub fn corrupted_items(&self) -> Result<Vec<String>> {
        let mut corrupted = Vec::new();
        for item in &self.items {
            let section = BackupSection::from_str(&item.item_type)?;
            let matches = self
                .section_bytes(section)?
                .is_some_and(|bytes| sha256_hex(&bytes) == item.checksum);
            if !matches {
                corrupted.push(item.item_type.clone());
            }
        }
        Ok(corrupted)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
