//! Windows fingerprint engine: WMI enumeration through `wmic`, registry
//! writes for MAC overrides and the machine GUID.

#[cfg(windows)]
mod elevation;
#[cfg(not(windows))]
#[path = "elevation_stub.rs"]
mod elevation;

#[cfg(windows)]
mod native_registry;
#[cfg(not(windows))]
#[path = "native_registry_stub.rs"]
mod native_registry;

pub mod permissions;
pub mod registry;
pub mod registry_backup;
pub mod wmi;

pub use native_registry::NativeRegistry;
pub use permissions::WindowsPermissions;
pub use registry::{RegistryAccess, RegistryData, RegistryValue};
pub use registry_backup::{RegistryBackup, RegistryBackupStore, RegistryBackupSummary};

use janus_core::command::DEFAULT_TIMEOUT;
use janus_core::mac;
use janus_core::{
    run_checked, CancelToken, CommandRunner, Error, FingerprintEngine, MachineIdentity,
    NetworkAdapter, Operation, PermissionChecker, Platform, PlatformHandle, Result, SystemInfo,
    SystemRunner, VolumeIdentity,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const NIC_CLASS_KEY: &str = r"HKEY_LOCAL_MACHINE\SYSTEM\CurrentControlSet\Control\Class\{4D36E972-E325-11CE-BFC1-08002BE10318}";
pub const CRYPTOGRAPHY_KEY: &str = r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\Cryptography";

const ADAPTER_CSV_ARGS: [&str; 7] = [
    "path",
    "win32_networkadapter",
    "where",
    "MACAddress is not null",
    "get",
    "Name,MACAddress,PNPDeviceID,Description,NetEnabled",
    "/format:csv",
];
const ADAPTER_LIST_ARGS: [&str; 5] = [
    "path",
    "win32_networkadapter",
    "get",
    "Name,MACAddress,Description",
    "/format:list",
];

/// Driver entry under the NIC class key.
#[derive(Debug, Clone)]
struct RegistryAdapter {
    path: String,
    driver_desc: String,
    permanent_address: Option<String>,
}

pub struct WindowsEngine {
    runner: Arc<dyn CommandRunner>,
    registry: Arc<dyn RegistryAccess>,
    permissions: Arc<dyn PermissionChecker>,
    registry_backups: Option<RegistryBackupStore>,
    timeout: Duration,
}

impl WindowsEngine {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        registry: Arc<dyn RegistryAccess>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self {
            runner,
            registry,
            permissions,
            registry_backups: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Real processes, the real registry and token-based permission checks.
    pub fn native() -> Self {
        let registry: Arc<dyn RegistryAccess> = Arc::new(NativeRegistry);
        let permissions = Arc::new(WindowsPermissions::new(registry.clone()));
        Self::new(Arc::new(SystemRunner), registry, permissions)
    }

    /// Snapshot each key into `store` before it is edited.
    pub fn with_registry_backups(mut self, store: RegistryBackupStore) -> Self {
        self.registry_backups = Some(store);
        self
    }

    pub fn registry(&self) -> Arc<dyn RegistryAccess> {
        self.registry.clone()
    }

    pub fn permissions(&self) -> Arc<dyn PermissionChecker> {
        self.permissions.clone()
    }

    fn wmic(&self, args: &[&str]) -> Result<String> {
        run_checked(self.runner.as_ref(), "wmic", args, self.timeout)
    }

    fn wmi_adapters(&self) -> Result<Vec<wmi::WmiAdapter>> {
        let csv = self.wmic(&ADAPTER_CSV_ARGS)?;
        if let Some(adapters) = wmi::parse_adapter_csv(&csv) {
            return Ok(adapters);
        }
        tracing::debug!("wmic csv output unusable, falling back to list format");
        let list = self.wmic(&ADAPTER_LIST_ARGS)?;
        Ok(wmi::parse_adapter_list(&list))
    }

    fn registry_adapters(&self) -> Vec<RegistryAdapter> {
        let subkeys = match self.registry.subkeys(NIC_CLASS_KEY) {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(error = %err, "cannot list network adapter class key");
                return Vec::new();
            }
        };

        subkeys
            .into_iter()
            .filter(|key| !key.is_empty() && key.chars().all(|c| c.is_ascii_digit()))
            .filter_map(|key| {
                let path = format!(r"{NIC_CLASS_KEY}\{key}");
                match self.registry.read_string(&path, "DriverDesc") {
                    Ok(Some(driver_desc)) => {
                        let permanent_address = self
                            .registry
                            .read_string(&path, "PermanentAddress")
                            .ok()
                            .flatten();
                        Some(RegistryAdapter {
                            path,
                            driver_desc,
                            permanent_address,
                        })
                    }
                    Ok(None) => None,
                    Err(err) => {
                        tracing::debug!(key = %path, error = %err, "skipping adapter key");
                        None
                    }
                }
            })
            .collect()
    }

    fn adapter_for_write(&self, adapter_id: &str) -> Result<(NetworkAdapter, String)> {
        let adapter = self
            .find_adapter(adapter_id)?
            .ok_or_else(|| Error::NetworkAdapter(format!("adapter {adapter_id} not found")))?;
        let path = match (&adapter.handle, adapter.can_modify) {
            (PlatformHandle::RegistryPath(path), true) => path.clone(),
            _ => {
                return Err(Error::NetworkAdapter(format!(
                    "adapter {} cannot be modified",
                    adapter.name
                )))
            }
        };
        Ok((adapter, path))
    }

    fn require(&self, operation: Operation) -> Result<()> {
        if self.permissions.ensure(operation) {
            Ok(())
        } else {
            Err(Error::Permission(format!(
                "{operation} requires {}",
                self.permissions.required_permissions(operation).join(", ")
            )))
        }
    }

    fn backup_key(&self, path: &str) -> Result<()> {
        if let Some(store) = &self.registry_backups {
            store.backup_key(path)?;
        }
        Ok(())
    }

    /// Bounces the interface so the driver rereads `NetworkAddress`.
    fn restart_adapter(&self, name: &str) {
        for state in ["admin=disable", "admin=enable"] {
            let args = ["interface", "set", "interface", name, state];
            if let Err(err) = run_checked(self.runner.as_ref(), "netsh", &args, self.timeout) {
                tracing::warn!(adapter = name, error = %err, "adapter restart failed; change applies on next reboot");
                return;
            }
        }
    }

    fn wmic_section(&self, class: &str, properties: &str) -> Value {
        let output = match self.wmic(&[class, "get", properties, "/format:csv"]) {
            Ok(out) => out,
            Err(err) => {
                tracing::warn!(class, error = %err, "hardware section unavailable");
                return Value::Object(Map::new());
            }
        };
        let mut rows = wmi::parse_csv_table(&output);
        if rows.is_empty() {
            return Value::Object(Map::new());
        }
        let row = rows.swap_remove(0);
        Value::Object(row.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
    }
}

impl FingerprintEngine for WindowsEngine {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn list_adapters(&self) -> Result<Vec<NetworkAdapter>> {
        let registry = self.registry_adapters();
        let adapters = self
            .wmi_adapters()?
            .into_iter()
            .map(|wmi| {
                let entry = registry.iter().find(|reg| {
                    reg.permanent_address
                        .as_deref()
                        .is_some_and(|addr| mac::same_mac(addr, &wmi.mac_address))
                        || reg.driver_desc == wmi.description
                });
                let adapter_type = wmi::classify(&wmi.description);
                NetworkAdapter {
                    id: wmi.device_id,
                    name: wmi.name,
                    description: wmi.description,
                    mac_address: wmi.mac_address,
                    status: wmi.status,
                    adapter_type,
                    can_modify: entry.is_some(),
                    handle: entry
                        .map(|e| PlatformHandle::RegistryPath(e.path.clone()))
                        .unwrap_or(PlatformHandle::None),
                }
            })
            .collect::<Vec<_>>();
        tracing::debug!(count = adapters.len(), "enumerated adapters");
        Ok(adapters)
    }

    fn modify_mac(&self, adapter_id: &str, new_mac: &str, cancel: &CancelToken) -> Result<bool> {
        if !mac::is_valid_mac(new_mac) {
            return Err(Error::NetworkAdapter(format!("invalid MAC address: {new_mac}")));
        }
        let (adapter, path) = self.adapter_for_write(adapter_id)?;
        self.require(Operation::ModifyMac)?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.backup_key(&path)?;
        self.registry
            .write_string(&path, "NetworkAddress", &mac::compact(new_mac))?;
        tracing::info!(adapter = %adapter.name, new_mac = %mac::normalize(new_mac), "MAC override written");

        self.restart_adapter(&adapter.name);
        Ok(true)
    }

    fn restore_original_mac(&self, adapter_id: &str) -> Result<bool> {
        let (adapter, path) = self.adapter_for_write(adapter_id)?;
        self.require(Operation::RestoreMac)?;
        self.backup_key(&path)?;
        let removed = self.registry.delete_value(&path, "NetworkAddress")?;
        tracing::info!(adapter = %adapter.name, removed, "MAC override cleared");
        self.restart_adapter(&adapter.name);
        Ok(true)
    }

    fn get_machine_identity(&self) -> Result<MachineIdentity> {
        let value = self
            .registry
            .read_string(CRYPTOGRAPHY_KEY, "MachineGuid")?
            .ok_or_else(|| Error::Operation("MachineGuid value missing".to_string()))?;
        Ok(MachineIdentity {
            value,
            mutable: true,
        })
    }

    fn modify_machine_identity(&self, new_value: &str) -> Result<bool> {
        let guid = Uuid::parse_str(new_value)
            .map_err(|e| Error::Operation(format!("invalid machine GUID {new_value}: {e}")))?;
        self.require(Operation::ModifyMachineGuid)?;
        self.backup_key(CRYPTOGRAPHY_KEY)?;
        let value = guid.hyphenated().to_string();
        self.registry
            .write_string(CRYPTOGRAPHY_KEY, "MachineGuid", &value)?;
        tracing::info!(guid = %value, "machine GUID written");
        Ok(true)
    }

    fn get_volume_identities(&self) -> Result<VolumeIdentity> {
        let output = self.wmic(&["logicaldisk", "get", "DeviceID,VolumeSerialNumber", "/format:csv"])?;
        let volumes = wmi::parse_csv_table(&output)
            .into_iter()
            .filter_map(|mut row| {
                let drive = row.remove("DeviceID")?;
                let serial = row.remove("VolumeSerialNumber")?;
                Some((drive, serial))
            })
            .collect();
        Ok(VolumeIdentity {
            volumes,
            mutable: false,
        })
    }

    fn modify_volume_identity(&self, drive: &str, _new_serial: &str) -> Result<bool> {
        tracing::warn!(drive, "volume serial modification requested");
        Err(Error::Operation(format!(
            "volume serial modification for {drive} is disabled: rewriting boot sectors is too risky"
        )))
    }

    fn hardware_info(&self) -> Result<Value> {
        Ok(json!({
            "computer_system": self.wmic_section("computersystem", "Manufacturer,Model,SystemType,TotalPhysicalMemory"),
            "operating_system": self.wmic_section("os", "Caption,Version,BuildNumber,OSArchitecture"),
            "bios": self.wmic_section("bios", "Manufacturer,SerialNumber,SMBIOSBIOSVersion"),
            "baseboard": self.wmic_section("baseboard", "Manufacturer,Product,SerialNumber"),
            "processor": self.wmic_section("cpu", "Name,NumberOfCores,ProcessorId"),
        }))
    }

    fn system_info(&self) -> SystemInfo {
        let version = self
            .wmic(&["os", "get", "Version", "/format:csv"])
            .ok()
            .and_then(|out| wmi::parse_csv_table(&out).into_iter().next())
            .and_then(|mut row| row.remove("Version"))
            .unwrap_or_else(|| "unknown".to_string());
        SystemInfo::with_version(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_core::testing::{ScriptedRunner, StaticPermissions};
    use janus_core::AdapterType;
    use registry::MemoryRegistry;

    const ADAPTERS: &str = "\r\nNode,Description,MACAddress,Name,NetEnabled,PNPDeviceID\r\n\
PC,Intel(R) Ethernet Connection I219-V,00:1A:2B:3C:4D:5E,Ethernet,TRUE,PCI\\VEN_8086\\1\r\n\
PC,Microsoft Wi-Fi Direct Virtual Adapter,A6:B1:C2:D3:E4:F5,Local Area Connection* 1,FALSE,SWD\\WIFIDIRECT\\2\r\n";

    fn nic(n: &str) -> String {
        format!(r"{NIC_CLASS_KEY}\{n}")
    }

    fn fixture(
        permissions: StaticPermissions,
    ) -> (Arc<ScriptedRunner>, Arc<MemoryRegistry>, WindowsEngine) {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("wmic path win32_networkadapter where", ADAPTERS)
                .on("netsh interface set interface", "")
                .on(
                    "wmic logicaldisk",
                    "\r\nNode,DeviceID,VolumeSerialNumber\r\nPC,C:,8A3F21C4\r\nPC,D:,\r\n",
                )
                .on("wmic os get Version", "\r\nNode,Version\r\nPC,10.0.22631\r\n"),
        );
        let registry = Arc::new(
            MemoryRegistry::new()
                .with_string(&nic("0001"), "DriverDesc", "Intel(R) Ethernet Connection I219-V")
                .with_string(&nic("0001"), "PermanentAddress", "001A2B3C4D5E")
                .with_key(&nic("Properties"))
                .with_string(
                    CRYPTOGRAPHY_KEY,
                    "MachineGuid",
                    "3f2504e0-4f89-11d3-9a0c-0305e82c3301",
                ),
        );
        let engine = WindowsEngine::new(runner.clone(), registry.clone(), Arc::new(permissions));
        (runner, registry, engine)
    }

    #[test]
    fn merges_wmi_rows_with_registry_entries() {
        let (_, _, engine) = fixture(StaticPermissions::elevated(Platform::Windows));
        let adapters = engine.list_adapters().unwrap();
        assert_eq!(adapters.len(), 2);

        let eth = &adapters[0];
        assert_eq!(eth.id, "PCI\\VEN_8086\\1");
        assert_eq!(eth.adapter_type, AdapterType::Ethernet);
        assert!(eth.can_modify);
        assert_eq!(eth.handle, PlatformHandle::RegistryPath(nic("0001")));

        let wifi = &adapters[1];
        assert_eq!(wifi.adapter_type, AdapterType::Wireless);
        assert_eq!(wifi.status, "disabled");
        assert!(!wifi.can_modify);
        assert_eq!(wifi.handle, PlatformHandle::None);
    }

    #[test]
    fn falls_back_to_list_format() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("wmic path win32_networkadapter where", "No Instance(s) Available.\r\n")
                .on(
                    "wmic path win32_networkadapter get",
                    "Description=Realtek PCIe GbE\r\nMACAddress=00:E0:4C:68:00:01\r\nName=Ethernet 2\r\n",
                ),
        );
        let engine = WindowsEngine::new(
            runner,
            Arc::new(MemoryRegistry::new()),
            Arc::new(StaticPermissions::elevated(Platform::Windows)),
        );
        let adapters = engine.list_adapters().unwrap();
        assert_eq!(adapters.len(), 1);
        assert_eq!(adapters[0].id, "00:E0:4C:68:00:01");
        assert!(!adapters[0].can_modify);
    }

    #[test]
    fn modify_writes_compact_mac_and_bounces_adapter() {
        let (runner, registry, engine) = fixture(StaticPermissions::elevated(Platform::Windows));
        let ok = engine
            .modify_mac("PCI\\VEN_8086\\1", "02:11:22:33:44:55", &CancelToken::new())
            .unwrap();
        assert!(ok);
        assert_eq!(
            registry.read_string(&nic("0001"), "NetworkAddress").unwrap().as_deref(),
            Some("021122334455")
        );
        assert_eq!(registry.writes(), 1);
        assert_eq!(runner.count("netsh interface set interface Ethernet admin=disable"), 1);
        assert_eq!(runner.count("netsh interface set interface Ethernet admin=enable"), 1);
    }

    #[test]
    fn unmodifiable_adapter_is_never_written() {
        let (runner, registry, engine) = fixture(StaticPermissions::elevated(Platform::Windows));
        let err = engine
            .modify_mac("SWD\\WIFIDIRECT\\2", "02:11:22:33:44:55", &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::NetworkAdapter(_)));
        assert_eq!(registry.writes(), 0);
        assert_eq!(runner.count("netsh"), 0);
    }

    #[test]
    fn modify_rejects_bad_input_and_missing_rights() {
        let (_, registry, engine) = fixture(StaticPermissions::elevated(Platform::Windows));
        assert!(matches!(
            engine.modify_mac("PCI\\VEN_8086\\1", "not-a-mac", &CancelToken::new()),
            Err(Error::NetworkAdapter(_))
        ));
        assert!(matches!(
            engine.modify_mac("nope", "02:11:22:33:44:55", &CancelToken::new()),
            Err(Error::NetworkAdapter(_))
        ));
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            engine.modify_mac("PCI\\VEN_8086\\1", "02:11:22:33:44:55", &cancel),
            Err(Error::Cancelled)
        ));
        assert_eq!(registry.writes(), 0);

        let (_, registry, engine) = fixture(StaticPermissions::unprivileged(Platform::Windows));
        assert!(matches!(
            engine.modify_mac("PCI\\VEN_8086\\1", "02:11:22:33:44:55", &CancelToken::new()),
            Err(Error::Permission(_))
        ));
        assert_eq!(registry.writes(), 0);
    }

    #[test]
    fn restore_clears_override() {
        let (_, registry, engine) = fixture(StaticPermissions::elevated(Platform::Windows));
        registry.seed(&nic("0001"), RegistryValue::string("NetworkAddress", "021122334455"));
        assert!(engine.restore_original_mac("PCI\\VEN_8086\\1").unwrap());
        assert_eq!(registry.read_string(&nic("0001"), "NetworkAddress").unwrap(), None);
        assert_eq!(registry.deletes(), 1);
    }

    #[test]
    fn machine_guid_reads_and_writes_with_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, registry, engine) = fixture(StaticPermissions::elevated(Platform::Windows));
        let store = RegistryBackupStore::new(tmp.path(), registry.clone()).unwrap();
        let engine = engine.with_registry_backups(store.clone());

        let identity = engine.get_machine_identity().unwrap();
        assert_eq!(identity.value, "3f2504e0-4f89-11d3-9a0c-0305e82c3301");
        assert!(identity.mutable);

        assert!(matches!(
            engine.modify_machine_identity("not-a-guid"),
            Err(Error::Operation(_))
        ));
        engine
            .modify_machine_identity("6F9619FF-8B86-D011-B42D-00C04FC964FF")
            .unwrap();
        assert_eq!(
            engine.get_machine_identity().unwrap().value,
            "6f9619ff-8b86-d011-b42d-00c04fc964ff"
        );
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn volumes_are_read_only() {
        let (_, _, engine) = fixture(StaticPermissions::elevated(Platform::Windows));
        let volumes = engine.get_volume_identities().unwrap();
        assert_eq!(volumes.volumes.len(), 1);
        assert_eq!(volumes.volumes.get("C:").map(String::as_str), Some("8A3F21C4"));
        assert!(!volumes.mutable);
        assert!(matches!(
            engine.modify_volume_identity("C:", "12345678"),
            Err(Error::Operation(_))
        ));
    }

    #[test]
    fn hardware_sections_degrade_to_empty() {
        let (_, _, engine) = fixture(StaticPermissions::elevated(Platform::Windows));
        let info = engine.hardware_info().unwrap();
        assert_eq!(info["bios"], json!({}));
        assert_eq!(engine.system_info().os_version, "10.0.22631");

        let snapshot = engine.snapshot_fingerprint().unwrap();
        assert_eq!(snapshot.adapters.len(), 2);
        assert!(snapshot.machine_identity.is_some());
    }
}
