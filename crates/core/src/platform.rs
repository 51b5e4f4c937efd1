use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The operating systems janus has an engine for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    MacOs,
}

impl Platform {
    pub fn detect() -> Result<Platform> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Result<Platform> {
        match os {
            "windows" => Ok(Platform::Windows),
            "macos" => Ok(Platform::MacOs),
            other => Err(Error::PlatformNotSupported(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => write!(f, "Windows"),
            Platform::MacOs => write!(f, "macOS"),
        }
    }
}

/// Operation classes that carry a permission requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ModifyMac,
    RestoreMac,
    ModifyMachineGuid,
    ModifyVolumeSerial,
    ModifyRegistry,
    ReadHardwareInfo,
    ReadIoreg,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ModifyMac => "modify_mac",
            Operation::RestoreMac => "restore_mac",
            Operation::ModifyMachineGuid => "modify_machine_guid",
            Operation::ModifyVolumeSerial => "modify_volume_serial",
            Operation::ModifyRegistry => "modify_registry",
            Operation::ReadHardwareInfo => "read_hardware_info",
            Operation::ReadIoreg => "read_ioreg",
        }
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, Operation::ReadHardwareInfo | Operation::ReadIoreg)
    }

    /// Static permission table.
    pub fn required_permissions(&self, platform: Platform) -> &'static [&'static str] {
        match (platform, self) {
            (Platform::Windows, Operation::ModifyMac)
            | (Platform::Windows, Operation::RestoreMac)
            | (Platform::Windows, Operation::ModifyMachineGuid)
            | (Platform::Windows, Operation::ModifyRegistry) => &["administrator", "registry_write"],
            (Platform::Windows, Operation::ModifyVolumeSerial) => &["administrator", "disk_access"],
            (Platform::Windows, _) => &[],
            (Platform::MacOs, Operation::ModifyMac) | (Platform::MacOs, Operation::RestoreMac) => {
                &["sudo", "network_interface_access"]
            }
            (Platform::MacOs, Operation::ReadHardwareInfo) => &["system_info_read"],
            (Platform::MacOs, Operation::ReadIoreg) => &["ioreg_read"],
            (Platform::MacOs, _) => &["sudo"],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-platform support map, fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub modify_mac: bool,
    pub modify_machine_guid: bool,
    /// Declared on Windows; the engine still refuses it at runtime.
    pub modify_volume_serial: bool,
    pub registry_access: bool,
    pub wmi_access: bool,
    pub admin_elevation: bool,
    pub ioreg_access: bool,
    pub sudo_elevation: bool,
    pub sip_compatibility: bool,
}

impl Capabilities {
    pub const fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Windows => Capabilities {
                modify_mac: true,
                modify_machine_guid: true,
                modify_volume_serial: true,
                registry_access: true,
                wmi_access: true,
                admin_elevation: true,
                ioreg_access: false,
                sudo_elevation: false,
                sip_compatibility: false,
            },
            Platform::MacOs => Capabilities {
                modify_mac: true,
                modify_machine_guid: false,
                modify_volume_serial: false,
                registry_access: false,
                wmi_access: false,
                admin_elevation: false,
                ioreg_access: true,
                sudo_elevation: true,
                sip_compatibility: true,
            },
        }
    }

    pub fn supports(&self, operation: Operation) -> bool {
        match operation {
            Operation::ModifyMac | Operation::RestoreMac => self.modify_mac,
            Operation::ModifyMachineGuid => self.modify_machine_guid,
            Operation::ModifyVolumeSerial => self.modify_volume_serial,
            Operation::ModifyRegistry => self.registry_access,
            Operation::ReadIoreg => self.ioreg_access,
            Operation::ReadHardwareInfo => true,
        }
    }

    pub fn as_map(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            ("modify_mac", self.modify_mac),
            ("modify_machine_guid", self.modify_machine_guid),
            ("modify_volume_serial", self.modify_volume_serial),
            ("registry_access", self.registry_access),
            ("wmi_access", self.wmi_access),
            ("admin_elevation", self.admin_elevation),
            ("ioreg_access", self.ioreg_access),
            ("sudo_elevation", self.sudo_elevation),
            ("sip_compatibility", self.sip_compatibility),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_windows_and_macos_are_supported() {
        assert_eq!(Platform::from_os("windows").unwrap(), Platform::Windows);
        assert_eq!(Platform::from_os("macos").unwrap(), Platform::MacOs);
        assert!(matches!(
            Platform::from_os("linux"),
            Err(Error::PlatformNotSupported(_))
        ));
    }

    #[test]
    fn macos_cannot_rewrite_identity() {
        let caps = Capabilities::for_platform(Platform::MacOs);
        assert!(!caps.supports(Operation::ModifyMachineGuid));
        assert!(!caps.supports(Operation::ModifyVolumeSerial));
        assert!(caps.supports(Operation::ModifyMac));
    }

    #[test]
    fn windows_declares_identity_mutation() {
        let caps = Capabilities::for_platform(Platform::Windows);
        assert!(caps.supports(Operation::ModifyMachineGuid));
        assert!(caps.supports(Operation::ModifyVolumeSerial));
        assert_eq!(caps.as_map().get("registry_access"), Some(&true));
    }

    #[test]
    fn permission_table_is_per_platform() {
        assert_eq!(
            Operation::ModifyMac.required_permissions(Platform::Windows),
            &["administrator", "registry_write"]
        );
        assert_eq!(
            Operation::ModifyMac.required_permissions(Platform::MacOs),
            &["sudo", "network_interface_access"]
        );
        assert!(Operation::ReadHardwareInfo
            .required_permissions(Platform::Windows)
            .is_empty());
    }
}
