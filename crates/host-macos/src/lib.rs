//! macOS fingerprint engine built on `ifconfig`, `networksetup`,
//! `system_profiler` and `ioreg`.

pub mod parse;
pub mod permissions;

#[cfg(target_os = "macos")]
mod sysctl;
#[cfg(not(target_os = "macos"))]
#[path = "sysctl_stub.rs"]
mod sysctl;

pub use permissions::{MacPermissions, SipStatus};

use janus_core::command::DEFAULT_TIMEOUT;
use janus_core::mac;
use janus_core::{
    run_checked, AdapterType, CancelToken, CommandRunner, Error, FingerprintEngine,
    MachineIdentity, NetworkAdapter, Operation, PermissionChecker, Platform, PlatformHandle,
    Result, SystemInfo, SystemRunner, VolumeIdentity,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Adapter class from the BSD interface name.
pub fn classify(interface: &str) -> AdapterType {
    let name = interface.to_lowercase();
    if name.starts_with("en") {
        AdapterType::Ethernet
    } else if name.starts_with("wi") || name.starts_with("wl") {
        AdapterType::Wireless
    } else if name.starts_with("bt") || name.starts_with("bluetooth") {
        AdapterType::Bluetooth
    } else if ["vmnet", "vnic", "utun"].iter().any(|p| name.starts_with(p)) {
        AdapterType::Virtual
    } else {
        AdapterType::Other
    }
}

pub struct MacEngine {
    runner: Arc<dyn CommandRunner>,
    permissions: Arc<dyn PermissionChecker>,
    timeout: Duration,
    settle: Duration,
    bounce: Duration,
}

impl MacEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, permissions: Arc<dyn PermissionChecker>) -> Self {
        Self {
            runner,
            permissions,
            timeout: DEFAULT_TIMEOUT,
            settle: Duration::from_secs(1),
            bounce: Duration::from_secs(2),
        }
    }

    pub fn native() -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let permissions = Arc::new(MacPermissions::new(runner.clone()));
        Self::new(runner, permissions)
    }

    /// Delays before verifying a new address and between `down`/`up`.
    pub fn with_delays(mut self, settle: Duration, bounce: Duration) -> Self {
        self.settle = settle;
        self.bounce = bounce;
        self
    }

    pub fn permissions(&self) -> Arc<dyn PermissionChecker> {
        self.permissions.clone()
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        run_checked(self.runner.as_ref(), program, args, self.timeout)
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

    fn interface_for_write(&self, adapter_id: &str) -> Result<String> {
        let adapter = self
            .find_adapter(adapter_id)?
            .ok_or_else(|| Error::NetworkAdapter(format!("adapter {adapter_id} not found")))?;
        match (adapter.handle, adapter.can_modify) {
            (PlatformHandle::InterfaceName(name), true) => Ok(name),
            _ => Err(Error::NetworkAdapter(format!(
                "adapter {adapter_id} cannot be modified"
            ))),
        }
    }

    fn profiler(&self) -> Result<String> {
        self.run("system_profiler", &["SPHardwareDataType"])
    }

    fn ioreg(&self) -> Result<String> {
        self.run("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"])
    }
}

impl FingerprintEngine for MacEngine {
    fn platform(&self) -> Platform {
        Platform::MacOs
    }

    fn list_adapters(&self) -> Result<Vec<NetworkAdapter>> {
        let interfaces = parse::parse_ifconfig(&self.run("ifconfig", &[])?);
        let ports = match self.run("networksetup", &["-listallhardwareports"]) {
            Ok(out) => parse::parse_hardware_ports(&out),
            Err(err) => {
                tracing::warn!(error = %err, "networksetup unavailable; using interface names");
                Vec::new()
            }
        };

        let adapters = interfaces
            .into_iter()
            .map(|iface| {
                let mac_address = iface.mac_address.unwrap_or_default();
                let port = ports.iter().find(|p| {
                    p.device == iface.name
                        || p.mac_address
                            .as_deref()
                            .is_some_and(|m| mac::same_mac(m, &mac_address))
                });
                NetworkAdapter {
                    id: iface.name.clone(),
                    name: port
                        .map(|p| p.port.clone())
                        .unwrap_or_else(|| iface.name.clone()),
                    description: port
                        .map(|p| format!("{} ({})", p.port, iface.name))
                        .unwrap_or_else(|| iface.name.clone()),
                    can_modify: !mac_address.is_empty(),
                    mac_address,
                    status: iface.status.unwrap_or_else(|| "unknown".to_string()),
                    adapter_type: classify(&iface.name),
                    handle: PlatformHandle::InterfaceName(iface.name),
                }
            })
            .collect::<Vec<_>>();
        tracing::debug!(count = adapters.len(), "enumerated interfaces");
        Ok(adapters)
    }

    fn modify_mac(&self, adapter_id: &str, new_mac: &str, cancel: &CancelToken) -> Result<bool> {
        if !mac::is_valid_mac(new_mac) {
            return Err(Error::NetworkAdapter(format!("invalid MAC address: {new_mac}")));
        }
        let interface = self.interface_for_write(adapter_id)?;
        self.require(Operation::ModifyMac)?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let wanted = mac::normalize(new_mac).to_lowercase();
        self.run("sudo", &["ifconfig", &interface, "ether", &wanted])
            .map_err(|e| Error::NetworkAdapter(format!("set ether on {interface}: {e}")))?;
        tracing::info!(interface = %interface, new_mac = %wanted, "MAC written");

        if !cancel.sleep(self.settle) {
            tracing::info!(interface = %interface, "verification skipped after cancel");
            return Ok(true);
        }
        match self.get_mac(adapter_id) {
            Ok(Some(current)) if mac::same_mac(&current, new_mac) => {
                tracing::debug!(interface = %interface, "new MAC verified")
            }
            Ok(current) => {
                tracing::warn!(interface = %interface, ?current, "interface has not picked up the new MAC yet")
            }
            Err(err) => tracing::warn!(interface = %interface, error = %err, "MAC verification failed"),
        }
        Ok(true)
    }

    fn restore_original_mac(&self, adapter_id: &str) -> Result<bool> {
        let interface = self.interface_for_write(adapter_id)?;
        self.require(Operation::RestoreMac)?;
        self.run("sudo", &["ifconfig", &interface, "down"])
            .map_err(|e| Error::NetworkAdapter(format!("{interface} down: {e}")))?;
        std::thread::sleep(self.bounce);
        self.run("sudo", &["ifconfig", &interface, "up"])
            .map_err(|e| Error::NetworkAdapter(format!("{interface} up: {e}")))?;
        tracing::info!(interface = %interface, "interface bounced to restore hardware MAC");
        Ok(true)
    }

    fn get_machine_identity(&self) -> Result<MachineIdentity> {
        let value = parse::hardware_uuid(&self.profiler()?)
            .ok_or_else(|| Error::Operation("Hardware UUID not reported".to_string()))?;
        Ok(MachineIdentity {
            value,
            mutable: false,
        })
    }

    fn modify_machine_identity(&self, _new_value: &str) -> Result<bool> {
        tracing::warn!("hardware UUID modification requested");
        Err(Error::Operation(
            "the hardware UUID is read-only on macOS".to_string(),
        ))
    }

    fn get_volume_identities(&self) -> Result<VolumeIdentity> {
        Ok(VolumeIdentity {
            volumes: parse::parse_df(&self.run("df", &[])?),
            mutable: false,
        })
    }

    fn modify_volume_identity(&self, drive: &str, _new_serial: &str) -> Result<bool> {
        tracing::warn!(drive, "volume identity modification requested");
        Err(Error::Operation(format!(
            "volume identity of {drive} cannot be changed on macOS"
        )))
    }

    fn hardware_info(&self) -> Result<Value> {
        let profiler = self.profiler().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "system_profiler unavailable");
            String::new()
        });
        let ioreg = self.ioreg().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "ioreg unavailable");
            String::new()
        });

        Ok(json!({
            "hardware_overview": parse::parse_profiler(&profiler),
            "hardware_uuid": parse::hardware_uuid(&profiler),
            "platform_serial": parse::profiler_serial(&profiler).or_else(|| parse::ioreg_serial(&ioreg)),
            "ioreg": {
                "platform_uuid": parse::ioreg_uuid(&ioreg),
                "platform_serial": parse::ioreg_serial(&ioreg),
            },
            "cpu": {
                "brand_string": sysctl::string("machdep.cpu.brand_string"),
                "core_count": sysctl::number("hw.ncpu"),
            },
            "memory": {
                "physical_memory": sysctl::number("hw.memsize"),
            },
        }))
    }

    fn system_info(&self) -> SystemInfo {
        let version = self
            .run("sw_vers", &[])
            .ok()
            .and_then(|out| parse::sw_vers_version(&out))
            .or_else(|| sysctl::string("kern.osproductversion"))
            .unwrap_or_else(|| "unknown".to_string());
        SystemInfo::with_version(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_core::testing::{ScriptedRunner, StaticPermissions};

    const IFCONFIG: &str = "lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384
\tinet 127.0.0.1 netmask 0xff000000
en0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether a4:83:e7:12:34:56
\tstatus: active
utun0: flags=8051<UP,POINTOPOINT,RUNNING,MULTICAST> mtu 1380
\tether 02:00:00:00:00:07
\tstatus: active
";
    const PORTS: &str =
        "Hardware Port: Wi-Fi\nDevice: en0\nEthernet Address: a4:83:e7:12:34:56\n\n";

    fn engine(runner: Arc<ScriptedRunner>, perms: StaticPermissions) -> MacEngine {
        MacEngine::new(runner, Arc::new(perms)).with_delays(Duration::ZERO, Duration::ZERO)
    }

    fn runner() -> Arc<ScriptedRunner> {
        Arc::new(
            ScriptedRunner::new()
                .on("ifconfig", IFCONFIG)
                .on("networksetup -listallhardwareports", PORTS)
                .on("sudo ifconfig", ""),
        )
    }

    #[test]
    fn classifies_interface_names() {
        assert_eq!(classify("en0"), AdapterType::Ethernet);
        assert_eq!(classify("wlan0"), AdapterType::Wireless);
        assert_eq!(classify("bt0"), AdapterType::Bluetooth);
        assert_eq!(classify("utun3"), AdapterType::Virtual);
        assert_eq!(classify("bridge0"), AdapterType::Other);
    }

    #[test]
    fn merges_ports_into_interfaces() {
        let engine = engine(runner(), StaticPermissions::elevated(Platform::MacOs));
        let adapters = engine.list_adapters().unwrap();
        assert_eq!(adapters.len(), 2);
        assert_eq!(adapters[0].id, "en0");
        assert_eq!(adapters[0].name, "Wi-Fi");
        assert_eq!(adapters[0].handle, PlatformHandle::InterfaceName("en0".into()));
        assert!(adapters[0].can_modify);
        assert_eq!(adapters[1].name, "utun0");
        assert_eq!(adapters[1].adapter_type, AdapterType::Virtual);
    }

    #[test]
    fn modify_reports_success_before_interface_catches_up() {
        let runner = runner();
        let engine = engine(runner.clone(), StaticPermissions::elevated(Platform::MacOs));
        assert!(engine
            .modify_mac("en0", "02:11:22:33:44:55", &CancelToken::new())
            .unwrap());
        assert_eq!(runner.count("sudo ifconfig en0 ether 02:11:22:33:44:55"), 1);
    }

    #[test]
    fn modify_is_verified_once_interface_reports_new_mac() {
        let runner = runner();
        let engine = engine(runner.clone(), StaticPermissions::elevated(Platform::MacOs));
        runner.set("ifconfig", &IFCONFIG.replace("a4:83:e7:12:34:56", "02:11:22:33:44:55"));
        runner.set("networksetup -listallhardwareports", "");
        assert!(engine
            .modify_mac("en0", "02:11:22:33:44:55", &CancelToken::new())
            .unwrap());
    }

    #[test]
    fn modify_without_rights_runs_nothing() {
        let runner = runner();
        let engine = engine(runner.clone(), StaticPermissions::unprivileged(Platform::MacOs));
        assert!(matches!(
            engine.modify_mac("en0", "02:11:22:33:44:55", &CancelToken::new()),
            Err(Error::Permission(_))
        ));
        assert_eq!(runner.count("sudo"), 0);
    }

    #[test]
    fn restore_bounces_interface() {
        let runner = runner();
        let engine = engine(runner.clone(), StaticPermissions::elevated(Platform::MacOs));
        assert!(engine.restore_original_mac("en0").unwrap());
        assert_eq!(runner.count("sudo ifconfig en0 down"), 1);
        assert_eq!(runner.count("sudo ifconfig en0 up"), 1);
    }

    #[test]
    fn identity_is_read_only() {
        let runner = Arc::new(ScriptedRunner::new().on(
            "system_profiler SPHardwareDataType",
            "      Hardware UUID: 12345678-ABCD-EF01-2345-6789ABCDEF01\n",
        ));
        let engine = engine(runner, StaticPermissions::elevated(Platform::MacOs));
        let identity = engine.get_machine_identity().unwrap();
        assert_eq!(identity.value, "12345678-ABCD-EF01-2345-6789ABCDEF01");
        assert!(!identity.mutable);
        assert!(matches!(
            engine.modify_machine_identity("6f9619ff-8b86-d011-b42d-00c04fc964ff"),
            Err(Error::Operation(_))
        ));
        assert!(matches!(
            engine.modify_volume_identity("/", "x"),
            Err(Error::Operation(_))
        ));
    }
}
