//! Text parsers for `ifconfig`, `networksetup`, `system_profiler`, `ioreg`,
//! `df` and `sw_vers` output.

use janus_core::mac::normalize;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn pattern(cell: &'static OnceLock<Option<Regex>>, re: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(re).ok()).as_ref()
}

fn capture(cell: &'static OnceLock<Option<Regex>>, re: &str, text: &str) -> Option<String> {
    pattern(cell, re)?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub mac_address: Option<String>,
    pub status: Option<String>,
    pub ipv4: Option<String>,
}

/// Interfaces that report an `ether` line, in output order.
pub fn parse_ifconfig(output: &str) -> Vec<Interface> {
    static ETHER: OnceLock<Option<Regex>> = OnceLock::new();
    static STATUS: OnceLock<Option<Regex>> = OnceLock::new();
    static INET: OnceLock<Option<Regex>> = OnceLock::new();

    let mut interfaces = Vec::new();
    let mut current: Option<Interface> = None;

    for line in output.lines() {
        if line.is_empty() {
            continue;
        }
        if !line.starts_with(char::is_whitespace) {
            if let Some(done) = current.take() {
                interfaces.push(done);
            }
            if let Some((name, _)) = line.split_once(':') {
                current = Some(Interface {
                    name: name.to_string(),
                    ..Interface::default()
                });
            }
            continue;
        }
        let Some(iface) = current.as_mut() else {
            continue;
        };
        if let Some(mac) = capture(&ETHER, r"ether ([a-fA-F0-9:]{17})", line) {
            iface.mac_address = Some(normalize(&mac));
        } else if let Some(status) = capture(&STATUS, r"status: (\w+)", line) {
            iface.status = Some(status);
        } else if let Some(ip) = capture(&INET, r"inet (\d+\.\d+\.\d+\.\d+)", line) {
            iface.ipv4.get_or_insert(ip);
        }
    }
    if let Some(done) = current {
        interfaces.push(done);
    }
    interfaces.retain(|iface| iface.mac_address.is_some());
    interfaces
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardwarePort {
    pub port: String,
    pub device: String,
    pub mac_address: Option<String>,
}

/// `networksetup -listallhardwareports` blocks.
pub fn parse_hardware_ports(output: &str) -> Vec<HardwarePort> {
    let mut ports = Vec::new();
    let mut current: Option<HardwarePort> = None;

    for line in output.lines().map(str::trim) {
        if let Some(port) = line.strip_prefix("Hardware Port:") {
            if let Some(done) = current.take() {
                ports.push(done);
            }
            current = Some(HardwarePort {
                port: port.trim().to_string(),
                ..HardwarePort::default()
            });
        } else if let Some(port) = current.as_mut() {
            if let Some(device) = line.strip_prefix("Device:") {
                port.device = device.trim().to_string();
            } else if let Some(mac) = line.strip_prefix("Ethernet Address:") {
                let mac = mac.trim();
                if mac.len() == 17 {
                    port.mac_address = Some(normalize(mac));
                }
            }
        }
    }
    if let Some(done) = current {
        ports.push(done);
    }
    ports
}

/// `key: value` lines of `system_profiler`, section headers dropped.
pub fn parse_profiler(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .map(str::trim)
        .filter_map(|line| line.split_once(':'))
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

pub fn hardware_uuid(profiler: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    capture(&RE, r"Hardware UUID: ([A-F0-9-]+)", profiler)
}

pub fn profiler_serial(profiler: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    capture(&RE, r"Serial Number \(system\): (\S+)", profiler)
}

pub fn ioreg_uuid(ioreg: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    capture(&RE, r#""IOPlatformUUID" = "([^"]+)""#, ioreg)
}

pub fn ioreg_serial(ioreg: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    capture(&RE, r#""IOPlatformSerialNumber" = "([^"]+)""#, ioreg)
}

/// Mount point -> backing filesystem, for rows mounted at an absolute path.
pub fn parse_df(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 6 {
                return None;
            }
            let mount = parts.last().filter(|m| m.starts_with('/'))?;
            Some((mount.to_string(), parts[0].to_string()))
        })
        .collect()
}

/// `ProductVersion` out of `sw_vers`.
pub fn sw_vers_version(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == "ProductVersion")
        .map(|(_, value)| value.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const IFCONFIG: &str = "lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384
\tinet 127.0.0.1 netmask 0xff000000
en0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether a4:83:e7:12:34:56
\tinet 192.168.1.20 netmask 0xffffff00 broadcast 192.168.1.255
\tstatus: active
bridge0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether 82:1f:0a:aa:bb:01
\tstatus: inactive
";

    #[test]
    fn ifconfig_keeps_interfaces_with_mac() {
        let ifaces = parse_ifconfig(IFCONFIG);
        assert_eq!(ifaces.len(), 2);
        assert_eq!(ifaces[0].name, "en0");
        assert_eq!(ifaces[0].mac_address.as_deref(), Some("A4:83:E7:12:34:56"));
        assert_eq!(ifaces[0].status.as_deref(), Some("active"));
        assert_eq!(ifaces[0].ipv4.as_deref(), Some("192.168.1.20"));
        assert_eq!(ifaces[1].status.as_deref(), Some("inactive"));
    }

    #[test]
    fn hardware_ports_split_on_port_lines() {
        let out = "\nHardware Port: Wi-Fi\nDevice: en0\nEthernet Address: a4:83:e7:12:34:56\n\n\
Hardware Port: Thunderbolt Bridge\nDevice: bridge0\nEthernet Address: N/A\n\nVLAN Configurations\n===================\n";
        let ports = parse_hardware_ports(out);
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].port, "Wi-Fi");
        assert_eq!(ports[0].device, "en0");
        assert_eq!(ports[0].mac_address.as_deref(), Some("A4:83:E7:12:34:56"));
        assert_eq!(ports[1].mac_address, None);
    }

    #[test]
    fn profiler_and_ioreg_identifiers() {
        let profiler = "Hardware:\n\n    Hardware Overview:\n\n      Model Name: MacBook Pro\n      Serial Number (system): C02XK1ABCDEF\n      Hardware UUID: 12345678-ABCD-EF01-2345-6789ABCDEF01\n";
        assert_eq!(
            hardware_uuid(profiler).as_deref(),
            Some("12345678-ABCD-EF01-2345-6789ABCDEF01")
        );
        assert_eq!(profiler_serial(profiler).as_deref(), Some("C02XK1ABCDEF"));
        let map = parse_profiler(profiler);
        assert_eq!(map.get("Model Name").map(String::as_str), Some("MacBook Pro"));
        assert!(!map.contains_key("Hardware"));

        let ioreg = "+-o J314sAP  <class IOPlatformExpertDevice>\n    {\n      \"IOPlatformSerialNumber\" = \"C02XK1ABCDEF\"\n      \"IOPlatformUUID\" = \"12345678-ABCD-EF01-2345-6789ABCDEF01\"\n    }\n";
        assert_eq!(ioreg_serial(ioreg).as_deref(), Some("C02XK1ABCDEF"));
        assert_eq!(
            ioreg_uuid(ioreg).as_deref(),
            Some("12345678-ABCD-EF01-2345-6789ABCDEF01")
        );
    }

    #[test]
    fn df_and_sw_vers() {
        let df = "Filesystem     512-blocks      Used Available Capacity iused      ifree %iused  Mounted on\n\
/dev/disk3s1s1  965595304  19876504 400000000     5%  403755 2000000000    0%   /\n\
devfs                 403       403         0   100%     698          0  100%   /dev\n\
map auto_home           0         0         0   100%       0          0  100%   /System/Volumes/Data/home\n";
        let volumes = parse_df(df);
        assert_eq!(volumes.get("/").map(String::as_str), Some("/dev/disk3s1s1"));
        assert_eq!(volumes.get("/dev").map(String::as_str), Some("devfs"));
        assert_eq!(volumes.len(), 3);

        let sw = "ProductName:\t\tmacOS\nProductVersion:\t\t14.4.1\nBuildVersion:\t\t23E224\n";
        assert_eq!(sw_vers_version(sw).as_deref(), Some("14.4.1"));
    }
}
