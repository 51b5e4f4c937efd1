//! Test doubles for the OS-facing seams.

use crate::command::{CommandOutput, CommandRunner};
use crate::engine::{CancelToken, FingerprintEngine, PermissionChecker};
use crate::error::{Error, Result};
use crate::model::{
    AdapterType, MachineIdentity, NetworkAdapter, PlatformHandle, SystemInfo, VolumeIdentity,
};
use crate::platform::{Operation, Platform};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::Mutex;
use std::time::Duration;

/// Answers commands from a script keyed by command-line prefix and records
/// every invocation.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, prefix: &str, stdout: &str) -> Self {
        self.push(prefix, CommandOutput {
            status: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        });
        self
    }

    pub fn fail(self, prefix: &str, stderr: &str) -> Self {
        self.push(prefix, CommandOutput {
            status: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        });
        self
    }

    /// Replaces the answer for `prefix` on an already shared runner.
    pub fn set(&self, prefix: &str, stdout: &str) {
        self.rules.lock().retain(|(p, _)| p != prefix);
        self.push(prefix, CommandOutput {
            status: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        });
    }

    fn push(&self, prefix: &str, output: CommandOutput) {
        self.rules.lock().push((prefix.to_string(), output));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str], _timeout: Duration) -> Result<CommandOutput> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.lock().push(line.clone());
        let rules = self.rules.lock().clone();
        Ok(rules
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, output)| output.clone())
            .unwrap_or(CommandOutput {
                status: Some(127),
                stdout: String::new(),
                stderr: format!("not scripted: {line}"),
            }))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StaticPermissions {
    pub platform: Platform,
    pub admin: bool,
    pub elevate: bool,
}

impl StaticPermissions {
    pub fn elevated(platform: Platform) -> Self {
        Self {
            platform,
            admin: true,
            elevate: true,
        }
    }

    pub fn unprivileged(platform: Platform) -> Self {
        Self {
            platform,
            admin: false,
            elevate: false,
        }
    }
}

impl PermissionChecker for StaticPermissions {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn has_admin(&self) -> bool {
        self.admin
    }

    fn can_elevate(&self) -> bool {
        self.elevate
    }

    fn ensure(&self, operation: Operation) -> bool {
        !operation.is_mutating() || self.admin || self.elevate
    }
}

/// Builds an adapter the way the host engines report one.
pub fn adapter(id: &str, mac: &str, can_modify: bool) -> NetworkAdapter {
    NetworkAdapter {
        id: id.to_string(),
        name: format!("{id} name"),
        description: format!("{id} description"),
        mac_address: mac.to_string(),
        status: "enabled".to_string(),
        adapter_type: AdapterType::Ethernet,
        can_modify,
        handle: if can_modify {
            PlatformHandle::InterfaceName(id.to_string())
        } else {
            PlatformHandle::None
        },
    }
}

/// In-memory engine holding live state that mutations actually change.
#[derive(Debug)]
pub struct FakeEngine {
    platform: Platform,
    adapters: Mutex<Vec<NetworkAdapter>>,
    identity: Mutex<MachineIdentity>,
    volumes: BTreeMap<String, String>,
    writes: AtomicUsize,
    restores: AtomicUsize,
}

impl FakeEngine {
    pub fn new(platform: Platform, adapters: Vec<NetworkAdapter>) -> Self {
        Self {
            platform,
            adapters: Mutex::new(adapters),
            identity: Mutex::new(MachineIdentity {
                value: "3f2504e0-4f89-11d3-9a0c-0305e82c3301".to_string(),
                mutable: platform == Platform::Windows,
            }),
            volumes: BTreeMap::from([("C:".to_string(), "8A3F21C4".to_string())]),
            writes: AtomicUsize::new(0),
            restores: AtomicUsize::new(0),
        }
    }

    /// Native writes performed so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }

    pub fn set_mac(&self, adapter_id: &str, mac: &str) {
        for adapter in self.adapters.lock().iter_mut().filter(|a| a.id == adapter_id) {
            adapter.mac_address = mac.to_string();
        }
    }

    fn snapshot(&self) -> Vec<NetworkAdapter> {
        self.adapters.lock().clone()
    }
}

impl FingerprintEngine for FakeEngine {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn list_adapters(&self) -> Result<Vec<NetworkAdapter>> {
        Ok(self.snapshot())
    }

    fn modify_mac(&self, adapter_id: &str, new_mac: &str, cancel: &CancelToken) -> Result<bool> {
        if !crate::mac::is_valid_mac(new_mac) {
            return Err(Error::NetworkAdapter(format!("invalid MAC address: {new_mac}")));
        }
        let adapter = self
            .find_adapter(adapter_id)?
            .ok_or_else(|| Error::NetworkAdapter(format!("adapter {adapter_id} not found")))?;
        if !adapter.can_modify {
            return Err(Error::NetworkAdapter(format!("adapter {adapter_id} cannot be modified")));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.set_mac(adapter_id, &crate::mac::normalize(new_mac));
        Ok(true)
    }

    fn restore_original_mac(&self, adapter_id: &str) -> Result<bool> {
        self.find_adapter(adapter_id)?
            .ok_or_else(|| Error::NetworkAdapter(format!("adapter {adapter_id} not found")))?;
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn get_machine_identity(&self) -> Result<MachineIdentity> {
        Ok(self.identity.lock().clone())
    }

    fn modify_machine_identity(&self, new_value: &str) -> Result<bool> {
        let mut identity = self.identity.lock();
        if !identity.mutable {
            return Err(Error::Operation("machine identity is read-only".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        identity.value = new_value.to_lowercase();
        Ok(true)
    }

    fn get_volume_identities(&self) -> Result<VolumeIdentity> {
        Ok(VolumeIdentity {
            volumes: self.volumes.clone(),
            mutable: false,
        })
    }

    fn modify_volume_identity(&self, drive: &str, _new_serial: &str) -> Result<bool> {
        Err(Error::Operation(format!("volume {drive} is read-only")))
    }

    fn hardware_info(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "bios": { "SerialNumber": "FAKE-0001" } }))
    }

    fn system_info(&self) -> SystemInfo {
        SystemInfo::with_version("test")
    }
}
