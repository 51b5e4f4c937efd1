//! The contract every per-OS implementation fulfils.

use crate::error::Result;
use crate::model::{
    FingerprintSnapshot, MachineIdentity, NetworkAdapter, SystemInfo, VolumeIdentity,
};
use crate::platform::{Operation, Platform};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps in short slices; returns false if cancelled before `total` elapsed.
    pub fn sleep(&self, total: Duration) -> bool {
        let slice = Duration::from_millis(50);
        let mut left = total;
        while !left.is_zero() {
            if self.is_cancelled() {
                return false;
            }
            let step = left.min(slice);
            std::thread::sleep(step);
            left -= step;
        }
        !self.is_cancelled()
    }
}

pub trait PermissionChecker: Send + Sync {
    fn platform(&self) -> Platform;

    /// Process is elevated (administrator token / euid 0).
    fn has_admin(&self) -> bool;

    /// An elevation mechanism is usable without prompting.
    fn can_elevate(&self) -> bool;

    fn required_permissions(&self, operation: Operation) -> Vec<String> {
        operation
            .required_permissions(self.platform())
            .iter()
            .map(|p| p.to_string())
            .collect()
    }

    fn ensure(&self, operation: Operation) -> bool;

    fn current_user(&self) -> String {
        crate::current_user()
    }

    /// OS-level protection that limits what can be changed even when
    /// elevated, keyed by mechanism (`sip` on macOS). Empty when none applies.
    fn protection_status(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }
}

pub trait FingerprintEngine: Send + Sync {
    fn platform(&self) -> Platform;

    fn list_adapters(&self) -> Result<Vec<NetworkAdapter>>;

    fn find_adapter(&self, adapter_id: &str) -> Result<Option<NetworkAdapter>> {
        Ok(self
            .list_adapters()?
            .into_iter()
            .find(|adapter| adapter.id == adapter_id))
    }

    fn get_mac(&self, adapter_id: &str) -> Result<Option<String>> {
        Ok(self.find_adapter(adapter_id)?.map(|a| a.mac_address))
    }

    /// Returns true once the native write succeeded, even if the adapter
    /// has not yet come back with the new address. Cancelling before the
    /// write aborts cleanly; afterwards it only stops verification.
    fn modify_mac(&self, adapter_id: &str, new_mac: &str, cancel: &CancelToken) -> Result<bool>;

    /// Clears the override so the burned-in address comes back.
    fn restore_original_mac(&self, adapter_id: &str) -> Result<bool>;

    fn get_machine_identity(&self) -> Result<MachineIdentity>;

    fn modify_machine_identity(&self, new_value: &str) -> Result<bool>;

    fn get_volume_identities(&self) -> Result<VolumeIdentity>;

    fn modify_volume_identity(&self, drive: &str, new_serial: &str) -> Result<bool>;

    fn hardware_info(&self) -> Result<serde_json::Value>;

    fn system_info(&self) -> SystemInfo;

    fn snapshot_fingerprint(&self) -> Result<FingerprintSnapshot> {
        let adapters = self.list_adapters()?;
        let machine_identity = match self.get_machine_identity() {
            Ok(identity) => Some(identity),
            Err(err) => {
                tracing::warn!(error = %err, "machine identity unavailable for snapshot");
                None
            }
        };
        let volumes = self.get_volume_identities()?;
        let hardware = self.hardware_info()?;
        Ok(FingerprintSnapshot {
            timestamp: crate::now_utc_rfc3339(),
            platform: self.platform(),
            system_info: self.system_info(),
            adapters,
            machine_identity,
            volumes,
            hardware,
        })
    }
}
