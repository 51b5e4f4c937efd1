use crate::elevation;
use crate::registry::RegistryAccess;
use crate::CRYPTOGRAPHY_KEY;
use janus_core::{Operation, PermissionChecker, Platform};
use std::sync::Arc;

/// Administrator detection: an elevated token, or write access to a
/// machine-wide key when the token query is unavailable.
pub struct WindowsPermissions {
    registry: Arc<dyn RegistryAccess>,
}

impl WindowsPermissions {
    pub fn new(registry: Arc<dyn RegistryAccess>) -> Self {
        Self { registry }
    }
}

impl PermissionChecker for WindowsPermissions {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn has_admin(&self) -> bool {
        elevation::is_elevated() || self.registry.can_write(CRYPTOGRAPHY_KEY)
    }

    fn can_elevate(&self) -> bool {
        cfg!(windows)
    }

    fn ensure(&self, operation: Operation) -> bool {
        let allowed = !operation.is_mutating() || self.has_admin();
        if !allowed {
            tracing::debug!(%operation, "administrator rights missing");
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;

    #[test]
    fn writable_machine_key_counts_as_admin() {
        let registry = Arc::new(MemoryRegistry::new());
        let perms = WindowsPermissions::new(registry.clone());
        assert!(perms.has_admin());
        assert!(perms.ensure(Operation::ModifyMac));

        registry.set_read_only(true);
        // off Windows the token probe is the stub, so only the key decides
        if !cfg!(windows) {
            assert!(!perms.has_admin());
            assert!(!perms.ensure(Operation::ModifyMachineGuid));
        }
        assert!(perms.ensure(Operation::ReadHardwareInfo));
        assert_eq!(
            perms.required_permissions(Operation::ModifyVolumeSerial),
            vec!["administrator".to_string(), "disk_access".to_string()]
        );
    }
}
