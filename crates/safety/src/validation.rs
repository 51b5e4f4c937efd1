use janus_core::mac::is_valid_mac;
use janus_core::{
    Capabilities, ChangeSet, FingerprintEngine, NetworkAdapter, Operation, PermissionChecker,
    RiskLevel, ValidationResult,
};
use uuid::Uuid;

/// Checks a change set against live adapter state, the capability table and
/// the caller's privileges. Never writes anything.
pub fn validate(
    changes: &ChangeSet,
    engine: &dyn FingerprintEngine,
    permissions: &dyn PermissionChecker,
    capabilities: &Capabilities,
) -> ValidationResult {
    let mut result = ValidationResult::new();

    if !changes.mac_changes.is_empty() {
        check_mac_changes(changes, engine, &mut result);
        check_permission(Operation::ModifyMac, permissions, &mut result);
    }

    if let Some(identity) = &changes.machine_identity {
        if !capabilities.modify_machine_guid {
            result.add_error(format!(
                "machine identity cannot be changed on {}",
                engine.platform()
            ));
            result.escalate(RiskLevel::Critical);
        } else {
            if Uuid::parse_str(identity).is_err() {
                result.add_error(format!("invalid machine identity: {identity}"));
            } else {
                result.add_warning("changing the machine identity may require reactivating installed software");
            }
            result.escalate(RiskLevel::High);
        }
        check_permission(Operation::ModifyMachineGuid, permissions, &mut result);
    }

    if !changes.volume_changes.is_empty() {
        result.add_error("volume identity modification is not supported");
        result.escalate(RiskLevel::Critical);
        check_permission(Operation::ModifyVolumeSerial, permissions, &mut result);
    }

    if !result.is_valid {
        tracing::debug!(risk = %result.risk_level, errors = ?result.errors, "change set rejected");
    }
    result
}

fn check_mac_changes(changes: &ChangeSet, engine: &dyn FingerprintEngine, result: &mut ValidationResult) {
    let adapters: Vec<NetworkAdapter> = match engine.list_adapters() {
        Ok(adapters) => adapters,
        Err(err) => {
            result.add_error(format!("cannot enumerate network adapters: {err}"));
            result.escalate(RiskLevel::Medium);
            return;
        }
    };

    for (adapter_id, new_mac) in &changes.mac_changes {
        let Some(adapter) = adapters.iter().find(|a| &a.id == adapter_id) else {
            result.add_error(format!("adapter not found: {adapter_id}"));
            continue;
        };
        if !adapter.can_modify {
            result.add_error(format!("adapter cannot be modified: {}", adapter.name));
        } else if !is_valid_mac(new_mac) {
            result.add_error(format!("invalid MAC address: {new_mac}"));
        } else {
            result.add_warning(format!(
                "changing the MAC of {} interrupts its network connection",
                adapter.name
            ));
        }
        result.escalate(RiskLevel::Medium);
    }
}

fn check_permission(operation: Operation, permissions: &dyn PermissionChecker, result: &mut ValidationResult) {
    for permission in permissions.required_permissions(operation) {
        result.require_permission(&permission);
    }
    if !permissions.ensure(operation) {
        result.add_error(format!("insufficient privileges for {operation}"));
    }
}
