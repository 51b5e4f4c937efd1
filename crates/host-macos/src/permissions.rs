use janus_core::{run_checked, CommandRunner, Operation, PermissionChecker, Platform};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const SUDO_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// System Integrity Protection as reported by `csrutil status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SipStatus {
    /// `None` when csrutil could not be run.
    pub enabled: Option<bool>,
    pub status: String,
}

pub struct MacPermissions {
    runner: Arc<dyn CommandRunner>,
}

impl MacPermissions {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn sip_status(&self) -> SipStatus {
        match self
            .runner
            .run("csrutil", &["status"], SUDO_PROBE_TIMEOUT)
        {
            Ok(out) if out.success() => SipStatus {
                enabled: Some(out.stdout.to_lowercase().contains("enabled")),
                status: out.stdout.trim().to_string(),
            },
            Ok(out) => SipStatus {
                enabled: None,
                status: format!("error: {}", out.stderr.trim()),
            },
            Err(err) => SipStatus {
                enabled: None,
                status: format!("error: {err}"),
            },
        }
    }
}

#[cfg(unix)]
fn effective_uid_is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn effective_uid_is_root() -> bool {
    false
}

impl PermissionChecker for MacPermissions {
    fn platform(&self) -> Platform {
        Platform::MacOs
    }

    fn has_admin(&self) -> bool {
        effective_uid_is_root()
    }

    /// Passwordless sudo is available right now.
    fn can_elevate(&self) -> bool {
        run_checked(
            self.runner.as_ref(),
            "sudo",
            &["-n", "echo", "test"],
            SUDO_PROBE_TIMEOUT,
        )
        .is_ok()
    }

    fn ensure(&self, operation: Operation) -> bool {
        !operation.is_mutating() || self.has_admin() || self.can_elevate()
    }

    fn protection_status(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut status = serde_json::Map::new();
        if let Ok(sip) = serde_json::to_value(self.sip_status()) {
            status.insert("sip".to_string(), sip);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_core::testing::ScriptedRunner;

    #[test]
    fn sudo_probe_decides_elevation() {
        let runner = Arc::new(ScriptedRunner::new().on("sudo -n echo test", "test\n"));
        let perms = MacPermissions::new(runner.clone());
        assert!(perms.can_elevate());
        assert!(perms.ensure(Operation::ModifyMac));

        let perms = MacPermissions::new(Arc::new(
            ScriptedRunner::new().fail("sudo -n", "sudo: a password is required"),
        ));
        assert!(!perms.can_elevate());
        assert!(perms.ensure(Operation::ReadIoreg));
        if !perms.has_admin() {
            assert!(!perms.ensure(Operation::ModifyMac));
        }
    }

    #[test]
    fn sip_status_reports_errors() {
        let perms = MacPermissions::new(Arc::new(ScriptedRunner::new().on(
            "csrutil status",
            "System Integrity Protection status: enabled.\n",
        )));
        assert_eq!(perms.sip_status().enabled, Some(true));

        let checker: &dyn PermissionChecker = &perms;
        assert_eq!(checker.protection_status()["sip"]["enabled"], true);

        let perms = MacPermissions::new(Arc::new(ScriptedRunner::new()));
        let sip = perms.sip_status();
        assert_eq!(sip.enabled, None);
        assert!(sip.status.starts_with("error:"));
    }
}
