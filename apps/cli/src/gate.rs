use crate::Confirm;
use anyhow::{anyhow, Result};
use janus_core::RiskLevel;
use janus_engine::FingerprintService;
use janus_safety::{can_apply, SafetyContext, SafetyDecision};

/// Applies the confirmation / force rules to a change of the given risk.
pub fn require(service: &FingerprintService, confirm: Confirm, risk: RiskLevel) -> Result<()> {
    let ctx = SafetyContext {
        confirmed: confirm.yes,
        force_mode: confirm.force,
    };
    match can_apply(&ctx, risk, service.security().require_confirmation) {
        SafetyDecision::Allow => Ok(()),
        SafetyDecision::Deny(reason) => {
            eprintln!("risk level: {risk}");
            Err(anyhow!(reason))
        }
    }
}

pub fn report_rejection(risk: RiskLevel, errors: &[String], guidance: Option<&str>) {
    eprintln!("risk level: {risk}");
    for error in errors {
        eprintln!("  error: {error}");
    }
    if let Some(guidance) = guidance {
        eprintln!("note: {guidance}");
    }
}
