//! Change-set validation and the gate every mutation passes before it runs.

pub mod validation;

pub use validation::validate;

use janus_core::RiskLevel;

#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyContext {
    /// The operator confirmed the change (`--yes`).
    pub confirmed: bool,
    /// The operator accepted high-risk changes (`--force`).
    pub force_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyDecision {
    Allow,
    Deny(String),
}

impl SafetyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SafetyDecision::Allow)
    }
}

pub fn can_apply(ctx: &SafetyContext, risk: RiskLevel, require_confirmation: bool) -> SafetyDecision {
    if risk == RiskLevel::Critical {
        return SafetyDecision::Deny("Denied: critical-risk changes are never applied".to_string());
    }
    if require_confirmation && !ctx.confirmed {
        return SafetyDecision::Deny("Denied: confirmation required (pass --yes)".to_string());
    }
    if risk >= RiskLevel::High && !ctx.force_mode {
        return SafetyDecision::Deny("Denied: high-risk changes require force-mode".to_string());
    }
    SafetyDecision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_without_confirmation() {
        let ctx = SafetyContext::default();
        assert!(matches!(
            can_apply(&ctx, RiskLevel::Medium, true),
            SafetyDecision::Deny(_)
        ));
        assert!(can_apply(&ctx, RiskLevel::Medium, false).is_allowed());
    }

    #[test]
    fn high_risk_needs_force() {
        let ctx = SafetyContext {
            confirmed: true,
            force_mode: false,
        };
        assert!(matches!(
            can_apply(&ctx, RiskLevel::High, true),
            SafetyDecision::Deny(_)
        ));
        let ctx = SafetyContext {
            confirmed: true,
            force_mode: true,
        };
        assert!(can_apply(&ctx, RiskLevel::High, true).is_allowed());
    }

    #[test]
    fn critical_is_always_denied() {
        let ctx = SafetyContext {
            confirmed: true,
            force_mode: true,
        };
        assert!(matches!(
            can_apply(&ctx, RiskLevel::Critical, false),
            SafetyDecision::Deny(_)
        ));
    }
}
