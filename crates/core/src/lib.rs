use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

pub mod command;
pub mod engine;
pub mod error;
pub mod mac;
pub mod model;
pub mod platform;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use command::{run_checked, CommandOutput, CommandRunner, SystemRunner};
pub use engine::{CancelToken, FingerprintEngine, PermissionChecker};
pub use error::{Error, Result};
pub use model::{
    AdapterType, ChangeSet, FingerprintSnapshot, MachineIdentity, NetworkAdapter,
    OperationRecord, OperationType, PlatformHandle, RiskLevel, SystemInfo, ValidationResult,
    VolumeIdentity,
};
pub use platform::{Capabilities, Operation, Platform};

pub const BACKUP_SCHEMA_VERSION: &str = "1.0.0";

pub fn now_utc_rfc3339() -> String {
    format_rfc3339(OffsetDateTime::now_utc())
}

pub fn format_rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn parse_rfc3339(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).ok()
}

/// `YYYYmmdd_HHMMSS`, used inside backup ids.
pub fn compact_stamp(at: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

/// `YYYY-mm-dd HH:MM:SS`, the human-readable duplicate stored next to RFC 3339 stamps.
pub fn readable_stamp(at: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

/// First eight hex digits of a fresh v4 uuid.
pub fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn stamps_are_zero_padded() {
        let at = datetime!(2024-03-05 07:08:09 UTC);
        assert_eq!(compact_stamp(at), "20240305_070809");
        assert_eq!(readable_stamp(at), "2024-03-05 07:08:09");
    }

    #[test]
    fn rfc3339_round_trips_through_parse() {
        let now = now_utc_rfc3339();
        assert!(parse_rfc3339(&now).is_some());
        assert!(parse_rfc3339("yesterday").is_none());
    }

    #[test]
    fn short_id_is_eight_hex_digits() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
