//! MAC address syntax, canonical form and random generation.

use crate::error::{Error, Result};
use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

const LOCALLY_ADMINISTERED: u8 = 0x02;
const MULTICAST: u8 = 0x01;

fn mac_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})$").ok())
        .as_ref()
}

/// Six hex octet pairs separated by `:` or `-`.
pub fn is_valid_mac(mac: &str) -> bool {
    mac_pattern().is_some_and(|re| re.is_match(mac))
}

fn hex_digits(mac: &str) -> String {
    mac.chars().filter(|c| c.is_ascii_hexdigit()).collect()
}

/// Canonical `XX:XX:XX:XX:XX:XX`. Input that does not carry exactly twelve
/// hex digits is returned unchanged so callers can still report it.
pub fn normalize(mac: &str) -> String {
    let digits = hex_digits(mac);
    if digits.len() != 12 {
        return mac.to_string();
    }
    join_octets(&digits.to_ascii_uppercase())
}

/// Twelve uppercase hex digits without separators, the form the Windows
/// `NetworkAddress` value expects.
pub fn compact(mac: &str) -> String {
    mac.replace([':', '-'], "").to_ascii_uppercase()
}

pub fn same_mac(a: &str, b: &str) -> bool {
    let (a, b) = (hex_digits(a), hex_digits(b));
    a.len() == 12 && a.eq_ignore_ascii_case(&b)
}

fn join_octets(digits: &str) -> String {
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

pub fn generate_random_mac(vendor_prefix: Option<&str>) -> Result<String> {
    generate_random_mac_with(&mut rand::thread_rng(), vendor_prefix)
}

/// Random unicast, locally administered address. A vendor prefix supplies the
/// first three octets; its first octet gets the same bit treatment.
pub fn generate_random_mac_with<R: Rng + ?Sized>(
    rng: &mut R,
    vendor_prefix: Option<&str>,
) -> Result<String> {
    let mut octets = [0u8; 6];
    rng.fill(&mut octets[..]);

    if let Some(prefix) = vendor_prefix {
        let cleaned = prefix.replace([':', '-'], "");
        if cleaned.len() != 6 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::NetworkAdapter(format!(
                "vendor prefix must be 3 octets (6 hex digits), got {prefix:?}"
            )));
        }
        for (i, octet) in octets.iter_mut().take(3).enumerate() {
            *octet = u8::from_str_radix(&cleaned[i * 2..i * 2 + 2], 16)
                .map_err(|e| Error::NetworkAdapter(format!("invalid vendor prefix: {e}")))?;
        }
    }

    octets[0] = (octets[0] | LOCALLY_ADMINISTERED) & !MULTICAST;

    Ok(octets
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn accepts_both_delimiters() {
        assert!(is_valid_mac("00:1a:2B:3c:4D:5e"));
        assert!(is_valid_mac("00-1A-2B-3C-4D-5E"));
        assert!(!is_valid_mac("001A2B3C4D5E"));
        assert!(!is_valid_mac("00:1A:2B:3C:4D"));
        assert!(!is_valid_mac("00:1A:2B:3C:4D:GG"));
    }

    #[test]
    fn normalize_is_canonical_and_idempotent() {
        for input in [
            "00:1a:2b:3c:4d:5e",
            "00-1A-2B-3C-4D-5E",
            "aa-bb-cc-dd-ee-ff",
            "FF:ff:00:11:22:33",
        ] {
            let once = normalize(input);
            assert!(is_valid_mac(&once));
            assert_eq!(once, once.to_ascii_uppercase());
            assert!(!once.contains('-'));
            assert_eq!(normalize(&once), once);
        }
        assert_eq!(normalize("00-1a-2b-3c-4d-5e"), "00:1A:2B:3C:4D:5E");
    }

    #[test]
    fn normalize_leaves_garbage_alone() {
        assert_eq!(normalize("not a mac"), "not a mac");
        assert_eq!(normalize(&normalize("12:34")), "12:34");
    }

    #[test]
    fn compact_strips_separators() {
        assert_eq!(compact("00-1a-2b-3c-4d-5e"), "001A2B3C4D5E");
    }

    #[test]
    fn random_macs_are_unicast_and_locally_administered() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let mac = generate_random_mac_with(&mut rng, None).unwrap();
            assert!(is_valid_mac(&mac));
            let first = u8::from_str_radix(&mac[..2], 16).unwrap();
            assert_eq!(first & 0x01, 0);
            assert_eq!(first & 0x02, 0x02);
        }
    }

    #[test]
    fn vendor_prefix_is_kept_apart_from_forced_bits() {
        let mut rng = StdRng::seed_from_u64(11);
        let mac = generate_random_mac_with(&mut rng, Some("02:1b:44")).unwrap();
        assert!(mac.starts_with("02:1B:44:"));

        let mac = generate_random_mac_with(&mut rng, Some("01-00-5E")).unwrap();
        assert!(mac.starts_with("02:00:5E:"));
    }

    #[test]
    fn rejects_short_vendor_prefix() {
        assert!(matches!(
            generate_random_mac(Some("00:1B")),
            Err(Error::NetworkAdapter(_))
        ));
        assert!(generate_random_mac(Some("zz:zz:zz")).is_err());
    }

    #[test]
    fn same_mac_ignores_case_and_separators() {
        assert!(same_mac("00-1a-2b-3c-4d-5e", "00:1A:2B:3C:4D:5E"));
        assert!(!same_mac("00:1A:2B:3C:4D:5E", "00:1A:2B:3C:4D:5F"));
    }
}
