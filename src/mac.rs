//! Parsing and normalization of MAC address strings.
//!
//! Input is accepted in any of the punctuation styles OS tools produce
//! (`AA:BB:..`, `aa-bb-..`, `aabb.ccdd.eeff`, bare hex). The registry and
//! the wire packet both work from the single canonical form.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid MAC address: {0:?}")]
pub struct InvalidMac(pub String);

/// Canonical colon-separated uppercase form, e.g. `AA:BB:CC:DD:EE:FF`.
///
/// Strips every non-hex character and requires exactly 12 hex digits to
/// remain. Returns `None` for anything else.
pub fn normalize(input: &str) -> Option<String> {
    let digits: Vec<char> = input.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if digits.len() != 12 {
        return None;
    }
    let groups: Vec<String> = digits
        .chunks(2)
        .map(|pair| pair.iter().collect::<String>().to_ascii_uppercase())
        .collect();
    Some(groups.join(":"))
}

pub fn is_valid(input: &str) -> bool {
    normalize(input).is_some()
}

/// The 6-byte hardware address, for building the wire packet.
pub fn to_bytes(input: &str) -> Result<[u8; 6], InvalidMac> {
    let canonical = normalize(input).ok_or_else(|| InvalidMac(input.to_string()))?;
    let mut bytes = [0u8; 6];
    for (i, group) in canonical.split(':').enumerate() {
        bytes[i] = u8::from_str_radix(group, 16).map_err(|_| InvalidMac(input.to_string()))?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_accepts_common_separators() {
        for input in [
            "AA:BB:CC:DD:EE:FF",
            "aa:bb:cc:dd:ee:ff",
            "aa-bb-cc-dd-ee-ff",
            "aabb.ccdd.eeff",
            "aabbccddeeff",
            "  aa bb cc dd ee ff  ",
        ] {
            assert_eq!(normalize(input).as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let canonical = normalize("aa-bb-cc-dd-ee-ff").unwrap();
        assert_eq!(normalize(&canonical).unwrap(), canonical);
    }

    #[test]
    fn normalize_rejects_wrong_digit_count() {
        for input in ["", "aa:bb:cc:dd:ee", "aa:bb:cc:dd:ee:ff:00", "aabbccddeef", "zz:zz:zz:zz:zz:zz"] {
            assert_eq!(normalize(input), None);
            assert!(!is_valid(input));
        }
    }

    #[test]
    fn normalize_ignores_non_hex_noise() {
        // 'G' is not hex, so it is stripped rather than rejected outright;
        // the remaining digit count decides validity.
        assert_eq!(normalize("GG:aa:bb:cc:dd:ee:ff"), Some("AA:BB:CC:DD:EE:FF".to_string()));
        assert_eq!(normalize("aa:bb:cc:dd:ee:fg"), None);
    }

    #[test]
    fn to_bytes_parses_canonical_and_messy_input() {
        let expected = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
        assert_eq!(to_bytes("AA:BB:CC:DD:EE:FF").unwrap(), expected);
        assert_eq!(to_bytes("aa-bb-cc-dd-ee-ff").unwrap(), expected);
    }

    #[test]
    fn to_bytes_reports_the_offending_input() {
        let err = to_bytes("not a mac").unwrap_err();
        assert_eq!(err, InvalidMac("not a mac".to_string()));
    }
}
