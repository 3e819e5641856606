//! Hex-quantity helpers for JSON-RPC payloads.

/// Parses an `0x`-prefixed hex quantity into a `u64`.
pub fn parse_hex_u64(value: &str) -> Option<u64> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.is_empty() {
        return None;
    }

    u64::from_str_radix(digits, 16).ok()
}

/// Whether the string is a `0x`-prefixed 20-byte hex address.
pub fn is_hex_address(value: &str) -> bool {
    let Some(digits) = value.strip_prefix("0x") else { return false };
    digits.len() == 40 && digits.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_quantities() {
        assert_eq!(parse_hex_u64("0x0"), Some(0));
        assert_eq!(parse_hex_u64("0x1b4"), Some(436));
        assert_eq!(parse_hex_u64("1b4"), Some(436));
        assert_eq!(parse_hex_u64("0x"), None);
        assert_eq!(parse_hex_u64("0xzz"), None);
    }

    #[test]
    fn addresses() {
        assert!(is_hex_address("0x33302dbff493ed81ba2e7e35e2e8e833db023333"));
        assert!(!is_hex_address("33302dbff493ed81ba2e7e35e2e8e833db023333"));
        assert!(!is_hex_address("0x1234"));
        assert!(!is_hex_address("0x33302dbff493ed81ba2e7e35e2e8e833db02333g"));
    }
}
