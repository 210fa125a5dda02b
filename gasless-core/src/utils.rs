use ethers::types::Address;

/// Normalize a hex address to its canonical lower-case, `0x`-prefixed form.
///
/// Accepts input with or without the `0x`/`0X` prefix and in any case.
/// Returns `None` unless the remainder is exactly 40 hex digits.
pub fn normalize_address(address: &str) -> Option<String> {
    let trimmed = address.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", digits.to_ascii_lowercase()))
}

/// Canonical lower-case, `0x`-prefixed form of an address
pub fn fmt_address(address: &Address) -> String {
    format!("{address:#x}")
}

/// Parse a hex address in any of the forms accepted by [`normalize_address`]
pub fn parse_address(address: &str) -> Option<Address> {
    normalize_address(address)?.parse().ok()
}
