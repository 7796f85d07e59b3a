use alloy::primitives::{utils::parse_units, U256};

/// Parses an amount with optional units, e.g. `"0.0001 ether"`, `"20gwei"` or `"1000"` (wei).
pub fn parse_value(input: &str) -> Result<U256, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(input.len());
    let (amount, units) = input.split_at(split);
    let units = match units.trim() {
        "" => "wei",
        u => u,
    };
    parse_units(amount.trim(), units)
        .map(|v| v.get_absolute())
        .map_err(|e| format!("invalid value '{input}': {e}"))
}
