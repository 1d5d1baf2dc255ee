use anyhow::{anyhow, Context, Result};

/// Converts bytes to a `0x`-prefixed hex string.
pub fn to_hex<T: AsRef<[u8]>>(data: T) -> String {
    format!("0x{}", hex::encode(data))
}

/// Converts a hex string, with or without `0x`, to a byte vector.
pub fn from_hex(data: &str) -> Result<Vec<u8>> {
    let trimmed = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(trimmed).context("Failed to decode hex string")
}

/// Encodes a JSON-RPC quantity (`0x`-prefixed, no leading zeros).
pub fn to_quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

/// Parses a JSON-RPC quantity such as `"0x1a"` into a `u128`.
pub fn parse_quantity(data: &str) -> Result<u128> {
    let trimmed = data
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("Quantity is missing 0x prefix: {}", data))?;
    if trimmed.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(trimmed, 16).with_context(|| format!("Invalid quantity: {}", data))
}

/// Parses a JSON-RPC quantity that must fit in a `u64`.
pub fn parse_quantity_u64(data: &str) -> Result<u64> {
    let value = parse_quantity(data)?;
    u64::try_from(value).map_err(|_| anyhow!("Quantity does not fit in u64: {}", data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_helpers() {
        assert_eq!(to_hex([0xde, 0xad]), "0xdead");
        assert_eq!(from_hex("0xdead").unwrap(), vec![0xde, 0xad]);
        assert_eq!(from_hex("beef").unwrap(), vec![0xbe, 0xef]);
        assert!(from_hex("0xzz").is_err());
    }

    #[test]
    fn test_quantities() {
        assert_eq!(to_quantity(0), "0x0");
        assert_eq!(to_quantity(4660), "0x1234");
        assert_eq!(parse_quantity("0x1234").unwrap(), 4660);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert!(parse_quantity("1234").is_err());
        assert_eq!(parse_quantity_u64("0x4268").unwrap(), 17000);
        assert!(parse_quantity_u64("0x10000000000000000").is_err());
    }
}
