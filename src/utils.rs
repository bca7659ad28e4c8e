//! Miscellaneous helper utilities.

use alloy_primitives::U256;
use bigdecimal::BigDecimal;
use num_traits::ToPrimitive;
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize `tracing` subscriber with env-based filter.
///
/// If `RUST_LOG` is not set, defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Lower-case an address for comparisons. Surrounding whitespace is dropped.
pub fn normalize_address(addr: &str) -> String {
    addr.trim().to_ascii_lowercase()
}

/// `0x` followed by exactly 40 hex digits, either case.
pub fn is_valid_address(addr: &str) -> bool {
    match addr.strip_prefix("0x").or_else(|| addr.strip_prefix("0X")) {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Decode a `0x`-prefixed hexadecimal wei amount into ETH.
///
/// `"0x"` and `"0x0"` decode to zero. Returns `None` for anything that is not
/// a hex quantity fitting in 256 bits.
pub fn wei_hex_to_eth(hex: &str) -> Option<f64> {
    let digits = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X"))?;
    if digits.is_empty() {
        return Some(0.0);
    }
    let wei = U256::from_str_radix(digits, 16).ok()?;
    wei_to_eth(wei)
}

/// Exact division by 10^18 before the (lossy) conversion to `f64`.
pub fn wei_to_eth(wei: U256) -> Option<f64> {
    let wei_bd = BigDecimal::from_str(&wei.to_string()).ok()?;
    let eth = wei_bd / BigDecimal::from(1_000_000_000_000_000_000u64);
    eth.to_f64()
}

/// First 18 characters of a hash, enough to tell transactions apart in logs.
pub fn short_hash(hash: &str) -> &str {
    match hash.char_indices().nth(18) {
        Some((idx, _)) => &hash[..idx],
        None => hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_one_eth() {
        assert_eq!(wei_hex_to_eth("0xde0b6b3a7640000"), Some(1.0));
    }

    #[test]
    fn decodes_empty_and_zero() {
        assert_eq!(wei_hex_to_eth("0x"), Some(0.0));
        assert_eq!(wei_hex_to_eth("0x0"), Some(0.0));
    }

    #[test]
    fn rejects_non_hex_values() {
        assert_eq!(wei_hex_to_eth("1000"), None);
        assert_eq!(wei_hex_to_eth("0xzz"), None);
    }

    #[test]
    fn decodes_values_wider_than_u64() {
        // 100_000 ETH = 1e23 wei, above u64::MAX.
        let eth = wei_hex_to_eth("0x152d02c7e14af6800000").unwrap();
        assert!((eth - 100_000.0).abs() < 1e-9);
    }

    #[test]
    fn address_checks() {
        assert!(is_valid_address("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"));
        assert!(!is_valid_address("7a250d5630B4cF539739dF2C5dAcb4c659F2488D"));
        assert!(!is_valid_address("0x7a250d"));
        assert_eq!(
            normalize_address(" 0xAbC "),
            "0xabc".to_string()
        );
    }

    #[test]
    fn short_hash_truncates() {
        assert_eq!(short_hash("0x0123456789abcdef0123"), "0x0123456789abcdef");
        assert_eq!(short_hash("0x01"), "0x01");
    }
}
