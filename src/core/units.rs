/// Unit conversion helpers: wei / raw token amounts to decimals, USD rounding

use alloy_primitives::U256;

pub const ETH_DECIMALS: u8 = 18;

/// Parse a raw on-chain amount given as a decimal string or `0x` hex
pub fn parse_amount(raw: &str) -> Option<U256> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(hex_digits) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        if hex_digits.is_empty() {
            return Some(U256::ZERO);
        }
        return U256::from_str_radix(hex_digits, 16).ok();
    }

    // Some enrichment rows carry scientific notation or fractional wei; drop those
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        U256::from_str_radix(trimmed, 10).ok()
    } else {
        None
    }
}

fn pow10(decimals: u8) -> U256 {
    let ten = U256::from(10u8);
    let mut scale = U256::from(1u8);
    for _ in 0..decimals {
        scale *= ten;
    }
    scale
}

/// Convert a raw integer amount to a decimal float, splitting whole and
/// fractional parts so large balances keep their integer precision
pub fn to_decimal(raw: U256, decimals: u8) -> f64 {
    let scale = pow10(decimals);
    let whole = raw / scale;
    let fraction = raw % scale;

    let whole_f = whole.to_string().parse::<f64>().unwrap_or(0.0);
    let fraction_f = fraction.to_string().parse::<f64>().unwrap_or(0.0)
        / scale.to_string().parse::<f64>().unwrap_or(1.0);

    whole_f + fraction_f
}

pub fn wei_to_eth(raw: U256) -> f64 {
    to_decimal(raw, ETH_DECIMALS)
}

/// Wei decimal string to ETH, zero when unparseable
pub fn wei_str_to_eth(raw: &str) -> f64 {
    parse_amount(raw).map(wei_to_eth).unwrap_or(0.0)
}

/// Sum raw amounts with arbitrary precision; saturates instead of wrapping
pub fn sum_amounts<'a>(amounts: impl IntoIterator<Item = &'a U256>) -> U256 {
    amounts
        .into_iter()
        .fold(U256::ZERO, |acc, amount| acc.saturating_add(*amount))
}

/// USD precision applied at every accumulation step
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// ETH precision applied at every accumulation step
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// NaN, infinities and negatives collapse to zero
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_formats() {
        assert_eq!(parse_amount("1000"), Some(U256::from(1000u64)));
        assert_eq!(parse_amount("0x3e8"), Some(U256::from(1000u64)));
        assert_eq!(parse_amount("0x"), Some(U256::ZERO));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("1.5e18"), None);
    }

    #[test]
    fn test_to_decimal_handles_token_precision() {
        let one_and_half_eth = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(wei_to_eth(one_and_half_eth), 1.5);
        assert_eq!(to_decimal(U256::from(2_500_000u64), 6), 2.5);
        assert_eq!(to_decimal(U256::ZERO, 18), 0.0);
    }

    #[test]
    fn test_big_integer_sum_beats_float_summation() {
        // 2^63 + 1 is not representable as f64; float summation drops the odd unit
        let near_limit = U256::from(9_223_372_036_854_775_809u128);
        let rows = vec![near_limit, near_limit, U256::from(1u8)];

        let exact = sum_amounts(&rows);
        assert_eq!(exact, U256::from(18_446_744_073_709_551_619u128));

        let float_sum: f64 = rows.iter().map(|r| r.to_string().parse::<f64>().unwrap()).sum();
        assert_ne!(float_sum.to_string(), exact.to_string());
    }

    #[test]
    fn test_rounding_steps() {
        assert_eq!(round2(10.006), 10.01);
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(sanitize(f64::NAN), 0.0);
        assert_eq!(sanitize(-3.0), 0.0);
    }
}
