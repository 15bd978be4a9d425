use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecimalParseError {
    #[error("'{0}' is not a decimal number")]
    NotANumber(String),
    #[error("'{0}' is too large")]
    Overflow(String),
}

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Parses a plain decimal string (e.g. `"54.50"`, `"-3"`, `".5"`) into an integer scaled by `10^scale`.
///
/// Digits beyond `scale` decimal places are rounded half-up (away from zero on the magnitude), so with `scale = 2`,
/// `"0.505"` becomes `51` and `"0.5049"` becomes `50`. Exponents, thousands separators and currency symbols are
/// rejected.
pub fn parse_decimal(value: &str, scale: u32) -> Result<i64, DecimalParseError> {
    let err = || DecimalParseError::NotANumber(value.to_string());
    let overflow = || DecimalParseError::Overflow(value.to_string());
    let s = value.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(err());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    let factor = 10i64.checked_pow(scale).ok_or_else(overflow)?;
    let whole_val = if whole.is_empty() { 0 } else { whole.parse::<i64>().map_err(|_| overflow())? };
    let kept = frac.len().min(scale as usize);
    let mut frac_val = 0i64;
    for b in frac.bytes().take(kept) {
        frac_val = frac_val * 10 + i64::from(b - b'0');
    }
    frac_val *= 10i64.pow(scale - kept as u32);
    let round_up = frac.as_bytes().get(scale as usize).map(|b| *b >= b'5').unwrap_or(false);
    let mut total = whole_val.checked_mul(factor).and_then(|v| v.checked_add(frac_val)).ok_or_else(overflow)?;
    if round_up {
        total = total.checked_add(1).ok_or_else(overflow)?;
    }
    Ok(if negative { -total } else { total })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("Yes".into()), false));
        assert!(!parse_boolean_flag(Some(" off ".into()), true));
        assert!(parse_boolean_flag(Some("maybe".into()), true));
        assert!(!parse_boolean_flag(None, false));
    }

    #[test]
    fn decimals() {
        assert_eq!(parse_decimal("54.50", 2), Ok(5450));
        assert_eq!(parse_decimal("54.5", 2), Ok(5450));
        assert_eq!(parse_decimal("54", 2), Ok(5400));
        assert_eq!(parse_decimal(".5", 2), Ok(50));
        assert_eq!(parse_decimal("-3.10", 2), Ok(-310));
        assert_eq!(parse_decimal("0.03", 4), Ok(300));
    }

    #[test]
    fn decimals_round_half_up() {
        assert_eq!(parse_decimal("0.505", 2), Ok(51));
        assert_eq!(parse_decimal("0.5049", 2), Ok(50));
        assert_eq!(parse_decimal("1.995", 2), Ok(200));
        assert_eq!(parse_decimal("-1.995", 2), Ok(-200));
    }

    #[test]
    fn bad_decimals() {
        assert!(matches!(parse_decimal("", 2), Err(DecimalParseError::NotANumber(_))));
        assert!(matches!(parse_decimal(".", 2), Err(DecimalParseError::NotANumber(_))));
        assert!(matches!(parse_decimal("1e5", 2), Err(DecimalParseError::NotANumber(_))));
        assert!(matches!(parse_decimal("$12", 2), Err(DecimalParseError::NotANumber(_))));
        assert!(matches!(parse_decimal("1.2.3", 2), Err(DecimalParseError::NotANumber(_))));
        assert!(matches!(parse_decimal("99999999999999999999", 2), Err(DecimalParseError::Overflow(_))));
    }
}
