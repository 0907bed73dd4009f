//! Duration codes such as `30s`, `5m`, `1h`, `1d`
//!
//! A code is a non-negative integer followed by exactly one unit letter.
//! Codes are re-parsed on every use; there is no cached representation.

use crate::error::CacheError;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Parse a duration code into seconds.
pub fn parse_seconds(code: &str) -> Result<u64, CacheError> {
    let invalid = || CacheError::InvalidDuration(code.to_string());

    let unit = code.chars().last().ok_or_else(invalid)?;
    let digits = &code[..code.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let n: u64 = digits.parse().map_err(|_| invalid())?;
    let multiplier = match unit {
        's' => 1,
        'm' => MINUTE,
        'h' => HOUR,
        'd' => DAY,
        _ => return Err(invalid()),
    };

    n.checked_mul(multiplier).ok_or_else(invalid)
}

/// Absolute expiry timestamp (unix seconds) for a code, counted from `now`.
pub fn expiry_timestamp(code: &str, now: i64) -> Result<i64, CacheError> {
    let seconds = parse_seconds(code)?;
    let seconds = i64::try_from(seconds).map_err(|_| CacheError::InvalidDuration(code.to_string()))?;
    now.checked_add(seconds)
        .ok_or_else(|| CacheError::InvalidDuration(code.to_string()))
}

/// Render seconds as `1d 1h 1m 1s`, omitting zero components.
///
/// The output only depends on the number of seconds, so `60m` and `1h`
/// render identically. Partition validity checks rely on this.
pub fn human_readable(total_seconds: u64) -> String {
    let mut remaining = total_seconds;
    let mut parts = Vec::new();

    for (unit_seconds, suffix) in [(DAY, 'd'), (HOUR, 'h'), (MINUTE, 'm'), (1, 's')] {
        let count = remaining / unit_seconds;
        remaining %= unit_seconds;
        if count > 0 {
            parts.push(format!("{}{}", count, suffix));
        }
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_seconds("45s").unwrap(), 45);
        assert_eq!(parse_seconds("30m").unwrap(), 1800);
        assert_eq!(parse_seconds("1h").unwrap(), 3600);
        assert_eq!(parse_seconds("1d").unwrap(), 86400);
        assert_eq!(parse_seconds("0s").unwrap(), 0);
    }

    #[test]
    fn test_parse_is_deterministic() {
        for code in ["5m", "6h", "1d", "90s"] {
            assert_eq!(parse_seconds(code).unwrap(), parse_seconds(code).unwrap());
        }
    }

    #[test]
    fn test_parse_rejects_malformed_codes() {
        for code in ["", "m", "5", "5x", "-5m", "5 m", " 5m", "5mm", "1.5h", "5M", "5m "] {
            match parse_seconds(code) {
                Err(CacheError::InvalidDuration(c)) => assert_eq!(c, code),
                other => panic!("expected InvalidDuration for {:?}, got {:?}", code, other),
            }
        }
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!(parse_seconds("99999999999999999999d").is_err());
        assert!(parse_seconds("999999999999999999d").is_err());
    }

    #[test]
    fn test_expiry_timestamp() {
        assert_eq!(expiry_timestamp("1h", 1_000).unwrap(), 4_600);
        assert_eq!(expiry_timestamp("0s", 1_000).unwrap(), 1_000);
        assert!(expiry_timestamp("nope", 1_000).is_err());
    }

    #[test]
    fn test_human_readable() {
        assert_eq!(human_readable(3661), "1h 1m 1s");
        assert_eq!(human_readable(86400), "1d");
        assert_eq!(human_readable(90061), "1d 1h 1m 1s");
        assert_eq!(human_readable(600), "10m");
        assert_eq!(human_readable(0), "");
    }

    #[test]
    fn test_human_readable_ignores_unit_choice() {
        let a = human_readable(parse_seconds("60m").unwrap());
        let b = human_readable(parse_seconds("1h").unwrap());
        let c = human_readable(parse_seconds("3600s").unwrap());
        assert_eq!(a, "1h");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }
}
