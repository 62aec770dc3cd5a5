/// Parses an unsigned integer the way `strtoul(s, NULL, 0)` does.
///
/// Leading whitespace and a sign are skipped, `0x`/`0X` selects hex and a
/// leading `0` selects octal. Parsing stops at the first invalid digit, so
/// garbage yields zero. Overflow saturates to `u64::MAX`; a minus sign
/// negates in two's complement.
pub fn parse_ulong(s: &str) -> u64 {
    let s = s.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '\x0b');

    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let (radix, digits) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_hexdigit()) => (16, rest),
        // "0x" without hex digits parses as a lone "0"
        Some(_) => return 0,
        None if s.starts_with('0') => (8, s),
        None => (10, s),
    };

    let mut value: u64 = 0;
    let mut overflow = false;
    for digit in digits.chars().map_while(|c| c.to_digit(radix)) {
        match value
            .checked_mul(radix.into())
            .and_then(|v| v.checked_add(digit.into()))
        {
            Some(v) => value = v,
            None => overflow = true,
        }
    }

    if overflow {
        return u64::MAX;
    }
    if negative {
        value.wrapping_neg()
    } else {
        value
    }
}

pub const fn bool_to_str(b: bool) -> &'static str {
    if b {
        "YES"
    } else {
        "NO"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal() {
        assert_eq!(parse_ulong("5"), 5);
        assert_eq!(parse_ulong("  42"), 42);
        assert_eq!(parse_ulong("+7"), 7);
        assert_eq!(parse_ulong("17500"), 17500);
    }

    #[test]
    fn prefixes() {
        assert_eq!(parse_ulong("0x40"), 64);
        assert_eq!(parse_ulong("0XfF"), 255);
        assert_eq!(parse_ulong("010"), 8);
        assert_eq!(parse_ulong("0"), 0);
        assert_eq!(parse_ulong("0x"), 0);
        assert_eq!(parse_ulong("0xg1"), 0);
    }

    #[test]
    fn garbage() {
        assert_eq!(parse_ulong(""), 0);
        assert_eq!(parse_ulong("abc"), 0);
        assert_eq!(parse_ulong("12abc"), 12);
        assert_eq!(parse_ulong("09"), 0);
        assert_eq!(parse_ulong("1.5"), 1);
    }

    #[test]
    fn sign_and_overflow() {
        assert_eq!(parse_ulong("-1"), u64::MAX);
        assert_eq!(parse_ulong("-0"), 0);
        assert_eq!(parse_ulong("99999999999999999999999"), u64::MAX);
        assert_eq!(parse_ulong("-99999999999999999999999"), u64::MAX);
    }

    #[test]
    fn yes_no() {
        assert_eq!(bool_to_str(true), "YES");
        assert_eq!(bool_to_str(false), "NO");
    }
}
