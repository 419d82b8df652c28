// src/config/duration.rs

use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parse a duration such as `"250ms"`, `"1.5s"` or `"1m30s"`.
///
/// Units are `ms`, `s`, `m` and `h`. Numbers may carry a fraction and
/// consecutive segments add up. A bare number is rejected so that
/// `debounce: 1500` can't silently mean seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let text = input.trim();
    if text.is_empty() {
        return Err("empty duration string".to_string());
    }

    let is_number_char = |c: char| c.is_ascii_digit() || c == '.';
    let mut total: u128 = 0;
    let mut rest = text;

    while !rest.is_empty() {
        let split = rest.find(|c: char| !is_number_char(c)).unwrap_or(rest.len());
        let (number, tail) = rest.split_at(split);
        if number.is_empty() {
            return Err(format!("duration '{text}': expected a number before '{tail}'"));
        }

        let split = tail.find(is_number_char).unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(split);
        if unit.is_empty() {
            return Err(format!("duration '{text}' is missing a unit suffix"));
        }

        let unit_nanos = unit_nanos(unit).ok_or_else(|| {
            format!("unsupported duration unit '{unit}' in '{text}'; expected ms, s, m, or h")
        })?;
        let nanos = segment_nanos(number, unit_nanos)
            .ok_or_else(|| format!("invalid duration number '{number}' in '{text}'"))?;
        total = total
            .checked_add(nanos)
            .ok_or_else(|| format!("duration '{text}' is too large"))?;
        rest = tail;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| format!("duration '{text}' is too large"))?;
    // Always below one second, so it fits.
    let subsec = (total % NANOS_PER_SEC) as u32;
    Ok(Duration::new(secs, subsec))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit.to_ascii_lowercase().as_str() {
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3_600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// `number` scaled to nanoseconds. Fraction digits past nanosecond
/// precision are dropped.
fn segment_nanos(number: &str, unit_nanos: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(unit_nanos)?;
    let mut scale = unit_nanos;
    for digit in fraction.bytes() {
        scale /= 10;
        nanos = nanos.checked_add(u128::from(digit - b'0') * scale)?;
    }
    Some(nanos)
}
