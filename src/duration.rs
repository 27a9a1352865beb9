//! Human-readable durations for the command line.

use std::time::Duration;

/// Parse a duration such as `500ms`, `3s`, `1m` or `2h`.
///
/// A bare number is taken as seconds.
///
/// # Examples
/// ```
/// use ble_receptor::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    // "ms" has to be tried before "m" and "s".
    let (number, unit_millis): (&str, u64) = if let Some(n) = src.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = src.strip_suffix('h') {
        (n, 3_600_000)
    } else if let Some(n) = src.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = src.strip_suffix('s') {
        (n, 1_000)
    } else {
        (src, 1_000)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {src}"))?;
    value
        .checked_mul(unit_millis)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration out of range: {src}"))
}
