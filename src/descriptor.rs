//! Rate-limit descriptor parsing.
//!
//! The upstream service reports its limits in two comma-separated header
//! strings: a limit definition (`"20:1,100:120"` — 20 requests per 1 second,
//! 100 per 120 seconds) and a usage string (`"1:20,13:100"` — 1 of 20 used,
//! 13 of 100 used). The two strings are positionally aligned: the Nth entry
//! of each describes the same window. Missing or malformed input never
//! fails; it simply yields fewer entries.

/// One window as read from a pair of descriptor headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowReading {
    /// Maximum requests allowed, from the limit definition.
    pub limit: u64,
    /// Window length in seconds, from the limit definition.
    pub interval_secs: u64,
    /// Requests already consumed, from the usage string.
    pub count: u64,
}

/// Parse a `limit:intervalSeconds` pair per entry.
///
/// Returns `(limit, interval_secs)` tuples in header order. Malformed
/// entries are skipped.
pub fn parse_limits(header: &str) -> Vec<(u64, u64)> {
    parse_pairs(header)
}

/// Parse a `used:limit` pair per entry.
///
/// Returns `(count, limit)` tuples in header order. Malformed entries are
/// skipped.
pub fn parse_usage(header: &str) -> Vec<(u64, u64)> {
    parse_pairs(header)
}

fn parse_pairs(header: &str) -> Vec<(u64, u64)> {
    if header.is_empty() {
        return Vec::new();
    }

    header
        .split(',')
        .filter_map(|entry| {
            let (first, second) = entry.split_once(':')?;
            let first = first.trim().parse().ok()?;
            let second = second.trim().parse().ok()?;
            Some((first, second))
        })
        .collect()
}

/// Combine a limit-definition header and a usage header into window
/// readings.
///
/// Entries are matched positionally, never by interval value. Mismatched
/// lengths drop the trailing entries of the longer side, tolerating partial
/// upstream responses. The limit is taken from the definition string; the
/// count from the usage string.
pub fn parse_windows(limits_header: &str, usage_header: &str) -> Vec<WindowReading> {
    parse_limits(limits_header)
        .into_iter()
        .zip(parse_usage(usage_header))
        .map(|((limit, interval_secs), (count, _))| WindowReading {
            limit,
            interval_secs,
            count,
        })
        .collect()
}

/// Render readings back into a limit-definition header.
pub fn limits_header(readings: &[WindowReading]) -> String {
    readings
        .iter()
        .map(|r| format!("{}:{}", r.limit, r.interval_secs))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render readings back into a usage header.
pub fn usage_header(readings: &[WindowReading]) -> String {
    readings
        .iter()
        .map(|r| format!("{}:{}", r.count, r.limit))
        .collect::<Vec<_>>()
        .join(",")
}
