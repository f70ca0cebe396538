//! Human readable duration parsing, e.g. `2d10h` or `1w 3d`.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

#[allow(clippy::expect_used)]
fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s*(mo|ms|µs|us|ns|[smhdwy])\s*").expect("duration pattern is valid")
    })
}

/// Parses a duration written as a sequence of `<amount><unit>` pairs.
///
/// Supported units, case-insensitive:
///
/// | unit | meaning |
/// |---|---|
/// | `ns` | nanoseconds |
/// | `µs`, `us` | microseconds |
/// | `ms` | milliseconds |
/// | `s` | seconds |
/// | `m` | minutes |
/// | `h` | hours |
/// | `d` | days |
/// | `w` | weeks of 7 days |
/// | `mo` | months of 30 days |
/// | `y` | years of 365 days |
///
/// Blank input yields [`Duration::ZERO`]. Fragments that do not match a unit
/// are skipped, and the sum saturates at [`Duration::MAX`].
pub fn parse_duration(input: &str) -> Duration {
    let mut total = Duration::ZERO;

    for captures in pattern().captures_iter(input.trim()) {
        let amount: u64 = match captures[1].parse() {
            Ok(amount) => amount,
            Err(_) => u64::MAX,
        };

        let part = match captures[2].to_lowercase().as_str() {
            "ns" => Duration::from_nanos(amount),
            "µs" | "us" => Duration::from_micros(amount),
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount.saturating_mul(MINUTE)),
            "h" => Duration::from_secs(amount.saturating_mul(HOUR)),
            "d" => Duration::from_secs(amount.saturating_mul(DAY)),
            "w" => Duration::from_secs(amount.saturating_mul(7 * DAY)),
            "mo" => Duration::from_secs(amount.saturating_mul(30 * DAY)),
            "y" => Duration::from_secs(amount.saturating_mul(365 * DAY)),
            _ => continue,
        };

        total = total.saturating_add(part);
    }

    total
}
