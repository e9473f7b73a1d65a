//! Parsing of time expressions given on the command line.
//!
//! Two kinds of input are supported:
//!
//! 1. **Relative durations** (`--time`): free-form expressions such as
//!    `"1h"`, `"2 hours"`, `"1h30m"` or `"1.5 days"`. Every number/unit pair
//!    is summed; a bare number counts as milliseconds.
//! 2. **Absolute instants** (`--start`, `--end`): RFC 3339 timestamps,
//!    naive date/times, plain dates, `YYYY-MM` months and bare years
//!    (interpreted in local time, or UTC when requested), and raw epoch
//!    milliseconds.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

const MS_PER_SECOND: f64 = 1_000.0;
const MS_PER_MINUTE: f64 = 60.0 * MS_PER_SECOND;
const MS_PER_HOUR: f64 = 60.0 * MS_PER_MINUTE;
const MS_PER_DAY: f64 = 24.0 * MS_PER_HOUR;
const MS_PER_WEEK: f64 = 7.0 * MS_PER_DAY;
const MS_PER_YEAR: f64 = 365.25 * MS_PER_DAY;
const MS_PER_MONTH: f64 = MS_PER_YEAR / 12.0;

/// All-digit input up to this length is a year, anything longer is epoch
/// milliseconds.
const MAX_YEAR_DIGITS: usize = 4;

/// Naive date/time layouts accepted for absolute bounds, tried in order.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(-?(?:\d+\.?\d*|\d*\.?\d+)(?:[eE][-+]?\d+)?)\s*([a-zA-Zµμ]*)")
            .expect("duration regex is valid")
    })
}

fn digit_separator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d)[,_](\d)").expect("separator regex is valid"))
}

/// Milliseconds per unit name. Plural forms are folded by the caller.
fn unit_millis(unit: &str) -> Option<f64> {
    let ms = match unit {
        "" | "ms" | "msec" | "millisecond" => 1.0,
        "ns" | "nanosecond" => 1e-6,
        "us" | "µs" | "μs" | "microsecond" => 1e-3,
        "s" | "sec" | "second" => MS_PER_SECOND,
        "m" | "min" | "minute" => MS_PER_MINUTE,
        "h" | "hr" | "hour" => MS_PER_HOUR,
        "d" | "day" => MS_PER_DAY,
        "w" | "wk" | "week" => MS_PER_WEEK,
        "b" | "month" => MS_PER_MONTH,
        "y" | "yr" | "year" => MS_PER_YEAR,
        _ => return None,
    };
    Some(ms)
}

fn lookup_unit(unit: &str) -> Option<f64> {
    unit_millis(unit).or_else(|| {
        let lower = unit.to_lowercase();
        let singular = lower.strip_suffix('s').unwrap_or(&lower);
        unit_millis(singular)
    })
}

/// Parse a relative duration expression.
///
/// Returns `None` when the expression contains no number or names an
/// unknown unit. The result is rounded to whole milliseconds.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let cleaned = digit_separator_regex().replace_all(input, "$1$2");

    let mut total_ms = 0.0_f64;
    let mut matched = false;
    for caps in duration_regex().captures_iter(&cleaned) {
        let value: f64 = caps[1].parse().ok()?;
        let unit = lookup_unit(&caps[2])?;
        total_ms += value * unit;
        matched = true;
    }

    if !matched || !total_ms.is_finite() {
        return None;
    }
    Duration::try_milliseconds(total_ms.round() as i64)
}

/// Parse an absolute date/time expression into a UTC instant.
///
/// Expressions without an explicit offset are read as local time, or as
/// UTC when `utc` is set. A bare year or `YYYY-MM` month means the start of
/// that period. Longer all-digit expressions are epoch milliseconds.
pub fn parse_instant(input: &str, utc: bool) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let all_digits = input.bytes().all(|b| b.is_ascii_digit());
    if all_digits && input.len() > MAX_YEAR_DIGITS {
        let ms: i64 = input.parse().ok()?;
        return DateTime::from_timestamp_millis(ms);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = if all_digits {
        NaiveDate::from_ymd_opt(input.parse().ok()?, 1, 1)?.and_hms_opt(0, 0, 0)?
    } else {
        NAIVE_DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
            .or_else(|| parse_naive_date(input))?
    };

    if utc {
        Some(Utc.from_utc_datetime(&naive))
    } else {
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// `YYYY-MM-DD`, or `YYYY-MM` for the first day of the month, at midnight.
fn parse_naive_date(input: &str) -> Option<NaiveDateTime> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", input), "%Y-%m-%d"))
        .ok()?
        .and_hms_opt(0, 0, 0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1h", 3_600_000)]
    #[case("30m", 1_800_000)]
    #[case("2 hours", 7_200_000)]
    #[case("1h30m", 5_400_000)]
    #[case("1 hour 30 minutes", 5_400_000)]
    #[case("1.5h", 5_400_000)]
    #[case("45s", 45_000)]
    #[case("90", 90)]
    #[case("250ms", 250)]
    #[case("2d", 172_800_000)]
    #[case("1 week", 604_800_000)]
    #[case("3 Days", 259_200_000)]
    #[case("1,000ms", 1_000)]
    fn test_parse_duration(#[case] input: &str, #[case] expected_ms: i64) {
        assert_eq!(
            parse_duration(input),
            Some(Duration::milliseconds(expected_ms))
        );
    }

    #[rstest]
    #[case("")]
    #[case("soon")]
    #[case("5 fortnights")]
    fn test_parse_duration_invalid(#[case] input: &str) {
        assert_eq!(parse_duration(input), None);
    }

    #[test]
    fn test_parse_duration_zero() {
        assert_eq!(parse_duration("0"), Some(Duration::zero()));
    }

    #[test]
    fn test_parse_instant_rfc3339() {
        let dt = parse_instant("2024-01-01T00:00:00Z", false).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_704_067_200_000);
    }

    #[test]
    fn test_parse_instant_rfc3339_offset() {
        let dt = parse_instant("2024-01-01T01:00:00+01:00", false).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_704_067_200_000);
    }

    #[rstest]
    #[case("2024-01-01T00:00:00")]
    #[case("2024-01-01 00:00:00")]
    #[case("2024-01-01T00:00")]
    #[case("2024-01-01 00:00")]
    #[case("2024-01-01")]
    #[case("2024-01")]
    #[case("2024")]
    fn test_parse_instant_naive_utc(#[case] input: &str) {
        let dt = parse_instant(input, true).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_704_067_200_000);
    }

    #[test]
    fn test_parse_instant_naive_local() {
        let expected = Local
            .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_instant("2024-06-01 12:00", false), Some(expected));
    }

    #[test]
    fn test_parse_instant_month_start() {
        let dt = parse_instant("2024-06", true).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_717_200_000_000);
    }

    #[test]
    fn test_parse_instant_epoch_millis() {
        let dt = parse_instant("1704067200000", false).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_704_067_200_000);
    }

    #[rstest]
    #[case("")]
    #[case("yesterday-ish")]
    #[case("2024-13-45")]
    #[case("2024-13")]
    fn test_parse_instant_invalid(#[case] input: &str) {
        assert_eq!(parse_instant(input, true), None);
    }
}
