use chrono::{Datelike, TimeZone, Utc};
use chrono_tz::Tz;

/// Current UTC timestamp (milliseconds)
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Restaurant-local calendar day of `millis`, encoded as `YYYYMMDD`
///
/// The admission day rolls over at local midnight, not UTC midnight.
pub fn admission_day(tz: Tz, millis: i64) -> u32 {
    let utc = Utc
        .timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now);
    let local = utc.with_timezone(&tz);
    local.year() as u32 * 10_000 + local.month() * 100 + local.day()
}

/// Parse an IANA timezone name, falling back to `default`
pub fn parse_timezone(name: Option<&str>, default: Tz) -> Tz {
    name.and_then(|n| n.parse::<Tz>().ok()).unwrap_or(default)
}
