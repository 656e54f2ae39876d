// Event calendar helpers: the event year and its boundaries in the event zone

use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;

/// Calendar year of `now` in the event timezone
pub fn event_year(now: DateTime<Utc>, tz: Tz) -> i32 {
    now.with_timezone(&tz).year()
}

/// `[Jan 1 00:00, next Jan 1 00:00)` of `year` in the event zone, as UTC
pub fn year_bounds(year: i32, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_midnight_jan1(year, tz);
    let end = local_midnight_jan1(year + 1, tz);
    (start, end)
}

fn local_midnight_jan1(year: i32, tz: Tz) -> DateTime<Utc> {
    // Midnight on Jan 1 is never inside a DST gap in any real zone, but
    // fall back to UTC midnight rather than panicking.
    tz.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| {
            Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Los_Angeles;

    #[test]
    fn test_event_year_uses_event_zone() {
        // 2025-01-01 05:00 UTC is still New Year's Eve in Pacific time
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 5, 0, 0).unwrap();
        assert_eq!(event_year(now, Los_Angeles), 2024);
        assert_eq!(event_year(now, chrono_tz::UTC), 2025);
    }

    #[test]
    fn test_year_bounds() {
        let (start, end) = year_bounds(2024, Los_Angeles);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap());
    }
}
