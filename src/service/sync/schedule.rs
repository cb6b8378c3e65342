use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::models::Concall;

/// Listing times are Indian Standard Time.
pub const SCHEDULE_TZ: Tz = chrono_tz::Asia::Kolkata;

// "24 January 2026 9:30:00 AM"
const SCHEDULE_FORMAT: &str = "%d %B %Y %I:%M:%S %p";

/// Parse a listing's date and time columns into a zoned start instant.
pub fn parse_schedule(date: &str, time: &str) -> Option<DateTime<Tz>> {
    let combined = format!("{} {}", date.trim(), time.trim());
    let naive = NaiveDateTime::parse_from_str(&combined, SCHEDULE_FORMAT).ok()?;
    SCHEDULE_TZ.from_local_datetime(&naive).earliest()
}

pub fn concall_start(concall: &Concall) -> Option<DateTime<Tz>> {
    parse_schedule(&concall.date, &concall.time)
}

/// Minute-granularity slot used to detect calls starting at the same instant.
pub fn minute_slot(start: &DateTime<Tz>) -> i64 {
    start.timestamp().div_euclid(60)
}

/// Order by start time ascending; rows with an unparseable schedule go last.
/// The sort is stable, so ties keep scrape order.
pub fn sort_by_start(concalls: &mut [Concall]) {
    concalls.sort_by_cached_key(|c| match concall_start(c) {
        Some(start) => (false, start.timestamp()),
        None => (true, 0),
    });
}
