use chrono::{DateTime, Duration};
use chrono_tz::Tz;

use crate::models::{Concall, EventBody};

/// Concalls are booked as one-hour events.
pub const CONCALL_DURATION_HOURS: i64 = 1;

pub fn event_summary(concall: &Concall) -> String {
    format!("📞 {} - Concall", concall.company)
}

pub fn event_description(concall: &Concall) -> String {
    format!(
        "📞 Dial-in: {}\n\n📅 Date: {}\n⏰ Time: {}\n\n📄 PDF Announcement:\n{}\n\n---\nAuto-synced from Screener.in",
        concall.phone_display(),
        concall.date,
        concall.time,
        concall.document_url,
    )
}

/// Build the full event body for a concall starting at `start`.
pub fn build_event_body(concall: &Concall, start: DateTime<Tz>, color_id: Option<String>) -> EventBody {
    EventBody {
        summary: event_summary(concall),
        description: event_description(concall),
        start,
        end: start + Duration::hours(CONCALL_DURATION_HOURS),
        color_id,
        identity: concall.identity(),
    }
}
