use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::models::ConcallIdentity;

/// Snapshot of an event already present in a calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    /// Private `concall_id` tag written when this tool created the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<ConcallIdentity>,
}

/// Popup reminder offsets, in minutes before start.
pub const REMINDER_MINUTES: [u32; 2] = [15, 60];

/// Full body written on create and on update.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBody {
    pub summary: String,
    pub description: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub color_id: Option<String>,
    pub identity: ConcallIdentity,
}

impl EventBody {
    /// True when the presentation fields already match `event`.
    pub fn matches(&self, event: &CalendarEvent) -> bool {
        event.summary.as_deref() == Some(self.summary.as_str())
            && event.description.as_deref() == Some(self.description.as_str())
            && event.color_id == self.color_id
    }

    /// Snapshot of what the calendar would hold after writing this body.
    pub fn to_event(&self, id: impl Into<String>) -> CalendarEvent {
        CalendarEvent {
            id: id.into(),
            summary: Some(self.summary.clone()),
            description: Some(self.description.clone()),
            start: Some(self.start.with_timezone(&Utc)),
            end: Some(self.end.with_timezone(&Utc)),
            color_id: self.color_id.clone(),
            identity: Some(self.identity.clone()),
        }
    }
}
