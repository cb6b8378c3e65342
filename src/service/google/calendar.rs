//! Google Calendar API v3: event listing, search, insert and update.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{check_status, GoogleApiError, GoogleAuth};
use crate::models::{CalendarEvent, ConcallIdentity, EventBody, REMINDER_MINUTES};
use crate::service::calendar::{CalendarError, CalendarService};
use crate::service::http::{send_with_retry, RetryPolicy};

const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3/calendars/";
/// Private extended property holding the concall identity.
pub const IDENTITY_PROPERTY: &str = "concall_id";
const PAGE_SIZE: usize = 250;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsResponse {
    #[serde(default)]
    items: Vec<GoogleEventRaw>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventRaw {
    #[serde(default)]
    id: String,
    summary: Option<String>,
    description: Option<String>,
    start: Option<EventDateTime>,
    end: Option<EventDateTime>,
    color_id: Option<String>,
    extended_properties: Option<ExtendedProperties>,
    status: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ExtendedProperties {
    #[serde(default)]
    private: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventPayload<'a> {
    summary: &'a str,
    description: &'a str,
    start: EventDateTime,
    end: EventDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    color_id: Option<&'a str>,
    extended_properties: ExtendedProperties,
    reminders: Reminders,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Reminders {
    use_default: bool,
    overrides: Vec<ReminderOverride>,
}

#[derive(Debug, Serialize)]
struct ReminderOverride {
    method: &'static str,
    minutes: u32,
}

fn parse_event_time(value: Option<&EventDateTime>) -> Option<DateTime<Utc>> {
    // All-day events carry only `date` and have no start instant.
    let raw = value?.date_time.as_deref()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl From<GoogleEventRaw> for CalendarEvent {
    fn from(raw: GoogleEventRaw) -> Self {
        let identity = raw
            .extended_properties
            .as_ref()
            .and_then(|p| p.private.get(IDENTITY_PROPERTY))
            .map(|tag| ConcallIdentity::from_tag(tag.clone()));
        CalendarEvent {
            start: parse_event_time(raw.start.as_ref()),
            end: parse_event_time(raw.end.as_ref()),
            id: raw.id,
            summary: raw.summary,
            description: raw.description,
            color_id: raw.color_id,
            identity,
        }
    }
}

fn payload(body: &EventBody) -> EventPayload<'_> {
    let zoned = |dt: &DateTime<chrono_tz::Tz>| EventDateTime {
        date_time: Some(dt.naive_local().format("%Y-%m-%dT%H:%M:%S").to_string()),
        date: None,
        time_zone: Some(dt.timezone().name().to_string()),
    };
    let mut private = HashMap::new();
    private.insert(IDENTITY_PROPERTY.to_string(), body.identity.to_string());

    EventPayload {
        summary: &body.summary,
        description: &body.description,
        start: zoned(&body.start),
        end: zoned(&body.end),
        color_id: body.color_id.as_deref(),
        extended_properties: ExtendedProperties { private },
        reminders: Reminders {
            use_default: false,
            overrides: REMINDER_MINUTES
                .iter()
                .map(|&minutes| ReminderOverride {
                    method: "popup",
                    minutes,
                })
                .collect(),
        },
    }
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================================================
// Client
// ============================================================================

pub struct GoogleCalendar {
    http: reqwest::Client,
    auth: Arc<GoogleAuth>,
    policy: RetryPolicy,
    /// A retried insert can duplicate an event the server already committed.
    insert_policy: RetryPolicy,
}

impl GoogleCalendar {
    pub fn new(http: reqwest::Client, auth: Arc<GoogleAuth>) -> Self {
        Self {
            http,
            auth,
            policy: RetryPolicy::default(),
            insert_policy: RetryPolicy::single_attempt(),
        }
    }

    /// `.../calendars/{calendar_id}/events[/{event_id}]` with ids percent-encoded.
    fn events_url(calendar_id: &str, event_id: Option<&str>) -> Result<Url, GoogleApiError> {
        let mut url = Url::parse(CALENDAR_API)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments.pop_if_empty().push(calendar_id).push("events");
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn list(
        &self,
        calendar_id: &str,
        params: &[(&str, String)],
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>, GoogleApiError> {
        let url = Self::events_url(calendar_id, None)?;
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = self.auth.access_token().await?;
            let page_size = (max_results - events.len()).clamp(1, PAGE_SIZE);
            let mut request = self
                .http
                .get(url.clone())
                .bearer_auth(token)
                .query(params)
                .query(&[
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                    ("maxResults", page_size.to_string().as_str()),
                ]);
            if let Some(ref t) = page_token {
                request = request.query(&[("pageToken", t.as_str())]);
            }

            let resp = check_status(send_with_retry(request, &self.policy).await?).await?;
            let body: EventsResponse = resp.json().await?;

            events.extend(
                body.items
                    .into_iter()
                    .filter(|item| item.status.as_deref() != Some("cancelled"))
                    .map(CalendarEvent::from),
            );

            page_token = body.next_page_token;
            if page_token.is_none() || events.len() >= max_results {
                break;
            }
        }

        events.truncate(max_results);
        Ok(events)
    }
}

#[async_trait]
impl CalendarService for GoogleCalendar {
    async fn list_upcoming(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let params = [("timeMin", rfc3339(time_min))];
        Ok(self.list(calendar_id, &params, max_results).await?)
    }

    async fn search(
        &self,
        calendar_id: &str,
        query: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let params = [
            ("q", query.to_string()),
            ("timeMin", rfc3339(time_min)),
            ("timeMax", rfc3339(time_max)),
        ];
        Ok(self.list(calendar_id, &params, PAGE_SIZE).await?)
    }

    async fn insert(&self, calendar_id: &str, body: &EventBody) -> Result<String, CalendarError> {
        let url = Self::events_url(calendar_id, None).map_err(CalendarError::from)?;
        let token = self.auth.access_token().await?;
        let request = self.http.post(url).bearer_auth(token).json(&payload(body));
        let resp = send_with_retry(request, &self.insert_policy)
            .await
            .map_err(GoogleApiError::from)?;
        let created: GoogleEventRaw = check_status(resp)
            .await?
            .json()
            .await
            .map_err(GoogleApiError::from)?;
        Ok(created.id)
    }

    async fn update(
        &self,
        calendar_id: &str,
        event_id: &str,
        body: &EventBody,
    ) -> Result<(), CalendarError> {
        let url = Self::events_url(calendar_id, Some(event_id)).map_err(CalendarError::from)?;
        let token = self.auth.access_token().await?;
        let request = self.http.put(url).bearer_auth(token).json(&payload(body));
        let resp = send_with_retry(request, &self.policy)
            .await
            .map_err(GoogleApiError::from)?;
        check_status(resp).await?;
        Ok(())
    }
}
