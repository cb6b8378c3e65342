use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::models::{CalendarEvent, EventBody};
use crate::service::google::GoogleApiError;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error(transparent)]
    Google(#[from] GoogleApiError),
    #[error("calendar service error: {0}")]
    Service(String),
}

/// Read and write access to calendars addressed by id.
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Up to `max_results` events starting at or after `time_min`.
    async fn list_upcoming(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;

    /// Free-text search within `[time_min, time_max]`.
    async fn search(
        &self,
        calendar_id: &str,
        query: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;

    /// Returns the new event id.
    async fn insert(&self, calendar_id: &str, body: &EventBody) -> Result<String, CalendarError>;

    async fn update(
        &self,
        calendar_id: &str,
        event_id: &str,
        body: &EventBody,
    ) -> Result<(), CalendarError>;
}

/// Reads through to the wrapped calendar but only logs writes.
pub struct DryRunCalendar<C> {
    inner: C,
    writes: AtomicUsize,
}

impl<C> DryRunCalendar<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of writes that would have been sent.
    pub fn suppressed_writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<C: CalendarService> CalendarService for DryRunCalendar<C> {
    async fn list_upcoming(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        self.inner
            .list_upcoming(calendar_id, time_min, max_results)
            .await
    }

    async fn search(
        &self,
        calendar_id: &str,
        query: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        self.inner.search(calendar_id, query, time_min, time_max).await
    }

    async fn insert(&self, calendar_id: &str, body: &EventBody) -> Result<String, CalendarError> {
        let n = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "[dry-run] would create \"{}\" at {} in {}",
            body.summary, body.start, calendar_id
        );
        Ok(format!("dry-run-{n}"))
    }

    async fn update(
        &self,
        calendar_id: &str,
        event_id: &str,
        body: &EventBody,
    ) -> Result<(), CalendarError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        info!(
            "[dry-run] would update event {} (\"{}\") in {}",
            event_id, body.summary, calendar_id
        );
        Ok(())
    }
}
