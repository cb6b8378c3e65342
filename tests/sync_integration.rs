use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;

use concall_sync::models::{CalendarEvent, ColorRule, Concall, EventBody, RawListing, Watchlist, WatchlistSet};
use concall_sync::service::calendar::{CalendarError, CalendarService, DryRunCalendar};
use concall_sync::service::sync::{
    dedup_listings, sort_by_start, ColorEngine, PermissiveMatcher, Reconciler, SyncReport,
    OVERLAP_PALETTE,
};

const PRIMARY: &str = "concalls@group.calendar.google.com";
const SECONDARY: &str = "personal@group.calendar.google.com";

/// Calendars held in memory, keyed by calendar id.
#[derive(Default)]
struct InMemoryCalendar {
    events: Mutex<HashMap<String, Vec<CalendarEvent>>>,
    writes: Mutex<usize>,
}

impl InMemoryCalendar {
    async fn seed(&self, calendar_id: &str, event: CalendarEvent) {
        self.events
            .lock()
            .await
            .entry(calendar_id.to_string())
            .or_default()
            .push(event);
    }

    async fn events_in(&self, calendar_id: &str) -> Vec<CalendarEvent> {
        self.events
            .lock()
            .await
            .get(calendar_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn write_count(&self) -> usize {
        *self.writes.lock().await
    }
}

#[async_trait]
impl CalendarService for InMemoryCalendar {
    async fn list_upcoming(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        Ok(self
            .events_in(calendar_id)
            .await
            .into_iter()
            .filter(|e| e.start.is_some_and(|s| s >= time_min))
            .take(max_results)
            .collect())
    }

    async fn search(
        &self,
        calendar_id: &str,
        query: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let query = query.to_lowercase();
        Ok(self
            .events_in(calendar_id)
            .await
            .into_iter()
            .filter(|e| e.start.is_some_and(|s| s >= time_min && s <= time_max))
            .filter(|e| {
                e.summary
                    .as_deref()
                    .unwrap_or_default()
                    .to_lowercase()
                    .contains(&query)
            })
            .collect())
    }

    async fn insert(&self, calendar_id: &str, body: &EventBody) -> Result<String, CalendarError> {
        let mut events = self.events.lock().await;
        let list = events.entry(calendar_id.to_string()).or_default();
        let id = format!("{}-{}", calendar_id.split('@').next().unwrap_or("cal"), list.len() + 1);
        list.push(body.to_event(id.clone()));
        *self.writes.lock().await += 1;
        Ok(id)
    }

    async fn update(
        &self,
        calendar_id: &str,
        event_id: &str,
        body: &EventBody,
    ) -> Result<(), CalendarError> {
        let mut events = self.events.lock().await;
        let list = events.entry(calendar_id.to_string()).or_default();
        match list.iter_mut().find(|e| e.id == event_id) {
            Some(slot) => *slot = body.to_event(event_id),
            None => return Err(CalendarError::Service(format!("no event {event_id}"))),
        }
        *self.writes.lock().await += 1;
        Ok(())
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 20, 0, 0, 0).unwrap()
}

fn row(company: &str, date: &str, time: &str) -> RawListing {
    RawListing {
        company: Some(company.to_string()),
        date: Some(date.to_string()),
        time: Some(time.to_string()),
        document_url: Some(format!("https://www.bseindia.com/{}.pdf", company.replace(' ', "_"))),
    }
}

fn listing() -> Vec<RawListing> {
    vec![
        row("Wipro Ltd", "24 January 2026", "4:00:00 PM"),
        row("Tata Motors Ltd.", "24 January 2026", "11:00:00 AM"),
        row("Infosys Ltd", "24 January 2026", "11:00:00 AM"),
        row("HDFC Bank", "24 January 2026", "11:00:00 AM"),
        // Repeated on the next page.
        row("Wipro Ltd", "24 January 2026", "4:00:00 PM"),
        // Already happened.
        row("Old Results Co", "2 January 2026", "10:00:00 AM"),
        // Not a schedule the sync can place.
        row("TBA Industries", "sometime", "soon"),
        RawListing {
            company: Some("No Document Co".into()),
            ..RawListing::default()
        },
    ]
}

fn watchlists() -> WatchlistSet {
    WatchlistSet::new(
        vec![Watchlist::new(
            "Portfolio",
            &["Tata Motors"],
            &["11"],
            ColorRule::Single,
        )],
        Some("Portfolio".into()),
    )
    .unwrap()
}

fn prepare() -> Vec<Concall> {
    let mut concalls = dedup_listings(listing(), 100);
    for c in &mut concalls {
        c.phone = Some("+91 22 6280 1144".into());
    }
    sort_by_start(&mut concalls);
    concalls
}

async fn sync(
    calendar: &dyn CalendarService,
    watchlists: &WatchlistSet,
    concalls: &[Concall],
) -> SyncReport {
    let matcher = PermissiveMatcher;
    let colors = ColorEngine::new(watchlists, &matcher).assign_all(concalls, now());
    Reconciler::new(calendar, &matcher, watchlists, PRIMARY)
        .with_secondary(Some(SECONDARY))
        .at(now())
        .run(concalls, &colors)
        .await
}

#[test]
fn dedup_and_sort_prepare_the_batch() {
    let concalls = prepare();
    let names: Vec<&str> = concalls.iter().map(|c| c.company.as_str()).collect();
    assert_eq!(
        names,
        [
            "Old Results Co",
            "Tata Motors Ltd.",
            "Infosys Ltd",
            "HDFC Bank",
            "Wipro Ltd",
            "TBA Industries",
        ]
    );
}

#[test]
fn overlapping_calls_get_distinct_colors_and_watchlist_wins() {
    let concalls = prepare();
    let set = watchlists();
    let matcher = PermissiveMatcher;
    let colors = ColorEngine::new(&set, &matcher).assign_all(&concalls, now());

    // Old Results Co: past.
    assert_eq!(colors[0], None);
    // Tata Motors is in the portfolio; its overlap slot is still occupied.
    assert_eq!(colors[1].as_deref(), Some("11"));
    assert_eq!(colors[2].as_deref(), Some(OVERLAP_PALETTE[1]));
    assert_eq!(colors[3].as_deref(), Some(OVERLAP_PALETTE[2]));
    // Wipro starts alone.
    assert_eq!(colors[4], None);
    assert_eq!(colors[5], None);
}

#[tokio::test]
async fn full_sync_creates_mirrors_and_is_idempotent() {
    let calendar = InMemoryCalendar::default();
    let set = watchlists();
    let concalls = prepare();

    let first = sync(&calendar, &set, &concalls).await;
    // Four future concalls created; past and unparseable skipped.
    assert_eq!((first.created, first.updated, first.skipped), (4, 0, 2));
    assert_eq!(first.mirror.inserted, 1);

    let primary = calendar.events_in(PRIMARY).await;
    assert_eq!(primary.len(), 4);
    assert!(primary.iter().all(|e| e.identity.is_some()));
    let secondary = calendar.events_in(SECONDARY).await;
    assert_eq!(secondary.len(), 1);
    assert_eq!(secondary[0].summary.as_deref(), Some("📞 Tata Motors Ltd. - Concall"));

    let writes_after_first = calendar.write_count().await;
    let second = sync(&calendar, &set, &concalls).await;
    assert_eq!((second.created, second.updated), (0, 0));
    assert_eq!(second.skipped, 6);
    assert_eq!(second.mirror.already_present, 1);
    assert_eq!(calendar.write_count().await, writes_after_first);
}

#[tokio::test]
async fn phone_update_rewrites_existing_event() {
    let calendar = InMemoryCalendar::default();
    let set = WatchlistSet::default();
    let mut concalls = prepare();
    sync(&calendar, &set, &concalls).await;

    concalls[4].phone = Some("1800 120 1221".into());
    let report = sync(&calendar, &set, &concalls).await;
    assert_eq!((report.created, report.updated), (0, 1));

    let wipro = calendar
        .events_in(PRIMARY)
        .await
        .into_iter()
        .find(|e| e.summary.as_deref() == Some("📞 Wipro Ltd - Concall"))
        .unwrap();
    assert!(wipro.description.unwrap().contains("1800 120 1221"));
}

#[tokio::test]
async fn untagged_secondary_event_blocks_the_mirror() {
    let calendar = InMemoryCalendar::default();
    // Added by hand three minutes after the listed start (11:00 IST = 05:30 UTC).
    calendar
        .seed(
            SECONDARY,
            CalendarEvent {
                id: "manual-1".into(),
                summary: Some("Tata Motors earnings call".into()),
                start: Some(Utc.with_ymd_and_hms(2026, 1, 24, 5, 33, 0).unwrap()),
                ..CalendarEvent::default()
            },
        )
        .await;

    let report = sync(&calendar, &watchlists(), &prepare()).await;
    assert_eq!(report.mirror.duplicates, 1);
    assert_eq!(report.mirror.inserted, 0);
    assert_eq!(calendar.events_in(SECONDARY).await.len(), 1);
}

#[tokio::test]
async fn rescheduled_call_gets_a_new_event() {
    let calendar = InMemoryCalendar::default();
    let set = WatchlistSet::default();
    let mut concalls = prepare();
    sync(&calendar, &set, &concalls).await;

    concalls[4].time = "5:00:00 PM".into();
    let report = sync(&calendar, &set, &concalls).await;
    assert_eq!(report.created, 1);
    assert_eq!(calendar.events_in(PRIMARY).await.len(), 5);
}

#[tokio::test]
async fn dry_run_reads_but_never_writes() {
    let calendar = InMemoryCalendar::default();
    let set = watchlists();
    let concalls = prepare();

    let dry = DryRunCalendar::new(calendar);
    let report = sync(&dry, &set, &concalls).await;
    assert_eq!(report.created, 4);
    assert_eq!(report.mirror.inserted, 1);
    assert_eq!(dry.suppressed_writes(), 5);
}
