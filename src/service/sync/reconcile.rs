use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use crate::models::{CalendarEvent, Concall, ConcallIdentity, EventBody, WatchlistSet};
use crate::service::calendar::{CalendarError, CalendarService};
use crate::service::sync::event::build_event_body;
use crate::service::sync::matcher::{is_member, search_keyword, significant_tokens, NameMatcher};
use crate::service::sync::schedule::concall_start;

/// Upper bound on events read back per calendar.
pub const SNAPSHOT_LIMIT: usize = 500;
/// Half-width of the window searched for untagged duplicates.
pub const SEARCH_WINDOW_MINUTES: i64 = 60;
/// Start-time tolerance for an untagged event to count as the same call.
pub const DUPLICATE_TOLERANCE_SECS: i64 = 300;

/// Where a concall stands relative to one calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Past,
    New,
    Unchanged,
    Changed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Create,
    Update,
    Skip,
}

impl SyncState {
    pub fn action(self) -> SyncAction {
        match self {
            SyncState::New => SyncAction::Create,
            SyncState::Changed => SyncAction::Update,
            SyncState::Past | SyncState::Unchanged => SyncAction::Skip,
        }
    }
}

/// Classify a concall against the event (if any) already carrying its identity.
pub fn classify(
    start: &DateTime<Tz>,
    now: DateTime<Utc>,
    existing: Option<&CalendarEvent>,
    body: &EventBody,
) -> SyncState {
    if start.with_timezone(&Utc) < now {
        return SyncState::Past;
    }
    match existing {
        None => SyncState::New,
        Some(event) if body.matches(event) => SyncState::Unchanged,
        Some(_) => SyncState::Changed,
    }
}

/// Untagged event close enough in time whose title mentions the company.
pub fn is_near_duplicate(
    candidate: &CalendarEvent,
    start: DateTime<Utc>,
    normalized_company: &str,
    tokens: &[&str],
) -> bool {
    let Some(candidate_start) = candidate.start else {
        return false;
    };
    if (candidate_start - start).num_seconds().abs() > DUPLICATE_TOLERANCE_SECS {
        return false;
    }
    let summary = candidate
        .summary
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    (!normalized_company.is_empty() && summary.contains(normalized_company))
        || tokens.iter().any(|t| summary.contains(t))
}

type Snapshot = HashMap<ConcallIdentity, CalendarEvent>;

/// Index tagged events by identity; untagged events are ignored.
pub fn index_by_identity(events: Vec<CalendarEvent>) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for event in events {
        if let Some(identity) = event.identity.clone() {
            snapshot.entry(identity).or_insert(event);
        }
    }
    snapshot
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub inserted: usize,
    pub already_present: usize,
    pub duplicates: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub mirror: MirrorReport,
}

/// Drives create/update/skip decisions for a batch against the primary
/// calendar, and mirrors watchlist matches into the secondary one.
pub struct Reconciler<'a> {
    calendar: &'a dyn CalendarService,
    matcher: &'a dyn NameMatcher,
    watchlists: &'a WatchlistSet,
    primary: &'a str,
    secondary: Option<&'a str>,
    now: DateTime<Utc>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        calendar: &'a dyn CalendarService,
        matcher: &'a dyn NameMatcher,
        watchlists: &'a WatchlistSet,
        primary: &'a str,
    ) -> Self {
        Self {
            calendar,
            matcher,
            watchlists,
            primary,
            secondary: None,
            now: Utc::now(),
        }
    }

    pub fn with_secondary(mut self, calendar_id: Option<&'a str>) -> Self {
        self.secondary = calendar_id;
        self
    }

    /// Evaluate past/future against a fixed instant instead of the wall clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Reconcile every concall. `colors` is aligned with `concalls` by index.
    pub async fn run(&self, concalls: &[Concall], colors: &[Option<String>]) -> SyncReport {
        info!("Syncing {} concalls to calendar {}", concalls.len(), self.primary);
        let mut report = SyncReport::default();

        // Without a snapshot every create could be a duplicate, so the primary sync is skipped.
        let mut primary = match self.load_snapshot(self.primary).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                error!("Could not fetch existing events from {}: {}", self.primary, e);
                None
            }
        };

        let mirror_target = self.secondary.filter(|_| self.watchlists.mirror().is_some());
        let mut secondary = match mirror_target {
            Some(calendar_id) => match self.load_snapshot(calendar_id).await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    error!("Could not fetch existing events from {}: {}", calendar_id, e);
                    None
                }
            },
            None => None,
        };

        for (idx, concall) in concalls.iter().enumerate() {
            let Some(start) = concall_start(concall) else {
                warn!("Skipping {}: could not parse date/time", concall.company);
                report.skipped += 1;
                continue;
            };

            let color = colors.get(idx).cloned().flatten();
            let body = build_event_body(concall, start, color);

            match primary.as_mut() {
                Some(snapshot) => {
                    let state = classify(&start, self.now, snapshot.get(&body.identity), &body);
                    if state == SyncState::Past {
                        report.skipped += 1;
                        continue;
                    }
                    self.apply(snapshot, &body, state, &concall.company, &mut report)
                        .await;
                }
                None => {
                    report.skipped += 1;
                    if start.with_timezone(&Utc) < self.now {
                        continue;
                    }
                }
            }

            if let Some(calendar_id) = mirror_target {
                if !self.is_mirror_eligible(&concall.company) {
                    continue;
                }
                match secondary.as_mut() {
                    Some(snapshot) => {
                        self.mirror(calendar_id, snapshot, concall, &body, &mut report.mirror)
                            .await
                    }
                    None => report.mirror.failed += 1,
                }
            }
        }

        info!(
            "Calendar sync complete - Created: {}, Updated: {}, Skipped: {}",
            report.created, report.updated, report.skipped
        );
        if mirror_target.is_some() {
            info!(
                "Mirror sync - Inserted: {}, Already present: {}, Duplicates: {}, Failed: {}",
                report.mirror.inserted,
                report.mirror.already_present,
                report.mirror.duplicates,
                report.mirror.failed
            );
        }
        report
    }

    async fn load_snapshot(&self, calendar_id: &str) -> Result<Snapshot, CalendarError> {
        let events = self
            .calendar
            .list_upcoming(calendar_id, self.now, SNAPSHOT_LIMIT)
            .await?;
        debug!("Fetched {} upcoming events from {}", events.len(), calendar_id);
        Ok(index_by_identity(events))
    }

    async fn apply(
        &self,
        snapshot: &mut Snapshot,
        body: &EventBody,
        state: SyncState,
        company: &str,
        report: &mut SyncReport,
    ) {
        match state.action() {
            SyncAction::Skip => report.skipped += 1,
            SyncAction::Create => match self.calendar.insert(self.primary, body).await {
                Ok(id) => {
                    debug!("Created event {} for {}", id, company);
                    snapshot.insert(body.identity.clone(), body.to_event(id));
                    report.created += 1;
                }
                Err(e) => {
                    error!("Calendar API error for {}: {}", company, e);
                    report.skipped += 1;
                }
            },
            SyncAction::Update => {
                let Some(event_id) = snapshot.get(&body.identity).map(|e| e.id.clone()) else {
                    report.skipped += 1;
                    return;
                };
                match self.calendar.update(self.primary, &event_id, body).await {
                    Ok(()) => {
                        debug!("Updated event {} for {}", event_id, company);
                        snapshot.insert(body.identity.clone(), body.to_event(event_id));
                        report.updated += 1;
                    }
                    Err(e) => {
                        error!("Calendar API error for {}: {}", company, e);
                        report.skipped += 1;
                    }
                }
            }
        }
    }

    fn is_mirror_eligible(&self, company: &str) -> bool {
        self.watchlists
            .mirror()
            .is_some_and(|list| is_member(self.matcher, list, company))
    }

    async fn mirror(
        &self,
        calendar_id: &str,
        snapshot: &mut Snapshot,
        concall: &Concall,
        body: &EventBody,
        report: &mut MirrorReport,
    ) {
        if snapshot.contains_key(&body.identity) {
            report.already_present += 1;
            return;
        }

        let start = body.start.with_timezone(&Utc);
        match self.find_duplicate(calendar_id, &concall.company, start).await {
            Ok(Some(existing)) => {
                info!(
                    "Skipping mirror of {}: matches existing event {} ({})",
                    concall.company,
                    existing.id,
                    existing.summary.as_deref().unwrap_or_default()
                );
                report.duplicates += 1;
            }
            Ok(None) => match self.calendar.insert(calendar_id, body).await {
                Ok(id) => {
                    debug!("Mirrored {} as event {}", concall.company, id);
                    snapshot.insert(body.identity.clone(), body.to_event(id));
                    report.inserted += 1;
                }
                Err(e) => {
                    error!("Mirror insert failed for {}: {}", concall.company, e);
                    report.failed += 1;
                }
            },
            Err(e) => {
                error!("Duplicate search failed for {}: {}", concall.company, e);
                report.failed += 1;
            }
        }
    }

    /// Search `calendar_id` for an untagged event that is the same call.
    pub async fn find_duplicate(
        &self,
        calendar_id: &str,
        company: &str,
        start: DateTime<Utc>,
    ) -> Result<Option<CalendarEvent>, CalendarError> {
        let normalized = self.matcher.normalize(company);
        let Some(keyword) = search_keyword(&normalized) else {
            return Ok(None);
        };
        let tokens = significant_tokens(&normalized);

        let window = Duration::minutes(SEARCH_WINDOW_MINUTES);
        let candidates = self
            .calendar
            .search(calendar_id, keyword, start - window, start + window)
            .await?;

        Ok(candidates
            .into_iter()
            .find(|candidate| is_near_duplicate(candidate, start, &normalized, &tokens)))
    }
}
