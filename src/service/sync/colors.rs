use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{ColorRule, Concall, ConcallIdentity, WatchlistSet};
use crate::service::sync::matcher::{matching_watchlist, NameMatcher};
use crate::service::sync::schedule::{concall_start, minute_slot};

/// Calendar color ids used to tell apart calls starting at the same minute.
/// 8 (Graphite) is left out.
pub const OVERLAP_PALETTE: [&str; 10] = ["1", "2", "3", "4", "5", "6", "7", "9", "10", "11"];

/// Future concalls grouped by start minute, in iteration order.
#[derive(Debug, Default)]
pub struct TimeSlots {
    slots: HashMap<i64, Vec<ConcallIdentity>>,
}

impl TimeSlots {
    /// Group every concall that starts at or after `now`.
    pub fn group(concalls: &[Concall], now: DateTime<Utc>) -> Self {
        let mut slots: HashMap<i64, Vec<ConcallIdentity>> = HashMap::new();
        for concall in concalls {
            let Some(start) = concall_start(concall) else {
                continue;
            };
            if start.with_timezone(&Utc) < now {
                continue;
            }
            slots
                .entry(minute_slot(&start))
                .or_default()
                .push(concall.identity());
        }
        Self { slots }
    }

    /// Palette color by position within the concall's slot, when the slot is shared.
    pub fn overlap_color(&self, concall: &Concall) -> Option<&'static str> {
        let start = concall_start(concall)?;
        let group = self.slots.get(&minute_slot(&start))?;
        if group.len() < 2 {
            return None;
        }
        let identity = concall.identity();
        let position = group.iter().position(|id| *id == identity)?;
        Some(OVERLAP_PALETTE[position % OVERLAP_PALETTE.len()])
    }
}

/// Assigns presentation colors for one run.
///
/// Cyclic watchlist counters live here, so a fresh engine starts every
/// watchlist at its first color.
pub struct ColorEngine<'a> {
    watchlists: &'a WatchlistSet,
    matcher: &'a dyn NameMatcher,
    counters: HashMap<String, usize>,
}

impl<'a> ColorEngine<'a> {
    pub fn new(watchlists: &'a WatchlistSet, matcher: &'a dyn NameMatcher) -> Self {
        Self {
            watchlists,
            matcher,
            counters: HashMap::new(),
        }
    }

    /// Color from the first matching watchlist, advancing its counter when cyclic.
    pub fn watchlist_color(&mut self, company: &str) -> Option<String> {
        let list = matching_watchlist(self.matcher, self.watchlists, company)?;
        match list.rule {
            ColorRule::Single => list.colors.first().cloned(),
            ColorRule::Cyclic => {
                let counter = self.counters.entry(list.name.clone()).or_insert(0);
                let color = list.colors.get(*counter % list.colors.len().max(1)).cloned();
                *counter += 1;
                color
            }
        }
    }

    /// Watchlist color first, then overlap color, else none.
    pub fn color_for(&mut self, concall: &Concall, slots: &TimeSlots) -> Option<String> {
        self.watchlist_color(&concall.company)
            .or_else(|| slots.overlap_color(concall).map(str::to_string))
    }

    /// Colors for every concall, aligned by index. Past and unparseable
    /// concalls are never synced, so they get none and do not advance counters.
    pub fn assign_all(&mut self, concalls: &[Concall], now: DateTime<Utc>) -> Vec<Option<String>> {
        let slots = TimeSlots::group(concalls, now);
        concalls
            .iter()
            .map(|concall| match concall_start(concall) {
                Some(start) if start.with_timezone(&Utc) >= now => self.color_for(concall, &slots),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Watchlist;
    use crate::service::sync::matcher::PermissiveMatcher;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn concall(company: &str, time: &str) -> Concall {
        Concall::new(company, "24 January 2026", time, format!("{company}.pdf"))
    }

    fn watchlists() -> WatchlistSet {
        WatchlistSet::new(
            vec![
                Watchlist::new("Portfolio", &["Tata Motors"], &["11"], ColorRule::Single),
                Watchlist::new("Radar", &["Infosys", "Wipro", "HCL"], &["5", "6"], ColorRule::Cyclic),
            ],
            Some("Portfolio".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn three_overlapping_calls_get_distinct_palette_colors() {
        let set = WatchlistSet::default();
        let mut engine = ColorEngine::new(&set, &PermissiveMatcher);
        let concalls = vec![
            concall("Alpha", "9:30:00 AM"),
            concall("Beta", "9:30:00 AM"),
            concall("Gamma", "9:30:00 AM"),
            concall("Solo", "11:00:00 AM"),
        ];
        let colors = engine.assign_all(&concalls, now());
        assert_eq!(colors[0].as_deref(), Some("1"));
        assert_eq!(colors[1].as_deref(), Some("2"));
        assert_eq!(colors[2].as_deref(), Some("3"));
        assert_eq!(colors[3], None);
    }

    #[test]
    fn overlap_palette_wraps() {
        let concalls: Vec<_> = (0..12).map(|i| concall(&format!("Co{i}"), "2:00:00 PM")).collect();
        let slots = TimeSlots::group(&concalls, now());
        assert_eq!(slots.overlap_color(&concalls[10]), Some("1"));
        assert_eq!(slots.overlap_color(&concalls[11]), Some("2"));
    }

    #[test]
    fn watchlist_color_beats_overlap_color() {
        let set = watchlists();
        let mut engine = ColorEngine::new(&set, &PermissiveMatcher);
        let concalls = vec![
            concall("Tata Motors Ltd.", "9:30:00 AM"),
            concall("Unlisted Co", "9:30:00 AM"),
        ];
        let colors = engine.assign_all(&concalls, now());
        assert_eq!(colors[0].as_deref(), Some("11"));
        // Position 1 in the shared slot.
        assert_eq!(colors[1].as_deref(), Some("2"));
    }

    #[test]
    fn cyclic_watchlist_round_robins() {
        let set = watchlists();
        let mut engine = ColorEngine::new(&set, &PermissiveMatcher);
        assert_eq!(engine.watchlist_color("Infosys Ltd").as_deref(), Some("5"));
        assert_eq!(engine.watchlist_color("Wipro Limited").as_deref(), Some("6"));
        assert_eq!(engine.watchlist_color("HCL Technologies").as_deref(), Some("5"));
    }

    #[test]
    fn counters_do_not_leak_between_engines() {
        let set = watchlists();
        let mut first = ColorEngine::new(&set, &PermissiveMatcher);
        first.watchlist_color("Infosys");
        let mut second = ColorEngine::new(&set, &PermissiveMatcher);
        assert_eq!(second.watchlist_color("Infosys").as_deref(), Some("5"));
    }

    #[test]
    fn past_calls_get_no_color_and_keep_counters() {
        let set = watchlists();
        let mut engine = ColorEngine::new(&set, &PermissiveMatcher);
        let concalls = vec![
            Concall::new("Infosys", "1 January 2020", "9:30:00 AM", "old.pdf"),
            concall("Wipro", "9:30:00 AM"),
        ];
        let colors = engine.assign_all(&concalls, now());
        assert_eq!(colors[0], None);
        assert_eq!(colors[1].as_deref(), Some("5"));
    }
}
