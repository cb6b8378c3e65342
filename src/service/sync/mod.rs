//! Reconciliation core: dedup, identity, name matching, colors and the
//! per-calendar create/update/skip state machine.

pub mod colors;
pub mod dedup;
pub mod event;
pub mod matcher;
pub mod reconcile;
pub mod schedule;

pub use colors::{ColorEngine, TimeSlots, OVERLAP_PALETTE};
pub use dedup::{dedup_listings, Deduper};
pub use event::build_event_body;
pub use matcher::{normalize_company, NameMatcher, PermissiveMatcher};
pub use reconcile::{classify, MirrorReport, Reconciler, SyncAction, SyncReport, SyncState};
pub use schedule::{parse_schedule, sort_by_start, SCHEDULE_TZ};
