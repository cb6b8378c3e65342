pub mod calendar;
pub mod concall;
pub mod watchlist;

pub use calendar::{CalendarEvent, EventBody, REMINDER_MINUTES};
pub use concall::{Concall, ConcallIdentity, RawListing, PHONE_NOT_FOUND};
pub use watchlist::{ColorRule, Watchlist, WatchlistError, WatchlistSet};
