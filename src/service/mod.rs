pub mod automation;
pub mod caching;
pub mod calendar;
pub mod export;
pub mod google;
pub mod http;
pub mod phone;
pub mod scraper;
pub mod sync;
