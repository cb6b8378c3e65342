pub mod screener;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{Concall, RawListing};
use crate::service::sync::Deduper;

pub use screener::ScreenerClient;

/// Hard stop in case the source never returns an empty page.
pub const MAX_PAGES: u32 = 50;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A paginated listing of upcoming concalls. Pages are 1-based; an empty page ends pagination.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<Vec<RawListing>, ScrapeError>;
}

/// Walk pages until `target` unique concalls are collected or the source runs dry.
///
/// A failing page is logged and ends pagination with whatever was collected so far.
pub async fn collect_concalls(source: &dyn ListingSource, target: usize) -> Vec<Concall> {
    info!("Fetching up to {} concalls...", target);
    let mut deduper = Deduper::new(target);

    for page in 1..=MAX_PAGES {
        if deduper.is_full() {
            break;
        }
        let rows = match source.fetch_page(page).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Page {} failed: {}", page, e);
                break;
            }
        };
        info!("Page {}: found {} concalls", page, rows.len());
        if rows.is_empty() {
            break;
        }
        for row in rows {
            deduper.push(row);
        }
    }

    info!("Total: {} unique concalls", deduper.len());
    deduper.into_concalls()
}
