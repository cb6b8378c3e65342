use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::{Concall, WatchlistSet};
use crate::service::caching::collections::CachedPhoneLookup;
use crate::service::caching::{RedisCache, KEY_PREFIX};
use crate::service::calendar::{CalendarService, DryRunCalendar};
use crate::service::export::write_csv;
use crate::service::google::{GoogleAuth, GoogleCalendar, SheetsWriter};
use crate::service::http::USER_AGENT;
use crate::service::phone::{attach_phones, PdfPhoneLookup, PhoneLookup};
use crate::service::scraper::{collect_concalls, ScreenerClient};
use crate::service::sync::{sort_by_start, ColorEngine, PermissiveMatcher, Reconciler, SyncReport};

/// Per-invocation switches layered over `Config`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub max: Option<usize>,
    pub skip_sheets: bool,
    pub skip_calendar: bool,
    pub csv_path: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub concalls: usize,
    pub csv_path: Option<PathBuf>,
    pub sheet_url: Option<String>,
    pub sync: Option<SyncReport>,
    /// Calendar writes suppressed by `--dry-run`.
    pub suppressed_writes: usize,
}

/// One full pass: scrape, enrich, snapshot, then push to the sheet and calendars.
///
/// Fails only on configuration or credential problems, a failed login, or an empty listing.
pub async fn run(config: &Config, options: &RunOptions) -> Result<RunSummary> {
    let needs_google = !(options.skip_sheets && options.skip_calendar);
    let watchlists = config.watchlists()?;

    let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    let auth = if needs_google {
        let creds = config.google_credentials()?;
        let auth = Arc::new(GoogleAuth::new(http.clone(), creds));
        auth.access_token()
            .await
            .context("Google authentication failed")?;
        Some(auth)
    } else {
        None
    };

    let screener = ScreenerClient::new(config.page_timeout)?;
    screener
        .login(&config.screener_username, &config.screener_password)
        .await?;

    let target = options.max.unwrap_or(config.target_count);
    let mut concalls = collect_concalls(&screener, target).await;
    if concalls.is_empty() {
        bail!("No concalls found");
    }

    let lookup = phone_lookup(config).await?;
    attach_phones(&mut concalls, lookup.as_ref(), config.rate_limit_delay).await;

    sort_by_start(&mut concalls);
    info!("Sorted concalls by date/time");

    let mut summary = RunSummary {
        concalls: concalls.len(),
        ..RunSummary::default()
    };

    let csv_path = options.csv_path.clone().unwrap_or_else(|| config.csv_path.clone());
    match write_csv(&csv_path, &concalls).await {
        Ok(()) => summary.csv_path = Some(csv_path),
        Err(e) => warn!("CSV snapshot skipped: {}", e),
    }

    let Some(auth) = auth else {
        return Ok(summary);
    };

    if options.skip_sheets {
        info!("Sheet export disabled");
    } else if options.dry_run {
        info!("[dry-run] would write {} rows to sheet {}", concalls.len(), config.sheet_name);
    } else {
        let sheets = SheetsWriter::new(
            http.clone(),
            auth.clone(),
            config.sheet_name.clone(),
            config.spreadsheet_id.clone(),
        );
        match sheets.write(&concalls).await {
            Ok(url) => summary.sheet_url = Some(url),
            Err(e) => error!("Sheet export failed: {}", e),
        }
    }

    if options.skip_calendar {
        info!("Calendar sync disabled");
        return Ok(summary);
    }

    let calendar = GoogleCalendar::new(http, auth);
    if options.dry_run {
        let dry = DryRunCalendar::new(calendar);
        summary.sync = Some(sync_calendars(config, &watchlists, &dry, &concalls).await);
        summary.suppressed_writes = dry.suppressed_writes();
    } else {
        summary.sync = Some(sync_calendars(config, &watchlists, &calendar, &concalls).await);
    }

    Ok(summary)
}

async fn phone_lookup(config: &Config) -> Result<Box<dyn PhoneLookup>> {
    let pdf = PdfPhoneLookup::new()?;
    let Some(url) = config.redis_url.as_deref() else {
        return Ok(Box::new(pdf));
    };
    match RedisCache::connect(url, KEY_PREFIX).await {
        Ok(cache) => Ok(Box::new(CachedPhoneLookup::new(pdf, cache))),
        Err(err) => {
            info!("Redis cache disabled: {err}");
            Ok(Box::new(pdf))
        }
    }
}

async fn sync_calendars(
    config: &Config,
    watchlists: &WatchlistSet,
    calendar: &dyn CalendarService,
    concalls: &[Concall],
) -> SyncReport {
    let now = Utc::now();
    let matcher = PermissiveMatcher;
    let colors = ColorEngine::new(watchlists, &matcher).assign_all(concalls, now);

    Reconciler::new(calendar, &matcher, watchlists, &config.calendar_id)
        .with_secondary(config.secondary_calendar_id.as_deref())
        .at(now)
        .run(concalls, &colors)
        .await
}
