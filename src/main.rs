use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use concall_sync::config::Config;
use concall_sync::service::automation::{run, RunOptions, RunSummary};

/// Scrape upcoming concalls and sync them to Google Sheets and Calendar.
#[derive(Parser, Debug)]
#[command(name = "concall-sync", version)]
struct Cli {
    /// Read calendars and log intended writes without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Override TARGET_CONCALL_COUNT for this run
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    max: Option<u64>,

    /// Do not write the Google Sheet
    #[arg(long)]
    skip_sheets: bool,

    /// Do not touch either calendar
    #[arg(long)]
    skip_calendar: bool,

    /// Override CSV_PATH for this run
    #[arg(long, value_name = "PATH")]
    csv: Option<PathBuf>,
}

impl From<Cli> for RunOptions {
    fn from(cli: Cli) -> Self {
        Self {
            dry_run: cli.dry_run,
            max: cli.max.map(|n| n as usize),
            skip_sheets: cli.skip_sheets,
            skip_calendar: cli.skip_calendar,
            csv_path: cli.csv,
        }
    }
}

/// Closing banner. Sync and mirror tallies are logged by the reconciler itself.
fn summary_lines(summary: &RunSummary, dry_run: bool) -> Vec<String> {
    let rule = "=".repeat(60);
    let mut lines = vec![rule.clone()];
    if let Some(path) = &summary.csv_path {
        lines.push(format!("CSV backup saved: {}", path.display()));
    }
    if let Some(url) = &summary.sheet_url {
        lines.push(format!("Sheet URL: {url}"));
    }
    if dry_run {
        lines.push(format!(
            "[dry-run] {} calendar writes suppressed",
            summary.suppressed_writes
        ));
    }
    lines.push(format!("Done! {} concalls processed", summary.concalls));
    lines.push(rule);
    lines
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pdf_extract=error,lopdf=error"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = RunOptions::from(Cli::parse());
    let config = Config::from_env()?;

    let summary = match run(&config, &options).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Fatal error: {e:#}");
            return Err(e);
        }
    };

    for line in summary_lines(&summary, options.dry_run) {
        info!("{}", line);
    }

    Ok(())
}
