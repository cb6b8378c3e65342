use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use super::{ListingSource, ScrapeError};
use crate::models::RawListing;
use crate::service::http::USER_AGENT;

pub const SCREENER_BASE: &str = "https://www.screener.in/";

static TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<table\b").expect("TABLE_RE should compile")
});
static ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("ROW_RE should compile")
});
static TH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<th\b[^>]*>(.*?)</th>").expect("TH_RE should compile")
});
static TD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").expect("TD_RE should compile")
});
static HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']*)["']"#).expect("HREF_RE should compile")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<[^>]*>").expect("TAG_RE should compile")
});
static INPUT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<input\b[^>]*>").expect("INPUT_RE should compile")
});
static VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bvalue\s*=\s*["']([^"']*)["']"#).expect("VALUE_RE should compile")
});

/// Session-authenticated client for the upcoming-concalls listing.
pub struct ScreenerClient {
    http: Client,
    base: Url,
    page_timeout: Duration,
}

impl ScreenerClient {
    pub fn new(page_timeout: Duration) -> Result<Self, ScrapeError> {
        Self::with_base(SCREENER_BASE, page_timeout)
    }

    pub fn with_base(base: &str, page_timeout: Duration) -> Result<Self, ScrapeError> {
        let http = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base: Url::parse(base)?,
            page_timeout,
        })
    }

    /// Log in through the CSRF-protected form. The session cookie stays in the client.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ScrapeError> {
        info!("Logging in to Screener.in...");
        let login_url = self.base.join("login/")?;

        let page = self
            .http
            .get(login_url.clone())
            .timeout(self.page_timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let token = parse_csrf_token(&page)
            .ok_or_else(|| ScrapeError::LoginFailed("login form not found".into()))?;

        let resp = self
            .http
            .post(login_url.clone())
            .header(reqwest::header::REFERER, login_url.as_str())
            .form(&[
                ("csrfmiddlewaretoken", token.as_str()),
                ("username", username),
                ("password", password),
            ])
            .timeout(self.page_timeout)
            .send()
            .await?;

        if resp.url().as_str().to_lowercase().contains("login") {
            return Err(ScrapeError::LoginFailed(
                "still on login page after submit".into(),
            ));
        }
        info!("Login successful");
        Ok(())
    }
}

#[async_trait]
impl ListingSource for ScreenerClient {
    async fn fetch_page(&self, page: u32) -> Result<Vec<RawListing>, ScrapeError> {
        let mut url = self.base.join("concalls/upcoming/")?;
        url.query_pairs_mut().append_pair("p", &page.to_string());

        let resp = match self.http.get(url.clone()).timeout(self.page_timeout).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                warn!("Page {} did not load in time", page);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let html = match resp.error_for_status()?.text().await {
            Ok(html) => html,
            Err(e) if e.is_timeout() => {
                warn!("Page {} did not load in time", page);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        if !TABLE_RE.is_match(&html) {
            warn!("Page {} has no listing table", page);
            return Ok(Vec::new());
        }
        Ok(parse_listing_rows(&html, &url))
    }
}

/// Extract the Django CSRF form token from the login page.
pub fn parse_csrf_token(html: &str) -> Option<String> {
    INPUT_RE
        .find_iter(html)
        .map(|m| m.as_str())
        .find(|tag| tag.contains("csrfmiddlewaretoken"))
        .and_then(|tag| VALUE_RE.captures(tag))
        .map(|c| c[1].to_string())
        .filter(|t| !t.is_empty())
}

/// Rows shaped `<th>company [links]</th><td>date</td><td>time</td>...`.
///
/// Rows without a header cell or with fewer than two data cells are skipped. The document
/// link is the first href in the header cell containing `.pdf`, resolved against `page_url`.
pub fn parse_listing_rows(html: &str, page_url: &Url) -> Vec<RawListing> {
    let mut rows = Vec::new();
    for row in ROW_RE.captures_iter(html) {
        let inner = &row[1];
        let Some(th) = TH_RE.captures(inner) else {
            continue;
        };
        let cells: Vec<String> = TD_RE
            .captures_iter(inner)
            .map(|c| cell_text(&c[1]))
            .collect();
        if cells.len() < 2 {
            continue;
        }

        let document_url = HREF_RE
            .captures_iter(&th[1])
            .map(|c| decode_entities(&c[1]))
            .find(|href| href.to_lowercase().contains(".pdf"))
            .and_then(|href| page_url.join(&href).ok())
            .map(String::from);

        rows.push(RawListing {
            company: Some(cell_text(&th[1])),
            date: Some(cells[0].clone()),
            time: Some(cells[1].clone()),
            document_url,
        });
    }
    rows
}

fn cell_text(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
