//! Dial-in number extraction from announcement documents.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};

use crate::models::{Concall, PHONE_NOT_FOUND};
use crate::service::http::{send_with_retry, RetryPolicy, USER_AGENT};

pub const DOWNLOAD_FAILED: &str = "Download failed";
pub const DOCUMENT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_NUMBERS: usize = 3;
const ERROR_DETAIL_CHARS: usize = 30;

/// Tried in order; matches are concatenated before de-duplication.
static PHONE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\+91[-\s]?\d{2}[-\s]?\d{4}[-\s]?\d{4}", // +91 22 6280 1234
        r"\+91[-\s]?\d{10}",                      // +91 9876543210
        r"91[-\s]?\d{2}[-\s]?\d{4}[-\s]?\d{4}",   // 91 22 6280 1234
        r"\d{4}[-\s]?\d{3}[-\s]?\d{4}",           // 1800 123 4567
        r"\d{2,4}[-\s]?\d{4}[-\s]?\d{4}",         // 22 6280 1234
    ]
    .iter()
    .map(|p| Regex::new(p).expect("phone pattern should compile"))
    .collect()
});

/// Up to three unique numbers, in pattern-priority order.
pub fn extract_phone_numbers(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for pattern in PHONE_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            if !found.iter().any(|f| f == m.as_str()) {
                found.push(m.as_str().to_string());
            }
        }
    }
    found.truncate(MAX_NUMBERS);
    found
}

/// Value stored in the concall's phone field for a document's text.
pub fn format_phone_field(text: &str) -> String {
    let numbers = extract_phone_numbers(text);
    if numbers.is_empty() {
        PHONE_NOT_FOUND.to_string()
    } else {
        numbers.join("; ")
    }
}

fn error_field(message: &str) -> String {
    let detail: String = message.chars().take(ERROR_DETAIL_CHARS).collect();
    format!("Error: {detail}")
}

/// Resolve a document URL to a phone field value. Never fails: problems become
/// `Download failed` or `Error: ...`.
#[async_trait]
pub trait PhoneLookup: Send + Sync {
    async fn lookup(&self, document_url: &str) -> String;
}

pub struct PdfPhoneLookup {
    http: Client,
    policy: RetryPolicy,
}

impl PdfPhoneLookup {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(DOCUMENT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            policy: RetryPolicy::default(),
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, reqwest::Error> {
        let resp = send_with_retry(self.http.get(url), &self.policy)
            .await?
            .error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}

/// PDF parsing is CPU-bound and synchronous; keep it off the runtime threads.
async fn extract_text(bytes: Vec<u8>) -> Result<String, String> {
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

#[async_trait]
impl PhoneLookup for PdfPhoneLookup {
    async fn lookup(&self, document_url: &str) -> String {
        let bytes = match self.download(document_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("PDF download failed for {}: {}", document_url, e);
                return DOWNLOAD_FAILED.to_string();
            }
        };
        match extract_text(bytes).await {
            Ok(text) => format_phone_field(&text),
            Err(e) => {
                debug!("PDF extraction error for {}: {}", document_url, e);
                error_field(&e)
            }
        }
    }
}

/// Attach a phone value to every concall, pausing `delay` between lookups.
pub async fn attach_phones(concalls: &mut [Concall], lookup: &dyn PhoneLookup, delay: Duration) {
    info!("Extracting phone numbers from PDFs...");
    let total = concalls.len();
    for (i, concall) in concalls.iter_mut().enumerate() {
        let label: String = concall.company.chars().take(30).collect();
        info!("[{}/{}] {}", i + 1, total, label);
        concall.phone = Some(lookup.lookup(&concall.document_url).await);
        if i + 1 < total && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
