use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Phone value stored when the announcement has not been processed yet.
pub const PHONE_NOT_FOUND: &str = "Not found";

/// One row as yielded by the listing source. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
}

/// An upcoming earnings call announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concall {
    pub company: String,
    pub date: String, // e.g. "24 January 2026"
    pub time: String, // e.g. "9:30:00 AM"
    pub document_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Concall {
    pub fn new(
        company: impl Into<String>,
        date: impl Into<String>,
        time: impl Into<String>,
        document_url: impl Into<String>,
    ) -> Self {
        Self {
            company: company.into(),
            date: date.into(),
            time: time.into(),
            document_url: document_url.into(),
            phone: None,
        }
    }

    pub fn identity(&self) -> ConcallIdentity {
        ConcallIdentity::of(&self.company, &self.date, &self.time)
    }

    /// Dial-in text as shown to users.
    pub fn phone_display(&self) -> &str {
        self.phone.as_deref().unwrap_or(PHONE_NOT_FOUND)
    }
}

/// Content-derived token correlating a concall with the calendar events created for it.
///
/// Derived from `(company, date, time)` only, so a rescheduled call gets a new identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcallIdentity(String);

impl ConcallIdentity {
    pub fn of(company: &str, date: &str, time: &str) -> Self {
        let mut hasher = Sha256::new();
        // Unit separator keeps ("a_b", "c") and ("a", "b_c") apart.
        hasher.update(company.as_bytes());
        hasher.update([0x1f]);
        hasher.update(date.as_bytes());
        hasher.update([0x1f]);
        hasher.update(time.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a tag read back from a calendar event.
    pub fn from_tag(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConcallIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
