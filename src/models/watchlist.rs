use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("failed to read watchlists file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid watchlists JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("watchlist {0} has no colors")]
    NoColors(String),
    #[error("mirror watchlist {0} is not defined")]
    UnknownMirror(String),
}

/// How a watchlist hands out colors to its matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRule {
    /// Always the first color.
    #[default]
    Single,
    /// Round-robin across the colors for the duration of one run.
    Cyclic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watchlist {
    pub name: String,
    #[serde(default)]
    pub companies: Vec<String>,
    pub colors: Vec<String>,
    #[serde(default)]
    pub rule: ColorRule,
}

impl Watchlist {
    pub fn new(name: impl Into<String>, companies: &[&str], colors: &[&str], rule: ColorRule) -> Self {
        Self {
            name: name.into(),
            companies: companies.iter().map(|c| c.to_string()).collect(),
            colors: colors.iter().map(|c| c.to_string()).collect(),
            rule,
        }
    }
}

/// Watchlists in priority order (most specific first) plus the one whose
/// matches are mirrored into the secondary calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_watchlist: Option<String>,
    #[serde(default)]
    pub watchlists: Vec<Watchlist>,
}

impl WatchlistSet {
    pub fn new(watchlists: Vec<Watchlist>, mirror_watchlist: Option<String>) -> Result<Self, WatchlistError> {
        let set = Self {
            mirror_watchlist,
            watchlists,
        };
        set.validate()?;
        Ok(set)
    }

    pub fn from_json(raw: &str) -> Result<Self, WatchlistError> {
        let set: Self = serde_json::from_str(raw)?;
        set.validate()?;
        Ok(set)
    }

    pub fn load(path: &Path) -> Result<Self, WatchlistError> {
        let raw = std::fs::read_to_string(path).map_err(|source| WatchlistError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    fn validate(&self) -> Result<(), WatchlistError> {
        if let Some(list) = self.watchlists.iter().find(|w| w.colors.is_empty()) {
            return Err(WatchlistError::NoColors(list.name.clone()));
        }
        if let Some(name) = &self.mirror_watchlist {
            if !self.watchlists.iter().any(|w| &w.name == name) {
                return Err(WatchlistError::UnknownMirror(name.clone()));
            }
        }
        Ok(())
    }

    /// Watchlists in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Watchlist> {
        self.watchlists.iter()
    }

    pub fn mirror(&self) -> Option<&Watchlist> {
        let name = self.mirror_watchlist.as_ref()?;
        self.watchlists.iter().find(|w| &w.name == name)
    }
}
