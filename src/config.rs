//! Runtime configuration read from the environment (optionally seeded from `.env`).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::{WatchlistError, WatchlistSet};
use crate::service::google::{GoogleApiError, GoogleCredentials};

pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";
pub const DEFAULT_SHEET_NAME: &str = "Screener Concalls";
pub const DEFAULT_TARGET_COUNT: usize = 100;
pub const DEFAULT_RATE_LIMIT_MS: u64 = 300;
pub const DEFAULT_PAGE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CSV_PATH: &str = "concalls.csv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{key} is invalid: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("google credentials: {0}")]
    Credentials(#[source] GoogleApiError),
    #[error("no Google credentials found; set GOOGLE_CREDENTIALS_BASE64 or provide {0}")]
    NoCredentials(String),
    #[error(transparent)]
    Watchlists(#[from] WatchlistError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Base64(String),
    File(PathBuf),
}

#[derive(Clone)]
pub struct Config {
    pub screener_username: String,
    pub screener_password: String,
    pub credentials: CredentialSource,
    pub calendar_id: String,
    pub secondary_calendar_id: Option<String>,
    pub sheet_name: String,
    pub spreadsheet_id: Option<String>,
    pub watchlists_file: Option<PathBuf>,
    pub target_count: usize,
    pub rate_limit_delay: Duration,
    pub page_timeout: Duration,
    pub csv_path: PathBuf,
    pub redis_url: Option<String>,
}

// Keeps the listing-site password out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("screener_username", &self.screener_username)
            .field("calendar_id", &self.calendar_id)
            .field("secondary_calendar_id", &self.secondary_calendar_id)
            .field("sheet_name", &self.sheet_name)
            .field("target_count", &self.target_count)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &'static str| optional(key).ok_or(ConfigError::Missing(key));
        let number = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match optional(key) {
                Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                    key,
                    message: format!("{raw:?}: {e}"),
                }),
                None => Ok(default),
            }
        };

        let credentials = match optional("GOOGLE_CREDENTIALS_BASE64") {
            Some(encoded) => CredentialSource::Base64(encoded),
            None => CredentialSource::File(PathBuf::from(
                optional("GOOGLE_CREDENTIALS_FILE")
                    .unwrap_or_else(|| DEFAULT_CREDENTIALS_FILE.to_string()),
            )),
        };

        let target_count = number("TARGET_CONCALL_COUNT", DEFAULT_TARGET_COUNT as u64)?;
        if target_count == 0 {
            return Err(ConfigError::Invalid {
                key: "TARGET_CONCALL_COUNT",
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            screener_username: required("SCREENER_USERNAME")?,
            screener_password: required("SCREENER_PASSWORD")?,
            credentials,
            calendar_id: required("CALENDAR_ID")?,
            secondary_calendar_id: optional("SECONDARY_CALENDAR_ID"),
            sheet_name: optional("SHEET_NAME").unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()),
            spreadsheet_id: optional("SPREADSHEET_ID"),
            watchlists_file: optional("WATCHLISTS_FILE").map(PathBuf::from),
            target_count: target_count as usize,
            rate_limit_delay: Duration::from_millis(number("RATE_LIMIT_DELAY_MS", DEFAULT_RATE_LIMIT_MS)?),
            page_timeout: Duration::from_secs(number("PAGE_LOAD_TIMEOUT_SECS", DEFAULT_PAGE_TIMEOUT_SECS)?),
            csv_path: PathBuf::from(optional("CSV_PATH").unwrap_or_else(|| DEFAULT_CSV_PATH.to_string())),
            redis_url: optional("REDIS_URL"),
        })
    }

    /// Decode and validate the Google credential. Never contacts Google.
    pub fn google_credentials(&self) -> Result<GoogleCredentials, ConfigError> {
        match &self.credentials {
            CredentialSource::Base64(encoded) => {
                GoogleCredentials::from_base64(encoded).map_err(ConfigError::Credentials)
            }
            CredentialSource::File(path) => {
                if !path.exists() {
                    return Err(ConfigError::NoCredentials(path.display().to_string()));
                }
                GoogleCredentials::from_file(path).map_err(ConfigError::Credentials)
            }
        }
    }

    /// Watchlists from `WATCHLISTS_FILE`, or none.
    pub fn watchlists(&self) -> Result<WatchlistSet, ConfigError> {
        match &self.watchlists_file {
            Some(path) => Ok(WatchlistSet::load(path)?),
            None => Ok(WatchlistSet::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("SCREENER_USERNAME", "analyst@example.com"),
        ("SCREENER_PASSWORD", "hunter2"),
        ("CALENDAR_ID", "primary@group.calendar.google.com"),
    ];

    #[test]
    fn applies_defaults() {
        let config = config_from(&REQUIRED).unwrap();
        assert_eq!(config.target_count, 100);
        assert_eq!(config.rate_limit_delay, Duration::from_millis(300));
        assert_eq!(config.page_timeout, Duration::from_secs(10));
        assert_eq!(config.sheet_name, "Screener Concalls");
        assert_eq!(config.csv_path, PathBuf::from("concalls.csv"));
        assert_eq!(
            config.credentials,
            CredentialSource::File(PathBuf::from("credentials.json"))
        );
        assert!(config.secondary_calendar_id.is_none());
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn base64_credentials_take_precedence() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GOOGLE_CREDENTIALS_BASE64", "e30="));
        pairs.push(("GOOGLE_CREDENTIALS_FILE", "other.json"));
        let config = config_from(&pairs).unwrap();
        assert_eq!(config.credentials, CredentialSource::Base64("e30=".into()));
    }

    #[test]
    fn missing_required_value_is_reported_by_name() {
        let err = config_from(&REQUIRED[..2]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CALENDAR_ID")));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SECONDARY_CALENDAR_ID", "   "));
        let config = config_from(&pairs).unwrap();
        assert!(config.secondary_calendar_id.is_none());
    }

    #[test]
    fn rejects_non_numeric_and_zero_counts() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RATE_LIMIT_DELAY_MS", "fast"));
        assert!(matches!(
            config_from(&pairs),
            Err(ConfigError::Invalid { key: "RATE_LIMIT_DELAY_MS", .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("TARGET_CONCALL_COUNT", "0"));
        assert!(matches!(
            config_from(&pairs),
            Err(ConfigError::Invalid { key: "TARGET_CONCALL_COUNT", .. })
        ));
    }

    #[test]
    fn missing_credentials_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let mut pairs = REQUIRED.to_vec();
        let path_str = path.to_string_lossy().to_string();
        pairs.push(("GOOGLE_CREDENTIALS_FILE", path_str.as_str()));
        let config = config_from(&pairs).unwrap();
        assert!(matches!(
            config.google_credentials(),
            Err(ConfigError::NoCredentials(_))
        ));
    }

    #[test]
    fn reads_credentials_and_watchlists_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let creds = dir.path().join("credentials.json");
        std::fs::write(
            &creds,
            r#"{"type":"authorized_user","client_id":"id","client_secret":"s","refresh_token":"r"}"#,
        )
        .unwrap();
        let lists = dir.path().join("watchlists.json");
        std::fs::write(
            &lists,
            r#"{"mirror_watchlist":"Portfolio","watchlists":[{"name":"Portfolio","companies":["Tata Motors"],"colors":["11"],"rule":"single"}]}"#,
        )
        .unwrap();

        let creds_str = creds.to_string_lossy().to_string();
        let lists_str = lists.to_string_lossy().to_string();
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GOOGLE_CREDENTIALS_FILE", creds_str.as_str()));
        pairs.push(("WATCHLISTS_FILE", lists_str.as_str()));
        let config = config_from(&pairs).unwrap();

        assert!(matches!(
            config.google_credentials().unwrap(),
            GoogleCredentials::AuthorizedUser(user) if user.client_id == "id"
        ));
        let watchlists = config.watchlists().unwrap();
        assert_eq!(watchlists.mirror().map(|w| w.name.as_str()), Some("Portfolio"));
    }

    #[test]
    fn accepts_base64_service_account_key() {
        use base64::Engine;

        let key = serde_json::json!({
            "type": "service_account",
            "client_email": "sync@concalls.iam.gserviceaccount.com",
            "private_key": include_str!("../tests/fixtures/test_service_account.pem"),
        })
        .to_string();
        let encoded = base64::engine::general_purpose::STANDARD.encode(key);
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GOOGLE_CREDENTIALS_BASE64", encoded.as_str()));
        let config = config_from(&pairs).unwrap();

        assert!(matches!(
            config.google_credentials().unwrap(),
            GoogleCredentials::ServiceAccount(key)
                if key.client_email == "sync@concalls.iam.gserviceaccount.com"
        ));
    }

    #[test]
    fn debug_output_hides_password() {
        let config = config_from(&REQUIRED).unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
