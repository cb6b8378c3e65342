//! Google Calendar v3 and Sheets v4 over plain reqwest.
//!
//! Two credential kinds are accepted: a service-account key, exchanged for
//! access tokens with a signed JWT assertion, and an OAuth "authorized user"
//! credential (client id, secret and refresh token). Tokens are refreshed on
//! demand and kept in memory.

pub mod calendar;
pub mod sheets;

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

pub use calendar::GoogleCalendar;
pub use sheets::SheetsWriter;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Sheets, Drive (spreadsheet lookup by name) and Calendar.
pub const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/calendar",
];

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Google caps assertion lifetime at one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh this long before the reported expiry.
const EXPIRY_SLACK_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum GoogleApiError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token expired or revoked")]
    AuthExpired,
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Service-account key file as downloaded from the Cloud console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    fn signing_key(&self) -> Result<EncodingKey, GoogleApiError> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| GoogleApiError::InvalidCredentials(format!("private_key: {e}")))
    }

    /// RS256 JWT asserting this account for `SCOPES`, valid from `now` for one hour.
    pub fn assertion(&self, now: DateTime<Utc>) -> Result<String, GoogleApiError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SCOPES.join(" "),
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        encode(&header, &claims, &self.signing_key()?)
            .map_err(|e| GoogleApiError::InvalidCredentials(format!("signing: {e}")))
    }
}

/// OAuth authorized-user credential as written by `gcloud auth application-default login`.
#[derive(Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

// Keeps secrets out of logs.
impl std::fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum GoogleCredentials {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
}

impl GoogleCredentials {
    /// Dispatch on the JSON `type` field; a file without one is read as an authorized user.
    pub fn from_json(raw: &str) -> Result<Self, GoogleApiError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .map(str::to_string);
        match kind.as_deref() {
            Some("service_account") => {
                let key: ServiceAccountKey = serde_json::from_value(value).map_err(|e| {
                    GoogleApiError::InvalidCredentials(format!("missing service_account fields: {e}"))
                })?;
                key.signing_key()?;
                Ok(Self::ServiceAccount(key))
            }
            Some("authorized_user") | None => {
                let user: AuthorizedUser = serde_json::from_value(value).map_err(|e| {
                    GoogleApiError::InvalidCredentials(format!("missing authorized_user fields: {e}"))
                })?;
                if user.refresh_token.trim().is_empty() {
                    return Err(GoogleApiError::InvalidCredentials(
                        "refresh_token is empty".into(),
                    ));
                }
                Ok(Self::AuthorizedUser(user))
            }
            Some(other) => Err(GoogleApiError::InvalidCredentials(format!(
                "unsupported credential type {other:?}"
            ))),
        }
    }

    pub fn from_base64(encoded: &str) -> Result<Self, GoogleApiError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| GoogleApiError::InvalidCredentials(format!("base64: {e}")))?;
        let raw = String::from_utf8(bytes)
            .map_err(|e| GoogleApiError::InvalidCredentials(format!("utf-8: {e}")))?;
        Self::from_json(&raw)
    }

    pub fn from_file(path: &Path) -> Result<Self, GoogleApiError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Hands out bearer tokens, refreshing when the cached one is about to expire.
pub struct GoogleAuth {
    http: reqwest::Client,
    creds: GoogleCredentials,
    cached: Mutex<Option<AccessToken>>,
}

impl GoogleAuth {
    pub fn new(http: reqwest::Client, creds: GoogleCredentials) -> Self {
        Self {
            http,
            creds,
            cached: Mutex::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String, GoogleApiError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(EXPIRY_SLACK_SECS) {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.refresh().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn refresh(&self) -> Result<AccessToken, GoogleApiError> {
        debug!("Refreshing Google access token");
        let request = match &self.creds {
            GoogleCredentials::ServiceAccount(key) => self.http.post(&key.token_uri).form(&[
                ("grant_type", JWT_BEARER_GRANT.to_string()),
                ("assertion", key.assertion(Utc::now())?),
            ]),
            GoogleCredentials::AuthorizedUser(user) => self.http.post(&user.token_uri).form(&[
                ("client_id", user.client_id.as_str()),
                ("client_secret", user.client_secret.as_str()),
                ("refresh_token", user.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ]),
        };
        let resp = request.send().await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            if body.contains("invalid_grant") {
                return Err(GoogleApiError::AuthExpired);
            }
            return Err(GoogleApiError::RefreshFailed(format!("HTTP {status}: {body}")));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        Ok(AccessToken {
            token: parsed.access_token,
            expires_at: Utc::now() + Duration::seconds(parsed.expires_in.unwrap_or(3600)),
        })
    }
}

/// Map non-success responses to `GoogleApiError`.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, GoogleApiError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTHORIZED_USER: &str = r#"{
        "type": "authorized_user",
        "client_id": "abc.apps.googleusercontent.com",
        "client_secret": "shh",
        "refresh_token": "1//refresh"
    }"#;

    const TEST_KEY: &str = include_str!("../../../tests/fixtures/test_service_account.pem");

    fn service_account_json() -> String {
        serde_json::json!({
            "type": "service_account",
            "project_id": "concalls",
            "private_key_id": "key-1",
            "private_key": TEST_KEY,
            "client_email": "sync@concalls.iam.gserviceaccount.com",
            "token_uri": DEFAULT_TOKEN_URI,
        })
        .to_string()
    }

    fn authorized_user(creds: GoogleCredentials) -> AuthorizedUser {
        match creds {
            GoogleCredentials::AuthorizedUser(user) => user,
            other => panic!("expected authorized_user, got {other:?}"),
        }
    }

    #[test]
    fn parses_authorized_user_with_default_token_uri() {
        let creds = authorized_user(GoogleCredentials::from_json(AUTHORIZED_USER).unwrap());
        assert_eq!(creds.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(creds.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn decodes_base64_credentials() {
        let encoded = STANDARD.encode(AUTHORIZED_USER);
        let creds = authorized_user(GoogleCredentials::from_base64(&encoded).unwrap());
        assert_eq!(creds.refresh_token, "1//refresh");
    }

    #[test]
    fn parses_service_account_key() {
        let encoded = STANDARD.encode(service_account_json());
        match GoogleCredentials::from_base64(&encoded).unwrap() {
            GoogleCredentials::ServiceAccount(key) => {
                assert_eq!(key.client_email, "sync@concalls.iam.gserviceaccount.com");
                assert_eq!(key.private_key_id.as_deref(), Some("key-1"));
            }
            other => panic!("expected service_account, got {other:?}"),
        }
    }

    #[test]
    fn service_account_assertion_carries_scopes_and_audience() {
        let GoogleCredentials::ServiceAccount(key) =
            GoogleCredentials::from_json(&service_account_json()).unwrap()
        else {
            panic!("expected service_account");
        };
        let now = Utc::now();
        let jwt = key.assertion(now).unwrap();

        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        let decode = |segment: &str| -> serde_json::Value {
            let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(segment)
                .unwrap();
            serde_json::from_slice(&bytes).unwrap()
        };
        let header = decode(parts[0]);
        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["kid"], "key-1");

        let claims = decode(parts[1]);
        assert_eq!(claims["iss"], "sync@concalls.iam.gserviceaccount.com");
        assert_eq!(claims["aud"], DEFAULT_TOKEN_URI);
        assert_eq!(claims["scope"], SCOPES.join(" "));
        assert_eq!(claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(), 3600);
    }

    #[test]
    fn rejects_service_account_with_bad_private_key() {
        let raw = r#"{ "type": "service_account", "client_email": "a@b", "private_key": "not a key" }"#;
        assert!(matches!(
            GoogleCredentials::from_json(raw),
            Err(GoogleApiError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn rejects_unknown_credential_type() {
        let raw = r#"{ "type": "external_account" }"#;
        assert!(matches!(
            GoogleCredentials::from_json(raw),
            Err(GoogleApiError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let shown = format!("{:?}", GoogleCredentials::from_json(AUTHORIZED_USER).unwrap());
        assert!(!shown.contains("shh"));
        assert!(!shown.contains("1//refresh"));

        let shown = format!("{:?}", GoogleCredentials::from_json(&service_account_json()).unwrap());
        assert!(!shown.contains("PRIVATE KEY"));
    }
}
