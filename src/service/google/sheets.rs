//! Google Sheets v4 sink: one worksheet rewritten in full on every run.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use url::Url;

use super::{check_status, GoogleApiError, GoogleAuth};
use crate::models::Concall;
use crate::service::export;
use crate::service::http::{send_with_retry, RetryPolicy};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Pixel widths for Company, Date, Time, Phone, PDF Link.
pub const COLUMN_WIDTHS: [u32; 5] = [150, 130, 110, 280, 450];
const HEADER_GREY: f32 = 0.9;

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Spreadsheet {
    spreadsheet_id: String,
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

pub fn spreadsheet_url(id: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{id}")
}

/// `spreadsheets/{id}/{tail...}`; the last segment may carry a `:verb` suffix.
fn sheets_url(id_and_verb: &str, tail: &[&str]) -> Result<Url, GoogleApiError> {
    let mut url = Url::parse(SHEETS_API)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
        segments.push(id_and_verb);
        segments.extend(tail);
    }
    Ok(url)
}

fn drive_name_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name = '{escaped}' and mimeType = '{SPREADSHEET_MIME}' and trashed = false")
}

/// Header styling, column widths and the frozen first row.
fn format_requests(sheet_id: i64) -> Value {
    let mut requests = vec![json!({
        "repeatCell": {
            "range": {
                "sheetId": sheet_id,
                "startRowIndex": 0,
                "endRowIndex": 1,
                "startColumnIndex": 0,
                "endColumnIndex": export::HEADERS.len(),
            },
            "cell": {
                "userEnteredFormat": {
                    "textFormat": { "bold": true },
                    "backgroundColor": { "red": HEADER_GREY, "green": HEADER_GREY, "blue": HEADER_GREY },
                }
            },
            "fields": "userEnteredFormat(textFormat,backgroundColor)",
        }
    })];

    requests.extend(COLUMN_WIDTHS.iter().enumerate().map(|(i, width)| {
        json!({
            "updateDimensionProperties": {
                "range": {
                    "sheetId": sheet_id,
                    "dimension": "COLUMNS",
                    "startIndex": i,
                    "endIndex": i + 1,
                },
                "properties": { "pixelSize": width },
                "fields": "pixelSize",
            }
        })
    }));

    requests.push(json!({
        "updateSheetProperties": {
            "properties": {
                "sheetId": sheet_id,
                "gridProperties": { "frozenRowCount": 1 },
            },
            "fields": "gridProperties.frozenRowCount",
        }
    }));

    json!({ "requests": requests })
}

pub struct SheetsWriter {
    http: reqwest::Client,
    auth: Arc<GoogleAuth>,
    policy: RetryPolicy,
    name: String,
    spreadsheet_id: Option<String>,
}

impl SheetsWriter {
    pub fn new(
        http: reqwest::Client,
        auth: Arc<GoogleAuth>,
        name: impl Into<String>,
        spreadsheet_id: Option<String>,
    ) -> Self {
        Self {
            http,
            auth,
            policy: RetryPolicy::default(),
            name: name.into(),
            spreadsheet_id,
        }
    }

    /// Replace the first worksheet with the header plus one row per concall.
    /// Returns the spreadsheet URL.
    pub async fn write(&self, concalls: &[Concall]) -> Result<String, GoogleApiError> {
        let id = self.resolve_spreadsheet().await?;
        let sheet = self.first_sheet(&id).await?;

        let clear_range = format!("{}:clear", sheet.title);
        self.post_json(sheets_url(&id, &["values", clear_range.as_str()])?, &json!({}))
            .await?;

        info!("Writing {} rows...", concalls.len());
        let write_range = format!("{}!A1", sheet.title);
        let token = self.auth.access_token().await?;
        let request = self
            .http
            .put(sheets_url(&id, &["values", write_range.as_str()])?)
            .bearer_auth(token)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({
                "majorDimension": "ROWS",
                "values": export::table(concalls),
            }));
        check_status(send_with_retry(request, &self.policy).await?).await?;

        self.post_json(sheets_url(&format!("{id}:batchUpdate"), &[])?, &format_requests(sheet.sheet_id))
            .await?;

        let url = spreadsheet_url(&id);
        info!("Sheet URL: {}", url);
        Ok(url)
    }

    async fn resolve_spreadsheet(&self) -> Result<String, GoogleApiError> {
        if let Some(id) = &self.spreadsheet_id {
            return Ok(id.clone());
        }
        if let Some(id) = self.find_by_name().await? {
            info!("Opened existing sheet: {}", self.name);
            return Ok(id);
        }
        let created: Spreadsheet = self
            .post_json(
                Url::parse(SHEETS_API)?,
                &json!({ "properties": { "title": self.name } }),
            )
            .await?
            .json()
            .await?;
        info!("Created new sheet: {}", self.name);
        Ok(created.spreadsheet_id)
    }

    async fn find_by_name(&self) -> Result<Option<String>, GoogleApiError> {
        let token = self.auth.access_token().await?;
        let request = self
            .http
            .get(DRIVE_FILES_API)
            .bearer_auth(token)
            .query(&[
                ("q", drive_name_query(&self.name).as_str()),
                ("fields", "files(id)"),
                ("pageSize", "1"),
            ]);
        let list: DriveFileList = check_status(send_with_retry(request, &self.policy).await?)
            .await?
            .json()
            .await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn first_sheet(&self, id: &str) -> Result<SheetProperties, GoogleApiError> {
        let token = self.auth.access_token().await?;
        let request = self
            .http
            .get(sheets_url(id, &[])?)
            .bearer_auth(token)
            .query(&[("fields", "spreadsheetId,sheets.properties(sheetId,title)")]);
        let spreadsheet: Spreadsheet = check_status(send_with_retry(request, &self.policy).await?)
            .await?
            .json()
            .await?;
        spreadsheet
            .sheets
            .into_iter()
            .next()
            .map(|s| s.properties)
            .ok_or_else(|| GoogleApiError::ApiError {
                status: 404,
                message: format!("spreadsheet {id} has no worksheets"),
            })
    }

    async fn post_json(&self, url: Url, body: &Value) -> Result<reqwest::Response, GoogleApiError> {
        let token = self.auth.access_token().await?;
        let request = self.http.post(url).bearer_auth(token).json(body);
        check_status(send_with_retry(request, &self.policy).await?).await
    }
}
