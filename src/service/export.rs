//! Tabular snapshot of a run: shared by the CSV audit file and the sheet sink.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::models::Concall;

pub const HEADERS: [&str; 5] = ["Company Name", "Date", "Time", "Phone Number", "PDF Link"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn row(concall: &Concall) -> Vec<String> {
    vec![
        concall.company.clone(),
        concall.date.clone(),
        concall.time.clone(),
        concall.phone_display().to_string(),
        concall.document_url.clone(),
    ]
}

/// Header row followed by one row per concall, in input order.
pub fn table(concalls: &[Concall]) -> Vec<Vec<String>> {
    std::iter::once(HEADERS.iter().map(|h| h.to_string()).collect())
        .chain(concalls.iter().map(row))
        .collect()
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn to_csv(concalls: &[Concall]) -> String {
    let mut out = String::new();
    for record in table(concalls) {
        let line: Vec<String> = record.iter().map(|f| escape_field(f)).collect();
        out.push_str(&line.join(","));
        out.push_str("\r\n");
    }
    out
}

pub async fn write_csv(path: &Path, concalls: &[Concall]) -> Result<(), ExportError> {
    tokio::fs::write(path, to_csv(concalls))
        .await
        .map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    info!("Saved {} concalls to {}", concalls.len(), path.display());
    Ok(())
}
