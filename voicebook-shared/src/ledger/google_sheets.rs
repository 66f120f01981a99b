/// Google Sheets implementation of [`SpreadsheetProvider`]
///
/// Worksheets are partitions. Reads cover columns `A:F`; appends use
/// `INSERT_ROWS` so existing rows are never overwritten. Ledger discovery
/// goes through the Drive files listing.

use super::sheets::{ledger_url, CreatedLedger, LedgerRef, LedgerSummary, SpreadsheetProvider};
use crate::provider::{check_status, ProviderError};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

const SHEETS_ENDPOINT: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";
const SPREADSHEET_QUERY: &str = "mimeType='application/vnd.google-apps.spreadsheet' and trashed=false";
const PARTITION_ROWS: u32 = 1000;
const PARTITION_COLUMNS: u32 = 10;
const DRIVE_PAGE_SIZE: &str = "100";

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSpreadsheet {
    spreadsheet_id: String,
    spreadsheet_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    modified_time: Option<String>,
    web_view_link: Option<String>,
}

/// Worksheet range covering the ledger columns
fn partition_range(partition: &str) -> String {
    format!("'{}'!A:F", partition.replace('\'', "''"))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Sheets reports a missing worksheet as a 400 on range parsing
fn missing_partition(err: ProviderError, partition: &str) -> ProviderError {
    match err {
        ProviderError::Status { status: 404, .. } => ProviderError::NotFound(partition.to_string()),
        ProviderError::Status { status: 400, ref body } if body.contains("Unable to parse range") => {
            ProviderError::NotFound(partition.to_string())
        }
        other => other,
    }
}

/// Google Sheets and Drive client
#[derive(Debug, Clone)]
pub struct GoogleSheetsClient {
    http: reqwest::Client,
}

impl GoogleSheetsClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// `{SHEETS_ENDPOINT}/{id}/...` with each segment percent-encoded
    fn sheets_url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(SHEETS_ENDPOINT).map_err(|e| ProviderError::Http(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Http("Sheets endpoint cannot be a base".to_string()))?
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl SpreadsheetProvider for GoogleSheetsClient {
    async fn list_partitions(&self, ledger: &LedgerRef) -> Result<Vec<String>, ProviderError> {
        let url = self.sheets_url(&[&ledger.ledger_id])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&ledger.access_token)
            .query(&[("fields", "sheets.properties.title")])
            .send()
            .await?;

        let meta: SpreadsheetMeta = check_status(response).await?.json().await?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|sheet| sheet.properties.title)
            .collect())
    }

    async fn create_partition(&self, ledger: &LedgerRef, name: &str) -> Result<(), ProviderError> {
        let url = self.sheets_url(&[&format!("{}:batchUpdate", ledger.ledger_id)])?;
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": name,
                        "gridProperties": {
                            "rowCount": PARTITION_ROWS,
                            "columnCount": PARTITION_COLUMNS,
                        }
                    }
                }
            }]
        });

        let response = self
            .http
            .post(url)
            .bearer_auth(&ledger.access_token)
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;

        debug!(ledger_id = %ledger.ledger_id, partition = %name, "Worksheet added");
        Ok(())
    }

    async fn read_range(
        &self,
        ledger: &LedgerRef,
        partition: &str,
    ) -> Result<Vec<Vec<String>>, ProviderError> {
        let range = partition_range(partition);
        let url = self.sheets_url(&[&ledger.ledger_id, "values", &range])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&ledger.access_token)
            .send()
            .await?;

        let response = check_status(response)
            .await
            .map_err(|e| missing_partition(e, partition))?;
        let body: ValueRange = response.json().await?;

        Ok(body
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn append_row(
        &self,
        ledger: &LedgerRef,
        partition: &str,
        row: &[String],
    ) -> Result<(), ProviderError> {
        let range = partition_range(partition);
        let url = self.sheets_url(&[
            &ledger.ledger_id,
            "values",
            &format!("{}:append", range),
        ])?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&ledger.access_token)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({ "values": [row] }))
            .send()
            .await
            .inspect_err(|e| warn!(partition = %partition, error = %e, "Append request failed"))?;

        check_status(response)
            .await
            .map_err(|e| missing_partition(e, partition))?;
        Ok(())
    }

    async fn create_ledger(
        &self,
        access_token: &str,
        title: &str,
    ) -> Result<CreatedLedger, ProviderError> {
        let response = self
            .http
            .post(SHEETS_ENDPOINT)
            .bearer_auth(access_token)
            .json(&json!({ "properties": { "title": title } }))
            .send()
            .await?;

        let created: CreatedSpreadsheet = check_status(response).await?.json().await?;
        let url = created
            .spreadsheet_url
            .unwrap_or_else(|| ledger_url(&created.spreadsheet_id));

        Ok(CreatedLedger {
            id: created.spreadsheet_id,
            url,
            name: title.to_string(),
        })
    }

    async fn list_ledgers(&self, access_token: &str) -> Result<Vec<LedgerSummary>, ProviderError> {
        let mut ledgers = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("q", SPREADSHEET_QUERY),
                ("orderBy", "modifiedTime desc"),
                ("fields", "nextPageToken,files(id,name,modifiedTime,webViewLink)"),
                ("pageSize", DRIVE_PAGE_SIZE),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self
                .http
                .get(DRIVE_FILES_ENDPOINT)
                .bearer_auth(access_token)
                .query(&query)
                .send()
                .await?;
            let page: DriveFileList = check_status(response).await?.json().await?;

            ledgers.extend(page.files.into_iter().map(|file| LedgerSummary {
                url: file.web_view_link.unwrap_or_else(|| ledger_url(&file.id)),
                id: file.id,
                name: file.name,
                modified_time: file.modified_time,
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(ledgers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_range_quotes_name() {
        assert_eq!(partition_range("2024-01"), "'2024-01'!A:F");
        assert_eq!(partition_range("it's"), "'it''s'!A:F");
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&json!("飲食")), "飲食");
        assert_eq!(cell_text(&json!(120)), "120");
        assert_eq!(cell_text(&Value::Null), "");
    }

    #[test]
    fn test_missing_partition_mapping() {
        let err = missing_partition(
            ProviderError::Status {
                status: 400,
                body: "Unable to parse range: '2024-01'!A:F".to_string(),
            },
            "2024-01",
        );
        assert!(err.is_not_found());

        let err = missing_partition(
            ProviderError::Status {
                status: 403,
                body: "forbidden".to_string(),
            },
            "2024-01",
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_sheets_url_encodes_range() {
        let client = GoogleSheetsClient::new(reqwest::Client::new());
        let url = client
            .sheets_url(&["abc", "values", "'2024-01'!A:F"])
            .unwrap();
        assert!(url.as_str().starts_with("https://sheets.googleapis.com/v4/spreadsheets/abc/values/"));
        assert!(!url.as_str().contains(' '));
    }
}
