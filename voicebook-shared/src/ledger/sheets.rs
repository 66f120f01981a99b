/// Spreadsheet provider contract
///
/// The ledger treats a spreadsheet as the database and each worksheet as a
/// partition. Every call takes the caller's delegated access token; the
/// provider holds no per-user state.

use crate::provider::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Base URL of a spreadsheet, followed by its id
pub const SPREADSHEET_URL_PREFIX: &str = "https://docs.google.com/spreadsheets/d/";

/// Ledger address plus the credential used to reach it
#[derive(Debug, Clone)]
pub struct LedgerRef {
    pub ledger_id: String,
    pub access_token: String,
}

impl LedgerRef {
    pub fn new(ledger_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            ledger_id: ledger_id.into(),
            access_token: access_token.into(),
        }
    }
}

/// A spreadsheet the user can pick as their ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub id: String,
    pub name: String,
    pub modified_time: Option<String>,
    pub url: String,
}

/// A newly created ledger spreadsheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedLedger {
    pub id: String,
    pub url: String,
    pub name: String,
}

/// Canonical URL of a spreadsheet
pub fn ledger_url(ledger_id: &str) -> String {
    format!("{}{}", SPREADSHEET_URL_PREFIX, ledger_id)
}

/// Extracts the spreadsheet id from a share URL (`.../d/{id}/...`)
pub fn extract_ledger_id(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("/d/")?;
    let id = rest.split(['/', '?', '#']).next()?;
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}

/// Remote spreadsheet service
#[async_trait]
pub trait SpreadsheetProvider: Send + Sync {
    /// Names of all worksheets in the spreadsheet
    async fn list_partitions(&self, ledger: &LedgerRef) -> Result<Vec<String>, ProviderError>;

    /// Adds an empty worksheet
    async fn create_partition(&self, ledger: &LedgerRef, name: &str) -> Result<(), ProviderError>;

    /// All rows of a worksheet, header included
    ///
    /// Reports [`ProviderError::NotFound`] when the worksheet does not exist.
    async fn read_range(
        &self,
        ledger: &LedgerRef,
        partition: &str,
    ) -> Result<Vec<Vec<String>>, ProviderError>;

    /// Inserts a row after the last row, never overwriting existing data
    async fn append_row(
        &self,
        ledger: &LedgerRef,
        partition: &str,
        row: &[String],
    ) -> Result<(), ProviderError>;

    /// Creates a new spreadsheet owned by the token's user
    async fn create_ledger(
        &self,
        access_token: &str,
        title: &str,
    ) -> Result<CreatedLedger, ProviderError>;

    /// Spreadsheets visible to the token's user, most recently modified first
    async fn list_ledgers(&self, access_token: &str) -> Result<Vec<LedgerSummary>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_ledger_id() {
        assert_eq!(
            extract_ledger_id("https://docs.google.com/spreadsheets/d/1AbC-x_9/edit#gid=0"),
            Some("1AbC-x_9")
        );
        assert_eq!(
            extract_ledger_id("https://docs.google.com/spreadsheets/d/1AbC?usp=sharing"),
            Some("1AbC")
        );
        assert_eq!(extract_ledger_id("https://example.com/sheet"), None);
        assert_eq!(extract_ledger_id("https://docs.google.com/spreadsheets/d//edit"), None);
    }

    #[test]
    fn test_ledger_url() {
        assert_eq!(ledger_url("abc"), "https://docs.google.com/spreadsheets/d/abc");
    }
}
