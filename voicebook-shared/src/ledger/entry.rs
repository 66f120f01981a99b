/// Ledger entries and rows
///
/// A [`LedgerEntry`] is what gets written; a [`LedgerRecord`] is what comes
/// back from a partition read: a header-keyed map with every header present.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical partition header, in column order
pub const HEADER: [&str; 6] = ["time", "name", "category", "amount", "currency", "payment_method"];

/// Localized header written by earlier versions, in column order
pub const LEGACY_HEADER: [&str; 6] = ["時間", "名稱", "類別", "花費", "幣別", "支付方式"];

/// Fixed category set
pub const CATEGORIES: [&str; 8] = ["飲食", "交通", "娛樂", "購物", "居住", "醫療", "教育", "其他"];

/// Category used when a row carries none
pub const FALLBACK_CATEGORY: &str = "其他";

/// Currency used when an entry carries none
pub const DEFAULT_CURRENCY: &str = "TWD";

/// Timestamp layout of the `time` column
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Maps a header cell to its canonical name
///
/// Localized headers are translated; anything else is trimmed and kept.
pub fn canonical_header(cell: &str) -> String {
    let cell = cell.trim();
    LEGACY_HEADER
        .iter()
        .position(|legacy| *legacy == cell)
        .map(|idx| HEADER[idx].to_string())
        .unwrap_or_else(|| cell.to_string())
}

/// Returns true when `category` is one of [`CATEGORIES`]
pub fn is_known_category(category: &str) -> bool {
    CATEGORIES.contains(&category)
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// One expense to append to the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// `YYYY-MM-DD HH:MM`
    #[serde(alias = "時間")]
    pub time: String,

    #[serde(alias = "名稱")]
    pub name: String,

    /// One of [`CATEGORIES`]; free text is tolerated
    #[serde(alias = "類別")]
    pub category: String,

    /// Non-negative amount
    #[serde(alias = "花費")]
    pub amount: f64,

    #[serde(alias = "幣別", default = "default_currency")]
    pub currency: String,

    #[serde(alias = "支付方式", default)]
    pub payment_method: Option<String>,
}

impl LedgerEntry {
    /// Checks the entry can be written
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err("amount must be a non-negative number".to_string());
        }
        if self.currency.trim().is_empty() {
            return Err("currency must not be empty".to_string());
        }
        Ok(())
    }

    /// Cells in [`HEADER`] order
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.time.clone(),
            self.name.clone(),
            self.category.clone(),
            format_amount(self.amount),
            self.currency.clone(),
            self.payment_method.clone().unwrap_or_default(),
        ]
    }
}

/// Formats an amount without a trailing `.0` for whole numbers
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 && amount.abs() < 1e15 {
        format!("{}", amount as i64)
    } else {
        amount.to_string()
    }
}

/// One row read back from a partition, keyed by canonical header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerRecord(pub BTreeMap<String, String>);

impl LedgerRecord {
    /// Zips headers with cells, padding missing trailing cells with ""
    pub fn from_cells(headers: &[String], cells: &[String]) -> Self {
        let fields = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| (header.clone(), cells.get(idx).cloned().unwrap_or_default()))
            .collect();
        Self(fields)
    }

    pub fn get(&self, field: &str) -> &str {
        self.0.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn time(&self) -> &str {
        self.get("time")
    }

    pub fn name(&self) -> &str {
        self.get("name")
    }

    /// Category, or [`FALLBACK_CATEGORY`] when blank
    pub fn category(&self) -> &str {
        match self.get("category").trim() {
            "" => FALLBACK_CATEGORY,
            category => category,
        }
    }

    /// Parsed amount; None when blank or unparsable
    pub fn amount(&self) -> Option<f64> {
        self.get("amount")
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .ok()
            .filter(|amount| amount.is_finite())
    }

    /// The `YYYY-MM-DD` prefix of the timestamp, if present
    pub fn date_str(&self) -> Option<&str> {
        let time = self.time().trim();
        time.get(..10).filter(|date| date.len() == 10)
    }

    /// Parsed timestamp; accepts minutes or seconds precision
    pub fn timestamp(&self) -> Option<chrono::NaiveDateTime> {
        let time = self.time().trim();
        chrono::NaiveDateTime::parse_from_str(time, TIME_FORMAT)
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(time, "%Y-%m-%d %H:%M:%S"))
            .ok()
    }
}
