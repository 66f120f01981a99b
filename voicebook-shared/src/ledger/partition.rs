/// Ledger partitions
///
/// A partition key is a calendar month rendered as `YYYY-MM`; the partition
/// with that name holds every entry whose timestamp starts with the key.
///
/// [`PartitionResolver::ensure_partition`] creates partitions lazily. Listing
/// and creation are not transactional against concurrent creators; the
/// ledger has a single writer per user, and an empty partition left behind by
/// a cancelled request is harmless.

use super::entry::HEADER;
use super::sheets::{LedgerRef, SpreadsheetProvider};
use super::LedgerError;
use chrono::{Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Calendar month identifying a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionKey {
    year: i32,
    month: u32,
}

impl PartitionKey {
    /// Builds a key; None unless `month` is 1..=12
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The current month in `tz`
    pub fn current(tz: Tz) -> Self {
        Self::from_date(Utc::now().with_timezone(&tz).date_naive())
    }

    pub fn previous(&self) -> Self {
        match self.month {
            1 => Self { year: self.year - 1, month: 12 },
            month => Self { year: self.year, month: month - 1 },
        }
    }

    pub fn next(&self) -> Self {
        match self.month {
            12 => Self { year: self.year + 1, month: 1 },
            month => Self { year: self.year, month: month + 1 },
        }
    }

    /// The `count` months ending with this one, oldest first
    pub fn trailing(&self, count: usize) -> Vec<Self> {
        let mut months = Vec::with_capacity(count);
        let mut key = *self;
        for _ in 0..count {
            months.push(key);
            key = key.previous();
        }
        months.reverse();
        months
    }

    /// Every month overlapping `[start, end]`, oldest first
    pub fn spanning(start: NaiveDate, end: NaiveDate) -> Vec<Self> {
        let last = Self::from_date(end);
        let mut key = Self::from_date(start);
        let mut months = Vec::new();
        while key <= last {
            months.push(key);
            key = key.next();
        }
        months
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PartitionKey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_partition_key(s)
            .ok_or_else(|| LedgerError::Validation(format!("invalid month '{}', expected YYYY-MM", s)))
    }
}

impl TryFrom<String> for PartitionKey {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PartitionKey> for String {
    fn from(key: PartitionKey) -> Self {
        key.to_string()
    }
}

/// Parses the `YYYY-MM` prefix of a string
///
/// Returns None unless the first seven characters are four digits, a dash
/// and a two-digit month in 01..=12.
pub fn parse_partition_key(value: &str) -> Option<PartitionKey> {
    let prefix = value.trim().as_bytes().get(..7)?;
    let digits_ok = prefix[..4].iter().all(u8::is_ascii_digit)
        && prefix[4] == b'-'
        && prefix[5..].iter().all(u8::is_ascii_digit);
    if !digits_ok {
        return None;
    }

    let text = std::str::from_utf8(prefix).ok()?;
    let year = text[..4].parse().ok()?;
    let month = text[5..].parse().ok()?;
    PartitionKey::new(year, month)
}

/// Partition for an entry timestamp
///
/// Malformed timestamps fall back to the current month in `fallback_tz`.
pub fn partition_key_for(timestamp: &str, fallback_tz: Tz) -> PartitionKey {
    match parse_partition_key(timestamp) {
        Some(key) => key,
        None => {
            let key = PartitionKey::current(fallback_tz);
            warn!(
                timestamp = %timestamp,
                partition = %key,
                "Malformed entry timestamp, using current month"
            );
            key
        }
    }
}

/// Resolves partition keys to existing partitions, creating them on demand
#[derive(Clone)]
pub struct PartitionResolver {
    provider: Arc<dyn SpreadsheetProvider>,
}

impl PartitionResolver {
    pub fn new(provider: Arc<dyn SpreadsheetProvider>) -> Self {
        Self { provider }
    }

    /// Makes sure the partition for `key` exists and returns its name
    ///
    /// A new partition gets the header row as its first row. An existing
    /// partition left empty by an interrupted creation gets its header
    /// written before anything else lands in it.
    pub async fn ensure_partition(
        &self,
        ledger: &LedgerRef,
        key: PartitionKey,
    ) -> Result<String, LedgerError> {
        let name = key.to_string();
        let read_failed = |source| LedgerError::LedgerReadFailed {
            partition: name.clone(),
            source,
        };

        let existing = self
            .provider
            .list_partitions(ledger)
            .await
            .map_err(read_failed)?;

        if existing.iter().any(|partition| partition == &name) {
            let rows = self
                .provider
                .read_range(ledger, &name)
                .await
                .map_err(read_failed)?;
            if !rows.is_empty() {
                debug!(partition = %name, "Partition exists");
                return Ok(name);
            }

            warn!(
                ledger_id = %ledger.ledger_id,
                partition = %name,
                "Partition has no header, writing it"
            );
            self.write_header(ledger, &name).await?;
            return Ok(name);
        }

        self.provider
            .create_partition(ledger, &name)
            .await
            .map_err(|source| LedgerError::PartitionCreateFailed {
                partition: name.clone(),
                source,
            })?;
        self.write_header(ledger, &name).await?;

        info!(ledger_id = %ledger.ledger_id, partition = %name, "Created partition");
        Ok(name)
    }

    async fn write_header(&self, ledger: &LedgerRef, name: &str) -> Result<(), LedgerError> {
        let header: Vec<String> = HEADER.iter().map(|h| h.to_string()).collect();
        self.provider
            .append_row(ledger, name, &header)
            .await
            .map_err(|source| LedgerError::PartitionCreateFailed {
                partition: name.to_string(),
                source,
            })
    }
}
