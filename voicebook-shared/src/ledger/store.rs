/// Ledger store
///
/// Write, read and aggregate operations over month partitions.
///
/// # Failure policy
///
/// - `append` and `read_partition` propagate provider failures, wrapped with
///   a stable error code. There is no local retry.
/// - Multi-partition scans (`records_in_range`, `recent_records`,
///   `daily_trend`) log and skip partitions that fail to read.
/// - `monthly_stats` treats a missing partition as an empty month.
/// - `multi_month_stats` fails with the first failing month.

use super::entry::{LedgerEntry, LedgerRecord, HEADER};
use super::partition::{partition_key_for, PartitionKey, PartitionResolver};
use super::sheets::{CreatedLedger, LedgerRef, LedgerSummary, SpreadsheetProvider};
use super::stats::{DailyTotal, MonthlyStats};
use super::LedgerError;
use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use futures::future::try_join_all;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest date range a single query may cover, in days
pub const MAX_RANGE_DAYS: i64 = 366;

/// Partition reads in flight at once during a scan
const SCAN_CONCURRENCY: usize = 4;

/// Ledger store configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Timezone used to bucket entries whose timestamp cannot be parsed
    pub fallback_timezone: Tz,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fallback_timezone: chrono_tz::Asia::Taipei,
        }
    }
}

/// Partitioned ledger over a spreadsheet provider
#[derive(Clone)]
pub struct LedgerStore {
    provider: Arc<dyn SpreadsheetProvider>,
    resolver: PartitionResolver,
    config: LedgerConfig,
}

impl LedgerStore {
    pub fn new(provider: Arc<dyn SpreadsheetProvider>, config: LedgerConfig) -> Self {
        Self {
            resolver: PartitionResolver::new(provider.clone()),
            provider,
            config,
        }
    }

    pub fn resolver(&self) -> &PartitionResolver {
        &self.resolver
    }

    /// Partition an entry with this timestamp belongs to
    pub fn partition_key_for(&self, timestamp: &str) -> PartitionKey {
        partition_key_for(timestamp, self.config.fallback_timezone)
    }

    /// Appends an entry to the partition of its month
    ///
    /// Creates the partition first if needed. Returns the partition written.
    pub async fn append(
        &self,
        ledger: &LedgerRef,
        entry: &LedgerEntry,
    ) -> Result<PartitionKey, LedgerError> {
        entry.validate().map_err(LedgerError::Validation)?;

        let key = self.partition_key_for(&entry.time);
        let partition = self.resolver.ensure_partition(ledger, key).await?;

        self.provider
            .append_row(ledger, &partition, &entry.to_row())
            .await
            .map_err(|source| LedgerError::LedgerWriteFailed {
                partition: partition.clone(),
                source,
            })?;

        info!(
            ledger_id = %ledger.ledger_id,
            partition = %partition,
            category = %entry.category,
            "Ledger entry appended"
        );
        Ok(key)
    }

    /// Reads every data row of one partition
    ///
    /// The first row is the header. Partitions with no data rows yield an
    /// empty list.
    pub async fn read_partition(
        &self,
        ledger: &LedgerRef,
        key: PartitionKey,
    ) -> Result<Vec<LedgerRecord>, LedgerError> {
        let partition = key.to_string();
        let rows = self
            .provider
            .read_range(ledger, &partition)
            .await
            .map_err(|source| LedgerError::LedgerReadFailed {
                partition: partition.clone(),
                source,
            })?;

        Ok(records_from_rows(&rows))
    }

    /// Reads several partitions concurrently, skipping any that fail
    pub async fn scan_partitions(
        &self,
        ledger: &LedgerRef,
        keys: &[PartitionKey],
    ) -> Vec<LedgerRecord> {
        let results: Vec<_> = stream::iter(keys.iter().copied().map(|key| self.read_partition(ledger, key)))
            .buffered(SCAN_CONCURRENCY)
            .collect()
            .await;

        let mut records = Vec::new();
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(rows) => records.extend(rows),
                Err(LedgerError::LedgerReadFailed { source, .. }) if source.is_not_found() => {
                    debug!(partition = %key, "Partition does not exist, skipping");
                }
                Err(e) => {
                    warn!(partition = %key, error = %e, "Partition read failed, skipping");
                }
            }
        }
        records
    }

    /// Totals for one month; a month without a partition is all zeros
    pub async fn monthly_stats(
        &self,
        ledger: &LedgerRef,
        month: PartitionKey,
    ) -> Result<MonthlyStats, LedgerError> {
        match self.read_partition(ledger, month).await {
            Ok(records) => Ok(MonthlyStats::from_records(month, &records)),
            Err(LedgerError::LedgerReadFailed { source, .. }) if source.is_not_found() => {
                debug!(partition = %month, "No partition for month");
                Ok(MonthlyStats::empty(month))
            }
            Err(e) => Err(e),
        }
    }

    /// Totals for several months, in the order given
    ///
    /// Months are read concurrently; the first failure fails the whole call.
    pub async fn multi_month_stats(
        &self,
        ledger: &LedgerRef,
        months: &[PartitionKey],
    ) -> Result<Vec<MonthlyStats>, LedgerError> {
        try_join_all(months.iter().map(|month| self.monthly_stats(ledger, *month))).await
    }

    /// Rows dated within `[start, end]` inclusive, oldest first
    ///
    /// Only partitions overlapping the range are read. Ranges longer than
    /// [`MAX_RANGE_DAYS`] are rejected.
    pub async fn records_in_range(
        &self,
        ledger: &LedgerRef,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LedgerRecord>, LedgerError> {
        if start > end {
            return Err(LedgerError::Validation(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }
        if (end - start).num_days() >= MAX_RANGE_DAYS {
            return Err(LedgerError::Validation(format!(
                "date range {} to {} exceeds {} days",
                start, end, MAX_RANGE_DAYS
            )));
        }

        let keys = PartitionKey::spanning(start, end);
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();

        let mut records: Vec<LedgerRecord> = self
            .scan_partitions(ledger, &keys)
            .await
            .into_iter()
            .filter(|record| {
                record
                    .date_str()
                    .map_or(false, |date| date >= start.as_str() && date <= end.as_str())
            })
            .collect();

        records.sort_by(|a, b| a.time().cmp(b.time()));
        Ok(records)
    }

    /// The `limit` most recent rows from this month and last month in `tz`
    pub async fn recent_records(
        &self,
        ledger: &LedgerRef,
        limit: usize,
        tz: Tz,
    ) -> Result<Vec<LedgerRecord>, LedgerError> {
        self.recent_records_as_of(ledger, limit, PartitionKey::current(tz))
            .await
    }

    /// The `limit` most recent rows from `month` and the month before it
    ///
    /// Rows sort newest first; rows with unparsable timestamps sort last.
    pub async fn recent_records_as_of(
        &self,
        ledger: &LedgerRef,
        limit: usize,
        month: PartitionKey,
    ) -> Result<Vec<LedgerRecord>, LedgerError> {
        let keys = [month.previous(), month];
        let mut records = self.scan_partitions(ledger, &keys).await;

        // None sorts before Some, so reversing puts unparsable rows last
        records.sort_by_key(|record| std::cmp::Reverse(record.timestamp()));
        records.truncate(limit);
        Ok(records)
    }

    /// Daily totals for the `days` days ending today in `tz`
    pub async fn daily_trend(
        &self,
        ledger: &LedgerRef,
        days: usize,
        tz: Tz,
    ) -> Result<Vec<DailyTotal>, LedgerError> {
        let today = Utc::now().with_timezone(&tz).date_naive();
        self.daily_trend_ending(ledger, days, today).await
    }

    /// Daily totals for the `days` days ending on `end`
    ///
    /// Always returns exactly `days` entries in ascending date order, with
    /// zero for days without spending.
    pub async fn daily_trend_ending(
        &self,
        ledger: &LedgerRef,
        days: usize,
        end: NaiveDate,
    ) -> Result<Vec<DailyTotal>, LedgerError> {
        if days == 0 {
            return Ok(Vec::new());
        }

        let start = i64::try_from(days - 1)
            .ok()
            .filter(|span| *span < MAX_RANGE_DAYS)
            .and_then(|span| end.checked_sub_signed(Duration::days(span)))
            .ok_or_else(|| {
                LedgerError::Validation(format!(
                    "trend of {} days exceeds {} days",
                    days, MAX_RANGE_DAYS
                ))
            })?;
        let records = self.records_in_range(ledger, start, end).await?;

        let mut totals: BTreeMap<NaiveDate, f64> = start
            .iter_days()
            .take(days)
            .map(|date| (date, 0.0))
            .collect();

        for record in &records {
            let date = record
                .date_str()
                .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok());
            if let (Some(date), Some(amount)) = (date, record.amount()) {
                if let Some(total) = totals.get_mut(&date) {
                    *total += amount;
                }
            }
        }

        Ok(totals
            .into_iter()
            .map(|(date, total)| DailyTotal { date, total })
            .collect())
    }

    /// Creates a new ledger spreadsheet with this month's partition ready
    pub async fn create_ledger(
        &self,
        access_token: &str,
        title: &str,
        tz: Tz,
    ) -> Result<CreatedLedger, LedgerError> {
        let created = self.provider.create_ledger(access_token, title).await?;
        let ledger = LedgerRef::new(&created.id, access_token);
        self.resolver
            .ensure_partition(&ledger, PartitionKey::current(tz))
            .await?;

        info!(ledger_id = %created.id, "Ledger created");
        Ok(created)
    }

    /// Spreadsheets the user can choose from
    pub async fn list_ledgers(&self, access_token: &str) -> Result<Vec<LedgerSummary>, LedgerError> {
        Ok(self.provider.list_ledgers(access_token).await?)
    }

    /// Checks the spreadsheet is reachable with the given credential
    pub async fn verify_access(&self, ledger: &LedgerRef) -> Result<(), LedgerError> {
        self.provider.list_partitions(ledger).await?;
        Ok(())
    }
}

/// Converts raw rows (header first) into records
fn records_from_rows(rows: &[Vec<String>]) -> Vec<LedgerRecord> {
    if rows.len() <= 1 {
        return Vec::new();
    }

    let headers: Vec<String> = match rows[0].iter().all(|cell| cell.trim().is_empty()) {
        true => HEADER.iter().map(|h| h.to_string()).collect(),
        false => rows[0]
            .iter()
            .map(|cell| super::entry::canonical_header(cell))
            .collect(),
    };

    rows[1..]
        .iter()
        .filter(|cells| cells.iter().any(|cell| !cell.trim().is_empty()))
        .map(|cells| LedgerRecord::from_cells(&headers, cells))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_records_from_rows_skips_header_only() {
        assert!(records_from_rows(&[]).is_empty());
        assert!(records_from_rows(&[row(&HEADER)]).is_empty());
    }

    #[test]
    fn test_records_from_rows_canonicalizes_legacy_header() {
        let rows = vec![
            row(&["時間", "名稱", "類別", "花費", "幣別", "支付方式"]),
            row(&["2024-01-15 12:30", "排骨便當", "飲食", "120"]),
            row(&["", "", ""]),
        ];

        let records = records_from_rows(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name(), "排骨便當");
        assert_eq!(records[0].amount(), Some(120.0));
        assert_eq!(records[0].get("payment_method"), "");
    }
}
