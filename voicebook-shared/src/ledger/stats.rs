/// Client-side aggregation over partition rows

use super::entry::LedgerRecord;
use super::partition::PartitionKey;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Totals for one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyStats {
    pub month: PartitionKey,
    pub total: f64,

    /// Every data row, including rows whose amount could not be parsed
    pub record_count: usize,

    pub totals_by_category: BTreeMap<String, f64>,
    pub counts_by_category: BTreeMap<String, usize>,
}

impl MonthlyStats {
    pub fn empty(month: PartitionKey) -> Self {
        Self {
            month,
            total: 0.0,
            record_count: 0,
            totals_by_category: BTreeMap::new(),
            counts_by_category: BTreeMap::new(),
        }
    }

    /// Reduces rows into totals. Unparsable amounts are skipped, not fatal.
    pub fn from_records(month: PartitionKey, records: &[LedgerRecord]) -> Self {
        let mut stats = Self::empty(month);
        for record in records {
            let category = record.category().to_string();
            *stats.counts_by_category.entry(category.clone()).or_default() += 1;
            stats.record_count += 1;

            if let Some(amount) = record.amount() {
                stats.total += amount;
                *stats.totals_by_category.entry(category).or_default() += amount;
            }
        }
        stats
    }

    /// Fraction of `budget` spent, if a positive budget is set
    pub fn budget_usage(&self, budget: Option<i64>) -> Option<f64> {
        budget
            .filter(|budget| *budget > 0)
            .map(|budget| self.total / budget as f64)
    }
}

/// Spending on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total: f64,
}
