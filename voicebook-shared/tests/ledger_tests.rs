/// Integration tests for the partitioned ledger store

mod common;

use chrono::NaiveDate;
use common::{header, FakeSheets};
use std::sync::atomic::Ordering;
use voicebook_shared::error::{Classify, ErrorKind};
use voicebook_shared::ledger::entry::HEADER;
use voicebook_shared::ledger::{LedgerConfig, LedgerEntry, LedgerError, LedgerRef, LedgerStore, PartitionKey};

const LEDGER: &str = "ledger-abc";

fn ledger() -> LedgerRef {
    LedgerRef::new(LEDGER, "access-token")
}

fn store(sheets: &std::sync::Arc<FakeSheets>) -> LedgerStore {
    LedgerStore::new(sheets.clone(), LedgerConfig::default())
}

fn month(year: i32, month: u32) -> PartitionKey {
    PartitionKey::new(year, month).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn entry(time: &str, name: &str, category: &str, amount: f64) -> LedgerEntry {
    LedgerEntry {
        time: time.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        amount,
        currency: "TWD".to_string(),
        payment_method: None,
    }
}

#[tokio::test]
async fn test_append_then_monthly_stats() {
    let sheets = FakeSheets::new();
    sheets.add_ledger(LEDGER);
    let ledger_store = store(&sheets);

    let written = ledger_store
        .append(&ledger(), &entry("2024-01-15 12:30", "排骨便當", "飲食", 120.0))
        .await
        .unwrap();
    assert_eq!(written, month(2024, 1));

    let rows = sheets.rows(LEDGER, "2024-01").unwrap();
    assert_eq!(rows[0], HEADER.iter().map(|h| h.to_string()).collect::<Vec<_>>());
    assert_eq!(rows[1][1], "排骨便當");
    assert_eq!(rows[1][3], "120");

    let stats = ledger_store.monthly_stats(&ledger(), month(2024, 1)).await.unwrap();
    assert_eq!(stats.total, 120.0);
    assert_eq!(stats.record_count, 1);
    assert_eq!(stats.totals_by_category.get("飲食"), Some(&120.0));
    assert_eq!(stats.counts_by_category.get("飲食"), Some(&1));
}

#[tokio::test]
async fn test_append_reuses_existing_partition() {
    let sheets = FakeSheets::new();
    sheets.seed_partition(LEDGER, "2024-01", &[header()]);
    let ledger_store = store(&sheets);

    ledger_store
        .append(&ledger(), &entry("2024-01-02 08:00", "捷運", "交通", 30.0))
        .await
        .unwrap();
    ledger_store
        .append(&ledger(), &entry("2024-01-03 08:00", "捷運", "交通", 30.0))
        .await
        .unwrap();

    let rows = sheets.rows(LEDGER, "2024-01").unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(sheets.partitions(LEDGER), vec!["2024-01".to_string()]);
}

#[tokio::test]
async fn test_append_failure_is_typed() {
    let sheets = FakeSheets::new();
    sheets.seed_partition(LEDGER, "2024-01", &[header()]);
    sheets.fail_appends(true);

    let err = store(&sheets)
        .append(&ledger(), &entry("2024-01-02 08:00", "捷運", "交通", 30.0))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::LedgerWriteFailed { ref partition, .. } if partition == "2024-01"));
    assert_eq!(err.kind(), ErrorKind::ExternalService);
    assert_eq!(err.code(), "LEDGER_WRITE_FAILED");
    assert_eq!(sheets.append_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_partition_creation_failure() {
    let sheets = FakeSheets::new();
    sheets.add_ledger(LEDGER);
    sheets.fail_appends(true);

    let err = store(&sheets)
        .append(&ledger(), &entry("2024-02-02 08:00", "捷運", "交通", 30.0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PARTITION_CREATE_FAILED");
}

#[tokio::test]
async fn test_append_recovers_partition_left_without_header() {
    let sheets = FakeSheets::new();
    sheets.add_ledger(LEDGER);
    let ledger_store = store(&sheets);

    sheets.fail_appends(true);
    let err = ledger_store
        .append(&ledger(), &entry("2024-01-02 08:00", "捷運", "交通", 30.0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PARTITION_CREATE_FAILED");
    assert_eq!(sheets.rows(LEDGER, "2024-01").unwrap().len(), 0);

    sheets.fail_appends(false);
    ledger_store
        .append(&ledger(), &entry("2024-01-15 12:30", "排骨便當", "飲食", 120.0))
        .await
        .unwrap();
    ledger_store
        .append(&ledger(), &entry("2024-01-16 18:00", "電影", "娛樂", 80.0))
        .await
        .unwrap();

    let rows = sheets.rows(LEDGER, "2024-01").unwrap();
    assert_eq!(rows[0], HEADER.iter().map(|h| h.to_string()).collect::<Vec<_>>());
    assert_eq!(rows.len(), 3);

    let stats = ledger_store.monthly_stats(&ledger(), month(2024, 1)).await.unwrap();
    assert_eq!(stats.total, 200.0);
    assert_eq!(stats.record_count, 2);
}

#[tokio::test]
async fn test_invalid_entry_never_reaches_provider() {
    let sheets = FakeSheets::new();
    sheets.add_ledger(LEDGER);

    let err = store(&sheets)
        .append(&ledger(), &entry("2024-02-02 08:00", "退款", "其他", -5.0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(sheets.append_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_partition_is_zero_stats() {
    let sheets = FakeSheets::new();
    sheets.add_ledger(LEDGER);

    let stats = store(&sheets).monthly_stats(&ledger(), month(2023, 5)).await.unwrap();
    assert_eq!(stats.total, 0.0);
    assert_eq!(stats.record_count, 0);
    assert!(stats.totals_by_category.is_empty());
}

#[tokio::test]
async fn test_monthly_stats_propagates_other_failures() {
    let sheets = FakeSheets::new();
    sheets.seed_partition(LEDGER, "2024-01", &[header()]);
    sheets.fail_reads_for("2024-01");

    let err = store(&sheets).monthly_stats(&ledger(), month(2024, 1)).await.unwrap_err();
    assert_eq!(err.code(), "LEDGER_READ_FAILED");
}

#[tokio::test]
async fn test_read_partition_header_only_is_empty() {
    let sheets = FakeSheets::new();
    sheets.seed_partition(LEDGER, "2024-01", &[header()]);

    let records = store(&sheets).read_partition(&ledger(), month(2024, 1)).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_legacy_headers_are_canonicalized() {
    let sheets = FakeSheets::new();
    sheets.seed_partition(
        LEDGER,
        "2023-12",
        &[
            &["時間", "名稱", "類別", "花費", "幣別", "支付方式"],
            &["2023-12-24 19:00", "聖誕大餐", "飲食", "1,500", "TWD", "信用卡"],
        ],
    );

    let records = store(&sheets).read_partition(&ledger(), month(2023, 12)).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name(), "聖誕大餐");
    assert_eq!(records[0].amount(), Some(1500.0));
    assert_eq!(records[0].get("payment_method"), "信用卡");
}

#[tokio::test]
async fn test_unparsable_amount_counted_but_not_summed() {
    let sheets = FakeSheets::new();
    sheets.seed_partition(
        LEDGER,
        "2024-03",
        &[
            header(),
            &["2024-03-01 12:00", "午餐", "飲食", "100"],
            &["2024-03-02 12:00", "午餐", "飲食", "一百"],
        ],
    );

    let stats = store(&sheets).monthly_stats(&ledger(), month(2024, 3)).await.unwrap();
    assert_eq!(stats.record_count, 2);
    assert_eq!(stats.total, 100.0);
}

#[tokio::test]
async fn test_multi_month_stats_keeps_order_and_fails_fast() {
    let sheets = FakeSheets::new();
    sheets.seed_partition(LEDGER, "2024-01", &[header(), &["2024-01-01 12:00", "a", "飲食", "10"]]);
    sheets.seed_partition(LEDGER, "2024-03", &[header(), &["2024-03-01 12:00", "b", "交通", "30"]]);
    let ledger_store = store(&sheets);

    let months = month(2024, 3).trailing(3);
    let stats = ledger_store.multi_month_stats(&ledger(), &months).await.unwrap();
    let totals: Vec<f64> = stats.iter().map(|s| s.total).collect();
    assert_eq!(totals, vec![10.0, 0.0, 30.0]);
    assert_eq!(stats[1].month, month(2024, 2));

    sheets.fail_reads_for("2024-03");
    assert!(ledger_store.multi_month_stats(&ledger(), &months).await.is_err());
}

#[tokio::test]
async fn test_records_in_range_filters_inclusively() {
    let sheets = FakeSheets::new();
    sheets.seed_partition(
        LEDGER,
        "2024-01",
        &[
            header(),
            &["2024-01-31 23:00", "宵夜", "飲食", "80"],
            &["2024-01-10 12:00", "早", "飲食", "50"],
        ],
    );
    sheets.seed_partition(
        LEDGER,
        "2024-02",
        &[
            header(),
            &["2024-02-02 12:00", "午餐", "飲食", "100"],
            &["2024-02-01 09:00", "公車", "交通", "15"],
            &["2024-02-03 09:00", "公車", "交通", "15"],
        ],
    );

    let records = store(&sheets)
        .records_in_range(&ledger(), date(2024, 1, 31), date(2024, 2, 2))
        .await
        .unwrap();

    let times: Vec<&str> = records.iter().map(|r| r.time()).collect();
    assert_eq!(
        times,
        vec!["2024-01-31 23:00", "2024-02-01 09:00", "2024-02-02 12:00"]
    );
}

#[tokio::test]
async fn test_records_in_range_rejects_inverted_range() {
    let sheets = FakeSheets::new();
    let err = store(&sheets)
        .records_in_range(&ledger(), date(2024, 2, 2), date(2024, 2, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn test_records_in_range_rejects_oversized_range() {
    let sheets = FakeSheets::new();
    sheets.add_ledger(LEDGER);
    let ledger_store = store(&sheets);

    let err = ledger_store
        .records_in_range(&ledger(), date(1, 1, 1), date(9999, 12, 31))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = ledger_store
        .records_in_range(&ledger(), date(2023, 1, 1), date(2024, 1, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(sheets.read_calls.load(Ordering::SeqCst), 0);

    // Exactly one leap year is the longest accepted span
    let records = ledger_store
        .records_in_range(&ledger(), date(2024, 1, 1), date(2024, 12, 31))
        .await
        .unwrap();
    assert!(records.is_empty());
    assert_eq!(sheets.read_calls.load(Ordering::SeqCst), 12);
}

#[tokio::test]
async fn test_range_scan_skips_failing_partition() {
    let sheets = FakeSheets::new();
    sheets.seed_partition(LEDGER, "2024-01", &[header(), &["2024-01-20 12:00", "a", "飲食", "10"]]);
    sheets.seed_partition(LEDGER, "2024-02", &[header(), &["2024-02-20 12:00", "b", "飲食", "20"]]);
    sheets.fail_reads_for("2024-01");

    let records = store(&sheets)
        .records_in_range(&ledger(), date(2024, 1, 1), date(2024, 3, 31))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name(), "b");
}

#[tokio::test]
async fn test_daily_trend_zero_fills() {
    let sheets = FakeSheets::new();
    sheets.seed_partition(
        LEDGER,
        "2024-03",
        &[
            header(),
            &["2024-03-01 12:00", "a", "飲食", "10"],
            &["2024-03-05 12:00", "b", "飲食", "20"],
            &["2024-03-05 19:00", "c", "飲食", "5"],
        ],
    );
    sheets.seed_partition(LEDGER, "2024-02", &[header(), &["2024-02-29 12:00", "d", "飲食", "7"]]);

    let trend = store(&sheets)
        .daily_trend_ending(&ledger(), 7, date(2024, 3, 6))
        .await
        .unwrap();

    assert_eq!(trend.len(), 7);
    assert_eq!(trend[0].date, date(2024, 2, 29));
    assert_eq!(trend[6].date, date(2024, 3, 6));
    let totals: Vec<f64> = trend.iter().map(|d| d.total).collect();
    assert_eq!(totals, vec![7.0, 10.0, 0.0, 0.0, 0.0, 25.0, 0.0]);
}

#[tokio::test]
async fn test_daily_trend_zero_days() {
    let sheets = FakeSheets::new();
    let trend = store(&sheets)
        .daily_trend_ending(&ledger(), 0, date(2024, 3, 6))
        .await
        .unwrap();
    assert!(trend.is_empty());
}

#[tokio::test]
async fn test_daily_trend_rejects_huge_day_count() {
    let sheets = FakeSheets::new();
    let ledger_store = store(&sheets);

    for days in [367, usize::MAX] {
        let err = ledger_store
            .daily_trend_ending(&ledger(), days, date(2024, 3, 6))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    let err = ledger_store
        .daily_trend_ending(&ledger(), 366, NaiveDate::MIN)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(sheets.read_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_recent_records_newest_first() {
    let sheets = FakeSheets::new();
    sheets.seed_partition(
        LEDGER,
        "2024-02",
        &[
            header(),
            &["2024-02-10 12:00", "old", "飲食", "10"],
            &["2024-02-28 12:00", "newer", "飲食", "10"],
        ],
    );
    sheets.seed_partition(
        LEDGER,
        "2024-03",
        &[
            header(),
            &["2024-03-02 08:00", "newest", "飲食", "10"],
            &["yesterday", "broken", "飲食", "10"],
        ],
    );
    sheets.seed_partition(LEDGER, "2024-01", &[header(), &["2024-01-31 12:00", "ignored", "飲食", "10"]]);
    let ledger_store = store(&sheets);

    let records = ledger_store
        .recent_records_as_of(&ledger(), 10, month(2024, 3))
        .await
        .unwrap();
    let names: Vec<&str> = records.iter().map(|r| r.name()).collect();
    assert_eq!(names, vec!["newest", "newer", "old", "broken"]);

    let limited = ledger_store
        .recent_records_as_of(&ledger(), 2, month(2024, 3))
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].name(), "newest");
}

#[tokio::test]
async fn test_create_ledger_prepares_current_partition() {
    let sheets = FakeSheets::new();
    let tz = chrono_tz::Asia::Taipei;

    let created = store(&sheets).create_ledger("access-token", "語音記帳", tz).await.unwrap();
    assert_eq!(created.name, "語音記帳");
    assert!(created.url.ends_with(&created.id));

    let current = PartitionKey::current(tz).to_string();
    let rows = sheets.rows(&created.id, &current).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], "time");
}
