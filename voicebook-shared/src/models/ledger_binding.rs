/// Ledger binding
///
/// Associates a user with the spreadsheet holding their ledger. One row per
/// user; selecting or linking another spreadsheet replaces it.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE ledger_bindings (
///     user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
///     ledger_id TEXT NOT NULL,
///     ledger_url TEXT NOT NULL,
///     ledger_name TEXT NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name given to bindings when the provider reports none
pub const DEFAULT_LEDGER_NAME: &str = "記帳紀錄";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LedgerBinding {
    pub user_id: String,

    /// Provider spreadsheet id
    pub ledger_id: String,

    /// Canonical URL of the spreadsheet
    pub ledger_url: String,

    pub ledger_name: String,
    pub updated_at: DateTime<Utc>,
}
