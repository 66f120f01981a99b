/// One-time exchange code
///
/// Minted after a successful OAuth login and handed to the browser, which
/// trades it for a session exactly once. `used_at` is set on consumption and
/// never cleared.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE exchange_codes (
///     code_hash VARCHAR(64) PRIMARY KEY,
///     user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     issued_at TIMESTAMPTZ NOT NULL,
///     expires_at TIMESTAMPTZ NOT NULL,
///     used_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExchangeCode {
    pub code_hash: String,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl ExchangeCode {
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
