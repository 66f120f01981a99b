/// Session renewal token
///
/// One row per user. Issuing a new renewal token overwrites the row, so at
/// most one renewal token is live for a user at any time. Only the SHA-256
/// hash of the raw value is stored.
///
/// # Lifecycle
///
/// ```text
/// issued -> active (last_used_at refreshed on each use)
///        -> revoked | expired | inactivity-expired   (absorbing)
/// ```
///
/// # Schema
///
/// ```sql
/// CREATE TABLE renewal_tokens (
///     user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
///     token_hash VARCHAR(64) NOT NULL UNIQUE,
///     issued_at TIMESTAMPTZ NOT NULL,
///     last_used_at TIMESTAMPTZ NOT NULL,
///     expires_at TIMESTAMPTZ,
///     revoked_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RenewalToken {
    pub user_id: String,

    /// SHA-256 hex digest of the raw token
    pub token_hash: String,

    pub issued_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,

    /// Absolute expiry (None = no absolute expiry)
    pub expires_at: Option<DateTime<Utc>>,

    pub revoked_at: Option<DateTime<Utc>>,
}

impl RenewalToken {
    /// Builds a fresh, never-used token record
    pub fn issue(
        user_id: impl Into<String>,
        token_hash: impl Into<String>,
        now: DateTime<Utc>,
        lifetime: Option<Duration>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            token_hash: token_hash.into(),
            issued_at: now,
            last_used_at: now,
            expires_at: lifetime.map(|lifetime| now + lifetime),
            revoked_at: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Past its absolute expiry
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires_at| now >= expires_at)
    }

    /// Unused for longer than the inactivity window
    pub fn is_inactive_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.last_used_at > window
    }
}
