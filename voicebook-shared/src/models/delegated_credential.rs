/// Delegated OAuth credential
///
/// The access/refresh pair the service uses to call the spreadsheet provider
/// on a user's behalf. There is at most one row per user, mutated in place
/// whenever the access value is refreshed.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE delegated_credentials (
///     user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
///     access_token TEXT NOT NULL,
///     refresh_token TEXT,
///     expires_at TIMESTAMPTZ,
///     scope TEXT,
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Stored delegated credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DelegatedCredential {
    /// Owning user
    pub user_id: String,

    /// Opaque provider access token
    pub access_token: String,

    /// Opaque provider refresh token. Only issued on the first consent.
    pub refresh_token: Option<String>,

    /// Access token expiry (None = never expires)
    pub expires_at: Option<DateTime<Utc>>,

    /// Granted scope string
    pub scope: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl DelegatedCredential {
    /// Checks whether the access value must not be used at `now`
    ///
    /// The credential is treated as expired `margin` before its recorded
    /// expiry so an in-flight request never carries a token that dies
    /// mid-call.
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now + margin >= expires_at,
            None => false,
        }
    }
}
