/// External API token model
///
/// Long-lived opaque bearer tokens for clients that cannot run the OAuth
/// flow (voice assistants, shortcuts). Tokens are hashed with SHA-256 before
/// storage and are never physically deleted: revocation clears `is_active`.
///
/// Legacy tokens may exist without an owning user; they authenticate but are
/// not authorized for ledger operations.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE api_tokens (
///     id UUID PRIMARY KEY,
///     user_id TEXT REFERENCES users(id) ON DELETE CASCADE,
///     token_hash VARCHAR(64) NOT NULL UNIQUE,
///     description TEXT NOT NULL DEFAULT '',
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     expires_at TIMESTAMPTZ,
///     last_used_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored API token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiToken {
    pub id: Uuid,

    /// Owning user (None for unbound legacy tokens)
    pub user_id: Option<String>,

    /// SHA-256 hex digest of the raw token
    #[serde(skip_serializing)]
    pub token_hash: String,

    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiToken {
    /// Checks whether the token may authenticate at `now`
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}
