/// Pending OAuth `state` value
///
/// Persisted with a TTL so any server instance can complete a login started
/// on another, and so restarts do not lose in-flight logins. Consumed once.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE oauth_states (
///     state_hash VARCHAR(64) PRIMARY KEY,
///     redirect_to TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     expires_at TIMESTAMPTZ NOT NULL
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OAuthState {
    pub state_hash: String,

    /// Frontend path to return to after login
    pub redirect_to: Option<String>,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
