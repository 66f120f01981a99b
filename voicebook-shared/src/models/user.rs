/// User model
///
/// A user is identified by the stable id issued by the OAuth provider.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id TEXT PRIMARY KEY,
///     email TEXT NOT NULL,
///     name TEXT,
///     picture TEXT,
///     timezone TEXT NOT NULL DEFAULT 'Asia/Taipei',
///     monthly_budget BIGINT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timezone assigned to new users
pub const DEFAULT_TIMEZONE: &str = "Asia/Taipei";

/// User account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Stable external id from the OAuth provider
    pub id: String,

    /// Email address
    pub email: String,

    /// Display name
    pub name: Option<String>,

    /// Avatar URL
    pub picture: Option<String>,

    /// IANA timezone name used for "today" and "this month"
    pub timezone: String,

    /// Optional monthly spending budget (whole currency units)
    pub monthly_budget: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Parses the stored timezone, falling back to [`DEFAULT_TIMEZONE`]
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone
            .parse()
            .unwrap_or(chrono_tz::Asia::Taipei)
    }
}

/// Profile data used to create or refresh a user after login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}
