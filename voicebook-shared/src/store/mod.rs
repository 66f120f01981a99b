/// Credential store
///
/// Durable keyed records for users, delegated credentials, renewal tokens,
/// exchange codes, API tokens, pending OAuth states and ledger bindings.
///
/// The store is a trait so the session manager and broker can run against
/// PostgreSQL in production ([`postgres::PgCredentialStore`]) and an
/// in-process map in tests and local development
/// ([`memory::MemoryCredentialStore`]).
///
/// # Atomicity
///
/// Every operation is a single atomic step against the backing store:
///
/// - Replace-by-owner writes (`replace_renewal_token`,
///   `save_delegated_credential`, `save_ledger_binding`) overwrite the one row
///   owned by the user.
/// - `consume_exchange_code` only succeeds while `used_at` is unset, so two
///   concurrent consumers of the same code cannot both win.
/// - `rotate_renewal_token` is a compare-and-swap on the current hash: a
///   caller holding a stale token loses and observes `false`.
/// - `take_oauth_state` deletes the state as it reads it.

pub mod memory;
pub mod postgres;

use crate::error::{Classify, ErrorKind};
use crate::models::{
    api_token::ApiToken, delegated_credential::DelegatedCredential, exchange_code::ExchangeCode,
    ledger_binding::LedgerBinding, oauth_state::OAuthState, renewal_token::RenewalToken,
    user::{UpsertUser, User},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backing database failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness constraint was violated
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }

    fn code(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "STORE_ERROR",
            StoreError::Conflict(_) => "STORE_CONFLICT",
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed record store backing sessions, credentials and bindings
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Verifies the store is reachable
    async fn ping(&self) -> StoreResult<()>;

    // Users

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>>;

    /// Creates the user or refreshes their profile fields
    ///
    /// Returns the stored user and whether it was newly created. Timezone and
    /// budget are left untouched for existing users.
    async fn upsert_user(&self, profile: &UpsertUser) -> StoreResult<(User, bool)>;

    async fn update_user_timezone(&self, user_id: &str, timezone: &str)
        -> StoreResult<Option<User>>;

    async fn update_user_budget(&self, user_id: &str, budget: Option<i64>)
        -> StoreResult<Option<User>>;

    // Delegated credentials

    async fn find_delegated_credential(
        &self,
        user_id: &str,
    ) -> StoreResult<Option<DelegatedCredential>>;

    /// Replaces the user's delegated credential
    ///
    /// When `credential.refresh_token` is None the previously stored refresh
    /// value is retained.
    async fn save_delegated_credential(
        &self,
        credential: &DelegatedCredential,
    ) -> StoreResult<DelegatedCredential>;

    // Renewal tokens

    async fn find_renewal_token(&self, token_hash: &str) -> StoreResult<Option<RenewalToken>>;

    /// Overwrites the user's renewal token row, implicitly invalidating any
    /// previous token
    async fn replace_renewal_token(&self, token: &RenewalToken) -> StoreResult<()>;

    /// Replaces the user's token with `next` only if the live row still
    /// carries `current_hash` and is not revoked
    async fn rotate_renewal_token(
        &self,
        current_hash: &str,
        next: &RenewalToken,
    ) -> StoreResult<bool>;

    /// Revokes the token with this hash if it is not already revoked
    async fn revoke_renewal_token(&self, token_hash: &str, at: DateTime<Utc>)
        -> StoreResult<bool>;

    /// Revokes whatever renewal token the user currently holds
    async fn revoke_user_renewal_token(&self, user_id: &str, at: DateTime<Utc>)
        -> StoreResult<bool>;

    // Exchange codes

    async fn insert_exchange_code(&self, code: &ExchangeCode) -> StoreResult<()>;

    async fn find_exchange_code(&self, code_hash: &str) -> StoreResult<Option<ExchangeCode>>;

    /// Marks the code used; false if it was already used or does not exist
    ///
    /// Other codes that are used or expired at `at` are deleted.
    async fn consume_exchange_code(&self, code_hash: &str, at: DateTime<Utc>)
        -> StoreResult<bool>;

    // API tokens

    async fn insert_api_token(&self, token: &ApiToken) -> StoreResult<()>;

    /// Looks up an active, unexpired token and records its use
    async fn touch_active_api_token(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<ApiToken>>;

    /// Active tokens owned by the user, newest first
    async fn list_active_api_tokens(&self, user_id: &str) -> StoreResult<Vec<ApiToken>>;

    /// Deactivates a token owned by the user; false if not found or not owned
    async fn deactivate_api_token(&self, id: Uuid, user_id: &str) -> StoreResult<bool>;

    // Ledger bindings

    async fn find_ledger_binding(&self, user_id: &str) -> StoreResult<Option<LedgerBinding>>;

    async fn save_ledger_binding(&self, binding: &LedgerBinding) -> StoreResult<LedgerBinding>;

    // OAuth states

    async fn insert_oauth_state(&self, state: &OAuthState) -> StoreResult<()>;

    /// Removes and returns the state if it exists and has not expired
    async fn take_oauth_state(
        &self,
        state_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<OAuthState>>;
}
