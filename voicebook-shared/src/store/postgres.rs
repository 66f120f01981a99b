/// PostgreSQL credential store
///
/// Each trait operation is a single SQL statement. Replace-by-owner writes use
/// `INSERT ... ON CONFLICT (user_id) DO UPDATE`; consumption and rotation are
/// conditional `UPDATE`s whose affected-row count decides the winner.

use super::{CredentialStore, StoreError, StoreResult};
use crate::models::{
    api_token::ApiToken,
    delegated_credential::DelegatedCredential,
    exchange_code::ExchangeCode,
    ledger_binding::LedgerBinding,
    oauth_state::OAuthState,
    renewal_token::RenewalToken,
    user::{UpsertUser, User, DEFAULT_TIMEZONE},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, email, name, picture, timezone, monthly_budget, created_at, updated_at";

const API_TOKEN_COLUMNS: &str =
    "id, user_id, token_hash, description, is_active, created_at, expires_at, last_used_at";

/// [`CredentialStore`] backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_unique_violation(err: sqlx::Error, what: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.constraint().is_some() => {
            StoreError::Conflict(format!("{} already exists", what))
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn ping(&self) -> StoreResult<()> {
        crate::db::pool::health_check(&self.pool).await?;
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn upsert_user(&self, profile: &UpsertUser) -> StoreResult<(User, bool)> {
        // xmax = 0 only for freshly inserted rows
        let (user_id, created) = sqlx::query_as::<_, (String, bool)>(
            r#"
            INSERT INTO users (id, email, name, picture, timezone)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email,
                name = EXCLUDED.name,
                picture = EXCLUDED.picture,
                updated_at = NOW()
            RETURNING id, (xmax = 0) AS created
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(&profile.picture)
        .bind(DEFAULT_TIMEZONE)
        .fetch_one(&self.pool)
        .await?;

        let user = self
            .find_user(&user_id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;

        Ok((user, created))
    }

    async fn update_user_timezone(
        &self,
        user_id: &str,
        timezone: &str,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET timezone = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(timezone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_user_budget(
        &self,
        user_id: &str,
        budget: Option<i64>,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET monthly_budget = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(budget)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_delegated_credential(
        &self,
        user_id: &str,
    ) -> StoreResult<Option<DelegatedCredential>> {
        let credential = sqlx::query_as::<_, DelegatedCredential>(
            r#"
            SELECT user_id, access_token, refresh_token, expires_at, scope, updated_at
            FROM delegated_credentials
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credential)
    }

    async fn save_delegated_credential(
        &self,
        credential: &DelegatedCredential,
    ) -> StoreResult<DelegatedCredential> {
        let saved = sqlx::query_as::<_, DelegatedCredential>(
            r#"
            INSERT INTO delegated_credentials
                (user_id, access_token, refresh_token, expires_at, scope, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE
            SET access_token = EXCLUDED.access_token,
                refresh_token = COALESCE(EXCLUDED.refresh_token, delegated_credentials.refresh_token),
                expires_at = EXCLUDED.expires_at,
                scope = COALESCE(EXCLUDED.scope, delegated_credentials.scope),
                updated_at = EXCLUDED.updated_at
            RETURNING user_id, access_token, refresh_token, expires_at, scope, updated_at
            "#,
        )
        .bind(&credential.user_id)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(&credential.scope)
        .bind(credential.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(saved)
    }

    async fn find_renewal_token(&self, token_hash: &str) -> StoreResult<Option<RenewalToken>> {
        let token = sqlx::query_as::<_, RenewalToken>(
            r#"
            SELECT user_id, token_hash, issued_at, last_used_at, expires_at, revoked_at
            FROM renewal_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn replace_renewal_token(&self, token: &RenewalToken) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO renewal_tokens
                (user_id, token_hash, issued_at, last_used_at, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE
            SET token_hash = EXCLUDED.token_hash,
                issued_at = EXCLUDED.issued_at,
                last_used_at = EXCLUDED.last_used_at,
                expires_at = EXCLUDED.expires_at,
                revoked_at = EXCLUDED.revoked_at
            "#,
        )
        .bind(&token.user_id)
        .bind(&token.token_hash)
        .bind(token.issued_at)
        .bind(token.last_used_at)
        .bind(token.expires_at)
        .bind(token.revoked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "renewal token"))?;

        Ok(())
    }

    async fn rotate_renewal_token(
        &self,
        current_hash: &str,
        next: &RenewalToken,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE renewal_tokens
            SET token_hash = $3,
                issued_at = $4,
                last_used_at = $5,
                expires_at = $6,
                revoked_at = NULL
            WHERE user_id = $1
              AND token_hash = $2
              AND revoked_at IS NULL
            "#,
        )
        .bind(&next.user_id)
        .bind(current_hash)
        .bind(&next.token_hash)
        .bind(next.issued_at)
        .bind(next.last_used_at)
        .bind(next.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "renewal token"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_renewal_token(&self, token_hash: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE renewal_tokens SET revoked_at = $2 WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(token_hash)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_user_renewal_token(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE renewal_tokens SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_exchange_code(&self, code: &ExchangeCode) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO exchange_codes (code_hash, user_id, issued_at, expires_at, used_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&code.code_hash)
        .bind(&code.user_id)
        .bind(code.issued_at)
        .bind(code.expires_at)
        .bind(code.used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "exchange code"))?;

        Ok(())
    }

    async fn find_exchange_code(&self, code_hash: &str) -> StoreResult<Option<ExchangeCode>> {
        let code = sqlx::query_as::<_, ExchangeCode>(
            r#"
            SELECT code_hash, user_id, issued_at, expires_at, used_at
            FROM exchange_codes
            WHERE code_hash = $1
            "#,
        )
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    async fn consume_exchange_code(&self, code_hash: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE exchange_codes SET used_at = $2 WHERE code_hash = $1 AND used_at IS NULL",
        )
        .bind(code_hash)
        .bind(at)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM exchange_codes
            WHERE code_hash <> $1 AND (used_at IS NOT NULL OR expires_at <= $2)
            "#,
        )
        .bind(code_hash)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_api_token(&self, token: &ApiToken) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO api_tokens
                (id, user_id, token_hash, description, is_active, created_at, expires_at, last_used_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(token.id)
        .bind(&token.user_id)
        .bind(&token.token_hash)
        .bind(&token.description)
        .bind(token.is_active)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "api token"))?;

        Ok(())
    }

    async fn touch_active_api_token(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<ApiToken>> {
        let token = sqlx::query_as::<_, ApiToken>(&format!(
            r#"
            UPDATE api_tokens
            SET last_used_at = $2
            WHERE token_hash = $1
              AND is_active = TRUE
              AND (expires_at IS NULL OR expires_at > $2)
            RETURNING {}
            "#,
            API_TOKEN_COLUMNS
        ))
        .bind(token_hash)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn list_active_api_tokens(&self, user_id: &str) -> StoreResult<Vec<ApiToken>> {
        let tokens = sqlx::query_as::<_, ApiToken>(&format!(
            r#"
            SELECT {}
            FROM api_tokens
            WHERE user_id = $1 AND is_active = TRUE
            ORDER BY created_at DESC
            "#,
            API_TOKEN_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens)
    }

    async fn deactivate_api_token(&self, id: Uuid, user_id: &str) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE api_tokens SET is_active = FALSE WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_ledger_binding(&self, user_id: &str) -> StoreResult<Option<LedgerBinding>> {
        let binding = sqlx::query_as::<_, LedgerBinding>(
            r#"
            SELECT user_id, ledger_id, ledger_url, ledger_name, updated_at
            FROM ledger_bindings
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(binding)
    }

    async fn save_ledger_binding(&self, binding: &LedgerBinding) -> StoreResult<LedgerBinding> {
        let saved = sqlx::query_as::<_, LedgerBinding>(
            r#"
            INSERT INTO ledger_bindings (user_id, ledger_id, ledger_url, ledger_name, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET ledger_id = EXCLUDED.ledger_id,
                ledger_url = EXCLUDED.ledger_url,
                ledger_name = EXCLUDED.ledger_name,
                updated_at = EXCLUDED.updated_at
            RETURNING user_id, ledger_id, ledger_url, ledger_name, updated_at
            "#,
        )
        .bind(&binding.user_id)
        .bind(&binding.ledger_id)
        .bind(&binding.ledger_url)
        .bind(&binding.ledger_name)
        .bind(binding.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(saved)
    }

    async fn insert_oauth_state(&self, state: &OAuthState) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_states (state_hash, redirect_to, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&state.state_hash)
        .bind(&state.redirect_to)
        .bind(state.created_at)
        .bind(state.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "oauth state"))?;

        Ok(())
    }

    async fn take_oauth_state(
        &self,
        state_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<OAuthState>> {
        let state = sqlx::query_as::<_, OAuthState>(
            r#"
            DELETE FROM oauth_states
            WHERE state_hash = $1
            RETURNING state_hash, redirect_to, created_at, expires_at
            "#,
        )
        .bind(state_hash)
        .fetch_optional(&self.pool)
        .await?;

        sqlx::query("DELETE FROM oauth_states WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(state.filter(|state| state.expires_at > now))
    }
}
