/// In-memory credential store
///
/// Typed maps behind a single `tokio::sync::RwLock`. Every trait operation
/// takes the lock once, so compare-and-swap operations are atomic with
/// respect to each other. Data is lost when the store is dropped; used by
/// tests and local development.

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
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, User>,
    delegated: HashMap<String, DelegatedCredential>,
    /// Keyed by owning user
    renewal: HashMap<String, RenewalToken>,
    exchange_codes: HashMap<String, ExchangeCode>,
    /// Keyed by token hash
    api_tokens: HashMap<String, ApiToken>,
    bindings: HashMap<String, LedgerBinding>,
    oauth_states: HashMap<String, OAuthState>,
}

/// In-memory [`CredentialStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of renewal-token rows held for a user (0 or 1)
    pub async fn renewal_token_count(&self, user_id: &str) -> usize {
        usize::from(self.tables.read().await.renewal.contains_key(user_id))
    }

    /// Number of exchange-code rows currently held
    pub async fn exchange_code_count(&self) -> usize {
        self.tables.read().await.exchange_codes.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(user_id).cloned())
    }

    async fn upsert_user(&self, profile: &UpsertUser) -> StoreResult<(User, bool)> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        if let Some(user) = tables.users.get_mut(&profile.id) {
            user.email = profile.email.clone();
            user.name = profile.name.clone();
            user.picture = profile.picture.clone();
            user.updated_at = now;
            return Ok((user.clone(), false));
        }

        let user = User {
            id: profile.id.clone(),
            email: profile.email.clone(),
            name: profile.name.clone(),
            picture: profile.picture.clone(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            monthly_budget: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id.clone(), user.clone());
        Ok((user, true))
    }

    async fn update_user_timezone(
        &self,
        user_id: &str,
        timezone: &str,
    ) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(user_id).map(|user| {
            user.timezone = timezone.to_string();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn update_user_budget(
        &self,
        user_id: &str,
        budget: Option<i64>,
    ) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(user_id).map(|user| {
            user.monthly_budget = budget;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn find_delegated_credential(
        &self,
        user_id: &str,
    ) -> StoreResult<Option<DelegatedCredential>> {
        Ok(self.tables.read().await.delegated.get(user_id).cloned())
    }

    async fn save_delegated_credential(
        &self,
        credential: &DelegatedCredential,
    ) -> StoreResult<DelegatedCredential> {
        let mut tables = self.tables.write().await;
        let mut stored = credential.clone();
        if stored.refresh_token.is_none() {
            stored.refresh_token = tables
                .delegated
                .get(&credential.user_id)
                .and_then(|existing| existing.refresh_token.clone());
        }
        tables
            .delegated
            .insert(stored.user_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_renewal_token(&self, token_hash: &str) -> StoreResult<Option<RenewalToken>> {
        Ok(self
            .tables
            .read()
            .await
            .renewal
            .values()
            .find(|token| token.token_hash == token_hash)
            .cloned())
    }

    async fn replace_renewal_token(&self, token: &RenewalToken) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let clash = tables
            .renewal
            .values()
            .any(|existing| existing.token_hash == token.token_hash && existing.user_id != token.user_id);
        if clash {
            return Err(StoreError::Conflict("renewal token hash already in use".to_string()));
        }
        tables.renewal.insert(token.user_id.clone(), token.clone());
        Ok(())
    }

    async fn rotate_renewal_token(
        &self,
        current_hash: &str,
        next: &RenewalToken,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.renewal.get_mut(&next.user_id) {
            Some(live) if live.token_hash == current_hash && live.revoked_at.is_none() => {
                *live = next.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_renewal_token(&self, token_hash: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let revoked = tables
            .renewal
            .values_mut()
            .find(|token| token.token_hash == token_hash && token.revoked_at.is_none())
            .map(|token| token.revoked_at = Some(at))
            .is_some();
        Ok(revoked)
    }

    async fn revoke_user_renewal_token(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.renewal.get_mut(user_id) {
            Some(token) if token.revoked_at.is_none() => {
                token.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_exchange_code(&self, code: &ExchangeCode) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.exchange_codes.contains_key(&code.code_hash) {
            return Err(StoreError::Conflict("exchange code already exists".to_string()));
        }
        tables
            .exchange_codes
            .insert(code.code_hash.clone(), code.clone());
        Ok(())
    }

    async fn find_exchange_code(&self, code_hash: &str) -> StoreResult<Option<ExchangeCode>> {
        Ok(self.tables.read().await.exchange_codes.get(code_hash).cloned())
    }

    async fn consume_exchange_code(&self, code_hash: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let consumed = match tables.exchange_codes.get_mut(code_hash) {
            Some(code) if code.used_at.is_none() => {
                code.used_at = Some(at);
                true
            }
            _ => false,
        };

        tables.exchange_codes.retain(|hash, code| {
            hash == code_hash || !(code.is_used() || code.is_expired_at(at))
        });
        Ok(consumed)
    }

    async fn insert_api_token(&self, token: &ApiToken) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.api_tokens.contains_key(&token.token_hash) {
            return Err(StoreError::Conflict("api token already exists".to_string()));
        }
        tables
            .api_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn touch_active_api_token(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<ApiToken>> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .api_tokens
            .get_mut(token_hash)
            .filter(|token| token.is_usable_at(at))
            .map(|token| {
                token.last_used_at = Some(at);
                token.clone()
            }))
    }

    async fn list_active_api_tokens(&self, user_id: &str) -> StoreResult<Vec<ApiToken>> {
        let tables = self.tables.read().await;
        let mut tokens: Vec<ApiToken> = tables
            .api_tokens
            .values()
            .filter(|token| token.is_active && token.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }

    async fn deactivate_api_token(&self, id: Uuid, user_id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let deactivated = tables
            .api_tokens
            .values_mut()
            .find(|token| token.id == id && token.user_id.as_deref() == Some(user_id))
            .map(|token| token.is_active = false)
            .is_some();
        Ok(deactivated)
    }

    async fn find_ledger_binding(&self, user_id: &str) -> StoreResult<Option<LedgerBinding>> {
        Ok(self.tables.read().await.bindings.get(user_id).cloned())
    }

    async fn save_ledger_binding(&self, binding: &LedgerBinding) -> StoreResult<LedgerBinding> {
        let mut tables = self.tables.write().await;
        tables
            .bindings
            .insert(binding.user_id.clone(), binding.clone());
        Ok(binding.clone())
    }

    async fn insert_oauth_state(&self, state: &OAuthState) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .oauth_states
            .insert(state.state_hash.clone(), state.clone());
        Ok(())
    }

    async fn take_oauth_state(
        &self,
        state_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<OAuthState>> {
        let mut tables = self.tables.write().await;
        tables.oauth_states.retain(|_, state| state.expires_at > now);
        Ok(tables.oauth_states.remove(state_hash))
    }
}
