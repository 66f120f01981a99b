/// Delegated-access broker
///
/// Produces a live delegated credential for a user, refreshing it through the
/// OAuth provider when it is within the safety margin of its expiry.
///
/// Every ledger operation goes through [`DelegatedAccessBroker::get_live_credential`].
/// The broker holds no lock of its own, so calls for different users never
/// wait on each other, and it makes at most one refresh attempt per call.
/// A failed refresh leaves the stored credential untouched.

use super::provider::OAuthProvider;
use crate::error::{Classify, ErrorKind};
use crate::models::delegated_credential::DelegatedCredential;
use crate::provider::ProviderError;
use crate::store::{CredentialStore, StoreError};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Error type for broker operations
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The user never granted delegated access
    #[error("No delegated credential for user {0}")]
    NoDelegatedCredential(String),

    /// Expired and no refresh token is stored; the user must re-authorize
    #[error("Delegated credential expired and cannot be refreshed")]
    DelegatedCredentialUnrefreshable,

    /// The provider rejected the refresh; the user must re-authorize
    #[error("Delegated credential refresh failed: {0}")]
    DelegatedCredentialRefreshFailed(#[source] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Classify for BrokerError {
    fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::NoDelegatedCredential(_) | BrokerError::DelegatedCredentialUnrefreshable => {
                ErrorKind::Authentication
            }
            BrokerError::DelegatedCredentialRefreshFailed(_) => ErrorKind::ExternalService,
            BrokerError::Store(_) => ErrorKind::Internal,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            BrokerError::NoDelegatedCredential(_) => "NO_DELEGATED_CREDENTIAL",
            BrokerError::DelegatedCredentialUnrefreshable => "DELEGATED_CREDENTIAL_UNREFRESHABLE",
            BrokerError::DelegatedCredentialRefreshFailed(_) => "DELEGATED_CREDENTIAL_REFRESH_FAILED",
            BrokerError::Store(_) => "STORE_ERROR",
        }
    }
}

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Credentials are treated as expired this long before their recorded expiry
    pub expiry_margin: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            expiry_margin: Duration::minutes(5),
        }
    }
}

/// Hands out live delegated credentials
pub struct DelegatedAccessBroker {
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn OAuthProvider>,
    config: BrokerConfig,
}

impl DelegatedAccessBroker {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        provider: Arc<dyn OAuthProvider>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Returns a credential whose access value is usable right now
    ///
    /// # Errors
    ///
    /// - `NoDelegatedCredential` if the user has none stored
    /// - `DelegatedCredentialUnrefreshable` if it expired without a refresh value
    /// - `DelegatedCredentialRefreshFailed` if the provider refresh failed
    pub async fn get_live_credential(&self, user_id: &str) -> Result<DelegatedCredential, BrokerError> {
        let stored = self
            .store
            .find_delegated_credential(user_id)
            .await?
            .ok_or_else(|| BrokerError::NoDelegatedCredential(user_id.to_string()))?;

        let now = Utc::now();
        if !stored.is_expired_at(now, self.config.expiry_margin) {
            return Ok(stored);
        }

        let refresh_token = stored
            .refresh_token
            .as_deref()
            .ok_or(BrokerError::DelegatedCredentialUnrefreshable)?;

        debug!(user_id = %user_id, "Delegated credential expired, refreshing");

        let grant = self.provider.refresh(refresh_token).await.map_err(|e| {
            warn!(user_id = %user_id, error = %e, "Delegated credential refresh failed");
            BrokerError::DelegatedCredentialRefreshFailed(e)
        })?;

        let refreshed = DelegatedCredential {
            user_id: stored.user_id.clone(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(stored.refresh_token.clone()),
            expires_at: grant.expires_at,
            scope: grant.scope.or(stored.scope.clone()),
            updated_at: Utc::now(),
        };

        let saved = self.store.save_delegated_credential(&refreshed).await?;

        info!(user_id = %user_id, expires_at = ?saved.expires_at, "Delegated credential refreshed");
        Ok(saved)
    }
}
