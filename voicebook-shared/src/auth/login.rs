/// OAuth login orchestration
///
/// Bridges the provider's authorization-code redirect to a session:
///
/// 1. [`LoginFlow::begin`] persists a hashed, expiring `state` and returns the
///    provider authorization URL.
/// 2. [`LoginFlow::complete`] consumes the state, exchanges the provider code,
///    creates or updates the user, stores the delegated credential and mints a
///    one-time exchange code.
/// 3. The browser trades that code for session tokens via
///    [`SessionManager::issue_session_from_code`](super::session::SessionManager::issue_session_from_code).
///
/// Pending states live in the credential store, so a login may begin on one
/// server instance and complete on another.

use super::session::{SessionError, SessionManager};
use super::token::{generate_token_pair, hash_token};
use crate::error::{Classify, ErrorKind};
use crate::models::{
    delegated_credential::DelegatedCredential, oauth_state::OAuthState, user::UpsertUser,
};
use crate::oauth::provider::OAuthProvider;
use crate::provider::ProviderError;
use crate::store::{CredentialStore, StoreError};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Error type for the login flow
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// State is unknown, expired or was already used
    #[error("OAuth state is invalid or expired")]
    OAuthStateInvalid,

    /// The provider rejected the code or could not be reached
    #[error("OAuth provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Classify for LoginError {
    fn kind(&self) -> ErrorKind {
        match self {
            LoginError::OAuthStateInvalid => ErrorKind::Authentication,
            LoginError::Provider(_) => ErrorKind::ExternalService,
            LoginError::Session(e) => e.kind(),
            LoginError::Store(_) => ErrorKind::Internal,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            LoginError::OAuthStateInvalid => "OAUTH_STATE_INVALID",
            LoginError::Provider(_) => "OAUTH_PROVIDER_ERROR",
            LoginError::Session(e) => e.code(),
            LoginError::Store(_) => "STORE_ERROR",
        }
    }
}

/// Start of a login
#[derive(Debug, Clone, Serialize)]
pub struct LoginStart {
    pub authorization_url: String,
    pub state: String,
}

/// Result of a completed provider callback
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    /// Raw one-time exchange code
    pub code: String,

    /// Whether the user was created by this login
    pub new_user: bool,

    /// Frontend path recorded when the login began
    pub redirect_to: Option<String>,
}

/// OAuth login orchestrator
pub struct LoginFlow {
    store: Arc<dyn CredentialStore>,
    sessions: Arc<SessionManager>,
    provider: Arc<dyn OAuthProvider>,
    state_ttl: Duration,
}

impl LoginFlow {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        sessions: Arc<SessionManager>,
        provider: Arc<dyn OAuthProvider>,
        state_ttl: Duration,
    ) -> Self {
        Self {
            store,
            sessions,
            provider,
            state_ttl,
        }
    }

    /// Persists a fresh state and returns the provider authorization URL
    pub async fn begin(&self, redirect_to: Option<String>) -> Result<LoginStart, LoginError> {
        let now = Utc::now();
        let (state, state_hash) = generate_token_pair();

        self.store
            .insert_oauth_state(&OAuthState {
                state_hash,
                redirect_to,
                created_at: now,
                expires_at: now + self.state_ttl,
            })
            .await?;

        Ok(LoginStart {
            authorization_url: self.provider.authorization_url(&state),
            state,
        })
    }

    /// Handles the provider callback
    pub async fn complete(&self, state: &str, provider_code: &str) -> Result<LoginOutcome, LoginError> {
        let now = Utc::now();

        let pending = self
            .store
            .take_oauth_state(&hash_token(state), now)
            .await?
            .ok_or_else(|| {
                warn!("OAuth callback with unknown or expired state");
                LoginError::OAuthStateInvalid
            })?;

        let grant = self.provider.exchange_code(provider_code).await?;
        let profile = self.provider.user_info(&grant.access_token).await?;

        let (user, new_user) = self
            .store
            .upsert_user(&UpsertUser {
                id: profile.id,
                email: profile.email,
                name: profile.name,
                picture: profile.picture,
            })
            .await?;

        self.store
            .save_delegated_credential(&DelegatedCredential {
                user_id: user.id.clone(),
                access_token: grant.access_token,
                refresh_token: grant.refresh_token,
                expires_at: grant.expires_at,
                scope: grant.scope,
                updated_at: now,
            })
            .await?;

        let code = self.sessions.create_exchange_code(&user.id).await?;

        info!(user_id = %user.id, new_user, "OAuth login completed");
        Ok(LoginOutcome {
            code,
            new_user,
            redirect_to: pending.redirect_to,
        })
    }
}
