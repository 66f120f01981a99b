/// Session and credential lifecycle
///
/// [`SessionManager`] issues short-lived access tokens (signed JWTs) and
/// long-lived opaque renewal tokens, trades one-time exchange codes for
/// sessions, rotates renewal tokens on every refresh, and validates bearer
/// credentials in a fixed order: signed access token first, opaque API token
/// second.
///
/// # Renewal token lifecycle
///
/// ```text
/// issued -> active -> { revoked | expired | inactivity-expired }
/// ```
///
/// Terminal states are absorbing. Each successful refresh replaces the
/// user's renewal token with a new one, so the previous raw value stops
/// working immediately. Two concurrent refreshes with the same raw value
/// race on a compare-and-swap in the store; the loser fails with
/// [`SessionError::RenewalTokenInvalid`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use voicebook_shared::auth::session::{SessionConfig, SessionManager};
/// use voicebook_shared::store::MemoryCredentialStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(MemoryCredentialStore::new());
/// let sessions = SessionManager::new(store, SessionConfig::new("secret-key-at-least-32-bytes-long!"));
///
/// let code = sessions.create_exchange_code("google-123").await?;
/// let tokens = sessions.issue_session_from_code(&code).await?;
/// let rotated = sessions.refresh_session(&tokens.renewal_token).await?;
/// # Ok(())
/// # }
/// ```

use super::jwt::{self, Claims, JwtError};
use super::token::{generate_api_token, generate_token_pair, hash_token, log_prefix};
use crate::error::{Classify, ErrorKind};
use crate::models::{
    api_token::ApiToken, exchange_code::ExchangeCode, renewal_token::RenewalToken, user::User,
};
use crate::store::{CredentialStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Maximum length of an API token description
pub const MAX_DESCRIPTION_LENGTH: usize = 200;

/// Maximum API token lifetime in days
pub const MAX_API_TOKEN_DAYS: u32 = 3650;

/// Error type for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Exchange code is unknown or was already used
    #[error("Exchange code is invalid or already used")]
    ExchangeCodeInvalid,

    /// Exchange code is past its expiry
    #[error("Exchange code has expired")]
    ExchangeCodeExpired,

    /// A credential references a user that does not exist
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Renewal token is unknown, revoked or was rotated away
    #[error("Renewal token is invalid")]
    RenewalTokenInvalid,

    /// Renewal token is past its absolute expiry
    #[error("Renewal token has expired")]
    RenewalTokenExpired,

    /// Renewal token was unused for longer than the inactivity window
    #[error("Session expired due to inactivity")]
    SessionInactivityExpired,

    /// Identity is authenticated but not bound to a user
    #[error("Credential is not linked to a user")]
    UnboundIdentity,

    /// API token does not exist or is not owned by the caller
    #[error("API token not found")]
    ApiTokenNotFound,

    /// Malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Token(#[from] JwtError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Classify for SessionError {
    fn kind(&self) -> ErrorKind {
        match self {
            SessionError::ExchangeCodeInvalid
            | SessionError::ExchangeCodeExpired
            | SessionError::RenewalTokenInvalid
            | SessionError::RenewalTokenExpired
            | SessionError::SessionInactivityExpired => ErrorKind::Authentication,
            SessionError::UnboundIdentity => ErrorKind::Authorization,
            SessionError::ApiTokenNotFound => ErrorKind::NotFound,
            SessionError::InvalidInput(_) => ErrorKind::Validation,
            // A dangling user reference means the store is corrupt
            SessionError::UserNotFound(_) | SessionError::Token(_) | SessionError::Store(_) => {
                ErrorKind::Internal
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            SessionError::ExchangeCodeInvalid => "EXCHANGE_CODE_INVALID",
            SessionError::ExchangeCodeExpired => "EXCHANGE_CODE_EXPIRED",
            SessionError::UserNotFound(_) => "USER_NOT_FOUND",
            SessionError::RenewalTokenInvalid => "RENEWAL_TOKEN_INVALID",
            SessionError::RenewalTokenExpired => "RENEWAL_TOKEN_EXPIRED",
            SessionError::SessionInactivityExpired => "SESSION_INACTIVITY_EXPIRED",
            SessionError::UnboundIdentity => "TOKEN_NOT_LINKED",
            SessionError::ApiTokenNotFound => "API_TOKEN_NOT_FOUND",
            SessionError::InvalidInput(_) => "VALIDATION_ERROR",
            SessionError::Token(_) => "TOKEN_ERROR",
            SessionError::Store(_) => "STORE_ERROR",
        }
    }
}

/// Session timing and signing configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HS256 signing secret
    pub jwt_secret: String,

    /// Access token lifetime
    pub access_token_ttl: Duration,

    /// Absolute renewal token lifetime (None = no absolute expiry)
    pub renewal_token_ttl: Option<Duration>,

    /// Maximum time between uses of a renewal token
    pub inactivity_window: Duration,

    /// One-time exchange code lifetime
    pub exchange_code_ttl: Duration,
}

impl SessionConfig {
    /// Default timings with the given secret
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_token_ttl: Duration::minutes(60),
            renewal_token_ttl: Some(Duration::hours(720)),
            inactivity_window: Duration::hours(48),
            exchange_code_ttl: Duration::minutes(5),
        }
    }
}

/// Tokens returned when a session is issued or refreshed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub renewal_token: String,
    pub access_expires_at: DateTime<Utc>,
}

/// How a request authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    /// Signed short-lived access token
    Session,

    /// Opaque external API token
    ApiToken,
}

/// Identity resolved from a bearer credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Owning user (None for unbound API tokens)
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub kind: AuthKind,
}

impl SessionIdentity {
    /// Returns the bound user id or [`SessionError::UnboundIdentity`]
    pub fn require_user(&self) -> Result<&str, SessionError> {
        self.user_id.as_deref().ok_or(SessionError::UnboundIdentity)
    }
}

/// Newly issued API token. The raw value is only available here.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedApiToken {
    pub token: String,

    #[serde(flatten)]
    pub record: ApiToken,
}

/// Issues, rotates, validates and revokes session credentials
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Mints a one-time exchange code for a user who just completed login
    ///
    /// Returns the raw code; only its hash is stored.
    pub async fn create_exchange_code(&self, user_id: &str) -> Result<String, SessionError> {
        let now = Utc::now();
        let (code, code_hash) = generate_token_pair();

        self.store
            .insert_exchange_code(&ExchangeCode {
                code_hash,
                user_id: user_id.to_string(),
                issued_at: now,
                expires_at: now + self.config.exchange_code_ttl,
                used_at: None,
            })
            .await?;

        debug!(user_id = %user_id, "Exchange code created");
        Ok(code)
    }

    /// Trades a one-time exchange code for a new session
    ///
    /// # Errors
    ///
    /// - `ExchangeCodeInvalid` if the code is unknown or already used,
    ///   including when a concurrent caller consumed it first
    /// - `ExchangeCodeExpired` if the code is past its expiry
    /// - `UserNotFound` if the owning user is missing
    pub async fn issue_session_from_code(&self, raw_code: &str) -> Result<SessionTokens, SessionError> {
        let now = Utc::now();
        let code_hash = hash_token(raw_code);

        let code = self
            .store
            .find_exchange_code(&code_hash)
            .await?
            .ok_or(SessionError::ExchangeCodeInvalid)?;

        if code.is_used() {
            warn!(user_id = %code.user_id, "Exchange code reused");
            return Err(SessionError::ExchangeCodeInvalid);
        }

        if code.is_expired_at(now) {
            return Err(SessionError::ExchangeCodeExpired);
        }

        if !self.store.consume_exchange_code(&code_hash, now).await? {
            warn!(user_id = %code.user_id, "Exchange code consumed concurrently");
            return Err(SessionError::ExchangeCodeInvalid);
        }

        let user = self
            .store
            .find_user(&code.user_id)
            .await?
            .ok_or_else(|| SessionError::UserNotFound(code.user_id.clone()))?;

        let (tokens, renewal) = self.mint_session(&user, now)?;
        self.store.replace_renewal_token(&renewal).await?;

        info!(user_id = %user.id, "Session issued from exchange code");
        Ok(tokens)
    }

    /// Rotates a renewal token and mints a fresh access token
    ///
    /// Expired and inactive tokens are revoked as a side effect before the
    /// error is returned.
    pub async fn refresh_session(&self, raw_renewal_token: &str) -> Result<SessionTokens, SessionError> {
        let now = Utc::now();
        let token_hash = hash_token(raw_renewal_token);

        let current = self
            .store
            .find_renewal_token(&token_hash)
            .await?
            .ok_or(SessionError::RenewalTokenInvalid)?;

        if current.is_revoked() {
            debug!(user_id = %current.user_id, "Revoked renewal token presented");
            return Err(SessionError::RenewalTokenInvalid);
        }

        if current.is_expired_at(now) {
            self.store.revoke_renewal_token(&token_hash, now).await?;
            info!(user_id = %current.user_id, "Renewal token expired, revoked");
            return Err(SessionError::RenewalTokenExpired);
        }

        if current.is_inactive_at(now, self.config.inactivity_window) {
            self.store.revoke_renewal_token(&token_hash, now).await?;
            info!(
                user_id = %current.user_id,
                last_used_at = %current.last_used_at,
                "Session inactive too long, revoked"
            );
            return Err(SessionError::SessionInactivityExpired);
        }

        let user = self
            .store
            .find_user(&current.user_id)
            .await?
            .ok_or_else(|| SessionError::UserNotFound(current.user_id.clone()))?;

        let (tokens, next) = self.mint_session(&user, now)?;

        if !self.store.rotate_renewal_token(&token_hash, &next).await? {
            warn!(user_id = %user.id, "Renewal token rotated concurrently");
            return Err(SessionError::RenewalTokenInvalid);
        }

        debug!(user_id = %user.id, "Session refreshed");
        Ok(tokens)
    }

    /// Resolves a bearer credential to an identity
    ///
    /// Tries the signed access-token path first; on any failure falls back to
    /// an opaque API token lookup, which records the token's use. Returns
    /// `Ok(None)` when neither path accepts the credential.
    pub async fn validate_access_token(
        &self,
        token: &str,
    ) -> Result<Option<SessionIdentity>, SessionError> {
        match jwt::validate_access_token(token, &self.config.jwt_secret) {
            Ok(claims) => {
                return Ok(Some(SessionIdentity {
                    user_id: Some(claims.sub),
                    email: Some(claims.email),
                    kind: AuthKind::Session,
                }))
            }
            Err(e) => debug!(error = %e, "Not a valid access token, trying API token"),
        }

        let api_token = self
            .store
            .touch_active_api_token(&hash_token(token), Utc::now())
            .await?;

        match api_token {
            Some(api_token) => {
                let email = match api_token.user_id.as_deref() {
                    Some(user_id) => self.store.find_user(user_id).await?.map(|user| user.email),
                    None => None,
                };
                Ok(Some(SessionIdentity {
                    user_id: api_token.user_id,
                    email,
                    kind: AuthKind::ApiToken,
                }))
            }
            None => {
                debug!(token_prefix = log_prefix(token), "Bearer credential rejected");
                Ok(None)
            }
        }
    }

    /// Revokes the user's renewal token. Idempotent.
    pub async fn revoke_session(&self, user_id: &str) -> Result<(), SessionError> {
        let revoked = self
            .store
            .revoke_user_renewal_token(user_id, Utc::now())
            .await?;

        info!(user_id = %user_id, revoked, "Session revoked");
        Ok(())
    }

    /// Issues a new external API token for the user
    ///
    /// The raw token is returned once and never stored.
    pub async fn issue_api_token(
        &self,
        user_id: &str,
        description: &str,
        expires_in_days: Option<u32>,
    ) -> Result<IssuedApiToken, SessionError> {
        let description = description.trim();
        if description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(SessionError::InvalidInput(format!(
                "description must be at most {} characters",
                MAX_DESCRIPTION_LENGTH
            )));
        }

        if let Some(days) = expires_in_days {
            if days == 0 || days > MAX_API_TOKEN_DAYS {
                return Err(SessionError::InvalidInput(format!(
                    "expires_in_days must be between 1 and {}",
                    MAX_API_TOKEN_DAYS
                )));
            }
        }

        let now = Utc::now();
        let (token, token_hash) = generate_api_token();
        let record = ApiToken {
            id: Uuid::new_v4(),
            user_id: Some(user_id.to_string()),
            token_hash,
            description: description.to_string(),
            is_active: true,
            created_at: now,
            expires_at: expires_in_days.map(|days| now + Duration::days(i64::from(days))),
            last_used_at: None,
        };

        self.store.insert_api_token(&record).await?;

        info!(user_id = %user_id, token_id = %record.id, "API token issued");
        Ok(IssuedApiToken { token, record })
    }

    /// Active API tokens owned by the user
    pub async fn list_api_tokens(&self, user_id: &str) -> Result<Vec<ApiToken>, SessionError> {
        Ok(self.store.list_active_api_tokens(user_id).await?)
    }

    /// Deactivates one of the user's API tokens
    pub async fn revoke_api_token(&self, user_id: &str, token_id: Uuid) -> Result<(), SessionError> {
        if !self.store.deactivate_api_token(token_id, user_id).await? {
            return Err(SessionError::ApiTokenNotFound);
        }

        info!(user_id = %user_id, token_id = %token_id, "API token revoked");
        Ok(())
    }

    fn mint_session(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<(SessionTokens, RenewalToken), SessionError> {
        let claims = Claims::access_at(&user.id, &user.email, now, self.config.access_token_ttl);
        let access_token = jwt::create_token(&claims, &self.config.jwt_secret)?;

        let (renewal_token, renewal_hash) = generate_token_pair();
        let renewal = RenewalToken::issue(
            &user.id,
            renewal_hash,
            now,
            self.config.renewal_token_ttl,
        );

        Ok((
            SessionTokens {
                access_token,
                renewal_token,
                access_expires_at: claims.expires_at(),
            },
            renewal,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::new("secret");
        assert_eq!(config.access_token_ttl, Duration::minutes(60));
        assert_eq!(config.inactivity_window, Duration::hours(48));
        assert_eq!(config.exchange_code_ttl, Duration::minutes(5));
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(SessionError::RenewalTokenInvalid.kind(), ErrorKind::Authentication);
        assert_eq!(SessionError::SessionInactivityExpired.code(), "SESSION_INACTIVITY_EXPIRED");
        assert_eq!(SessionError::UnboundIdentity.kind(), ErrorKind::Authorization);
        assert_eq!(SessionError::UserNotFound("u1".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_require_user() {
        let bound = SessionIdentity {
            user_id: Some("u1".to_string()),
            email: None,
            kind: AuthKind::ApiToken,
        };
        assert_eq!(bound.require_user().unwrap(), "u1");

        let unbound = SessionIdentity {
            user_id: None,
            email: None,
            kind: AuthKind::ApiToken,
        };
        assert!(matches!(unbound.require_user(), Err(SessionError::UnboundIdentity)));
    }
}
