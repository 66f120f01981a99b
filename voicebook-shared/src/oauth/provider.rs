/// OAuth provider contract
///
/// The service only implements the client side of the authorization-code
/// flow. Everything protocol-level is delegated to an [`OAuthProvider`].

use crate::provider::ProviderError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token material returned by the provider's token endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,

    /// Present on first consent and occasionally on refresh
    pub refresh_token: Option<String>,

    /// None when the provider reports no expiry
    pub expires_at: Option<DateTime<Utc>>,

    pub scope: Option<String>,
}

impl TokenGrant {
    /// Converts a relative `expires_in` (seconds) into an absolute expiry
    pub fn expiry_from(now: DateTime<Utc>, expires_in: Option<i64>) -> Option<DateTime<Utc>> {
        expires_in.map(|seconds| now + Duration::seconds(seconds))
    }
}

/// Profile returned by the provider's userinfo endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Delegated OAuth provider
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// URL the browser is sent to, carrying the opaque `state`
    fn authorization_url(&self, state: &str) -> String;

    /// Exchanges an authorization code for tokens
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError>;

    /// Obtains a new access token from a refresh token
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError>;

    /// Fetches the profile of the token's owner
    async fn user_info(&self, access_token: &str) -> Result<ProviderUser, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_from_relative_seconds() {
        let now = Utc::now();
        assert_eq!(
            TokenGrant::expiry_from(now, Some(3599)),
            Some(now + Duration::seconds(3599))
        );
        assert_eq!(TokenGrant::expiry_from(now, None), None);
    }
}
