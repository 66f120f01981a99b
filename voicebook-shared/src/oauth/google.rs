/// Google OAuth 2.0 client
///
/// Implements [`OAuthProvider`] against Google's authorization, token and
/// userinfo endpoints. Requests offline access with forced consent so a
/// refresh token is issued on the first login.

use super::provider::{OAuthProvider, ProviderUser, TokenGrant};
use crate::provider::{check_status, ProviderError};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Scopes needed for login and for managing the user's ledger spreadsheets
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.readonly",
];

/// Google OAuth client configuration
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl GoogleOAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    id: String,
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

/// Google [`OAuthProvider`]
#[derive(Debug, Clone)]
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    config: GoogleOAuthConfig,
}

impl GoogleOAuthClient {
    /// Creates a client on top of a shared HTTP client (which carries the
    /// request timeout)
    pub fn new(http: reqwest::Client, config: GoogleOAuthConfig) -> Self {
        Self { http, config }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, ProviderError> {
        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .inspect_err(|e| warn!(error = %e, "Token endpoint request failed"))?;

        let body: TokenResponse = check_status(response).await?.json().await?;

        Ok(TokenGrant {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_at: TokenGrant::expiry_from(Utc::now(), body.expires_in),
            scope: body.scope,
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthClient {
    fn authorization_url(&self, state: &str) -> String {
        let scope = self.config.scopes.join(" ");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("include_granted_scopes", "true"),
        ];

        match reqwest::Url::parse_with_params(AUTHORIZE_ENDPOINT, &params) {
            Ok(url) => url.into(),
            // The endpoint is a constant, so parsing cannot fail
            Err(_) => AUTHORIZE_ENDPOINT.to_string(),
        }
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        debug!("Exchanging authorization code");
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        debug!("Refreshing delegated access token");
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ])
        .await
    }

    async fn user_info(&self, access_token: &str) -> Result<ProviderUser, ProviderError> {
        let response = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await?;

        let body: UserInfoResponse = check_status(response).await?.json().await?;

        Ok(ProviderUser {
            id: body.id,
            email: body.email,
            name: body.name,
            picture: body.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url_requests_offline_consent() {
        let client = GoogleOAuthClient::new(
            reqwest::Client::new(),
            GoogleOAuthConfig::new("client-1", "secret", "https://app.example.com/callback"),
        );

        let url = client.authorization_url("state-123");
        assert!(url.starts_with(AUTHORIZE_ENDPOINT));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("state=state-123"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fcallback"));
    }
}
