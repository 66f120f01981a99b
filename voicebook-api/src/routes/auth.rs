/// Authentication endpoints
///
/// This module provides the login and session lifecycle:
/// - Google OAuth login, ending in a one-time exchange code
/// - Exchange of that code for session tokens
/// - Renewal token rotation
/// - Logout and identity lookups
///
/// # Endpoints
///
/// - `GET /api/auth/google/login` - Redirect to Google consent
/// - `POST /api/auth/google/exchange-code` - Provider code for one-time code
/// - `POST /api/auth/exchange` - One-time code for session tokens
/// - `POST /api/auth/refresh` - Rotate renewal token
/// - `POST /api/auth/logout` - Revoke the caller's session
/// - `GET /api/auth/me` - Current user
/// - `GET /api/auth/status` - Whether the request carries a valid credential

use crate::{
    app::{bearer_token, AppState},
    error::ApiResult,
};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;
use voicebook_shared::auth::{token::log_prefix, AuthKind, SessionIdentity, SessionTokens};

/// Login redirect query
#[derive(Debug, Deserialize)]
pub struct GoogleLoginQuery {
    /// Frontend path to return to after login
    pub redirect: Option<String>,
}

/// Provider callback payload forwarded by the frontend
#[derive(Debug, Deserialize, Validate)]
pub struct ExchangeGoogleCodeRequest {
    #[validate(length(min = 1, message = "code is required"))]
    pub code: String,

    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExchangeGoogleCodeResponse {
    pub success: bool,

    /// One-time code for `POST /api/auth/exchange`
    pub code: String,

    pub new_user: bool,
    pub redirect_to: Option<String>,
}

/// One-time code exchange request
#[derive(Debug, Deserialize, Validate)]
pub struct ExchangeRequest {
    #[validate(length(min = 1, message = "code is required"))]
    pub code: String,
}

/// Refresh token request
#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "refresh_token is required"))]
    pub refresh_token: String,
}

/// Session tokens response
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthSessionResponse {
    pub success: bool,
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub token_type: String,
}

impl From<SessionTokens> for AuthSessionResponse {
    fn from(tokens: SessionTokens) -> Self {
        Self {
            success: true,
            access_token: tokens.access_token,
            refresh_token: tokens.renewal_token,
            access_token_expires_at: tokens.access_expires_at,
            token_type: "Bearer".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub success: bool,
    pub user: UserInfo,
    pub auth_type: AuthKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub authenticated: bool,
    pub auth_type: Option<AuthKind>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Start Google login
///
/// Persists a fresh state and redirects (302) to the provider consent page.
pub async fn google_login(
    State(state): State<AppState>,
    Query(query): Query<GoogleLoginQuery>,
) -> ApiResult<Response> {
    let start = state.login.begin(query.redirect).await?;
    tracing::info!(state_prefix = log_prefix(&start.state), "Redirecting to Google OAuth");

    Ok((StatusCode::FOUND, [(header::LOCATION, start.authorization_url)]).into_response())
}

/// Complete Google login
///
/// # Endpoint
///
/// ```text
/// POST /api/auth/google/exchange-code
/// Content-Type: application/json
///
/// { "code": "<provider code>", "state": "<state from the login redirect>" }
/// ```
///
/// # Errors
///
/// - `401 OAUTH_STATE_INVALID`: Unknown, reused or expired state
/// - `502 OAUTH_PROVIDER_ERROR`: Provider rejected the code
pub async fn exchange_google_code(
    State(state): State<AppState>,
    Json(req): Json<ExchangeGoogleCodeRequest>,
) -> ApiResult<Json<ExchangeGoogleCodeResponse>> {
    req.validate()?;

    let outcome = state.login.complete(&req.state, &req.code).await?;

    Ok(Json(ExchangeGoogleCodeResponse {
        success: true,
        code: outcome.code,
        new_user: outcome.new_user,
        redirect_to: outcome.redirect_to,
    }))
}

/// Trade a one-time exchange code for session tokens
///
/// # Errors
///
/// - `401 EXCHANGE_CODE_INVALID`: Unknown or already used
/// - `401 EXCHANGE_CODE_EXPIRED`
pub async fn exchange(
    State(state): State<AppState>,
    Json(req): Json<ExchangeRequest>,
) -> ApiResult<Json<AuthSessionResponse>> {
    req.validate()?;

    let tokens = state.sessions.issue_session_from_code(&req.code).await?;
    Ok(Json(tokens.into()))
}

/// Rotate the renewal token
///
/// The submitted token is invalid after a successful call.
///
/// # Errors
///
/// - `401 RENEWAL_TOKEN_INVALID`: Unknown, revoked or already rotated
/// - `401 RENEWAL_TOKEN_EXPIRED`
/// - `401 SESSION_INACTIVITY_EXPIRED`
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<AuthSessionResponse>> {
    req.validate()?;

    let tokens = state.sessions.refresh_session(&req.refresh_token).await?;
    Ok(Json(tokens.into()))
}

/// Revoke the caller's session. Idempotent.
pub async fn logout(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
) -> ApiResult<Json<MessageResponse>> {
    let user_id = identity.require_user()?;
    state.sessions.revoke_session(user_id).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Logged out".to_string(),
    }))
}

/// Current user
pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
) -> ApiResult<Json<MeResponse>> {
    let user = match identity.user_id.as_deref() {
        Some(user_id) => {
            let user = state.user(user_id).await?;
            UserInfo {
                id: user.id,
                email: user.email,
                name: user.name,
                picture: user.picture,
            }
        }
        None => UserInfo {
            id: "anonymous".to_string(),
            email: identity.email.clone().unwrap_or_default(),
            name: Some("API User".to_string()),
            picture: None,
        },
    };

    Ok(Json(MeResponse {
        success: true,
        user,
        auth_type: identity.kind,
    }))
}

/// Authentication status; never fails on a bad credential
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<StatusResponse>> {
    let identity = match bearer_token(&headers) {
        Some(token) => state.sessions.validate_access_token(token).await?,
        None => None,
    };

    Ok(Json(StatusResponse {
        success: true,
        authenticated: identity.is_some(),
        auth_type: identity.as_ref().map(|identity| identity.kind),
        user_id: identity.and_then(|identity| identity.user_id),
    }))
}
