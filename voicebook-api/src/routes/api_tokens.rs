/// External API token endpoints
///
/// API tokens let shortcuts and scripts reach the bookkeeping endpoints
/// without an interactive login. Only a Google session may mint them.
///
/// # Endpoints
///
/// - `GET /api/auth/token/verify` - Describe the caller's credential
/// - `POST /api/auth/token/generate` - Issue an API token
/// - `GET /api/auth/token/list` - List active API tokens
/// - `DELETE /api/auth/token/:id` - Revoke an API token

use crate::{
    app::{require_session_login, AppState},
    error::ApiResult,
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use voicebook_shared::{
    auth::{AuthKind, SessionIdentity},
    models::api_token::ApiToken,
};

/// Issue API token request
#[derive(Debug, Default, Deserialize, Validate)]
pub struct GenerateTokenRequest {
    #[serde(default)]
    #[validate(length(max = 100, message = "description must be at most 100 characters"))]
    pub description: String,

    /// Lifetime in days; omitted means the token never expires
    #[validate(range(min = 1, max = 3650, message = "expires_in_days must be between 1 and 3650"))]
    pub expires_in_days: Option<u32>,
}

/// Issued token; `token` is never shown again
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateTokenResponse {
    pub success: bool,
    pub id: Uuid,
    pub token: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenListItem {
    pub id: Uuid,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl From<ApiToken> for TokenListItem {
    fn from(token: ApiToken) -> Self {
        Self {
            id: token.id,
            description: token.description,
            created_at: token.created_at,
            expires_at: token.expires_at,
            last_used_at: token.last_used_at,
            is_active: token.is_active,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListTokensResponse {
    pub success: bool,
    pub tokens: Vec<TokenListItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyTokenResponse {
    pub success: bool,
    pub valid: bool,
    pub auth_type: AuthKind,
    pub user_id: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeTokenResponse {
    pub success: bool,
    pub revoked: bool,
}

/// Describe the credential the request was authenticated with
pub async fn verify_token(
    Extension(identity): Extension<SessionIdentity>,
) -> ApiResult<Json<VerifyTokenResponse>> {
    Ok(Json(VerifyTokenResponse {
        success: true,
        valid: true,
        auth_type: identity.kind,
        user_id: identity.user_id,
        email: identity.email,
    }))
}

/// Issue a new API token
///
/// # Endpoint
///
/// ```text
/// POST /api/auth/token/generate
/// Authorization: Bearer <access token>
///
/// { "description": "iPhone shortcut", "expires_in_days": 365 }
/// ```
///
/// # Errors
///
/// - `403 FORBIDDEN`: Caller authenticated with an API token
/// - `422 VALIDATION_ERROR`: Description too long or lifetime out of range
pub async fn generate_token(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Json(req): Json<GenerateTokenRequest>,
) -> ApiResult<Json<GenerateTokenResponse>> {
    req.validate()?;

    let user_id = require_session_login(&identity)?;
    let issued = state
        .sessions
        .issue_api_token(user_id, &req.description, req.expires_in_days)
        .await?;

    Ok(Json(GenerateTokenResponse {
        success: true,
        id: issued.record.id,
        token: issued.token,
        description: issued.record.description,
        created_at: issued.record.created_at,
        expires_at: issued.record.expires_at,
    }))
}

/// Active API tokens owned by the caller
pub async fn list_tokens(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
) -> ApiResult<Json<ListTokensResponse>> {
    let user_id = identity.require_user()?;
    let tokens = state.sessions.list_api_tokens(user_id).await?;

    Ok(Json(ListTokensResponse {
        success: true,
        tokens: tokens.into_iter().map(TokenListItem::from).collect(),
    }))
}

/// Revoke one of the caller's API tokens
///
/// # Errors
///
/// - `404 API_TOKEN_NOT_FOUND`: Unknown id or owned by someone else
pub async fn revoke_token(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    Path(token_id): Path<Uuid>,
) -> ApiResult<Json<RevokeTokenResponse>> {
    let user_id = identity.require_user()?;
    state.sessions.revoke_api_token(user_id, token_id).await?;

    Ok(Json(RevokeTokenResponse {
        success: true,
        revoked: true,
    }))
}
