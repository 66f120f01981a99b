/// Access token signing and validation
///
/// Access tokens are short-lived JWTs signed with HS256. They carry the user
/// id, email, issuance and expiry times, and a `type` discriminator so a
/// token minted for another purpose is never accepted as an access token.
///
/// # Example
///
/// ```
/// use voicebook_shared::auth::jwt::{create_token, validate_access_token, Claims};
/// use chrono::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = "your-secret-key-at-least-32-bytes-long";
/// let claims = Claims::access("google-123", "user@example.com", Duration::minutes(60));
/// let token = create_token(&claims, secret)?;
///
/// let validated = validate_access_token(&token, secret)?;
/// assert_eq!(validated.sub, "google-123");
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Issuer embedded in every token
pub const ISSUER: &str = "voicebook";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Signature, format or claim validation failed
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Token carries a different type discriminator
    #[error("Expected {expected} token, got {actual}")]
    WrongType { expected: String, actual: String },
}

/// Token type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived bearer credential
    Access,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
        }
    }
}

/// JWT claims
///
/// - `sub`: user id
/// - `email`: user email
/// - `iss`: always [`ISSUER`]
/// - `iat` / `nbf` / `exp`: Unix timestamps
/// - `type`: token type discriminator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,

    #[serde(rename = "type")]
    pub token_type: TokenType,
}

impl Claims {
    /// Creates access-token claims expiring `expires_in` from now
    pub fn access(user_id: impl Into<String>, email: impl Into<String>, expires_in: Duration) -> Self {
        Self::access_at(user_id, email, Utc::now(), expires_in)
    }

    /// Creates access-token claims issued at `now`
    pub fn access_at(
        user_id: impl Into<String>,
        email: impl Into<String>,
        now: DateTime<Utc>,
        expires_in: Duration,
    ) -> Self {
        Self {
            sub: user_id.into(),
            email: email.into(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            token_type: TokenType::Access,
        }
    }

    /// Expiry as a timestamp
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Signs claims with HS256
///
/// # Errors
///
/// Returns `JwtError::CreateError` if encoding fails
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Verifies signature, expiry, not-before and issuer, and returns the claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}

/// Validates the token and checks its type discriminator is `access`
pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != TokenType::Access {
        return Err(JwtError::WrongType {
            expected: TokenType::Access.as_str().to_string(),
            actual: claims.token_type.as_str().to_string(),
        });
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_claims_creation() {
        let claims = Claims::access("u1", "u1@example.com", Duration::minutes(60));

        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.email, "u1@example.com");
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_type_serialized_as_type_field() {
        let claims = Claims::access("u1", "u1@example.com", Duration::minutes(1));
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["type"], "access");
    }

    #[test]
    fn test_create_and_validate_token() {
        let claims = Claims::access("u1", "u1@example.com", Duration::minutes(60));
        let token = create_token(&claims, SECRET).expect("Should create token");

        let validated = validate_access_token(&token, SECRET).expect("Should validate token");
        assert_eq!(validated.sub, "u1");
        assert_eq!(validated.email, "u1@example.com");
    }

    #[test]
    fn test_validate_with_wrong_secret() {
        let claims = Claims::access("u1", "u1@example.com", Duration::minutes(60));
        let token = create_token(&claims, SECRET).unwrap();

        assert!(validate_token(&token, "another-secret-key-at-least-32-bytes").is_err());
    }

    #[test]
    fn test_validate_expired_token() {
        let claims = Claims::access_at(
            "u1",
            "u1@example.com",
            Utc::now() - Duration::hours(2),
            Duration::hours(1),
        );
        assert!(claims.is_expired());

        let token = create_token(&claims, SECRET).unwrap();
        let result = validate_token(&token, SECRET);
        assert!(matches!(result, Err(JwtError::Expired)));
    }

    #[test]
    fn test_missing_type_rejected() {
        #[derive(Serialize)]
        struct Untyped<'a> {
            sub: &'a str,
            email: &'a str,
            iss: &'a str,
            iat: i64,
            exp: i64,
            nbf: i64,
        }

        let now = Utc::now().timestamp();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &Untyped {
                sub: "u1",
                email: "u1@example.com",
                iss: ISSUER,
                iat: now,
                exp: now + 600,
                nbf: now,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(validate_access_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            validate_token("vbk_not-a-jwt", SECRET),
            Err(JwtError::ValidationError(_))
        ));
    }
}
