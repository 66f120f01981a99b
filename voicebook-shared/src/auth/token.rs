/// Opaque token generation and hashing
///
/// Renewal tokens, exchange codes, OAuth states and API tokens are all
/// opaque random strings. Only their SHA-256 hex digest is ever stored.
///
/// # Format
///
/// 43 characters from the URL-safe alphabet `[A-Za-z0-9_-]` (about 256 bits
/// of entropy). API tokens carry an additional `vbk_` prefix so they can be
/// recognized in logs and by secret scanners.
///
/// # Example
///
/// ```
/// use voicebook_shared::auth::token::{generate_api_token, hash_token};
///
/// let (token, hash) = generate_api_token();
/// assert!(token.starts_with("vbk_"));
/// assert_eq!(hash, hash_token(&token));
/// assert_eq!(hash.len(), 64);
/// ```

use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of the random part of every opaque token
pub const TOKEN_RANDOM_LENGTH: usize = 43;

/// Prefix of external API tokens
pub const API_TOKEN_PREFIX: &str = "vbk_";

/// Generates a random URL-safe token
pub fn generate_token() -> String {
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
    let mut rng = rand::thread_rng();

    (0..TOKEN_RANDOM_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Generates a raw token and its hash
pub fn generate_token_pair() -> (String, String) {
    let token = generate_token();
    let hash = hash_token(&token);
    (token, hash)
}

/// Generates a prefixed API token and its hash
pub fn generate_api_token() -> (String, String) {
    let token = format!("{}{}", API_TOKEN_PREFIX, generate_token());
    let hash = hash_token(&token);
    (token, hash)
}

/// Hex-encoded SHA-256 digest of a raw token
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Short prefix safe to write to logs
pub fn log_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(idx, _)| idx)
        .unwrap_or(token.len());
    &token[..end]
}
