/// Persistent records owned by the credential store
///
/// # Models
///
/// - `user`: User accounts keyed by the provider's stable id
/// - `delegated_credential`: OAuth access/refresh pair used on the user's behalf
/// - `renewal_token`: Rotating session refresh token (one per user)
/// - `exchange_code`: Single-use code bridging the OAuth redirect to a session
/// - `api_token`: Long-lived opaque tokens for external clients
/// - `oauth_state`: Pending OAuth `state` values with a TTL
/// - `ledger_binding`: The spreadsheet a user's ledger lives in
///
/// Secrets are never stored raw: every token-like record keeps only the
/// SHA-256 hash of its value (see [`crate::auth::token`]).

pub mod api_token;
pub mod delegated_credential;
pub mod exchange_code;
pub mod ledger_binding;
pub mod oauth_state;
pub mod renewal_token;
pub mod user;
