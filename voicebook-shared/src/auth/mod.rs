/// Authentication
///
/// # Modules
///
/// - [`jwt`]: HS256 access tokens with a type discriminator
/// - [`token`]: Opaque random tokens, stored only as SHA-256 hashes
/// - [`session`]: Session issue, refresh, validation and revocation
/// - [`login`]: OAuth login orchestration ending in a one-time exchange code
///
/// # Flow
///
/// ```text
/// browser -> LoginFlow::begin -> provider consent -> LoginFlow::complete
///         -> one-time code -> SessionManager::issue_session_from_code
///         -> access + renewal tokens -> SessionManager::refresh_session ...
/// ```

pub mod jwt;
pub mod login;
pub mod session;
pub mod token;

pub use session::{AuthKind, SessionConfig, SessionError, SessionIdentity, SessionManager, SessionTokens};
