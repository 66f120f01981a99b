/// Error classification shared by every core component
///
/// Each component keeps its own `thiserror` enum, but all of them can be
/// classified into one of a small number of kinds. Request handlers use the
/// kind to choose a response status and the code as the stable
/// machine-readable identifier sent to clients.
///
/// # Example
///
/// ```
/// use voicebook_shared::error::{Classify, ErrorKind};
/// use voicebook_shared::auth::session::SessionError;
///
/// let err = SessionError::RenewalTokenInvalid;
/// assert_eq!(err.kind(), ErrorKind::Authentication);
/// assert_eq!(err.code(), "RENEWAL_TOKEN_INVALID");
/// ```

use serde::Serialize;

/// Broad error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing, invalid or expired credential. The user must re-authenticate.
    Authentication,

    /// Valid identity without the binding the operation needs
    Authorization,

    /// OAuth, spreadsheet or assistant provider failure
    ExternalService,

    /// Malformed input
    Validation,

    /// Missing user or ledger binding
    NotFound,

    /// Store failure or broken invariant
    Internal,
}

/// Classification implemented by every core error type
pub trait Classify {
    /// Error category
    fn kind(&self) -> ErrorKind;

    /// Stable upper-snake machine code
    fn code(&self) -> &'static str;
}
