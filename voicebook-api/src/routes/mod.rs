/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Login, session exchange, refresh and logout
/// - `api_tokens`: External API token management
/// - `settings`: Per-user timezone and budget
/// - `sheets`: Ledger spreadsheet binding
/// - `accounting`: Recording entries and reading aggregates

pub mod accounting;
pub mod api_tokens;
pub mod auth;
pub mod health;
pub mod settings;
pub mod sheets;
