//! # Voicebook Shared Library
//!
//! Core of the voice bookkeeping service: sessions, delegated provider
//! access and the month-partitioned ledger. The HTTP server in
//! `voicebook-api` is a thin layer over these components.
//!
//! ## Module Organization
//!
//! - `store`: Credential store trait with PostgreSQL and in-memory backends
//! - `auth`: Access tokens, renewal rotation, exchange codes, API tokens, login
//! - `oauth`: Delegated OAuth provider contract, Google client, access broker
//! - `ledger`: Partition keys, the ledger store and the Google Sheets client
//! - `assistant`: Text-to-entry parsing and spending answers
//! - `models`: Persisted records
//! - `db`: Connection pool and migrations
//! - `provider`: Shared HTTP client and provider errors
//! - `error`: Error classification shared by all components

pub mod assistant;
pub mod auth;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod oauth;
pub mod provider;
pub mod store;

/// Current version of the Voicebook shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
