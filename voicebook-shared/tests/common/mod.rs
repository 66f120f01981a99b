//! Shared fixtures for integration tests
//!
//! In-process fakes for the spreadsheet and OAuth providers, plus helpers to
//! seed a user into the in-memory credential store.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use voicebook_shared::auth::{SessionConfig, SessionManager};
use voicebook_shared::ledger::sheets::{ledger_url, CreatedLedger, LedgerSummary};
use voicebook_shared::ledger::{LedgerRef, SpreadsheetProvider};
use voicebook_shared::models::user::UpsertUser;
use voicebook_shared::oauth::{OAuthProvider, ProviderUser, TokenGrant};
use voicebook_shared::provider::ProviderError;
use voicebook_shared::store::{CredentialStore, MemoryCredentialStore};

pub const TEST_SECRET: &str = "test-secret-key-at-least-32-bytes-long";
pub const TEST_USER: &str = "google-user-1";
pub const TEST_EMAIL: &str = "user@example.com";

type Partitions = BTreeMap<String, Vec<Vec<String>>>;

/// Spreadsheet provider backed by in-memory worksheets
#[derive(Default)]
pub struct FakeSheets {
    ledgers: Mutex<HashMap<String, Partitions>>,
    failing_reads: Mutex<HashSet<String>>,
    fail_appends: AtomicBool,
    created: AtomicUsize,
    pub append_calls: AtomicUsize,
    pub read_calls: AtomicUsize,
}

impl FakeSheets {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_ledger(&self, ledger_id: &str) {
        self.ledgers
            .lock()
            .unwrap()
            .entry(ledger_id.to_string())
            .or_default();
    }

    /// Creates (or replaces) a worksheet with the given rows, header included
    pub fn seed_partition(&self, ledger_id: &str, partition: &str, rows: &[&[&str]]) {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        self.ledgers
            .lock()
            .unwrap()
            .entry(ledger_id.to_string())
            .or_default()
            .insert(partition.to_string(), rows);
    }

    pub fn rows(&self, ledger_id: &str, partition: &str) -> Option<Vec<Vec<String>>> {
        self.ledgers
            .lock()
            .unwrap()
            .get(ledger_id)
            .and_then(|partitions| partitions.get(partition).cloned())
    }

    pub fn partitions(&self, ledger_id: &str) -> Vec<String> {
        self.ledgers
            .lock()
            .unwrap()
            .get(ledger_id)
            .map(|partitions| partitions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Makes reads of this partition fail with a 500
    pub fn fail_reads_for(&self, partition: &str) {
        self.failing_reads
            .lock()
            .unwrap()
            .insert(partition.to_string());
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    fn server_error() -> ProviderError {
        ProviderError::Status {
            status: 500,
            body: "backend error".to_string(),
        }
    }
}

#[async_trait]
impl SpreadsheetProvider for FakeSheets {
    async fn list_partitions(&self, ledger: &LedgerRef) -> Result<Vec<String>, ProviderError> {
        self.ledgers
            .lock()
            .unwrap()
            .get(&ledger.ledger_id)
            .map(|partitions| partitions.keys().cloned().collect())
            .ok_or_else(|| ProviderError::NotFound(ledger.ledger_id.clone()))
    }

    async fn create_partition(&self, ledger: &LedgerRef, name: &str) -> Result<(), ProviderError> {
        let mut ledgers = self.ledgers.lock().unwrap();
        let partitions = ledgers
            .get_mut(&ledger.ledger_id)
            .ok_or_else(|| ProviderError::NotFound(ledger.ledger_id.clone()))?;
        partitions.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn read_range(
        &self,
        ledger: &LedgerRef,
        partition: &str,
    ) -> Result<Vec<Vec<String>>, ProviderError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_reads.lock().unwrap().contains(partition) {
            return Err(Self::server_error());
        }
        self.rows(&ledger.ledger_id, partition)
            .ok_or_else(|| ProviderError::NotFound(partition.to_string()))
    }

    async fn append_row(
        &self,
        ledger: &LedgerRef,
        partition: &str,
        row: &[String],
    ) -> Result<(), ProviderError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }

        let mut ledgers = self.ledgers.lock().unwrap();
        let rows = ledgers
            .get_mut(&ledger.ledger_id)
            .and_then(|partitions| partitions.get_mut(partition))
            .ok_or_else(|| ProviderError::NotFound(partition.to_string()))?;
        rows.push(row.to_vec());
        Ok(())
    }

    async fn create_ledger(
        &self,
        _access_token: &str,
        title: &str,
    ) -> Result<CreatedLedger, ProviderError> {
        let id = format!("ledger-{}", self.created.fetch_add(1, Ordering::SeqCst) + 1);
        self.add_ledger(&id);
        Ok(CreatedLedger {
            url: ledger_url(&id),
            id,
            name: title.to_string(),
        })
    }

    async fn list_ledgers(&self, _access_token: &str) -> Result<Vec<LedgerSummary>, ProviderError> {
        let mut ids: Vec<String> = self.ledgers.lock().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids
            .into_iter()
            .map(|id| LedgerSummary {
                url: ledger_url(&id),
                name: id.clone(),
                id,
                modified_time: None,
            })
            .collect())
    }
}

/// OAuth provider with a configurable refresh outcome
pub struct FakeOAuth {
    pub refresh_result: Mutex<Result<TokenGrant, ProviderError>>,
    pub refresh_calls: AtomicUsize,
    pub user: ProviderUser,
}

impl FakeOAuth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            refresh_result: Mutex::new(Ok(grant("refreshed-access", None, Utc::now() + Duration::hours(1)))),
            refresh_calls: AtomicUsize::new(0),
            user: ProviderUser {
                id: TEST_USER.to_string(),
                email: TEST_EMAIL.to_string(),
                name: Some("Test User".to_string()),
                picture: None,
            },
        })
    }

    pub fn set_refresh_result(&self, result: Result<TokenGrant, ProviderError>) {
        *self.refresh_result.lock().unwrap() = result;
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthProvider for FakeOAuth {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://accounts.example.com/auth?state={}", state)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        if code == "bad-code" {
            return Err(ProviderError::Status {
                status: 400,
                body: "invalid_grant".to_string(),
            });
        }
        Ok(grant(
            "provider-access",
            Some("provider-refresh"),
            Utc::now() + Duration::hours(1),
        ))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_result.lock().unwrap().clone()
    }

    async fn user_info(&self, _access_token: &str) -> Result<ProviderUser, ProviderError> {
        Ok(self.user.clone())
    }
}

pub fn grant(access: &str, refresh: Option<&str>, expires_at: DateTime<Utc>) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_at: Some(expires_at),
        scope: None,
    }
}

/// Store with [`TEST_USER`] already registered
pub async fn store_with_user() -> Arc<MemoryCredentialStore> {
    let store = Arc::new(MemoryCredentialStore::new());
    store
        .upsert_user(&UpsertUser {
            id: TEST_USER.to_string(),
            email: TEST_EMAIL.to_string(),
            name: Some("Test User".to_string()),
            picture: None,
        })
        .await
        .unwrap();
    store
}

pub fn session_manager(store: Arc<MemoryCredentialStore>) -> SessionManager {
    SessionManager::new(store, SessionConfig::new(TEST_SECRET))
}

/// Header followed by data rows, as the spreadsheet returns them
pub fn header() -> &'static [&'static str] {
    &["time", "name", "category", "amount", "currency", "payment_method"]
}
