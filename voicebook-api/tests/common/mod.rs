//! Common test utilities for API integration tests
//!
//! Builds the full router over an in-memory credential store and in-process
//! fakes for Google OAuth, Google Sheets and the assistant.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use voicebook_api::app::{build_router, AppState, Providers};
use voicebook_api::config::Config;
use voicebook_shared::assistant::{
    entry_from_json, AnswerContext, Answerer, AssistantError, EntryParser, ParseContext,
};
use voicebook_shared::ledger::sheets::{ledger_url, CreatedLedger, LedgerSummary};
use voicebook_shared::ledger::{LedgerEntry, LedgerRef, MonthlyStats, SpreadsheetProvider};
use voicebook_shared::models::delegated_credential::DelegatedCredential;
use voicebook_shared::models::user::UpsertUser;
use voicebook_shared::oauth::{OAuthProvider, ProviderUser, TokenGrant};
use voicebook_shared::provider::ProviderError;
use voicebook_shared::store::{CredentialStore, MemoryCredentialStore};

pub const TEST_SECRET: &str = "test-secret-key-at-least-32-bytes-long";
pub const TEST_USER: &str = "google-user-1";
pub const TEST_EMAIL: &str = "user@example.com";

/// Spreadsheet provider backed by in-memory worksheets
#[derive(Default)]
pub struct FakeSheets {
    ledgers: Mutex<HashMap<String, BTreeMap<String, Vec<Vec<String>>>>>,
    created: AtomicUsize,
    pub fail_appends: AtomicBool,
}

impl FakeSheets {
    pub fn add_ledger(&self, ledger_id: &str) {
        self.ledgers
            .lock()
            .unwrap()
            .entry(ledger_id.to_string())
            .or_default();
    }

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

    pub fn rows(&self, ledger_id: &str, partition: &str) -> Vec<Vec<String>> {
        self.ledgers
            .lock()
            .unwrap()
            .get(ledger_id)
            .and_then(|partitions| partitions.get(partition).cloned())
            .unwrap_or_default()
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
        self.ledgers
            .lock()
            .unwrap()
            .get(&ledger.ledger_id)
            .and_then(|partitions| partitions.get(partition).cloned())
            .ok_or_else(|| ProviderError::NotFound(partition.to_string()))
    }

    async fn append_row(
        &self,
        ledger: &LedgerRef,
        partition: &str,
        row: &[String],
    ) -> Result<(), ProviderError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                status: 500,
                body: "backend error".to_string(),
            });
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

/// OAuth provider that accepts any code except `bad-code`
pub struct FakeOAuth;

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
        Ok(TokenGrant {
            access_token: "provider-access".to_string(),
            refresh_token: Some("provider-refresh".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            scope: None,
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        Ok(TokenGrant {
            access_token: "refreshed-access".to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now() + Duration::hours(1)),
            scope: None,
        })
    }

    async fn user_info(&self, _access_token: &str) -> Result<ProviderUser, ProviderError> {
        Ok(ProviderUser {
            id: TEST_USER.to_string(),
            email: TEST_EMAIL.to_string(),
            name: Some("Test User".to_string()),
            picture: None,
        })
    }
}

/// Parses `"<name> <amount>"`; anything else is a parse failure
pub struct FakeParser;

#[async_trait]
impl EntryParser for FakeParser {
    async fn parse(&self, text: &str, context: &ParseContext) -> Result<LedgerEntry, AssistantError> {
        let mut words = text.split_whitespace();
        match (words.next(), words.next()) {
            (Some(name), Some(amount)) => entry_from_json(
                &json!({ "name": name, "amount": amount, "category": "飲食" }),
                context,
            ),
            _ => Err(AssistantError::Parse(format!("cannot parse '{}'", text))),
        }
    }
}

/// Answers with the month's total unless told to fail
#[derive(Default)]
pub struct FakeAnswerer {
    pub fail: AtomicBool,
}

#[async_trait]
impl Answerer for FakeAnswerer {
    async fn answer(
        &self,
        _question: &str,
        stats: &MonthlyStats,
        extras: &AnswerContext,
    ) -> Result<String, AssistantError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Timeout.into());
        }
        Ok(format!(
            "本月共花費 {}，參考了 {} 筆紀錄",
            stats.total,
            extras.recent_records.len()
        ))
    }
}

/// Router plus handles on every fake behind it
pub struct TestContext {
    pub app: axum::Router,
    pub state: AppState,
    pub store: Arc<MemoryCredentialStore>,
    pub sheets: Arc<FakeSheets>,
    pub answerer: Arc<FakeAnswerer>,
}

impl TestContext {
    /// Fresh app with [`TEST_USER`] registered and holding a live credential
    pub async fn new() -> Self {
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
            .save_delegated_credential(&DelegatedCredential {
                user_id: TEST_USER.to_string(),
                access_token: "provider-access".to_string(),
                refresh_token: Some("provider-refresh".to_string()),
                expires_at: Some(Utc::now() + Duration::hours(1)),
                scope: None,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let sheets = Arc::new(FakeSheets::default());
        let answerer = Arc::new(FakeAnswerer::default());
        let providers = Providers {
            oauth: Arc::new(FakeOAuth),
            sheets: sheets.clone(),
            parser: Arc::new(FakeParser),
            answerer: answerer.clone(),
        };

        let state = AppState::new(Config::for_tests(TEST_SECRET), store.clone(), providers);
        let app = build_router(state.clone());

        Self {
            app,
            state,
            store,
            sheets,
            answerer,
        }
    }

    /// Signs the test user in and returns their access token
    pub async fn access_token(&self) -> String {
        let code = self.state.sessions.create_exchange_code(TEST_USER).await.unwrap();
        self.state
            .sessions
            .issue_session_from_code(&code)
            .await
            .unwrap()
            .access_token
    }

    /// Signs in and binds a fresh ledger through the API
    pub async fn access_token_with_ledger(&self) -> String {
        let token = self.access_token().await;
        let (status, _) = self
            .send("POST", "/api/sheets/create", Some(&token), Some(json!({})))
            .await;
        assert!(status.is_success());
        token
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (axum::http::StatusCode, Value) {
        let response = self.raw(method, uri, token, body).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn raw(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        self.app.clone().oneshot(request).await.unwrap()
    }
}
