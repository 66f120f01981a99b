/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use voicebook_api::app::{build_router, AppState, Providers};
/// use voicebook_api::config::Config;
/// use voicebook_shared::store::MemoryCredentialStore;
///
/// # fn example(providers: Providers) -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(config, Arc::new(MemoryCredentialStore::new()), providers);
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, error::ApiError};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{delete, get, post},
    Router,
};
use chrono::Duration;
use chrono_tz::Tz;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use voicebook_shared::{
    assistant::{Answerer, EntryParser},
    auth::{login::LoginFlow, token::log_prefix, AuthKind, SessionConfig, SessionIdentity, SessionManager},
    ledger::{LedgerConfig, LedgerRef, LedgerStore, SpreadsheetProvider},
    models::{ledger_binding::LedgerBinding, user::User},
    oauth::{BrokerConfig, DelegatedAccessBroker, OAuthProvider},
    store::CredentialStore,
};

/// Remote collaborators the server talks to
#[derive(Clone)]
pub struct Providers {
    pub oauth: Arc<dyn OAuthProvider>,
    pub sheets: Arc<dyn SpreadsheetProvider>,
    pub parser: Arc<dyn EntryParser>,
    pub answerer: Arc<dyn Answerer>,
}

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CredentialStore>,
    pub sessions: Arc<SessionManager>,
    pub login: Arc<LoginFlow>,
    pub broker: Arc<DelegatedAccessBroker>,
    pub ledger: LedgerStore,
    pub parser: Arc<dyn EntryParser>,
    pub answerer: Arc<dyn Answerer>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the core components from configuration
    pub fn new(config: Config, store: Arc<dyn CredentialStore>, providers: Providers) -> Self {
        let sessions = Arc::new(SessionManager::new(store.clone(), session_config(&config)));

        let login = Arc::new(LoginFlow::new(
            store.clone(),
            sessions.clone(),
            providers.oauth.clone(),
            Duration::minutes(config.jwt.state_expire_minutes),
        ));

        let broker = Arc::new(DelegatedAccessBroker::new(
            store.clone(),
            providers.oauth,
            BrokerConfig::default(),
        ));

        let ledger = LedgerStore::new(
            providers.sheets,
            LedgerConfig {
                fallback_timezone: config.default_tz(),
            },
        );

        Self {
            store,
            sessions,
            login,
            broker,
            ledger,
            parser: providers.parser,
            answerer: providers.answerer,
            config: Arc::new(config),
        }
    }

    /// Loads the user, failing with 404 if the row is gone
    pub async fn user(&self, user_id: &str) -> Result<User, ApiError> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    /// The user's timezone, or the configured default
    pub async fn user_tz(&self, user_id: &str) -> Result<Tz, ApiError> {
        Ok(self
            .store
            .find_user(user_id)
            .await?
            .and_then(|user| user.timezone.parse::<Tz>().ok())
            .unwrap_or_else(|| self.config.default_tz()))
    }

    /// Live delegated access token for the user
    pub async fn access_token(&self, user_id: &str) -> Result<String, ApiError> {
        Ok(self.broker.get_live_credential(user_id).await?.access_token)
    }

    /// The user's ledger binding plus a live credential to reach it
    pub async fn ledger_for(&self, user_id: &str) -> Result<(LedgerBinding, LedgerRef), ApiError> {
        let binding = self.store.find_ledger_binding(user_id).await?.ok_or_else(|| {
            ApiError::NotFound("No ledger selected; create or select a spreadsheet first".to_string())
        })?;

        let access_token = self.access_token(user_id).await?;
        let ledger = LedgerRef::new(&binding.ledger_id, access_token);
        Ok((binding, ledger))
    }
}

fn session_config(config: &Config) -> SessionConfig {
    let mut session = SessionConfig::new(config.jwt.secret.clone());
    session.access_token_ttl = Duration::minutes(config.jwt.access_expire_minutes);
    session.renewal_token_ttl =
        (config.jwt.refresh_expire_hours > 0).then(|| Duration::hours(config.jwt.refresh_expire_hours));
    session.inactivity_window = Duration::hours(config.jwt.refresh_inactivity_hours);
    session.exchange_code_ttl = Duration::minutes(config.jwt.code_expire_minutes);
    session
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                          # Health check (public)
/// └── /api/
///     ├── /auth/
///     │   ├── GET  /google/login           # Redirect to provider (public)
///     │   ├── POST /google/exchange-code   # Provider code -> one-time code (public)
///     │   ├── POST /exchange               # One-time code -> session (public)
///     │   ├── POST /refresh                # Rotate renewal token (public)
///     │   ├── GET  /status                 # Optional credential (public)
///     │   ├── GET  /settings/timezones     # Common timezones (public)
///     │   ├── POST /logout
///     │   ├── GET  /me
///     │   ├── GET  /token/verify
///     │   ├── POST /token/generate
///     │   ├── GET  /token/list
///     │   ├── DELETE /token/:id
///     │   ├── GET|PUT /settings/timezone
///     │   └── GET|PUT /settings/budget
///     ├── /sheets/                     # Ledger binding (session login only)
///     │   ├── GET  /list
///     │   ├── GET  /my-sheet
///     │   ├── POST /create
///     │   ├── POST /select
///     │   └── POST /link
///     └── /accounting/
///         ├── GET  /categories             # (public)
///         ├── POST /record
///         ├── POST /query
///         ├── GET  /stats
///         ├── GET  /stats/trend
///         ├── GET  /records
///         ├── GET  /records/recent
///         └── GET  /trend/daily
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Authentication (per-route basis)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_layer = || axum::middleware::from_fn_with_state(state.clone(), bearer_auth_layer);

    let public_auth_routes = Router::new()
        .route("/google/login", get(routes::auth::google_login))
        .route("/google/exchange-code", post(routes::auth::exchange_google_code))
        .route("/exchange", post(routes::auth::exchange))
        .route("/refresh", post(routes::auth::refresh))
        .route("/status", get(routes::auth::status))
        .route("/settings/timezones", get(routes::settings::list_timezones));

    let protected_auth_routes = Router::new()
        .route("/logout", post(routes::auth::logout))
        .route("/me", get(routes::auth::me))
        .route("/token/verify", get(routes::api_tokens::verify_token))
        .route("/token/generate", post(routes::api_tokens::generate_token))
        .route("/token/list", get(routes::api_tokens::list_tokens))
        .route("/token/:id", delete(routes::api_tokens::revoke_token))
        .route(
            "/settings/timezone",
            get(routes::settings::get_timezone).put(routes::settings::update_timezone),
        )
        .route(
            "/settings/budget",
            get(routes::settings::get_budget).put(routes::settings::update_budget),
        )
        .layer(auth_layer());

    let sheet_routes = Router::new()
        .route("/list", get(routes::sheets::list_ledgers))
        .route("/my-sheet", get(routes::sheets::my_ledger))
        .route("/create", post(routes::sheets::create_ledger))
        .route("/select", post(routes::sheets::select_ledger))
        .route("/link", post(routes::sheets::link_ledger))
        .layer(auth_layer());

    let accounting_routes = Router::new()
        .route("/record", post(routes::accounting::record))
        .route("/query", post(routes::accounting::query))
        .route("/stats", get(routes::accounting::monthly_stats))
        .route("/stats/trend", get(routes::accounting::stats_trend))
        .route("/records", get(routes::accounting::records_in_range))
        .route("/records/recent", get(routes::accounting::recent_records))
        .route("/trend/daily", get(routes::accounting::daily_trend))
        .layer(auth_layer())
        .route("/categories", get(routes::accounting::categories));

    let api_routes = Router::new()
        .nest("/auth", public_auth_routes.merge(protected_auth_routes))
        .nest("/sheets", sheet_routes)
        .nest("/accounting", accounting_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|origin| origin == "*") {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        // Production mode: configure allowed origins
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    // Combine all routes with middleware stack
    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

/// Extracts the bearer credential from the Authorization header, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Bearer authentication middleware layer
///
/// Accepts either a signed access token or an external API token, then
/// injects the resolved [`SessionIdentity`] into request extensions.
async fn bearer_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer credential".to_string()))?
        .to_string();

    let identity = state
        .sessions
        .validate_access_token(&token)
        .await?
        .ok_or_else(|| {
            tracing::debug!(token_prefix = log_prefix(&token), "Rejected bearer credential");
            ApiError::Unauthorized("Invalid or expired credential".to_string())
        })?;

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Rejects identities that did not come from an interactive login
pub fn require_session_login(identity: &SessionIdentity) -> Result<&str, ApiError> {
    if identity.kind != AuthKind::Session {
        return Err(ApiError::Forbidden(
            "This operation requires signing in with Google".to_string(),
        ));
    }
    Ok(identity.require_user()?)
}
