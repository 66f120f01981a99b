//! # Voicebook API Server
//!
//! HTTP server for voice bookkeeping: Google login, session tokens, API
//! tokens for shortcuts, and the ledger endpoints backed by the user's own
//! spreadsheet.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p voicebook-api
//! ```

use anyhow::Context;
use std::{sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voicebook_api::{
    app::{build_router, AppState, Providers},
    config::Config,
};
use voicebook_shared::{
    assistant::{OpenAiAssistant, OpenAiConfig},
    db::{
        migrations::run_migrations,
        pool::{create_pool, DatabaseConfig},
    },
    ledger::google_sheets::GoogleSheetsClient,
    oauth::google::{GoogleOAuthClient, GoogleOAuthConfig},
    provider::build_http_client,
    store::PgCredentialStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "voicebook_api=debug,voicebook_shared=debug,tower_http=debug".into()
    });
    if config.api.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        "Voicebook API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..DatabaseConfig::default()
    })
    .await
    .context("Failed to connect to database")?;

    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let http = build_http_client(Duration::from_secs(config.api.http_timeout_seconds))
        .context("Failed to build HTTP client")?;

    let oauth = Arc::new(GoogleOAuthClient::new(
        http.clone(),
        GoogleOAuthConfig::new(
            &config.google.client_id,
            &config.google.client_secret,
            &config.google.redirect_uri,
        ),
    ));

    let mut openai = OpenAiConfig::new(&config.openai.api_key);
    openai.model = config.openai.model.clone();
    openai.retry.max_retries = config.openai.max_retries;
    let assistant = Arc::new(OpenAiAssistant::new(http.clone(), openai));

    let providers = Providers {
        oauth,
        sheets: Arc::new(GoogleSheetsClient::new(http)),
        parser: assistant.clone(),
        answerer: assistant,
    };

    let addr = config.bind_address();
    let state = AppState::new(config, Arc::new(PgCredentialStore::new(pool)), providers);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received, exiting...");
}
