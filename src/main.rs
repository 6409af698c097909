use anyhow::{Context, Result};
use ledgerlink::api::{create_accounting_router, AccountingAppState};
use ledgerlink::config::LedgerConfig;
use ledgerlink::credentials::CredentialStore;
use ledgerlink::oauth::{run_state_cleanup, StateManager, TokenManager};
use ledgerlink::AccountingClient;
use std::sync::Arc;
use tracing::info;

/// OAuth states expire after 10 minutes
const STATE_EXPIRY_SECS: i64 = 600;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerlink=info,ledger_sync=info".into()),
        )
        .init();

    info!("ledgerlink starting...");

    let config = LedgerConfig::from_env()?;

    let encryption_key = std::env::var("LEDGERLINK_ENCRYPTION_KEY")
        .context("LEDGERLINK_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

    info!(
        database = %config.storage.database,
        company_id = %config.server.company_id,
        port = config.server.port,
        client_id_set = config.xero.client_id.is_some(),
        redirect_uri_set = config.xero.redirect_uri.is_some(),
        "Configuration loaded"
    );

    let credential_store = Arc::new(
        CredentialStore::new(&config.storage.database, &encryption_key)
            .context("Failed to initialize credential store")?,
    );

    let identity_http = reqwest::Client::builder()
        .timeout(config.http.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let tokens = Arc::new(TokenManager::new(
        config.server.company_id.clone(),
        &config.xero,
        Arc::clone(&credential_store),
        identity_http,
    ));
    let client = Arc::new(AccountingClient::new(&config, Arc::clone(&tokens))?);

    let state_manager = StateManager::new(STATE_EXPIRY_SECS);
    tokio::spawn(run_state_cleanup(state_manager.clone(), 60));

    let router = create_accounting_router(AccountingAppState {
        tokens,
        client,
        state_manager,
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.port))
        .await
        .context("Failed to bind API port")?;
    info!(port = config.server.port, "Accounting API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("API server error")?;

    Ok(())
}
