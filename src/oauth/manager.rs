//! Token lifecycle for a company's accounting connection.
//!
//! ```text
//!  Disconnected ──exchange_code──► Connected/Valid ◄──refresh── Connected/Stale
//!       ▲                                │  expiry - now <= 5 min  ▲
//!       └────────── disconnect ──────────┴─────────────────────────┘
//! ```
//!
//! Every read-decide-write on the stored credential runs under one async
//! mutex. Concurrent callers that observe a stale token therefore produce a
//! single refresh call; the rest wait and then read the rotated pair.

use super::exchange::{self, ClientAuth, Connection};
use super::provider::OAuthEndpoints;
use super::state::generate_state;
use crate::config::XeroConfig;
use crate::credentials::{AccessState, ConnectionState, CredentialStore, StoredCredential};
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Access tokens closer than this to expiry are refreshed before use.
pub const REFRESH_BUFFER_SECS: i64 = 300;

pub fn refresh_buffer() -> Duration {
    Duration::seconds(REFRESH_BUFFER_SECS)
}

/// What the request executor needs for one authenticated call.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub access_token: String,
    pub organization_id: String,
}

impl std::fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGrant")
            .field("access_token", &"***")
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

/// An authorization URL plus the CSRF state embedded in it.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Connection summary for the host UI. No network I/O involved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub organization_id: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub access_token_valid: bool,
}

pub struct TokenManager {
    company_id: String,
    config: XeroConfig,
    store: Arc<CredentialStore>,
    endpoints: OAuthEndpoints,
    http: reqwest::Client,
    lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        company_id: impl Into<String>,
        config: &XeroConfig,
        store: Arc<CredentialStore>,
        http: reqwest::Client,
    ) -> Self {
        Self::with_endpoints(company_id, config, store, http, OAuthEndpoints::default())
    }

    /// Same as [`TokenManager::new`] with custom identity endpoints (for testing).
    pub fn with_endpoints(
        company_id: impl Into<String>,
        config: &XeroConfig,
        store: Arc<CredentialStore>,
        http: reqwest::Client,
        endpoints: OAuthEndpoints,
    ) -> Self {
        Self {
            company_id: company_id.into(),
            config: config.clone(),
            store,
            endpoints,
            http,
            lock: Mutex::new(()),
        }
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    /// Build the consent-screen URL with a fresh CSRF state.
    ///
    /// Fails with `Configuration` before doing anything else when the client
    /// id or redirect URI is missing. Validating the state on callback is the
    /// caller's job.
    pub fn authorization_url(&self) -> SyncResult<AuthorizationRequest> {
        let stored = self.load()?.unwrap_or_default();
        let client_id = match stored.client_id.as_deref().filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => self.config.require_client_id()?.to_string(),
        };
        let redirect_uri = self.config.require_redirect_uri()?;

        let state = generate_state();
        let url =
            self.endpoints
                .build_auth_url(&client_id, redirect_uri, &self.config.scopes, &state);
        Ok(AuthorizationRequest { url, state })
    }

    /// Exchange an authorization code and persist the resulting grant.
    ///
    /// Creates the credential on first connect. A previously selected
    /// organization is kept.
    pub async fn exchange_code(&self, code: &str) -> SyncResult<()> {
        let _guard = self.lock.lock().await;

        let mut credential = self.load()?.unwrap_or_default();
        let (client_id, client_secret) = self.client_credentials(&credential)?;
        let redirect_uri = self.config.require_redirect_uri()?;

        let tokens = exchange::exchange_code_for_token(
            &self.http,
            &self.endpoints.token_url,
            &ClientAuth {
                client_id: &client_id,
                client_secret: &client_secret,
            },
            code,
            redirect_uri,
        )
        .await?;

        let refresh_token = tokens.refresh_token.ok_or_else(|| {
            SyncError::InvalidResponse(
                "token response has no refresh token (is offline_access in scope?)".to_string(),
            )
        })?;

        credential.client_id = Some(client_id);
        credential.client_secret = Some(client_secret);
        credential.refresh_token = Some(refresh_token);
        credential.access_token = Some(tokens.access_token);
        credential.access_token_expiry = Some(tokens.expires_at);
        self.save(&credential)?;

        info!(
            company_id = %self.company_id,
            expires_at = %tokens.expires_at,
            "Accounting connection authorized"
        );
        Ok(())
    }

    /// A usable access token and the selected organization.
    ///
    /// Refreshes (and persists the rotated pair) when the stored token is
    /// missing or within [`REFRESH_BUFFER_SECS`] of expiry.
    pub async fn valid_access_token(&self) -> SyncResult<AccessGrant> {
        let (access_token, credential) = self.ensure_access(true).await?;
        let organization_id = credential.organization_id.ok_or(SyncError::NotConfigured)?;
        Ok(AccessGrant {
            access_token,
            organization_id,
        })
    }

    /// Organizations the current grant may access.
    pub async fn list_connections(&self) -> SyncResult<Vec<Connection>> {
        let (access_token, _) = self.ensure_access(false).await?;
        exchange::fetch_connections(&self.http, &self.endpoints.connections_url, &access_token)
            .await
    }

    /// Persist the organization every subsequent API call is addressed to.
    pub async fn select_organization(&self, tenant_id: &str) -> SyncResult<()> {
        let tenant_id = tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(SyncError::Configuration(
                "organization id must not be empty".to_string(),
            ));
        }

        let _guard = self.lock.lock().await;
        let mut credential = self.load()?.unwrap_or_default();
        if !credential.is_connected() {
            return Err(SyncError::NotConnected);
        }
        credential.organization_id = Some(tenant_id.to_string());
        self.save(&credential)?;

        info!(company_id = %self.company_id, organization_id = %tenant_id, "Organization selected");
        Ok(())
    }

    /// Clear tokens and organization, keeping client id/secret.
    pub async fn disconnect(&self) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        let Some(mut credential) = self.load()? else {
            return Ok(());
        };
        credential.clear_tokens();
        self.save(&credential)?;

        info!(company_id = %self.company_id, "Accounting connection removed");
        Ok(())
    }

    pub fn connection_status(&self) -> SyncResult<ConnectionStatus> {
        let credential = self.load()?.unwrap_or_default();
        let state = credential.connection_state(Utc::now(), refresh_buffer());
        Ok(ConnectionStatus {
            connected: !matches!(state, ConnectionState::Disconnected),
            organization_id: credential.organization_id,
            access_token_expires_at: credential.access_token_expiry,
            access_token_valid: matches!(
                state,
                ConnectionState::Connected {
                    access: AccessState::Valid { .. }
                }
            ),
        })
    }

    /// Returns a fresh access token and the credential it came from.
    async fn ensure_access(&self, require_organization: bool) -> SyncResult<(String, StoredCredential)> {
        let _guard = self.lock.lock().await;

        let credential = self.load()?.unwrap_or_default();
        let access = match credential.connection_state(Utc::now(), refresh_buffer()) {
            ConnectionState::Disconnected => return Err(SyncError::NotConnected),
            ConnectionState::Connected { access } => access,
        };
        if require_organization && credential.organization_id.is_none() {
            return Err(SyncError::NotConfigured);
        }

        match access {
            AccessState::Valid { access_token, .. } => Ok((access_token, credential)),
            AccessState::Stale => {
                let refreshed = self.refresh(credential).await?;
                let token = refreshed.access_token.clone().ok_or_else(|| {
                    SyncError::InvalidResponse("refresh produced no access token".to_string())
                })?;
                Ok((token, refreshed))
            }
        }
    }

    /// Caller must hold `self.lock`.
    async fn refresh(&self, mut credential: StoredCredential) -> SyncResult<StoredCredential> {
        let (client_id, client_secret) = self.client_credentials(&credential)?;
        let refresh_token = credential.refresh_token.clone().ok_or(SyncError::NotConnected)?;

        debug!(company_id = %self.company_id, "Refreshing accounting access token");

        let tokens = exchange::refresh_token(
            &self.http,
            &self.endpoints.token_url,
            &ClientAuth {
                client_id: &client_id,
                client_secret: &client_secret,
            },
            &refresh_token,
        )
        .await
        .map_err(|e| {
            warn!(company_id = %self.company_id, error = %e, "Token refresh failed");
            e
        })?;

        credential.access_token = Some(tokens.access_token);
        credential.access_token_expiry = Some(tokens.expires_at);
        // Keep the existing refresh token if the provider did not rotate it
        if let Some(rotated) = tokens.refresh_token {
            credential.refresh_token = Some(rotated);
        }
        self.save(&credential)?;

        info!(
            company_id = %self.company_id,
            expires_at = %tokens.expires_at,
            "Accounting access token refreshed"
        );
        Ok(credential)
    }

    /// Stored application credentials win over configured ones.
    fn client_credentials(&self, credential: &StoredCredential) -> SyncResult<(String, String)> {
        let client_id = match credential.client_id.as_deref().filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => self.config.require_client_id()?.to_string(),
        };
        let client_secret = match credential.client_secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => secret.to_string(),
            None => self.config.require_client_secret()?.to_string(),
        };
        Ok((client_id, client_secret))
    }

    fn load(&self) -> SyncResult<Option<StoredCredential>> {
        self.store.get(&self.company_id).map_err(SyncError::storage)
    }

    fn save(&self, credential: &StoredCredential) -> SyncResult<()> {
        self.store
            .store(&self.company_id, credential)
            .map_err(SyncError::storage)
    }
}
