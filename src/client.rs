//! Authenticated request executor for the accounting API.
//!
//! Every call from the sync protocols passes through [`AccountingClient::request`],
//! which obtains a valid token, attaches the tenant header and turns non-2xx
//! responses into [`SyncError::ExternalApi`] with the raw body.

use crate::config::{HttpConfig, LedgerConfig};
use crate::error::{SyncError, SyncResult};
use crate::oauth::{TokenManager, API_BASE_URL, TENANT_HEADER};
use anyhow::{Context, Result};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry schedule for transient failures (transport errors, 429, 5xx).
///
/// GET is retried on any transient failure. Other methods create or change
/// documents and are only resent when the service cannot have acted on the
/// first attempt (connection never established, or 429).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): doubles each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }
}

/// Subset of the `Organisation` resource returned by a connection test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrganisationSummary {
    #[serde(rename = "OrganisationID", default)]
    pub organisation_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub base_currency: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

#[derive(Deserialize)]
struct OrganisationsEnvelope {
    #[serde(rename = "Organisations", default)]
    organisations: Vec<OrganisationSummary>,
}

pub struct AccountingClient {
    tokens: Arc<TokenManager>,
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl AccountingClient {
    pub fn new(config: &LedgerConfig, tokens: Arc<TokenManager>) -> Result<Self> {
        Self::with_base_url(config, tokens, API_BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(
        config: &LedgerConfig,
        tokens: Arc<TokenManager>,
        base_url: String,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("ledgerlink/0.1")
            .timeout(config.http.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            tokens,
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from(&config.http),
        })
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Issue an authenticated JSON request and return the parsed body.
    ///
    /// `path` is relative to the API base (e.g. `"Invoices"`). An empty
    /// success body comes back as `Value::Null`. Transient failures are
    /// retried per the [`RetryPolicy`]; a token is fetched for every attempt.
    /// A timeout or 5xx on a POST/PUT is returned as is, since the document
    /// may already exist.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> SyncResult<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut attempt = 0;

        loop {
            match self.send_once(method.clone(), &url, body).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retry.max_retries && should_retry(&method, &e) => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        method = %method,
                        path = %path,
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Accounting API call failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// [`AccountingClient::request`] with the body decoded into `T`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> SyncResult<T> {
        let value = self.request(method, path, body).await?;
        serde_json::from_value(value)
            .map_err(|e| SyncError::InvalidResponse(format!("{}: {}", path, e)))
    }

    /// Fetch the selected organization to prove the whole chain works.
    pub async fn test_connection(&self) -> SyncResult<OrganisationSummary> {
        let envelope: OrganisationsEnvelope =
            self.request_json(Method::GET, "Organisation", None).await?;
        envelope.organisations.into_iter().next().ok_or_else(|| {
            SyncError::InvalidResponse("Organisation response was empty".to_string())
        })
    }

    async fn send_once(&self, method: Method, url: &str, body: Option<&Value>) -> SyncResult<Value> {
        let grant = self.tokens.valid_access_token().await?;

        debug!(method = %method, url = %url, "Calling accounting API");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&grant.access_token)
            .header(TENANT_HEADER, &grant.organization_id)
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(SyncError::ExternalApi {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| SyncError::InvalidResponse(format!("{}: {}", url, e)))
    }
}

fn should_retry(method: &Method, err: &SyncError) -> bool {
    if *method == Method::GET {
        err.is_transient()
    } else {
        err.is_safe_to_resend()
    }
}
