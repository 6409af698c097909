//! Calls against the identity service: code exchange, refresh, connections.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 1800;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Tokens issued by the token endpoint, with the expiry already resolved.
#[derive(Clone, Debug)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }
}

/// An organization the user authorized during the consent screen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default)]
    pub id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default)]
    pub tenant_type: Option<String>,
    #[serde(default)]
    pub created_date_utc: Option<String>,
    #[serde(default)]
    pub updated_date_utc: Option<String>,
}

/// Application credentials for HTTP Basic auth against the token endpoint
pub struct ClientAuth<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// Exchange an authorization code for a token set.
pub async fn exchange_code_for_token(
    http: &Client,
    token_url: &str,
    client: &ClientAuth<'_>,
    code: &str,
    redirect_uri: &str,
) -> SyncResult<TokenSet> {
    tracing::debug!("Exchanging authorization code for token at {}", token_url);

    let response = http
        .post(token_url)
        .basic_auth(client.client_id, Some(client.client_secret))
        .header("Accept", "application/json")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        return Err(SyncError::ExternalApi {
            status: status.as_u16(),
            body,
        });
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| SyncError::InvalidResponse(format!("token response: {}", e)))?;

    tracing::debug!(
        has_refresh_token = token.refresh_token.is_some(),
        expires_in = ?token.expires_in,
        "Token exchange successful"
    );

    Ok(token.into())
}

/// Redeem a refresh token. The service rotates the refresh token on use.
///
/// Any non-2xx answer is a [`SyncError::TokenRefresh`]: the grant is
/// revoked or already consumed and the user has to reconnect.
pub async fn refresh_token(
    http: &Client,
    token_url: &str,
    client: &ClientAuth<'_>,
    refresh_token: &str,
) -> SyncResult<TokenSet> {
    let response = http
        .post(token_url)
        .basic_auth(client.client_id, Some(client.client_secret))
        .header("Accept", "application/json")
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        return Err(SyncError::TokenRefresh {
            status: status.as_u16(),
            body,
        });
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| SyncError::InvalidResponse(format!("refresh response: {}", e)))?;
    Ok(token.into())
}

/// List the organizations the current grant can access.
pub async fn fetch_connections(
    http: &Client,
    connections_url: &str,
    access_token: &str,
) -> SyncResult<Vec<Connection>> {
    let response = http
        .get(connections_url)
        .bearer_auth(access_token)
        .header("Accept", "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        return Err(SyncError::ExternalApi {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| SyncError::InvalidResponse(format!("connections response: {}", e)))
}
