//! Fixed endpoints of the accounting service.

pub const AUTH_URL: &str = "https://login.xero.com/identity/connect/authorize";
pub const TOKEN_URL: &str = "https://identity.xero.com/connect/token";
pub const CONNECTIONS_URL: &str = "https://api.xero.com/connections";
pub const API_BASE_URL: &str = "https://api.xero.com/api.xro/2.0";

/// Header carrying the selected organization on every API call
pub const TENANT_HEADER: &str = "xero-tenant-id";

/// Identity endpoints used by the token manager.
#[derive(Clone, Debug)]
pub struct OAuthEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub connections_url: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            connections_url: CONNECTIONS_URL.to_string(),
        }
    }
}

impl OAuthEndpoints {
    /// All endpoints rooted at one base URL (for testing with a mock server).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            auth_url: format!("{}/identity/connect/authorize", base_url),
            token_url: format!("{}/connect/token", base_url),
            connections_url: format!("{}/connections", base_url),
        }
    }

    /// Build authorization URL with state and redirect_uri
    pub fn build_auth_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
        state: &str,
    ) -> String {
        let scopes = scopes.join(" ");
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }
}
