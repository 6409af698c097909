use crate::error::{SyncError, SyncResult};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Complete ledgerlink configuration.
///
/// Built once at process start (TOML file, then environment overrides) and
/// handed to the token manager and request executor by reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub xero: XeroConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// OAuth application and posting defaults for the accounting service
#[derive(Debug, Clone, Deserialize)]
pub struct XeroConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Sales account every invoice line is posted against
    #[serde(default = "default_sales_account_code")]
    pub sales_account_code: String,
    #[serde(default = "default_tax_type")]
    pub tax_type: String,
}

fn default_scopes() -> Vec<String> {
    [
        "openid",
        "profile",
        "email",
        "accounting.transactions",
        "accounting.contacts",
        "accounting.settings",
        "offline_access",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_sales_account_code() -> String {
    "200".to_string()
}

fn default_tax_type() -> String {
    "OUTPUT2".to_string()
}

impl Default for XeroConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            scopes: default_scopes(),
            sales_account_code: default_sales_account_code(),
            tax_type: default_tax_type(),
        }
    }
}

impl XeroConfig {
    pub fn require_client_id(&self) -> SyncResult<&str> {
        non_empty(&self.client_id).ok_or_else(|| {
            SyncError::Configuration(
                "client id is not set (LEDGERLINK_XERO_CLIENT_ID)".to_string(),
            )
        })
    }

    pub fn require_client_secret(&self) -> SyncResult<&str> {
        non_empty(&self.client_secret).ok_or_else(|| {
            SyncError::Configuration(
                "client secret is not set (LEDGERLINK_XERO_CLIENT_SECRET)".to_string(),
            )
        })
    }

    pub fn require_redirect_uri(&self) -> SyncResult<&str> {
        non_empty(&self.redirect_uri).ok_or_else(|| {
            SyncError::Configuration(
                "redirect URI is not set (LEDGERLINK_XERO_REDIRECT_URI)".to_string(),
            )
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Outbound HTTP behaviour for the accounting API
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_backoff() -> u64 {
    500
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    "ledgerlink.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Company whose credential this process manages
    #[serde(default = "default_company_id")]
    pub company_id: String,
}

fn default_port() -> u16 {
    3002
}

fn default_company_id() -> String {
    "default".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            company_id: default_company_id(),
        }
    }
}

impl LedgerConfig {
    /// Startup configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// The file named by `LEDGERLINK_CONFIG` (or defaults), then the
    /// `LEDGERLINK_*` overrides from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("LEDGERLINK_CONFIG") {
            Some(path) => load_config(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Overlays values from `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LEDGERLINK_XERO_CLIENT_ID") {
            self.xero.client_id = Some(v);
        }
        if let Some(v) = lookup("LEDGERLINK_XERO_CLIENT_SECRET") {
            self.xero.client_secret = Some(v);
        }
        if let Some(v) = lookup("LEDGERLINK_XERO_REDIRECT_URI") {
            self.xero.redirect_uri = Some(v);
        }
        if let Some(v) = lookup("LEDGERLINK_XERO_SCOPES") {
            let scopes: Vec<String> = v.split_whitespace().map(str::to_string).collect();
            if !scopes.is_empty() {
                self.xero.scopes = scopes;
            }
        }
        if let Some(v) = lookup("LEDGERLINK_XERO_SALES_ACCOUNT_CODE") {
            if !v.trim().is_empty() {
                self.xero.sales_account_code = v.trim().to_string();
            }
        }
        if let Some(v) = lookup("LEDGERLINK_DB") {
            self.storage.database = v;
        }
        if let Some(v) = lookup("LEDGERLINK_PORT") {
            self.server.port = v
                .parse()
                .context("LEDGERLINK_PORT must be a valid port number")?;
        }
        if let Some(v) = lookup("LEDGERLINK_COMPANY_ID") {
            self.server.company_id = v;
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<LedgerConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: LedgerConfig = toml::from_str(&contents).context("Invalid config file")?;
    Ok(config)
}
