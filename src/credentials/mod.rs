//! Encrypted storage for the accounting OAuth credential.
//!
//! One [`StoredCredential`] exists per company. It is serialized to JSON and
//! sealed with AES-256-GCM before it touches SQLite.
//!
//! ```text
//! StoredCredential ──serde_json──► Cipher::seal ──► accounting_credentials row
//!                  ◄─────────────── Cipher::open ◄──
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use ledgerlink::credentials::{CredentialStore, StoredCredential};
//!
//! # fn main() -> anyhow::Result<()> {
//! let encryption_key = std::env::var("LEDGERLINK_ENCRYPTION_KEY")?;
//! let store = CredentialStore::new("ledgerlink.db", &encryption_key)?;
//!
//! let mut credential = store.get("acme")?.unwrap_or_default();
//! credential.organization_id = Some("tenant-123".to_string());
//! store.store("acme", &credential)?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

mod encryption;
mod storage;

pub use encryption::Cipher;
pub use storage::CredentialStore;

/// The OAuth credential blob attached to a company.
///
/// `client_id`/`client_secret` are set out-of-band and survive a disconnect.
/// Everything else is owned by the token manager.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// External tenant chosen after authorization
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Presence means "connected"
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub access_token_expiry: Option<DateTime<Utc>>,
}

// Tokens and secrets stay out of logs.
impl std::fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredential")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("organization_id", &self.organization_id)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("access_token_expiry", &self.access_token_expiry)
            .finish()
    }
}

/// Connection status derived from the stored fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected { access: AccessState },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessState {
    /// Usable for at least the refresh buffer.
    Valid {
        access_token: String,
        expires_at: DateTime<Utc>,
    },
    /// Missing, expired, or expiring within the refresh buffer.
    Stale,
}

impl StoredCredential {
    /// The only place connectedness and token freshness are decided.
    ///
    /// The access token is valid only while strictly more than `buffer`
    /// remains before expiry.
    pub fn connection_state(&self, now: DateTime<Utc>, buffer: Duration) -> ConnectionState {
        if self.refresh_token.is_none() {
            return ConnectionState::Disconnected;
        }

        let access = match (&self.access_token, self.access_token_expiry) {
            (Some(token), Some(expires_at)) if expires_at - now > buffer => AccessState::Valid {
                access_token: token.clone(),
                expires_at,
            },
            _ => AccessState::Stale,
        };

        ConnectionState::Connected { access }
    }

    pub fn is_connected(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Forget the grant and tenant, keeping the application credentials.
    pub fn clear_tokens(&mut self) {
        self.organization_id = None;
        self.refresh_token = None;
        self.access_token = None;
        self.access_token_expiry = None;
    }
}
