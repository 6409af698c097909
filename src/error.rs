//! Typed failures for everything that talks to the accounting service.
//!
//! The sync-facing operations (contact sync, invoice creation, credit note
//! creation, connection test, disconnect) return [`SyncResult`] so host
//! workflows can record a per-entity status string instead of unwinding.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Missing client id, client secret or redirect URI. Needs operator action.
    #[error("Accounting integration is not configured: {0}")]
    Configuration(String),

    /// Connected, but no organization has been selected yet.
    #[error("No accounting organization selected")]
    NotConfigured,

    /// No refresh token stored. Needs re-authorization.
    #[error("Not connected to the accounting service")]
    NotConnected,

    /// The token endpoint rejected a refresh (revoked or expired grant).
    #[error("Token refresh failed with status {status}: {body}")]
    TokenRefresh { status: u16, body: String },

    /// Non-2xx from the accounting API.
    #[error("Accounting API returned status {status}: {body}")]
    ExternalApi { status: u16, body: String },

    /// The connection was never established, so nothing reached the service.
    #[error("Accounting service unreachable: {0}")]
    Unreachable(String),

    /// Request timeouts and failures after the request may have been sent.
    #[error("Request to accounting service failed: {0}")]
    Transport(String),

    #[error("Unexpected response from accounting service: {0}")]
    InvalidResponse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Customer {customer_id} has not been synced to the accounting service")]
    CustomerNotSynced { customer_id: String },

    #[error("Order {order_id} already has invoice {invoice_id}")]
    DuplicateInvoice { order_id: String, invoice_id: String },

    #[error("Order {order_id} has no invoice to credit")]
    NoInvoiceToCredit { order_id: String },

    #[error("Order {order_id} already has credit note {credit_note_id}")]
    DuplicateCreditNote { order_id: String, credit_note_id: String },

    #[error("Order {order_id} is {status}; cannot create {document}")]
    InvalidOrderStatus {
        order_id: String,
        status: String,
        document: String,
    },
}

/// Result type for sync-facing operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Wraps an internal storage failure, keeping its context chain.
    pub fn storage(err: anyhow::Error) -> Self {
        SyncError::Storage(format!("{:#}", err))
    }

    /// True when retrying the same call later may succeed without any
    /// operator or caller action.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Unreachable(_) | SyncError::Transport(_) => true,
            SyncError::ExternalApi { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// True when the service provably did not act on the request, so even
    /// a document-creating call can be sent again.
    pub fn is_safe_to_resend(&self) -> bool {
        match self {
            SyncError::Unreachable(_) => true,
            SyncError::ExternalApi { status, .. } => *status == 429,
            _ => false,
        }
    }

    /// True when the stored grant is unusable and the user must reconnect.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, SyncError::NotConnected | SyncError::TokenRefresh { .. })
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            SyncError::Unreachable(err.to_string())
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}
