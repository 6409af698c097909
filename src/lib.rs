// Configuration (TOML + environment)
pub mod config;

// Typed sync errors
pub mod error;

// Encrypted credential storage
pub mod credentials;

// OAuth token lifecycle
pub mod oauth;

// Authenticated request executor
pub mod client;

// Connection-management HTTP API
pub mod api;

pub use client::{AccountingClient, OrganisationSummary, RetryPolicy};
pub use config::LedgerConfig;
pub use error::{SyncError, SyncResult};
pub use oauth::{AccessGrant, TokenManager};
