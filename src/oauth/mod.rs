//! OAuth 2.0 authorization-code flow with refresh for the accounting service.
//!
//! 1. Host UI asks for [`TokenManager::authorization_url`] and redirects
//! 2. User consents on the identity provider
//! 3. Callback hands the code to [`TokenManager::exchange_code`]
//! 4. An organization is picked from [`TokenManager::list_connections`]
//! 5. Every API call goes through [`TokenManager::valid_access_token`]

mod exchange;
mod manager;
mod provider;
mod state;

pub use exchange::{Connection, TokenSet};
pub use manager::{
    refresh_buffer, AccessGrant, AuthorizationRequest, ConnectionStatus, TokenManager,
    REFRESH_BUFFER_SECS,
};
pub use provider::{OAuthEndpoints, API_BASE_URL, AUTH_URL, CONNECTIONS_URL, TENANT_HEADER, TOKEN_URL};
pub use state::{generate_state, run_state_cleanup, StateEntry, StateManager, STATE_LENGTH};
