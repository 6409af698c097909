//! Connection-management HTTP API.
//!
//! The host admin portal drives the OAuth connect flow and the organization
//! picker through these routes:
//!
//! - `GET  /api/accounting/oauth/start`    → redirect to the consent screen
//! - `GET  /api/accounting/oauth/callback` → exchange code, store credential
//! - `GET  /api/accounting/status`
//! - `GET  /api/accounting/organizations`
//! - `POST /api/accounting/organization`   `{ "tenant_id": "..." }`
//! - `POST /api/accounting/test`
//! - `POST /api/accounting/disconnect`

use crate::client::{AccountingClient, OrganisationSummary};
use crate::error::SyncError;
use crate::oauth::{Connection, ConnectionStatus, StateManager, TokenManager};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        (status, Json(ErrorResponse { error: error_message })).into_response()
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        let message = err.to_string();
        // The admin has to reconnect before anything else will work
        if err.requires_reauthorization() {
            return AppError::Conflict(message);
        }
        match err {
            SyncError::Configuration(_) | SyncError::Storage(_) => AppError::ServerError(message),
            SyncError::NotConnected | SyncError::NotConfigured | SyncError::TokenRefresh { .. } => {
                AppError::Conflict(message)
            }
            SyncError::ExternalApi { .. }
            | SyncError::Unreachable(_)
            | SyncError::Transport(_)
            | SyncError::InvalidResponse(_) => AppError::BadGateway(message),
            SyncError::CustomerNotSynced { .. }
            | SyncError::DuplicateInvoice { .. }
            | SyncError::DuplicateCreditNote { .. }
            | SyncError::NoInvoiceToCredit { .. }
            | SyncError::InvalidOrderStatus { .. } => AppError::BadRequest(message),
        }
    }
}

/// Shared application state for the accounting API
#[derive(Clone)]
pub struct AccountingAppState {
    pub tokens: Arc<TokenManager>,
    pub client: Arc<AccountingClient>,
    pub state_manager: StateManager,
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Serialize)]
pub struct ConnectedResponse {
    success: bool,
    message: String,
    organization_id: Option<String>,
    organizations: Vec<Connection>,
}

#[derive(Deserialize)]
pub struct SelectOrganizationRequest {
    pub tenant_id: String,
}

/// Typed success/failure body for the sync-facing connection operations
#[derive(Serialize)]
pub struct OperationResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> OperationResponse<T> {
    fn from_result(result: Result<T, SyncError>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self {
                success: false,
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}

pub fn create_accounting_router(state: AccountingAppState) -> Router {
    Router::new()
        .route("/api/accounting/oauth/start", get(oauth_start))
        .route("/api/accounting/oauth/callback", get(oauth_callback))
        .route("/api/accounting/status", get(connection_status))
        .route("/api/accounting/organizations", get(list_organizations))
        .route("/api/accounting/organization", post(select_organization))
        .route("/api/accounting/test", post(test_connection))
        .route("/api/accounting/disconnect", post(disconnect))
        .with_state(Arc::new(state))
}

/// GET /api/accounting/oauth/start
async fn oauth_start(State(state): State<Arc<AccountingAppState>>) -> Result<Redirect, AppError> {
    let request = state.tokens.authorization_url().map_err(|e| {
        error!(error = %e, "Cannot start OAuth flow");
        AppError::from(e)
    })?;

    state
        .state_manager
        .remember(&request.state, state.tokens.company_id());

    info!(company_id = %state.tokens.company_id(), "Redirecting to accounting consent screen");
    Ok(Redirect::temporary(&request.url))
}

/// GET /api/accounting/oauth/callback
///
/// Validates the single-use CSRF state, exchanges the code, and selects the
/// organization automatically when the grant covers exactly one.
async fn oauth_callback(
    State(state): State<Arc<AccountingAppState>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Json<ConnectedResponse>, AppError> {
    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(error = %error, description = %description, "OAuth authorization failed");
        return Err(AppError::BadRequest(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    let entry = state
        .state_manager
        .validate_and_consume(&csrf_state)
        .ok_or_else(|| {
            warn!("Invalid or expired OAuth state");
            AppError::Unauthorized(
                "Invalid or expired OAuth state (possible CSRF attack)".to_string(),
            )
        })?;
    if entry.company_id != state.tokens.company_id() {
        return Err(AppError::BadRequest("Company mismatch".to_string()));
    }

    debug!(company_id = %entry.company_id, "CSRF state validated");

    state.tokens.exchange_code(&code).await.map_err(|e| {
        error!(error = %e, "Token exchange failed");
        AppError::from(e)
    })?;

    let organizations = state.tokens.list_connections().await?;
    let mut organization_id = state.tokens.connection_status()?.organization_id;
    if let [only] = organizations.as_slice() {
        state.tokens.select_organization(&only.tenant_id).await?;
        organization_id = Some(only.tenant_id.clone());
    }

    Ok(Json(ConnectedResponse {
        success: true,
        message: "Accounting service connected".to_string(),
        organization_id,
        organizations,
    }))
}

/// GET /api/accounting/status
async fn connection_status(
    State(state): State<Arc<AccountingAppState>>,
) -> Result<Json<ConnectionStatus>, AppError> {
    Ok(Json(state.tokens.connection_status()?))
}

/// GET /api/accounting/organizations
async fn list_organizations(
    State(state): State<Arc<AccountingAppState>>,
) -> Result<Json<Vec<Connection>>, AppError> {
    Ok(Json(state.tokens.list_connections().await?))
}

/// POST /api/accounting/organization
async fn select_organization(
    State(state): State<Arc<AccountingAppState>>,
    Json(request): Json<SelectOrganizationRequest>,
) -> Result<Json<ConnectionStatus>, AppError> {
    state.tokens.select_organization(&request.tenant_id).await?;
    Ok(Json(state.tokens.connection_status()?))
}

/// POST /api/accounting/test
async fn test_connection(
    State(state): State<Arc<AccountingAppState>>,
) -> Json<OperationResponse<OrganisationSummary>> {
    let result = state.client.test_connection().await;
    if let Err(e) = &result {
        warn!(error = %e, "Accounting connection test failed");
    }
    Json(OperationResponse::from_result(result))
}

/// POST /api/accounting/disconnect
async fn disconnect(State(state): State<Arc<AccountingAppState>>) -> Json<OperationResponse<()>> {
    Json(OperationResponse::from_result(state.tokens.disconnect().await))
}
