// Integration tests for the accounting connection API

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use ledgerlink::api::{create_accounting_router, AccountingAppState};
use ledgerlink::credentials::{CredentialStore, StoredCredential};
use ledgerlink::oauth::{OAuthEndpoints, StateManager};
use ledgerlink::{AccountingClient, LedgerConfig, TokenManager};
use mockito::{Matcher, Server};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

const COMPANY: &str = "acme";

fn test_config() -> LedgerConfig {
    let mut config = LedgerConfig::default();
    config.xero.client_id = Some("client-abc".to_string());
    config.xero.client_secret = Some("secret-xyz".to_string());
    config.xero.redirect_uri =
        Some("http://localhost:3002/api/accounting/oauth/callback".to_string());
    config.http.initial_backoff_ms = 1;
    config
}

struct TestApp {
    router: Router,
    store: Arc<CredentialStore>,
    tokens: Arc<TokenManager>,
}

fn create_test_app(server_url: &str) -> TestApp {
    let key = BASE64.encode([0u8; 32]);
    let store = Arc::new(CredentialStore::new(":memory:", &key).unwrap());
    let config = test_config();

    let tokens = Arc::new(TokenManager::with_endpoints(
        COMPANY,
        &config.xero,
        store.clone(),
        reqwest::Client::new(),
        OAuthEndpoints::with_base_url(server_url),
    ));
    let client = Arc::new(
        AccountingClient::with_base_url(
            &config,
            tokens.clone(),
            format!("{}/api.xro/2.0", server_url),
        )
        .unwrap(),
    );

    let router = create_accounting_router(AccountingAppState {
        tokens: tokens.clone(),
        client,
        state_manager: StateManager::new(600),
    });

    TestApp {
        router,
        store,
        tokens,
    }
}

fn connect(store: &CredentialStore, organization_id: Option<&str>) {
    store
        .store(
            COMPANY,
            &StoredCredential {
                client_id: Some("client-abc".to_string()),
                client_secret: Some("secret-xyz".to_string()),
                organization_id: organization_id.map(str::to_string),
                refresh_token: Some("refresh-1".to_string()),
                access_token: Some("access-1".to_string()),
                access_token_expiry: Some(Utc::now() + Duration::hours(1)),
            },
        )
        .unwrap();
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_status_when_disconnected() {
    let server = Server::new_async().await;
    let app = create_test_app(&server.url());

    let (status, json) = send(&app.router, get("/api/accounting/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["connected"], false);
    assert_eq!(json["access_token_valid"], false);
    assert!(json["organization_id"].is_null());
}

#[tokio::test]
async fn test_full_connect_flow() {
    let mut server = Server::new_async().await;
    let token = server
        .mock("POST", "/connect/token")
        .match_header(
            "authorization",
            format!("Basic {}", BASE64.encode("client-abc:secret-xyz")).as_str(),
        )
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "code-123".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"access-1","refresh_token":"refresh-1","expires_in":1800,"token_type":"Bearer"}"#)
        .expect(1)
        .create_async()
        .await;
    let connections = server
        .mock("GET", "/connections")
        .match_header("authorization", "Bearer access-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id":"conn-1","tenantId":"tenant-1","tenantName":"Harbour Foods","tenantType":"ORGANISATION","createdDateUtc":"2026-01-05T10:00:00","updatedDateUtc":"2026-01-05T10:00:00"}]"#)
        .expect(1)
        .create_async()
        .await;

    let app = create_test_app(&server.url());

    // Start: redirect carries a fresh state
    let response = app
        .router
        .clone()
        .oneshot(get("/api/accounting/oauth/start"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with(&format!("{}/identity/connect/authorize?", server.url())));
    let (_, query) = location.split_once('?').unwrap();
    let params: HashMap<String, String> = serde_urlencoded::from_str(query).unwrap();
    assert_eq!(params["client_id"], "client-abc");
    assert!(params["scope"].contains("offline_access"));
    let state = params["state"].clone();

    // Callback: exchange, list organizations, auto-select the only one
    let (status, json) = send(
        &app.router,
        get(&format!(
            "/api/accounting/oauth/callback?code=code-123&state={}",
            state
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["organization_id"], "tenant-1");
    assert_eq!(json["organizations"][0]["tenantName"], "Harbour Foods");

    let stored = app.store.get(COMPANY).unwrap().unwrap();
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(stored.organization_id.as_deref(), Some("tenant-1"));

    // The state is single use
    let (status, _) = send(
        &app.router,
        get(&format!(
            "/api/accounting/oauth/callback?code=code-123&state={}",
            state
        )),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    token.assert_async().await;
    connections.assert_async().await;
}

#[tokio::test]
async fn test_callback_rejects_unknown_state() {
    let mut server = Server::new_async().await;
    let token = server
        .mock("POST", "/connect/token")
        .expect(0)
        .create_async()
        .await;
    let app = create_test_app(&server.url());

    let (status, json) = send(
        &app.router,
        get("/api/accounting/oauth/callback?code=code-123&state=forged"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].as_str().unwrap().contains("state"));
    token.assert_async().await;
}

#[tokio::test]
async fn test_callback_with_provider_error() {
    let server = Server::new_async().await;
    let app = create_test_app(&server.url());

    let (status, json) = send(
        &app.router,
        get("/api/accounting/oauth/callback?error=access_denied&error_description=User+cancelled"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("access_denied"));
}

#[tokio::test]
async fn test_select_organization() {
    let server = Server::new_async().await;
    let app = create_test_app(&server.url());
    connect(&app.store, None);

    let (status, json) = send(
        &app.router,
        post_json("/api/accounting/organization", r#"{"tenant_id":"tenant-2"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["connected"], true);
    assert_eq!(json["organization_id"], "tenant-2");
    assert_eq!(json["access_token_valid"], true);
}

#[tokio::test]
async fn test_select_organization_requires_connection() {
    let server = Server::new_async().await;
    let app = create_test_app(&server.url());

    let (status, _) = send(
        &app.router,
        post_json("/api/accounting/organization", r#"{"tenant_id":"tenant-2"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_connection_test_endpoint() {
    let mut server = Server::new_async().await;
    let organisation = server
        .mock("GET", "/api.xro/2.0/Organisation")
        .match_header("xero-tenant-id", "tenant-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"Organisations":[{"OrganisationID":"org-1","Name":"Harbour Foods","BaseCurrency":"NZD","CountryCode":"NZ"}]}"#)
        .expect(1)
        .create_async()
        .await;

    let app = create_test_app(&server.url());
    connect(&app.store, Some("tenant-1"));

    let (status, json) = send(&app.router, post_json("/api/accounting/test", "{}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["Name"], "Harbour Foods");
    organisation.assert_async().await;
}

#[tokio::test]
async fn test_connection_test_without_organization() {
    let mut server = Server::new_async().await;
    let api = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let app = create_test_app(&server.url());
    connect(&app.store, None);

    let (status, json) = send(&app.router, post_json("/api/accounting/test", "{}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "No accounting organization selected");
    api.assert_async().await;
}

#[tokio::test]
async fn test_disconnect_keeps_client_credentials() {
    let server = Server::new_async().await;
    let app = create_test_app(&server.url());
    connect(&app.store, Some("tenant-1"));

    let (status, json) = send(&app.router, post_json("/api/accounting/disconnect", "{}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let stored = app.store.get(COMPANY).unwrap().unwrap();
    assert!(stored.refresh_token.is_none());
    assert!(stored.access_token.is_none());
    assert!(stored.organization_id.is_none());
    assert_eq!(stored.client_id.as_deref(), Some("client-abc"));
    assert_eq!(stored.client_secret.as_deref(), Some("secret-xyz"));

    assert!(!app.tokens.connection_status().unwrap().connected);
}
