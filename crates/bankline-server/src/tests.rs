//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use bankline_core::test_utils::{endpoint, transaction_json, MockBridgeServer};
use bankline_core::{Database, LedgerStore};
use http_body_util::BodyExt;
use tower::ServiceExt;

const USER: &str = "user-7";

async fn seeded_server() -> MockBridgeServer {
    let server = MockBridgeServer::start().await;
    server.add_user(USER);
    server.add_item(USER, "501", "Boursorama");
    server.add_item(USER, "502", "Qonto");
    server.add_account("501", "acc-1", "Compte courant");
    server.add_account("502", "acc-2", "Compte pro");
    server.add_transaction("acc-1", transaction_json("t1", "acc-1", -12.5, "2025-02-01"));
    server.add_transaction("acc-1", transaction_json("t2", "acc-1", 1800.0, "2025-02-02"));
    server.add_transaction("acc-2", transaction_json("t3", "acc-2", -99.0, "2025-02-03"));
    server
}

fn open_config() -> ServerConfig {
    ServerConfig {
        require_auth: false,
        allowed_origins: vec![],
        ..Default::default()
    }
}

fn setup_test_app(server: &MockBridgeServer, db: &Database) -> Router {
    let sync = BankSync::new(
        Arc::new(server.client()),
        Arc::new(db.clone()),
        server.config(),
    );
    create_router_with_sync(db.clone(), Some(sync), None, open_config())
}

fn setup_unconfigured_app(db: &Database) -> Router {
    create_router_with_sync(
        db.clone(),
        None,
        Some("BRIDGE_CLIENT_ID is not set".to_string()),
        open_config(),
    )
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn post_json(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

// ========== Health / Auth Tests ==========

#[tokio::test]
async fn test_health_reports_provider_state() {
    let db = Database::in_memory().unwrap();

    let json = get_body_json(get(&setup_unconfigured_app(&db), "/api/health").await).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["provider_configured"], false);

    let server = MockBridgeServer::start().await;
    let json = get_body_json(get(&setup_test_app(&server, &db), "/api/health").await).await;
    assert_eq!(json["provider_configured"], true);
}

#[tokio::test]
async fn test_auth_required_by_default() {
    let db = Database::in_memory().unwrap();
    let config = ServerConfig {
        api_keys: vec!["secret-key".to_string()],
        ..Default::default()
    };
    let app = create_router_with_sync(db, None, None, config);

    let response = get(&app, "/api/users/u1/transactions").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/users/u1/transactions")
                .header("authorization", "Bearer wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/users/u1/transactions")
                .header("authorization", "Bearer secret-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Public paths skip auth
    assert_eq!(get(&app, "/api/health").await.status(), StatusCode::OK);
    assert_eq!(
        get(&app, "/api/bank/callback?item_id=1").await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_security_headers_present() {
    let db = Database::in_memory().unwrap();
    let response = get(&setup_unconfigured_app(&db), "/api/health").await;

    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
}

#[test]
fn test_validate_api_key() {
    let keys = vec!["abc".to_string(), "longer-key".to_string()];
    assert!(validate_api_key("abc", &keys));
    assert!(validate_api_key("longer-key", &keys));
    assert!(!validate_api_key("ab", &keys));
    assert!(!validate_api_key("", &keys));
    assert!(!validate_api_key("abc", &[]));
}

#[test]
fn test_parse_api_keys() {
    assert_eq!(parse_api_keys(" a, b ,,c "), vec!["a", "b", "c"]);
    assert!(parse_api_keys("").is_empty());
}

// ========== Bank API Tests ==========

#[tokio::test]
async fn test_connect_returns_session_url() {
    let server = seeded_server().await;
    let db = Database::in_memory().unwrap();
    let app = setup_test_app(&server, &db);

    let response = post_json(&app, "/api/bank/connect", serde_json::json!({ "userId": USER })).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["user_id"], USER);
    assert!(json["connect_url"]
        .as_str()
        .unwrap()
        .starts_with("https://connect.mock.bridge/session/"));
    assert_eq!(server.hits(endpoint::CONNECT_SESSION), 1);
}

#[tokio::test]
async fn test_connect_empty_user_is_bad_request() {
    let server = seeded_server().await;
    let db = Database::in_memory().unwrap();
    let app = setup_test_app(&server, &db);

    let response = post_json(&app, "/api/bank/connect", serde_json::json!({ "user_id": "  " })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.hits(endpoint::TOKEN), 0);
}

#[tokio::test]
async fn test_bank_routes_unavailable_without_provider() {
    let db = Database::in_memory().unwrap();
    let app = setup_unconfigured_app(&db);

    let response = post_json(&app, "/api/bank/sync", serde_json::json!({ "user_id": USER })).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = get_body_json(response).await;
    assert_eq!(json["error"], "Bank provider not configured");
    assert_eq!(json["details"], "BRIDGE_CLIENT_ID is not set");
}

#[tokio::test]
async fn test_sync_twice_adds_nothing_new() {
    let server = seeded_server().await;
    let db = Database::in_memory().unwrap();
    let app = setup_test_app(&server, &db);

    let response = post_json(&app, "/api/bank/sync", serde_json::json!({ "user_id": USER })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["added_count"], 3);
    assert_eq!(json["transactions_count"], 3);
    assert_eq!(json["transactions"][0]["id"], "bank_t1");
    assert!(json["failures"].as_array().unwrap().is_empty());

    let json = get_body_json(
        post_json(&app, "/api/bank/sync", serde_json::json!({ "user_id": USER })).await,
    )
    .await;
    assert_eq!(json["added_count"], 0);
    assert_eq!(json["transactions_count"], 3);

    let stored = get_body_json(get(&app, &format!("/api/users/{}/transactions", USER)).await).await;
    assert_eq!(stored.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_sync_reports_failed_accounts() {
    let server = seeded_server().await;
    server.fail_account("acc-2");
    let db = Database::in_memory().unwrap();
    let app = setup_test_app(&server, &db);

    let json = get_body_json(
        post_json(&app, "/api/bank/sync", serde_json::json!({ "user_id": USER })).await,
    )
    .await;
    assert_eq!(json["added_count"], 2);
    assert_eq!(json["failures"][0]["account_id"], "acc-2");
    assert_eq!(json["failures"][0]["item_id"], "502");
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway_with_details() {
    let server = seeded_server().await;
    server.set_token_always_not_found(true);
    let db = Database::in_memory().unwrap();
    let app = setup_test_app(&server, &db);

    let response = post_json(&app, "/api/bank/sync", serde_json::json!({ "user_id": USER })).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let json = get_body_json(response).await;
    assert_eq!(json["error"], "Bank provider request failed");
    assert_eq!(json["details"]["status"], 404);
    assert_eq!(json["details"]["body"]["type"], "not_found");
}

#[tokio::test]
async fn test_items_lists_remote_connections() {
    let server = seeded_server().await;
    let db = Database::in_memory().unwrap();
    let app = setup_test_app(&server, &db);

    let json = get_body_json(
        post_json(&app, "/api/bank/items", serde_json::json!({ "user_id": USER })).await,
    )
    .await;
    let items = json["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["item_id"], "501");
    assert_eq!(items[0]["bank_name"], "Boursorama");

    let local = get_body_json(get(&app, &format!("/api/users/{}/connections", USER)).await).await;
    assert_eq!(local.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_disconnect_purges_connection_transactions() {
    let server = seeded_server().await;
    let db = Database::in_memory().unwrap();
    let app = setup_test_app(&server, &db);
    post_json(&app, "/api/bank/sync", serde_json::json!({ "user_id": USER })).await;

    let response = post_json(
        &app,
        "/api/bank/disconnect",
        serde_json::json!({ "itemId": "502", "userId": USER }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], true);
    let remaining = json["remaining_transactions"].as_array().unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|t| t["provider_item_id"] == "501"));

    assert_eq!(db.load_connections(USER).unwrap().len(), 1);
}

#[tokio::test]
async fn test_disconnect_requires_item_id() {
    let server = seeded_server().await;
    let db = Database::in_memory().unwrap();
    let app = setup_test_app(&server, &db);

    let response = post_json(
        &app,
        "/api/bank/disconnect",
        serde_json::json!({ "item_id": "", "user_id": USER }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_parses_query() {
    let db = Database::in_memory().unwrap();
    let app = setup_unconfigured_app(&db);

    let json = get_body_json(
        get(&app, "/api/bank/callback?item_id=8842&success=true&source=connect").await,
    )
    .await;
    assert_eq!(json["linked"], true);
    assert_eq!(json["item_id"], "8842");
    assert_eq!(json["source"], "connect");

    let json = get_body_json(get(&app, "/api/bank/callback?success=false&step=sca").await).await;
    assert_eq!(json["linked"], false);
    assert_eq!(json["step"], "sca");
    assert!(json["item_id"].is_null());

    let json = get_body_json(get(&app, "/api/bank/callback").await).await;
    assert_eq!(json["linked"], false);
}

// ========== Transaction API Tests ==========

#[tokio::test]
async fn test_manual_transaction_without_provider() {
    let db = Database::in_memory().unwrap();
    let app = setup_unconfigured_app(&db);

    let response = post_json(
        &app,
        "/api/users/u1/transactions",
        serde_json::json!({
            "date": "2025-03-01",
            "description": "Farmers market",
            "amount": -18.4,
            "category": "groceries",
            "account": "Cash"
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["origin"], "manual");
    assert_eq!(json["category"], "Groceries");
    assert_eq!(json["status"], "completed");

    let list = get_body_json(get(&app, "/api/users/u1/transactions").await).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["description"], "Farmers market");
}

#[tokio::test]
async fn test_manual_transaction_validation() {
    let db = Database::in_memory().unwrap();
    let app = setup_unconfigured_app(&db);

    let blank = serde_json::json!({ "date": "2025-03-01", "description": " ", "amount": 1.0 });
    let response = post_json(&app, "/api/users/u1/transactions", blank).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bad_category = serde_json::json!({
        "date": "2025-03-01",
        "description": "Gift",
        "amount": 1.0,
        "category": "lottery"
    });
    let response = post_json(&app, "/api/users/u1/transactions", bad_category).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(db.count_ledger("u1").unwrap(), 0);
}

#[tokio::test]
async fn test_manual_entries_survive_sync() {
    let server = seeded_server().await;
    let db = Database::in_memory().unwrap();
    let app = setup_test_app(&server, &db);

    post_json(
        &app,
        &format!("/api/users/{}/transactions", USER),
        serde_json::json!({ "date": "2025-01-30", "description": "Rent share", "amount": -400.0 }),
    )
    .await;
    post_json(&app, "/api/bank/sync", serde_json::json!({ "user_id": USER })).await;

    let list = get_body_json(get(&app, &format!("/api/users/{}/transactions", USER)).await).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 4);
    assert_eq!(list[0]["origin"], "manual");
    assert_eq!(list[0]["description"], "Rent share");
}
