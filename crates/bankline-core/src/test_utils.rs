//! Test utilities for bankline-core
//!
//! A mock Bridge aggregation API served by axum on an ephemeral port. It keeps
//! its users, items, accounts and transactions in memory, paginates every list
//! through `pagination.next_uri`, counts requests per endpoint and can be told
//! to fail in the ways the real provider does.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::config::ProviderConfig;
use crate::provider::BridgeClient;

pub const MOCK_CLIENT_ID: &str = "mock-client";
pub const MOCK_CLIENT_SECRET: &str = "mock-secret";
pub const MOCK_CALLBACK_URL: &str = "http://localhost:3000/api/bank/callback";

/// Endpoint names used by `MockBridgeServer::hits`
pub mod endpoint {
    pub const CREATE_USER: &str = "create_user";
    pub const LIST_USERS: &str = "list_users";
    pub const TOKEN: &str = "token";
    pub const CONNECT_SESSION: &str = "connect_session";
    pub const ITEMS: &str = "items";
    pub const ACCOUNTS: &str = "accounts";
    pub const TRANSACTIONS: &str = "transactions";
}

#[derive(Default)]
struct MockState {
    /// (uuid, external_user_id)
    users: Vec<(String, String)>,
    /// token -> external_user_id
    tokens: HashMap<String, String>,
    /// (item_id, owner external_user_id, bank_name)
    items: Vec<(String, String, String)>,
    /// (account_id, item_id, name)
    accounts: Vec<(String, String, String)>,
    transactions: HashMap<String, Vec<Value>>,
    failing_accounts: HashSet<String>,
    token_always_not_found: bool,
    create_always_conflicts: bool,
    list_page_size: usize,
    hits: HashMap<&'static str, usize>,
    connect_requests: Vec<Value>,
    next_id: u64,
}

type Shared = Arc<Mutex<MockState>>;

/// Mock Bridge server for testing
pub struct MockBridgeServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    state: Shared,
}

impl MockBridgeServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState {
            list_page_size: 2,
            ..Default::default()
        }));

        let app = Router::new()
            .route(
                "/v3/aggregation/users",
                post(handle_create_user).get(handle_list_users),
            )
            .route("/v3/aggregation/authorization/token", post(handle_token))
            .route("/v3/aggregation/connect-sessions", post(handle_connect_session))
            .route("/v3/aggregation/items", get(handle_items))
            .route("/v3/aggregation/accounts", get(handle_accounts))
            .route("/v3/aggregation/transactions", get(handle_transactions))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            state,
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Provider config pointing at this server
    pub fn config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::new(&self.url(), MOCK_CLIENT_ID, MOCK_CLIENT_SECRET);
        config.callback_url = Some(MOCK_CALLBACK_URL.to_string());
        config
    }

    /// A real `BridgeClient` talking to this server
    pub fn client(&self) -> BridgeClient {
        BridgeClient::new(&self.config()).unwrap()
    }

    /// Register a provider user up front; returns its uuid
    pub fn add_user(&self, external_user_id: &str) -> String {
        let mut state = self.state.lock().unwrap();
        insert_user(&mut state, external_user_id)
    }

    /// Add an item (linked bank) owned by a user
    pub fn add_item(&self, external_user_id: &str, item_id: &str, bank_name: &str) {
        self.state.lock().unwrap().items.push((
            item_id.to_string(),
            external_user_id.to_string(),
            bank_name.to_string(),
        ));
    }

    pub fn add_account(&self, item_id: &str, account_id: &str, name: &str) {
        self.state.lock().unwrap().accounts.push((
            account_id.to_string(),
            item_id.to_string(),
            name.to_string(),
        ));
    }

    /// Add a transaction record (see `transaction_json`) to an account
    pub fn add_transaction(&self, account_id: &str, record: Value) {
        self.state
            .lock()
            .unwrap()
            .transactions
            .entry(account_id.to_string())
            .or_default()
            .push(record);
    }

    /// Make every transaction request for this account fail with a 500
    pub fn fail_account(&self, account_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_accounts
            .insert(account_id.to_string());
    }

    /// Token requests answer "user not found" even for known users
    pub fn set_token_always_not_found(&self, enabled: bool) {
        self.state.lock().unwrap().token_always_not_found = enabled;
    }

    /// User creation answers "already exists" without creating anything
    pub fn set_create_always_conflicts(&self, enabled: bool) {
        self.state.lock().unwrap().create_always_conflicts = enabled;
    }

    /// Page size for users, items and accounts listings
    pub fn set_list_page_size(&self, size: usize) {
        self.state.lock().unwrap().list_page_size = size.max(1);
    }

    /// Requests received by an endpoint (see `endpoint`)
    pub fn hits(&self, endpoint: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .hits
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().unwrap().users.len()
    }

    pub fn user_uuid(&self, external_user_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|(_, ext)| ext == external_user_id)
            .map(|(uuid, _)| uuid.clone())
    }

    /// Bodies of every connect-session request, in order
    pub fn connect_requests(&self) -> Vec<Value> {
        self.state.lock().unwrap().connect_requests.clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockBridgeServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Provider-shaped transaction record
pub fn transaction_json(id: &str, account_id: &str, amount: f64, date: &str) -> Value {
    json!({
        "id": id,
        "clean_description": format!("Merchant {}", id),
        "provider_description": format!("CB MERCHANT {}", id),
        "amount": amount,
        "date": date,
        "currency_code": "EUR",
        "category_id": 273,
        "account_id": account_id,
        "deleted": false
    })
}

fn insert_user(state: &mut MockState, external_user_id: &str) -> String {
    state.next_id += 1;
    let uuid = format!("uuid-{:04}", state.next_id);
    state
        .users
        .push((uuid.clone(), external_user_id.to_string()));
    uuid
}

fn hit(state: &mut MockState, endpoint: &'static str) {
    *state.hits.entry(endpoint).or_insert(0) += 1;
}

fn error(status: StatusCode, kind: &str, code: &str) -> Response {
    (
        status,
        Json(json!({
            "type": kind,
            "message": code,
            "errors": [{"code": code, "message": code}]
        })),
    )
        .into_response()
}

fn client_ok(headers: &HeaderMap) -> bool {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    get("Client-Id") == Some(MOCK_CLIENT_ID)
        && get("Client-Secret") == Some(MOCK_CLIENT_SECRET)
        && get("Bridge-Version").is_some()
}

/// External user id behind the bearer token, if valid
fn bearer_user(state: &MockState, headers: &HeaderMap) -> Option<String> {
    let token = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))?;
    state.tokens.get(token).cloned()
}

fn offset(params: &HashMap<String, String>) -> usize {
    params
        .get("after")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Slice one page out of `all`; `next` builds the next_uri from the next offset
fn page<F>(all: Vec<Value>, start: usize, size: usize, next: F) -> Response
where
    F: Fn(usize) -> String,
{
    let end = (start + size).min(all.len());
    let resources: Vec<Value> = all.get(start..end).map(<[Value]>::to_vec).unwrap_or_default();
    let next_uri = if end < all.len() {
        Value::String(next(end))
    } else {
        Value::Null
    };
    Json(json!({
        "resources": resources,
        "pagination": {"next_uri": next_uri}
    }))
    .into_response()
}

async fn handle_create_user(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    hit(&mut state, endpoint::CREATE_USER);
    if !client_ok(&headers) {
        return error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid_client");
    }
    let external = body["external_user_id"].as_str().unwrap_or_default().to_string();

    if state.create_always_conflicts || state.users.iter().any(|(_, e)| *e == external) {
        return error(
            StatusCode::CONFLICT,
            "conflict",
            "users.creation.already_exists",
        );
    }
    let uuid = insert_user(&mut state, &external);
    (
        StatusCode::CREATED,
        Json(json!({"uuid": uuid, "external_user_id": external})),
    )
        .into_response()
}

async fn handle_list_users(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    hit(&mut state, endpoint::LIST_USERS);
    if !client_ok(&headers) {
        return error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid_client");
    }
    let all = state
        .users
        .iter()
        .map(|(uuid, ext)| json!({"uuid": uuid, "external_user_id": ext}))
        .collect();
    page(all, offset(&params), state.list_page_size, |n| {
        format!("/v3/aggregation/users?after={}", n)
    })
}

async fn handle_token(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    hit(&mut state, endpoint::TOKEN);
    if !client_ok(&headers) {
        return error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid_client");
    }
    let external = body["external_user_id"].as_str().unwrap_or_default().to_string();

    let known = state.users.iter().any(|(_, e)| *e == external);
    if !known || state.token_always_not_found {
        return error(StatusCode::NOT_FOUND, "not_found", "users.not_found");
    }

    state.next_id += 1;
    let token = format!("token-{}-{}", external, state.next_id);
    state.tokens.insert(token.clone(), external);
    Json(json!({
        "access_token": token,
        "expires_at": "2099-01-01T00:00:00Z"
    }))
    .into_response()
}

async fn handle_connect_session(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    hit(&mut state, endpoint::CONNECT_SESSION);
    if !client_ok(&headers) || bearer_user(&state, &headers).is_none() {
        return error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid_token");
    }
    state.connect_requests.push(body);
    state.next_id += 1;
    let url = format!("https://connect.mock.bridge/session/{}", state.next_id);
    (StatusCode::CREATED, Json(json!({"id": state.next_id, "url": url}))).into_response()
}

async fn handle_items(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    hit(&mut state, endpoint::ITEMS);
    let Some(user) = bearer_user(&state, &headers).filter(|_| client_ok(&headers)) else {
        return error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid_token");
    };
    let all = state
        .items
        .iter()
        .filter(|(_, owner, _)| *owner == user)
        .map(|(id, _, bank)| {
            json!({
                "id": id.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::from(id.clone())),
                "bank_name": bank,
                "created_at": "2025-01-01T10:00:00Z"
            })
        })
        .collect();
    page(all, offset(&params), state.list_page_size, |n| {
        format!("/v3/aggregation/items?after={}", n)
    })
}

async fn handle_accounts(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    hit(&mut state, endpoint::ACCOUNTS);
    let Some(user) = bearer_user(&state, &headers).filter(|_| client_ok(&headers)) else {
        return error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid_token");
    };
    let owned: HashSet<&str> = state
        .items
        .iter()
        .filter(|(_, owner, _)| *owner == user)
        .map(|(id, _, _)| id.as_str())
        .collect();
    let all = state
        .accounts
        .iter()
        .filter(|(_, item, _)| owned.contains(item.as_str()))
        .map(|(id, item, name)| json!({"id": id, "item_id": item, "name": name}))
        .collect();
    page(all, offset(&params), state.list_page_size, |n| {
        format!("/v3/aggregation/accounts?after={}", n)
    })
}

async fn handle_transactions(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    hit(&mut state, endpoint::TRANSACTIONS);
    if bearer_user(&state, &headers).is_none() || !client_ok(&headers) {
        return error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid_token");
    }
    let account_id = params.get("account_id").cloned().unwrap_or_default();
    if state.failing_accounts.contains(&account_id) {
        return error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "accounts.transactions.unavailable",
        );
    }
    let limit: usize = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(50)
        .max(1);
    let all = state
        .transactions
        .get(&account_id)
        .cloned()
        .unwrap_or_default();
    page(all, offset(&params), limit, |n| {
        format!(
            "/v3/aggregation/transactions?account_id={}&limit={}&after={}",
            account_id, limit, n
        )
    })
}
