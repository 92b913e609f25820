//! Bank linking handlers: connect, list items, sync, disconnect

use std::sync::Arc;

use axum::{
    extract::{Path, RawQuery, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::require_user_id;
use crate::{AppError, AppState};
use bankline_core::{BankConnection, LinkCallback, LocalTransaction, PartialFetchError};

/// Body for requests scoped to one user
#[derive(Debug, Deserialize)]
pub struct UserRequest {
    #[serde(alias = "userId")]
    pub user_id: String,
}

#[derive(Serialize)]
pub struct ConnectResponse {
    pub connect_url: String,
    pub user_id: String,
}

/// POST /api/bank/connect - Start a hosted link session
pub async fn connect_bank(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UserRequest>,
) -> Result<Json<ConnectResponse>, AppError> {
    let session = state
        .sync()?
        .request_link(&body.user_id)
        .await
        .map_err(AppError::from_core)?;

    info!(user = %session.user_id, "Link session created");
    Ok(Json(ConnectResponse {
        connect_url: session.session_url,
        user_id: session.user_id,
    }))
}

#[derive(Serialize)]
pub struct ItemsResponse {
    pub items: Vec<BankConnection>,
}

/// POST /api/bank/items - Refresh the user's connections from the provider
pub async fn list_bank_items(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UserRequest>,
) -> Result<Json<ItemsResponse>, AppError> {
    let items = state
        .sync()?
        .refresh_connections(&body.user_id)
        .await
        .map_err(AppError::from_core)?;

    Ok(Json(ItemsResponse { items }))
}

#[derive(Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub added_count: usize,
    pub transactions_count: usize,
    pub transactions: Vec<LocalTransaction>,
    pub connections: Vec<BankConnection>,
    pub failures: Vec<PartialFetchError>,
    pub sync_date: DateTime<Utc>,
}

/// POST /api/bank/sync - Pull and merge transactions from every linked bank
pub async fn sync_bank(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UserRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    let report = state
        .sync()?
        .sync(&body.user_id)
        .await
        .map_err(AppError::from_core)?;

    if !report.failures.is_empty() {
        warn!(
            user = %body.user_id,
            failed_accounts = report.failures.len(),
            "Sync completed with partial failures"
        );
    }

    Ok(Json(SyncResponse {
        success: true,
        added_count: report.added_count,
        transactions_count: report.merged_transactions.len(),
        transactions: report.merged_transactions,
        connections: report.connections,
        failures: report.failures,
        sync_date: report.synced_at,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DisconnectRequest {
    #[serde(alias = "itemId")]
    pub item_id: String,
    #[serde(alias = "userId")]
    pub user_id: String,
}

#[derive(Serialize)]
pub struct DisconnectResponse {
    pub success: bool,
    pub remaining_transactions: Vec<LocalTransaction>,
}

/// POST /api/bank/disconnect - Forget a connection and purge its synced entries
pub async fn disconnect_bank(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DisconnectRequest>,
) -> Result<Json<DisconnectResponse>, AppError> {
    if body.item_id.trim().is_empty() {
        return Err(AppError::bad_request("item_id is required"));
    }

    let remaining = state
        .sync()?
        .disconnect(&body.item_id, &body.user_id)
        .await
        .map_err(AppError::from_core)?;

    Ok(Json(DisconnectResponse {
        success: true,
        remaining_transactions: remaining,
    }))
}

#[derive(Serialize)]
pub struct CallbackResponse {
    pub linked: bool,
    pub item_id: Option<String>,
    pub step: Option<String>,
    pub source: Option<String>,
}

/// GET /api/bank/callback - Landing point after the hosted link flow (no auth)
pub async fn bank_callback(RawQuery(query): RawQuery) -> Json<CallbackResponse> {
    let callback = LinkCallback::from_query(query.as_deref().unwrap_or_default());
    let linked = callback.is_success();

    if linked {
        info!(item = ?callback.item_id, "Bank link completed");
    } else {
        warn!(step = ?callback.step, "Bank link not completed");
    }

    Json(CallbackResponse {
        linked,
        item_id: callback.item_id,
        step: callback.step,
        source: callback.source,
    })
}

/// GET /api/users/:user_id/connections - Connections recorded locally
pub async fn list_connections(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<BankConnection>>, AppError> {
    let user_id = require_user_id(&user_id)?;
    let connections = state.db.list_connections(user_id)?;
    Ok(Json(connections))
}
