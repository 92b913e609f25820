//! Ledger handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use super::require_user_id;
use crate::{AppError, AppState};
use bankline_core::{
    validate_manual_transaction, Category, LocalTransaction, TransactionStatus,
    DEFAULT_ACCOUNT_NAME,
};

/// GET /api/users/:user_id/transactions - The user's ledger in stored order
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<LocalTransaction>>, AppError> {
    let user_id = require_user_id(&user_id)?;
    let transactions = state.db.list_ledger(user_id)?;
    Ok(Json(transactions))
}

/// Body for a manually entered transaction
#[derive(Debug, Deserialize)]
pub struct NewTransactionRequest {
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub category: Option<String>,
    pub account: Option<String>,
    pub status: Option<String>,
}

/// POST /api/users/:user_id/transactions - Append a manual entry
///
/// Works without a configured provider: manual entries never touch it.
pub async fn add_transaction(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<NewTransactionRequest>,
) -> Result<Json<LocalTransaction>, AppError> {
    let user_id = require_user_id(&user_id)?;

    let category = match body.category.as_deref() {
        Some(c) => c
            .parse::<Category>()
            .map_err(|e| AppError::bad_request(&e))?,
        None => Category::Other,
    };
    let status = match body.status.as_deref() {
        Some(s) => s
            .parse::<TransactionStatus>()
            .map_err(|e| AppError::bad_request(&e))?,
        None => TransactionStatus::Completed,
    };

    let transaction = LocalTransaction::manual(
        body.date,
        &body.description,
        body.amount,
        category,
        body.account.as_deref().unwrap_or(DEFAULT_ACCOUNT_NAME),
        status,
    );
    validate_manual_transaction(&transaction).map_err(AppError::from_core)?;

    state.db.append_ledger(user_id, &transaction)?;
    Ok(Json(transaction))
}
