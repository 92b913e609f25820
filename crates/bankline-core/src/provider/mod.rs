//! Aggregation provider abstraction
//!
//! # Architecture
//!
//! - `AggregationApi` trait: every provider call the sync pipeline needs
//! - `BridgeClient`: reqwest implementation against the Bridge v3 aggregation API
//! - `types`: wire records as the provider returns them
//!
//! Error responses are classified once, in the client: "not found" and
//! "already exists" come back as `Error::NotFound` / `Error::Conflict` so the
//! credential gateway can recover from them; everything else is `Error::Upstream`.

mod bridge;
pub mod types;

pub use bridge::BridgeClient;
pub use types::{AccountRecord, ConnectSessionRequest, ItemRecord, TransactionRecord};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AccessCredential, ProviderUser};

/// One page of a paginated listing
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub resources: Vec<T>,
    /// Opaque cursor for the next page (`None` on the last page)
    pub next_cursor: Option<String>,
}

/// Calls the sync pipeline makes against the aggregation provider
#[async_trait]
pub trait AggregationApi: Send + Sync {
    /// Register a provider-side user for an application user id
    async fn create_user(&self, external_user_id: &str) -> Result<ProviderUser>;

    /// List provider users registered by this client
    async fn list_users(&self, cursor: Option<&str>) -> Result<Page<ProviderUser>>;

    /// Issue a short-lived access token for an application user id
    async fn issue_token(&self, external_user_id: &str) -> Result<AccessCredential>;

    /// Create a hosted authorization session and return its URL
    async fn create_connect_session(
        &self,
        credential: &AccessCredential,
        request: &ConnectSessionRequest,
    ) -> Result<String>;

    /// List the items (bank connections) of the credential's user
    async fn list_items(
        &self,
        credential: &AccessCredential,
        cursor: Option<&str>,
    ) -> Result<Page<ItemRecord>>;

    /// List every account of the credential's user, across items
    async fn list_accounts(
        &self,
        credential: &AccessCredential,
        cursor: Option<&str>,
    ) -> Result<Page<AccountRecord>>;

    /// List transactions of one account
    async fn list_transactions(
        &self,
        credential: &AccessCredential,
        account_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<TransactionRecord>>;
}
