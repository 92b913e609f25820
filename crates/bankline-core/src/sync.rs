//! Bank sync service
//!
//! `BankSync` owns the whole pipeline for the host application: credential,
//! fetch, normalize, reconcile, then persist. Nothing is written until every
//! connection has been fetched and normalized; the merge itself runs inside the
//! store's write transaction against the ledger as it stands at commit time.
//! At most one sync or disconnect runs per user.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::credentials::{validate_user_id, CredentialGateway};
use crate::db::LedgerStore;
use crate::error::{Error, Result};
use crate::fetch::{group_by_connection, TransactionFetcher};
use crate::link::LinkSessionManager;
use crate::models::{BankConnection, LinkSession, LocalTransaction, SyncReport};
use crate::normalize::{account_names, normalize_all};
use crate::provider::{AggregationApi, BridgeClient};

pub struct BankSync {
    api: Arc<dyn AggregationApi>,
    store: Arc<dyn LedgerStore>,
    config: ProviderConfig,
    in_flight: Mutex<HashSet<String>>,
}

/// Releases the per-user flag on every exit path
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    user_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.user_id);
    }
}

impl BankSync {
    pub fn new(
        api: Arc<dyn AggregationApi>,
        store: Arc<dyn LedgerStore>,
        config: ProviderConfig,
    ) -> Self {
        Self {
            api,
            store,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Wire up a `BridgeClient` from the environment
    pub fn from_env(store: Arc<dyn LedgerStore>) -> Result<Self> {
        let config = ProviderConfig::from_env()?;
        let client = BridgeClient::new(&config)?;
        Ok(Self::new(Arc::new(client), store, config))
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn begin(&self, user_id: &str) -> Result<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(user_id.to_string()) {
            return Err(Error::SyncInProgress(user_id.to_string()));
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            user_id: user_id.to_string(),
        })
    }

    /// Whether a sync or disconnect is currently running for the user
    pub fn is_busy(&self, user_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(user_id)
    }

    /// Start linking a new bank: returns the hosted session URL
    pub async fn request_link(&self, user_id: &str) -> Result<LinkSession> {
        LinkSessionManager::new(self.api.as_ref(), &self.config)
            .create_link_session(user_id)
            .await
    }

    /// Connections recorded locally for the user
    pub fn list_connections(&self, user_id: &str) -> Result<Vec<BankConnection>> {
        validate_user_id(user_id)?;
        self.store.load_connections(user_id)
    }

    /// Ask the provider for the user's connections and record them locally
    ///
    /// Local metadata (first-seen time, last sync) is kept for known items.
    pub async fn refresh_connections(&self, user_id: &str) -> Result<Vec<BankConnection>> {
        let credential = CredentialGateway::new(self.api.as_ref())
            .access_credential(user_id)
            .await?;
        let remote = TransactionFetcher::new(self.api.as_ref(), &self.config)
            .list_connections(&credential)
            .await?;

        self.store.record_connections(user_id, remote)
    }

    /// Pull every connection's transactions and merge them into the ledger
    pub async fn sync(&self, user_id: &str) -> Result<SyncReport> {
        validate_user_id(user_id)?;
        let _guard = self.begin(user_id)?;

        let credential = CredentialGateway::new(self.api.as_ref())
            .access_credential(user_id)
            .await?;
        let fetcher = TransactionFetcher::new(self.api.as_ref(), &self.config);
        let remote = fetcher.list_connections(&credential).await?;

        if remote.is_empty() {
            info!(user = %user_id, "No linked banks, nothing to sync");
            return Ok(SyncReport {
                added_count: 0,
                fetched_count: 0,
                merged_transactions: self.store.load_transactions(user_id)?,
                connections: self.store.load_connections(user_id)?,
                failures: Vec::new(),
                synced_at: Utc::now(),
            });
        }

        // One pass over the global account list serves every connection
        let mut by_connection = group_by_connection(fetcher.list_accounts(&credential).await?);

        let mut accounts = Vec::new();
        let mut raws = Vec::new();
        let mut failures = Vec::new();
        for connection in &remote {
            let owned = by_connection
                .remove(&connection.item_id)
                .unwrap_or_default();
            let mut fetched = fetcher
                .fetch_connection(&credential, &connection.item_id, owned)
                .await;
            accounts.append(&mut fetched.accounts);
            raws.append(&mut fetched.transactions);
            failures.append(&mut fetched.failures);
        }

        let incoming = normalize_all(&raws, &account_names(&accounts));
        let fetched_count = incoming.len();

        let synced_at = Utc::now();
        let commit = self
            .store
            .commit_sync(user_id, incoming, remote, synced_at)?;

        info!(
            user = %user_id,
            fetched = fetched_count,
            added = commit.merge.added.len(),
            failed_accounts = failures.len(),
            "Sync complete"
        );

        Ok(SyncReport {
            added_count: commit.merge.added.len(),
            fetched_count,
            merged_transactions: commit.merge.merged,
            connections: commit.connections,
            failures,
            synced_at,
        })
    }

    /// Forget a connection locally and purge the transactions it brought in
    ///
    /// Once no connection is left, every synced entry goes. Manual entries
    /// always stay. Returns the remaining ledger.
    pub async fn disconnect(
        &self,
        connection_id: &str,
        user_id: &str,
    ) -> Result<Vec<LocalTransaction>> {
        validate_user_id(user_id)?;
        let _guard = self.begin(user_id)?;

        let outcome = self.store.remove_connection(user_id, connection_id)?;
        if !outcome.was_connected {
            debug!(user = %user_id, connection = %connection_id, "Connection not recorded locally");
        }

        info!(
            user = %user_id,
            connection = %connection_id,
            removed = outcome.removed_count,
            "Disconnected bank"
        );
        Ok(outcome.remaining_transactions)
    }

    /// The user's ledger as stored
    pub fn list_transactions(&self, user_id: &str) -> Result<Vec<LocalTransaction>> {
        validate_user_id(user_id)?;
        self.store.load_transactions(user_id)
    }

    /// Record a manually entered transaction at the end of the ledger
    pub fn add_manual_transaction(
        &self,
        user_id: &str,
        transaction: LocalTransaction,
    ) -> Result<LocalTransaction> {
        validate_user_id(user_id)?;
        validate_manual_transaction(&transaction)?;
        self.store.append_transaction(user_id, &transaction)?;
        Ok(transaction)
    }
}

/// Reject entries that cannot be added by hand
pub fn validate_manual_transaction(transaction: &LocalTransaction) -> Result<()> {
    if transaction.is_synced() {
        return Err(Error::InvalidData(
            "only manual transactions can be added by hand".into(),
        ));
    }
    if transaction.description.trim().is_empty() {
        return Err(Error::InvalidData("description must not be empty".into()));
    }
    if !transaction.amount.is_finite() {
        return Err(Error::InvalidData("amount must be a finite number".into()));
    }
    Ok(())
}
