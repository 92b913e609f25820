//! Ledger reconciliation
//!
//! Pure functions over transaction collections. Callers replace their stored
//! collection wholesale with the returned value; nothing here mutates in place.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::{BankConnection, LocalTransaction};

/// Result of merging fetched transactions into the ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeResult {
    /// Existing entries (order kept) followed by the newly added ones
    pub merged: Vec<LocalTransaction>,
    /// Incoming entries that were not already in the ledger
    pub added: Vec<LocalTransaction>,
}

/// Merge normalized transactions into the existing ledger without duplicates
///
/// An incoming entry is new when no synced entry of `existing` carries the same
/// provider transaction id. Repeats within `incoming` keep their first occurrence.
pub fn merge(existing: &[LocalTransaction], incoming: Vec<LocalTransaction>) -> MergeResult {
    let mut known: HashSet<String> = existing
        .iter()
        .filter(|t| t.is_synced())
        .filter_map(|t| t.provider_transaction_id.clone())
        .collect();

    let mut added = Vec::new();
    for tx in incoming {
        let key = match &tx.provider_transaction_id {
            Some(id) => id.clone(),
            // Without a provider id there is nothing to dedup on
            None => continue,
        };
        if known.insert(key) {
            added.push(tx);
        }
    }

    let mut merged = Vec::with_capacity(existing.len() + added.len());
    merged.extend_from_slice(existing);
    merged.extend(added.iter().cloned());

    MergeResult { merged, added }
}

/// Drop every synced entry, keeping manual ones in order
pub fn disconnect(existing: &[LocalTransaction]) -> Vec<LocalTransaction> {
    existing.iter().filter(|t| !t.is_synced()).cloned().collect()
}

/// Drop the synced entries fetched through one connection
pub fn disconnect_connection(existing: &[LocalTransaction], item_id: &str) -> Vec<LocalTransaction> {
    existing
        .iter()
        .filter(|t| !(t.is_synced() && t.provider_item_id.as_deref() == Some(item_id)))
        .cloned()
        .collect()
}

/// Ledger and connections left after forgetting one connection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Disconnection {
    pub remaining_transactions: Vec<LocalTransaction>,
    pub remaining_connections: Vec<BankConnection>,
    /// Synced entries dropped from the ledger
    pub removed_count: usize,
    /// Whether the connection was recorded at all
    pub was_connected: bool,
}

/// Forget `item_id` and the synced entries it brought in
///
/// Once no connection is left, every synced entry goes. Manual entries always stay.
pub fn forget_connection(
    ledger: &[LocalTransaction],
    connections: &[BankConnection],
    item_id: &str,
) -> Disconnection {
    let remaining_connections: Vec<BankConnection> = connections
        .iter()
        .filter(|c| c.item_id != item_id)
        .cloned()
        .collect();

    let remaining_transactions = if remaining_connections.is_empty() {
        disconnect(ledger)
    } else {
        disconnect_connection(ledger, item_id)
    };

    Disconnection {
        removed_count: ledger.len() - remaining_transactions.len(),
        was_connected: remaining_connections.len() != connections.len(),
        remaining_transactions,
        remaining_connections,
    }
}

/// Take the provider's connection list as authoritative, keeping local timestamps
///
/// Known items keep their first-seen time and last sync; items gone from the
/// provider are dropped.
pub fn merge_connections(
    local: &[BankConnection],
    remote: Vec<BankConnection>,
) -> Vec<BankConnection> {
    let known: HashMap<&str, &BankConnection> =
        local.iter().map(|c| (c.item_id.as_str(), c)).collect();

    remote
        .into_iter()
        .map(|mut c| {
            if let Some(prev) = known.get(c.item_id.as_str()) {
                c.connected_at = prev.connected_at;
                c.last_sync_at = prev.last_sync_at;
            }
            c
        })
        .collect()
}
