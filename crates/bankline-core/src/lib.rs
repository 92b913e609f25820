//! Bankline Core Library
//!
//! Bank-link lifecycle and transaction reconciliation:
//! - Credential gateway with lazy provider-user provisioning
//! - Hosted link sessions and callback handling
//! - Paginated, partial-failure tolerant transaction fetching
//! - Normalization of provider records into ledger transactions
//! - Idempotent merge and disconnect over the ledger
//! - SQLite ledger storage (SQLCipher encrypted)

pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod fetch;
pub mod link;
pub mod models;
pub mod normalize;
pub mod provider;
pub mod reconcile;
pub mod sync;

/// Test utilities including a mock Bridge server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::ProviderConfig;
pub use credentials::CredentialGateway;
pub use db::{Database, LedgerStore, SyncCommit};
pub use error::{Error, PartialFetchError, Result};
pub use fetch::{group_by_connection, FetchedTransactions, TransactionFetcher};
pub use link::{new_connections, LinkCallback, LinkSessionManager};
pub use models::*;
pub use normalize::{normalize, AccountNameResolver};
pub use provider::{AggregationApi, BridgeClient};
pub use reconcile::{
    disconnect, disconnect_connection, forget_connection, merge, merge_connections, Disconnection,
    MergeResult,
};
pub use sync::{validate_manual_transaction, BankSync};
