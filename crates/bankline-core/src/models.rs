//! Domain models for Bankline

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PartialFetchError;

/// Prefix applied to provider transaction ids to form local ids
pub const SYNCED_ID_PREFIX: &str = "bank_";

/// Placeholder used when a provider record carries no usable description
pub const DEFAULT_DESCRIPTION: &str = "Transaction";

/// Account label used when the provider account cannot be resolved
pub const DEFAULT_ACCOUNT_NAME: &str = "Bank account";

/// Provider-side representation of a local user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    /// Opaque identifier assigned by the provider
    pub uuid: String,
    /// The application's user id, as registered with the provider
    pub external_user_id: String,
}

/// Short-lived bearer token scoped to one provider user
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredential {
    pub token: String,
    pub issued_for_user_id: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCredential")
            .field("token", &"<redacted>")
            .field("issued_for_user_id", &self.issued_for_user_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// One authorized link between a local user and one bank (provider "item")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankConnection {
    pub item_id: String,
    pub bank_name: String,
    pub connected_at: DateTime<Utc>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Hosted authorization session returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSession {
    pub session_url: String,
    pub user_id: String,
}

/// A provider bank account, as needed to attribute and label transactions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderAccount {
    pub id: String,
    pub item_id: String,
    pub name: String,
}

/// Provider-native record for one bank movement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawTransaction {
    pub provider_transaction_id: String,
    pub date: NaiveDate,
    /// Signed amount: debits negative, credits positive
    pub amount: f64,
    /// Cleaned merchant description
    pub clean_description: Option<String>,
    /// Provider free-text description
    pub provider_description: Option<String>,
    /// Raw wording from the bank statement
    pub bank_description: Option<String>,
    pub category_code: Option<i64>,
    pub provider_account_id: String,
    /// Connection the record was fetched through
    pub item_id: String,
    pub currency_code: Option<String>,
}

/// Application categories that provider category codes map onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Category {
    Groceries,
    Dining,
    Transport,
    Housing,
    Utilities,
    Health,
    Shopping,
    Leisure,
    Income,
    Transfer,
    Fees,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groceries => "Groceries",
            Self::Dining => "Dining",
            Self::Transport => "Transport",
            Self::Housing => "Housing",
            Self::Utilities => "Utilities",
            Self::Health => "Health",
            Self::Shopping => "Shopping",
            Self::Leisure => "Leisure",
            Self::Income => "Income",
            Self::Transfer => "Transfer",
            Self::Fees => "Fees",
            Self::Other => "Other",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "groceries" => Ok(Self::Groceries),
            "dining" | "restaurants" => Ok(Self::Dining),
            "transport" => Ok(Self::Transport),
            "housing" => Ok(Self::Housing),
            "utilities" => Ok(Self::Utilities),
            "health" => Ok(Self::Health),
            "shopping" => Ok(Self::Shopping),
            "leisure" => Ok(Self::Leisure),
            "income" => Ok(Self::Income),
            "transfer" => Ok(Self::Transfer),
            "fees" => Ok(Self::Fees),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Booked by the bank (always the case for synced records)
    #[default]
    Completed,
    /// Entered ahead of time by the user
    Planned,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Planned => "planned",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "completed" => Ok(Self::Completed),
            "planned" => Ok(Self::Planned),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction origin - how it entered the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionOrigin {
    /// Pulled from a linked bank
    Synced,
    /// Entered by the user
    Manual,
}

impl TransactionOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for TransactionOrigin {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "synced" => Ok(Self::Synced),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown transaction origin: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalTransaction {
    pub id: String,
    pub date: NaiveDate,
    pub description: String,
    /// Negative = expense, positive = income
    pub amount: f64,
    pub category: Category,
    /// Local account label
    pub account: String,
    pub status: TransactionStatus,
    pub origin: TransactionOrigin,
    pub provider_transaction_id: Option<String>,
    pub provider_account_id: Option<String>,
    /// Connection a synced record was fetched through
    pub provider_item_id: Option<String>,
}

impl LocalTransaction {
    /// Build a manually entered transaction
    pub fn manual(
        date: NaiveDate,
        description: &str,
        amount: f64,
        category: Category,
        account: &str,
        status: TransactionStatus,
    ) -> Self {
        Self {
            id: format!("manual_{}", Utc::now().format("%Y%m%d%H%M%S%f")),
            date,
            description: description.to_string(),
            amount,
            category,
            account: account.to_string(),
            status,
            origin: TransactionOrigin::Manual,
            provider_transaction_id: None,
            provider_account_id: None,
            provider_item_id: None,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.origin == TransactionOrigin::Synced
    }
}

/// Outcome of one sync cycle
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub added_count: usize,
    /// Transactions fetched across all connections (before dedup)
    pub fetched_count: usize,
    pub merged_transactions: Vec<LocalTransaction>,
    pub connections: Vec<BankConnection>,
    pub failures: Vec<PartialFetchError>,
    pub synced_at: DateTime<Utc>,
}
